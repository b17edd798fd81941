//! Byte-string keyed map stitching the hash trie and the label store.
//!
//! The trie resolves one edge symbol per branching point; the label store
//! holds each node's remaining key suffix and its value. An edge symbol
//! packs the branch byte together with the branch offset inside the
//! parent's label (`offset << 8 | byte`, offset below Λ = 32); offsets of
//! Λ or more are consumed by dedicated *step* children first, one per Λ
//! label bytes, using a reserved symbol. Keys get a NUL terminator
//! appended internally, which is how a key ending inside another key's
//! label still branches — on the terminator byte itself.

use std::fmt;

use smallvec::SmallVec;

use crate::labels::{LabelStore, ValueMut};
use crate::trie::HashTrie;
use crate::value::Value;
use crate::PosMap;

/// Label bytes consumed by one step child.
const LAMBDA: u64 = 32;

/// Reserved symbol for step children, one past the packed
/// `(offset, byte)` range.
const STEP_SYMB: u64 = LAMBDA << 8;

/// Edge symbol width: 5 offset bits and 8 byte bits, plus room for the
/// step symbol.
const SYMB_BITS: u32 = 14;

/// Packs a branch byte and its offset within the parent label.
fn make_symb(byte: u8, offset: u64) -> u64 {
    debug_assert!(offset < LAMBDA);
    (offset << 8) | u64::from(byte)
}

/// Appends the NUL terminator the stored format relies on.
fn terminated(key: &[u8]) -> SmallVec<[u8; 64]> {
    debug_assert!(!key.contains(&0), "keys must not contain NUL bytes");
    let mut buf = SmallVec::with_capacity(key.len() + 1);
    buf.extend_from_slice(key);
    buf.push(0);
    buf
}

/// Builder for [`BonsaiMap`], exposing the trie and label-store knobs.
///
/// ```
/// use bonsai_map::BonsaiMap;
///
/// let map = BonsaiMap::<u64>::builder()
///     .capa_bits(16)
///     .chunk_size(16)
///     .max_factor(80)
///     .build::<u64>();
/// assert!(map.is_empty());
/// ```
#[derive(Clone, Copy, Debug)]
pub struct BonsaiMapBuilder {
    capa_bits: u32,
    chunk_size: u32,
    dsp1_bits: u32,
    dsp2_bits: u32,
    aux_capa_bits: u32,
    max_factor: u64,
}

impl Default for BonsaiMapBuilder {
    fn default() -> Self {
        Self {
            capa_bits: 16,
            chunk_size: 16,
            dsp1_bits: 3,
            dsp2_bits: 7,
            aux_capa_bits: 8,
            max_factor: 80,
        }
    }
}

impl BonsaiMapBuilder {
    /// Initial trie capacity as a log₂; values below 16 are raised to 16.
    #[must_use]
    pub fn capa_bits(mut self, bits: u32) -> Self {
        self.capa_bits = bits;
        self
    }

    /// Label-store chunk size: 8, 16, 32, or 64 positions per chunk.
    #[must_use]
    pub fn chunk_size(mut self, positions: u32) -> Self {
        self.chunk_size = positions;
        self
    }

    /// Width of the per-slot displacement field.
    #[must_use]
    pub fn dsp1_bits(mut self, bits: u32) -> Self {
        self.dsp1_bits = bits;
        self
    }

    /// Value width of the second-tier displacement table.
    #[must_use]
    pub fn dsp2_bits(mut self, bits: u32) -> Self {
        self.dsp2_bits = bits;
        self
    }

    /// Initial capacity of the second-tier displacement table, as a log₂.
    #[must_use]
    pub fn aux_capa_bits(mut self, bits: u32) -> Self {
        self.aux_capa_bits = bits;
        self
    }

    /// Trie load percentage that triggers doubling, in `1..=99`.
    #[must_use]
    pub fn max_factor(mut self, percent: u64) -> Self {
        self.max_factor = percent;
        self
    }

    /// Builds an empty map storing values of type `V`.
    ///
    /// # Panics
    ///
    /// Panics if any knob is out of range, see [`crate::HashTrieBuilder::build`]
    /// and [`LabelStore::new`].
    #[must_use]
    pub fn build<V: Value>(self) -> BonsaiMap<V> {
        let trie = HashTrie::builder()
            .capa_bits(self.capa_bits)
            .symb_bits(SYMB_BITS)
            .dsp1_bits(self.dsp1_bits)
            .dsp2_bits(self.dsp2_bits)
            .aux_capa_bits(self.aux_capa_bits)
            .max_factor(self.max_factor)
            .build();
        let labels = LabelStore::new(trie.capa_bits(), self.chunk_size);
        BonsaiMap { trie, labels }
    }
}

/// Memory-compact map from byte strings to fixed-size values.
///
/// Insert-only: associations can be added and overwritten, never removed.
/// Keys are arbitrary byte strings without interior NUL bytes.
///
/// ```
/// use bonsai_map::BonsaiMap;
///
/// let mut map: BonsaiMap<u32> = BonsaiMap::new();
/// assert_eq!(map.insert(b"apple", 1), None);
/// assert_eq!(map.insert(b"apple", 2), Some(1));
/// assert_eq!(map.get(b"apple"), Some(2));
/// ```
pub struct BonsaiMap<V: Value> {
    trie: HashTrie,
    labels: LabelStore<V>,
}

impl<V: Value> BonsaiMap<V> {
    /// Creates an empty map with default knobs.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Returns a builder with default knobs.
    #[must_use]
    pub fn builder() -> BonsaiMapBuilder {
        BonsaiMapBuilder::default()
    }

    /// Number of stored associations.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.labels.size()
    }

    /// Returns `true` if the map contains no associations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.size() == 0
    }

    /// Looks up the value associated with `key`.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<V> {
        if self.trie.size() == 0 {
            return None;
        }
        let buf = terminated(key);
        let mut node_id = self.trie.get_root();
        let mut rest: &[u8] = &buf;
        while !rest.is_empty() {
            let (value, mut matched) = self.labels.compare(node_id, rest);
            if let Some(value) = value {
                return Some(value.get());
            }
            rest = &rest[matched as usize..];
            while LAMBDA <= matched {
                node_id = self.trie.find_child(node_id, STEP_SYMB)?;
                matched -= LAMBDA;
            }
            node_id = self.trie.find_child(node_id, make_symb(rest[0], matched))?;
            rest = &rest[1..];
        }
        // The key was consumed on a terminator edge, so this node's label
        // is empty and the probe reads its value directly.
        let (value, _) = self.labels.compare(node_id, rest);
        value.map(|value| value.get())
    }

    /// Returns `true` if the map holds an association for `key`.
    #[must_use]
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Inserts a key-value association.
    ///
    /// Returns `None` if the key was new, or `Some(old_value)` if an
    /// existing value was replaced.
    pub fn insert(&mut self, key: &[u8], value: V) -> Option<V> {
        let buf = terminated(key);
        let (node_id, created) = self.traverse(&buf);
        let mut slot = self.labels.value_mut(node_id);
        let old = (!created).then(|| slot.get());
        slot.set(value);
        old
    }

    /// Inserts `key` if absent and returns a mutable handle on its value.
    ///
    /// Freshly inserted keys start with a zeroed value. The handle is
    /// valid until the next mutation of the map.
    pub fn update(&mut self, key: &[u8]) -> ValueMut<'_, V> {
        let buf = terminated(key);
        let (node_id, _) = self.traverse(&buf);
        self.labels.value_mut(node_id)
    }

    /// Read access to the underlying hash trie.
    #[must_use]
    pub fn trie(&self) -> &HashTrie {
        &self.trie
    }

    /// Read access to the underlying label store.
    #[must_use]
    pub fn label_store(&self) -> &LabelStore<V> {
        &self.labels
    }

    /// Walks `buf` (terminator included) to its node, inserting the
    /// missing tail. Returns the node id and whether it was created.
    fn traverse(&mut self, buf: &[u8]) -> (u64, bool) {
        if self.trie.size() == 0 {
            // First association: the root takes the whole key as label.
            self.trie.add_root();
            let root = self.trie.get_root();
            self.labels.insert(root, buf);
            return (root, true);
        }

        let mut node_id = self.trie.get_root();
        let mut rest: &[u8] = buf;
        while !rest.is_empty() {
            let (found, mut matched) = {
                let (value, matched) = self.labels.compare(node_id, rest);
                (value.is_some(), matched)
            };
            if found {
                return (node_id, false);
            }
            rest = &rest[matched as usize..];
            while LAMBDA <= matched {
                self.add_child_synced(&mut node_id, STEP_SYMB);
                matched -= LAMBDA;
            }
            let created = self.add_child_synced(&mut node_id, make_symb(rest[0], matched));
            rest = &rest[1..];
            if created {
                self.labels.insert(node_id, rest);
                return (node_id, true);
            }
        }
        (node_id, false)
    }

    /// `add_child` with the label store kept in lock-step: when the trie
    /// is due to rehash, both containers double before the edge is added.
    fn add_child_synced(&mut self, node_id: &mut u64, symb: u64) -> bool {
        if self.trie.needs_to_expand() {
            let pos_map = self.trie.expand();
            *node_id = pos_map
                .renamed(*node_id)
                .expect("walked node survives the rehash");
            self.labels.expand(&pos_map);
        }
        self.trie.add_child(node_id, symb)
    }
}

impl<V: Value> Default for BonsaiMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Value> fmt::Debug for BonsaiMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BonsaiMap")
            .field("len", &self.labels.size())
            .field("capa_bits", &self.trie.capa_bits())
            .finish_non_exhaustive()
    }
}
