//! Compact hash trie: `(parent, symbol) → child` resolution in a
//! quotient-only open-addressed table.
//!
//! Each occupied slot stores just a hash quotient, a probe displacement
//! split across three tiers, and the child id issued when the slot was
//! filled. No key is ever stored: growth reconstructs every key from
//! `(quotient, home slot)` through the inverse of the bijective hash.
//!
//! Displacement tiers keep the common slot narrow. Displacements below
//! `2^dsp1_bits - 1` live in the slot itself; the next `2^dsp2_bits - 1`
//! values live in an [`AuxTable`] keyed by slot id; the rare remainder
//! lives in an ordered overflow map.

use std::collections::BTreeMap;

use crate::aux_table::AuxTable;
use crate::compact_vector::CompactVector;
use crate::hash::SplitMix;
use crate::{PosMap, Pow2};

/// Smallest slot-array size the trie will allocate, as a log₂.
const MIN_CAPA_BITS: u32 = 16;

/// Builder for [`HashTrie`] carrying every construction knob.
///
/// ```
/// use bonsai_map::HashTrie;
///
/// let trie = HashTrie::builder()
///     .capa_bits(16)
///     .symb_bits(8)
///     .max_factor(80)
///     .build();
/// assert_eq!(trie.capa_bits(), 16);
/// ```
#[derive(Clone, Copy, Debug)]
pub struct HashTrieBuilder {
    capa_bits: u32,
    symb_bits: u32,
    dsp1_bits: u32,
    dsp2_bits: u32,
    aux_capa_bits: u32,
    max_factor: u64,
}

impl Default for HashTrieBuilder {
    fn default() -> Self {
        Self {
            capa_bits: MIN_CAPA_BITS,
            symb_bits: 8,
            dsp1_bits: 3,
            dsp2_bits: 7,
            aux_capa_bits: 8,
            max_factor: 80,
        }
    }
}

impl HashTrieBuilder {
    /// Initial slot-array size as a log₂; values below 16 are raised to 16.
    #[must_use]
    pub fn capa_bits(mut self, bits: u32) -> Self {
        self.capa_bits = bits;
        self
    }

    /// Alphabet width in bits: symbols range over `[0, 2^symb_bits)`.
    #[must_use]
    pub fn symb_bits(mut self, bits: u32) -> Self {
        self.symb_bits = bits;
        self
    }

    /// Width of the first-tier displacement field stored in each slot.
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

    /// Load percentage that triggers doubling, in `1..=99`.
    #[must_use]
    pub fn max_factor(mut self, percent: u64) -> Self {
        self.max_factor = percent;
        self
    }

    /// Builds the trie.
    ///
    /// # Panics
    ///
    /// Panics if any knob is out of range: `symb_bits` must be at least 1,
    /// `capa_bits + symb_bits` at most 64, `symb_bits + dsp1_bits` at most
    /// 64, `dsp1_bits` at least 1, `max_factor` in `1..=99`.
    #[must_use]
    pub fn build(self) -> HashTrie {
        let capa_bits = self.capa_bits.max(MIN_CAPA_BITS);
        assert!(self.symb_bits >= 1, "alphabet width must be at least one bit");
        assert!(
            capa_bits + self.symb_bits <= 64,
            "capa_bits + symb_bits must fit the hash width"
        );
        assert!(self.dsp1_bits >= 1, "first displacement tier must be at least one bit");
        assert!(
            self.symb_bits + self.dsp1_bits <= 64,
            "quotient and displacement must pack into one slot cell"
        );
        assert!(
            self.max_factor >= 1 && self.max_factor <= 99,
            "max_factor must be a percentage in 1..=99"
        );

        let capa = Pow2::new(capa_bits);
        let symb = Pow2::new(self.symb_bits);
        HashTrie {
            hasher: SplitMix::new(capa_bits + self.symb_bits),
            table: CompactVector::new(capa.size(), self.symb_bits + self.dsp1_bits),
            aux_table: AuxTable::new(capa_bits, self.aux_capa_bits, self.dsp2_bits),
            aux_map: BTreeMap::new(),
            ids: CompactVector::with_fill(capa.size(), capa_bits, capa.mask()),
            size: 0,
            max_size: capa.size() * self.max_factor / 100,
            capa,
            symb,
            dsp1_bits: self.dsp1_bits,
            dsp1_mask: (1 << self.dsp1_bits) - 1,
            dsp2_mask: (1 << self.dsp2_bits) - 1,
            dsp2_bits: self.dsp2_bits,
            aux_capa_bits: self.aux_capa_bits,
            max_factor: self.max_factor,
        }
    }
}

/// Identity mapping over live node ids, produced by [`HashTrie::expand`].
///
/// Rehashing this trie moves slots but preserves every issued id, so the
/// old→new renaming is the identity on `[0, size)` and undefined beyond.
#[derive(Clone, Copy, Debug)]
pub struct ExpandMap {
    live: u64,
    old_capa: u64,
}

impl PosMap for ExpandMap {
    fn domain(&self) -> u64 {
        self.old_capa
    }

    fn renamed(&self, pos: u64) -> Option<u64> {
        (pos < self.live).then_some(pos)
    }
}

/// The compact hash trie.
///
/// Node ids are dense integers issued sequentially as children are
/// created; id 0 is the root and owns no slot. A slot whose stored child
/// id equals the all-ones capacity mask is empty, so no valid child id
/// ever equals `capa_size - 1` — the load bound keeps issuance short of
/// that value.
pub struct HashTrie {
    hasher: SplitMix,
    /// Per slot: `quotient << dsp1_bits | first-tier displacement`.
    table: CompactVector,
    /// Second-tier displacements, keyed by slot id.
    aux_table: AuxTable,
    /// Third-tier displacements, keyed by slot id.
    aux_map: BTreeMap<u64, u64>,
    /// Per slot: child id, or the capacity mask when empty.
    ids: CompactVector,
    size: u64,
    max_size: u64,
    capa: Pow2,
    symb: Pow2,
    dsp1_bits: u32,
    dsp1_mask: u64,
    dsp2_mask: u64,
    dsp2_bits: u32,
    aux_capa_bits: u32,
    max_factor: u64,
}

impl HashTrie {
    /// Creates a trie with the given capacity and alphabet widths and
    /// default displacement knobs.
    ///
    /// # Panics
    ///
    /// Panics on out-of-range widths, see [`HashTrieBuilder::build`].
    #[must_use]
    pub fn new(capa_bits: u32, symb_bits: u32) -> Self {
        Self::builder().capa_bits(capa_bits).symb_bits(symb_bits).build()
    }

    /// Returns a builder with default knobs.
    #[must_use]
    pub fn builder() -> HashTrieBuilder {
        HashTrieBuilder::default()
    }

    /// Returns the root id.
    ///
    /// # Panics
    ///
    /// Panics if [`add_root`](Self::add_root) has not been called.
    #[must_use]
    pub fn get_root(&self) -> u64 {
        assert!(self.size != 0, "root has not been added");
        0
    }

    /// Materializes the root node as id 0.
    ///
    /// The root owns no slot; it exists only as the first issued id.
    ///
    /// # Panics
    ///
    /// Panics if called more than once.
    pub fn add_root(&mut self) {
        assert!(self.size == 0, "root has already been added");
        self.size = 1;
    }

    /// Resolves the child of `node_id` along `symb`.
    ///
    /// Scans forward from the key's home slot; an empty slot ends the
    /// probe with `None`, a slot whose displacement equals the probe
    /// counter and whose quotient matches ends it with the stored id.
    #[must_use]
    pub fn find_child(&self, node_id: u64, symb: u64) -> Option<u64> {
        if self.size == 0 {
            return None;
        }
        debug_assert!(node_id < self.capa.size());
        debug_assert!(symb <= self.symb.mask());

        let (quo, home) = self.decompose(self.hasher.hash(self.make_key(node_id, symb)));
        let mut i = home;
        let mut cnt = 0;
        loop {
            let child_id = self.ids.get(i);
            if child_id == self.capa.mask() {
                return None;
            }
            if self.compare_dsp(i, cnt) && quo == self.quo_at(i) {
                return Some(child_id);
            }
            i = (i + 1) & self.capa.mask();
            cnt += 1;
        }
    }

    /// Follows the child of `node_id` along `symb`, creating it if absent.
    ///
    /// `node_id` is updated to the child id either way. Returns `true`
    /// when a new child was created, `false` when the edge already
    /// existed. Doubles the table first if the load bound is reached.
    ///
    /// # Panics
    ///
    /// Panics if the root has not been added.
    pub fn add_child(&mut self, node_id: &mut u64, symb: u64) -> bool {
        assert!(self.size != 0, "root must be added before children");
        debug_assert!(*node_id < self.capa.size());
        debug_assert!(symb <= self.symb.mask());

        if self.needs_to_expand() {
            // Ids survive the rehash, so `node_id` stays valid.
            let _ = self.expand();
        }

        let (quo, home) = self.decompose(self.hasher.hash(self.make_key(*node_id, symb)));
        let mut i = home;
        let mut cnt = 0;
        loop {
            let child_id = self.ids.get(i);
            if child_id == self.capa.mask() {
                self.update_slot(i, quo, cnt, self.size);
                *node_id = self.size;
                self.size += 1;
                return true;
            }
            if self.compare_dsp(i, cnt) && quo == self.quo_at(i) {
                *node_id = child_id;
                return false;
            }
            i = (i + 1) & self.capa.mask();
            cnt += 1;
        }
    }

    /// Returns `true` once the next insertion would trigger a rehash.
    #[must_use]
    pub fn needs_to_expand(&self) -> bool {
        self.size >= self.max_size
    }

    /// Doubles the slot array, rehashing every occupied slot.
    ///
    /// For each occupied slot the stored displacement recovers the home
    /// slot, and the inverse hash recovers the original key from
    /// `(quotient, home slot)`; the key is then re-inserted under the
    /// wider hash. Ids are carried over unchanged, and the rehash cannot
    /// produce duplicates, so insertion into the new table never probes
    /// for existing entries. The returned [`ExpandMap`] is handed to the
    /// label store so both containers grow in lock-step.
    pub fn expand(&mut self) -> ExpandMap {
        let old_capa = self.capa;
        let mut next = HashTrieBuilder {
            capa_bits: old_capa.bits() + 1,
            symb_bits: self.symb.bits(),
            dsp1_bits: self.dsp1_bits,
            dsp2_bits: self.dsp2_bits,
            aux_capa_bits: self.aux_capa_bits,
            max_factor: self.max_factor,
        }
        .build();

        for i in 0..old_capa.size() {
            let node_id = self.ids.get(i);
            if node_id == old_capa.mask() {
                continue;
            }
            let dsp = self.dsp_at(i);
            let home = if dsp <= i { i - dsp } else { old_capa.size() - (dsp - i) };
            let key = self
                .hasher
                .hash_inv((self.quo_at(i) << old_capa.bits()) | home);

            let (quo, new_home) = next.decompose(next.hasher.hash(key));
            let mut j = new_home;
            let mut cnt = 0;
            loop {
                if next.ids.get(j) == next.capa.mask() {
                    next.update_slot(j, quo, cnt, node_id);
                    break;
                }
                j = (j + 1) & next.capa.mask();
                cnt += 1;
            }
        }

        next.size = self.size;
        *self = next;
        ExpandMap {
            live: self.size,
            old_capa: old_capa.size(),
        }
    }

    /// Number of issued node ids, the root included.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Number of ids the current table may issue before rehashing.
    #[must_use]
    pub const fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Number of slots.
    #[must_use]
    pub const fn capa_size(&self) -> u64 {
        self.capa.size()
    }

    /// Slot count as a log₂.
    #[must_use]
    pub const fn capa_bits(&self) -> u32 {
        self.capa.bits()
    }

    /// Alphabet size.
    #[must_use]
    pub const fn symb_size(&self) -> u64 {
        self.symb.mask().wrapping_add(1)
    }

    /// Alphabet width in bits.
    #[must_use]
    pub const fn symb_bits(&self) -> u32 {
        self.symb.bits()
    }

    fn make_key(&self, node_id: u64, symb: u64) -> u64 {
        (node_id << self.symb.bits()) | symb
    }

    fn decompose(&self, hashed: u64) -> (u64, u64) {
        (hashed >> self.capa.bits(), hashed & self.capa.mask())
    }

    fn quo_at(&self, slot: u64) -> u64 {
        self.table.get(slot) >> self.dsp1_bits
    }

    /// Full displacement of an occupied slot through the tier chain.
    fn dsp_at(&self, slot: u64) -> u64 {
        let fast = self.table.get(slot) & self.dsp1_mask;
        if fast < self.dsp1_mask {
            return fast;
        }
        if let Some(rest) = self.aux_table.get(slot) {
            return rest + self.dsp1_mask;
        }
        *self
            .aux_map
            .get(&slot)
            .expect("saturated slot must have an overflow displacement")
    }

    /// Tier-aware displacement equality: resolves deeper tiers only when
    /// the probe counter could possibly live there, so the common case is
    /// a single integer compare on the slot field.
    fn compare_dsp(&self, slot: u64, cnt: u64) -> bool {
        let fast = self.table.get(slot) & self.dsp1_mask;
        if fast < self.dsp1_mask {
            return fast == cnt;
        }
        if cnt < self.dsp1_mask {
            return false;
        }
        if let Some(rest) = self.aux_table.get(slot) {
            return rest + self.dsp1_mask == cnt;
        }
        if cnt < self.dsp1_mask + self.dsp2_mask {
            return false;
        }
        *self
            .aux_map
            .get(&slot)
            .expect("saturated slot must have an overflow displacement")
            == cnt
    }

    /// Fills an empty slot with `(quo, dsp, node_id)`, spilling the
    /// displacement into the matching tier.
    fn update_slot(&mut self, slot: u64, quo: u64, dsp: u64, node_id: u64) {
        debug_assert_eq!(self.table.get(slot), 0);
        debug_assert!(quo <= self.symb.mask());
        // The capacity mask is the empty sentinel and must never be issued.
        debug_assert!(node_id < self.capa.mask());

        let mut cell = quo << self.dsp1_bits;
        if dsp < self.dsp1_mask {
            cell |= dsp;
        } else {
            cell |= self.dsp1_mask;
            let rest = dsp - self.dsp1_mask;
            if rest < self.dsp2_mask {
                self.aux_table.set(slot, rest);
            } else {
                self.aux_map.insert(slot, dsp);
            }
        }
        self.table.set(slot, cell);
        self.ids.set(slot, node_id);
    }
}

impl std::fmt::Debug for HashTrie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashTrie")
            .field("size", &self.size)
            .field("capa_bits", &self.capa.bits())
            .field("symb_bits", &self.symb.bits())
            .finish_non_exhaustive()
    }
}
