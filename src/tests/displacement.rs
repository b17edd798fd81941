use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::trie::HashTrie;

/// Inserts random `(parent, symb)` edges, checking redundant adds against
/// the recorded ids, then verifies every edge resolves.
fn fill_and_verify(mut trie: HashTrie, target_size: u64, seed: u64) {
    trie.add_root();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut recorded: HashMap<(u64, u64), u64> = HashMap::new();

    while trie.size() < target_size {
        let parent = rng.gen_range(0..trie.size());
        let symb = rng.gen_range(0..256u64);
        let mut id = parent;
        let created = trie.add_child(&mut id, symb);
        match recorded.entry((parent, symb)) {
            std::collections::hash_map::Entry::Occupied(e) => {
                assert!(!created, "edge {:?} was created twice", (parent, symb));
                assert_eq!(*e.get(), id);
            }
            std::collections::hash_map::Entry::Vacant(e) => {
                assert!(created);
                e.insert(id);
            }
        }
    }

    for (&(parent, symb), &id) in &recorded {
        assert_eq!(
            trie.find_child(parent, symb),
            Some(id),
            "edge {:?} lost",
            (parent, symb)
        );
    }
}

/// One-bit tiers push most displacements into the side table and the
/// overflow map; every lookup must resolve through them.
#[test]
fn narrow_tiers_resolve_all_edges() {
    let trie = HashTrie::builder()
        .capa_bits(16)
        .symb_bits(8)
        .dsp1_bits(1)
        .dsp2_bits(1)
        .max_factor(90)
        .build();
    fill_and_verify(trie, 50_000, 0x5EED_01);
}

/// Default tiers under heavy load exercise the side table.
#[test]
fn default_tiers_near_load_bound() {
    let trie = HashTrie::builder()
        .capa_bits(16)
        .symb_bits(8)
        .max_factor(80)
        .build();
    fill_and_verify(trie, 52_000, 0x5EED_02);
}

/// Rehashing must reconstruct keys from slots whose displacement lives in
/// the deeper tiers.
#[test]
fn narrow_tiers_survive_expansion() {
    let mut trie = HashTrie::builder()
        .capa_bits(16)
        .symb_bits(8)
        .dsp1_bits(1)
        .dsp2_bits(1)
        .max_factor(50)
        .build();
    trie.add_root();
    let mut rng = StdRng::seed_from_u64(0x5EED_03);
    let mut recorded: HashMap<(u64, u64), u64> = HashMap::new();

    // 50% of 2^16 is 32768; run past it to force one doubling.
    while trie.size() < 40_000 {
        let parent = rng.gen_range(0..trie.size());
        let symb = rng.gen_range(0..256u64);
        let mut id = parent;
        if trie.add_child(&mut id, symb) {
            recorded.insert((parent, symb), id);
        }
    }
    assert_eq!(trie.capa_bits(), 17, "expected exactly one doubling");

    for (&(parent, symb), &id) in &recorded {
        assert_eq!(trie.find_child(parent, symb), Some(id));
    }
}
