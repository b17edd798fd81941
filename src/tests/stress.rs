use std::collections::hash_map::Entry;
use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::trie::HashTrie;
use crate::BonsaiMap;

/// 200 000 random edges, parents drawn from the live id range: every
/// recorded edge resolves to the id it was issued, and `size` accounts
/// for exactly the successful adds.
#[test]
fn two_hundred_thousand_random_edges() {
    let mut trie = HashTrie::new(16, 8);
    trie.add_root();

    let mut rng = StdRng::seed_from_u64(0xDEC0DE);
    let mut recorded: HashMap<(u64, u64), u64> = HashMap::with_capacity(250_000);
    let mut created_count = 0u64;

    for _ in 0..200_000 {
        let parent = rng.gen_range(0..trie.size());
        let symb = rng.gen_range(0..256u64);
        let mut id = parent;
        let created = trie.add_child(&mut id, symb);
        match recorded.entry((parent, symb)) {
            Entry::Occupied(e) => {
                assert!(!created, "duplicate edge created twice");
                assert_eq!(*e.get(), id, "duplicate edge changed id");
            }
            Entry::Vacant(e) => {
                assert!(created, "fresh edge reported as existing");
                e.insert(id);
                created_count += 1;
            }
        }
    }

    assert_eq!(trie.size(), created_count + 1);
    assert!(trie.capa_bits() >= 18, "this workload must cross two doublings");

    for (&(parent, symb), &id) in &recorded {
        assert_eq!(trie.find_child(parent, symb), Some(id));
    }
}

/// Driver stress: tens of thousands of random byte keys against a
/// hash-map model, straight through several rehashes.
#[test]
fn random_keys_against_model() {
    let mut map: BonsaiMap<u64> = BonsaiMap::<u64>::builder().max_factor(20).build();
    let mut model: HashMap<Vec<u8>, u64> = HashMap::new();

    let mut rng = StdRng::seed_from_u64(0xFEED);
    for i in 0..20_000u64 {
        let len = rng.gen_range(1..24);
        let key: Vec<u8> = (0..len).map(|_| rng.gen_range(1u8..=255)).collect();
        assert_eq!(map.insert(&key, i), model.insert(key, i));
    }
    assert_eq!(map.len(), model.len() as u64);

    for (key, &value) in &model {
        assert_eq!(map.get(key), Some(value));
    }

    // Absent keys with the same shape stay absent.
    for _ in 0..1_000 {
        let len = rng.gen_range(24..40);
        let key: Vec<u8> = (0..len).map(|_| rng.gen_range(1u8..=255)).collect();
        assert_eq!(map.get(&key), model.get(&key).copied());
    }
}
