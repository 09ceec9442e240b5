//! # Container Verification
//!
//! Growable arrays, id pools and bit sets, checked through the public API.
//!
//! Run with: cargo test --package kinetic_core --test container_properties

use kinetic_core::{BitSet, BitSetError, CollectionError, GrowableArray, IdPool};
use proptest::prelude::*;

// ============================================================================
// GROWABLE ARRAY
// ============================================================================

proptest! {
    #[test]
    fn growth_preserves_content(values in prop::collection::vec(any::<u64>(), 0..512)) {
        let mut array = GrowableArray::new();
        for &value in &values {
            array.push(value);
        }

        prop_assert_eq!(array.len(), values.len());
        prop_assert!(array.capacity() >= values.len());
        for (index, value) in values.iter().enumerate() {
            prop_assert_eq!(array.get(index), Ok(value));
        }
    }

    #[test]
    fn swap_remove_moves_last_into_hole(
        values in prop::collection::vec(any::<i32>(), 1..128),
        pick in any::<prop::sample::Index>(),
    ) {
        let index = pick.index(values.len());
        let last = values.len() - 1;

        let mut array = GrowableArray::new();
        array.extend_from_slice(&values);

        let removed = array.remove_swap(index).unwrap();
        prop_assert_eq!(removed.value, values[index]);
        prop_assert_eq!(array.len(), last);

        if index == last {
            prop_assert_eq!(removed.moved_from, None);
            prop_assert_eq!(array.as_slice(), &values[..last]);
        } else {
            prop_assert_eq!(removed.moved_from, Some(last));
            for (i, value) in array.iter().enumerate() {
                let expected = if i == index { values[last] } else { values[i] };
                prop_assert_eq!(*value, expected);
            }
        }
    }
}

#[test]
fn verify_out_of_range_access_fails() {
    let mut array = GrowableArray::new();
    array.push('a');

    assert_eq!(
        array.get(1),
        Err(CollectionError::IndexOutOfRange { index: 1, len: 1 })
    );
    assert!(array.set(5, 'z').is_err());
    assert!(array.remove_swap(1).is_err());
    assert_eq!(array.pop(), Some('a'));
    assert_eq!(array.pop(), None);
}

#[test]
fn verify_owned_elements_move_out() {
    let mut names = GrowableArray::new();
    names.push(String::from("ground"));
    names.push(String::from("box"));
    names.push(String::from("sphere"));

    let removed = names.remove_swap(0).unwrap();
    assert_eq!(removed.value, "ground");
    assert_eq!(names.as_slice(), ["sphere", "box"]);
    assert_eq!(names.byte_count(), None);

    let ids: GrowableArray<u32> = GrowableArray::with_capacity(10);
    assert_eq!(ids.byte_count(), Some(40));
}

// ============================================================================
// ID POOL
// ============================================================================

#[test]
fn verify_ids_are_recycled() {
    let mut pool = IdPool::new();
    assert_eq!(pool.allocate(), 0);
    pool.free(0);
    assert_eq!(pool.allocate(), 0);

    let mut pool = IdPool::new();
    assert_eq!(pool.allocate(), 0);
    assert_eq!(pool.allocate(), 1);
    assert_eq!(pool.allocate(), 2);
    pool.free(1);
    assert_eq!(pool.live_count(), 2);
    assert_eq!(pool.capacity(), 3);

    pool.validate_free_id(1);
    pool.validate_used_id(2);
}

proptest! {
    #[test]
    fn live_ids_stay_unique(ops in prop::collection::vec(any::<bool>(), 0..256)) {
        let mut pool = IdPool::new();
        let mut live: Vec<u32> = Vec::new();

        for allocate in ops {
            if allocate || live.is_empty() {
                let id = pool.allocate();
                prop_assert!(!live.contains(&id));
                live.push(id);
            } else if let Some(id) = live.pop() {
                pool.free(id);
            }
            prop_assert_eq!(pool.live_count(), live.len());
            prop_assert!(live.iter().all(|&id| id < pool.capacity()));
        }
    }
}

// ============================================================================
// BIT SET
// ============================================================================

#[test]
fn verify_bit_round_trip() {
    let mut bits = BitSet::new(100);
    bits.set_bit(37);
    assert!(bits.get_bit(37));
    assert!(!bits.get_bit(36));
    assert!(!bits.get_bit(38));

    let mut bits = BitSet::new(100);
    for index in [0, 37, 99] {
        bits.set_bit(index);
    }
    assert_eq!(bits.count_set_bits(), 3);
    assert_eq!(bits.iter_ones().collect::<Vec<_>>(), vec![0, 37, 99]);
}

#[test]
fn verify_out_of_range_bits_are_harmless() {
    let mut bits = BitSet::new(64);
    bits.clear_bit(1_000);
    assert!(!bits.get_bit(1_000));

    bits.set_bit_grow(1_000);
    assert!(bits.get_bit(1_000));
    assert!(bits.bit_capacity() > 1_000);
}

#[test]
fn verify_union_and_grow_contracts() {
    let mut a = BitSet::new(128);
    let b = BitSet::new(64);
    assert_eq!(
        a.in_place_union(&b),
        Err(BitSetError::BlockCountMismatch { left: 2, right: 1 })
    );
    assert_eq!(
        a.grow(2),
        Err(BitSetError::NonIncreasingGrow {
            current: 2,
            requested: 2
        })
    );

    let mut c = BitSet::new(128);
    a.set_bit(3);
    c.set_bit(100);
    a.in_place_union(&c).unwrap();
    assert_eq!(a.iter_ones().collect::<Vec<_>>(), vec![3, 100]);

    a.grow(4).unwrap();
    assert_eq!(a.block_count(), 4);
    assert!(a.get_bit(100));
    assert!(!a.get_bit(200));
}

proptest! {
    #[test]
    fn bit_set_matches_model(indices in prop::collection::btree_set(0usize..2_048, 0..64)) {
        let mut bits = BitSet::new(0);
        for &index in &indices {
            bits.set_bit_grow(index);
        }

        prop_assert_eq!(bits.count_set_bits(), indices.len());
        prop_assert!(bits.iter_ones().eq(indices.iter().copied()));

        bits.set_bit_count_and_clear(4_096);
        prop_assert_eq!(bits.count_set_bits(), 0);
        prop_assert!(bits.bit_capacity() >= 4_096);
    }
}
