//! Property tests for the binary heap.
//!
//! After any sequence of push / pop / replace / push_pop / update_priority
//! the heap property holds at every index, the stored entries match a plain
//! multiset model, and draining yields non-decreasing priorities.

use nebula_collections::prelude::*;
use proptest::prelude::*;
use rstest::rstest;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Op {
    Push(i32),
    Pop,
    Replace(i32),
    PushPop(i32),
    Update(usize, i32),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (-50i32..50).prop_map(Op::Push),
        1 => Just(Op::Pop),
        1 => (-50i32..50).prop_map(Op::Replace),
        1 => (-50i32..50).prop_map(Op::PushPop),
        1 => (any::<usize>(), -50i32..50).prop_map(|(k, p)| Op::Update(k, p)),
    ]
}

fn assert_heap_property(entries: &[HeapEntry<u32, i32>]) {
    for i in 1..entries.len() {
        let parent = (i - 1) / 2;
        assert!(
            entries[parent].priority <= entries[i].priority,
            "heap property broken at {i}: {entries:?}"
        );
    }
}

fn sorted(mut entries: Vec<(u32, i32)>) -> Vec<(u32, i32)> {
    entries.sort_unstable();
    entries
}

fn snapshot(heap: &Heap<u32, i32>) -> Vec<(u32, i32)> {
    heap.to_vec()
        .unwrap()
        .into_iter()
        .map(|e| (e.value, e.priority))
        .collect()
}

fn drain_priorities(heap: &mut Heap<u32, i32>) -> Vec<i32> {
    let mut out = Vec::new();
    while let Some(entry) = heap.try_pop().unwrap() {
        out.push(entry.priority);
    }
    out
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn heap_property_holds_after_every_operation(ops in proptest::collection::vec(op(), 1..80)) {
        let mut heap: Heap<u32, i32> = Heap::new(0, AllocatorTag::Temp).unwrap();
        // Values are unique ids so the model can follow individual entries.
        let mut model: Vec<(u32, i32)> = Vec::new();
        let mut next_id = 0u32;

        for op in ops {
            match op {
                Op::Push(priority) => {
                    heap.push(next_id, priority).unwrap();
                    model.push((next_id, priority));
                    next_id += 1;
                }
                Op::Pop => {
                    let min = model.iter().map(|e| e.1).min();
                    match heap.try_pop().unwrap() {
                        Some(entry) => {
                            prop_assert_eq!(Some(entry.priority), min);
                            let pos = model.iter().position(|e| e.0 == entry.value).unwrap();
                            model.swap_remove(pos);
                        }
                        None => prop_assert!(model.is_empty()),
                    }
                }
                Op::Replace(priority) => {
                    let min = model.iter().map(|e| e.1).min();
                    match heap.replace(next_id, priority) {
                        Ok(old) => {
                            let pos = model.iter().position(|e| e.0 == old).unwrap();
                            prop_assert_eq!(Some(model[pos].1), min);
                            model.swap_remove(pos);
                            model.push((next_id, priority));
                            next_id += 1;
                        }
                        Err(err) => {
                            prop_assert!(model.is_empty());
                            prop_assert_eq!(err, CollectionError::IndexOutOfRange { index: 0, len: 0 });
                        }
                    }
                }
                Op::PushPop(priority) => {
                    let out = heap.push_pop(next_id, priority).unwrap();
                    let min = model.iter().map(|e| e.1).min().map_or(priority, |m| m.min(priority));
                    prop_assert_eq!(out.priority, min);
                    if out.value != next_id {
                        let pos = model.iter().position(|e| e.0 == out.value).unwrap();
                        model.swap_remove(pos);
                        model.push((next_id, priority));
                    }
                    next_id += 1;
                }
                Op::Update(k, priority) => {
                    if model.is_empty() {
                        prop_assert!(!heap.update_priority(&next_id, priority).unwrap());
                    } else {
                        let target = model[k % model.len()].0;
                        prop_assert!(heap.update_priority(&target, priority).unwrap());
                        let pos = model.iter().position(|e| e.0 == target).unwrap();
                        model[pos].1 = priority;
                    }
                }
            }

            assert_heap_property(&heap.to_vec().unwrap());
            prop_assert_eq!(sorted(snapshot(&heap)), sorted(model.clone()));
        }

        let drained = drain_priorities(&mut heap);
        prop_assert!(drained.windows(2).all(|w| w[0] <= w[1]));
        heap.dispose().unwrap();
    }

    #[test]
    fn pop_order_is_independent_of_insertion_order(
        priorities in proptest::collection::vec(-1000i32..1000, 0..64).prop_shuffle(),
    ) {
        let mut heap: Heap<u32, i32> = Heap::new(4, AllocatorTag::Temp).unwrap();
        for (id, &p) in priorities.iter().enumerate() {
            heap.push(id as u32, p).unwrap();
        }

        let mut expected = priorities.clone();
        expected.sort_unstable();
        prop_assert_eq!(drain_priorities(&mut heap), expected);
        let exhausted = matches!(heap.pop(), Err(CollectionError::EmptyContainer { .. }));
        prop_assert!(exhausted);
        heap.dispose().unwrap();
    }

    #[test]
    fn from_entries_matches_repeated_push(
        priorities in proptest::collection::vec(-100i32..100, 0..64),
    ) {
        let entries: Vec<_> = priorities
            .iter()
            .enumerate()
            .map(|(id, &p)| HeapEntry::new(id as u32, p))
            .collect();

        let mut built = Heap::from_entries(&entries, AllocatorTag::Temp).unwrap();
        assert_heap_property(&built.to_vec().unwrap());

        let mut pushed: Heap<u32, i32> = Heap::new(0, AllocatorTag::Temp).unwrap();
        for entry in &entries {
            pushed.push(entry.value, entry.priority).unwrap();
        }

        prop_assert_eq!(drain_priorities(&mut built), drain_priorities(&mut pushed));
        built.dispose().unwrap();
        pushed.dispose().unwrap();
    }

    #[test]
    fn to_array_returns_the_live_multiset(
        pushes in proptest::collection::vec(-100i32..100, 0..48),
        pops in 0usize..48,
    ) {
        let mut heap: Heap<u32, i32> = Heap::new(0, AllocatorTag::Temp).unwrap();
        let mut remaining: Vec<(u32, i32)> = Vec::new();
        for (id, &p) in pushes.iter().enumerate() {
            heap.push(id as u32, p).unwrap();
            remaining.push((id as u32, p));
        }
        for _ in 0..pops {
            if let Some(entry) = heap.try_pop().unwrap() {
                let pos = remaining.iter().position(|e| e.0 == entry.value).unwrap();
                remaining.swap_remove(pos);
            }
        }

        let mut array = heap.to_array(AllocatorTag::Temp).unwrap();
        prop_assert_eq!(array.len(), remaining.len());
        let exported: Vec<(u32, i32)> = array
            .to_vec()
            .unwrap()
            .into_iter()
            .map(|e| (e.value, e.priority))
            .collect();
        prop_assert_eq!(sorted(exported), sorted(remaining));
        array.dispose().unwrap();
        heap.dispose().unwrap();
    }
}

// ---------------------------------------------------------------------------
// Concrete scenarios
// ---------------------------------------------------------------------------

#[rstest]
#[case::mixed_pushes(&[6, 1, 4, 2, 5], &[1, 2, 4, 5, 6])]
#[case::already_sorted(&[1, 2, 3], &[1, 2, 3])]
#[case::reversed(&[3, 2, 1], &[1, 2, 3])]
#[case::duplicates(&[2, 2, 1, 2], &[1, 2, 2, 2])]
fn pop_sequence(#[case] pushes: &[i32], #[case] expected: &[i32]) {
    let mut heap: Heap<i32, i32> = Heap::new(0, AllocatorTag::Temp).unwrap();
    for &p in pushes {
        heap.push(p, p).unwrap();
    }
    let popped: Vec<i32> = (0..pushes.len()).map(|_| heap.pop().unwrap().value).collect();
    assert_eq!(popped, expected);
    heap.dispose().unwrap();
}

#[test]
fn replace_removes_root_and_inserts_new_entry() {
    let mut heap: Heap<i32, i32> = Heap::new(0, AllocatorTag::Temp).unwrap();
    for p in [3, 1, 4, 5, 2] {
        heap.push(p, p).unwrap();
    }
    assert_eq!(heap.replace(7, 7), Ok(1));
    let popped: Vec<i32> = (0..5).map(|_| heap.pop().unwrap().value).collect();
    assert_eq!(popped, vec![2, 3, 4, 5, 7]);
    heap.dispose().unwrap();
}

#[test]
fn push_pop_on_empty_heap_returns_input() {
    let mut heap: Heap<i32, i32> = Heap::new(0, AllocatorTag::Temp).unwrap();
    assert_eq!(heap.push_pop(3, 3), Ok(HeapEntry::new(3, 3)));
    assert_eq!(heap.len(), Ok(0));
    heap.dispose().unwrap();
}
