use super::*;

fn key(index: TriIndex) -> QueueKey {
  QueueKey::new(TileId::from_raw(0), index)
}

// =========================================================================
// Basic bookkeeping
// =========================================================================

#[test]
fn test_empty_queue() {
  let mut queue = BucketQueue::split_queue();
  assert!(queue.is_empty());
  assert_eq!(queue.resolution(), PRIORITY_RESOLUTION);
  assert_eq!(queue.peek_extreme(), None);
}

#[test]
fn test_split_queue_peeks_highest() {
  let mut queue = BucketQueue::split_queue();
  queue.insert(3, key(1), 3.0);
  queue.insert(200, key(2), 200.0);
  queue.insert(64, key(3), 64.0);
  assert_eq!(queue.len(), 3);
  assert_eq!(queue.peek_extreme(), Some((200, key(2))));
}

#[test]
fn test_merge_queue_peeks_lowest() {
  let mut queue = BucketQueue::merge_queue();
  queue.insert(130, key(1), 130.0);
  queue.insert(255, key(2), 255.0);
  queue.insert(65, key(3), 65.0);
  assert_eq!(queue.peek_extreme(), Some((65, key(3))));
}

#[test]
fn test_remove_updates_extreme() {
  let mut queue = BucketQueue::split_queue();
  let a = queue.insert(10, key(1), 10.0);
  let b = queue.insert(90, key(2), 90.0);
  assert_eq!(queue.remove(b), key(2));
  assert!(!queue.contains(b));
  assert_eq!(queue.peek_extreme(), Some((10, key(1))));
  queue.remove(a);
  assert!(queue.is_empty());
  assert_eq!(queue.peek_extreme(), None);
}

#[test]
fn test_remove_from_middle_of_bucket() {
  let mut queue = BucketQueue::split_queue();
  let a = queue.insert(5, key(1), 5.0);
  let b = queue.insert(5, key(2), 5.0);
  let c = queue.insert(5, key(3), 5.0);
  queue.remove(b);
  let mut keys: Vec<_> = queue.keys().map(|k| k.index).collect();
  keys.sort();
  assert_eq!(keys, vec![1, 3]);
  queue.remove(a);
  queue.remove(c);
  assert_eq!(queue.peek_extreme(), None);
}

#[test]
fn test_move_keeps_slot() {
  let mut queue = BucketQueue::split_queue();
  let a = queue.insert(10, key(1), 10.0);
  queue.insert(20, key(2), 20.0);
  queue.move_to(a, 250, 250.0);
  assert!(queue.contains(a));
  assert_eq!(queue.bucket(a), 250);
  assert_eq!(queue.key(a), key(1));
  assert_eq!(queue.peek_extreme(), Some((250, key(1))));
  assert_eq!(queue.len(), 2);
}

#[test]
fn test_slots_are_reused() {
  let mut queue = BucketQueue::split_queue();
  let a = queue.insert(1, key(1), 1.0);
  queue.remove(a);
  let b = queue.insert(2, key(2), 2.0);
  assert_eq!(a, b);
  assert_eq!(queue.key(b), key(2));
}

#[test]
fn test_reset_clears() {
  let mut queue = BucketQueue::merge_queue();
  for i in 1..20 {
    queue.insert(7, key(i), i as f32);
  }
  queue.peek_extreme();
  queue.reset();
  assert!(queue.is_empty());
  assert_eq!(queue.peek_extreme(), None);
  queue.insert(9, key(1), 9.0);
  assert_eq!(queue.peek_extreme(), Some((9, key(1))));
}

#[test]
#[should_panic]
fn test_double_remove_panics() {
  let mut queue = BucketQueue::split_queue();
  let a = queue.insert(1, key(1), 1.0);
  queue.remove(a);
  queue.remove(a);
}

#[test]
#[should_panic]
fn test_out_of_range_bucket_panics() {
  let mut queue = BucketQueue::split_queue();
  queue.insert(PRIORITY_RESOLUTION as u16, key(1), 0.0);
}

// =========================================================================
// Tie-breaking inside a bucket
// =========================================================================

#[test]
fn test_small_bucket_tie_break_by_scan() {
  let mut queue = BucketQueue::merge_queue();
  queue.insert(4, key(1), 4.75);
  queue.insert(4, key(2), 4.25);
  queue.insert(4, key(3), 4.5);
  assert_eq!(queue.peek_extreme(), Some((4, key(2))));
}

#[test]
fn test_large_bucket_tie_break_by_heap() {
  let mut queue = BucketQueue::merge_queue();
  let mut slots = Vec::new();
  for i in 0..32u32 {
    let fine = 12.0 + (i as f32 * 7.0 % 32.0) / 64.0;
    slots.push(queue.insert(12, key(i + 1), fine));
  }
  // Entry 1 has fine 12.0, the lowest.
  assert_eq!(queue.peek_extreme(), Some((12, key(1))));

  // Heap survives removals and moves of the top entry.
  queue.remove(slots[0]);
  let (_, next) = queue.peek_extreme().unwrap();
  let expected = (1..32u32)
    .min_by(|a, b| {
      let fa = (*a as f32 * 7.0) % 32.0;
      let fb = (*b as f32 * 7.0) % 32.0;
      fa.total_cmp(&fb)
    })
    .unwrap();
  assert_eq!(next, key(expected + 1));

  queue.move_to(slots[5], 12, 11.0);
  assert_eq!(queue.peek_extreme(), Some((12, key(6))));

  // A fresh insert below everything wins.
  queue.insert(12, key(99), 10.0);
  assert_eq!(queue.peek_extreme(), Some((12, key(99))));
}

#[test]
fn test_lower_bucket_beats_better_tie_break() {
  let mut queue = BucketQueue::merge_queue();
  for i in 0..16 {
    queue.insert(40, key(i + 1), 40.0);
  }
  queue.insert(41, key(100), 0.0);
  assert_eq!(queue.peek_extreme().map(|(b, _)| b), Some(40));
}
