//! A small LRU cache keyed by recency tick rather than wall-clock time.
//!
//! Ported from the original's `SmallLruCache`: linear-scan `get`/`put`,
//! appropriate only for the small capacities this crate uses it at (a
//! handful of recent rounds' justifications, per `spec.md` §5's note that
//! the core avoids wall-clock-timestamped caches so replay and tests stay
//! deterministic). `ticks` is a monotonic counter bumped on every access; on
//! overflow the entries are re-stamped in recency order rather than reset,
//! so relative ordering survives wraparound.

struct CacheEntry<K, V> {
  key: K,
  value: V,
  latest_use_tick: u64,
}

pub struct SmallLruCache<K, V> {
  max_size: usize,
  ticks: u64,
  entries: Vec<CacheEntry<K, V>>,
}

impl<K: PartialEq, V> SmallLruCache<K, V> {
  pub fn new(max_size: usize) -> Self {
    assert!(max_size > 0);
    Self { max_size, ticks: 0, entries: Vec::with_capacity(max_size) }
  }

  pub fn get(&mut self, key: &K) -> Option<&V> {
    self.bump_ticks();
    let tick = self.ticks;
    let entry = self.entries.iter_mut().find(|entry| &entry.key == key)?;
    entry.latest_use_tick = tick;
    Some(&entry.value)
  }

  pub fn put(&mut self, key: K, value: V) -> &V {
    self.bump_ticks();
    if self.entries.len() >= self.max_size {
      let oldest = self
        .entries
        .iter()
        .enumerate()
        .min_by_key(|(_, entry)| entry.latest_use_tick)
        .map(|(index, _)| index);
      if let Some(index) = oldest {
        self.entries.remove(index);
      }
    }
    self.entries.push(CacheEntry { key, value, latest_use_tick: self.ticks });
    &self.entries.last().unwrap().value
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  fn bump_ticks(&mut self) {
    self.ticks = self.ticks.wrapping_add(1);
    if self.ticks == 0 {
      self.compress_ticks();
    }
  }

  /// Re-stamps every entry's tick in recency order, starting back from 1.
  /// Correct because only relative order matters, never the tick's
  /// absolute value.
  fn compress_ticks(&mut self) {
    self.entries.sort_by_key(|entry| entry.latest_use_tick);
    let mut tick = 0u64;
    for entry in &mut self.entries {
      tick = tick.wrapping_add(1);
      entry.latest_use_tick = tick;
    }
    self.ticks = tick;
  }
}
