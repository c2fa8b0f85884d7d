//! Binding table keyed by interned strings.
//!
//! Used for globals, class methods, instance fields, enum variables and the
//! string interner itself. Keys are compared by handle identity, which is
//! content equality because every string is interned.

use super::heap::GcRef;
use super::value::Value;

const TABLE_MAX_LOAD: f64 = 0.75;
const MIN_CAPACITY: usize = 8;

#[derive(Debug, Clone, Copy)]
enum Bucket {
    Empty,
    Tombstone,
    Full { key: GcRef, hash: u32, value: Value },
}

/// Open-addressed, linearly probed hash table with tombstone deletion.
#[derive(Debug, Clone, Default)]
pub struct Table {
    buckets: Vec<Bucket>,
    /// Full buckets plus tombstones; drives the load factor.
    count: usize,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.buckets
            .iter()
            .filter(|b| matches!(b, Bucket::Full { .. }))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    pub fn get(&self, key: GcRef, hash: u32) -> Option<Value> {
        if self.buckets.is_empty() {
            return None;
        }
        match self.buckets[find_bucket(&self.buckets, key, hash)] {
            Bucket::Full { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Insert or overwrite. Returns true if the key was not present before.
    pub fn set(&mut self, key: GcRef, hash: u32, value: Value) -> bool {
        if (self.count + 1) as f64 > self.buckets.len() as f64 * TABLE_MAX_LOAD {
            let capacity = if self.buckets.len() < MIN_CAPACITY {
                MIN_CAPACITY
            } else {
                self.buckets.len() * 2
            };
            self.adjust_capacity(capacity);
        }

        let index = find_bucket(&self.buckets, key, hash);
        let bucket = &mut self.buckets[index];
        let is_new_key = !matches!(bucket, Bucket::Full { .. });
        if matches!(bucket, Bucket::Empty) {
            self.count += 1;
        }
        *bucket = Bucket::Full { key, hash, value };
        is_new_key
    }

    /// Remove a key, leaving a tombstone so later probes keep going.
    pub fn delete(&mut self, key: GcRef, hash: u32) -> bool {
        if self.buckets.is_empty() {
            return false;
        }
        let index = find_bucket(&self.buckets, key, hash);
        if !matches!(self.buckets[index], Bucket::Full { .. }) {
            return false;
        }
        self.buckets[index] = Bucket::Tombstone;
        true
    }

    /// Copy every entry into `dst`, overwriting keys it already has.
    pub fn add_all(&self, dst: &mut Table) {
        for (key, hash, value) in self.entries() {
            dst.set(key, hash, value);
        }
    }

    /// Look up an interned string by content. `text_of` resolves a key handle
    /// to its characters.
    pub fn find_interned<'a>(
        &self,
        chars: &str,
        hash: u32,
        text_of: impl Fn(GcRef) -> Option<&'a str>,
    ) -> Option<GcRef> {
        if self.buckets.is_empty() {
            return None;
        }
        let mask = self.buckets.len() - 1;
        let mut index = hash as usize & mask;
        loop {
            match self.buckets[index] {
                Bucket::Empty => return None,
                Bucket::Tombstone => {}
                Bucket::Full { key, hash: h, .. } => {
                    if h == hash && text_of(key) == Some(chars) {
                        return Some(key);
                    }
                }
            }
            index = (index + 1) & mask;
        }
    }

    /// Iterate live entries as `(key, hash, value)`.
    pub fn entries(&self) -> impl Iterator<Item = (GcRef, u32, Value)> + '_ {
        self.buckets.iter().filter_map(|bucket| match *bucket {
            Bucket::Full { key, hash, value } => Some((key, hash, value)),
            _ => None,
        })
    }

    fn adjust_capacity(&mut self, capacity: usize) {
        let old = std::mem::replace(&mut self.buckets, vec![Bucket::Empty; capacity]);
        self.count = 0;
        for bucket in old {
            if let Bucket::Full { key, hash, value } = bucket {
                let index = find_bucket(&self.buckets, key, hash);
                self.buckets[index] = Bucket::Full { key, hash, value };
                self.count += 1;
            }
        }
    }
}

/// Probe for `key`. Returns its bucket, or the first reusable bucket (the
/// earliest tombstone seen, else the terminating empty bucket).
fn find_bucket(buckets: &[Bucket], key: GcRef, hash: u32) -> usize {
    let mask = buckets.len() - 1;
    let mut index = hash as usize & mask;
    let mut tombstone = None;
    loop {
        match buckets[index] {
            Bucket::Empty => return tombstone.unwrap_or(index),
            Bucket::Tombstone => {
                if tombstone.is_none() {
                    tombstone = Some(index);
                }
            }
            Bucket::Full { key: k, .. } => {
                if k == key {
                    return index;
                }
            }
        }
        index = (index + 1) & mask;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::Heap;

    fn key(heap: &mut Heap, name: &str) -> (GcRef, u32) {
        let r = heap.intern(name);
        (r, heap.string_hash(r).unwrap())
    }

    #[test]
    fn test_set_reports_new_keys() {
        let mut heap = Heap::new();
        let (a, ha) = key(&mut heap, "a");
        let mut table = Table::new();
        assert!(table.set(a, ha, Value::Number(1.0)));
        assert!(!table.set(a, ha, Value::Number(2.0)));
        assert_eq!(table.get(a, ha), Some(Value::Number(2.0)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_get_missing_on_empty_table() {
        let mut heap = Heap::new();
        let (a, ha) = key(&mut heap, "a");
        let table = Table::new();
        assert_eq!(table.get(a, ha), None);
        assert_eq!(table.capacity(), 0);
    }

    #[test]
    fn test_delete_leaves_probe_chain_intact() {
        let mut heap = Heap::new();
        let mut table = Table::new();
        let keys: Vec<_> = (0..20).map(|i| key(&mut heap, &format!("k{}", i))).collect();
        for (i, (k, h)) in keys.iter().enumerate() {
            table.set(*k, *h, Value::Number(i as f64));
        }
        assert!(table.delete(keys[3].0, keys[3].1));
        assert!(!table.delete(keys[3].0, keys[3].1));
        for (i, (k, h)) in keys.iter().enumerate() {
            if i == 3 {
                assert_eq!(table.get(*k, *h), None);
            } else {
                assert_eq!(table.get(*k, *h), Some(Value::Number(i as f64)));
            }
        }
        // Re-inserting a deleted key counts as new.
        assert!(table.set(keys[3].0, keys[3].1, Value::Nil));
    }

    #[test]
    fn test_grows_at_three_quarters_load() {
        let mut heap = Heap::new();
        let mut table = Table::new();
        for i in 0..6 {
            let (k, h) = key(&mut heap, &format!("g{}", i));
            table.set(k, h, Value::Nil);
        }
        assert_eq!(table.capacity(), 8);
        let (k, h) = key(&mut heap, "g6");
        table.set(k, h, Value::Nil);
        assert_eq!(table.capacity(), 16);
        assert_eq!(table.len(), 7);
    }

    #[test]
    fn test_add_all_overwrites_destination() {
        let mut heap = Heap::new();
        let (a, ha) = key(&mut heap, "speak");
        let (b, hb) = key(&mut heap, "walk");
        let mut parent = Table::new();
        parent.set(a, ha, Value::Number(1.0));
        parent.set(b, hb, Value::Number(2.0));

        let mut child = Table::new();
        child.set(a, ha, Value::Number(10.0));
        parent.add_all(&mut child);

        assert_eq!(child.get(a, ha), Some(Value::Number(1.0)));
        assert_eq!(child.get(b, hb), Some(Value::Number(2.0)));
    }
}
