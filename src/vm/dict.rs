//! Robin-Hood open-addressed dictionary backing user-facing `dict` values.
//!
//! Each occupied slot records its probe sequence length (PSL): the distance
//! from the slot its hash maps to. Insertion displaces any occupant that is
//! closer to home than the element being placed, and lookup stops as soon as
//! it meets an occupant closer to home than the current probe distance.
//!
//! Entries are never removed, so the table only grows.

use super::value::Value;

const DICT_MAX_LOAD: f64 = 0.75;
const MIN_CAPACITY: usize = 8;

#[derive(Debug, Clone, Copy)]
struct DictEntry {
    key: Value,
    value: Value,
    hash: u32,
    psl: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Dict {
    entries: Vec<Option<DictEntry>>,
    count: usize,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// `capacity - 1`; capacity is always a power of two.
    fn mask(&self) -> usize {
        self.entries.len().wrapping_sub(1)
    }

    pub fn get(&self, key: Value, hash: u32) -> Option<Value> {
        if self.count == 0 {
            return None;
        }
        let mask = self.mask();
        let mut index = hash as usize & mask;
        let mut psl = 0u32;
        loop {
            match &self.entries[index] {
                None => return None,
                Some(entry) if psl > entry.psl => return None,
                Some(entry) if entry.key == key => return Some(entry.value),
                Some(_) => {}
            }
            index = (index + 1) & mask;
            psl += 1;
        }
    }

    /// Upsert. Returns true if the key was not present before.
    pub fn set(&mut self, key: Value, hash: u32, value: Value) -> bool {
        if (self.count + 1) as f64 > self.entries.len() as f64 * DICT_MAX_LOAD {
            let capacity = if self.entries.len() < MIN_CAPACITY {
                MIN_CAPACITY
            } else {
                self.entries.len() * 2
            };
            self.adjust_capacity(capacity);
        }
        self.insert(DictEntry {
            key,
            value,
            hash,
            psl: 0,
        })
    }

    /// Live `(key, value)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Value, Value)> + '_ {
        self.entries
            .iter()
            .flatten()
            .map(|entry| (entry.key, entry.value))
    }

    fn insert(&mut self, mut entry: DictEntry) -> bool {
        let mask = self.mask();
        let mut index = entry.hash as usize & mask;
        let mut displaced = false;
        loop {
            let slot = &mut self.entries[index];
            if slot.is_none() {
                *slot = Some(entry);
                self.count += 1;
                return true;
            }
            if let Some(occupant) = slot {
                if !displaced && occupant.key == entry.key {
                    occupant.value = entry.value;
                    return false;
                }
                // Rob from the rich: the element further from home takes the
                // slot and the occupant continues probing.
                if entry.psl > occupant.psl {
                    std::mem::swap(occupant, &mut entry);
                    displaced = true;
                }
            }
            index = (index + 1) & mask;
            entry.psl += 1;
        }
    }

    fn adjust_capacity(&mut self, capacity: usize) {
        let old = std::mem::replace(&mut self.entries, vec![None; capacity]);
        self.count = 0;
        for mut entry in old.into_iter().flatten() {
            entry.psl = 0;
            self.insert(entry);
        }
    }
}
