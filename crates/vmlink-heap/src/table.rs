//! Tables: an array part for keys `1..=n` plus an insertion-ordered hash
//! part. Only the `__index` metamethod (table chains) is honoured.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::value::HeapValue;

const READONLY: &str = "attempt to modify a readonly table";
const MAX_INDEX_CHAIN: usize = 100;

/// Normalized hash key. Floats with an exact integer value hash as integers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum HashKey {
    Boolean(bool),
    Integer(i64),
    Number(u64),
    Vector([u32; 3]),
    Bytes(Arc<[u8]>),
    LightUserData(usize),
    Identity(usize),
}

fn key_of(key: &HeapValue) -> Result<HashKey, String> {
    Ok(match key {
        HeapValue::Nil => return Err("table index is nil".into()),
        HeapValue::Boolean(b) => HashKey::Boolean(*b),
        HeapValue::Integer(i) => HashKey::Integer(*i),
        HeapValue::Number(n) if n.is_nan() => return Err("table index is NaN".into()),
        HeapValue::Number(n) => {
            if n.fract() == 0.0 && *n >= i64::MIN as f64 && *n < i64::MAX as f64 {
                HashKey::Integer(*n as i64)
            } else {
                HashKey::Number(n.to_bits())
            }
        }
        HeapValue::Vector(v) => HashKey::Vector(v.map(f32::to_bits)),
        HeapValue::String(s) => HashKey::Bytes(s.clone()),
        HeapValue::LightUserData(p) => HashKey::LightUserData(*p),
        HeapValue::Other => return Err("invalid table index".into()),
        other => HashKey::Identity(other.identity().unwrap_or_default()),
    })
}

#[derive(Default)]
struct TableData {
    array: Vec<HeapValue>,
    hash: IndexMap<HashKey, (HeapValue, HeapValue)>,
    metatable: Option<Arc<TableObj>>,
    readonly: bool,
    safeenv: bool,
}

impl TableData {
    fn array_slot(&self, key: &HashKey) -> Option<usize> {
        match key {
            HashKey::Integer(i) if *i >= 1 && (*i as u64) <= self.array.len() as u64 => Some(*i as usize - 1),
            _ => None,
        }
    }

    fn check_writable(&self) -> Result<(), String> {
        if self.readonly {
            return Err(READONLY.into());
        }
        Ok(())
    }

    fn raw_get(&self, key: &HeapValue) -> HeapValue {
        let Ok(key) = key_of(key) else {
            return HeapValue::Nil;
        };
        if let Some(slot) = self.array_slot(&key) {
            return self.array[slot].clone();
        }
        self.hash.get(&key).map(|(_, v)| v.clone()).unwrap_or_default()
    }

    fn trim(&mut self) {
        while matches!(self.array.last(), Some(HeapValue::Nil)) {
            self.array.pop();
        }
    }

    /// Move hash entries continuing the array part into it.
    fn migrate(&mut self) {
        loop {
            let next = HashKey::Integer(self.array.len() as i64 + 1);
            match self.hash.shift_remove(&next) {
                Some((_, value)) => self.array.push(value),
                None => break,
            }
        }
    }

    fn raw_set(&mut self, key: HeapValue, value: HeapValue) -> Result<(), String> {
        self.check_writable()?;
        let hashed = key_of(&key)?;
        if let Some(slot) = self.array_slot(&hashed) {
            self.array[slot] = value;
            self.trim();
            return Ok(());
        }
        if hashed == HashKey::Integer(self.array.len() as i64 + 1) && !value.is_nil() {
            self.array.push(value);
            self.migrate();
            return Ok(());
        }
        if value.is_nil() {
            self.hash.shift_remove(&hashed);
        } else {
            self.hash.insert(hashed, (key, value));
        }
        Ok(())
    }

    fn push(&mut self, value: HeapValue) -> Result<(), String> {
        self.check_writable()?;
        if value.is_nil() {
            return Ok(());
        }
        self.array.push(value);
        self.migrate();
        Ok(())
    }

    fn pop(&mut self) -> Result<HeapValue, String> {
        self.check_writable()?;
        let value = self.array.pop().unwrap_or_default();
        self.trim();
        Ok(value)
    }
}

pub struct TableObj {
    data: Mutex<TableData>,
}

impl TableObj {
    pub fn new(narr: usize, nrec: usize) -> Self {
        TableObj {
            data: Mutex::new(TableData {
                array: Vec::with_capacity(narr),
                hash: IndexMap::with_capacity(nrec),
                ..Default::default()
            }),
        }
    }

    pub fn raw_get(&self, key: &HeapValue) -> HeapValue {
        self.data.lock().raw_get(key)
    }

    /// Lookup following `__index` tables on miss.
    pub fn get(&self, key: &HeapValue) -> Result<HeapValue, String> {
        let mut value = self.raw_get(key);
        let mut next = self.index_fallback();
        let mut depth = 0;
        while value.is_nil() {
            let Some(table) = next else {
                break;
            };
            depth += 1;
            if depth > MAX_INDEX_CHAIN {
                return Err("'__index' chain too long; possible loop".into());
            }
            value = table.raw_get(key);
            next = table.index_fallback();
        }
        Ok(value)
    }

    fn index_fallback(&self) -> Option<Arc<TableObj>> {
        let mt = self.data.lock().metatable.clone()?;
        match mt.raw_get(&HeapValue::String(Arc::from(&b"__index"[..]))) {
            HeapValue::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn raw_set(&self, key: HeapValue, value: HeapValue) -> Result<(), String> {
        self.data.lock().raw_set(key, value)
    }

    pub fn contains_key(&self, key: &HeapValue) -> Result<bool, String> {
        Ok(!self.get(key)?.is_nil())
    }

    pub fn raw_len(&self) -> usize {
        self.data.lock().array.len()
    }

    pub fn is_empty(&self) -> bool {
        let data = self.data.lock();
        data.array.is_empty() && data.hash.is_empty()
    }

    pub fn push(&self, value: HeapValue) -> Result<(), String> {
        self.data.lock().push(value)
    }

    pub fn pop(&self) -> Result<HeapValue, String> {
        self.data.lock().pop()
    }

    pub fn raw_insert(&self, idx: i64, value: HeapValue) -> Result<(), String> {
        let mut data = self.data.lock();
        data.check_writable()?;
        let len = data.array.len() as i64;
        if idx < 1 || idx > len + 1 {
            return Err(format!("index {} out of bounds", idx));
        }
        data.array.insert(idx as usize - 1, value);
        data.trim();
        data.migrate();
        Ok(())
    }

    pub fn raw_remove(&self, key: &HeapValue) -> Result<(), String> {
        let mut data = self.data.lock();
        data.check_writable()?;
        let hashed = key_of(key)?;
        if let Some(slot) = data.array_slot(&hashed) {
            data.array.remove(slot);
            data.trim();
        } else {
            data.hash.shift_remove(&hashed);
        }
        Ok(())
    }

    pub fn clear(&self) -> Result<(), String> {
        let mut data = self.data.lock();
        data.check_writable()?;
        data.array.clear();
        data.hash.clear();
        Ok(())
    }

    pub fn is_readonly(&self) -> bool {
        self.data.lock().readonly
    }

    pub fn set_readonly(&self, enabled: bool) {
        self.data.lock().readonly = enabled;
    }

    pub fn is_safeenv(&self) -> bool {
        self.data.lock().safeenv
    }

    pub fn set_safeenv(&self, enabled: bool) {
        self.data.lock().safeenv = enabled;
    }

    pub fn metatable(&self) -> Option<Arc<TableObj>> {
        self.data.lock().metatable.clone()
    }

    pub fn set_metatable(&self, mt: Option<Arc<TableObj>>) -> Result<(), String> {
        let mut data = self.data.lock();
        data.check_writable()?;
        data.metatable = mt;
        Ok(())
    }

    /// Snapshot of every entry: array part in order, then hash part in
    /// insertion order.
    pub fn entries(&self) -> Vec<(HeapValue, HeapValue)> {
        let data = self.data.lock();
        let array = data
            .array
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_nil())
            .map(|(i, v)| (HeapValue::Integer(i as i64 + 1), v.clone()));
        let hash = data.hash.values().map(|(k, v)| (k.clone(), v.clone()));
        array.chain(hash).collect()
    }

    /// Array part in order, skipping holes.
    pub fn array_values(&self) -> Vec<HeapValue> {
        let data = self.data.lock();
        data.array.iter().filter(|v| !v.is_nil()).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i64) -> HeapValue {
        HeapValue::Integer(i)
    }

    fn as_int(v: &HeapValue) -> Option<i64> {
        match v {
            HeapValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    #[test]
    fn test_push_pop_border() {
        let t = TableObj::new(0, 0);
        for i in 1..=3 {
            t.push(int(i)).unwrap();
        }
        assert_eq!(t.raw_len(), 3);
        assert_eq!(as_int(&t.pop().unwrap()), Some(3));
        assert_eq!(as_int(&t.pop().unwrap()), Some(2));
        assert_eq!(as_int(&t.pop().unwrap()), Some(1));
        assert!(t.pop().unwrap().is_nil());
        assert!(t.is_empty());
    }

    #[test]
    fn test_hash_part_migrates_into_array() {
        let t = TableObj::new(0, 0);
        t.raw_set(int(2), int(20)).unwrap();
        assert_eq!(t.raw_len(), 0);
        t.raw_set(HeapValue::Number(1.0), int(10)).unwrap();
        assert_eq!(t.raw_len(), 2);
        assert_eq!(as_int(&t.raw_get(&int(2))), Some(20));
    }

    #[test]
    fn test_invalid_keys() {
        let t = TableObj::new(0, 0);
        assert!(t.raw_set(HeapValue::Nil, int(1)).is_err());
        assert!(t.raw_set(HeapValue::Number(f64::NAN), int(1)).is_err());
        assert!(t.raw_get(&HeapValue::Nil).is_nil());
    }

    #[test]
    fn test_insert_remove() {
        let t = TableObj::new(0, 0);
        t.push(int(1)).unwrap();
        t.push(int(3)).unwrap();
        t.raw_insert(2, int(2)).unwrap();
        assert!(t.raw_insert(9, int(9)).is_err());
        let values: Vec<_> = t.array_values().iter().filter_map(as_int).collect();
        assert_eq!(values, vec![1, 2, 3]);
        t.raw_remove(&int(1)).unwrap();
        let values: Vec<_> = t.array_values().iter().filter_map(as_int).collect();
        assert_eq!(values, vec![2, 3]);
    }

    #[test]
    fn test_array_values_skip_holes() {
        let t = TableObj::new(0, 0);
        for i in 1..=3 {
            t.push(int(i)).unwrap();
        }
        t.raw_set(int(2), HeapValue::Nil).unwrap();
        assert_eq!(t.raw_len(), 3);
        let values: Vec<_> = t.array_values().iter().map(as_int).collect();
        assert_eq!(values, vec![Some(1), Some(3)]);
    }

    #[test]
    fn test_readonly() {
        let t = TableObj::new(0, 0);
        t.set_readonly(true);
        assert_eq!(t.push(int(1)), Err(READONLY.to_string()));
        assert!(t.clear().is_err());
        t.set_readonly(false);
        t.push(int(1)).unwrap();
    }

    #[test]
    fn test_index_chain() {
        let base = Arc::new(TableObj::new(0, 0));
        base.raw_set(HeapValue::String(Arc::from(&b"x"[..])), int(7)).unwrap();
        let mt = Arc::new(TableObj::new(0, 0));
        mt.raw_set(HeapValue::String(Arc::from(&b"__index"[..])), HeapValue::Table(base)).unwrap();
        let t = TableObj::new(0, 0);
        t.set_metatable(Some(mt)).unwrap();

        let key = HeapValue::String(Arc::from(&b"x"[..]));
        assert!(t.raw_get(&key).is_nil());
        assert_eq!(as_int(&t.get(&key).unwrap()), Some(7));
        assert!(t.contains_key(&key).unwrap());
    }
}
