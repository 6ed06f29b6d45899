use std::cmp::Ordering;

use bytes::Bytes;

use super::{compare_keys, Pair, Stream};
use crate::error::Result;
use crate::value::{Order, Value};

/// In-memory stream. Pairs may be inserted in any order; they are sorted
/// when the table is opened, and a later insert of an existing key
/// replaces the earlier value.
pub struct MemTable {
    order: Order,
    pairs: Vec<Pair>,
    sorted: bool,
    pos: usize,
}

impl MemTable {
    pub fn new(order: Order) -> Self {
        Self {
            order,
            pairs: Vec::new(),
            sorted: true,
            pos: 0,
        }
    }

    pub fn insert(&mut self, key: Value, value: impl Into<Bytes>) {
        self.pairs.push(Pair::new(key, value));
        self.sorted = false;
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    fn sort(&mut self) {
        if self.sorted {
            return;
        }
        let order = self.order;
        // Stable, so among equal keys the last insert ends up last.
        self.pairs.sort_by(|a, b| compare_keys(&a.key, &b.key, order));
        let mut out: Vec<Pair> = Vec::with_capacity(self.pairs.len());
        for p in self.pairs.drain(..) {
            match out.last_mut() {
                Some(last) if compare_keys(&last.key, &p.key, order) == Ordering::Equal => *last = p,
                _ => out.push(p),
            }
        }
        self.pairs = out;
        self.sorted = true;
    }
}

impl Stream for MemTable {
    fn open(&mut self) -> Result<()> {
        self.sort();
        self.pos = 0;
        Ok(())
    }

    fn read(&mut self) -> Result<Option<Pair>> {
        let p = self.pairs.get(self.pos).cloned();
        if p.is_some() {
            self.pos += 1;
        }
        Ok(p)
    }

    fn close(&mut self) -> Result<()> {
        self.pos = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combiner::read_all;

    #[test]
    fn test_sorts_and_replaces() {
        let mut t = MemTable::new(Order::Asc);
        t.insert(Value::string("b"), &b"1"[..]);
        t.insert(Value::string("a"), &b"2"[..]);
        t.insert(Value::string("b"), &b"3"[..]);
        let got = read_all(&mut t).unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].key, Value::string("a"));
        assert_eq!(&got[1].value[..], b"3");
    }

    #[test]
    fn test_descending_and_reopen() {
        let mut t = MemTable::new(Order::Desc);
        for k in [1, 3, 2] {
            t.insert(Value::int64(k), Bytes::new());
        }
        let keys: Vec<i64> = read_all(&mut t)
            .unwrap()
            .iter()
            .map(|p| p.key.as_int().unwrap())
            .collect();
        assert_eq!(keys, vec![3, 2, 1]);
        assert_eq!(read_all(&mut t).unwrap().len(), 3);
    }
}
