//! Ordered N-way merge of key/value streams
//!
//! A [`Stream`] enumerates key/value pairs in key order. A [`Combiner`]
//! merges several streams into one, folding the values of pairs that
//! share a key with a combine function. Because a combiner is itself a
//! stream, combiners nest.

mod index;
mod memtable;

pub use index::{write_index, IndexStream, Output};
pub use memtable::MemTable;

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::value::primitive::{decode_int, encode_int};
use crate::value::{compare_values, Nulls, Order, Value};

/// One entry of a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub key: Value,
    pub value: Bytes,
}

impl Pair {
    pub fn new(key: Value, value: impl Into<Bytes>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

/// A key-ordered enumeration of pairs.
///
/// `open` positions the stream at its first key, `read` returns pairs
/// until `None`, and `close` releases resources; a closed stream may be
/// opened again.
pub trait Stream: Send {
    fn open(&mut self) -> Result<()>;
    fn read(&mut self) -> Result<Option<Pair>>;
    fn close(&mut self) -> Result<()>;
}

impl<S: Stream + ?Sized> Stream for Box<S> {
    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn read(&mut self) -> Result<Option<Pair>> {
        (**self).read()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Folds two values of the same key, earlier stream first
pub type CombineFn = Arc<dyn Fn(&[u8], &[u8]) -> Result<Bytes> + Send + Sync>;

/// Combine function by name: `first`, `last`, `concat` or `sum` (of
/// int64 values)
pub fn builtin(name: &str) -> Result<CombineFn> {
    let f: CombineFn = match name {
        "first" => Arc::new(first),
        "last" => Arc::new(last),
        "concat" => Arc::new(concat),
        "sum" => Arc::new(sum),
        _ => {
            return Err(Error::invalid(format!(
                "unknown combine function \"{}\" (want first, last, concat or sum)",
                name
            )))
        }
    };
    Ok(f)
}

fn first(a: &[u8], _: &[u8]) -> Result<Bytes> {
    Ok(Bytes::copy_from_slice(a))
}

fn last(_: &[u8], b: &[u8]) -> Result<Bytes> {
    Ok(Bytes::copy_from_slice(b))
}

fn concat(a: &[u8], b: &[u8]) -> Result<Bytes> {
    let mut out = BytesMut::with_capacity(a.len() + b.len());
    out.extend_from_slice(a);
    out.extend_from_slice(b);
    Ok(out.freeze())
}

fn sum(a: &[u8], b: &[u8]) -> Result<Bytes> {
    let total = decode_int(a)?
        .checked_add(decode_int(b)?)
        .ok_or_else(|| Error::invalid("sum overflows int64"))?;
    Ok(Bytes::from(encode_int(total)))
}

/// Compare two keys under `order`
pub(crate) fn compare_keys(a: &Value, b: &Value, order: Order) -> Ordering {
    order.apply(compare_values(a, b, Nulls::First))
}

/// Head of one input stream, ordered by key and then by stream index
struct Head {
    pair: Pair,
    idx: usize,
    order: Order,
}

impl Ord for Head {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_keys(&self.pair.key, &other.pair.key, self.order)
            .then(self.idx.cmp(&other.idx))
    }
}

impl PartialOrd for Head {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Head {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Head {}

/// Merges input streams into one stream with exactly one pair per
/// distinct key.
///
/// Values sharing a key are folded left to right in input order, so the
/// combine function must be associative but need not be commutative.
pub struct Combiner {
    streams: Vec<Box<dyn Stream>>,
    combine: CombineFn,
    order: Order,
    heap: BinaryHeap<Reverse<Head>>,
}

impl Combiner {
    pub fn new(streams: Vec<Box<dyn Stream>>, combine: CombineFn, order: Order) -> Self {
        Self {
            streams,
            combine,
            order,
            heap: BinaryHeap::new(),
        }
    }

    fn advance(&mut self, idx: usize) -> Result<()> {
        if let Some(pair) = self.streams[idx].read()? {
            self.heap.push(Reverse(Head {
                pair,
                idx,
                order: self.order,
            }));
        }
        Ok(())
    }

    fn top_matches(&self, key: &Value) -> bool {
        self.heap
            .peek()
            .map(|Reverse(h)| compare_keys(&h.pair.key, key, self.order) == Ordering::Equal)
            .unwrap_or(false)
    }
}

impl Stream for Combiner {
    fn open(&mut self) -> Result<()> {
        self.heap.clear();
        for idx in 0..self.streams.len() {
            self.streams[idx].open()?;
            self.advance(idx)?;
        }
        Ok(())
    }

    fn read(&mut self) -> Result<Option<Pair>> {
        let first = match self.heap.pop() {
            Some(Reverse(h)) => h,
            None => return Ok(None),
        };
        let key = first.pair.key;
        let mut value = first.pair.value;
        let mut members = vec![first.idx];
        while self.top_matches(&key) {
            if let Some(Reverse(h)) = self.heap.pop() {
                value = (self.combine)(&value, &h.pair.value)?;
                members.push(h.idx);
            }
        }
        for idx in members {
            self.advance(idx)?;
        }
        // A stream repeating a key is folded into the same output pair.
        while self.top_matches(&key) {
            if let Some(Reverse(h)) = self.heap.pop() {
                value = (self.combine)(&value, &h.pair.value)?;
                self.advance(h.idx)?;
            }
        }
        Ok(Some(Pair { key, value }))
    }

    fn close(&mut self) -> Result<()> {
        self.heap.clear();
        let mut first_err = None;
        for s in &mut self.streams {
            if let Err(e) = s.close() {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Read every pair of `stream`, opening and closing it
pub fn read_all<S: Stream + ?Sized>(stream: &mut S) -> Result<Vec<Pair>> {
    stream.open()?;
    let mut out = Vec::new();
    let res = (|| {
        while let Some(p) = stream.read()? {
            out.push(p);
        }
        Ok(())
    })();
    let closed = stream.close();
    res.and(closed)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use rand::seq::SliceRandom;
    use rand::Rng;

    use super::*;

    fn table(pairs: &[(i64, &str)]) -> MemTable {
        let mut t = MemTable::new(Order::Asc);
        for (k, v) in pairs {
            t.insert(Value::int64(*k), v.as_bytes().to_vec());
        }
        t
    }

    fn render(pairs: &[Pair]) -> Vec<(i64, String)> {
        pairs
            .iter()
            .map(|p| (p.key.as_int().unwrap(), String::from_utf8(p.value.to_vec()).unwrap()))
            .collect()
    }

    #[test]
    fn test_combine_folds_in_input_order() {
        let a = table(&[(1, "a1"), (3, "a3")]);
        let b = table(&[(1, "b1"), (2, "b2"), (3, "b3")]);
        let c = table(&[(3, "c3")]);
        let mut comb = Combiner::new(
            vec![Box::new(a), Box::new(b), Box::new(c)],
            builtin("concat").unwrap(),
            Order::Asc,
        );
        let got = render(&read_all(&mut comb).unwrap());
        assert_eq!(
            got,
            vec![(1, "a1b1".to_string()), (2, "b2".to_string()), (3, "a3b3c3".to_string())]
        );
    }

    #[test]
    fn test_combiners_nest() {
        let inner = Combiner::new(
            vec![Box::new(table(&[(1, "x")])), Box::new(table(&[(1, "y")]))],
            builtin("concat").unwrap(),
            Order::Asc,
        );
        let mut outer = Combiner::new(
            vec![Box::new(inner), Box::new(table(&[(0, "w"), (1, "z")]))],
            builtin("concat").unwrap(),
            Order::Asc,
        );
        let got = render(&read_all(&mut outer).unwrap());
        assert_eq!(got, vec![(0, "w".to_string()), (1, "xyz".to_string())]);
    }

    #[test]
    fn test_builtins() {
        let sum = builtin("sum").unwrap();
        let out = sum(&encode_int(40), &encode_int(2)).unwrap();
        assert_eq!(decode_int(&out).unwrap(), 42);
        assert_eq!(&builtin("first").unwrap()(&b"a"[..], &b"b"[..]).unwrap()[..], b"a");
        assert_eq!(&builtin("last").unwrap()(&b"a"[..], &b"b"[..]).unwrap()[..], b"b");
        assert!(builtin("avg").is_err());
        assert!(sum(&encode_int(i64::MAX), &encode_int(1)).is_err());
    }

    #[test]
    fn test_random_merge_is_sorted_and_unique() {
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let nstreams = rng.gen_range(1..6);
            let mut streams: Vec<Box<dyn Stream>> = Vec::new();
            let mut expect = std::collections::BTreeMap::new();
            for _ in 0..nstreams {
                let mut keys: Vec<i64> = (0..50).collect();
                keys.shuffle(&mut rng);
                keys.truncate(rng.gen_range(0..30));
                let mut t = MemTable::new(Order::Asc);
                for k in keys {
                    t.insert(Value::int64(k), encode_int(1));
                    *expect.entry(k).or_insert(0i64) += 1;
                }
                streams.push(Box::new(t));
            }
            let mut comb = Combiner::new(streams, builtin("sum").unwrap(), Order::Asc);
            let got: Vec<(i64, i64)> = read_all(&mut comb)
                .unwrap()
                .iter()
                .map(|p| (p.key.as_int().unwrap(), decode_int(&p.value).unwrap()))
                .collect();
            let want: Vec<(i64, i64)> = expect.into_iter().collect();
            assert_eq!(got, want);
        }
    }
}
