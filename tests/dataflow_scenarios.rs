//! Dataflow Scenario Tests
//!
//! End-to-end checks of the pull protocol across operator graphs:
//! - merge into head stops both parents with one done each
//! - tail across batch boundaries
//! - over into a scoped head
//! - an error ends the platoon without re-pulling the parent
//! - closing a graph closes every parent, including those run by workers
//! - randomised head/tail counts and merge ordering

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rand::Rng;

use logweave::batch::Batch;
use logweave::context::Context;
use logweave::error::{Error, Result};
use logweave::expr::path;
use logweave::runtime::exec::collect;
use logweave::runtime::op::{Filter, Head, Merge, Mux, Scope, Tail};
use logweave::runtime::{BoxPuller, Puller, RuntimeConfig};
use logweave::value::{SortKey, TypeContext, Value};

// =============================================================================
// Helper Functions
// =============================================================================

#[derive(Default)]
struct Counts {
    pulls: AtomicUsize,
    dones: AtomicUsize,
    closes: AtomicUsize,
}

/// Parent that replays fixed batches, optionally failing once they run
/// out, and counts what it is asked for
struct Source {
    batches: VecDeque<Vec<Value>>,
    fail: Option<String>,
    counts: Arc<Counts>,
}

impl Source {
    fn new(batches: Vec<Vec<Value>>) -> (Self, Arc<Counts>) {
        let counts = Arc::new(Counts::default());
        let src = Self {
            batches: batches.into(),
            fail: None,
            counts: Arc::clone(&counts),
        };
        (src, counts)
    }

    fn failing(batches: Vec<Vec<Value>>, msg: &str) -> (Self, Arc<Counts>) {
        let (mut src, counts) = Self::new(batches);
        src.fail = Some(msg.to_string());
        (src, counts)
    }
}

impl Puller for Source {
    fn pull(&mut self, done: bool) -> Result<Option<Batch>> {
        if done {
            self.counts.dones.fetch_add(1, Ordering::SeqCst);
            self.batches.clear();
            return Ok(None);
        }
        self.counts.pulls.fetch_add(1, Ordering::SeqCst);
        match self.batches.pop_front() {
            Some(vals) => Ok(Some(Batch::new(vals))),
            None => match self.fail.take() {
                Some(msg) => Err(Error::other(msg)),
                None => Ok(None),
            },
        }
    }

    fn close(&mut self) -> Result<()> {
        self.counts.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn recs(zctx: &TypeContext, vals: &[i64]) -> Vec<Value> {
    vals.iter()
        .map(|v| Value::record(zctx, vec![("v", Value::int64(*v))]).unwrap())
        .collect()
}

fn ints(vals: &[i64]) -> Vec<Value> {
    vals.iter().map(|v| Value::int64(*v)).collect()
}

fn as_ints(vals: &[Value]) -> Vec<i64> {
    vals.iter()
        .map(|v| v.as_int().or_else(|| v.field("v").and_then(|f| f.as_int())).unwrap())
        .collect()
}

// =============================================================================
// Scenarios
// =============================================================================

/// merge(v asc) into head(4) emits the four smallest values and stops
/// each parent with exactly one done.
#[test]
fn test_head_after_merge() {
    let zctx = TypeContext::new();
    let (a, ca) = Source::new(vec![recs(&zctx, &[1, 3, 5])]);
    let (b, cb) = Source::new(vec![recs(&zctx, &[2, 4, 6])]);
    let cmp = RuntimeConfig::default().comparator(vec![SortKey::asc("v")]);
    let merge = Merge::new(&Context::background(), vec![Box::new(a), Box::new(b)], cmp).unwrap();
    let mut head = Head::new(Box::new(merge), 4);

    let got = collect(&mut head).unwrap();
    let text: Vec<String> = got.iter().map(|v| v.to_string()).collect();
    assert_eq!(text, vec!["{v:1}", "{v:2}", "{v:3}", "{v:4}"]);
    assert_eq!(ca.dones.load(Ordering::SeqCst), 1);
    assert_eq!(cb.dones.load(Ordering::SeqCst), 1);
}

/// tail(3) keeps the last values even when they span batches.
#[test]
fn test_tail_with_batch_split() {
    let (src, _) = Source::new(vec![ints(&[1, 2, 3]), ints(&[4, 5]), ints(&[6, 7, 8, 9])]);
    let mut tail = Tail::new(Box::new(src), 3);
    assert_eq!(as_ints(&collect(&mut tail).unwrap()), vec![7, 8, 9]);
}

/// over xs => (sub | head 2): the sub-graph sees two values and sends one
/// done to its scope source; the outer stream ends normally.
#[test]
fn test_over_into_scope() {
    let zctx = TypeContext::new();
    let outer_rec = Value::record(
        &zctx,
        vec![("xs", Value::array(&zctx, ints(&[1, 2, 3])).unwrap())],
    )
    .unwrap();
    let (outer, outer_counts) = Source::new(vec![vec![outer_rec]]);
    let mut scope = Scope::new(
        &Context::background(),
        "over",
        Box::new(outer),
        vec![path("xs").unwrap()],
        vec![],
        1,
        |src| Box::new(Head::new(Box::new(src), 2)),
    )
    .unwrap();

    let got = collect(&mut scope).unwrap();
    assert_eq!(as_ints(&got), vec![1, 2]);
    assert_eq!(outer_counts.dones.load(Ordering::SeqCst), 0);
}

/// After a parent error, the next pull is EOS and the parent is not
/// pulled again.
#[test]
fn test_done_on_error() {
    let (src, counts) = Source::failing(vec![], "disk gone");
    let mut filter = Filter::new(Box::new(src), logweave::expr::literal(Value::bool(true)));

    let err = filter.pull(false).unwrap_err();
    assert!(err.to_string().contains("disk gone"));
    let pulls = counts.pulls.load(Ordering::SeqCst);

    assert!(filter.pull(false).unwrap().is_none());
    assert_eq!(counts.pulls.load(Ordering::SeqCst), pulls);
}

/// Operators that run their parents in worker threads close those parents
/// before the graph's close returns.
#[test]
fn test_close_reaches_worker_parents() {
    let zctx = TypeContext::new();
    let rt = RuntimeConfig::default();

    let (a, ca) = Source::new(vec![recs(&zctx, &[1])]);
    let (b, cb) = Source::new(vec![recs(&zctx, &[2])]);
    let parents: Vec<BoxPuller> = vec![Box::new(a), Box::new(b)];
    let mut merge = Merge::new(&Context::background(), parents, rt.comparator(vec![SortKey::asc("v")])).unwrap();
    assert_eq!(as_ints(&collect(&mut merge).unwrap()), vec![1, 2]);
    assert_eq!(ca.closes.load(Ordering::SeqCst), 1);
    assert_eq!(cb.closes.load(Ordering::SeqCst), 1);

    let (a, ca) = Source::new(vec![ints(&[1])]);
    let (b, cb) = Source::new(vec![ints(&[2])]);
    let parents: Vec<BoxPuller> = vec![Box::new(a), Box::new(b)];
    let mut mux = Mux::new(&Context::background(), parents, &rt).unwrap();
    assert_eq!(collect(&mut mux).unwrap().len(), 2);
    assert_eq!(ca.closes.load(Ordering::SeqCst), 1);
    assert_eq!(cb.closes.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Randomised Properties
// =============================================================================

fn random_batches(rng: &mut impl Rng, total: usize) -> Vec<Vec<Value>> {
    let mut out = Vec::new();
    let mut next = 0i64;
    while (next as usize) < total {
        let n = rng.gen_range(1..=5).min(total - next as usize);
        out.push(ints(&(next..next + n as i64).collect::<Vec<_>>()));
        next += n as i64;
    }
    out
}

/// head(N) emits min(N, total) values; tail(N) emits the last min(N, total).
#[test]
fn test_head_and_tail_counts() {
    let mut rng = rand::thread_rng();
    for _ in 0..50 {
        let total = rng.gen_range(0..40);
        let n = rng.gen_range(0..20);

        let (src, _) = Source::new(random_batches(&mut rng, total));
        let mut head = Head::new(Box::new(src), n);
        let got = as_ints(&collect(&mut head).unwrap());
        assert_eq!(got, (0..n.min(total) as i64).collect::<Vec<_>>());

        let (src, _) = Source::new(random_batches(&mut rng, total));
        let mut tail = Tail::new(Box::new(src), n);
        let got = as_ints(&collect(&mut tail).unwrap());
        let start = total.saturating_sub(n) as i64;
        assert_eq!(got, (start..total as i64).collect::<Vec<_>>());
    }
}

/// Record tagged with the parent it came from and its position there
fn tagged(zctx: &TypeContext, v: i64, parent: usize, seq: usize) -> Value {
    Value::record(
        zctx,
        vec![
            ("v", Value::int64(v)),
            ("parent", Value::int64(parent as i64)),
            ("seq", Value::int64(seq as i64)),
        ],
    )
    .unwrap()
}

fn tag_of(v: &Value) -> (i64, i64, i64) {
    let get = |name: &str| v.field(name).and_then(|f| f.as_int()).unwrap();
    (get("v"), get("parent"), get("seq"))
}

/// merge output is the inputs' sorted concatenation, with equal keys in
/// parent order, whatever the batch boundaries.
#[test]
fn test_merge_is_sorted_permutation() {
    let mut rng = rand::thread_rng();
    let zctx = TypeContext::new();
    let rt = RuntimeConfig::default();
    for _ in 0..30 {
        let nparents = rng.gen_range(1..5);
        let mut parents: Vec<BoxPuller> = Vec::new();
        let mut want = Vec::new();
        for p in 0..nparents {
            // A narrow key domain forces duplicates within and across parents.
            let mut keys: Vec<i64> = (0..rng.gen_range(0..25)).map(|_| rng.gen_range(0..10)).collect();
            keys.sort_unstable();
            let vals: Vec<Value> = keys
                .iter()
                .enumerate()
                .map(|(seq, k)| tagged(&zctx, *k, p, seq))
                .collect();
            want.extend(vals.iter().map(tag_of));
            let mut batches = Vec::new();
            let mut rest = vals.as_slice();
            while !rest.is_empty() {
                let n = rng.gen_range(1..=4).min(rest.len());
                batches.push(rest[..n].to_vec());
                rest = &rest[n..];
            }
            let (src, _) = Source::new(batches);
            parents.push(Box::new(src));
        }
        // Stable, so ties stay in parent order and then input order.
        want.sort_by_key(|(v, _, _)| *v);

        let mut merge = Merge::new(&Context::background(), parents, rt.comparator(vec![SortKey::asc("v")])).unwrap();
        let got: Vec<(i64, i64, i64)> = collect(&mut merge).unwrap().iter().map(tag_of).collect();
        assert_eq!(got, want);
    }
}
