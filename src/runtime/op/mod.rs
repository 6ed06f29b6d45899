//! Operator library
//!
//! Each operator is a leaf type implementing `Puller`. Operators that need
//! concurrency (`merge`, `mux`, `switch`, `until`, the traversal scope) run
//! their parents in worker threads bound to a `Context`.

pub mod explode;
pub mod filter;
pub mod from;
pub mod head;
pub mod load;
pub mod merge;
pub mod mux;
pub mod pass;
pub mod scan;
pub mod switch;
pub mod tail;
pub mod traverse;
pub mod until;
pub mod values;

pub use explode::Explode;
pub use filter::Filter;
pub use from::{FromScheduler, Scheduler};
pub use head::Head;
pub use load::Load;
pub use merge::Merge;
pub use mux::Mux;
pub use pass::Pass;
pub use scan::{IndexScan, IndexScheduler};
pub use switch::{Switch, SwitchBranch};
pub use tail::Tail;
pub use traverse::{Over, Scope};
pub use until::Until;
pub use values::Values;
