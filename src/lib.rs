//! logweave - a pull-based dataflow runtime and the microindex file format
//!
//! Records are typed [`value::Value`]s moved in [`batch::Batch`]es
//! through operator graphs ([`runtime`]). Sorted record streams can be
//! stored as microindex files ([`microindex`]) and searched by key, and
//! key/value streams merged with a [`combiner`].

pub mod batch;
pub mod cli;
pub mod combiner;
pub mod config;
pub mod context;
pub mod error;
pub mod expr;
pub mod io;
pub mod microindex;
pub mod runtime;
pub mod value;
pub mod zcode;
pub mod zngio;
