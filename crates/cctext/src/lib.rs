//! Public facade crate for `cctext`.
//!
//! This crate contains no IO or detector logic.
//! It re-exports the record/charset types and traits from `cctext-core`.

pub use cctext_core::*;
