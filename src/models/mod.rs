//! Shared domain types: administrative layers and region rows.

mod region;

pub use region::{LayerKind, Region};
