//! Paperbark - display geometry for administrative boundary datasets.
//!
//! Thins published admin-boundary polygons (postal areas, local government
//! areas, electoral divisions) into lightweight display geometry that stays
//! seamless across shared borders, and derives the postcode-to-parent-area
//! assignment table. Shared library for the `thin` and `prepare` binaries.

pub mod config;
pub mod models;
pub mod overlay;
pub mod store;
pub mod topo;

pub use models::{LayerKind, Region};
