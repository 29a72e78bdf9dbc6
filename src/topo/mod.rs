//! Topology-preserving boundary simplification.
//!
//! Regions from every layer are registered first, then the builder discovers
//! the shared boundary structure: nodes where ring traversals diverge, edges
//! between nodes stored once no matter how many rings traverse them. Each
//! edge is simplified exactly once, so adjacent regions (and coincident
//! boundaries across layers) stay seamless after reassembly.

mod builder;

pub use builder::{Stage, ThinnedRegion, TopoBuilder};

use thiserror::Error;

use crate::models::LayerKind;

/// Errors raised by the topology pipeline. All are fatal for the run: once
/// node or edge identity is in doubt, downstream results cannot be trusted.
#[derive(Debug, Error)]
pub enum TopoError {
    /// A source ring is malformed: not closed, degenerate, or self-intersecting
    #[error("invalid geometry in {layer} region {code}: {reason}")]
    InvalidGeometry {
        layer: LayerKind,
        code: String,
        reason: &'static str,
    },

    /// A pipeline stage was invoked out of order
    #[error("{called} called while builder is in stage {actual}")]
    InvalidState { called: &'static str, actual: Stage },

    /// Reassembly detected a topology violation introduced by simplification.
    /// Surfaced to the caller to retry with a smaller tolerance.
    #[error("simplification broke topology in {layer} region {code}: {reason}")]
    Simplification {
        layer: LayerKind,
        code: String,
        reason: &'static str,
    },
}
