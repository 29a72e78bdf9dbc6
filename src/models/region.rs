//! Administrative layers and region rows.
//!
//! Layers follow the Australian Statistical Geography Standard datasets:
//! postal areas (POA), local government areas (LGA), state electoral
//! divisions (SED), commonwealth electoral divisions (CED), plus the derived
//! state (STE) display layer assembled from LGA geometry.

use geo::MultiPolygon;

/// Administrative dataset identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LayerKind {
    /// Postal area (the fine layer)
    Poa,
    /// Local government area
    Lga,
    /// State electoral division
    Sed,
    /// Commonwealth electoral division
    Ced,
    /// State, derived from LGA attributes (no source table of its own)
    Ste,
}

impl LayerKind {
    /// Short dataset code used in table and column names
    pub fn table_code(&self) -> &'static str {
        match self {
            LayerKind::Poa => "poa",
            LayerKind::Lga => "lga",
            LayerKind::Sed => "sed",
            LayerKind::Ced => "ced",
            LayerKind::Ste => "ste",
        }
    }

    /// Width of the region code column in the published datasets
    pub fn code_width(&self) -> usize {
        match self {
            LayerKind::Poa => 4,
            LayerKind::Lga => 5,
            LayerKind::Sed => 5,
            LayerKind::Ced => 3,
            LayerKind::Ste => 1,
        }
    }

    /// Whether source rows carry a parent-state code attribute
    pub fn has_state_code(&self) -> bool {
        matches!(self, LayerKind::Lga)
    }

    /// The four source layers that participate in topology thinning,
    /// in load order
    pub fn source_layers() -> &'static [LayerKind] {
        &[LayerKind::Poa, LayerKind::Lga, LayerKind::Sed, LayerKind::Ced]
    }
}

impl std::fmt::Display for LayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table_code())
    }
}

/// One region row loaded from a source dataset.
///
/// Immutable once loaded; the topology pipeline produces a replacement
/// geometry keyed by `code` rather than mutating the row in place.
#[derive(Debug, Clone)]
pub struct Region {
    /// Region code, unique within its layer
    pub code: String,
    /// Display name
    pub name: String,
    /// Parent-state code (LGA rows only)
    pub state_code: Option<String>,
    /// Full-resolution polygon set
    pub geom: MultiPolygon<f64>,
}

impl Region {
    pub fn new(code: impl Into<String>, name: impl Into<String>, geom: MultiPolygon<f64>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            state_code: None,
            geom,
        }
    }

    pub fn with_state_code(mut self, state_code: impl Into<String>) -> Self {
        self.state_code = Some(state_code.into());
        self
    }
}
