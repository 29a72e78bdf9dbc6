//! Immutable per-run configuration, built once in each binary and passed to
//! the components that need it. There is no global mutable state.

use crate::models::LayerKind;
use crate::store::LayerTable;

/// Release year per source dataset, as given on the command line. Datasets
/// are not always released together; mixing years is allowed but may not
/// produce sensible results.
#[derive(Debug, Clone)]
pub struct ReleaseYears {
    pub poa: String,
    pub lga: String,
    pub sed: String,
    pub ced: String,
}

impl ReleaseYears {
    pub fn table(&self, kind: LayerKind) -> LayerTable {
        let year = match kind {
            LayerKind::Poa => &self.poa,
            LayerKind::Lga => &self.lga,
            LayerKind::Sed => &self.sed,
            LayerKind::Ced => &self.ced,
            // states are derived from LGA attributes
            LayerKind::Ste => &self.lga,
        };
        LayerTable::new(kind, year.clone())
    }
}

/// Everything a run needs.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub years: ReleaseYears,
    /// libpq-style connection string for the geometry store
    pub conninfo: String,
}
