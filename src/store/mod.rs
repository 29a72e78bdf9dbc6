//! PostGIS-backed geometry store.
//!
//! The single I/O boundary of the system: loads source regions, writes
//! simplified display geometry, manages the display-table schema and the
//! derived postcode assignment table. Store failures are fatal with no
//! retry; a failed run is re-executed from scratch.

mod codec;
mod layer;

pub use codec::{decode_multipolygon, encode_multipolygon, GDA94_SRID};
pub use layer::LayerTable;

use anyhow::{Context, Result};
use geo::MultiPolygon;
use tokio_postgres::{Client, NoTls};
use tracing::{error, info};

use crate::models::{LayerKind, Region};

pub struct Store {
    client: Client,
}

impl Store {
    /// Connect with a libpq-style connection string.
    pub async fn connect(conninfo: &str) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(conninfo, NoTls)
            .await
            .context("database connection failed")?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!(%err, "database connection task failed");
            }
        });
        Ok(Self { client })
    }

    /// Load every region with non-null geometry for a source layer, in
    /// table order.
    pub async fn load_layer(&self, table: &LayerTable) -> Result<Vec<Region>> {
        let sql = table.select_sql();
        let rows = self
            .client
            .query(sql.as_str(), &[])
            .await
            .with_context(|| format!("loading {table}"))?;
        let mut regions = Vec::with_capacity(rows.len());
        for row in rows {
            let code: String = row.get(0);
            let name: String = row.get(1);
            let (state_code, wkb): (Option<String>, Vec<u8>) = if table.kind.has_state_code() {
                (Some(row.get(2)), row.get(3))
            } else {
                (None, row.get(2))
            };
            let geom = decode_multipolygon(&wkb)
                .with_context(|| format!("decoding {} {}", table.kind, code))?;
            let region = Region::new(code, name, geom);
            regions.push(match state_code {
                Some(state) => region.with_state_code(state),
                None => region,
            });
        }
        info!(layer = %table.kind, rows = regions.len(), "layer loaded");
        Ok(regions)
    }

    /// Write one simplified geometry to a display table, keyed by code.
    pub async fn save_geometry(
        &self,
        kind: LayerKind,
        code: &str,
        geom: &MultiPolygon<f64>,
    ) -> Result<()> {
        let bytes = encode_multipolygon(geom)?;
        let sql = layer::update_display_geom_sql(kind);
        self.client
            .execute(sql.as_str(), &[&bytes, &code])
            .await
            .with_context(|| format!("saving {kind} {code}"))?;
        Ok(())
    }

    /// Refresh the derived GeoJSON column after geometry writes.
    pub async fn refresh_geojson(&self, kind: LayerKind) -> Result<()> {
        let sql = layer::refresh_geojson_sql(kind);
        self.client
            .execute(sql.as_str(), &[])
            .await
            .with_context(|| format!("refreshing {kind} geojson"))?;
        Ok(())
    }

    /// Drop and recreate the display tables for every layer.
    pub async fn create_display_tables(&self) -> Result<()> {
        for kind in [
            LayerKind::Poa,
            LayerKind::Lga,
            LayerKind::Sed,
            LayerKind::Ced,
            LayerKind::Ste,
        ] {
            for stmt in layer::create_display_table_sql(kind) {
                self.client
                    .execute(stmt.as_str(), &[])
                    .await
                    .with_context(|| format!("creating {kind} display table"))?;
            }
        }
        info!("display tables created");
        Ok(())
    }

    /// Drop and recreate the derived postcode assignment table.
    pub async fn create_postcode_table(&self) -> Result<()> {
        for stmt in layer::create_postcode_table_sql() {
            self.client
                .execute(stmt.as_str(), &[])
                .await
                .context("creating postcode table")?;
        }
        Ok(())
    }

    /// Populate a display table with codes, names and centroids.
    pub async fn populate_display(&self, table: &LayerTable) -> Result<()> {
        let sql = table.populate_display_sql();
        self.client
            .execute(sql.as_str(), &[])
            .await
            .with_context(|| format!("populating {} display rows", table.kind))?;
        Ok(())
    }

    /// Populate the state display rows from LGA attributes.
    pub async fn populate_state_display(&self, lga: &LayerTable) -> Result<()> {
        let sql = layer::populate_state_display_sql(lga);
        self.client
            .execute(sql.as_str(), &[])
            .await
            .context("populating ste display rows")?;
        Ok(())
    }

    /// Insert one postcode assignment row; unmatched layers store null.
    pub async fn insert_assignment(
        &self,
        poa_code: &str,
        lga_code: Option<&str>,
        ste_code: Option<&str>,
        sed_code: Option<&str>,
        ced_code: Option<&str>,
    ) -> Result<()> {
        self.client
            .execute(
                layer::insert_postcode_sql(),
                &[&poa_code, &lga_code, &ste_code, &sed_code, &ced_code],
            )
            .await
            .with_context(|| format!("inserting postcode row for {poa_code}"))?;
        Ok(())
    }
}
