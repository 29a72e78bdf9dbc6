//! Boundary thinning pipeline.
//!
//! Loads POA, LGA, SED and CED geometry, discovers the boundary structure
//! shared across all four layers, simplifies each shared edge once,
//! reassembles seamless polygons and writes them to the display tables.
//! State polygons are then assembled by unioning the thinned LGA geometry.
//!
//! Depends on `prepare` having created the display tables.

use anyhow::Result;
use clap::Parser;
use geo::{BooleanOps, MultiPolygon};
use hashbrown::HashMap;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use paperbark::config::{ReleaseYears, RunConfig};
use paperbark::models::LayerKind;
use paperbark::store::Store;
use paperbark::topo::TopoBuilder;

#[derive(Parser, Debug)]
#[command(name = "thin")]
#[command(about = "Thin admin boundary geometry into seamless display polygons")]
struct Args {
    /// POA release year
    poa_year: String,
    /// LGA release year
    lga_year: String,
    /// SED release year
    sed_year: String,
    /// CED release year
    ced_year: String,
    /// libpq-style connection string, e.g. "host=localhost user=gis dbname=abs"
    conninfo: String,
    /// Simplification tolerance in degrees
    #[arg(long, default_value_t = 0.005)]
    tolerance: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let config = RunConfig {
        years: ReleaseYears {
            poa: args.poa_year,
            lga: args.lga_year,
            sed: args.sed_year,
            ced: args.ced_year,
        },
        conninfo: args.conninfo,
    };

    let store = Store::connect(&config.conninfo).await?;

    // Every layer must be resident before node discovery: node identity
    // depends on boundaries shared across layers.
    let mut builder = TopoBuilder::new();
    let mut loaded = Vec::new();
    for &kind in LayerKind::source_layers() {
        let table = config.years.table(kind);
        let regions = store.load_layer(&table).await?;
        for region in &regions {
            builder.add_region(kind, region)?;
        }
        loaded.push((table, regions));
    }

    builder.find_nodes()?;
    builder.create_edges()?;
    builder.simplify_edges(args.tolerance)?;
    let thinned = builder.reassemble()?;

    let by_key: HashMap<(LayerKind, String), MultiPolygon<f64>> = thinned
        .into_iter()
        .map(|t| ((t.layer, t.code), t.geom))
        .collect();

    for (table, regions) in &loaded {
        let mut saved = 0usize;
        for region in regions {
            if let Some(geom) = by_key.get(&(table.kind, region.code.clone())) {
                store.save_geometry(table.kind, &region.code, geom).await?;
                saved += 1;
            }
        }
        store.refresh_geojson(table.kind).await?;
        info!(layer = %table.kind, saved, "display geometry written");
    }

    // States: union the thinned LGA polygons per parent state code
    let mut states: HashMap<String, Vec<&MultiPolygon<f64>>> = HashMap::new();
    if let Some((_, lga_rows)) = loaded.iter().find(|(t, _)| t.kind == LayerKind::Lga) {
        for region in lga_rows {
            let Some(state_code) = region.state_code.as_deref() else {
                continue;
            };
            if let Some(geom) = by_key.get(&(LayerKind::Lga, region.code.clone())) {
                states.entry(state_code.to_string()).or_default().push(geom);
            }
        }
    }
    for (state_code, parts) in &states {
        let mut iter = parts.iter();
        let Some(first) = iter.next() else { continue };
        let combined = iter.fold((*first).clone(), |acc, mp| acc.union(*mp));
        store
            .save_geometry(LayerKind::Ste, state_code, &combined)
            .await?;
    }
    store.refresh_geojson(LayerKind::Ste).await?;
    info!(states = states.len(), "state polygons assembled");

    Ok(())
}
