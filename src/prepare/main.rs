//! Display table preparation and postcode relationships.
//!
//! (Re)creates the display tables for every layer, populates codes, names
//! and centroids from the source datasets, then derives the postcode table:
//! each postal area is assigned its enclosing or best-overlapping LGA, SED
//! and CED, with the state code taken from the winning LGA.
//!
//! Runs against source tables loaded by external GIS tooling; `thin` fills
//! in the display geometry afterwards.

use anyhow::Result;
use clap::Parser;
use hashbrown::HashMap;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use paperbark::config::{ReleaseYears, RunConfig};
use paperbark::models::LayerKind;
use paperbark::overlay::OverlayMatcher;
use paperbark::store::Store;

#[derive(Parser, Debug)]
#[command(name = "prepare")]
#[command(about = "Create display tables and derive postcode relationships")]
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

    store.create_display_tables().await?;
    store.create_postcode_table().await?;

    let lga_table = config.years.table(LayerKind::Lga);
    store.populate_state_display(&lga_table).await?;
    for &kind in LayerKind::source_layers() {
        store.populate_display(&config.years.table(kind)).await?;
    }

    // The matcher needs raw (unsimplified) geometry for every layer
    let poa = store.load_layer(&config.years.table(LayerKind::Poa)).await?;
    let lga = store.load_layer(&lga_table).await?;
    let sed = store.load_layer(&config.years.table(LayerKind::Sed)).await?;
    let ced = store.load_layer(&config.years.table(LayerKind::Ced)).await?;

    let state_of: HashMap<String, String> = lga
        .iter()
        .filter_map(|r| r.state_code.clone().map(|s| (r.code.clone(), s)))
        .collect();

    let mut matcher = OverlayMatcher::new();
    matcher.add_layer(LayerKind::Lga, lga);
    matcher.add_layer(LayerKind::Sed, sed);
    matcher.add_layer(LayerKind::Ced, ced);

    let assignments = matcher.match_all(&poa);
    for assignment in &assignments {
        let get = |kind: LayerKind| {
            assignment.parents.get(&kind).cloned().flatten()
        };
        let lga_code = get(LayerKind::Lga);
        let ste_code = lga_code
            .as_deref()
            .and_then(|code| state_of.get(code))
            .cloned();
        let sed_code = get(LayerKind::Sed);
        let ced_code = get(LayerKind::Ced);
        store
            .insert_assignment(
                &assignment.fine_code,
                lga_code.as_deref(),
                ste_code.as_deref(),
                sed_code.as_deref(),
                ced_code.as_deref(),
            )
            .await?;
    }
    info!(rows = assignments.len(), "postcode relationships written");

    Ok(())
}
