//! Layer descriptors and the SQL they load and save with.
//!
//! Source tables follow the published naming convention: table `{code}{year}`
//! with columns `{code}_code{year}` and `{code}_name{year}`. Display tables
//! are `{code}_disp` keyed by `{code}_code` with no year suffix.

use crate::models::LayerKind;

/// A source dataset: layer kind plus release year.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerTable {
    pub kind: LayerKind,
    pub release_year: String,
}

impl LayerTable {
    pub fn new(kind: LayerKind, release_year: impl Into<String>) -> Self {
        Self {
            kind,
            release_year: release_year.into(),
        }
    }

    pub fn source_table(&self) -> String {
        format!("{}{}", self.kind.table_code(), self.release_year)
    }

    /// Load query for this layer. LGA rows also carry the parent-state code
    /// needed downstream by state assembly and the derived postcode table.
    pub fn select_sql(&self) -> String {
        let code = self.kind.table_code();
        let year = &self.release_year;
        if self.kind.has_state_code() {
            format!(
                "select {code}_code{year}, {code}_name{year}, ste_code{year}, \
                 ST_AsEWKB(geom) from {code}{year} where geom is not null"
            )
        } else {
            format!(
                "select {code}_code{year}, {code}_name{year}, \
                 ST_AsEWKB(geom) from {code}{year} where geom is not null"
            )
        }
    }

    /// Populate the display table with codes, names and centroid coordinates
    /// straight from the source table.
    pub fn populate_display_sql(&self) -> String {
        let code = self.kind.table_code();
        let year = &self.release_year;
        format!(
            "insert into {code}_disp ({code}_code, name, lon, lat) \
             select {code}_code{year}, {code}_name{year}, \
             ST_X(ST_Centroid(geom)), ST_Y(ST_Centroid(geom)) \
             from {code}{year} where geom is not null"
        )
    }
}

impl std::fmt::Display for LayerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.kind.table_code(), self.release_year)
    }
}

/// Statements that drop and recreate a display table.
pub fn create_display_table_sql(kind: LayerKind) -> Vec<String> {
    let code = kind.table_code();
    vec![
        format!("drop table if exists {code}_disp"),
        format!(
            "create table {code}_disp ({code}_code varchar({width}) primary key, \
             name varchar(50), lon double precision, lat double precision, \
             geojson varchar, geom GEOMETRY(MULTIPOLYGON,4283))",
            width = kind.code_width()
        ),
    ]
}

/// Statements that drop and recreate the derived postcode assignment table:
/// one row per postal area, one nullable column per coarse layer.
pub fn create_postcode_table_sql() -> Vec<String> {
    vec![
        "drop table if exists postcode".to_string(),
        "create table postcode (poa_code varchar(4) primary key, \
         lga_code varchar(5), ste_code varchar(1), sed_code varchar(5), \
         ced_code varchar(3))"
            .to_string(),
    ]
}

/// States have no source table of their own; collect codes, names and
/// centroids from the LGA rows that carry them.
pub fn populate_state_display_sql(lga: &LayerTable) -> String {
    let year = &lga.release_year;
    format!(
        "insert into ste_disp (ste_code, name, lat, lon) \
         select ste_code{year}, ste_name{year}, \
         ST_Y(ST_Centroid(ST_Collect(f.geom))), ST_X(ST_Centroid(ST_Collect(f.geom))) \
         from (select ste_code{year}, ste_name{year}, (ST_Dump(geom)).geom \
         from lga{year}) as f group by f.ste_code{year}, f.ste_name{year}"
    )
}

pub fn update_display_geom_sql(kind: LayerKind) -> String {
    let code = kind.table_code();
    format!("update {code}_disp set geom = ST_GeomFromEWKB($1) where {code}_code = $2")
}

/// Refresh the derived GeoJSON representation after geometry writes.
pub fn refresh_geojson_sql(kind: LayerKind) -> String {
    format!(
        "update {}_disp set geojson = ST_AsGeoJSON(geom,6,0) where geom is not null",
        kind.table_code()
    )
}

pub fn insert_postcode_sql() -> &'static str {
    "insert into postcode(poa_code, lga_code, ste_code, sed_code, ced_code) \
     values ($1,$2,$3,$4,$5)"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_sql_matches_published_naming() {
        let poa = LayerTable::new(LayerKind::Poa, "2021");
        assert_eq!(
            poa.select_sql(),
            "select poa_code2021, poa_name2021, ST_AsEWKB(geom) \
             from poa2021 where geom is not null"
        );
        assert_eq!(poa.source_table(), "poa2021");
    }

    #[test]
    fn lga_select_carries_state_code() {
        let lga = LayerTable::new(LayerKind::Lga, "2020");
        assert_eq!(
            lga.select_sql(),
            "select lga_code2020, lga_name2020, ste_code2020, ST_AsEWKB(geom) \
             from lga2020 where geom is not null"
        );
    }

    #[test]
    fn display_updates_are_keyed_without_year() {
        assert_eq!(
            update_display_geom_sql(LayerKind::Sed),
            "update sed_disp set geom = ST_GeomFromEWKB($1) where sed_code = $2"
        );
        assert_eq!(
            refresh_geojson_sql(LayerKind::Ste),
            "update ste_disp set geojson = ST_AsGeoJSON(geom,6,0) where geom is not null"
        );
    }

    #[test]
    fn display_table_widths_follow_code_sizes() {
        let stmts = create_display_table_sql(LayerKind::Ced);
        assert_eq!(stmts[0], "drop table if exists ced_disp");
        assert!(stmts[1].contains("ced_code varchar(3) primary key"));
    }
}
