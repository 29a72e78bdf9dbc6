//! EWKB encode/decode between PostGIS and geo-types.

use anyhow::{bail, Context, Result};
use geo::{Geometry, MultiPolygon};
use geozero::wkb::Ewkb;
use geozero::{CoordDimensions, ToGeo, ToWkb};

/// GDA94 geographic coordinates, as published with the source datasets.
pub const GDA94_SRID: i32 = 4283;

/// Decode an EWKB value into a MultiPolygon. Single polygons are promoted
/// to one-element multi-polygons; any other geometry type is rejected.
pub fn decode_multipolygon(bytes: &[u8]) -> Result<MultiPolygon<f64>> {
    let geometry = Ewkb(bytes).to_geo().context("malformed EWKB geometry")?;
    match geometry {
        Geometry::MultiPolygon(mp) => Ok(mp),
        Geometry::Polygon(p) => Ok(MultiPolygon::new(vec![p])),
        _ => bail!("expected polygonal geometry in EWKB value"),
    }
}

/// Encode a MultiPolygon as two-dimensional EWKB tagged with the GDA94 SRID.
pub fn encode_multipolygon(geom: &MultiPolygon<f64>) -> Result<Vec<u8>> {
    Geometry::MultiPolygon(geom.clone())
        .to_ewkb(CoordDimensions::xy(), Some(GDA94_SRID))
        .context("EWKB encoding failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, LineString, Polygon};

    #[test]
    fn round_trip_preserves_every_vertex() {
        let with_hole = Polygon::new(
            LineString::from(vec![
                (145.0, -37.0),
                (146.5, -37.0),
                (146.5, -38.25),
                (145.0, -38.25),
                (145.0, -37.0),
            ]),
            vec![LineString::from(vec![
                (145.5, -37.5),
                (145.5, -37.75),
                (145.75, -37.75),
                (145.5, -37.5),
            ])],
        );
        let plain = polygon![
            (x: 148.0, y: -35.0),
            (x: 148.1, y: -35.0),
            (x: 148.1, y: -35.1),
            (x: 148.0, y: -35.0),
        ];
        let original = MultiPolygon::new(vec![with_hole, plain]);

        let bytes = encode_multipolygon(&original).unwrap();
        let decoded = decode_multipolygon(&bytes).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn rejects_non_polygonal_geometry() {
        let line = Geometry::LineString(LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]));
        let bytes = line.to_ewkb(CoordDimensions::xy(), Some(GDA94_SRID)).unwrap();
        assert!(decode_multipolygon(&bytes).is_err());
    }
}
