//! Best-overlap assignment of fine regions to coarse layers.
//!
//! For every fine region and each registered coarse layer, picks the coarse
//! region that fully covers the fine region, or failing that the one with
//! the largest intersection area. Containment is scored with a sentinel no
//! overlap area can exceed, so a region strictly inside one coarse region
//! never loses to a boundary sliver shared with a neighbour.

use std::collections::BTreeMap;

use geo::{Area, BooleanOps, BoundingRect, Relate};
use rstar::{RTree, RTreeObject, AABB};
use tracing::{info, warn};

use crate::models::{LayerKind, Region};

/// R-tree entry: a coarse region's bounding box plus its registration index.
struct IndexedCoarse {
    envelope: AABB<[f64; 2]>,
    idx: usize,
}

impl RTreeObject for IndexedCoarse {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

struct CoarseLayer {
    kind: LayerKind,
    regions: Vec<Region>,
    tree: RTree<IndexedCoarse>,
}

/// One fine region's parent assignment: per coarse layer, the best-matching
/// coarse code or null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub fine_code: String,
    pub parents: BTreeMap<LayerKind, Option<String>>,
}

/// Nested-loop overlay join, O(F x C) per layer over bounding-box filtered
/// candidates. Adequate for national administrative datasets (low thousands
/// of regions per layer); the R-tree prefilter trims the constant factor but
/// the quadratic scan is the scalability ceiling.
#[derive(Default)]
pub struct OverlayMatcher {
    layers: Vec<CoarseLayer>,
}

impl OverlayMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a coarse layer. Layers are matched in registration order,
    /// and so are candidates within a layer.
    pub fn add_layer(&mut self, kind: LayerKind, regions: Vec<Region>) {
        let indexed: Vec<IndexedCoarse> = regions
            .iter()
            .enumerate()
            .filter_map(|(idx, r)| {
                r.geom.bounding_rect().map(|rect| IndexedCoarse {
                    envelope: AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                    idx,
                })
            })
            .collect();
        let tree = RTree::bulk_load(indexed);
        info!(layer = %kind, regions = regions.len(), "coarse layer registered");
        self.layers.push(CoarseLayer { kind, regions, tree });
    }

    /// Assign every fine region a parent per coarse layer. Unmatched pairs
    /// get a null assignment and a diagnostic; they never fail the run.
    pub fn match_all(&self, fine: &[Region]) -> Vec<Assignment> {
        fine.iter().map(|f| self.match_one(f)).collect()
    }

    fn match_one(&self, fine: &Region) -> Assignment {
        let mut parents = BTreeMap::new();
        for layer in &self.layers {
            let best = match_layer(fine, layer);
            if best.is_none() {
                warn!(fine = %fine.code, layer = %layer.kind, "no matching coarse region");
            }
            parents.insert(layer.kind, best);
        }
        Assignment {
            fine_code: fine.code.clone(),
            parents,
        }
    }
}

fn match_layer(fine: &Region, layer: &CoarseLayer) -> Option<String> {
    let rect = fine.geom.bounding_rect()?;
    let envelope = AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]);

    // candidates back in registration order, so tie behaviour matches the
    // plain nested loop
    let mut candidates: Vec<usize> = layer
        .tree
        .locate_in_envelope_intersecting(&envelope)
        .map(|ic| ic.idx)
        .collect();
    candidates.sort_unstable();

    let mut best_score = 0.0_f64;
    let mut best: Option<&Region> = None;
    for idx in candidates {
        let coarse = &layer.regions[idx];
        let matrix = fine.geom.relate(&coarse.geom);
        if matrix.is_within() || matrix.is_equal_topo() {
            // fully covered scores as an unbeatable maximum; since scores
            // compare strictly greater, no later candidate could override
            // it, so stop scanning
            best = Some(coarse);
            break;
        }
        if !matrix.is_intersects() || matrix.is_contains() {
            continue;
        }
        // the intersection may be multi-part; unsigned_area sums every part
        let shared = fine.geom.intersection(&coarse.geom);
        let area = shared.unsigned_area();
        if area > best_score {
            best_score = area;
            best = Some(coarse);
        }
    }
    best.map(|r| r.code.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon, Polygon};

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon<f64> {
        polygon![
            (x: x0, y: y0),
            (x: x1, y: y0),
            (x: x1, y: y1),
            (x: x0, y: y1),
            (x: x0, y: y0),
        ]
    }

    fn region(code: &str, poly: Polygon<f64>) -> Region {
        Region::new(code, code.to_uppercase(), MultiPolygon::new(vec![poly]))
    }

    fn parent(assignments: &[Assignment], fine: &str, layer: LayerKind) -> Option<String> {
        assignments
            .iter()
            .find(|a| a.fine_code == fine)
            .and_then(|a| a.parents.get(&layer).cloned())
            .flatten()
    }

    #[test]
    fn largest_overlap_wins() {
        // fine overlaps A with area 60 and B with area 40, disjoint from C
        let mut matcher = OverlayMatcher::new();
        matcher.add_layer(
            LayerKind::Lga,
            vec![
                region("a", rect(0.0, 0.0, 10.0, 10.0)),
                region("b", rect(10.0, 0.0, 20.0, 10.0)),
                region("c", rect(20.0, 0.0, 30.0, 10.0)),
            ],
        );
        let fine = vec![region("f", rect(4.0, 0.0, 14.0, 10.0))];
        let out = matcher.match_all(&fine);
        assert_eq!(parent(&out, "f", LayerKind::Lga), Some("a".into()));

        // result must not depend on registration order
        let mut reversed = OverlayMatcher::new();
        reversed.add_layer(
            LayerKind::Lga,
            vec![
                region("c", rect(20.0, 0.0, 30.0, 10.0)),
                region("b", rect(10.0, 0.0, 20.0, 10.0)),
                region("a", rect(0.0, 0.0, 10.0, 10.0)),
            ],
        );
        let out = reversed.match_all(&fine);
        assert_eq!(parent(&out, "f", LayerKind::Lga), Some("a".into()));
    }

    #[test]
    fn containment_beats_any_overlap() {
        // fine is inside A but also overlaps B; B is evaluated first and
        // accumulates a real overlap area, which the sentinel must override
        let mut matcher = OverlayMatcher::new();
        matcher.add_layer(
            LayerKind::Sed,
            vec![
                region("b", rect(5.0, 0.0, 15.0, 10.0)),
                region("a", rect(0.0, 0.0, 10.0, 10.0)),
            ],
        );
        let fine = vec![region("f", rect(2.0, 4.0, 9.0, 6.0))];
        let out = matcher.match_all(&fine);
        assert_eq!(parent(&out, "f", LayerKind::Sed), Some("a".into()));

        let mut swapped = OverlayMatcher::new();
        swapped.add_layer(
            LayerKind::Sed,
            vec![
                region("a", rect(0.0, 0.0, 10.0, 10.0)),
                region("b", rect(5.0, 0.0, 15.0, 10.0)),
            ],
        );
        let out = swapped.match_all(&fine);
        assert_eq!(parent(&out, "f", LayerKind::Sed), Some("a".into()));
    }

    #[test]
    fn boundary_sliver_does_not_steal_contained_region() {
        // fine sits strictly inside D and touches E along the shared border;
        // the zero-area contact must not out-score the containment sentinel
        let mut matcher = OverlayMatcher::new();
        matcher.add_layer(
            LayerKind::Ced,
            vec![
                region("e", rect(10.0, 0.0, 20.0, 10.0)),
                region("d", rect(0.0, 0.0, 10.0, 10.0)),
            ],
        );
        let fine = vec![region("f", rect(2.0, 2.0, 10.0, 8.0))];
        let out = matcher.match_all(&fine);
        assert_eq!(parent(&out, "f", LayerKind::Ced), Some("d".into()));
    }

    #[test]
    fn disjoint_fine_region_gets_null() {
        let mut matcher = OverlayMatcher::new();
        matcher.add_layer(
            LayerKind::Lga,
            vec![region("a", rect(0.0, 0.0, 10.0, 10.0))],
        );
        let fine = vec![region("far", rect(100.0, 100.0, 110.0, 110.0))];
        let out = matcher.match_all(&fine);
        assert_eq!(out.len(), 1);
        assert_eq!(parent(&out, "far", LayerKind::Lga), None);
        assert_eq!(out[0].parents.get(&LayerKind::Lga), Some(&None));
    }

    #[test]
    fn matching_is_idempotent() {
        let mut matcher = OverlayMatcher::new();
        matcher.add_layer(
            LayerKind::Lga,
            vec![
                region("a", rect(0.0, 0.0, 10.0, 10.0)),
                region("b", rect(10.0, 0.0, 20.0, 10.0)),
            ],
        );
        matcher.add_layer(
            LayerKind::Ced,
            vec![region("x", rect(0.0, 0.0, 20.0, 10.0))],
        );
        let fine = vec![
            region("f1", rect(1.0, 1.0, 6.0, 6.0)),
            region("f2", rect(8.0, 0.0, 13.0, 10.0)),
        ];
        let first = matcher.match_all(&fine);
        let second = matcher.match_all(&fine);
        assert_eq!(first, second);
    }

    #[test]
    fn layers_are_assigned_independently() {
        let mut matcher = OverlayMatcher::new();
        matcher.add_layer(
            LayerKind::Lga,
            vec![region("a", rect(0.0, 0.0, 10.0, 10.0))],
        );
        matcher.add_layer(
            LayerKind::Sed,
            vec![region("s", rect(50.0, 50.0, 60.0, 60.0))],
        );
        let fine = vec![region("f", rect(1.0, 1.0, 5.0, 5.0))];
        let out = matcher.match_all(&fine);
        assert_eq!(parent(&out, "f", LayerKind::Lga), Some("a".into()));
        assert_eq!(parent(&out, "f", LayerKind::Sed), None);
    }
}
