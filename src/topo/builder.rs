//! Staged builder for cross-layer boundary simplification.
//!
//! Nodes and edges live in index-addressed arenas owned by the builder;
//! rings reference edges as `(index, direction)` pairs so an edge shared by
//! several regions exists exactly once.

use geo::{Coord, LineString, MultiPolygon, Polygon, Simplify, Validation};
use hashbrown::hash_map::Entry;
use hashbrown::{HashMap, HashSet};
use tracing::info;

use super::TopoError;
use crate::models::{LayerKind, Region};

/// Node-identity grid. Coordinates are snapped to 1e-7 degrees (roughly a
/// centimetre for geographic data) before comparison, replacing the exact
/// floating-point equality the published datasets happen to satisfy.
const NODE_GRID: f64 = 1.0e7;

type CoordKey = (i64, i64);

fn key_of(c: Coord<f64>) -> CoordKey {
    ((c.x * NODE_GRID).round() as i64, (c.y * NODE_GRID).round() as i64)
}

/// Pipeline stage. Transitions are strictly ordered; invoking a step from
/// any other stage is an [`TopoError::InvalidState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Empty,
    Loaded,
    NodesFound,
    EdgesBuilt,
    Simplified,
    Reassembled,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Empty => "Empty",
            Stage::Loaded => "Loaded",
            Stage::NodesFound => "NodesFound",
            Stage::EdgesBuilt => "EdgesBuilt",
            Stage::Simplified => "Simplified",
            Stage::Reassembled => "Reassembled",
        };
        f.write_str(name)
    }
}

/// A maximal coordinate run between two nodes, stored once in canonical
/// orientation and shared by every ring that traverses it.
struct Edge {
    coords: Vec<Coord<f64>>,
}

impl Edge {
    fn is_loop(&self) -> bool {
        self.coords.len() > 1 && key_of(self.coords[0]) == key_of(self.coords[self.coords.len() - 1])
    }
}

/// One ring traversal. Coordinates are kept from registration until edges
/// are built, after which the ring is a list of oriented edge references.
struct RingTopo {
    coords: Vec<Coord<f64>>,
    edges: Vec<(usize, bool)>,
}

impl RingTopo {
    fn new(coords: Vec<Coord<f64>>) -> Self {
        Self {
            coords,
            edges: Vec::new(),
        }
    }
}

struct PolygonTopo {
    exterior: RingTopo,
    holes: Vec<RingTopo>,
}

struct RegionEntry {
    layer: LayerKind,
    code: String,
    polygons: Vec<PolygonTopo>,
}

/// A region's simplified replacement geometry.
#[derive(Debug, Clone)]
pub struct ThinnedRegion {
    pub layer: LayerKind,
    pub code: String,
    pub geom: MultiPolygon<f64>,
}

/// Neighbour record for junction detection: the unordered pair of adjacent
/// coordinates seen on the first traversal through a coordinate.
struct CoordUse {
    neighbours: (CoordKey, CoordKey),
    node: bool,
}

/// Cross-layer topology builder.
///
/// Stage machine: `Empty -> Loaded -> NodesFound -> EdgesBuilt -> Simplified
/// -> Reassembled`, one call per transition, no skipping.
pub struct TopoBuilder {
    stage: Stage,
    regions: Vec<RegionEntry>,
    nodes: HashSet<CoordKey>,
    edges: Vec<Edge>,
    edge_index: HashMap<Vec<CoordKey>, usize>,
}

impl Default for TopoBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TopoBuilder {
    pub fn new() -> Self {
        Self {
            stage: Stage::Empty,
            regions: Vec::new(),
            nodes: HashSet::new(),
            edges: Vec::new(),
            edge_index: HashMap::new(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn expect(&self, want: Stage, called: &'static str) -> Result<(), TopoError> {
        if self.stage == want {
            Ok(())
        } else {
            Err(TopoError::InvalidState {
                called,
                actual: self.stage,
            })
        }
    }

    /// Register a region's rings for processing. No geometric work happens
    /// here beyond validation of the input rings.
    pub fn add_region(&mut self, layer: LayerKind, region: &Region) -> Result<(), TopoError> {
        if !matches!(self.stage, Stage::Empty | Stage::Loaded) {
            return Err(TopoError::InvalidState {
                called: "add_region",
                actual: self.stage,
            });
        }
        let invalid = |reason| TopoError::InvalidGeometry {
            layer,
            code: region.code.clone(),
            reason,
        };

        let mut polygons = Vec::with_capacity(region.geom.0.len());
        for poly in &region.geom {
            if !poly.is_valid() {
                return Err(invalid("polygon ring is self-intersecting or malformed"));
            }
            let exterior = open_ring(poly.exterior()).ok_or_else(|| invalid("degenerate exterior ring"))?;
            let mut holes = Vec::with_capacity(poly.interiors().len());
            for hole in poly.interiors() {
                holes.push(RingTopo::new(
                    open_ring(hole).ok_or_else(|| invalid("degenerate interior ring"))?,
                ));
            }
            polygons.push(PolygonTopo {
                exterior: RingTopo::new(exterior),
                holes,
            });
        }

        self.regions.push(RegionEntry {
            layer,
            code: region.code.clone(),
            polygons,
        });
        self.stage = Stage::Loaded;
        Ok(())
    }

    /// Scan every ring of every registered region and mark the coordinates
    /// that bound edges: ring start points, and junctions where two or more
    /// traversals pass through a coordinate with different neighbours.
    ///
    /// Coordinates interior to a run traversed identically by several rings
    /// are deliberately not nodes: the whole run becomes one shared edge,
    /// which is what keeps adjacent regions seamless after simplification.
    /// Requires every region to be registered first, since junctions depend
    /// on boundaries shared across layers.
    pub fn find_nodes(&mut self) -> Result<(), TopoError> {
        self.expect(Stage::Loaded, "find_nodes")?;

        let mut uses: HashMap<CoordKey, CoordUse> = HashMap::new();
        for region in &self.regions {
            for poly in &region.polygons {
                scan_ring(&mut uses, &poly.exterior.coords);
                for hole in &poly.holes {
                    scan_ring(&mut uses, &hole.coords);
                }
            }
        }

        self.nodes = uses
            .iter()
            .filter(|(_, u)| u.node)
            .map(|(k, _)| *k)
            .collect();
        info!(
            nodes = self.nodes.len(),
            coordinates = uses.len(),
            "node discovery complete"
        );
        self.stage = Stage::NodesFound;
        Ok(())
    }

    /// Split every ring into edges at node occurrences. Each distinct edge
    /// is registered once; later traversals reuse it and record direction.
    pub fn create_edges(&mut self) -> Result<(), TopoError> {
        self.expect(Stage::NodesFound, "create_edges")?;

        let Self {
            regions,
            nodes,
            edges,
            edge_index,
            ..
        } = self;
        for region in regions.iter_mut() {
            for poly in region.polygons.iter_mut() {
                build_ring_edges(&mut poly.exterior, nodes, edges, edge_index);
                for hole in poly.holes.iter_mut() {
                    build_ring_edges(hole, nodes, edges, edge_index);
                }
            }
        }

        info!(edges = self.edges.len(), "edge extraction complete");
        self.stage = Stage::EdgesBuilt;
        Ok(())
    }

    /// Simplify each unique edge exactly once with Douglas-Peucker. Edge
    /// endpoints never move, so adjoining edges still connect, and an edge
    /// shared by N rings is simplified identically for all N.
    pub fn simplify_edges(&mut self, tolerance: f64) -> Result<(), TopoError> {
        self.expect(Stage::EdgesBuilt, "simplify_edges")?;

        let before: usize = self.edges.iter().map(|e| e.coords.len()).sum();
        for edge in &mut self.edges {
            let thinned = LineString::from(edge.coords.clone()).simplify(tolerance).0;
            // a loop edge collapsed below ring size cannot close a polygon;
            // keep its original run
            if edge.is_loop() && thinned.len() < 4 {
                continue;
            }
            edge.coords = thinned;
        }
        let after: usize = self.edges.iter().map(|e| e.coords.len()).sum();
        info!(
            coordinates_before = before,
            coordinates_after = after,
            tolerance,
            "edge simplification complete"
        );
        self.stage = Stage::Simplified;
        Ok(())
    }

    /// Rebuild each region's rings from its oriented simplified edges and
    /// validate the result. Two adjacent simplified edges can theoretically
    /// cross; that surfaces here as [`TopoError::Simplification`].
    pub fn reassemble(&mut self) -> Result<Vec<ThinnedRegion>, TopoError> {
        self.expect(Stage::Simplified, "reassemble")?;

        let mut out = Vec::with_capacity(self.regions.len());
        for region in &self.regions {
            let mut polygons = Vec::with_capacity(region.polygons.len());
            for poly in &region.polygons {
                let exterior = self.rebuild_ring(&poly.exterior, region)?;
                let holes = poly
                    .holes
                    .iter()
                    .map(|h| self.rebuild_ring(h, region))
                    .collect::<Result<Vec<_>, _>>()?;
                let rebuilt = Polygon::new(exterior, holes);
                if !rebuilt.is_valid() {
                    return Err(TopoError::Simplification {
                        layer: region.layer,
                        code: region.code.clone(),
                        reason: "rebuilt polygon fails validity check",
                    });
                }
                polygons.push(rebuilt);
            }
            out.push(ThinnedRegion {
                layer: region.layer,
                code: region.code.clone(),
                geom: MultiPolygon::new(polygons),
            });
        }
        self.stage = Stage::Reassembled;
        Ok(out)
    }

    fn rebuild_ring(&self, ring: &RingTopo, region: &RegionEntry) -> Result<LineString<f64>, TopoError> {
        let mut coords: Vec<Coord<f64>> = Vec::new();
        for &(idx, forward) in &ring.edges {
            let mut segment = self.edges[idx].coords.clone();
            if !forward {
                segment.reverse();
            }
            let skip = match (coords.last(), segment.first()) {
                (Some(&tail), Some(&head)) if key_of(tail) == key_of(head) => 1,
                _ => 0,
            };
            coords.extend(segment.into_iter().skip(skip));
        }
        // the last edge runs back to the ring start; close on the exact
        // start coordinate
        if coords.len() > 1 && key_of(coords[0]) == key_of(coords[coords.len() - 1]) {
            coords.pop();
        }
        if coords.len() < 3 {
            return Err(TopoError::Simplification {
                layer: region.layer,
                code: region.code.clone(),
                reason: "ring collapsed below three distinct coordinates",
            });
        }
        let start = coords[0];
        coords.push(start);
        Ok(LineString::from(coords))
    }
}

/// Strip the closing duplicate and any quantized-duplicate neighbours from a
/// ring, returning its open representation. `None` for degenerate rings.
fn open_ring(ring: &LineString<f64>) -> Option<Vec<Coord<f64>>> {
    if !ring.is_closed() || ring.0.len() < 4 {
        return None;
    }
    let mut out: Vec<Coord<f64>> = Vec::with_capacity(ring.0.len() - 1);
    for &c in &ring.0[..ring.0.len() - 1] {
        if out.last().map(|&p| key_of(p)) != Some(key_of(c)) {
            out.push(c);
        }
    }
    while out.len() > 1 && key_of(out[0]) == key_of(out[out.len() - 1]) {
        out.pop();
    }
    if out.len() < 3 {
        return None;
    }
    Some(out)
}

fn scan_ring(uses: &mut HashMap<CoordKey, CoordUse>, coords: &[Coord<f64>]) {
    let n = coords.len();
    for i in 0..n {
        let key = key_of(coords[i]);
        let prev = key_of(coords[(i + n - 1) % n]);
        let next = key_of(coords[(i + 1) % n]);
        let pair = if prev <= next { (prev, next) } else { (next, prev) };
        let is_start = i == 0;
        match uses.entry(key) {
            Entry::Occupied(mut entry) => {
                let u = entry.get_mut();
                if is_start || u.neighbours != pair {
                    u.node = true;
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(CoordUse {
                    neighbours: pair,
                    node: is_start,
                });
            }
        }
    }
}

fn build_ring_edges(
    ring: &mut RingTopo,
    nodes: &HashSet<CoordKey>,
    edges: &mut Vec<Edge>,
    edge_index: &mut HashMap<Vec<CoordKey>, usize>,
) {
    let coords = &ring.coords;
    let n = coords.len();
    let node_pos: Vec<usize> = (0..n)
        .filter(|&i| nodes.contains(&key_of(coords[i])))
        .collect();
    // the ring start is always a node, so node_pos[0] == 0
    let m = node_pos.len();
    for j in 0..m {
        let from = node_pos[j];
        let to = if j + 1 < m { node_pos[j + 1] } else { n };
        let mut seq = Vec::with_capacity(to - from + 1);
        for i in from..=to {
            seq.push(coords[i % n]);
        }
        register_edge(&mut ring.edges, seq, edges, edge_index);
    }
    ring.coords = Vec::new();
}

fn register_edge(
    ring_edges: &mut Vec<(usize, bool)>,
    seq: Vec<Coord<f64>>,
    edges: &mut Vec<Edge>,
    edge_index: &mut HashMap<Vec<CoordKey>, usize>,
) {
    let keys: Vec<CoordKey> = seq.iter().map(|&c| key_of(c)).collect();
    let reversed: Vec<CoordKey> = keys.iter().rev().copied().collect();
    let (canonical, forward) = if keys <= reversed {
        (keys, true)
    } else {
        (reversed, false)
    };
    let idx = match edge_index.entry(canonical) {
        Entry::Occupied(entry) => *entry.get(),
        Entry::Vacant(entry) => {
            let coords = if forward {
                seq
            } else {
                seq.into_iter().rev().collect()
            };
            edges.push(Edge { coords });
            let idx = edges.len() - 1;
            entry.insert(idx);
            idx
        }
    };
    ring_edges.push((idx, forward));
}
