//! Vector boundaries used as spatial filters and rendered outlines

use crate::types::{BoundingBox, CropError, CropResult};
use serde::{Deserialize, Serialize};

/// Ring vertex as (lon, lat)
pub type Vertex = (f64, f64);

/// Simple polygon with optional holes. Rings are implicitly closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    exterior: Vec<Vertex>,
    #[serde(default)]
    holes: Vec<Vec<Vertex>>,
}

impl Polygon {
    pub fn new(exterior: Vec<Vertex>) -> CropResult<Self> {
        validate_ring(&exterior)?;
        Ok(Self {
            exterior,
            holes: Vec::new(),
        })
    }

    /// Axis-aligned rectangle as a polygon
    pub fn rectangle(bbox: &BoundingBox) -> Self {
        Self {
            exterior: bbox.corners().to_vec(),
            holes: Vec::new(),
        }
    }

    pub fn with_hole(mut self, hole: Vec<Vertex>) -> CropResult<Self> {
        validate_ring(&hole)?;
        self.holes.push(hole);
        Ok(self)
    }

    pub fn exterior(&self) -> &[Vertex] {
        &self.exterior
    }

    pub fn holes(&self) -> &[Vec<Vertex>] {
        &self.holes
    }

    pub fn bounding_box(&self) -> BoundingBox {
        ring_bounds(&self.exterior)
    }

    /// Point-in-polygon by ray casting; points inside a hole are outside
    pub fn contains_point(&self, lon: f64, lat: f64) -> bool {
        ring_contains(&self.exterior, lon, lat)
            && !self.holes.iter().any(|hole| ring_contains(hole, lon, lat))
    }

    /// True when the polygon and the rectangle share any area or edge
    pub fn intersects_box(&self, bbox: &BoundingBox) -> bool {
        if !self.bounding_box().intersects(bbox) {
            return false;
        }

        // Polygon reaches into the box
        if self
            .exterior
            .iter()
            .any(|&(lon, lat)| bbox.contains_point(lon, lat))
        {
            return true;
        }

        // Box lies (at least partly) inside the polygon
        if bbox
            .corners()
            .iter()
            .any(|&(lon, lat)| self.contains_point(lon, lat))
        {
            return true;
        }

        let box_ring = bbox.corners();
        let rings = std::iter::once(&self.exterior).chain(self.holes.iter());
        for ring in rings {
            for (a, b) in ring_edges(ring) {
                for (c, d) in ring_edges(&box_ring) {
                    if segments_intersect(a, b, c, d) {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Signed shoelace area of the exterior ring (positive when counter-clockwise)
    fn signed_area(&self) -> f64 {
        ring_edges(&self.exterior)
            .map(|((x0, y0), (x1, y1))| x0 * y1 - x1 * y0)
            .sum::<f64>()
            / 2.0
    }

    /// Area-weighted centroid of the exterior ring
    fn centroid_with_area(&self) -> (f64, f64, f64) {
        let area = self.signed_area();
        if area.abs() < f64::EPSILON {
            let (lon, lat) = self.bounding_box().center();
            return (lon, lat, 0.0);
        }
        let (mut cx, mut cy) = (0.0, 0.0);
        for ((x0, y0), (x1, y1)) in ring_edges(&self.exterior) {
            let cross = x0 * y1 - x1 * y0;
            cx += (x0 + x1) * cross;
            cy += (y0 + y1) * cross;
        }
        (cx / (6.0 * area), cy / (6.0 * area), area.abs())
    }
}

/// Named polygon / multi-polygon feature set.
///
/// A boundary owns no raster data; the pipeline only tests image footprints
/// against it and hands it to the renderer as an outline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Boundary {
    name: String,
    polygons: Vec<Polygon>,
}

impl Boundary {
    pub fn new(name: impl Into<String>, polygons: Vec<Polygon>) -> CropResult<Self> {
        let name = name.into();
        if polygons.is_empty() {
            return Err(CropError::InvalidGeometry(format!(
                "boundary '{}' has no polygons",
                name
            )));
        }
        Ok(Self { name, polygons })
    }

    pub fn from_bbox(name: impl Into<String>, bbox: &BoundingBox) -> Self {
        Self {
            name: name.into(),
            polygons: vec![Polygon::rectangle(bbox)],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let mut polygons = self.polygons.iter();
        // Constructors guarantee at least one polygon
        let first = polygons
            .next()
            .map(Polygon::bounding_box)
            .unwrap_or_else(|| BoundingBox::new(0.0, 0.0, 0.0, 0.0));
        polygons.fold(first, |acc, polygon| acc.union(&polygon.bounding_box()))
    }

    pub fn intersects(&self, bbox: &BoundingBox) -> bool {
        self.polygons.iter().any(|polygon| polygon.intersects_box(bbox))
    }

    pub fn contains_point(&self, lon: f64, lat: f64) -> bool {
        self.polygons.iter().any(|polygon| polygon.contains_point(lon, lat))
    }

    /// Area-weighted centroid over all polygons, falling back to the
    /// bounding-box center for degenerate geometry
    pub fn centroid(&self) -> (f64, f64) {
        let (mut lon, mut lat, mut total) = (0.0, 0.0, 0.0);
        for polygon in &self.polygons {
            let (cx, cy, area) = polygon.centroid_with_area();
            lon += cx * area;
            lat += cy * area;
            total += area;
        }
        if total > 0.0 {
            (lon / total, lat / total)
        } else {
            self.bounding_box().center()
        }
    }
}

fn validate_ring(ring: &[Vertex]) -> CropResult<()> {
    if ring.len() < 3 {
        return Err(CropError::InvalidGeometry(format!(
            "ring needs at least 3 vertices, got {}",
            ring.len()
        )));
    }
    if ring.iter().any(|(lon, lat)| !lon.is_finite() || !lat.is_finite()) {
        return Err(CropError::InvalidGeometry(
            "ring contains non-finite coordinates".to_string(),
        ));
    }
    Ok(())
}

fn ring_bounds(ring: &[Vertex]) -> BoundingBox {
    let mut bbox = BoundingBox {
        min_lon: f64::INFINITY,
        max_lon: f64::NEG_INFINITY,
        min_lat: f64::INFINITY,
        max_lat: f64::NEG_INFINITY,
    };
    for &(lon, lat) in ring {
        bbox.min_lon = bbox.min_lon.min(lon);
        bbox.max_lon = bbox.max_lon.max(lon);
        bbox.min_lat = bbox.min_lat.min(lat);
        bbox.max_lat = bbox.max_lat.max(lat);
    }
    bbox
}

fn ring_edges(ring: &[Vertex]) -> impl Iterator<Item = (Vertex, Vertex)> + '_ {
    ring.iter()
        .enumerate()
        .map(move |(i, &a)| (a, ring[(i + 1) % ring.len()]))
}

fn ring_contains(ring: &[Vertex], lon: f64, lat: f64) -> bool {
    let mut inside = false;
    for ((x0, y0), (x1, y1)) in ring_edges(ring) {
        if (y0 > lat) != (y1 > lat) {
            let x_cross = x0 + (lat - y0) * (x1 - x0) / (y1 - y0);
            if lon < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}

fn orientation(a: Vertex, b: Vertex, c: Vertex) -> f64 {
    (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0)
}

fn on_segment(a: Vertex, b: Vertex, p: Vertex) -> bool {
    p.0 >= a.0.min(b.0) && p.0 <= a.0.max(b.0) && p.1 >= a.1.min(b.1) && p.1 <= a.1.max(b.1)
}

fn segments_intersect(a: Vertex, b: Vertex, c: Vertex, d: Vertex) -> bool {
    let d1 = orientation(c, d, a);
    let d2 = orientation(c, d, b);
    let d3 = orientation(a, b, c);
    let d4 = orientation(a, b, d);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    (d1 == 0.0 && on_segment(c, d, a))
        || (d2 == 0.0 && on_segment(c, d, b))
        || (d3 == 0.0 && on_segment(a, b, c))
        || (d4 == 0.0 && on_segment(a, b, d))
}
