use crate::geometry::Boundary;
use crate::types::{CropError, CropResult, ImageCollection};
use std::collections::HashMap;

/// Source of named raster collections.
///
/// Implementations own fetching, tiling and caching; the pipeline only asks
/// for a collection by name when a graph is materialized.
pub trait RasterStore: Send + Sync {
    fn load_collection(&self, name: &str) -> CropResult<ImageCollection>;
}

/// Source of named vector boundaries
pub trait BoundarySource: Send + Sync {
    fn load_boundary(&self, id: &str) -> CropResult<Boundary>;
}

/// In-memory store for collections and boundaries the caller already holds
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    collections: HashMap<String, ImageCollection>,
    boundaries: HashMap<String, Boundary>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(mut self, name: impl Into<String>, collection: ImageCollection) -> Self {
        self.insert_collection(name, collection);
        self
    }

    pub fn with_boundary(mut self, id: impl Into<String>, boundary: Boundary) -> Self {
        self.insert_boundary(id, boundary);
        self
    }

    pub fn insert_collection(&mut self, name: impl Into<String>, collection: ImageCollection) {
        let name = name.into();
        log::debug!("Registering collection '{}' ({} images)", name, collection.len());
        self.collections.insert(name, collection);
    }

    pub fn insert_boundary(&mut self, id: impl Into<String>, boundary: Boundary) {
        self.boundaries.insert(id.into(), boundary);
    }

    /// Registered collection names, sorted
    pub fn collection_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.collections.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl RasterStore for MemoryStore {
    fn load_collection(&self, name: &str) -> CropResult<ImageCollection> {
        self.collections
            .get(name)
            .cloned()
            .ok_or_else(|| CropError::UnknownCollection(name.to_string()))
    }
}

impl BoundarySource for MemoryStore {
    fn load_boundary(&self, id: &str) -> CropResult<Boundary> {
        self.boundaries
            .get(id)
            .cloned()
            .ok_or_else(|| CropError::UnknownBoundary(id.to_string()))
    }
}
