//! Collaborator seams for loading raster collections and boundaries

pub mod store;

pub use store::{BoundarySource, MemoryStore, RasterStore};
