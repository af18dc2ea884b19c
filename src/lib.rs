//! cropview: Cropland Classification vs. Optical Imagery Comparison
//!
//! This library builds lazy image-collection pipelines that filter Sentinel-2
//! scenes by date, cloud cover and boundary, mask clouds from the QA60
//! bitmask, and composite WorldCereal classification rasters filtered by
//! product, season and agro-ecological zone. Rasters are pulled from a
//! caller-supplied store and handed to a caller-supplied renderer.

pub mod types;
pub mod geometry;
pub mod core;
pub mod io;
pub mod pipeline;
pub mod render;
pub mod config;
pub mod comparison;

// Re-export main types and functions for easier access
pub use types::{
    BoundingBox, CropError, CropResult, GeoTransform, Image, ImageCollection, PixelGrid,
    PropertyCatalog, PropertyKind, PropertyValue, RasterSchema,
};

pub use geometry::{Boundary, Polygon};
pub use core::{
    BitmaskDecoder, ClassMaskParams, ClassMasker, CloudMaskParams, CloudMasker, CollectionFilter,
    Comparison, Mosaicker, Predicate, TemporalAggregator,
};
pub use io::{BoundarySource, MemoryStore, RasterStore};
pub use pipeline::{ImageTransform, LazyCollection, LazyImage};
pub use render::{
    Layer, LayerOutcome, LayerStack, MapView, RenderedContent, RenderedLayer, Renderer,
    VisualizationSpec,
};
pub use config::{ClassificationConfig, ComparisonConfig, OpticalConfig, ProductLayer};
pub use comparison::CropComparison;
