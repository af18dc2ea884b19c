//! Lazy, pull-based pipeline graph.
//!
//! Building a graph records the transforms and never fails; pixel work and
//! every configuration check happen when `materialize` pulls data from a
//! [`RasterStore`]. Nodes are immutable and `Arc`-shared, so a graph can be
//! cloned cheaply, extended in several directions and materialized from
//! several threads at once. Dropping an unmaterialized graph cancels it.

use crate::core::{
    ClassMaskParams, ClassMasker, CloudMaskParams, CloudMasker, CollectionFilter, Mosaicker, Predicate,
    TemporalAggregator,
};
use crate::geometry::Boundary;
use crate::io::RasterStore;
use crate::types::{CropResult, Image, ImageCollection, PropertyValue, RasterSchema};
use chrono::NaiveDate;
use std::sync::Arc;

/// Per-image transform signature for custom map steps
pub type ImageFn = dyn Fn(&Image) -> CropResult<Image> + Send + Sync;

/// Per-image transform applied by `map`
#[derive(Clone)]
pub enum ImageTransform {
    CloudMask(CloudMaskParams),
    ClassMask(ClassMaskParams),
    Select(Vec<String>),
    Custom { name: String, func: Arc<ImageFn> },
}

impl ImageTransform {
    pub fn custom<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Image) -> CropResult<Image> + Send + Sync + 'static,
    {
        ImageTransform::Custom {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ImageTransform::CloudMask(_) => "cloud_mask",
            ImageTransform::ClassMask(_) => "class_mask",
            ImageTransform::Select(_) => "select",
            ImageTransform::Custom { name, .. } => name,
        }
    }

    pub fn apply(&self, image: &Image) -> CropResult<Image> {
        match self {
            ImageTransform::CloudMask(params) => CloudMasker::new(params.clone()).apply(image),
            ImageTransform::ClassMask(params) => ClassMasker::new(params.clone()).apply(image),
            ImageTransform::Select(bands) => image.select(bands),
            ImageTransform::Custom { func, .. } => (func.as_ref())(image),
        }
    }

    /// Schema of the transformed collection
    fn output_schema(&self, input: &RasterSchema, outputs: &[Image]) -> CropResult<RasterSchema> {
        match self {
            ImageTransform::Select(bands) => input.select(bands),
            ImageTransform::Custom { .. } => Ok(outputs
                .first()
                .map(|image| image.schema().clone())
                .unwrap_or_else(|| input.clone())),
            _ => Ok(input.clone()),
        }
    }
}

impl std::fmt::Debug for ImageTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageTransform::CloudMask(params) => f.debug_tuple("CloudMask").field(params).finish(),
            ImageTransform::ClassMask(params) => f.debug_tuple("ClassMask").field(params).finish(),
            ImageTransform::Select(bands) => f.debug_tuple("Select").field(bands).finish(),
            ImageTransform::Custom { name, .. } => f.debug_struct("Custom").field("name", name).finish(),
        }
    }
}

#[derive(Debug)]
enum CollectionNode {
    Source(String),
    Literal(ImageCollection),
    Filter {
        input: LazyCollection,
        predicate: Predicate,
    },
    Map {
        input: LazyCollection,
        transform: ImageTransform,
    },
    Merge {
        first: LazyCollection,
        second: LazyCollection,
    },
}

/// Deferred image collection
#[derive(Debug, Clone)]
pub struct LazyCollection {
    node: Arc<CollectionNode>,
}

impl LazyCollection {
    fn from_node(node: CollectionNode) -> Self {
        Self { node: Arc::new(node) }
    }

    /// Collection loaded by name from the store at materialization
    pub fn load(name: impl Into<String>) -> Self {
        Self::from_node(CollectionNode::Source(name.into()))
    }

    /// Collection already held in memory
    pub fn from_collection(collection: ImageCollection) -> Self {
        Self::from_node(CollectionNode::Literal(collection))
    }

    pub fn filter(&self, predicate: Predicate) -> Self {
        Self::from_node(CollectionNode::Filter {
            input: self.clone(),
            predicate,
        })
    }

    /// Keep images acquired in `[start, end)`
    pub fn filter_date(&self, start: NaiveDate, end: NaiveDate) -> Self {
        self.filter(Predicate::date_range(start, end))
    }

    /// Keep images whose footprint intersects the boundary
    pub fn filter_bounds(&self, boundary: Arc<Boundary>) -> Self {
        self.filter(Predicate::bounds(boundary))
    }

    /// Keep images matching a textual expression such as `product == "maize"`
    pub fn filter_expression(&self, expression: impl Into<String>) -> Self {
        self.filter(Predicate::expression(expression))
    }

    pub fn filter_eq(&self, property: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.filter(Predicate::eq(property, value))
    }

    pub fn filter_lt(&self, property: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.filter(Predicate::lt(property, value))
    }

    pub fn map(&self, transform: ImageTransform) -> Self {
        Self::from_node(CollectionNode::Map {
            input: self.clone(),
            transform,
        })
    }

    pub fn mask_clouds(&self, params: CloudMaskParams) -> Self {
        self.map(ImageTransform::CloudMask(params))
    }

    pub fn mask_class(&self, params: ClassMaskParams) -> Self {
        self.map(ImageTransform::ClassMask(params))
    }

    pub fn select<S: Into<String>>(&self, bands: impl IntoIterator<Item = S>) -> Self {
        self.map(ImageTransform::Select(bands.into_iter().map(Into::into).collect()))
    }

    /// Concatenation; images of `other` follow images of `self`
    pub fn merge(&self, other: &LazyCollection) -> Self {
        Self::from_node(CollectionNode::Merge {
            first: self.clone(),
            second: other.clone(),
        })
    }

    /// First-valid-pixel composite in collection order
    pub fn mosaic(&self) -> LazyImage {
        LazyImage::from_node(ImageNode::Mosaic(self.clone()))
    }

    /// Per-pixel mean of valid observations
    pub fn mean(&self) -> LazyImage {
        LazyImage::from_node(ImageNode::Mean(self.clone()))
    }

    /// Evaluate the graph against `store`
    pub fn materialize(&self, store: &dyn RasterStore) -> CropResult<ImageCollection> {
        match self.node.as_ref() {
            CollectionNode::Source(name) => {
                let collection = store.load_collection(name)?;
                log::info!("Loaded collection '{}' ({} images)", name, collection.len());
                Ok(collection)
            }
            CollectionNode::Literal(collection) => Ok(collection.clone()),
            CollectionNode::Filter { input, predicate } => {
                let collection = input.materialize(store)?;
                CollectionFilter::new(vec![predicate.clone()]).apply(&collection)
            }
            CollectionNode::Map { input, transform } => {
                let collection = input.materialize(store)?;
                map_images(&collection, transform)
            }
            CollectionNode::Merge { first, second } => {
                let first = first.materialize(store)?;
                let second = second.materialize(store)?;
                first.merge(&second)
            }
        }
    }

    /// Human-readable rendering of the graph
    pub fn describe(&self) -> String {
        match self.node.as_ref() {
            CollectionNode::Source(name) => format!("load(\"{}\")", name),
            CollectionNode::Literal(collection) => format!("literal({} images)", collection.len()),
            CollectionNode::Filter { input, predicate } => {
                format!("{}.filter({})", input.describe(), predicate)
            }
            CollectionNode::Map { input, transform } => {
                format!("{}.map({})", input.describe(), transform.name())
            }
            CollectionNode::Merge { first, second } => {
                format!("{}.merge({})", first.describe(), second.describe())
            }
        }
    }
}

#[cfg(feature = "parallel")]
fn transform_all(collection: &ImageCollection, transform: &ImageTransform) -> CropResult<Vec<Image>> {
    use rayon::prelude::*;

    let images: Vec<&Arc<Image>> = collection.iter().collect();
    images
        .par_iter()
        .map(|image| transform.apply(image))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn transform_all(collection: &ImageCollection, transform: &ImageTransform) -> CropResult<Vec<Image>> {
    collection.iter().map(|image| transform.apply(image)).collect()
}

fn map_images(collection: &ImageCollection, transform: &ImageTransform) -> CropResult<ImageCollection> {
    log::debug!("Mapping '{}' over {} images", transform.name(), collection.len());
    let outputs = transform_all(collection, transform)?;
    let schema = transform.output_schema(collection.schema(), &outputs)?;
    Ok(ImageCollection::from_images(schema, outputs)?.with_catalog_of(collection))
}

#[derive(Debug)]
enum ImageNode {
    Literal(Image),
    Mosaic(LazyCollection),
    Mean(LazyCollection),
    Transform {
        input: LazyImage,
        transform: ImageTransform,
    },
}

/// Deferred single raster
#[derive(Debug, Clone)]
pub struct LazyImage {
    node: Arc<ImageNode>,
}

impl LazyImage {
    fn from_node(node: ImageNode) -> Self {
        Self { node: Arc::new(node) }
    }

    pub fn from_image(image: Image) -> Self {
        Self::from_node(ImageNode::Literal(image))
    }

    pub fn map(&self, transform: ImageTransform) -> Self {
        Self::from_node(ImageNode::Transform {
            input: self.clone(),
            transform,
        })
    }

    pub fn select<S: Into<String>>(&self, bands: impl IntoIterator<Item = S>) -> Self {
        self.map(ImageTransform::Select(bands.into_iter().map(Into::into).collect()))
    }

    /// Evaluate the graph against `store`
    pub fn materialize(&self, store: &dyn RasterStore) -> CropResult<Image> {
        match self.node.as_ref() {
            ImageNode::Literal(image) => Ok(image.clone()),
            ImageNode::Mosaic(input) => Mosaicker::new().mosaic(&input.materialize(store)?),
            ImageNode::Mean(input) => TemporalAggregator::new().mean(&input.materialize(store)?),
            ImageNode::Transform { input, transform } => transform.apply(&input.materialize(store)?),
        }
    }

    pub fn describe(&self) -> String {
        match self.node.as_ref() {
            ImageNode::Literal(image) => format!("image(\"{}\")", image.id()),
            ImageNode::Mosaic(input) => format!("{}.mosaic()", input.describe()),
            ImageNode::Mean(input) => format!("{}.mean()", input.describe()),
            ImageNode::Transform { input, transform } => {
                format!("{}.map({})", input.describe(), transform.name())
            }
        }
    }
}
