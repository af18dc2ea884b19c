//! Crop comparison map: optical false color against WorldCereal classification.
//!
//! [`CropComparison`] turns a [`ComparisonConfig`] into the ordered layer
//! stack of the map. Building the stack only records lazy graphs; pixels are
//! pulled from the store when the stack is rendered.

use crate::config::{ComparisonConfig, ProductLayer};
use crate::geometry::Boundary;
use crate::io::{BoundarySource, RasterStore};
use crate::pipeline::{LazyCollection, LazyImage};
use crate::render::{Layer, LayerOutcome, LayerStack, MapView, Renderer};
use crate::types::CropResult;
use std::sync::Arc;

/// Builder for the comparison layers
#[derive(Debug, Clone, Default)]
pub struct CropComparison {
    config: ComparisonConfig,
}

impl CropComparison {
    pub fn new(config: ComparisonConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ComparisonConfig {
        &self.config
    }

    /// Cloud-masked mean of the optical scenes over the boundary
    pub fn optical_composite(&self, boundary: Arc<Boundary>) -> LazyImage {
        let optical = &self.config.optical;
        LazyCollection::load(optical.collection.as_str())
            .filter_date(optical.start_date, optical.end_date)
            .filter_lt(optical.cloud_cover_property.as_str(), optical.max_cloud_cover)
            .filter_bounds(boundary)
            .mask_clouds(optical.cloud_mask.clone())
            .mean()
    }

    /// Classification collection with the background class masked
    pub fn classification(&self) -> LazyCollection {
        let classification = &self.config.classification;
        LazyCollection::load(classification.collection.as_str())
            .mask_class(classification.class_mask.clone())
    }

    /// Mosaic of the temporary-crops product over every zone
    pub fn temporary_crops(&self) -> LazyImage {
        let classification = &self.config.classification;
        self.classification()
            .filter_expression(product_expression(
                &classification.product_property,
                &classification.temporary_crops.product,
            ))
            .mosaic()
    }

    /// Classification restricted to the configured season, zone and boundary
    pub fn seasonal(&self, boundary: Arc<Boundary>) -> LazyCollection {
        let classification = &self.config.classification;
        self.classification()
            .filter_eq(classification.season_property.as_str(), classification.season.as_str())
            .filter_eq(classification.zone_property.as_str(), classification.zone_id)
            .filter_bounds(boundary)
    }

    /// Seasonal collection of one product
    pub fn product(&self, boundary: Arc<Boundary>, layer: &ProductLayer) -> LazyCollection {
        self.seasonal(boundary).filter_expression(product_expression(
            &self.config.classification.product_property,
            &layer.product,
        ))
    }

    /// All layers, bottom first
    pub fn layers(&self, boundary: Arc<Boundary>) -> LayerStack {
        let config = &self.config;
        let classification = &config.classification;
        let temporary_crops = self.temporary_crops();

        LayerStack::new()
            .with_layer(Layer::image(
                config.optical.layer_name.as_str(),
                self.optical_composite(Arc::clone(&boundary)),
                config.optical.visualization.clone(),
            ))
            .with_layer(Layer::outline(
                config.boundary_layer_name.as_str(),
                Arc::clone(&boundary),
                config.boundary_color.as_str(),
            ))
            .with_layer(Layer::image(
                classification.temporary_crops.layer_name.as_str(),
                temporary_crops.clone(),
                classification.temporary_crops.visualization.clone(),
            ))
            .with_layer(Layer::image(
                classification.confidence_layer_name.as_str(),
                temporary_crops,
                classification.confidence_visualization.clone(),
            ))
            .with_layer(Layer::collection(
                classification.maize.layer_name.as_str(),
                self.product(Arc::clone(&boundary), &classification.maize),
                classification.maize.visualization.clone(),
            ))
            .with_layer(Layer::collection(
                classification.irrigation.layer_name.as_str(),
                self.product(boundary, &classification.irrigation),
                classification.irrigation.visualization.clone(),
            ))
    }

    pub fn map_view(&self, boundary: &Boundary) -> MapView {
        MapView::centered_on(boundary, self.config.zoom)
    }

    /// Load the boundary, then materialize and draw every layer.
    ///
    /// Configuration and boundary errors abort the run; failures of single
    /// layers are reported in the outcomes.
    pub fn render<S>(&self, store: &S, renderer: &mut dyn Renderer) -> CropResult<Vec<LayerOutcome>>
    where
        S: RasterStore + BoundarySource,
    {
        self.config.validate()?;
        let boundary = Arc::new(store.load_boundary(&self.config.boundary_id)?);
        log::info!(
            "Building crop comparison for '{}' ({} to {})",
            boundary.name(),
            self.config.optical.start_date,
            self.config.optical.end_date
        );

        let view = self.map_view(&boundary);
        let outcomes = self.layers(boundary).render_all(store, &view, renderer);
        let failed = outcomes.iter().filter(|outcome| !outcome.is_ok()).count();
        log::info!("Rendered {} layers, {} failed", outcomes.len() - failed, failed);
        Ok(outcomes)
    }
}

fn product_expression(property: &str, product: &str) -> String {
    let escaped = product.replace('\\', "\\\\").replace('"', "\\\"");
    format!("{} == \"{}\"", property, escaped)
}
