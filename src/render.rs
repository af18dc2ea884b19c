//! Rendering contract: styles, layers and the renderer seam.
//!
//! Color mapping and drawing belong to the [`Renderer`] implementation. This
//! module only materializes each layer, checks that its style fits the raster
//! and hands both over.

use crate::core::expression::cached_regex;
use crate::geometry::Boundary;
use crate::io::RasterStore;
use crate::pipeline::{LazyCollection, LazyImage};
use crate::types::{CropError, CropResult, Image, RasterSchema};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};

fn default_visible() -> bool {
    true
}

/// Per-layer rendering directive.
///
/// `bands` maps to output channels (one band with a palette, or three bands
/// as RGB); values are stretched linearly from `[min, max]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationSpec {
    pub bands: Vec<String>,
    #[serde(default)]
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub palette: Vec<String>,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

impl VisualizationSpec {
    /// Single band colored through `palette`
    pub fn single_band(band: impl Into<String>, min: f64, max: f64, palette: &[&str]) -> Self {
        Self {
            bands: vec![band.into()],
            min,
            max,
            palette: palette.iter().map(|c| c.to_string()).collect(),
            visible: true,
        }
    }

    /// Three bands mapped to red, green and blue
    pub fn rgb(bands: [&str; 3], min: f64, max: f64) -> Self {
        Self {
            bands: bands.iter().map(|b| b.to_string()).collect(),
            min,
            max,
            palette: Vec::new(),
            visible: true,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Check the style against the raster it will be applied to
    pub fn validate(&self, schema: &RasterSchema) -> CropResult<()> {
        if self.bands.len() != 1 && self.bands.len() != 3 {
            return Err(CropError::InvalidVisualization(format!(
                "expected 1 or 3 bands, got {}",
                self.bands.len()
            )));
        }
        if let Some(band) = self.bands.iter().find(|band| schema.band_index(band).is_none()) {
            return Err(CropError::InvalidVisualization(format!(
                "band '{}' is not in the raster (bands: {:?})",
                band, schema.band_names
            )));
        }
        if !self.min.is_finite() || !self.max.is_finite() || self.min >= self.max {
            return Err(CropError::InvalidVisualization(format!(
                "invalid stretch range [{}, {}]",
                self.min, self.max
            )));
        }
        if !self.palette.is_empty() && self.bands.len() != 1 {
            return Err(CropError::InvalidVisualization(
                "a palette needs exactly one band".to_string(),
            ));
        }

        static COLOR_RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
        let color_re = cached_regex(&COLOR_RE, r"^(?:#?(?:[0-9A-Fa-f]{3}|[0-9A-Fa-f]{6})|[A-Za-z]+)$")?;
        if let Some(color) = self.palette.iter().find(|color| !color_re.is_match(color)) {
            return Err(CropError::InvalidVisualization(format!(
                "'{}' is not a hex or named color",
                color
            )));
        }
        Ok(())
    }

    /// Linear stretch of `value` into [0, 1]
    pub fn stretch(&self, value: f64) -> f64 {
        ((value - self.min) / (self.max - self.min)).clamp(0.0, 1.0)
    }
}

/// Outline style for vector boundaries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineStyle {
    pub color: String,
}

/// Map center and zoom handed to the renderer with every layer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapView {
    pub center_lon: f64,
    pub center_lat: f64,
    pub zoom: u8,
}

impl MapView {
    pub fn centered_on(boundary: &Boundary, zoom: u8) -> Self {
        let (center_lon, center_lat) = boundary.centroid();
        Self {
            center_lon,
            center_lat,
            zoom,
        }
    }
}

#[derive(Debug, Clone)]
pub enum LayerSource {
    Image(LazyImage),
    /// Rendered as its first-valid mosaic
    Collection(LazyCollection),
    Outline(Arc<Boundary>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayerStyle {
    Raster(VisualizationSpec),
    Outline(OutlineStyle),
}

/// Named display layer: a deferred source plus its style
#[derive(Debug, Clone)]
pub struct Layer {
    name: String,
    source: LayerSource,
    style: LayerStyle,
    visible: bool,
}

impl Layer {
    pub fn image(name: impl Into<String>, image: LazyImage, visualization: VisualizationSpec) -> Self {
        let visible = visualization.visible;
        Self {
            name: name.into(),
            source: LayerSource::Image(image),
            style: LayerStyle::Raster(visualization),
            visible,
        }
    }

    pub fn collection(
        name: impl Into<String>,
        collection: LazyCollection,
        visualization: VisualizationSpec,
    ) -> Self {
        let visible = visualization.visible;
        Self {
            name: name.into(),
            source: LayerSource::Collection(collection),
            style: LayerStyle::Raster(visualization),
            visible,
        }
    }

    pub fn outline(name: impl Into<String>, boundary: Arc<Boundary>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: LayerSource::Outline(boundary),
            style: LayerStyle::Outline(OutlineStyle { color: color.into() }),
            visible: true,
        }
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &LayerSource {
        &self.source
    }

    pub fn style(&self) -> &LayerStyle {
        &self.style
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    /// Evaluate the layer source and check its style against the result
    pub fn materialize(&self, store: &dyn RasterStore) -> CropResult<RenderedLayer> {
        let content = match &self.source {
            LayerSource::Image(image) => RenderedContent::Raster(image.materialize(store)?),
            LayerSource::Collection(collection) => {
                RenderedContent::Raster(collection.mosaic().materialize(store)?)
            }
            LayerSource::Outline(boundary) => RenderedContent::Outline(Arc::clone(boundary)),
        };

        match (&content, &self.style) {
            (RenderedContent::Raster(image), LayerStyle::Raster(visualization)) => {
                visualization.validate(image.schema())?
            }
            (RenderedContent::Outline(_), LayerStyle::Outline(_)) => {}
            _ => {
                return Err(CropError::InvalidVisualization(format!(
                    "layer '{}' pairs a source with the wrong style kind",
                    self.name
                )))
            }
        }

        Ok(RenderedLayer {
            name: self.name.clone(),
            content,
            style: self.style.clone(),
            visible: self.visible,
        })
    }
}

#[derive(Debug, Clone)]
pub enum RenderedContent {
    Raster(Image),
    Outline(Arc<Boundary>),
}

/// Materialized layer handed to the renderer
#[derive(Debug, Clone)]
pub struct RenderedLayer {
    pub name: String,
    pub content: RenderedContent,
    pub style: LayerStyle,
    pub visible: bool,
}

/// Draws materialized layers; implemented by the hosting map widget
pub trait Renderer {
    fn draw(&mut self, view: &MapView, layer: RenderedLayer) -> CropResult<()>;
}

/// Per-layer result of [`LayerStack::render_all`]
#[derive(Debug)]
pub struct LayerOutcome {
    pub name: String,
    pub result: CropResult<()>,
}

impl LayerOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Ordered layers, bottom first
#[derive(Debug, Clone, Default)]
pub struct LayerStack {
    layers: Vec<Layer>,
}

impl LayerStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, layer: Layer) {
        self.layers.push(layer);
    }

    pub fn with_layer(mut self, layer: Layer) -> Self {
        self.push(layer);
        self
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Materialize every layer and draw it in stack order.
    ///
    /// Layers are independent: a layer that fails to materialize or draw is
    /// reported in its outcome and the remaining layers are still drawn.
    pub fn render_all(
        &self,
        store: &dyn RasterStore,
        view: &MapView,
        renderer: &mut dyn Renderer,
    ) -> Vec<LayerOutcome> {
        log::info!("Rendering {} layers", self.layers.len());
        let materialized = self.materialize_all(store);

        self.layers
            .iter()
            .zip(materialized)
            .map(|(layer, rendered)| {
                let result = rendered.and_then(|rendered| renderer.draw(view, rendered));
                if let Err(e) = &result {
                    log::warn!("Layer '{}' failed: {}", layer.name(), e);
                }
                LayerOutcome {
                    name: layer.name().to_string(),
                    result,
                }
            })
            .collect()
    }

    #[cfg(feature = "parallel")]
    fn materialize_all(&self, store: &dyn RasterStore) -> Vec<CropResult<RenderedLayer>> {
        use rayon::prelude::*;

        self.layers.par_iter().map(|layer| layer.materialize(store)).collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn materialize_all(&self, store: &dyn RasterStore) -> Vec<CropResult<RenderedLayer>> {
        self.layers.iter().map(|layer| layer.materialize(store)).collect()
    }
}
