use chrono::NaiveDate;
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis, Zip};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Per-band pixel value (digital numbers, reflectance or class codes)
pub type PixelValue = f32;

/// Band-major pixel values (band x row x col)
pub type BandStack = Array3<PixelValue>;

/// Band-major validity flags (band x row x col), true = valid
pub type ValidityStack = Array3<bool>;

/// Geospatial bounding box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon: min_lon.min(max_lon),
            max_lon: min_lon.max(max_lon),
            min_lat: min_lat.min(max_lat),
            max_lat: min_lat.max(max_lat),
        }
    }

    /// Closed-interval overlap test; touching edges count as intersecting
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
            && self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
    }

    pub fn contains_point(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_lon: self.min_lon.min(other.min_lon),
            max_lon: self.max_lon.max(other.max_lon),
            min_lat: self.min_lat.min(other.min_lat),
            max_lat: self.max_lat.max(other.max_lat),
        }
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lon + self.max_lon) / 2.0,
            (self.min_lat + self.max_lat) / 2.0,
        )
    }

    /// Corners in counter-clockwise order starting at the south-west corner
    pub fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.min_lon, self.min_lat),
            (self.max_lon, self.min_lat),
            (self.max_lon, self.max_lat),
            (self.min_lon, self.max_lat),
        ]
    }
}

/// Geospatial transformation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform without rotation
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_size: f64) -> Self {
        Self {
            top_left_x,
            pixel_width: pixel_size,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height: -pixel_size,
        }
    }
}

/// Pixel grid shared by every image on one processing path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelGrid {
    /// CRS identifier, e.g. "EPSG:4326"
    pub crs: String,
    pub geo_transform: GeoTransform,
    pub width: usize,
    pub height: usize,
}

impl PixelGrid {
    pub fn new(crs: impl Into<String>, geo_transform: GeoTransform, width: usize, height: usize) -> Self {
        Self {
            crs: crs.into(),
            geo_transform,
            width,
            height,
        }
    }

    /// Extent covered by the grid (rotation terms ignored)
    pub fn bounds(&self) -> BoundingBox {
        let gt = &self.geo_transform;
        let x0 = gt.top_left_x;
        let y0 = gt.top_left_y;
        let x1 = x0 + self.width as f64 * gt.pixel_width;
        let y1 = y0 + self.height as f64 * gt.pixel_height;
        BoundingBox::new(x0, y0, x1, y1)
    }
}

/// Band names plus pixel grid; the contract every image in a collection honours
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterSchema {
    pub band_names: Vec<String>,
    pub grid: PixelGrid,
}

impl RasterSchema {
    pub fn new<S: Into<String>>(band_names: impl IntoIterator<Item = S>, grid: PixelGrid) -> Self {
        Self {
            band_names: band_names.into_iter().map(Into::into).collect(),
            grid,
        }
    }

    pub fn band_index(&self, band: &str) -> Option<usize> {
        self.band_names.iter().position(|name| name == band)
    }

    pub fn band_count(&self) -> usize {
        self.band_names.len()
    }

    /// Array shape as (bands, rows, cols)
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.band_names.len(), self.grid.height, self.grid.width)
    }

    /// Schema restricted to `bands`, in the requested order
    pub fn select(&self, bands: &[String]) -> CropResult<RasterSchema> {
        for band in bands {
            if self.band_index(band).is_none() {
                return Err(CropError::MissingBand {
                    band: band.clone(),
                    image: "<schema>".to_string(),
                });
            }
        }
        Ok(RasterSchema {
            band_names: bands.to_vec(),
            grid: self.grid.clone(),
        })
    }
}

/// Scalar or categorical image metadata value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Int(i64),
    Float(f64),
    Date(NaiveDate),
    Text(String),
}

impl PropertyValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Int(v) => Some(*v as f64),
            PropertyValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyValue::Int(_) | PropertyValue::Float(_) => PropertyKind::Number,
            PropertyValue::Date(_) => PropertyKind::Date,
            PropertyValue::Text(_) => PropertyKind::Text,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind().name()
    }

    /// Orders two values of compatible kinds.
    ///
    /// Numbers compare numerically across Int/Float, text compares
    /// case-sensitively, dates compare chronologically and a text operand
    /// compared with a date is parsed as an ISO date. Any other pairing,
    /// an unparseable date text or a NaN returns `None`.
    pub fn compare(&self, other: &PropertyValue) -> Option<Ordering> {
        match (self, other) {
            (PropertyValue::Text(a), PropertyValue::Text(b)) => Some(a.cmp(b)),
            (PropertyValue::Date(a), PropertyValue::Date(b)) => Some(a.cmp(b)),
            (PropertyValue::Date(a), PropertyValue::Text(b)) => {
                b.parse::<NaiveDate>().ok().map(|b| a.cmp(&b))
            }
            (PropertyValue::Text(a), PropertyValue::Date(b)) => {
                a.parse::<NaiveDate>().ok().map(|a| a.cmp(b))
            }
            _ => {
                let a = self.as_f64()?;
                let b = other.as_f64()?;
                a.partial_cmp(&b)
            }
        }
    }
}

/// Comparison family of a property value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PropertyKind {
    Number,
    Date,
    Text,
}

impl PropertyKind {
    pub fn name(&self) -> &'static str {
        match self {
            PropertyKind::Number => "number",
            PropertyKind::Date => "date",
            PropertyKind::Text => "text",
        }
    }

    /// Whether a property of this kind can be compared with `value`
    pub fn accepts(&self, value: &PropertyValue) -> bool {
        match (self, value) {
            (PropertyKind::Date, PropertyValue::Text(text)) => text.parse::<NaiveDate>().is_ok(),
            (PropertyKind::Text, PropertyValue::Date(_)) => true,
            (kind, value) => *kind == value.kind(),
        }
    }
}

/// Property names seen on the images a collection was built from, with the
/// kinds of value each carried
pub type PropertyCatalog = BTreeMap<String, BTreeSet<PropertyKind>>;

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyValue::Int(v) => write!(f, "{}", v),
            PropertyValue::Float(v) => write!(f, "{}", v),
            PropertyValue::Date(d) => write!(f, "{}", d),
            PropertyValue::Text(s) => write!(f, "\"{}\"", s),
        }
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        PropertyValue::Int(v as i64)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Text(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::Text(v)
    }
}

impl From<NaiveDate> for PropertyValue {
    fn from(v: NaiveDate) -> Self {
        PropertyValue::Date(v)
    }
}

/// A multi-band raster with per-pixel, per-band validity.
///
/// Masking never deletes data: a masked pixel keeps its value but is
/// excluded from rendering and from every reduction. Images are immutable
/// once built; transforms return new images.
#[derive(Debug, Clone)]
pub struct Image {
    id: String,
    schema: RasterSchema,
    values: BandStack,
    validity: ValidityStack,
    properties: HashMap<String, PropertyValue>,
    footprint: BoundingBox,
    acquired: Option<NaiveDate>,
}

impl Image {
    /// Build a fully valid image; `values` must have the schema's shape
    pub fn new(id: impl Into<String>, schema: RasterSchema, values: BandStack) -> CropResult<Self> {
        let validity = Array3::from_elem(values.dim(), true);
        Self::from_parts(id, schema, values, validity)
    }

    /// Image that is invalid at every pixel and band
    pub fn fully_invalid(id: impl Into<String>, schema: RasterSchema) -> Self {
        let shape = schema.shape();
        let footprint = schema.grid.bounds();
        Self {
            id: id.into(),
            schema,
            values: Array3::zeros(shape),
            validity: Array3::from_elem(shape, false),
            properties: HashMap::new(),
            footprint,
            acquired: None,
        }
    }

    pub fn from_parts(
        id: impl Into<String>,
        schema: RasterSchema,
        values: BandStack,
        validity: ValidityStack,
    ) -> CropResult<Self> {
        let id = id.into();
        let expected = schema.shape();
        if values.dim() != expected || validity.dim() != expected {
            return Err(CropError::SchemaMismatch(format!(
                "image '{}' has values {:?} and validity {:?}, schema expects {:?}",
                id,
                values.dim(),
                validity.dim(),
                expected
            )));
        }
        let footprint = schema.grid.bounds();
        Ok(Self {
            id,
            schema,
            values,
            validity,
            properties: HashMap::new(),
            footprint,
            acquired: None,
        })
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn with_footprint(mut self, footprint: BoundingBox) -> Self {
        self.footprint = footprint;
        self
    }

    pub fn with_acquired(mut self, date: NaiveDate) -> Self {
        self.acquired = Some(date);
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn schema(&self) -> &RasterSchema {
        &self.schema
    }

    pub fn band_names(&self) -> &[String] {
        &self.schema.band_names
    }

    pub fn values(&self) -> &BandStack {
        &self.values
    }

    pub fn validity(&self) -> &ValidityStack {
        &self.validity
    }

    pub fn properties(&self) -> &HashMap<String, PropertyValue> {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn footprint(&self) -> &BoundingBox {
        &self.footprint
    }

    pub fn acquired(&self) -> Option<NaiveDate> {
        self.acquired
    }

    pub fn band_index(&self, band: &str) -> CropResult<usize> {
        self.schema.band_index(band).ok_or_else(|| CropError::MissingBand {
            band: band.to_string(),
            image: self.id.clone(),
        })
    }

    pub fn band(&self, band: &str) -> CropResult<ArrayView2<'_, PixelValue>> {
        let idx = self.band_index(band)?;
        Ok(self.values.index_axis(Axis(0), idx))
    }

    pub fn band_validity(&self, band: &str) -> CropResult<ArrayView2<'_, bool>> {
        let idx = self.band_index(band)?;
        Ok(self.validity.index_axis(Axis(0), idx))
    }

    /// Value at a pixel, or `None` when the band is missing, the pixel is
    /// out of range or masked
    pub fn value_at(&self, band: &str, row: usize, col: usize) -> Option<PixelValue> {
        let idx = self.schema.band_index(band)?;
        match self.validity.get((idx, row, col)) {
            Some(true) => self.values.get((idx, row, col)).copied(),
            _ => None,
        }
    }

    pub fn is_valid(&self, band: &str, row: usize, col: usize) -> bool {
        self.value_at(band, row, col).is_some()
    }

    pub fn valid_pixel_count(&self) -> usize {
        self.validity.iter().filter(|&&v| v).count()
    }

    /// Narrow validity of every band by a single-plane mask (false = mask out)
    pub fn update_mask(&self, mask: &Array2<bool>) -> CropResult<Image> {
        let (_, rows, cols) = self.schema.shape();
        if mask.dim() != (rows, cols) {
            return Err(CropError::SchemaMismatch(format!(
                "mask {:?} does not match image '{}' grid {}x{}",
                mask.dim(),
                self.id,
                rows,
                cols
            )));
        }
        let plane = mask.view().insert_axis(Axis(0));
        let plane = plane.broadcast(self.validity.dim()).ok_or_else(|| {
            CropError::Processing(format!("cannot broadcast mask over image '{}'", self.id))
        })?;
        self.update_band_mask(plane)
    }

    /// Narrow validity band by band (false = mask out)
    pub fn update_band_mask(&self, mask: ArrayView3<'_, bool>) -> CropResult<Image> {
        if mask.dim() != self.validity.dim() {
            return Err(CropError::SchemaMismatch(format!(
                "band mask {:?} does not match image '{}' shape {:?}",
                mask.dim(),
                self.id,
                self.validity.dim()
            )));
        }
        let validity = Zip::from(&self.validity)
            .and(&mask)
            .map_collect(|&valid, &keep| valid && keep);
        let mut image = self.clone();
        image.validity = validity;
        Ok(image)
    }

    /// Apply `f` to the values of the named bands, leaving validity untouched
    pub fn map_bands<F>(mut self, bands: &[String], f: F) -> CropResult<Image>
    where
        F: Fn(PixelValue) -> PixelValue,
    {
        let indices = bands
            .iter()
            .map(|band| self.band_index(band))
            .collect::<CropResult<Vec<_>>>()?;
        for idx in indices {
            self.values.index_axis_mut(Axis(0), idx).mapv_inplace(&f);
        }
        Ok(self)
    }

    /// New image holding only `bands`, in the requested order
    pub fn select(&self, bands: &[String]) -> CropResult<Image> {
        let indices = bands
            .iter()
            .map(|band| self.band_index(band))
            .collect::<CropResult<Vec<_>>>()?;
        let schema = self.schema.select(bands)?;
        let values = self.values.select(Axis(0), &indices);
        let validity = self.validity.select(Axis(0), &indices);
        Ok(Image {
            id: self.id.clone(),
            schema,
            values,
            validity,
            properties: self.properties.clone(),
            footprint: self.footprint.clone(),
            acquired: self.acquired,
        })
    }
}

/// Ordered, schema-consistent sequence of images.
///
/// Images are shared through `Arc`, so filtering and re-ordering never copy
/// pixel data. The schema is kept even when the collection is empty so that
/// reducers can still produce a correctly shaped, fully-invalid raster.
#[derive(Debug, Clone)]
pub struct ImageCollection {
    schema: RasterSchema,
    images: Vec<Arc<Image>>,
    catalog: Option<Arc<PropertyCatalog>>,
}

impl ImageCollection {
    pub fn empty(schema: RasterSchema) -> Self {
        Self {
            schema,
            images: Vec::new(),
            catalog: None,
        }
    }

    /// Build a collection, rejecting images whose band set or grid differ from `schema`
    pub fn from_images(schema: RasterSchema, images: Vec<Image>) -> CropResult<Self> {
        Self::from_shared(schema, images.into_iter().map(Arc::new).collect())
    }

    pub fn from_shared(schema: RasterSchema, images: Vec<Arc<Image>>) -> CropResult<Self> {
        for image in &images {
            ensure_schema(&schema, image)?;
        }
        let catalog = if images.is_empty() {
            None
        } else {
            let mut catalog = PropertyCatalog::new();
            for image in &images {
                for (name, value) in image.properties() {
                    catalog.entry(name.clone()).or_default().insert(value.kind());
                }
            }
            Some(Arc::new(catalog))
        };
        Ok(Self {
            schema,
            images,
            catalog,
        })
    }

    pub fn schema(&self) -> &RasterSchema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<Image>> {
        self.images.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Image>> {
        self.images.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.images.iter().map(|image| image.id()).collect()
    }

    /// Properties of the images this collection descends from.
    ///
    /// Filtering keeps the catalog of its input, so a narrowed (even empty)
    /// collection still knows which properties and kinds its source carried.
    /// `None` when the collection was built without any image.
    pub fn catalog(&self) -> Option<&PropertyCatalog> {
        self.catalog.as_deref()
    }

    /// Union this collection's catalog with the one `ancestor` carries
    pub(crate) fn with_catalog_of(mut self, ancestor: &ImageCollection) -> Self {
        self.catalog = merge_catalogs(&self.catalog, &ancestor.catalog);
        self
    }

    /// Concatenate two collections; `other` follows `self`
    pub fn merge(&self, other: &ImageCollection) -> CropResult<ImageCollection> {
        if self.schema != other.schema {
            return Err(CropError::SchemaMismatch(format!(
                "cannot merge collections with bands {:?} and {:?}",
                self.schema.band_names, other.schema.band_names
            )));
        }
        let mut images = self.images.clone();
        images.extend(other.images.iter().cloned());
        Ok(Self {
            schema: self.schema.clone(),
            images,
            catalog: merge_catalogs(&self.catalog, &other.catalog),
        })
    }

    /// Copy of this collection with its images in reverse order
    pub fn reversed(&self) -> ImageCollection {
        let mut images = self.images.clone();
        images.reverse();
        Self {
            schema: self.schema.clone(),
            images,
            catalog: self.catalog.clone(),
        }
    }

    /// Keep the images selected by `keep`, preserving relative order
    pub(crate) fn retain_by<F>(&self, mut keep: F) -> ImageCollection
    where
        F: FnMut(&Image) -> bool,
    {
        let mut images = Vec::with_capacity(self.images.len());
        for image in &self.images {
            if keep(image) {
                images.push(Arc::clone(image));
            }
        }
        Self {
            schema: self.schema.clone(),
            images,
            catalog: self.catalog.clone(),
        }
    }
}

fn merge_catalogs(
    a: &Option<Arc<PropertyCatalog>>,
    b: &Option<Arc<PropertyCatalog>>,
) -> Option<Arc<PropertyCatalog>> {
    match (a, b) {
        (None, None) => None,
        (Some(only), None) | (None, Some(only)) => Some(Arc::clone(only)),
        (Some(a), Some(b)) => {
            let mut merged = a.as_ref().clone();
            for (name, kinds) in b.iter() {
                merged.entry(name.clone()).or_default().extend(kinds.iter().copied());
            }
            Some(Arc::new(merged))
        }
    }
}

fn ensure_schema(schema: &RasterSchema, image: &Image) -> CropResult<()> {
    if image.schema().band_names != schema.band_names {
        return Err(CropError::SchemaMismatch(format!(
            "image '{}' has bands {:?}, collection expects {:?}",
            image.id(),
            image.schema().band_names,
            schema.band_names
        )));
    }
    if image.schema().grid != schema.grid {
        return Err(CropError::SchemaMismatch(format!(
            "image '{}' is on a different pixel grid than its collection",
            image.id()
        )));
    }
    Ok(())
}

/// Error types for the layer pipeline
#[derive(Debug, thiserror::Error)]
pub enum CropError {
    #[error("Unknown image collection: {0}")]
    UnknownCollection(String),

    #[error("Unknown boundary: {0}")]
    UnknownBoundary(String),

    #[error("Band '{band}' not found in image '{image}'")]
    MissingBand { band: String, image: String },

    #[error("Property '{0}' is not present on any image of the collection")]
    UnknownProperty(String),

    #[error("Property '{property}' holds {found} values, cannot compare with {expected}")]
    TypeMismatch {
        property: String,
        expected: String,
        found: String,
    },

    #[error("Bit position {bit} is outside a {width}-bit quality value")]
    InvalidBitPosition { bit: u32, width: u32 },

    #[error("Invalid filter expression: {0}")]
    InvalidExpression(String),

    #[error("Invalid date range: end {end} is before start {start}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid visualization: {0}")]
    InvalidVisualization(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Configuration parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Processing error: {0}")]
    Processing(String),
}

impl CropError {
    /// True for errors caused by caller-supplied names, bits, thresholds or styles
    pub fn is_configuration_error(&self) -> bool {
        !matches!(
            self,
            CropError::SchemaMismatch(_) | CropError::Shape(_) | CropError::Processing(_)
        )
    }
}

/// Result type for pipeline operations
pub type CropResult<T> = Result<T, CropError>;
