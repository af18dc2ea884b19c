use crate::types::{CropResult, Image, PixelValue};
use ndarray::{Array3, Axis};
use serde::{Deserialize, Serialize};

/// Background-class masking parameters for classification rasters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassMaskParams {
    /// Value meaning "no classified crop type"
    pub background: PixelValue,
    /// Restrict masking to these bands (None = all bands)
    pub bands: Option<Vec<String>>,
}

impl Default for ClassMaskParams {
    fn default() -> Self {
        Self {
            background: 0.0,
            bands: None,
        }
    }
}

/// Removes the background class from classification rasters
#[derive(Debug, Clone, Default)]
pub struct ClassMasker {
    params: ClassMaskParams,
}

impl ClassMasker {
    pub fn new(params: ClassMaskParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ClassMaskParams {
        &self.params
    }

    /// Mark pixels equal to the background value invalid, band by band.
    ///
    /// Other values and existing validity are untouched; applying twice is the
    /// same as applying once.
    pub fn apply(&self, image: &Image) -> CropResult<Image> {
        let background = self.params.background;
        let targets = match &self.params.bands {
            Some(bands) => bands
                .iter()
                .map(|band| image.band_index(band))
                .collect::<CropResult<Vec<_>>>()?,
            None => (0..image.band_names().len()).collect(),
        };

        let mut keep = Array3::from_elem(image.values().dim(), true);
        for idx in targets {
            let values = image.values().index_axis(Axis(0), idx);
            keep.index_axis_mut(Axis(0), idx)
                .zip_mut_with(&values, |keep, &value| *keep = value != background);
        }

        let masked = image.update_band_mask(keep.view())?;
        log::debug!(
            "Class mask on '{}': {} -> {} valid pixels",
            image.id(),
            image.valid_pixel_count(),
            masked.valid_pixel_count()
        );
        Ok(masked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GeoTransform, PixelGrid, RasterSchema};
    use ndarray::Array3;

    fn classification(values: Vec<f32>) -> Image {
        let schema = RasterSchema::new(
            ["classification", "confidence"],
            PixelGrid::new("EPSG:4326", GeoTransform::north_up(0.0, 1.0, 0.5), 2, 1),
        );
        let values = Array3::from_shape_vec((2, 1, 2), values).unwrap();
        Image::new("wc", schema, values).unwrap()
    }

    #[test]
    fn test_background_masked_other_values_kept() {
        let image = classification(vec![0.0, 7.0, 80.0, 90.0]);
        let masked = ClassMasker::default().apply(&image).unwrap();
        assert_eq!(masked.value_at("classification", 0, 0), None);
        assert_eq!(masked.value_at("classification", 0, 1), Some(7.0));
        // Confidence of the background pixel is non-zero and stays valid
        assert_eq!(masked.value_at("confidence", 0, 0), Some(80.0));
    }

    #[test]
    fn test_idempotent() {
        let image = classification(vec![0.0, 7.0, 0.0, 90.0]);
        let masker = ClassMasker::default();
        let once = masker.apply(&image).unwrap();
        let twice = masker.apply(&once).unwrap();
        assert_eq!(once.validity(), twice.validity());
        assert_eq!(once.values(), twice.values());
    }

    #[test]
    fn test_band_restriction() {
        let image = classification(vec![0.0, 7.0, 0.0, 90.0]);
        let masker = ClassMasker::new(ClassMaskParams {
            background: 0.0,
            bands: Some(vec!["classification".to_string()]),
        });
        let masked = masker.apply(&image).unwrap();
        assert_eq!(masked.value_at("classification", 0, 0), None);
        assert_eq!(masked.value_at("confidence", 0, 0), Some(0.0));
    }

    #[test]
    fn test_nan_is_not_background() {
        let image = classification(vec![f32::NAN, 7.0, 1.0, 1.0]);
        let masked = ClassMasker::default().apply(&image).unwrap();
        assert!(masked.is_valid("classification", 0, 0));
    }
}
