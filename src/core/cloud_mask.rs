use crate::core::bitmask::BitmaskDecoder;
use crate::types::{CropError, CropResult, Image, PixelValue};
use ndarray::Zip;
use serde::{Deserialize, Serialize};

/// Cloud masking parameters for optical imagery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudMaskParams {
    /// Packed quality band name
    pub qa_band: String,
    /// Opaque cloud flag bit
    pub cloud_bit: u32,
    /// Cirrus flag bit
    pub cirrus_bit: u32,
    /// Divisor mapping stored digital numbers to unit reflectance
    pub scale_factor: PixelValue,
    /// Bands to rescale (None = every band except the quality band)
    pub reflectance_bands: Option<Vec<String>>,
}

impl Default for CloudMaskParams {
    fn default() -> Self {
        // Sentinel-2 L2A QA60 layout
        Self {
            qa_band: "QA60".to_string(),
            cloud_bit: 10,
            cirrus_bit: 11,
            scale_factor: 10000.0,
            reflectance_bands: None,
        }
    }
}

/// Cloud/cirrus masking and reflectance rescaling
#[derive(Debug, Clone)]
pub struct CloudMasker {
    params: CloudMaskParams,
}

impl CloudMasker {
    pub fn new(params: CloudMaskParams) -> Self {
        Self { params }
    }

    /// Masker with Sentinel-2 QA60 defaults
    pub fn sentinel2() -> Self {
        Self::new(CloudMaskParams::default())
    }

    pub fn params(&self) -> &CloudMaskParams {
        &self.params
    }

    /// Mask cloudy and cirrus pixels in every band, then rescale reflectance.
    ///
    /// Masked pixels become invalid, their values are kept. A masked quality
    /// pixel masks the whole pixel. The quality band itself keeps its raw bit
    /// values.
    pub fn apply(&self, image: &Image) -> CropResult<Image> {
        if !self.params.scale_factor.is_finite() || self.params.scale_factor == 0.0 {
            return Err(CropError::InvalidParameter(format!(
                "reflectance scale factor must be finite and non-zero, got {}",
                self.params.scale_factor
            )));
        }

        let decoder = BitmaskDecoder::new(&[self.params.cloud_bit, self.params.cirrus_bit])?;
        let qa = image.band(&self.params.qa_band)?;
        let qa_valid = image.band_validity(&self.params.qa_band)?;

        let clean = decoder.clean_mask(&qa);
        let mask = Zip::from(&clean)
            .and(&qa_valid)
            .map_collect(|&clean, &valid| clean && valid);

        let reflectance = self.reflectance_bands(image);
        let scale = self.params.scale_factor;
        let masked = image
            .update_mask(&mask)?
            .map_bands(&reflectance, |value| value / scale)?;

        log::debug!(
            "Cloud mask on '{}': {} of {} pixels clear, rescaled {} bands by {}",
            image.id(),
            mask.iter().filter(|&&keep| keep).count(),
            mask.len(),
            reflectance.len(),
            scale
        );

        Ok(masked)
    }

    fn reflectance_bands(&self, image: &Image) -> Vec<String> {
        match &self.params.reflectance_bands {
            Some(bands) => bands.clone(),
            None => image
                .band_names()
                .iter()
                .filter(|band| **band != self.params.qa_band)
                .cloned()
                .collect(),
        }
    }
}

impl Default for CloudMasker {
    fn default() -> Self {
        Self::sentinel2()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GeoTransform, PixelGrid, RasterSchema};
    use approx::assert_relative_eq;
    use ndarray::Array3;

    fn scene(qa: [f32; 4]) -> Image {
        let schema = RasterSchema::new(
            ["B4", "B8", "QA60"],
            PixelGrid::new("EPSG:32630", GeoTransform::north_up(0.0, 20.0, 10.0), 2, 2),
        );
        let mut values = Array3::from_elem((3, 2, 2), 1500.0);
        for (i, q) in qa.iter().enumerate() {
            values[[2, i / 2, i % 2]] = *q;
        }
        Image::new("S2_TEST", schema, values).unwrap()
    }

    #[test]
    fn test_cloudy_pixel_masked_clear_pixel_rescaled() {
        let image = scene([0.0, 1024.0, 2048.0, 3072.0]);
        let masked = CloudMasker::sentinel2().apply(&image).unwrap();

        assert_relative_eq!(masked.value_at("B4", 0, 0).unwrap(), 0.15, epsilon = 1e-6);
        assert_relative_eq!(masked.value_at("B8", 0, 0).unwrap(), 0.15, epsilon = 1e-6);
        // Quality band keeps its packed bits
        assert_eq!(masked.value_at("QA60", 0, 0), Some(0.0));

        for (row, col) in [(0, 1), (1, 0), (1, 1)] {
            for band in ["B4", "B8", "QA60"] {
                assert!(!masked.is_valid(band, row, col), "{} {} {}", band, row, col);
            }
        }
    }

    #[test]
    fn test_other_qa_bits_do_not_mask() {
        let image = scene([1.0, 512.0, 4096.0, 1023.0]);
        let masked = CloudMasker::sentinel2().apply(&image).unwrap();
        assert_eq!(masked.valid_pixel_count(), 12);
    }

    #[test]
    fn test_missing_qa_band_is_configuration_error() {
        let params = CloudMaskParams {
            qa_band: "QA10".to_string(),
            ..CloudMaskParams::default()
        };
        let err = CloudMasker::new(params).apply(&scene([0.0; 4])).unwrap_err();
        assert!(err.is_configuration_error());
        assert!(matches!(err, CropError::MissingBand { .. }));
    }

    #[test]
    fn test_explicit_reflectance_bands() {
        let params = CloudMaskParams {
            reflectance_bands: Some(vec!["B8".to_string()]),
            ..CloudMaskParams::default()
        };
        let masked = CloudMasker::new(params).apply(&scene([0.0; 4])).unwrap();
        assert_eq!(masked.value_at("B4", 1, 1), Some(1500.0));
        assert_relative_eq!(masked.value_at("B8", 1, 1).unwrap(), 0.15, epsilon = 1e-6);
    }

    #[test]
    fn test_zero_scale_factor_rejected() {
        let params = CloudMaskParams {
            scale_factor: 0.0,
            ..CloudMaskParams::default()
        };
        assert!(CloudMasker::new(params).apply(&scene([0.0; 4])).is_err());
    }
}
