//! Pipeline configuration supplied once per comparison

use crate::core::{ClassMaskParams, CloudMaskParams};
use crate::render::VisualizationSpec;
use crate::types::{CropError, CropResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Optical (Sentinel-2) composite settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpticalConfig {
    pub collection: String,
    /// First acquisition date included
    pub start_date: NaiveDate,
    /// First acquisition date excluded
    pub end_date: NaiveDate,
    pub cloud_cover_property: String,
    /// Scenes must be strictly below this cloud percentage
    pub max_cloud_cover: f64,
    pub cloud_mask: CloudMaskParams,
    pub layer_name: String,
    pub visualization: VisualizationSpec,
}

impl Default for OpticalConfig {
    fn default() -> Self {
        Self {
            collection: "COPERNICUS/S2_SR_HARMONIZED".to_string(),
            start_date: NaiveDate::from_ymd_opt(2021, 1, 1).unwrap_or_default(),
            end_date: NaiveDate::from_ymd_opt(2021, 1, 30).unwrap_or_default(),
            cloud_cover_property: "CLOUDY_PIXEL_PERCENTAGE".to_string(),
            max_cloud_cover: 20.0,
            cloud_mask: CloudMaskParams::default(),
            layer_name: "FalseColor - Sentinel 2".to_string(),
            visualization: VisualizationSpec::rgb(["B8", "B4", "B3"], 0.0, 0.3),
        }
    }
}

/// One product-filtered classification layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductLayer {
    pub product: String,
    pub layer_name: String,
    pub visualization: VisualizationSpec,
}

/// Classification (WorldCereal) layer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    pub collection: String,
    pub class_mask: ClassMaskParams,
    pub product_property: String,
    pub season_property: String,
    pub zone_property: String,
    pub season: String,
    pub zone_id: i64,
    /// Global mosaic of the temporary-crops product (not bounded)
    pub temporary_crops: ProductLayer,
    pub confidence_layer_name: String,
    pub confidence_visualization: VisualizationSpec,
    pub maize: ProductLayer,
    pub irrigation: ProductLayer,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            collection: "ESA/WorldCereal/2021/MODELS/v100".to_string(),
            class_mask: ClassMaskParams::default(),
            product_property: "product".to_string(),
            season_property: "season".to_string(),
            zone_property: "aez_id".to_string(),
            season: "tc-maize-main".to_string(),
            zone_id: 46172,
            temporary_crops: ProductLayer {
                product: "temporarycrops".to_string(),
                layer_name: "Temporary crops within Limit".to_string(),
                visualization: VisualizationSpec::single_band(
                    "classification",
                    0.0,
                    100.0,
                    &["blue", "green", "yellow", "orange"],
                ),
            },
            confidence_layer_name: "Temporary crops confidence within Limit".to_string(),
            confidence_visualization: VisualizationSpec::single_band(
                "confidence",
                0.0,
                100.0,
                &["be0000", "fff816", "069711"],
            )
            .hidden(),
            maize: ProductLayer {
                product: "maize".to_string(),
                layer_name: "Maize within Limit".to_string(),
                visualization: VisualizationSpec::single_band("classification", 0.0, 100.0, &["#ebc334"]),
            },
            irrigation: ProductLayer {
                product: "irrigation".to_string(),
                layer_name: "Active irrigation within Limit".to_string(),
                visualization: VisualizationSpec::single_band("classification", 0.0, 100.0, &["#2d79eb"]),
            },
        }
    }
}

/// Complete configuration of the cropland comparison map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonConfig {
    pub boundary_id: String,
    pub boundary_layer_name: String,
    pub boundary_color: String,
    pub zoom: u8,
    pub optical: OpticalConfig,
    pub classification: ClassificationConfig,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            boundary_id: "limit".to_string(),
            boundary_layer_name: "Limit Boundaries".to_string(),
            boundary_color: "lightblue".to_string(),
            zoom: 9,
            optical: OpticalConfig::default(),
            classification: ClassificationConfig::default(),
        }
    }
}

impl ComparisonConfig {
    /// Parse from JSON; omitted fields take their defaults
    pub fn from_json(json: &str) -> CropResult<Self> {
        let config: ComparisonConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> CropResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks that need no raster data
    pub fn validate(&self) -> CropResult<()> {
        if self.optical.end_date < self.optical.start_date {
            return Err(CropError::InvalidDateRange {
                start: self.optical.start_date,
                end: self.optical.end_date,
            });
        }
        if !self.optical.max_cloud_cover.is_finite() {
            return Err(CropError::InvalidParameter(format!(
                "cloud cover threshold must be finite, got {}",
                self.optical.max_cloud_cover
            )));
        }
        if self.zoom > 24 {
            return Err(CropError::InvalidParameter(format!(
                "zoom level {} is outside 0..=24",
                self.zoom
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_map() {
        let config = ComparisonConfig::default();
        assert_eq!(config.optical.max_cloud_cover, 20.0);
        assert_eq!(config.optical.cloud_mask.cloud_bit, 10);
        assert_eq!(config.optical.cloud_mask.cirrus_bit, 11);
        assert_eq!(config.classification.zone_id, 46172);
        assert!(!config.classification.confidence_visualization.visible);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_overrides() {
        let config = ComparisonConfig::from_json(
            r#"{
                "zoom": 7,
                "optical": {"start_date": "2021-06-01", "end_date": "2021-07-01", "max_cloud_cover": 5},
                "classification": {"season": "tc-wintercereals", "zone_id": 12048}
            }"#,
        )
        .unwrap();
        assert_eq!(config.zoom, 7);
        assert_eq!(config.optical.start_date, NaiveDate::from_ymd_opt(2021, 6, 1).unwrap());
        assert_eq!(config.optical.max_cloud_cover, 5.0);
        assert_eq!(config.optical.collection, "COPERNICUS/S2_SR_HARMONIZED");
        assert_eq!(config.classification.season, "tc-wintercereals");
        assert_eq!(config.classification.maize.product, "maize");
    }

    #[test]
    fn test_round_trip_and_rejections() {
        let json = ComparisonConfig::default().to_json().unwrap();
        assert_eq!(ComparisonConfig::from_json(&json).unwrap(), ComparisonConfig::default());

        let err = ComparisonConfig::from_json(
            r#"{"optical": {"start_date": "2021-02-01", "end_date": "2021-01-01"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, CropError::InvalidDateRange { .. }));

        let err = ComparisonConfig::from_json("{\"zoom\": \"nine\"}").unwrap_err();
        assert!(matches!(err, CropError::Json(_)));
        assert!(err.is_configuration_error());
    }
}
