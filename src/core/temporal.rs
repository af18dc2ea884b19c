use crate::types::{CropResult, Image, ImageCollection};
use ndarray::{Array3, Zip};

/// Per-pixel temporal mean over valid observations.
///
/// Suited to continuous values such as reflectance; classification codes
/// should be mosaicked instead.
#[derive(Debug, Clone, Default)]
pub struct TemporalAggregator;

impl TemporalAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Mean of every valid contribution per pixel and band.
    ///
    /// Pixels invalid in every image stay invalid; an empty collection yields
    /// a raster that is invalid everywhere. Accumulation is in f64 and does
    /// not depend on collection order beyond floating-point rounding.
    pub fn mean(&self, collection: &ImageCollection) -> CropResult<Image> {
        let schema = collection.schema().clone();
        let shape = schema.shape();

        log::info!(
            "Computing temporal mean of {} images over {} bands ({}x{})",
            collection.len(),
            shape.0,
            shape.2,
            shape.1
        );

        let mut sum = Array3::<f64>::zeros(shape);
        let mut count = Array3::<u32>::zeros(shape);
        let mut footprint = None;

        for image in collection.iter() {
            accumulate(&mut sum, &mut count, image);
            footprint = Some(match footprint {
                None => image.footprint().clone(),
                Some(acc) => image.footprint().union(&acc),
            });
        }

        let values = Zip::from(&sum)
            .and(&count)
            .map_collect(|&s, &n| if n > 0 { (s / n as f64) as f32 } else { 0.0 });
        let validity = count.mapv(|n| n > 0);

        log::info!(
            "Temporal mean complete: {} of {} pixel values valid",
            validity.iter().filter(|&&v| v).count(),
            validity.len()
        );

        let mut mean = Image::from_parts("mean", schema, values, validity)?;
        if let Some(footprint) = footprint {
            mean = mean.with_footprint(footprint);
        }
        Ok(mean)
    }
}

#[cfg(feature = "parallel")]
fn accumulate(sum: &mut Array3<f64>, count: &mut Array3<u32>, image: &Image) {
    Zip::from(sum)
        .and(count)
        .and(image.values())
        .and(image.validity())
        .par_for_each(|s, n, &value, &valid| {
            if valid {
                *s += value as f64;
                *n += 1;
            }
        });
}

#[cfg(not(feature = "parallel"))]
fn accumulate(sum: &mut Array3<f64>, count: &mut Array3<u32>, image: &Image) {
    Zip::from(sum)
        .and(count)
        .and(image.values())
        .and(image.validity())
        .for_each(|s, n, &value, &valid| {
            if valid {
                *s += value as f64;
                *n += 1;
            }
        });
}
