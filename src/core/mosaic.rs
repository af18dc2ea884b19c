use crate::types::{CropResult, Image, ImageCollection};
use ndarray::{Array3, Zip};

/// First-valid-pixel compositor.
///
/// For each pixel and band the output takes the value of the first image, in
/// collection order, that is valid there. This is not an average and not
/// last-on-top: collection order is precedence, and the caller (or the store
/// that produced the collection) owns that order.
#[derive(Debug, Clone, Default)]
pub struct Mosaicker;

impl Mosaicker {
    pub fn new() -> Self {
        Self
    }

    /// Composite the collection into one raster of the collection schema.
    ///
    /// Pixels no image covers stay invalid; an empty collection yields a
    /// raster that is invalid everywhere.
    pub fn mosaic(&self, collection: &ImageCollection) -> CropResult<Image> {
        let schema = collection.schema().clone();
        let shape = schema.shape();

        log::info!(
            "Mosaicking {} images over {} bands ({}x{})",
            collection.len(),
            shape.0,
            shape.2,
            shape.1
        );

        let mut values = Array3::zeros(shape);
        let mut validity = Array3::from_elem(shape, false);
        // Covers every input, including images left unread once the mosaic is full
        let footprint = collection
            .iter()
            .map(|image| image.footprint().clone())
            .reduce(|acc, footprint| footprint.union(&acc));

        for image in collection.iter() {
            let mut filled = 0usize;
            Zip::from(&mut values)
                .and(&mut validity)
                .and(image.values())
                .and(image.validity())
                .for_each(|out, out_valid, &value, &valid| {
                    if valid && !*out_valid {
                        *out = value;
                        *out_valid = true;
                        filled += 1;
                    }
                });
            log::debug!("Image '{}' filled {} pixel values", image.id(), filled);

            if validity.iter().all(|&v| v) {
                log::debug!("Mosaic complete after image '{}'", image.id());
                break;
            }
        }

        let mut mosaic = Image::from_parts("mosaic", schema, values, validity)?;
        if let Some(footprint) = footprint {
            mosaic = mosaic.with_footprint(footprint);
        }
        Ok(mosaic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, GeoTransform, PixelGrid, RasterSchema};
    use ndarray::{arr2, Axis};

    fn schema() -> RasterSchema {
        RasterSchema::new(
            ["classification"],
            PixelGrid::new("EPSG:4326", GeoTransform::north_up(0.0, 1.0, 0.5), 2, 1),
        )
    }

    fn image(id: &str, values: [f32; 2], valid: [bool; 2]) -> Image {
        let values = Array3::from_shape_vec((1, 1, 2), values.to_vec()).unwrap();
        let validity = Array3::from_shape_vec((1, 1, 2), valid.to_vec()).unwrap();
        Image::from_parts(id, schema(), values, validity).unwrap()
    }

    #[test]
    fn test_first_valid_wins_not_last() {
        let a = image("a", [1.0, 2.0], [true, true]);
        let b = image("b", [9.0, 9.0], [true, true]);
        let coll = ImageCollection::from_images(schema(), vec![a, b]).unwrap();

        let mosaic = Mosaicker::new().mosaic(&coll).unwrap();
        assert_eq!(mosaic.value_at("classification", 0, 0), Some(1.0));
        assert_eq!(mosaic.value_at("classification", 0, 1), Some(2.0));

        let mosaic = Mosaicker::new().mosaic(&coll.reversed()).unwrap();
        assert_eq!(mosaic.value_at("classification", 0, 0), Some(9.0));
    }

    #[test]
    fn test_gaps_filled_from_later_images() {
        let a = image("a", [1.0, 0.0], [true, false]);
        let b = image("b", [5.0, 6.0], [true, true]);
        let coll = ImageCollection::from_images(schema(), vec![a, b]).unwrap();

        let mosaic = Mosaicker::new().mosaic(&coll).unwrap();
        assert_eq!(mosaic.value_at("classification", 0, 0), Some(1.0));
        assert_eq!(mosaic.value_at("classification", 0, 1), Some(6.0));
    }

    #[test]
    fn test_uncovered_pixel_stays_invalid() {
        let a = image("a", [1.0, 3.0], [true, false]);
        let coll = ImageCollection::from_images(schema(), vec![a]).unwrap();
        let mosaic = Mosaicker::new().mosaic(&coll).unwrap();
        assert_eq!(
            mosaic.validity().index_axis(Axis(0), 0),
            arr2(&[[true, false]])
        );
    }

    #[test]
    fn test_footprint_spans_images_after_mosaic_is_full() {
        let a = image("a", [1.0, 2.0], [true, true]).with_footprint(BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        let b = image("b", [5.0, 6.0], [true, true]).with_footprint(BoundingBox::new(4.0, 3.0, 5.0, 4.0));
        let coll = ImageCollection::from_images(schema(), vec![a, b]).unwrap();

        let mosaic = Mosaicker::new().mosaic(&coll).unwrap();
        assert_eq!(mosaic.value_at("classification", 0, 1), Some(2.0));
        assert_eq!(mosaic.footprint(), &BoundingBox::new(0.0, 0.0, 5.0, 4.0));
    }

    #[test]
    fn test_empty_collection_fully_invalid() {
        let mosaic = Mosaicker::new().mosaic(&ImageCollection::empty(schema())).unwrap();
        assert_eq!(mosaic.valid_pixel_count(), 0);
        assert_eq!(mosaic.values().dim(), (1, 1, 2));
    }
}
