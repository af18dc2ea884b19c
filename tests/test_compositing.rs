use approx::assert_relative_eq;
use cropview::{
    ClassMaskParams, ClassMasker, CropError, GeoTransform, Image, ImageCollection, Mosaicker, PixelGrid,
    RasterSchema, TemporalAggregator,
};
use ndarray::{Array2, Array3};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn schema() -> RasterSchema {
    RasterSchema::new(
        ["classification", "confidence"],
        PixelGrid::new("EPSG:4326", GeoTransform::north_up(0.0, 2.0, 1.0), 2, 2),
    )
}

fn filled(id: &str, classification: f32, confidence: f32) -> Image {
    let mut values = Array3::zeros(schema().shape());
    values.index_axis_mut(ndarray::Axis(0), 0).fill(classification);
    values.index_axis_mut(ndarray::Axis(0), 1).fill(confidence);
    Image::new(id, schema(), values).unwrap()
}

/// Masks pixel (0, 0) in every band
fn masked_at_origin(image: Image) -> Image {
    let mut keep = Array2::from_elem((2, 2), true);
    keep[[0, 0]] = false;
    image.update_mask(&keep).unwrap()
}

#[test]
fn test_first_valid_wins_in_both_orders() {
    init_logging();
    let a = filled("A", 10.0, 80.0);
    let b = masked_at_origin(filled("B", 20.0, 60.0));

    let ab = ImageCollection::from_images(schema(), vec![a.clone(), b.clone()]).unwrap();
    let ba = ImageCollection::from_images(schema(), vec![b, a]).unwrap();

    let mosaic_ab = Mosaicker::new().mosaic(&ab).unwrap();
    let mosaic_ba = Mosaicker::new().mosaic(&ba).unwrap();
    let mean = TemporalAggregator::new().mean(&ab).unwrap();

    assert_eq!(mosaic_ab.value_at("classification", 0, 0), Some(10.0));
    assert_eq!(mosaic_ba.value_at("classification", 0, 0), Some(10.0));
    assert_eq!(mean.value_at("classification", 0, 0), Some(10.0));

    // Where both are valid the first image wins, never an average or the last one
    assert_eq!(mosaic_ab.value_at("classification", 1, 1), Some(10.0));
    assert_eq!(mosaic_ba.value_at("classification", 1, 1), Some(20.0));
    assert_relative_eq!(mean.value_at("classification", 1, 1).unwrap(), 15.0, epsilon = 1e-6);
}

#[test]
fn test_empty_inputs_give_fully_invalid_rasters() {
    init_logging();
    let empty = ImageCollection::empty(schema());

    let mosaic = Mosaicker::new().mosaic(&empty).unwrap();
    assert_eq!(mosaic.valid_pixel_count(), 0);
    assert_eq!(mosaic.schema(), &schema());

    let mean = TemporalAggregator::new().mean(&empty).unwrap();
    assert_eq!(mean.valid_pixel_count(), 0);
    assert_eq!(mean.values().dim(), (2, 2, 2));
}

#[test]
fn test_invalid_everywhere_stays_invalid() {
    init_logging();
    let a = masked_at_origin(filled("A", 1.0, 1.0));
    let b = masked_at_origin(filled("B", 3.0, 3.0));
    let collection = ImageCollection::from_images(schema(), vec![a, b]).unwrap();

    let mosaic = Mosaicker::new().mosaic(&collection).unwrap();
    let mean = TemporalAggregator::new().mean(&collection).unwrap();
    assert!(!mosaic.is_valid("classification", 0, 0));
    assert!(!mean.is_valid("confidence", 0, 0));
    assert_eq!(mean.value_at("classification", 0, 1), Some(2.0));
}

#[test]
fn test_mean_is_order_invariant() {
    init_logging();
    let images = vec![
        filled("A", 0.1, 12.0),
        masked_at_origin(filled("B", 0.7, 48.0)),
        filled("C", 0.25, 33.0),
        filled("D", 0.9, 91.0),
    ];
    let forward = ImageCollection::from_images(schema(), images).unwrap();
    let backward = forward.reversed();

    let m1 = TemporalAggregator::new().mean(&forward).unwrap();
    let m2 = TemporalAggregator::new().mean(&backward).unwrap();
    assert_eq!(m1.validity(), m2.validity());
    for (x, y) in m1.values().iter().zip(m2.values().iter()) {
        assert_relative_eq!(*x, *y, epsilon = 1e-6);
    }
}

#[test]
fn test_class_mask_background_scenario() {
    init_logging();
    let mut values = Array3::from_elem(schema().shape(), 7.0f32);
    values[[0, 0, 1]] = 0.0;
    let image = Image::new("tile", schema(), values).unwrap();

    let masker = ClassMasker::new(ClassMaskParams::default());
    let once = masker.apply(&image).unwrap();
    assert!(!once.is_valid("classification", 0, 1));
    assert_eq!(once.value_at("classification", 0, 0), Some(7.0));
    assert_eq!(once.value_at("confidence", 0, 1), Some(7.0));

    let twice = masker.apply(&once).unwrap();
    assert_eq!(once.validity(), twice.validity());
    assert_eq!(once.values(), twice.values());
}

#[test]
fn test_mixed_schemas_are_rejected() {
    init_logging();
    let other = RasterSchema::new(
        ["classification"],
        PixelGrid::new("EPSG:4326", GeoTransform::north_up(0.0, 2.0, 1.0), 2, 2),
    );
    let stray = Image::new("stray", other, Array3::zeros((1, 2, 2))).unwrap();
    let err = ImageCollection::from_images(schema(), vec![filled("A", 1.0, 1.0), stray]).unwrap_err();
    assert!(matches!(err, CropError::SchemaMismatch(_)));
    assert!(!err.is_configuration_error());
}
