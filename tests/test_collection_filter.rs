use chrono::NaiveDate;
use cropview::{
    Boundary, BoundingBox, CollectionFilter, CropError, GeoTransform, Image, ImageCollection, PixelGrid,
    Predicate, RasterSchema,
};
use ndarray::Array3;
use std::sync::Arc;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 1, day).unwrap()
}

fn schema() -> RasterSchema {
    RasterSchema::new(
        ["B4", "QA60"],
        PixelGrid::new("EPSG:4326", GeoTransform::north_up(-1.0, 41.0, 0.5), 2, 2),
    )
}

/// Scenes with varying date, cloud cover and footprint, deliberately not in date order
fn scenes() -> ImageCollection {
    let specs = [
        ("s1", 12, 5.0, -1.0),
        ("s2", 3, 35.0, -1.0),
        ("s3", 29, 10.0, 20.0),
        ("s4", 1, 19.9, -0.5),
        ("s5", 30, 2.0, -1.0),
        ("s6", 15, 20.0, -1.0),
    ];
    let images = specs
        .iter()
        .map(|(id, day, cloud, lon)| {
            let image = Image::new(*id, schema(), Array3::zeros(schema().shape()))
                .unwrap()
                .with_acquired(date(*day))
                .with_property("CLOUDY_PIXEL_PERCENTAGE", *cloud)
                .with_footprint(BoundingBox::new(*lon, 40.0, *lon + 1.0, 41.0));
            // Only the late-month scene is tagged with a season
            if *id == "s3" {
                image.with_property("season", "tc-maize-main")
            } else {
                image
            }
        })
        .collect();
    ImageCollection::from_images(schema(), images).unwrap()
}

fn limit() -> Arc<Boundary> {
    Arc::new(Boundary::from_bbox("limit", &BoundingBox::new(-0.8, 40.2, -0.2, 40.8)))
}

#[test]
fn test_conjunction_preserves_order() {
    init_logging();
    let filter = CollectionFilter::new(vec![
        Predicate::date_range(date(1), date(30)),
        Predicate::lt("CLOUDY_PIXEL_PERCENTAGE", 20.0),
        Predicate::bounds(limit()),
    ]);
    let result = filter.apply(&scenes()).unwrap();
    // s2 too cloudy, s3 outside the boundary, s5 on the excluded end date, s6 not strictly below 20
    assert_eq!(result.ids(), vec!["s1", "s4"]);
}

#[test]
fn test_predicate_order_does_not_matter() {
    init_logging();
    let by_date = Predicate::date_range(date(1), date(20));
    let by_cloud = Predicate::expression("CLOUDY_PIXEL_PERCENTAGE < 20");

    let date_first = CollectionFilter::new(vec![by_date.clone()]).apply(&scenes()).unwrap();
    let date_then_cloud = CollectionFilter::new(vec![by_cloud.clone()]).apply(&date_first).unwrap();

    let cloud_first = CollectionFilter::new(vec![by_cloud.clone()]).apply(&scenes()).unwrap();
    let cloud_then_date = CollectionFilter::new(vec![by_date.clone()]).apply(&cloud_first).unwrap();

    let combined = CollectionFilter::new(vec![by_cloud, by_date]).apply(&scenes()).unwrap();

    assert_eq!(date_then_cloud.ids(), cloud_then_date.ids());
    assert_eq!(date_then_cloud.ids(), combined.ids());
    assert_eq!(combined.ids(), vec!["s1", "s4"]);
}

fn apply_in_turn(predicates: &[Predicate]) -> Result<Vec<String>, CropError> {
    let mut collection = scenes();
    for predicate in predicates {
        collection = CollectionFilter::new(vec![predicate.clone()]).apply(&collection)?;
    }
    Ok(collection.ids().into_iter().map(String::from).collect())
}

#[test]
fn test_order_does_not_matter_when_a_subset_lacks_the_property() {
    init_logging();
    let early = Predicate::date_range(date(1), date(20));
    let season = Predicate::eq("season", "tc-maize-main");

    // The early scenes carry no season at all, yet both chains agree
    let date_first = apply_in_turn(&[early.clone(), season.clone()]).unwrap();
    let season_first = apply_in_turn(&[season.clone(), early.clone()]).unwrap();
    assert!(date_first.is_empty());
    assert_eq!(date_first, season_first);

    let late = Predicate::date_range(date(20), date(31));
    assert_eq!(apply_in_turn(&[late.clone(), season.clone()]).unwrap(), vec!["s3"]);
    assert_eq!(apply_in_turn(&[season, late]).unwrap(), vec!["s3"]);
}

#[test]
fn test_order_does_not_matter_for_failing_predicates() {
    init_logging();
    let early = Predicate::date_range(date(1), date(20));
    let numeric_season = Predicate::lt("season", 3);
    let missing = Predicate::eq("aez_id", 46172);

    for predicates in [
        vec![early.clone(), numeric_season.clone()],
        vec![numeric_season.clone(), early.clone()],
    ] {
        assert!(matches!(
            CollectionFilter::new(predicates.clone()).apply(&scenes()),
            Err(CropError::TypeMismatch { .. })
        ));
        assert!(matches!(apply_in_turn(&predicates), Err(CropError::TypeMismatch { .. })));
    }

    for predicates in [vec![early.clone(), missing.clone()], vec![missing, early]] {
        assert!(matches!(apply_in_turn(&predicates), Err(CropError::UnknownProperty(_))));
    }
}

#[test]
fn test_unorderable_values_are_dropped_not_fatal() {
    init_logging();
    let images = vec![
        Image::new("ok", schema(), Array3::zeros(schema().shape()))
            .unwrap()
            .with_property("CLOUDY_PIXEL_PERCENTAGE", 3.0),
        Image::new("nan", schema(), Array3::zeros(schema().shape()))
            .unwrap()
            .with_property("CLOUDY_PIXEL_PERCENTAGE", f64::NAN),
    ];
    let collection = ImageCollection::from_images(schema(), images).unwrap();
    let result = CollectionFilter::new(vec![Predicate::expression("CLOUDY_PIXEL_PERCENTAGE < 20")])
        .apply(&collection)
        .unwrap();
    assert_eq!(result.ids(), vec!["ok"]);
}

#[test]
fn test_empty_results_are_not_errors() {
    init_logging();
    let empty_range = CollectionFilter::new(vec![Predicate::date_range(date(5), date(5))]);
    assert!(empty_range.apply(&scenes()).unwrap().is_empty());

    let nothing_clear = CollectionFilter::new(vec![Predicate::lt("CLOUDY_PIXEL_PERCENTAGE", 1.0)]);
    let result = nothing_clear.apply(&scenes()).unwrap();
    assert!(result.is_empty());
    assert_eq!(result.schema(), &schema());
}

#[test]
fn test_configuration_errors() {
    init_logging();
    let inverted = CollectionFilter::new(vec![Predicate::date_range(date(20), date(1))]);
    assert!(matches!(
        inverted.apply(&scenes()),
        Err(CropError::InvalidDateRange { .. })
    ));

    let unknown = CollectionFilter::new(vec![Predicate::eq("aez_id", 46172)]);
    assert!(matches!(unknown.apply(&scenes()), Err(CropError::UnknownProperty(_))));

    let mismatch = CollectionFilter::new(vec![Predicate::expression(
        "CLOUDY_PIXEL_PERCENTAGE < \"low\"",
    )]);
    assert!(matches!(mismatch.apply(&scenes()), Err(CropError::TypeMismatch { .. })));

    let malformed = CollectionFilter::new(vec![Predicate::expression("CLOUDY_PIXEL_PERCENTAGE <")]);
    let err = malformed.apply(&scenes()).unwrap_err();
    assert!(matches!(err, CropError::InvalidExpression(_)));
    assert!(err.is_configuration_error());
}
