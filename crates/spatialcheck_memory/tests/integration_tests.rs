use pretty_assertions::assert_eq;
use spatialcheck_core::{
    DataAccessError, DataSource, Feature, FieldDefn, FieldKind, FieldValue, Geometry,
    GeometryEngine, GeometryKind, Layer, Polygon, Target, TargetOpener,
};
use spatialcheck_memory::{FilterExpr, MemoryCatalog, MemoryDataSource, MemoryLayer, PlanarEngine};
use std::sync::Arc;

fn parcels() -> MemoryLayer {
    MemoryLayer::new("PARCEL", GeometryKind::Polygon)
        .with_field(FieldDefn::new("PNU", FieldKind::String).required())
        .with_field(FieldDefn::new("AREA_M2", FieldKind::Real))
        .with_feature(
            Feature::new(1, Some(Polygon::rectangle(0.0, 0.0, 10.0, 10.0).into()))
                .with_attribute("PNU", "1111-0001")
                .with_attribute("AREA_M2", 100.0),
        )
        .with_feature(
            Feature::new(2, Some(Polygon::rectangle(10.0, 0.0, 30.0, 10.0).into()))
                .with_attribute("PNU", "1111-0002")
                .with_attribute("AREA_M2", 200.0),
        )
        .with_feature(
            Feature::new(3, None)
                .with_attribute("PNU", "2222-0001")
                .with_attribute("AREA_M2", None::<f64>),
        )
}

fn fids(layer: &mut dyn Layer) -> Vec<i64> {
    layer.reset_reading();
    let mut out = Vec::new();
    while let Some(feature) = layer.next_feature().unwrap() {
        out.push(feature.fid);
    }
    out
}

#[tokio::test]
async fn test_catalog_opens_shared_source() {
    let catalog = MemoryCatalog::new()
        .with_source("/data/cadastre.gdb", MemoryDataSource::new("cadastre").with_layer(parcels()));

    let target = Target::new("/data/cadastre.gdb");
    let first = catalog.open(&target).await.unwrap();
    let second = catalog.open(&target).await.unwrap();

    assert_eq!(first.name(), "cadastre");
    assert_eq!(first.layer_names(), vec!["PARCEL".to_string()]);
    assert_eq!(first.layer_count(), 1);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(catalog.open_count(), 2);
}

#[tokio::test]
async fn test_catalog_errors() {
    let catalog = MemoryCatalog::new().with_broken("/data/locked.gdb", "locked by another process");

    let err = catalog.open(&Target::new("/data/locked.gdb")).await.err().unwrap();
    assert!(matches!(err, DataAccessError::OpenFailed { .. }));
    assert!(err.to_string().contains("locked by another process"));

    let err = catalog.open(&Target::new("/data/missing.gdb")).await.err().unwrap();
    assert!(matches!(err, DataAccessError::TargetNotFound(_)));
    assert_eq!(catalog.open_count(), 0);
}

#[test]
fn test_layer_handles_are_independent() {
    let source = MemoryDataSource::new("cadastre").with_layer(parcels());
    let mut filtered = source.layer("parcel").unwrap();
    let mut plain = source.layer("PARCEL").unwrap();

    filtered.set_attribute_filter(Some("PNU LIKE '1111-%'")).unwrap();
    assert_eq!(filtered.attribute_filter(), Some("PNU LIKE '1111-%'"));
    assert_eq!(filtered.feature_count().unwrap(), 2);
    assert_eq!(fids(filtered.as_mut()), vec![1, 2]);
    assert_eq!(fids(plain.as_mut()), vec![1, 2, 3]);

    filtered.set_attribute_filter(None).unwrap();
    assert_eq!(filtered.attribute_filter(), None);
    assert_eq!(fids(filtered.as_mut()), vec![1, 2, 3]);
}

#[test]
fn test_filter_expressions() {
    let source = MemoryDataSource::new("cadastre").with_layer(parcels());
    let mut layer = source.layer("PARCEL").unwrap();

    let cases = [
        ("AREA_M2 > 150", vec![2]),
        ("AREA_M2 IS NULL", vec![3]),
        ("AREA_M2 IS NOT NULL AND OBJECTID <> 1", vec![2]),
        ("PNU IN ('1111-0001', '2222-0001')", vec![1, 3]),
        ("NOT (PNU LIKE '1111%') OR FID = 2", vec![2, 3]),
        ("pnu not like '%-0001'", vec![2]),
    ];
    for (filter, expected) in cases {
        layer.set_attribute_filter(Some(filter)).unwrap();
        assert_eq!(fids(layer.as_mut()), expected, "{filter}");
    }
}

#[test]
fn test_invalid_filter_is_rejected() {
    let source = MemoryDataSource::new("cadastre").with_layer(parcels());
    let mut layer = source.layer("PARCEL").unwrap();

    let err = layer.set_attribute_filter(Some("PNU = ")).unwrap_err();
    assert!(matches!(err, DataAccessError::InvalidFilter { .. }));
    assert!(FilterExpr::parse("AREA_M2 >> 3").is_err());
    assert!(FilterExpr::parse("(PNU = 'a'").is_err());

    // well-formed SQL outside the filter subset
    layer.set_attribute_filter(Some("AREA_M2 > 150")).unwrap();
    let err = layer
        .set_attribute_filter(Some("LENGTH(PNU) = 9"))
        .unwrap_err();
    assert!(err.to_string().contains("Unsupported"), "{err}");
    assert_eq!(layer.attribute_filter(), Some("AREA_M2 > 150"));
    assert_eq!(fids(layer.as_mut()), vec![2]);
}

#[test]
fn test_failing_layer_reports_read_error() {
    let source = MemoryDataSource::new("cadastre").with_layer(parcels().failing_after(1));
    let mut layer = source.layer("PARCEL").unwrap();

    assert!(layer.next_feature().unwrap().is_some());
    assert!(matches!(
        layer.next_feature(),
        Err(DataAccessError::ReadFailed { .. })
    ));
}

#[test]
fn test_feature_attributes() {
    let source = MemoryDataSource::new("cadastre").with_layer(parcels());
    let layer = source.open_layer("PARCEL").unwrap();
    assert_eq!(layer.fields().len(), 2);
    assert!(!layer.fields()[0].nullable);

    let parcels = parcels();
    let third = &parcels.features()[2];
    assert_eq!(third.get("AREA_M2"), Some(&FieldValue::Null));
    assert!(third.geometry.is_none());
}

#[test]
fn test_engine_on_parcels() {
    let engine = PlanarEngine::new();
    let parcel: Geometry = Polygon::rectangle(0.0, 0.0, 10.0, 10.0).into();

    assert!(engine.contains(&parcel, &Geometry::point(10.0, 5.0)).unwrap());
    assert!(!engine.contains(&parcel, &Geometry::point(10.5, 5.0)).unwrap());
    assert_eq!(engine.distance(&Geometry::point(13.0, 14.0), &parcel).unwrap(), 5.0);
    assert_eq!(engine.area(&parcel).unwrap(), 100.0);
    assert_eq!(engine.length(&parcel).unwrap(), 40.0);

    let inside = engine.interior_point(&parcel).unwrap();
    assert!(engine.contains(&parcel, &Geometry::point(inside.x, inside.y)).unwrap());
}
