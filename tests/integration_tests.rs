//! Integration tests for complete cache workflows.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use rowcache::{
    first_page_id, BatchRequest, CacheCoordinator, CacheOptions, CacheOptionsBuilder, ColumnKind,
    Error, InvalidationDiff, MemorySource, MemoryStore, RowSet, TableStructure, Value,
};

fn hr_source() -> Arc<MemorySource> {
    let source = Arc::new(MemorySource::new("memory://hr"));
    source.add_table(
        TableStructure::new("Company")
            .unwrap()
            .with_column("Name", ColumnKind::Text)
            .unwrap()
            .with_column("Founded", ColumnKind::DateTime)
            .unwrap(),
    );
    source.add_table(
        TableStructure::new("Person")
            .unwrap()
            .with_column("Name", ColumnKind::Text)
            .unwrap()
            .with_column("Salary", ColumnKind::Integer)
            .unwrap()
            .with_column("Employer", ColumnKind::Reference("Company".into()))
            .unwrap()
            .with_column("Photo", ColumnKind::Binary)
            .unwrap()
            .with_column("Resume", ColumnKind::StructuredText)
            .unwrap(),
    );
    for id in 1..=20i64 {
        source
            .upsert_row("Company", vec![id.into(), format!("Company {}", id).into(), Value::Null])
            .unwrap();
    }
    for id in 1..=500i64 {
        let employer = if id % 10 == 0 { 0 } else { id % 20 + 1 };
        source
            .upsert_row(
                "Person",
                vec![
                    id.into(),
                    format!("Person {}", id).into(),
                    (1000 * id).into(),
                    employer.into(),
                    vec![(id % 256) as u8; 8].into(),
                    format!("<resume id=\"{}\"/>", id).into(),
                ],
            )
            .unwrap();
    }
    source
}

fn test_options() -> CacheOptions {
    CacheOptionsBuilder::new()
        .repeat_count(4)
        .repeat_delay(Duration::from_millis(1))
        .build()
        .unwrap()
}

fn open(source: Arc<MemorySource>) -> Arc<CacheCoordinator> {
    CacheCoordinator::new(source, Arc::new(MemoryStore::new(50_000)), test_options()).unwrap()
}

/// Test page bucketing scenarios.
#[test]
fn integration_page_bucketing() {
    assert_eq!(first_page_id(101), 101);
    assert_eq!(first_page_id(100), 1);

    let source = hr_source();
    let cache = open(source.clone());
    let people = cache.table("Person").unwrap();

    people.get_value(100, "Name").unwrap();
    people.get_value(101, "Name").unwrap();
    let requests = source.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].contains(&people.page_request(1).key.canonical()));
    assert!(requests[1].contains(&people.page_request(101).key.canonical()));
}

/// Test default classification of blob and integer columns.
#[test]
fn integration_default_classification() {
    let cache = open(hr_source());
    let people = cache.table("Person").unwrap();

    assert!(people.classifier().is_individual("Photo").unwrap());
    assert!(people.classifier().is_individual("Resume").unwrap());
    assert!(!people.classifier().is_individual("Salary").unwrap());
    assert!(!people.page_columns().contains(&"Photo".to_string()));
}

/// Test values of every kind through the cache.
#[test]
fn integration_read_workflow() {
    let source = hr_source();
    let cache = open(source.clone());
    let people = cache.table("Person").unwrap();

    assert_eq!(people.get_value(42, "Name").unwrap(), Value::from("Person 42"));
    assert_eq!(people.get_value(42, "Salary").unwrap(), Value::Int(42_000));
    assert_eq!(people.get_value(42, "Photo").unwrap(), Value::from(vec![42u8; 8]));
    assert_eq!(
        people.get_value(42, "Employer.Name").unwrap(),
        Value::from("Company 3")
    );
    assert_eq!(people.get_value(42, "Employer.Founded").unwrap(), Value::Null);

    let calls = source.load_calls();
    for _ in 0..3 {
        people.get_value(42, "Employer.Name").unwrap();
        people.get_value(42, "Photo").unwrap();
    }
    assert_eq!(source.load_calls(), calls);
}

/// Test that a zero reference never reaches the master table.
#[test]
fn integration_zero_reference_is_null() {
    let source = hr_source();
    let cache = open(source.clone());
    let people = cache.table("Person").unwrap();

    assert_eq!(people.get_value(30, "Employer").unwrap(), Value::Int(0));
    assert_eq!(people.get_value(30, "Employer.Name").unwrap(), Value::Null);
    assert!(source
        .requests()
        .iter()
        .all(|r| !r.tables().contains(&"Company")));
    assert!(cache.tables().iter().all(|t| t != "Company"));
}

/// Test that a second load of the same request never reaches the source.
#[test]
fn integration_round_trip_from_store() {
    let source = hr_source();
    let cache = open(source.clone());
    let people = cache.table("Person").unwrap();

    let mut request = BatchRequest::new();
    request.add_page(people.page_request(1));
    request.add_page(people.page_request(201));
    request.add_field(people.field_request(7, "Photo"));
    request.add_field(people.field_request(250, "Resume"));

    let loaded = cache.load_batch(&request).unwrap();
    assert_eq!(loaded.len(), 4);
    assert_eq!(source.load_calls(), 1);

    let again = cache.load_batch(&request).unwrap();
    assert_eq!(again, loaded);
    assert_eq!(source.load_calls(), 1);
}

/// Test that preload hints ride along with an unrelated miss.
#[test]
fn integration_preload_piggyback() {
    let source = hr_source();
    let cache = open(source.clone());
    let people = cache.table("Person").unwrap();
    let companies = cache.table("Company").unwrap();

    people.add_preload_ids([350, 420]);
    companies.get_value(1, "Name").unwrap();

    let sent = source.last_request().unwrap();
    assert_eq!(sent.len(), 3);
    assert!(sent.contains(&people.page_request(350).key.canonical()));
    assert!(sent.contains(&people.page_request(420).key.canonical()));

    source.reset_counters();
    assert_eq!(people.get_value(399, "Salary").unwrap(), Value::Int(399_000));
    assert_eq!(people.get_value(401, "Salary").unwrap(), Value::Int(401_000));
    assert_eq!(source.load_calls(), 0);
}

/// Test in-place updates without a source round trip.
#[test]
fn integration_update_in_place() {
    let source = hr_source();
    let cache = open(source.clone());
    let people = cache.table("Person").unwrap();
    people.get_values(12, &["Name", "Salary", "Photo"]).unwrap();
    source.reset_counters();

    let fresh = RowSet::from_rows(
        vec!["Salary".into(), "Id".into(), "Photo".into()],
        vec![vec![Value::Int(1), Value::Int(12), Value::from(vec![9u8])]],
    )
    .unwrap();
    assert_eq!(people.update_rows(&fresh).unwrap(), 1);

    assert_eq!(people.get_value(12, "Salary").unwrap(), Value::Int(1));
    assert_eq!(people.get_value(12, "Photo").unwrap(), Value::from(vec![9u8]));
    assert_eq!(people.get_value(12, "Name").unwrap(), Value::from("Person 12"));
    assert_eq!(source.load_calls(), 0);
    assert_eq!(cache.metrics().rows_patched.get(), 1);
}

/// Test that clearing twice is the same as clearing once.
#[test]
fn integration_clear_idempotent() {
    let run = |clears: usize| {
        let source = hr_source();
        let cache = open(source.clone());
        let people = cache.table("Person").unwrap();
        people.get_values(5, &["Name", "Photo"]).unwrap();
        people.get_value(150, "Name").unwrap();
        for _ in 0..clears {
            people.clear().unwrap();
        }
        source.reset_counters();
        people.get_values(5, &["Name", "Photo"]).unwrap();
        people.get_value(150, "Name").unwrap();
        source.load_calls()
    };
    assert_eq!(run(1), run(2));
    assert_eq!(run(1), 3);
}

/// Test that an always-failing source is called exactly repeat_count times.
#[test]
fn integration_retry_exhaustion() {
    let source = hr_source();
    let cache = open(source.clone());
    let people = cache.table("Person").unwrap();
    source.fail_always(true);

    let err = people.get_value(1, "Name").unwrap_err();
    assert_eq!(source.load_calls(), 4);
    assert!(matches!(err, Error::LoadFailed { attempts: 4, .. }));
    let unresolved = err.unresolved_request().unwrap();
    assert!(unresolved.contains(&people.page_request(1).key.canonical()));
    assert!(std::error::Error::source(&err).is_some());

    // Recovers once the source does
    source.fail_always(false);
    assert_eq!(people.get_value(1, "Name").unwrap(), Value::from("Person 1"));
}

/// Test a deleted row surfacing as a missing row.
#[test]
fn integration_row_not_found() {
    let source = hr_source();
    let cache = open(source.clone());
    let people = cache.table("Person").unwrap();
    people.get_value(1, "Name").unwrap();

    assert!(matches!(
        people.get_value(501, "Name"),
        Err(Error::RowNotFound { id: 501, .. })
    ));
}

/// Test invalidation decoded from its wire form.
#[test]
fn integration_invalidation_from_wire() {
    let source = hr_source();
    let cache = open(source.clone());
    let people = cache.table("Person").unwrap();
    let companies = cache.table("Company").unwrap();
    people.get_value(1, "Name").unwrap();
    people.get_value(101, "Name").unwrap();
    companies.get_value(1, "Name").unwrap();

    source.set_value("Person", 2, "Name", "Renamed").unwrap();
    source.set_value("Company", 1, "Name", "Renamed Co").unwrap();

    let diff: InvalidationDiff = serde_json::from_str(
        r#"{"clear_all": false, "tables": {"Person": [1], "Company": null}}"#,
    )
    .unwrap();
    cache.invalidate(&diff).unwrap();
    source.reset_counters();

    assert_eq!(people.get_value(2, "Name").unwrap(), Value::from("Renamed"));
    assert_eq!(companies.get_value(1, "Name").unwrap(), Value::from("Renamed Co"));
    people.get_value(101, "Name").unwrap();
    assert_eq!(source.load_calls(), 2);

    let json = serde_json::to_string(&InvalidationDiff::new().clear_rows("Person", [7, 8])).unwrap();
    let back: InvalidationDiff = serde_json::from_str(&json).unwrap();
    assert_eq!(back.tables().next().map(|(t, p)| (t, p.map(|p| p.len()))), Some(("Person", Some(1))));
}

/// Test projections across pages and references.
#[test]
fn integration_projection() {
    let source = hr_source();
    let cache = open(source.clone());
    let people = cache.table("Person").unwrap();

    let ids: Vec<i64> = vec![450, 3, 0, 120, 3];
    let rows = people
        .create_projection(&ids, &["Name", "Employer.Name", "Photo"])
        .unwrap();

    assert_eq!(rows.len(), 4);
    assert_eq!(rows.ids().collect::<Vec<_>>(), vec![450, 3, 0, 120]);
    assert_eq!(rows.value(450, "Name"), Some(&Value::from("Person 450")));
    assert_eq!(rows.value(3, "Employer.Name"), Some(&Value::from("Company 4")));
    assert_eq!(rows.value(0, "Photo"), Some(&Value::Null));
    // Every person page involved arrived in the first round trip
    assert_eq!(source.requests()[0].len(), 3);
}

/// Test that a disagreeing classification stops table registration.
#[test]
fn integration_classification_mismatch() {
    let source = hr_source();
    let stale = TableStructure::new("Person")
        .unwrap()
        .with_column("Name", ColumnKind::Text)
        .unwrap();
    source
        .set_classification("Person", rowcache::ColumnClassifier::new(stale))
        .unwrap();
    let cache = open(source);
    assert!(matches!(
        cache.table("Person"),
        Err(Error::ClassificationMismatch { .. })
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_same_block_same_page(block in 0i64..10_000, a in 0i64..100, b in 0i64..100) {
        let first = block * 100 + 1;
        prop_assert_eq!(first_page_id(first + a), first);
        prop_assert_eq!(first_page_id(first + a), first_page_id(first + b));
        prop_assert_ne!(first_page_id(first + a), first_page_id(first + 100 + b));
    }

    #[test]
    fn prop_get_values_agrees_with_get_value(
        id in 0i64..=500,
        picks in proptest::collection::vec(0usize..6, 1..6),
    ) {
        let all = ["Name", "Salary", "Employer", "Photo", "Resume", "Employer.Name"];
        let columns: Vec<&str> = picks.iter().map(|&i| all[i]).collect();

        let cache = open(hr_source());
        let people = cache.table("Person").unwrap();
        let values = people.get_values(id, &columns).unwrap();

        prop_assert_eq!(values.len(), columns.len());
        for (column, value) in columns.iter().zip(&values) {
            prop_assert_eq!(&people.get_value(id, column).unwrap(), value);
        }
    }
}
