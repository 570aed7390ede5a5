// Example API Usage
// This file shows how the row cache is used

use std::sync::Arc;
use std::time::Duration;

use rowcache::{
    CacheCoordinator, CacheOptionsBuilder, ColumnKind, Error, InvalidationDiff, MemorySource,
    MemoryStore, RowSet, TableStructure, Value, WorkingSet,
};

fn main() -> Result<(), Error> {
    // ===========================================
    // Describe the source
    // ===========================================

    let source = Arc::new(MemorySource::new("memory://hr"));
    source.add_table(
        TableStructure::new("Company")?
            .with_column("Name", ColumnKind::Text)?,
    );
    source.add_table(
        TableStructure::new("Person")?
            .with_column("Name", ColumnKind::Text)?
            .with_column("Employer", ColumnKind::Reference("Company".into()))?
            .with_column("Photo", ColumnKind::Binary)?,
    );
    source.upsert_row("Company", vec![1.into(), "Acme".into()])?;
    source.upsert_row("Person", vec![1.into(), "Ann".into(), 1.into(), vec![0u8; 4].into()])?;

    // ===========================================
    // Open the cache
    // ===========================================

    let options = CacheOptionsBuilder::new()
        .repeat_count(3)
        .repeat_delay(Duration::from_millis(50))
        .log_first_failure(true)
        .build()?;
    let cache = CacheCoordinator::new(source.clone(), Arc::new(MemoryStore::new(10_000)), options)?;

    // ===========================================
    // Reads
    // ===========================================

    let people = cache.table("Person")?;

    // Loads the page holding ids 1..=100 once
    let name = people.get_value(1, "Name")?;
    assert_eq!(name, Value::from("Ann"));

    // Binary columns are loaded one value at a time
    let photo = people.get_value(1, "Photo")?;

    // Reference paths cross tables
    let employer = people.get_value_in(1, "Employer.Name", None)?;
    assert_eq!(employer, Value::from("Acme"));

    // Several columns in one call
    let values = people.get_values(1, &["Name", "Employer.Name", "Photo"])?;
    assert_eq!(values[2], photo);

    // Values held locally take precedence
    let local = WorkingSet::new().with_rows(
        "Company",
        RowSet::from_rows(vec!["Id".into(), "Name".into()], vec![vec![1.into(), "Acme Ltd".into()]])?,
    );
    let renamed = people.get_value_in(1, "Employer.Name", Some(&local))?;

    // ===========================================
    // Preloading
    // ===========================================

    // Pages for these ids ride along with the next miss
    people.add_preload_ids(101..=500);

    // ===========================================
    // Updates and invalidation
    // ===========================================

    let changed = RowSet::from_rows(
        vec!["Id".into(), "Name".into()],
        vec![vec![1.into(), "Ann B.".into()]],
    )?;
    people.update_rows(&changed)?;

    people.clear_id(1)?;
    cache.invalidate(&InvalidationDiff::new().clear_rows("Person", [1]).clear_table("Company"))?;

    // ===========================================
    // Metrics
    // ===========================================

    println!("{}", cache.metrics().summary());
    println!("{}", cache.metrics().to_prometheus());

    let _ = renamed;
    Ok(())
}
