mod support;

use async_trait::async_trait;
use orm_admin_adapter::config::{EntityMeta, MetadataStorage};
use orm_admin_adapter::orm::{Condition, EntityInstance, FindOptions};
use orm_admin_adapter::record::{flatten, unflatten};
use orm_admin_adapter::{
    AdapterError, Direction, Filter, FilterValue, FindParams, MemoryOrm, Orm, OrmError, PropertyType, RecordValue,
    Resource, Session, Violation,
};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use support::{memory_orm, params, resource, seed_cars};

fn names(records: &[orm_admin_adapter::BaseRecord]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.param("name").and_then(RecordValue::to_text))
        .collect()
}

#[tokio::test]
async fn properties_follow_declaration_order_and_skip_collections() {
    let orm = memory_orm();
    let cars = resource(&orm, "Car");
    let paths: Vec<&str> = cars.properties().iter().map(|p| p.path()).collect();
    assert_eq!(paths, vec!["id", "name", "meta", "createdAt", "updatedAt", "owner", "seller"]);
    let positions: Vec<usize> = cars.properties().iter().map(|p| p.position()).collect();
    assert_eq!(positions, vec![0, 1, 2, 3, 4, 5, 6]);

    let users = resource(&orm, "User");
    assert_eq!(users.properties().len(), 3);
    assert!(users.property("cars").is_none());

    let seller = cars.property("seller").unwrap();
    assert_eq!(seller.r#type(), PropertyType::Reference);
    assert_eq!(seller.reference(), Some("Seller"));
    assert_eq!(cars.property("meta").map(|p| p.r#type()), Some(PropertyType::Mixed));
    assert!(cars.property("nope").is_none());
}

#[tokio::test]
async fn names_and_database() {
    let orm = memory_orm();
    let cars = resource(&orm, "Car");
    assert_eq!(cars.name(), "Car");
    assert_eq!(cars.id(), "Car");
    assert_eq!(cars.database_name(), "cars_test");
    assert_eq!(cars.database_type(), "cars_test");
}

#[test]
fn flat_records_survive_a_round_trip() {
    let flat: BTreeMap<String, Value> = [
        ("name", json!("Civic")),
        ("meta.title", json!("Sedan")),
        ("meta.specs.doors", json!(4)),
        ("owner", json!(3)),
        ("createdAt", json!("2024-01-01T00:00:00+00:00")),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    assert_eq!(flatten(&unflatten(&flat)), flat);
}

#[tokio::test]
async fn create_unflattens_nested_params_and_returns_generated_values() {
    let orm = memory_orm();
    let cars = resource(&orm, "Car");
    let created = cars
        .create(params([("name", "Civic".into()), ("meta.title", "Sedan".into())]))
        .await
        .unwrap();
    assert_eq!(created.get("meta.title"), Some(&RecordValue::from("Sedan")));
    assert_eq!(created.get("id"), Some(&RecordValue::from(1_i64)));
    assert!(matches!(created.get("createdAt"), Some(RecordValue::DateTime(_))));

    let rows = orm.rows("Car");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["meta"], json!({ "title": "Sedan" }));
    assert_eq!(rows[0]["owner"], Value::Null);
}

#[tokio::test]
async fn create_without_nested_json_keeps_the_default() {
    let orm = memory_orm();
    let cars = resource(&orm, "Car");
    let created = cars.create(params([("name", "Golf".into())])).await.unwrap();
    assert_eq!(created.get("meta"), Some(&RecordValue::Json(json!({}))));
}

#[tokio::test]
async fn find_sorts_and_pages() {
    let orm = memory_orm();
    let cars = resource(&orm, "Car");
    seed_cars(&cars, &["B", "A", "C"]).await;

    let page = cars
        .find(&Filter::new(), FindParams::default().limit(2).offset(0).sort("name", Direction::Asc))
        .await
        .unwrap();
    assert_eq!(names(&page), vec!["A", "B"]);

    let page = cars
        .find(&Filter::new(), FindParams::default().offset(1).sort("name", Direction::Desc))
        .await
        .unwrap();
    assert_eq!(names(&page), vec!["B", "A"]);

    // unsorted keeps storage order
    let all = cars.find(&Filter::new(), FindParams::default()).await.unwrap();
    assert_eq!(names(&all), vec!["B", "A", "C"]);
}

#[tokio::test]
async fn find_defaults_to_ten_records() {
    let orm = memory_orm();
    let cars = resource(&orm, "Car");
    let many: Vec<String> = (0..12).map(|i| format!("car {}", i)).collect();
    let refs: Vec<&str> = many.iter().map(String::as_str).collect();
    seed_cars(&cars, &refs).await;
    assert_eq!(cars.find(&Filter::new(), FindParams::default()).await.unwrap().len(), 10);
    assert_eq!(cars.count(&Filter::new()).await.unwrap(), 12);
}

#[tokio::test]
async fn records_carry_id_title_and_resource() {
    let orm = memory_orm();
    let cars = resource(&orm, "Car");
    seed_cars(&cars, &["Civic"]).await;
    let records = cars.find(&Filter::new(), FindParams::default()).await.unwrap();
    let record = &records[0];
    assert_eq!(record.id().as_deref(), Some("1"));
    assert_eq!(record.title().as_deref(), Some("Civic"));
    assert_eq!(record.resource_id(), "Car");
    assert!(record.is_valid());
}

#[tokio::test]
async fn filters_translate_per_property_type() {
    let orm = memory_orm();
    let cars = resource(&orm, "Car");
    let users = resource(&orm, "User");
    let owner = users
        .create(params([("firstName", "Ann".into())]))
        .await
        .unwrap()
        .get("id")
        .cloned()
        .unwrap();
    cars.create(params([("name", "Honda Civic".into()), ("owner", owner.clone())])).await.unwrap();
    cars.create(params([("name", "Honda Jazz".into()), ("meta.title", "Hatch".into())])).await.unwrap();
    cars.create(params([("name", "VW Golf".into())])).await.unwrap();

    let by_name = Filter::new().with("name", FilterValue::Single("honda".into()));
    assert_eq!(cars.count(&by_name).await.unwrap(), 2);

    let by_owner = Filter::new().with("owner", FilterValue::Single(owner.to_text().unwrap()));
    let found = cars.find(&by_owner, FindParams::default()).await.unwrap();
    assert_eq!(names(&found), vec!["Honda Civic"]);

    let by_ids = Filter::new().with("id", FilterValue::Many(vec!["1".into(), "3".into()]));
    assert_eq!(cars.count(&by_ids).await.unwrap(), 2);

    let by_json_path = Filter::new().with("meta.title", FilterValue::Single("Hatch".into()));
    assert_eq!(names(&cars.find(&by_json_path, FindParams::default()).await.unwrap()), vec!["Honda Jazz"]);

    let created_range = Filter::new().with(
        "createdAt",
        FilterValue::Range {
            from: Some("2000-01-01T00:00:00Z".into()),
            to: None,
        },
    );
    assert_eq!(cars.count(&created_range).await.unwrap(), 3);
    let future = Filter::new().with(
        "createdAt",
        FilterValue::Range {
            from: Some("2999-01-01T00:00:00Z".into()),
            to: None,
        },
    );
    assert_eq!(cars.count(&future).await.unwrap(), 0);

    let bad_id_range = Filter::from_query(vec![("filters.id~~from", "abc")]);
    assert_eq!(cars.count(&bad_id_range).await.unwrap(), 0);
}

#[tokio::test]
async fn filtering_or_sorting_on_unknown_paths_is_a_query_error() {
    let orm = memory_orm();
    let cars = resource(&orm, "Car");
    let filter = Filter::new().with("colour", FilterValue::Single("red".into()));
    assert!(matches!(cars.count(&filter).await, Err(AdapterError::Query(_))));
    let sorted = cars
        .find(&Filter::new(), FindParams::default().sort("colour", Direction::Asc))
        .await;
    assert!(matches!(sorted, Err(AdapterError::Query(_))));
}

#[tokio::test]
async fn find_one_returns_none_for_missing_ids() {
    let orm = memory_orm();
    let cars = resource(&orm, "Car");
    seed_cars(&cars, &["Civic"]).await;
    assert!(cars.find_one(42).await.unwrap().is_none());
    assert!(cars.find_one("not-a-number").await.unwrap().is_none());
    let found = cars.find_one("1").await.unwrap().unwrap();
    assert_eq!(found.param("name"), Some(&RecordValue::from("Civic")));
}

#[tokio::test]
async fn find_many_uses_one_query_and_skips_empty_input() {
    let orm = memory_orm();
    let cars = resource(&orm, "Car");
    let ids = seed_cars(&cars, &["A", "B", "C"]).await;

    let before = orm.statement_count();
    assert!(cars.find_many(Vec::<RecordValue>::new()).await.unwrap().is_empty());
    assert_eq!(orm.statement_count(), before);

    let found = cars.find_many(vec![ids[0].clone(), ids[2].clone(), RecordValue::from(99_i64)]).await.unwrap();
    assert_eq!(names(&found), vec!["A", "C"]);
    assert_eq!(orm.statement_count(), before + 1);
}

#[tokio::test]
async fn find_many_without_primary_key_does_not_query() {
    let orm = memory_orm();
    let audit = resource(&orm, "AuditEntry");
    let before = orm.statement_count();
    assert!(audit.find_many(vec![1, 2]).await.unwrap().is_empty());
    assert_eq!(orm.statement_count(), before);
}

#[tokio::test]
async fn delete_is_idempotent() {
    let orm = memory_orm();
    let cars = resource(&orm, "Car");
    let ids = seed_cars(&cars, &["Civic", "Golf"]).await;
    cars.delete(ids[0].clone()).await.unwrap();
    cars.delete(ids[0].clone()).await.unwrap();
    cars.delete(12345).await.unwrap();
    assert_eq!(names(&cars.find(&Filter::new(), FindParams::default()).await.unwrap()), vec!["Golf"]);
}

#[tokio::test]
async fn update_merges_params_into_the_stored_record() {
    let orm = memory_orm();
    let cars = resource(&orm, "Car");
    let created = cars
        .create(params([("name", "Civic".into()), ("meta.title", "Sedan".into())]))
        .await
        .unwrap();
    let id = created.get("id").cloned().unwrap();

    let updated = cars
        .update(id.clone(), params([("meta.doors", RecordValue::from(4_i64)), ("bogus", "x".into())]))
        .await
        .unwrap();
    assert_eq!(updated.get("name"), Some(&RecordValue::from("Civic")));
    assert_eq!(updated.get("meta.title"), Some(&RecordValue::from("Sedan")));
    assert_eq!(updated.get("meta.doors"), Some(&RecordValue::from(4_i64)));
    assert!(updated.get("bogus").is_none());
    assert_eq!(orm.rows("Car")[0]["meta"], json!({ "title": "Sedan", "doors": 4 }));
}

#[tokio::test]
async fn update_of_a_missing_record_is_not_found_and_writes_nothing() {
    let orm = memory_orm();
    let cars = resource(&orm, "Car");
    seed_cars(&cars, &["Civic"]).await;
    let err = cars.update(7, params([("name", "Golf".into())])).await.unwrap_err();
    assert!(matches!(err, AdapterError::NotFound(_)));
    assert_eq!(orm.rows("Car").len(), 1);
    assert_eq!(orm.rows("Car")[0]["name"], json!("Civic"));
}

#[tokio::test]
async fn update_keeps_its_target_when_params_carry_another_id() {
    let orm = memory_orm();
    let cars = resource(&orm, "Car");
    let ids = seed_cars(&cars, &["Civic", "Golf"]).await;

    let updated = cars
        .update(ids[0].clone(), params([("id", ids[1].clone()), ("name", "Accord".into())]))
        .await
        .unwrap();
    assert_eq!(updated.get("id"), Some(&ids[0]));
    assert_eq!(updated.get("name"), Some(&RecordValue::from("Accord")));

    let rows = orm.rows("Car");
    assert_eq!(rows.len(), 2);
    assert_eq!((&rows[0]["id"], &rows[0]["name"]), (&json!(1), &json!("Accord")));
    assert_eq!((&rows[1]["id"], &rows[1]["name"]), (&json!(2), &json!("Golf")));
}

#[tokio::test]
async fn hook_violations_report_the_first_constraint_per_field() {
    let orm = memory_orm();
    let hook = |instance: &EntityInstance| -> Vec<Violation> {
        match instance.get("name").and_then(Value::as_str) {
            Some(name) if name.len() >= 3 => Vec::new(),
            _ => vec![Violation::new("name")
                .constraint("minLength", "name must be longer than or equal to 3 characters")
                .constraint("isIn", "name must be one of the following values: Civic")],
        }
    };
    let cars = resource(&orm, "Car").with_validator(Arc::new(hook));
    let err = cars.create(params([("name", "ab".into())])).await.unwrap_err();
    let AdapterError::Validation(errors) = err else {
        panic!("expected validation error, got {:?}", err);
    };
    assert_eq!(errors.len(), 1);
    let name = errors.get("name").unwrap();
    assert_eq!(name.kind, "minLength");
    assert_eq!(name.message, "name must be longer than or equal to 3 characters");
    assert!(orm.rows("Car").is_empty());

    cars.create(params([("name", "Civic".into())])).await.unwrap();
    assert_eq!(orm.rows("Car").len(), 1);
}

#[tokio::test]
async fn storage_validation_failures_are_normalized_by_field() {
    let orm = memory_orm();
    let cars = resource(&orm, "Car");
    let err = cars.create(params([("meta.title", "Sedan".into())])).await.unwrap_err();
    let AdapterError::Validation(errors) = err else {
        panic!("expected validation error, got {:?}", err);
    };
    let name = errors.get("name").unwrap();
    assert_eq!(name.kind, "QueryFailedError");
    assert_eq!(name.message, "Value for Car.name is required, 'undefined' found");
}

#[tokio::test]
async fn unknown_models_fail_data_operations_but_not_reads_by_id_list() {
    let orm = memory_orm();
    let boats = resource(&orm, "Boat");
    assert_eq!(boats.name(), "");
    assert!(matches!(boats.count(&Filter::new()).await, Err(AdapterError::Config(_))));
    assert!(boats.find_many(vec![1]).await.unwrap().is_empty());
}

#[tokio::test]
async fn build_wraps_params_without_storage() {
    let orm = memory_orm();
    let cars = resource(&orm, "Car");
    let record = cars.build(params([
        ("name", "Civic".into()),
        ("owner", "3".into()),
        ("createdAt", "2024-01-01T00:00:00Z".into()),
    ]));
    assert!(matches!(record.param("owner"), Some(RecordValue::Reference(_))));
    assert!(matches!(record.param("createdAt"), Some(RecordValue::DateTime(_))));
    assert_eq!(record.title().as_deref(), Some("Civic"));
    assert_eq!(orm.statement_count(), 0);
}

#[test]
fn adapter_registration() {
    let memory = memory_orm();
    let orm: &dyn Orm = &memory;
    assert!(Resource::is_adapter_for(Some("Car"), Some(orm)));
    assert!(!Resource::is_adapter_for(Some("Boat"), Some(orm)));
    assert!(!Resource::is_adapter_for(Some(""), Some(orm)));
    assert!(!Resource::is_adapter_for(None, Some(orm)));
    assert!(!Resource::is_adapter_for(Some("Car"), None));
}

/// ORM whose flushes fail with a driver error the adapter does not recognize.
struct BrokenStorage {
    inner: MemoryOrm,
}

struct BrokenSession {
    inner: Box<dyn Session>,
}

#[async_trait]
impl Orm for BrokenStorage {
    fn metadata(&self) -> &MetadataStorage {
        self.inner.metadata()
    }

    fn driver_name(&self) -> &'static str {
        "broken"
    }

    fn database_name(&self) -> Option<String> {
        None
    }

    async fn fork(&self) -> Result<Box<dyn Session>, OrmError> {
        Ok(Box::new(BrokenSession {
            inner: self.inner.fork().await?,
        }))
    }
}

#[async_trait]
impl Session for BrokenSession {
    async fn count(&mut self, entity: &EntityMeta, condition: &Condition) -> Result<u64, OrmError> {
        self.inner.count(entity, condition).await
    }

    async fn find(
        &mut self,
        entity: &EntityMeta,
        condition: &Condition,
        options: &FindOptions,
    ) -> Result<Vec<EntityInstance>, OrmError> {
        self.inner.find(entity, condition, options).await
    }

    async fn native_delete(&mut self, entity: &EntityMeta, pk: &Value) -> Result<u64, OrmError> {
        self.inner.native_delete(entity, pk).await
    }

    async fn persist_and_flush(&mut self, _entity: &EntityMeta, _instance: &mut EntityInstance) -> Result<(), OrmError> {
        Err(OrmError::Connection("connection reset by peer".into()))
    }
}

#[tokio::test]
async fn unrecognized_persistence_failures_surface() {
    let orm: Arc<dyn Orm> = Arc::new(BrokenStorage { inner: memory_orm() });
    let cars = Resource::new(orm, "Car");
    let err = cars.create(params([("name", "Civic".into())])).await.unwrap_err();
    assert!(matches!(err, AdapterError::Persistence(ref m) if m.contains("connection reset")));
    assert_eq!(cars.database_name(), "orm");
}

#[tokio::test]
async fn sessions_are_isolated_units_of_work() {
    let orm = memory_orm();
    let meta = Arc::clone(orm.metadata().find("Car").unwrap());
    let mut first = orm.fork().await.unwrap();
    let shape: Map<String, Value> = match json!({ "name": "Civic" }) {
        Value::Object(m) => m,
        _ => Map::new(),
    };
    let instance = first.create(&meta, shape);
    assert!(!instance.is_managed());
    drop(first);
    assert!(orm.rows("Car").is_empty());
}
