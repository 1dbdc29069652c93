mod support;

use orm_admin_adapter::{AdapterError, Database, Filter, FindParams, Orm, RuleValidator, ValidationRule};
use std::sync::Arc;
use support::{memory_orm, params};

#[tokio::test]
async fn builds_one_resource_per_entity() {
    let orm: Arc<dyn Orm> = Arc::new(memory_orm());
    let db = Database::new(orm);
    let names: Vec<String> = db.resources().iter().map(|r| r.name()).collect();
    assert_eq!(names, vec!["User", "Seller", "Car", "AuditEntry"]);
    assert_eq!(db.name(), "cars_test");
    assert!(db.resource("Car").is_some());
    assert!(db.resource("Boat").is_none());
}

#[tokio::test]
async fn resources_share_storage_and_the_validator() {
    let memory = memory_orm();
    let orm: Arc<dyn Orm> = Arc::new(memory.clone());
    let validator = RuleValidator::new().rule("Seller", "name", ValidationRule::required().min_length(2));
    let db = Database::new(orm).with_validator(Arc::new(validator));
    let sellers = db.resource("Seller").unwrap();

    let err = sellers.create(params([("name", "X".into())])).await.unwrap_err();
    let AdapterError::Validation(errors) = err else {
        panic!("expected validation error, got {:?}", err);
    };
    assert_eq!(errors.get("name").map(|e| e.kind.as_str()), Some("minLength"));

    let created = sellers.create(params([("name", "Dealer".into())])).await.unwrap();
    let id = created.get("id").and_then(|v| v.to_text()).unwrap();
    assert!(uuid::Uuid::parse_str(&id).is_ok());

    let again = db.resource("Seller").unwrap();
    assert_eq!(again.count(&Filter::new()).await.unwrap(), 1);
    let found = again.find_one(id.as_str()).await.unwrap().unwrap();
    assert_eq!(found.title().as_deref(), Some("Dealer"));
    assert_eq!(memory.rows("Seller").len(), 1);
    assert_eq!(again.find(&Filter::new(), FindParams::default()).await.unwrap().len(), 1);
}

#[test]
fn adapter_registration() {
    let memory = memory_orm();
    assert!(Database::is_adapter_for(Some(&memory as &dyn Orm)));
    assert!(!Database::is_adapter_for(None));
}
