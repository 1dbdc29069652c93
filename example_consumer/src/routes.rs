//! JSON admin surface: resource listing and record CRUD over the `Database` resources.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use orm_admin_adapter::record::flatten;
use orm_admin_adapter::{AdapterError, BaseRecord, Database, Filter, FindParams, Params, RecordValue, Resource};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
struct AppState {
    resources: Arc<HashMap<String, Resource>>,
}

impl AppState {
    fn resource(&self, id: &str) -> Result<&Resource, AdapterError> {
        self.resources
            .get(id)
            .ok_or_else(|| AdapterError::NotFound(format!("resource {}", id)))
    }
}

pub fn admin_routes(db: Database) -> Router {
    let resources = db.resources().into_iter().map(|r| (r.id(), r)).collect();
    let state = AppState {
        resources: Arc::new(resources),
    };
    Router::new()
        .route("/health", get(health))
        .route("/resources", get(list_resources))
        .route("/resources/:resource/records", get(list_records).post(create_record))
        .route(
            "/resources/:resource/records/:id",
            get(show_record).put(update_record).delete(delete_record),
        )
        .with_state(state)
}

fn success_one(status: StatusCode, data: Value) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "data": data })))
}

fn record_json(record: &BaseRecord) -> Value {
    record.to_json()
}

/// Request body as a flat record; nested objects are flattened to dot paths.
fn body_params(resource: &Resource, body: Value) -> Result<Params, AdapterError> {
    let Value::Object(object) = body else {
        return Err(AdapterError::Query("body must be a JSON object".into()));
    };
    let flat: Params = flatten(&object)
        .into_iter()
        .map(|(k, v)| (k, RecordValue::from_json(v)))
        .collect();
    Ok(resource.build(flat).into_params())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_resources(State(state): State<AppState>) -> Json<Value> {
    let mut resources: Vec<&Resource> = state.resources.values().collect();
    resources.sort_by_key(|r| r.id());
    let data: Vec<Value> = resources
        .iter()
        .map(|r| {
            json!({
                "id": r.id(),
                "name": r.name(),
                "database": r.database_name(),
                "properties": r.properties(),
            })
        })
        .collect();
    Json(json!({ "data": data, "meta": { "count": data.len() } }))
}

/// `?filters.<path>=..&filters.<path>~~from=..&page=1&perPage=10&sortBy=name&direction=asc`
async fn list_records(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
) -> Result<Json<Value>, AdapterError> {
    let resource = state.resource(&resource)?;
    let filter = Filter::from_query(query.iter().map(|(k, v)| (k.as_str(), v.clone())));
    let lookup: HashMap<&str, &str> = query.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    let per_page = lookup.get("perPage").and_then(|v| v.parse::<u64>().ok()).unwrap_or(10);
    let page = lookup.get("page").and_then(|v| v.parse::<u64>().ok()).unwrap_or(1).max(1);
    let mut params = FindParams::default().limit(per_page).offset((page - 1) * per_page);
    if let Some(sort_by) = lookup.get("sortBy") {
        let direction = lookup
            .get("direction")
            .map(|d| d.parse())
            .transpose()
            .map_err(AdapterError::Query)?
            .unwrap_or_default();
        params = params.sort(sort_by, direction);
    }
    let total = resource.count(&filter).await?;
    let records = resource.find(&filter, params).await?;
    let data: Vec<Value> = records.iter().map(record_json).collect();
    Ok(Json(json!({ "data": data, "meta": { "count": data.len(), "total": total, "page": page, "perPage": per_page } })))
}

async fn show_record(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
) -> Result<(StatusCode, Json<Value>), AdapterError> {
    let resource = state.resource(&resource)?;
    let record = resource
        .find_one(id.as_str())
        .await?
        .ok_or_else(|| AdapterError::NotFound(format!("{} {}", resource.name(), id)))?;
    Ok(success_one(StatusCode::OK, record_json(&record)))
}

async fn create_record(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), AdapterError> {
    let resource = state.resource(&resource)?;
    let params = body_params(resource, body)?;
    let created = resource.create(params).await?;
    Ok(success_one(StatusCode::CREATED, json!(created)))
}

async fn update_record(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), AdapterError> {
    let resource = state.resource(&resource)?;
    let params = body_params(resource, body)?;
    let updated = resource.update(id.as_str(), params).await?;
    Ok(success_one(StatusCode::OK, json!(updated)))
}

async fn delete_record(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
) -> Result<StatusCode, AdapterError> {
    let resource = state.resource(&resource)?;
    resource.delete(id.as_str()).await?;
    Ok(StatusCode::NO_CONTENT)
}
