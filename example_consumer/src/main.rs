//! Example consumer: serves the User / Car / Seller entities through orm-admin-adapter resources.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Entities come from `entities.json`, or the file named by `ENTITIES_PATH`.

mod routes;

use orm_admin_adapter::{
    ensure_database_exists, ensure_tables, load_from_json, load_from_path, Database, Orm, PgOrm, PgOrmConfig,
};
use std::sync::Arc;
use tokio::net::TcpListener;

const DEFAULT_ENTITIES: &str = include_str!("../entities.json");

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("orm_admin_adapter=info,example_consumer=info")),
        )
        .init();

    let metadata = match std::env::var("ENTITIES_PATH") {
        Ok(path) => load_from_path(&path).await?,
        Err(_) => load_from_json(DEFAULT_ENTITIES)?,
    };

    let config = PgOrmConfig::from_env();
    ensure_database_exists(&config.database_url).await?;
    let orm = PgOrm::connect(&config, metadata).await?;
    ensure_tables(orm.pool(), orm.schema(), orm.metadata()).await?;

    let db = Database::new(Arc::new(orm));
    tracing::info!(database = %db.name(), resources = db.resources().len(), "resources registered");

    let app = routes::admin_routes(db);
    let listener = TcpListener::bind("127.0.0.1:3000").await?;
    let port = listener.local_addr()?.port();
    tracing::info!("Example consumer listening on http://127.0.0.1:{}", port);
    axum::serve(listener, app).await?;
    Ok(())
}
