use sea_orm::sea_query::Index;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Schema};
use std::time::Duration;

use crate::models::{generation_status, requirement};

/// Open the connection pool shared by every handler and background task.
pub async fn establish_connection(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(database_url.to_string());
    options
        .max_connections(20)
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(false);

    let db = Database::connect(options).await?;
    ensure_schema(&db).await?;
    Ok(db)
}

/// Create tables and indexes if they do not exist yet.
pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut requirements = schema.create_table_from_entity(requirement::Entity);
    requirements.if_not_exists();
    db.execute(backend.build(&requirements)).await?;

    let mut statuses = schema.create_table_from_entity(generation_status::Entity);
    statuses.if_not_exists();
    db.execute(backend.build(&statuses)).await?;

    // One status record per (requirement, user)
    let unique_key = Index::create()
        .if_not_exists()
        .name("idx_generation_statuses_requirement_user")
        .table(generation_status::Entity)
        .col(generation_status::Column::RequirementId)
        .col(generation_status::Column::UserId)
        .unique()
        .to_owned();
    db.execute(backend.build(&unique_key)).await?;

    let by_owner = Index::create()
        .if_not_exists()
        .name("idx_requirements_user")
        .table(requirement::Entity)
        .col(requirement::Column::UserId)
        .to_owned();
    db.execute(backend.build(&by_owner)).await?;

    Ok(())
}

/// Fresh in-memory database with the production schema.
#[cfg(test)]
pub async fn test_connection() -> DatabaseConnection {
    // A single pooled connection keeps every query on the same in-memory database
    let mut options = ConnectOptions::new("sqlite::memory:".to_string());
    options.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await.expect("in-memory sqlite");
    ensure_schema(&db).await.expect("schema");
    db
}
