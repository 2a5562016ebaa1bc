use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema,
};

use crate::error::AppResult;

pub mod prelude {
    pub use entity::{classification, correction, prelude::*, run};
    pub use sea_orm::{
        ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
        PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
    };
}

/// Open (creating if needed) the sqlite store at `path`.
pub async fn connect(path: &str) -> AppResult<DatabaseConnection> {
    let url = if path == ":memory:" {
        "sqlite::memory:".to_string()
    } else {
        format!("sqlite://{}?mode=rwc", path)
    };
    let mut db_options = ConnectOptions::new(url);
    db_options.sqlx_logging(false).max_connections(1);

    let conn = Database::connect(db_options).await?;
    if path != ":memory:" {
        conn.execute_unprepared("PRAGMA journal_mode=WAL;").await?;
    }
    conn.execute_unprepared("PRAGMA busy_timeout=5000;").await?;
    ensure_schema(&conn).await?;

    tracing::info!("Connected to run store at {}", path);
    Ok(conn)
}

async fn create_table<E: EntityTrait>(conn: &DatabaseConnection, entity: E) -> AppResult<()> {
    let backend = conn.get_database_backend();
    let schema = Schema::new(backend);
    let mut stmt = schema.create_table_from_entity(entity);
    stmt.if_not_exists();
    conn.execute(backend.build(&stmt)).await?;
    Ok(())
}

/// Create the run, classification and correction tables if they are missing
pub async fn ensure_schema(conn: &DatabaseConnection) -> AppResult<()> {
    create_table(conn, entity::run::Entity).await?;
    create_table(conn, entity::classification::Entity).await?;
    create_table(conn, entity::correction::Entity).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use prelude::*;

    #[tokio::test]
    async fn test_connect_in_memory_creates_schema() {
        let conn = connect(":memory:").await.unwrap();
        assert_eq!(Run::find().count(&conn).await.unwrap(), 0);
        assert_eq!(Classification::find().count(&conn).await.unwrap(), 0);
        assert_eq!(Correction::find().count(&conn).await.unwrap(), 0);

        // idempotent
        ensure_schema(&conn).await.unwrap();
    }
}
