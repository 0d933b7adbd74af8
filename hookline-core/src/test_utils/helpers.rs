// File: hookline-core/src/test_utils/helpers.rs

use sqlx::{Connection, PgConnection, Pool, Postgres};
use sqlx::postgres::PgPoolOptions;
use crate::Error;
use crate::db::Database;

/// Create the test database if it does not exist yet.
pub async fn ensure_test_database_exists() -> Result<(), Error> {
    let admin_url = std::env::var("DATABASE_ADMIN_URL")
        .unwrap_or_else(|_| "postgres://hookline@localhost/postgres".to_string());

    let mut conn = PgConnection::connect(&admin_url).await?;
    let test_db = "hookline_test";

    if let Err(e) = sqlx::query(&format!("CREATE DATABASE {test_db};"))
        .execute(&mut conn)
        .await
    {
        // 42P04 => duplicate_database
        let exists = e
            .as_database_error()
            .and_then(|d| d.code())
            .map(|code| code == "42P04")
            .unwrap_or(false);
        if !exists {
            return Err(Error::Database(e));
        }
    }

    Ok(())
}

/// Create a connection pool to the test DB.
/// By default looks for `TEST_DATABASE_URL` in env,
/// else uses `postgres://hookline@localhost/hookline_test`.
pub async fn create_test_db_pool() -> Result<Pool<Postgres>, Error> {
    let url = std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| "postgres://hookline@localhost/hookline_test".to_string());

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await?;

    Ok(pool)
}

/// Wipes out test data so each test can start fresh.
pub async fn clean_database(pool: &Pool<Postgres>) -> Result<(), Error> {
    sqlx::query(r#"
        TRUNCATE TABLE
            messages,
            webhooks,
            sessions
        RESTART IDENTITY CASCADE;
    "#)
        .execute(pool)
        .await?;

    Ok(())
}

/// Returns a migrated, empty test DB handle.
pub async fn setup_test_database() -> Result<Database, Error> {
    ensure_test_database_exists().await?;

    let pool = create_test_db_pool().await?;
    let db = Database::from_pool(pool);
    db.migrate().await?;
    clean_database(db.pool()).await?;

    Ok(db)
}