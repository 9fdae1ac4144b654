//! Helpers for tests that run against a real `PostgreSQL` (and Redis).
//!
//! Connection settings come from `TEST_DB_*` / `TEST_REDIS_*` environment
//! variables, falling back to the ports of the local docker test stack.

use sea_orm::{ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, DbErr, Statement};
use sea_orm_migration::MigratorTrait;
use tracing::info;

use crate::migrations::Migrator;

/// Tables in dependency order, children first.
const TABLES: &[&str] = &["follow", "comment", "post", "post_group", "user"];

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Test database configuration.
#[derive(Debug, Clone)]
pub struct TestDbConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
}

impl Default for TestDbConfig {
    fn default() -> Self {
        Self {
            host: env_or("TEST_DB_HOST", "localhost"),
            port: std::env::var("TEST_DB_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5433),
            username: env_or("TEST_DB_USER", "quill_test"),
            password: env_or("TEST_DB_PASSWORD", "quill_test"),
            database: env_or("TEST_DB_NAME", "quill_test"),
        }
    }
}

impl TestDbConfig {
    /// URL of the test database.
    #[must_use]
    pub fn database_url(&self) -> String {
        self.url_for(&self.database)
    }

    /// URL of the maintenance database, used to create and drop test databases.
    #[must_use]
    pub fn postgres_url(&self) -> String {
        self.url_for("postgres")
    }

    fn url_for(&self, database: &str) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, database
        )
    }
}

/// A migrated test database.
pub struct TestDatabase {
    pub conn: DatabaseConnection,
    pub config: TestDbConfig,
}

impl TestDatabase {
    /// Connect to the shared test database and bring its schema up to date.
    pub async fn new() -> Result<Self, DbErr> {
        Self::with_config(TestDbConfig::default()).await
    }

    /// Connect with a custom configuration and run migrations.
    pub async fn with_config(config: TestDbConfig) -> Result<Self, DbErr> {
        let conn = Database::connect(&config.database_url()).await?;
        Migrator::up(&conn, None).await?;

        info!(database = %config.database, "Connected to test database");

        Ok(Self { conn, config })
    }

    /// Create a fresh, uniquely named database so tests can run in parallel.
    pub async fn create_unique() -> Result<Self, DbErr> {
        let mut config = TestDbConfig::default();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        config.database = format!("quill_test_{}", &suffix[..8]);

        let admin = Database::connect(&config.postgres_url()).await?;
        admin
            .execute(Statement::from_string(
                DatabaseBackend::Postgres,
                format!("CREATE DATABASE \"{}\"", config.database),
            ))
            .await?;
        admin.close().await?;

        Self::with_config(config).await
    }

    /// Get the database connection.
    #[must_use]
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Remove every row from the application tables.
    pub async fn cleanup(&self) -> Result<(), DbErr> {
        let tables = TABLES
            .iter()
            .map(|t| format!("\"{t}\""))
            .collect::<Vec<_>>()
            .join(", ");

        self.conn
            .execute(Statement::from_string(
                DatabaseBackend::Postgres,
                format!("TRUNCATE TABLE {tables} CASCADE"),
            ))
            .await?;

        info!("Cleaned up test database");
        Ok(())
    }

    /// Drop a database made by [`Self::create_unique`].
    pub async fn drop_database(self) -> Result<(), DbErr> {
        self.conn.close().await?;

        let admin = Database::connect(&self.config.postgres_url()).await?;
        admin
            .execute(Statement::from_string(
                DatabaseBackend::Postgres,
                format!("DROP DATABASE IF EXISTS \"{}\" WITH (FORCE)", self.config.database),
            ))
            .await?;
        admin.close().await?;

        info!(database = %self.config.database, "Dropped test database");
        Ok(())
    }
}

/// Test Redis configuration.
#[derive(Debug, Clone)]
pub struct TestRedisConfig {
    pub host: String,
    pub port: u16,
}

impl Default for TestRedisConfig {
    fn default() -> Self {
        Self {
            host: env_or("TEST_REDIS_HOST", "localhost"),
            port: std::env::var("TEST_REDIS_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(6380),
        }
    }
}

impl TestRedisConfig {
    /// Get the Redis URL.
    #[must_use]
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}", self.host, self.port)
    }
}
