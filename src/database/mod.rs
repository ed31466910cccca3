// 数据库模块
// 连接池与表结构初始化

mod schema;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

pub use schema::SCHEMA;

/// 打开 SQLite 连接池，数据库文件不存在时自动创建
///
/// 内存数据库只在连接存活期间存在，因此固定为单个永不回收的连接
pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = if database_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?
    };

    tracing::debug!("Connected to {}", database_url);
    Ok(pool)
}

/// 建表（幂等），每次启动时执行
pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::info!("Database schema ready ({} statements)", SCHEMA.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_init_is_idempotent() {
        let pool = connect("sqlite::memory:").await.unwrap();
        init_schema(&pool).await.unwrap();
        init_schema(&pool).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        assert_eq!(tables, vec!["api_keys", "items", "request_log", "users"]);
    }

    #[tokio::test]
    async fn file_database_is_created_on_connect() {
        let dir = std::env::temp_dir().join(format!("crud-walkthrough-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let url = format!("sqlite://{}", dir.join("database.db").display());

        let pool = connect(&url).await.unwrap();
        init_schema(&pool).await.unwrap();
        pool.close().await;

        assert!(dir.join("database.db").exists());
        std::fs::remove_dir_all(&dir).ok();
    }
}
