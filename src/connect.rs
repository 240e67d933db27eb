//! Connection establishment.
//!
//! The engine behind a database URL is resolved exactly once, here; all
//! later engine-specific behavior goes through the
//! [`ReplicationDatabase`](crate::database::ReplicationDatabase)
//! implementation this module hands back.

use crate::config::ReplicationConfig;
use crate::database::ReplicationDatabase;
use crate::mysql::MysqlDatabase;
use crate::postgresql::PostgresDatabase;
use crate::session::Session;
use anyhow::{anyhow, Result};
use std::sync::Arc;

/// Connect to a database by URL. `postgres://`/`postgresql://` URLs yield
/// a PostgreSQL backend, `mysql://` a MySQL backend.
pub async fn connect_database(url: &str) -> Result<Arc<dyn ReplicationDatabase>> {
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        Ok(Arc::new(PostgresDatabase::connect(url).await?))
    } else if url.starts_with("mysql://") {
        Ok(Arc::new(MysqlDatabase::connect(url)?))
    } else {
        Err(anyhow!("unsupported database URL: {url}"))
    }
}

/// Connect both sides and build a session. The two databases may run
/// different engines.
pub async fn connect_session(
    left_url: &str,
    right_url: &str,
    config: ReplicationConfig,
) -> Result<Session> {
    let left = connect_database(left_url).await?;
    let right = connect_database(right_url).await?;
    Session::new(left, right, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_unknown_url_scheme() {
        let err = connect_database("sqlite://some.db").await.err().unwrap();
        assert!(err.to_string().contains("unsupported database URL"));
    }
}
