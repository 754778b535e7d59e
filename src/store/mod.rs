use std::future::IntoFuture;
use std::time::Duration;

use mongodb::options::ClientOptions;
use mongodb::{bson::doc, Client, Database};

use crate::config::{MongoConfig, ServerConfig};

mod kube;
mod monitor;
mod play;
mod sla;
mod slice;

pub use kube::ManifestRecord;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("invalid id {0:?}")]
    BadId(String),
    #[error("store operation timed out")]
    Timeout,
    #[error(transparent)]
    Database(#[from] mongodb::error::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}

/// Persistent record of slices, plays, SLAs, monitors and rendered manifests.
/// Every operation is bounded by the configured per-call timeout.
pub struct MongoStore {
    db: Database,
    names: ServerConfig,
    timeout: Duration,
}

impl MongoStore {
    pub async fn connect(config: &MongoConfig, names: ServerConfig) -> anyhow::Result<Self> {
        let mut options = ClientOptions::parse(&config.uri).await?;
        options.server_selection_timeout = Some(config.timeout);
        options.max_pool_size = Some(10);

        let client = Client::with_options(options)?;
        let db = client.database(&config.db_name);

        // Verify the connection before handing the store out.
        tokio::time::timeout(config.timeout, db.run_command(doc! { "ping": 1 }))
            .await
            .map_err(|_| anyhow::anyhow!("mongodb ping timed out"))??;

        tracing::info!(db = %config.db_name, "connected to MongoDB");

        Ok(Self {
            db,
            names,
            timeout: config.timeout,
        })
    }

    pub(crate) fn database(&self) -> &Database {
        &self.db
    }

    /// Handle for components that keep their own collections (IPAM pools).
    pub fn mongo_database(&self) -> Database {
        self.db.clone()
    }

    pub(crate) fn names(&self) -> &ServerConfig {
        &self.names
    }

    /// Bounds a driver call by the store timeout. Accepts the driver's
    /// lazy action types as well as plain futures.
    async fn with_timeout<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: IntoFuture<Output = Result<T, mongodb::error::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut.into_future()).await {
            Ok(res) => Ok(res?),
            Err(_) => Err(StoreError::Timeout),
        }
    }
}

/// Decomposes a `"{sst}-{sd}"` slice id. Malformed or empty input is BadId.
pub fn parse_slice_id(slice_id: &str) -> Result<(i32, String), StoreError> {
    let (sst, sd) = slice_id
        .split_once('-')
        .ok_or_else(|| StoreError::BadId(slice_id.to_string()))?;
    let sst: i32 = sst
        .parse()
        .map_err(|_| StoreError::BadId(slice_id.to_string()))?;
    if sd.is_empty() {
        return Err(StoreError::BadId(slice_id.to_string()));
    }
    Ok((sst, sd.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_slice_id_valid() {
        assert_eq!(parse_slice_id("1-000001").unwrap(), (1, "000001".to_string()));
        assert_eq!(parse_slice_id("4-aB").unwrap(), (4, "aB".to_string()));
    }

    #[test]
    fn test_parse_slice_id_empty_is_bad_id() {
        assert!(matches!(parse_slice_id(""), Err(StoreError::BadId(_))));
    }

    #[test]
    fn test_parse_slice_id_malformed() {
        assert!(matches!(parse_slice_id("1000001"), Err(StoreError::BadId(_))));
        assert!(matches!(parse_slice_id("x-1"), Err(StoreError::BadId(_))));
        assert!(matches!(parse_slice_id("1-"), Err(StoreError::BadId(_))));
    }
}
