use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::Collection;

use super::{MongoStore, StoreError};
use crate::types::Monitor;

impl MongoStore {
    fn monitors(&self) -> Collection<Monitor> {
        self.database().collection(&self.names().monitor_store_name)
    }

    pub async fn create_monitor(&self, mut monitor: Monitor) -> Result<Monitor, StoreError> {
        let col = self.monitors();
        let res = self.with_timeout(col.insert_one(&monitor)).await?;
        monitor.id = res.inserted_id.as_object_id();
        Ok(monitor)
    }

    pub async fn get_monitor(&self, id: &str) -> Result<Monitor, StoreError> {
        let oid = ObjectId::parse_str(id).map_err(|_| StoreError::BadId(id.to_string()))?;
        let col = self.monitors();
        self.with_timeout(col.find_one(doc! { "_id": oid }))
            .await?
            .ok_or(StoreError::NotFound)
    }

    pub async fn list_monitors(&self) -> Result<Vec<Monitor>, StoreError> {
        let col = self.monitors();
        self.with_timeout(async move { col.find(doc! {}).await?.try_collect().await })
            .await
    }

    pub async fn delete_monitor(&self, id: &str) -> Result<(), StoreError> {
        let oid = ObjectId::parse_str(id).map_err(|_| StoreError::BadId(id.to_string()))?;
        let col = self.monitors();
        self.with_timeout(col.delete_one(doc! { "_id": oid })).await?;
        Ok(())
    }
}
