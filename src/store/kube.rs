use mongodb::bson::{doc, oid::ObjectId};
use mongodb::Collection;
use serde::{Deserialize, Serialize};

use super::{MongoStore, StoreError};

/// The rendered manifests of a live slice, kept so deletion can tear down
/// exactly what was applied even if rendering inputs changed since.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub slice_id: String,
    pub manifests: Vec<String>,
}

impl MongoStore {
    fn manifests(&self) -> Collection<ManifestRecord> {
        self.database().collection(&self.names().kube_store_name)
    }

    pub async fn create_manifests(
        &self,
        slice_id: &str,
        manifests: Vec<String>,
    ) -> Result<ManifestRecord, StoreError> {
        let mut record = ManifestRecord {
            id: None,
            slice_id: slice_id.to_string(),
            manifests,
        };
        let col = self.manifests();
        let res = self.with_timeout(col.insert_one(&record)).await?;
        record.id = res.inserted_id.as_object_id();
        Ok(record)
    }

    pub async fn get_manifests_by_slice_id(
        &self,
        slice_id: &str,
    ) -> Result<ManifestRecord, StoreError> {
        let col = self.manifests();
        self.with_timeout(col.find_one(doc! { "slice_id": slice_id }))
            .await?
            .ok_or(StoreError::NotFound)
    }

    pub async fn delete_manifests_by_slice_id(&self, slice_id: &str) -> Result<(), StoreError> {
        let col = self.manifests();
        self.with_timeout(col.delete_many(doc! { "slice_id": slice_id }))
            .await?;
        Ok(())
    }
}
