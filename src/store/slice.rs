use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::Collection;

use super::{parse_slice_id, MongoStore, StoreError};
use crate::types::SliceRecord;

impl MongoStore {
    fn slices(&self) -> Collection<SliceRecord> {
        self.database().collection(&self.names().slice_store_name)
    }

    pub async fn create_slice(&self, mut record: SliceRecord) -> Result<SliceRecord, StoreError> {
        let col = self.slices();
        let res = self.with_timeout(col.insert_one(&record)).await?;
        record.id = res.inserted_id.as_object_id();
        Ok(record)
    }

    pub async fn get_slice(&self, id: &str) -> Result<SliceRecord, StoreError> {
        let oid = ObjectId::parse_str(id).map_err(|_| StoreError::BadId(id.to_string()))?;
        let col = self.slices();
        self.with_timeout(col.find_one(doc! { "_id": oid }))
            .await?
            .ok_or(StoreError::NotFound)
    }

    pub async fn get_slice_by_slice_id(&self, slice_id: &str) -> Result<SliceRecord, StoreError> {
        let (sst, sd) = parse_slice_id(slice_id)?;
        let col = self.slices();
        self.with_timeout(col.find_one(doc! { "slice.sst": sst, "slice.sd": sd }))
            .await?
            .ok_or(StoreError::NotFound)
    }

    pub async fn list_slices(&self) -> Result<Vec<SliceRecord>, StoreError> {
        let col = self.slices();
        self.with_timeout(async move { col.find(doc! {}).await?.try_collect().await })
            .await
    }

    pub async fn delete_slice(&self, id: &str) -> Result<(), StoreError> {
        let oid = ObjectId::parse_str(id).map_err(|_| StoreError::BadId(id.to_string()))?;
        let col = self.slices();
        self.with_timeout(col.delete_one(doc! { "_id": oid })).await?;
        Ok(())
    }
}
