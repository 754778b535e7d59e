use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::Collection;

use super::{parse_slice_id, MongoStore, StoreError};
use crate::types::Sla;

impl MongoStore {
    fn slas(&self) -> Collection<Sla> {
        self.database().collection(&self.names().sla_store_name)
    }

    pub async fn create_sla(&self, mut sla: Sla) -> Result<Sla, StoreError> {
        let col = self.slas();
        let res = self.with_timeout(col.insert_one(&sla)).await?;
        sla.id = res.inserted_id.as_object_id();
        Ok(sla)
    }

    pub async fn get_sla(&self, id: &str) -> Result<Sla, StoreError> {
        let oid = ObjectId::parse_str(id).map_err(|_| StoreError::BadId(id.to_string()))?;
        let col = self.slas();
        self.with_timeout(col.find_one(doc! { "_id": oid }))
            .await?
            .ok_or(StoreError::NotFound)
    }

    pub async fn get_sla_by_slice_id(&self, slice_id: &str) -> Result<Sla, StoreError> {
        parse_slice_id(slice_id)?;
        let col = self.slas();
        self.with_timeout(col.find_one(doc! { "slice_id": slice_id }))
            .await?
            .ok_or(StoreError::NotFound)
    }

    pub async fn list_slas(&self) -> Result<Vec<Sla>, StoreError> {
        let col = self.slas();
        self.with_timeout(async move { col.find(doc! {}).await?.try_collect().await })
            .await
    }

    pub async fn update_sla(&self, sla: Sla) -> Result<Sla, StoreError> {
        let id = sla
            .id
            .ok_or_else(|| StoreError::BadId("sla without id".to_string()))?;
        let col = self.slas();
        let res = self
            .with_timeout(col.replace_one(doc! { "_id": id }, &sla))
            .await?;
        if res.matched_count == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(sla)
    }

    pub async fn delete_sla(&self, id: &str) -> Result<(), StoreError> {
        let oid = ObjectId::parse_str(id).map_err(|_| StoreError::BadId(id.to_string()))?;
        let col = self.slas();
        self.with_timeout(col.delete_one(doc! { "_id": oid })).await?;
        Ok(())
    }
}
