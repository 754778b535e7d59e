use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::Collection;

use super::{parse_slice_id, MongoStore, StoreError};
use crate::types::Play;

impl MongoStore {
    fn plays(&self) -> Collection<Play> {
        self.database().collection(&self.names().play_store_name)
    }

    pub async fn create_play(&self, mut play: Play) -> Result<Play, StoreError> {
        let col = self.plays();
        let res = self.with_timeout(col.insert_one(&play)).await?;
        play.id = res.inserted_id.as_object_id();
        Ok(play)
    }

    pub async fn get_play(&self, id: &str) -> Result<Play, StoreError> {
        let oid = ObjectId::parse_str(id).map_err(|_| StoreError::BadId(id.to_string()))?;
        let col = self.plays();
        self.with_timeout(col.find_one(doc! { "_id": oid }))
            .await?
            .ok_or(StoreError::NotFound)
    }

    pub async fn get_play_by_slice_id(&self, slice_id: &str) -> Result<Play, StoreError> {
        // Validate the id shape first so malformed input surfaces as BadId.
        parse_slice_id(slice_id)?;
        let col = self.plays();
        self.with_timeout(col.find_one(doc! { "slice_id": slice_id }))
            .await?
            .ok_or(StoreError::NotFound)
    }

    pub async fn list_plays(&self) -> Result<Vec<Play>, StoreError> {
        let col = self.plays();
        self.with_timeout(async move { col.find(doc! {}).await?.try_collect().await })
            .await
    }

    pub async fn update_play(&self, play: Play) -> Result<Play, StoreError> {
        let id = play
            .id
            .ok_or_else(|| StoreError::BadId("play without id".to_string()))?;
        let col = self.plays();
        let res = self
            .with_timeout(col.replace_one(doc! { "_id": id }, &play))
            .await?;
        if res.matched_count == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(play)
    }

    pub async fn delete_play(&self, id: &str) -> Result<(), StoreError> {
        let oid = ObjectId::parse_str(id).map_err(|_| StoreError::BadId(id.to_string()))?;
        let col = self.plays();
        self.with_timeout(col.delete_one(doc! { "_id": oid })).await?;
        Ok(())
    }
}
