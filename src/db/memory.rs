use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    db::{
        nft_store::{AnalysisWriteback, NftRecordStore},
        vector_search::{Neighbor, VectorStore},
    },
    embedding::cosine_distance,
    error::StoreError,
    models::{NftRecord, StoredNftMetadata},
};

#[derive(Debug, Clone)]
struct Entry {
    record: NftRecord,
    embedding: Option<Vec<f32>>,
    analysis: Option<serde_json::Value>,
}

/// Process-local NFT table used when no `DATABASE_URL` is configured, and in tests.
#[derive(Debug, Default)]
pub struct InMemoryNftStore {
    entries: RwLock<HashMap<Uuid, Entry>>,
}

impl InMemoryNftStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn embedding_of(&self, id: Uuid) -> Option<Vec<f32>> {
        self.entries
            .read()
            .await
            .get(&id)
            .and_then(|entry| entry.embedding.clone())
    }
}

#[async_trait]
impl NftRecordStore for InMemoryNftStore {
    async fn fetch_nft(&self, id: Uuid) -> Result<Option<NftRecord>, StoreError> {
        Ok(self.entries.read().await.get(&id).map(|e| e.record.clone()))
    }

    async fn insert_nft(&self, record: &NftRecord) -> Result<(), StoreError> {
        self.entries.write().await.insert(
            record.id,
            Entry {
                record: record.clone(),
                embedding: None,
                analysis: None,
            },
        );
        Ok(())
    }

    async fn save_analysis(&self, id: Uuid, writeback: &AnalysisWriteback) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        entry.analysis = Some(writeback.analysis_details.clone());
        if let Some(embedding) = &writeback.embedding {
            entry.embedding = Some(embedding.clone());
        }
        Ok(())
    }

    async fn load_analysis(&self, id: Uuid) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self
            .entries
            .read()
            .await
            .get(&id)
            .and_then(|e| e.analysis.clone()))
    }
}

#[async_trait]
impl VectorStore for InMemoryNftStore {
    async fn upsert(
        &self,
        id: Uuid,
        embedding: &[f32],
        metadata: &StoredNftMetadata,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(id).or_insert_with(|| {
            let creator = metadata.creator.clone().unwrap_or_else(|| "unknown".to_string());
            Entry {
                record: NftRecord {
                    id,
                    owner_wallet_address: creator.clone(),
                    creator_wallet_address: creator,
                    title: metadata.name.clone(),
                    description: None,
                    image_url: metadata.image_url.clone(),
                    category: None,
                    initial_price: None,
                },
                embedding: None,
                analysis: None,
            }
        });
        entry.embedding = Some(embedding.to_vec());
        Ok(())
    }

    async fn nearest(
        &self,
        embedding: &[f32],
        limit: usize,
        exclude: Option<Uuid>,
    ) -> Result<Vec<Neighbor>, StoreError> {
        let entries = self.entries.read().await;
        let mut neighbors: Vec<Neighbor> = entries
            .values()
            .filter(|e| Some(e.record.id) != exclude)
            .filter_map(|e| {
                let stored = e.embedding.as_ref()?;
                Some(Neighbor {
                    id: e.record.id,
                    title: e.record.title.clone(),
                    creator: Some(e.record.creator_wallet_address.clone()),
                    image_url: e.record.image_url.clone(),
                    distance: cosine_distance(embedding, stored),
                })
            })
            .collect();

        neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        neighbors.truncate(limit);
        Ok(neighbors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str) -> StoredNftMetadata {
        StoredNftMetadata {
            name: name.to_string(),
            creator: Some("0xabc".to_string()),
            image_url: format!("https://img.example/{name}.png"),
        }
    }

    #[tokio::test]
    async fn nearest_orders_by_distance_and_honours_exclude() {
        let store = InMemoryNftStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        store.upsert(a, &[1.0, 0.0], &meta("a")).await.unwrap();
        store.upsert(b, &[0.0, 1.0], &meta("b")).await.unwrap();
        store.upsert(c, &[0.9, 0.1], &meta("c")).await.unwrap();

        let hits = store.nearest(&[1.0, 0.0], 10, None).await.unwrap();
        assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![a, c, b]);
        assert!(hits[0].distance.abs() < 1e-9);

        let hits = store.nearest(&[1.0, 0.0], 1, Some(a)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, c);
    }

    #[tokio::test]
    async fn save_analysis_requires_existing_record() {
        let store = InMemoryNftStore::new();
        let writeback = AnalysisWriteback {
            analysis_details: serde_json::json!({"status": "completed"}),
            embedding: Some(vec![1.0, 0.0]),
        };
        let missing = Uuid::new_v4();
        assert!(matches!(
            store.save_analysis(missing, &writeback).await,
            Err(StoreError::NotFound(id)) if id == missing
        ));

        let id = Uuid::new_v4();
        store.upsert(id, &[0.0, 1.0], &meta("x")).await.unwrap();
        store.save_analysis(id, &writeback).await.unwrap();
        assert_eq!(store.embedding_of(id).await, Some(vec![1.0, 0.0]));
        assert_eq!(
            store.load_analysis(id).await.unwrap().unwrap()["status"],
            "completed"
        );
    }

    #[tokio::test]
    async fn records_without_embeddings_are_not_neighbors() {
        let store = InMemoryNftStore::new();
        let record = NftRecord {
            id: Uuid::new_v4(),
            creator_wallet_address: "0x1".into(),
            owner_wallet_address: "0x1".into(),
            title: "Plain".into(),
            description: None,
            image_url: "https://img.example/plain.png".into(),
            category: None,
            initial_price: Some(1.0),
        };
        store.insert_nft(&record).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert!(store.nearest(&[1.0], 5, None).await.unwrap().is_empty());
        assert_eq!(store.fetch_nft(record.id).await.unwrap(), Some(record));
    }
}
