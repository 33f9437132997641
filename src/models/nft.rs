use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// NFT data submitted for fraud analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NftInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub image_url: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub creator: Option<String>,
}

impl NftInput {
    /// Rejects inputs the pipeline cannot meaningfully score.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title must not be empty".to_string());
        }
        if self.image_url.trim().is_empty() {
            return Err("image_url must not be empty".to_string());
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(format!("price must be a non-negative number, got {}", self.price));
        }
        Ok(())
    }

    pub fn metadata(&self) -> NftMetadata<'_> {
        NftMetadata {
            title: &self.title,
            description: &self.description,
            category: &self.category,
            creator: self.creator.as_deref().unwrap_or("unknown"),
        }
    }
}

/// Borrowed view of the textual metadata shown to the vision model.
#[derive(Debug, Clone, Copy)]
pub struct NftMetadata<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub category: &'a str,
    pub creator: &'a str,
}

/// Denormalized metadata kept alongside a stored embedding.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoredNftMetadata {
    pub name: String,
    pub creator: Option<String>,
    pub image_url: String,
}

/// A persisted NFT as read back from the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct NftRecord {
    pub id: Uuid,
    pub creator_wallet_address: String,
    pub owner_wallet_address: String,
    pub title: String,
    pub description: Option<String>,
    pub image_url: String,
    pub category: Option<String>,
    pub initial_price: Option<f64>,
}

impl NftRecord {
    pub fn to_input(&self) -> NftInput {
        NftInput {
            title: self.title.clone(),
            description: self.description.clone().unwrap_or_default(),
            image_url: self.image_url.clone(),
            category: self.category.clone().unwrap_or_default(),
            price: self.initial_price.unwrap_or(0.0),
            creator: Some(self.creator_wallet_address.clone()),
        }
    }
}

/// Request body for creating a new NFT record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNft {
    pub creator_wallet_address: String,
    #[serde(default)]
    pub owner_wallet_address: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub image_url: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub price: f64,
}

impl NewNft {
    pub fn to_input(&self) -> NftInput {
        NftInput {
            title: self.title.clone(),
            description: self.description.clone(),
            image_url: self.image_url.clone(),
            category: self.category.clone(),
            price: self.price,
            creator: Some(self.creator_wallet_address.clone()),
        }
    }

    pub fn into_record(self, id: Uuid) -> NftRecord {
        NftRecord {
            id,
            owner_wallet_address: self
                .owner_wallet_address
                .unwrap_or_else(|| self.creator_wallet_address.clone()),
            creator_wallet_address: self.creator_wallet_address,
            title: self.title,
            description: Some(self.description),
            image_url: self.image_url,
            category: Some(self.category),
            initial_price: Some(self.price),
        }
    }
}
