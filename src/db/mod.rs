pub mod memory;
pub mod nft_store;
pub mod pool;
pub mod vector_search;

pub use memory::InMemoryNftStore;
pub use nft_store::{AnalysisWriteback, NftRecordStore, PgNftStore};
pub use vector_search::{Neighbor, PgVectorStore, VectorStore};
