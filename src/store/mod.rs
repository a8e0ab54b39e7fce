pub mod backend;
pub mod campaign_store;

pub use backend::{FileBackend, MemoryBackend, StorageBackend, StorageError};
pub use campaign_store::{CampaignStore, StoreError, StoreEvent, CAMPAIGNS_KEY};
