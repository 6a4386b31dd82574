mod feeds;
mod gateway;
mod items;
mod schema;
mod types;

pub use gateway::FeedStore;
pub use schema::Database;
pub use types::{DatabaseError, FeedRecord, FeedStatus, StoredItem};
