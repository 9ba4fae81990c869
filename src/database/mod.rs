pub mod manager;
pub mod memory;
pub mod object_id;
pub mod postgres;
pub mod store;

pub use manager::{Collection, DatabaseError, DatabaseManager, SharedStore};
pub use memory::MemoryDocumentStore;
pub use object_id::{ObjectId, ObjectIdError};
pub use postgres::PgDocumentStore;
pub use store::{DocumentStore, SearchCondition, SearchQuery, StoreError};
