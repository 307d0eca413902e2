pub mod error;
pub mod record;
pub mod store;

pub use error::StorageError;
pub use record::{Record, Subscriber};
pub use store::RecordStore;
