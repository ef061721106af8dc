pub mod indexer;
pub mod lifecycle;
pub mod river;
pub mod serialize;
pub mod sync;

pub use indexer::{DocumentIndexer, IndexEvent, RemoveOutcome, RetryPolicy};
pub use lifecycle::{clear_type, ensure_index, recreate_index};
pub use serialize::{serialize, serialize_record};
pub use sync::{PageOutcome, SyncReport, Synchronizer, DEFAULT_PAGE_SIZE};
