//! JSON-file persistence for the pipeline's local state.
//!
//! Three small durable stores, all following the same discipline: read
//! the whole file, mutate in memory, write to a temp file in the same
//! directory, then atomically rename over the original so no reader ever
//! observes a half-written file.

pub mod bookings;
pub mod error;
pub mod pending;
pub mod status_queue;

pub use bookings::BookingStore;
pub use error::StoreError;
pub use pending::{PendingUpload, PendingUploadQueue};
pub use status_queue::{StatusQueue, StatusUpdate};
