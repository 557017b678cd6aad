//! Video finishing & delivery worker.
//!
//! The outer polling loop that turns a `.done` raw recording into an
//! uploaded, database-recorded, locally-evicted artifact. Crash safety
//! comes entirely from the marker-file protocol in
//! [`courtcam_core::markers`]; offline resilience from the durable
//! pending-upload queue in [`courtcam_store`].

pub mod cleanup;
pub mod config;
pub mod delivery;
pub mod overlay;
pub mod process;
pub mod scan;

pub use config::WorkerConfig;
pub use delivery::{Delivery, S3Delivery};
pub use process::Worker;
