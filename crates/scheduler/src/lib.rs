//! Booking-driven recording scheduler.
//!
//! One scheduler instance owns this appliance's cameras and drives them
//! through Idle → Recording → Finalizing against the booking cache. All
//! coordination with the worker happens through marker files; remote
//! status updates are best-effort and never block recording.

pub mod config;
pub mod runner;
pub mod state;

pub use config::SchedulerConfig;
pub use runner::Scheduler;
