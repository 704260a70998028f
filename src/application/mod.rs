//! Application layer: orchestration of the throttle and delivery pipeline.
//!
//! - Signature registry (per-signature throttle state, bounded)
//! - Channel registry (which channels serve which event kind)
//! - Dispatcher (rendering, buffering, handing deliveries to the pool)
//! - Worker pool and aggregation scheduler
//!
//! ## Ports
//!
//! Traits in [`ports`] are implemented by infrastructure adapters, so this
//! layer never names a concrete clock, map or transport.

pub mod channels;
pub mod dispatcher;
pub mod metrics;
pub mod pool;
pub mod ports;
pub mod registry;
pub mod scheduler;
