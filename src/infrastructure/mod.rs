//! Infrastructure layer: adapters and the public facade.
//!
//! - Clock and storage adapters
//! - Eviction policies
//! - Delivery channels (log, webhook, mail)
//! - The [`notifier::Notifier`] facade, the tracing bridge and the resource
//!   monitor

pub mod channels;
pub mod clock;
pub mod eviction;
pub mod layer;
pub mod monitor;
pub mod notifier;
pub mod storage;
pub(crate) mod visitor;

/// Test doubles for clocks, channels and log capture.
///
/// Available in test builds or with the `test-helpers` feature:
/// ```toml
/// [dev-dependencies]
/// notice-throttle = { version = "*", features = ["test-helpers"] }
/// ```
#[cfg(any(test, feature = "test-helpers"))]
pub mod mocks;
