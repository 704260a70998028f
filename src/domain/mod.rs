//! Domain layer: notice events, signatures, the throttle window and rendered
//! content.
//!
//! Nothing here touches threads, I/O or a runtime, so every rule can be
//! tested with plain values.

pub mod content;
pub mod event;
pub mod signature;
pub mod throttle;
