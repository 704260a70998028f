//! Eviction policy adapters bounding the signature registry.

pub mod lru;

pub use lru::LruEviction;
