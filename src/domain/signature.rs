//! Signature keys for alert deduplication.
//!
//! A signature identifies a class of notices: `scene:unique_code`, falling back
//! to `scene:message` when the event has no unique code. Notices that share a
//! signature share one throttle state.

use crate::domain::event::NoticeEvent;
use ahash::AHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// The deduplication key of a notice.
///
/// Cheap to clone; the text is shared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignatureKey(Arc<str>);

impl SignatureKey {
    /// Build a key from its parts.
    ///
    /// `unique_code` wins over `message` whenever it is present, even if empty.
    pub fn new(scene: &str, unique_code: Option<&str>, message: &str) -> Self {
        let discriminator = unique_code.unwrap_or(message);
        SignatureKey(Arc::from(format!("{scene}:{discriminator}")))
    }

    /// Key of an event.
    pub fn from_event(event: &NoticeEvent) -> Self {
        Self::new(event.scene(), event.unique_code(), event.message())
    }

    /// The key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short stable hash of the key for log fields.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = AHasher::default();
        self.0.hash(&mut hasher);
        hasher.finish()
    }
}

impl fmt::Display for SignatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
