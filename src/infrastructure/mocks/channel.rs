//! Channel doubles.

use crate::application::ports::{AggregatingChannel, Channel};
use crate::domain::content::{Batch, Notice};
use crate::error::DeliveryError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

/// Channel that remembers everything it was asked to deliver.
///
/// Works as both an immediate and an aggregating channel.
#[derive(Debug, Clone)]
pub struct RecordingChannel {
    name: String,
    notices: Arc<Mutex<Vec<Notice>>>,
    batches: Arc<Mutex<Vec<Batch>>>,
}

impl RecordingChannel {
    /// Create an empty recording channel.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            notices: Arc::new(Mutex::new(Vec::new())),
            batches: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Notices received through [`Channel::notify`].
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    /// Batches received through [`AggregatingChannel::notify_batch`].
    pub fn batches(&self) -> Vec<Batch> {
        self.batches.lock().clone()
    }

    /// Total calls of either kind.
    pub fn calls(&self) -> usize {
        self.notices.lock().len() + self.batches.lock().len()
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn notify(&self, notice: &Notice) -> Result<bool, DeliveryError> {
        self.notices.lock().push(notice.clone());
        Ok(true)
    }
}

#[async_trait]
impl AggregatingChannel for RecordingChannel {
    async fn notify_batch(&self, batch: &Batch) -> Result<bool, DeliveryError> {
        self.batches.lock().push(batch.clone());
        Ok(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    Refuse,
    Error,
    Panic,
}

/// Channel that fails every delivery in a chosen way.
#[derive(Debug, Clone)]
pub struct FailingChannel {
    name: String,
    failure: Failure,
}

impl FailingChannel {
    /// Fails with `Ok(false)`.
    pub fn refusing(name: impl Into<String>) -> Self {
        Self::with(name, Failure::Refuse)
    }

    /// Fails with a transport error.
    pub fn erroring(name: impl Into<String>) -> Self {
        Self::with(name, Failure::Error)
    }

    /// Panics during delivery.
    pub fn panicking(name: impl Into<String>) -> Self {
        Self::with(name, Failure::Panic)
    }

    fn with(name: impl Into<String>, failure: Failure) -> Self {
        Self {
            name: name.into(),
            failure,
        }
    }

    fn fail(&self) -> Result<bool, DeliveryError> {
        match self.failure {
            Failure::Refuse => Ok(false),
            Failure::Error => Err(DeliveryError::Transport(format!(
                "{} is unreachable",
                self.name
            ))),
            Failure::Panic => panic!("{} blew up while delivering", self.name),
        }
    }
}

#[async_trait]
impl Channel for FailingChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn notify(&self, _notice: &Notice) -> Result<bool, DeliveryError> {
        self.fail()
    }
}

#[async_trait]
impl AggregatingChannel for FailingChannel {
    async fn notify_batch(&self, _batch: &Batch) -> Result<bool, DeliveryError> {
        self.fail()
    }
}
