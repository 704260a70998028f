//! Basic usage: throttle repeated alerts, fan out to a log channel and a
//! buffered "mail" channel, and bridge tracing errors.
//!
//! Run with: `cargo run --example basic`

use async_trait::async_trait;
use notice_throttle::{
    AggregatingChannel, AppContext, Batch, Channel, DeliveryError, ErrorNoticeLayer, EventKind,
    LogChannel, Notice, NoticeEvent, Notifier,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Prints what a mail channel would send.
struct StdoutMail;

#[async_trait]
impl Channel for StdoutMail {
    fn name(&self) -> &str {
        "stdout-mail"
    }

    async fn notify(&self, notice: &Notice) -> Result<bool, DeliveryError> {
        println!("--- mail ---\n{}", notice.content());
        Ok(true)
    }
}

#[async_trait]
impl AggregatingChannel for StdoutMail {
    async fn notify_batch(&self, batch: &Batch) -> Result<bool, DeliveryError> {
        println!("--- mail ({} notices) ---\n{}", batch.len(), batch.content());
        Ok(true)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let notifier = Notifier::builder()
        .with_interval(Duration::from_secs(60))
        .with_threshold(3)
        .with_aggregation_interval(Duration::from_secs(2))
        .with_context(AppContext::new("demo", ["local"]))
        .with_channel(EventKind::Notice, Arc::new(LogChannel::new()))
        .with_aggregating_channel(EventKind::Notice, Arc::new(StdoutMail))
        .build()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(ErrorNoticeLayer::new(notifier.clone()))
        .init();

    // Ten identical timeouts: the first notifies, then every third.
    for _ in 0..10 {
        notifier.submit(NoticeEvent::slow_third_party_request(
            "https://pay.example.com/charge",
            Duration::from_millis(4200),
            &["amount=42"],
            "504 Gateway Timeout",
        ));
    }

    let err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "db unreachable");
    notifier.submit(NoticeEvent::exception("orders::repository::load", &err));

    tracing::error!(order_id = 7, "payment capture failed");

    tokio::time::sleep(Duration::from_secs(3)).await;

    let snapshot = notifier.metrics().snapshot();
    println!(
        "submitted={} notified={} suppressed={} delivered={}",
        snapshot.events_submitted,
        snapshot.events_notified,
        snapshot.events_suppressed,
        snapshot.deliveries_succeeded
    );

    notifier.shutdown().await?;
    Ok(())
}
