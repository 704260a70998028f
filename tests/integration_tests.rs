//! End-to-end tests: configuration, profiles, the tracing bridge and the
//! resource monitor.

use notice_throttle::infrastructure::mocks::{FailingChannel, MockCaptureLayer, RecordingChannel};
use notice_throttle::{
    AppContext, ErrorNoticeLayer, EventKind, NoticeConfig, NoticeEvent, Notifier, ResourceMonitor,
    ResourceSample, ResourceScope, SCENE_EXCEPTION, SCENE_SLOW_SQL, SCENE_SYSTEM_RESOURCE,
};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;

#[tokio::test]
async fn test_ignored_profile_mutes_submissions() {
    let channel = Arc::new(RecordingChannel::new("chat"));
    let notifier = Notifier::builder()
        .with_context(AppContext::new("orders", ["dev", "local"]))
        .with_ignored_profiles(["dev", "test"])
        .with_channel(EventKind::Notice, channel.clone())
        .build()
        .unwrap();

    assert!(notifier.is_muted());
    notifier.submit(NoticeEvent::new("orders").with_unique_code("a"));
    notifier.shutdown().await.unwrap();

    assert!(channel.notices().is_empty());
    assert_eq!(notifier.signature_count(), 0);
    let snapshot = notifier.metrics().snapshot();
    assert_eq!(snapshot.events_submitted, 1);
    assert_eq!(snapshot.events_ignored, 1);
    assert_eq!(snapshot.events_notified, 0);
}

#[tokio::test]
async fn test_other_profiles_are_not_muted() {
    let channel = Arc::new(RecordingChannel::new("chat"));
    let notifier = Notifier::builder()
        .with_context(AppContext::new("orders", ["prod"]))
        .with_ignored_profiles(["dev"])
        .with_channel(EventKind::Notice, channel.clone())
        .build()
        .unwrap();

    assert!(!notifier.is_muted());
    notifier.submit(NoticeEvent::new("orders").with_unique_code("a"));
    notifier.shutdown().await.unwrap();

    let notices = channel.notices();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].content().title.starts_with("[prod] environment"));
}

#[tokio::test]
async fn test_config_file_drives_the_notifier() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(
        b"application_name: billing\n\
          profiles: [staging]\n\
          interval: 10m\n\
          threshold: 3\n\
          aggregation_interval: 30s\n\
          ignored_profiles: [dev]\n",
    )
    .unwrap();

    let config = NoticeConfig::load(file.path()).unwrap();
    assert_eq!(config.interval, Duration::from_secs(600));
    assert_eq!(config.aggregation_interval, Duration::from_secs(30));

    let channel = Arc::new(RecordingChannel::new("chat"));
    let notifier = Notifier::builder()
        .with_config(config)
        .with_channel(EventKind::Notice, channel.clone())
        .build()
        .unwrap();

    assert_eq!(notifier.context().application_name(), "billing");
    assert_eq!(notifier.registry().policy().threshold(), 3);

    // first notifies, second is suppressed, third completes the window
    for _ in 0..3 {
        notifier.submit(NoticeEvent::slow_sql("select 1", Duration::from_secs(3)));
    }
    notifier.shutdown().await.unwrap();

    let notices = channel.notices();
    assert_eq!(notices.len(), 2);
    assert_eq!(notices[0].event().scene(), SCENE_SLOW_SQL);
    assert!(notices[0].content().body.contains("application: billing\n"));
}

#[tokio::test]
async fn test_tracing_errors_become_notices_without_feedback() {
    let capture = MockCaptureLayer::new();
    let chat = Arc::new(RecordingChannel::new("chat"));
    let notifier = Notifier::builder()
        .with_workers(1)
        .with_channel(EventKind::Notice, chat.clone())
        .with_channel(EventKind::Notice, Arc::new(FailingChannel::erroring("offline")))
        .build()
        .unwrap();

    let subscriber = tracing_subscriber::registry()
        .with(capture.clone())
        .with(ErrorNoticeLayer::new(notifier.clone()));
    let _guard = tracing::subscriber::set_default(subscriber);

    tracing::error!(target: "app::db", pool = "primary", "connection refused");
    tracing::info!(target: "app::db", "reconnected");
    notifier.shutdown().await.unwrap();

    // The failed delivery is logged at ERROR by this crate but not bridged back.
    assert_eq!(notifier.metrics().events_submitted(), 1);
    assert_eq!(notifier.metrics().deliveries_failed(), 1);
    assert!(capture
        .at_level(Level::ERROR)
        .iter()
        .any(|event| event.message.contains("channel notification failed")
            && event.field("channel") == Some("offline")));

    let notices = chat.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].event().scene(), SCENE_EXCEPTION);
    assert_eq!(notices[0].event().field("pool"), Some("primary"));
}

#[tokio::test]
async fn test_resource_monitor_feeds_notifier() {
    let chat = Arc::new(RecordingChannel::new("chat"));
    let notifier = Notifier::builder()
        .with_channel(EventKind::Notice, chat.clone())
        .build()
        .unwrap();
    let probe = || {
        vec![
            ResourceSample::new(ResourceScope::System, "disk usage", 0.97, 0.9)
                .with_detail("mount", "/var"),
            ResourceSample::new(ResourceScope::System, "memory usage", 0.4, 0.9),
        ]
    };
    let monitor = ResourceMonitor::new(Arc::new(probe), notifier.clone());

    assert_eq!(monitor.check(), 1);
    assert_eq!(monitor.check(), 1);
    notifier.shutdown().await.unwrap();

    // the second breach is throttled like any other repeat
    let notices = chat.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].event().scene(), SCENE_SYSTEM_RESOURCE);
    assert_eq!(notices[0].event().field("mount"), Some("/var"));
    assert_eq!(notifier.metrics().events_suppressed(), 1);
}

#[tokio::test]
async fn test_dropping_notifier_without_shutdown_stops_background_tasks() {
    let runtime = tokio::runtime::Handle::current();
    let before = runtime.metrics().num_alive_tasks();

    for _ in 0..10 {
        let mail = Arc::new(RecordingChannel::new("mail"));
        let notifier = Notifier::builder()
            .with_workers(4)
            .with_channel(EventKind::Notice, Arc::new(RecordingChannel::new("chat")))
            .with_aggregating_channel(EventKind::Notice, mail)
            .build()
            .unwrap();
        notifier.submit(NoticeEvent::new("orders").with_unique_code("a"));
        let clone = notifier.clone();
        drop(notifier);
        drop(clone);
    }

    tokio::time::timeout(Duration::from_secs(5), async {
        while runtime.metrics().num_alive_tasks() > before {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("worker or scheduler tasks outlived their notifier");
}
