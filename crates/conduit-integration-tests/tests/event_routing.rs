//! Events flowing between plugins and host-side handlers.

mod common;

use std::time::Duration;

use common::TestHost;
use conduit_core::{ErrorCode, SubscriptionId};
use conduit_events::SubscriptionTarget;
use conduit_kernel::{PLUGIN_DISCONNECTED, PLUGIN_REGISTERED};
use conduit_sdk::Subscription;
use conduit_test::{RECV_TIMEOUT, RecordingHandler};
use serde_json::json;

async fn next_event(subscription: &mut Subscription) -> conduit_core::Event {
    tokio::time::timeout(RECV_TIMEOUT, subscription.recv())
        .await
        .expect("no event delivered")
        .expect("subscription closed")
}

#[tokio::test]
async fn test_chat_event_reaches_every_subscriber() {
    let host = TestHost::start(Vec::new());
    let logger = host.plugin("logger").await;
    let mqtt = host.plugin("mqtt").await;
    let telegram = host.plugin("telegram").await;

    let mut logger_sub = logger.subscribe(["chat.message.*"]).await.unwrap();
    let mut mqtt_sub = mqtt.subscribe(["chat.*", "mqtt.*"]).await.unwrap();
    let mut narrow_sub = mqtt.subscribe(["chat.message.sent"]).await.unwrap();

    telegram
        .emit(
            "chat.message.received",
            json!({"chat_id": "tg-42", "text": "turn on the kitchen light"}),
        )
        .await
        .unwrap();

    for subscription in [&mut logger_sub, &mut mqtt_sub] {
        let event = next_event(subscription).await;
        assert_eq!(event.event_type, "chat.message.received");
        assert_eq!(event.source(), Some("telegram"));
        assert_eq!(event.payload["text"], json!("turn on the kitchen light"));
    }

    // Give a wrong delivery time to show up.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(narrow_sub.try_recv().is_none());
}

#[tokio::test]
async fn test_unsubscribe_stops_delivery() {
    let host = TestHost::start(Vec::new());
    let listener = host.plugin("listener").await;
    let emitter = host.plugin("emitter").await;

    let mut kept = listener.subscribe(["sensor.*"]).await.unwrap();
    let dropped = listener.subscribe(["sensor.*"]).await.unwrap();
    listener.unsubscribe(dropped.id()).await.unwrap();
    assert_eq!(host.kernel.bus().subscription_count(), 1);

    emitter.emit("sensor.temperature", json!({"celsius": 21})).await.unwrap();
    let event = next_event(&mut kept).await;
    assert_eq!(event.payload["celsius"], json!(21));

    // Ids owned by someone else, or unknown, are refused.
    let err = emitter.unsubscribe(kept.id()).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InvalidRequest));
    let err = emitter.unsubscribe(SubscriptionId(9_999)).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InvalidRequest));
}

#[tokio::test]
async fn test_malformed_pattern_rejected() {
    let host = TestHost::start(Vec::new());
    let plugin = host.plugin("logger").await;

    let err = plugin.subscribe(["chat..received"]).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InvalidRequest));
    let err = plugin.subscribe(Vec::<String>::new()).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InvalidRequest));
}

#[tokio::test]
async fn test_host_handlers_see_plugin_lifecycle() {
    let host = TestHost::start(Vec::new());
    let recorder = RecordingHandler::new();
    host.kernel
        .bus()
        .subscribe(
            vec!["plugin.*".into()],
            SubscriptionTarget::handler(recorder.clone()),
        )
        .unwrap();

    let plugin = host.plugin("mqtt").await;
    let session_id = plugin.session_id();
    plugin.close();

    assert!(recorder.wait_for(2, RECV_TIMEOUT).await);
    let mut types = recorder.event_types();
    types.sort();
    assert_eq!(types, vec![PLUGIN_DISCONNECTED, PLUGIN_REGISTERED]);
    for event in recorder.events() {
        assert_eq!(event.payload["name"], json!("mqtt"));
        assert_eq!(event.payload["session_id"], json!(session_id));
    }
}

#[tokio::test]
async fn test_plugin_subscriptions_removed_on_disconnect() {
    let host = TestHost::start(Vec::new());
    let plugin = host.plugin("logger").await;
    let mut subscription = plugin.subscribe(["*"]).await.unwrap();
    assert_eq!(host.kernel.bus().subscription_count(), 1);

    plugin.close();
    assert!(
        tokio::time::timeout(RECV_TIMEOUT, subscription.recv())
            .await
            .unwrap()
            .is_none()
    );

    let bus = host.kernel.bus();
    assert!(
        conduit_test::eventually(RECV_TIMEOUT, async || bus.subscription_count() == 0).await
    );
}
