//! Storage, plugin config and chat history requests.

mod common;

use common::TestHost;
use conduit_core::{ChatRole, ErrorCode, Row};
use conduit_sdk::ConfigUpdate;
use conduit_test::{RECV_TIMEOUT, mqtt_config_schema};
use serde_json::{Value, json};

fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => panic!("row must be an object"),
    }
}

#[tokio::test]
async fn test_storage_is_scoped_per_plugin() {
    let host = TestHost::start(Vec::new());
    let mqtt = host.plugin("mqtt").await;
    let other = host.plugin("other").await;

    mqtt.create_table("readings").await.unwrap();
    let stored = mqtt
        .insert("readings", row(json!({"sensor": "kitchen", "celsius": 21})))
        .await
        .unwrap();
    assert!(stored.contains_key("id"));
    mqtt.insert("readings", row(json!({"sensor": "hall", "celsius": 19})))
        .await
        .unwrap();

    let kitchen = mqtt
        .query("readings", row(json!({"sensor": "kitchen"})), None)
        .await
        .unwrap();
    assert_eq!(kitchen.len(), 1);
    assert_eq!(kitchen[0]["celsius"], json!(21));

    let all = mqtt.query("readings", Row::new(), Some(1)).await.unwrap();
    assert_eq!(all.len(), 1);

    let err = other
        .query("readings", Row::new(), None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InvalidRequest));
}

#[tokio::test]
async fn test_config_declare_get_set_and_push() {
    let host = TestHost::start(Vec::new());
    let mqtt = host.plugin("mqtt").await;

    let values = mqtt.declare_config(mqtt_config_schema()).await.unwrap();
    assert_eq!(values["broker"], json!("localhost"));
    assert_eq!(values["port"], json!(1883));

    let mut changes = mqtt.config_changes();
    mqtt.set_config("port", json!(8883)).await.unwrap();

    let change = tokio::time::timeout(RECV_TIMEOUT, changes.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(change, ConfigUpdate {
        key: "port".into(),
        value: json!(8883),
    });
    assert_eq!(mqtt.config().await.unwrap()["port"], json!(8883));

    let err = mqtt.set_config("port", json!("high")).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InvalidRequest));
    let err = mqtt.set_config("missing", json!(1)).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InvalidRequest));
}

#[tokio::test]
async fn test_config_is_per_plugin() {
    let host = TestHost::start(Vec::new());
    let mqtt = host.plugin("mqtt").await;
    let telegram = host.plugin("telegram").await;

    mqtt.declare_config(mqtt_config_schema()).await.unwrap();
    assert!(telegram.config().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_chat_history() {
    let host = TestHost::start(Vec::new());
    let telegram = host.plugin("telegram").await;

    let chat = telegram
        .get_or_create_chat("tg-42", Some("Kitchen".into()))
        .await
        .unwrap();
    let again = telegram.get_or_create_chat("tg-42", None).await.unwrap();
    assert_eq!(chat.id, again.id);
    assert_eq!(again.title.as_deref(), Some("Kitchen"));

    telegram
        .add_chat_message(&chat.id, ChatRole::User, "first")
        .await
        .unwrap();
    telegram
        .add_chat_message(&chat.id, ChatRole::User, "second")
        .await
        .unwrap();

    let all = telegram.chat_messages(&chat.id, None).await.unwrap();
    let texts: Vec<&str> = all.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(texts, vec!["first", "second"]);

    let latest = telegram.chat_messages(&chat.id, Some(1)).await.unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].content, "second");

    let err = telegram
        .add_chat_message("no-such-chat", ChatRole::User, "hi")
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InvalidRequest));
}
