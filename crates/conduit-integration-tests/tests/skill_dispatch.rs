//! The model calling plugin skills through a chat request.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{TestHost, tool_results_seen};
use conduit_core::{ChatRole, ErrorCode};
use conduit_kernel::KernelError;
use conduit_sdk::SdkError;
use conduit_test::{MockLlmTurn, MockToolCall, eventually, mqtt_publish_skill, simple_skill};
use serde_json::{Value, json};

async fn pong(_: Value) -> Result<String, String> {
    Ok("pong".to_string())
}

#[tokio::test]
async fn test_model_publishes_through_mqtt_plugin() {
    let host = TestHost::start(vec![
        MockLlmTurn::tool_calls(vec![MockToolCall::with_id(
            "call_1",
            "mqtt_publish",
            json!({"topic": "home/kitchen/light", "payload": "on"}),
        )]),
        MockLlmTurn::text("The kitchen light is on."),
    ]);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let mqtt = host.plugin("mqtt").await;
    let recorder = Arc::clone(&seen);
    mqtt.register_skill(mqtt_publish_skill(), move |args: Value| {
        let recorder = Arc::clone(&recorder);
        async move {
            let topic = args["topic"].as_str().unwrap_or_default().to_string();
            recorder.lock().unwrap().push(args);
            Ok::<_, String>(format!("published to {topic}"))
        }
    })
    .await
    .unwrap();

    let telegram = host.plugin("telegram").await;
    let chat = telegram
        .get_or_create_chat("tg-42", Some("Kitchen".into()))
        .await
        .unwrap();
    telegram
        .add_chat_message(&chat.id, ChatRole::User, "turn on the kitchen light")
        .await
        .unwrap();

    let reply = telegram.request_llm_reply(&chat.id, None).await.unwrap();
    assert_eq!(reply, "The kitchen light is on.");

    assert_eq!(*seen.lock().unwrap(), vec![
        json!({"topic": "home/kitchen/light", "payload": "on"})
    ]);

    let tools = host.provider.captured_tools();
    assert!(tools[0].iter().any(|t| t.name == "mqtt_publish"));

    let results = tool_results_seen(&host.provider, 1);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].call_id, "call_1");
    assert_eq!(results[0].content, "published to home/kitchen/light");
    assert!(!results[0].is_error);

    let history = telegram.chat_messages(&chat.id, None).await.unwrap();
    let last = history.last().unwrap();
    assert_eq!(last.role, ChatRole::Assistant);
    assert_eq!(last.content, "The kitchen light is on.");
}

#[tokio::test]
async fn test_slow_skill_reports_timeout_to_model() {
    let host = TestHost::start_with(
        vec![
            MockLlmTurn::tool_calls(vec![MockToolCall::with_id(
                "call_1",
                "mqtt_publish",
                json!({"topic": "home/kitchen/light"}),
            )]),
            MockLlmTurn::text("The broker did not answer."),
        ],
        |settings| settings.with_skill_call_timeout(Duration::from_millis(200)),
    );

    let mqtt = host.plugin("mqtt").await;
    mqtt.register_skill(mqtt_publish_skill(), |_: Value| async {
        tokio::time::sleep(Duration::from_secs(3)).await;
        Ok::<_, String>("too late".to_string())
    })
    .await
    .unwrap();

    let telegram = host.plugin("telegram").await;
    let chat = telegram.get_or_create_chat("tg-7", None).await.unwrap();
    telegram
        .add_chat_message(&chat.id, ChatRole::User, "light on")
        .await
        .unwrap();

    let reply = telegram.request_llm_reply(&chat.id, None).await.unwrap();
    assert_eq!(reply, "The broker did not answer.");

    let results = tool_results_seen(&host.provider, 1);
    assert_eq!(results.len(), 1);
    assert!(results[0].is_error);
    assert!(results[0].content.contains("timed out"), "{}", results[0].content);
}

#[tokio::test]
async fn test_failing_skill_reports_error_to_model() {
    let host = TestHost::start(vec![
        MockLlmTurn::tool_calls(vec![MockToolCall::with_id(
            "call_1",
            "mqtt_publish",
            json!({"topic": "x"}),
        )]),
        MockLlmTurn::text("Could not publish."),
    ]);

    let mqtt = host.plugin("mqtt").await;
    mqtt.register_skill(mqtt_publish_skill(), |_: Value| async {
        Err::<String, _>("broker unreachable".to_string())
    })
    .await
    .unwrap();

    let chat = mqtt.get_or_create_chat("local", None).await.unwrap();
    mqtt.add_chat_message(&chat.id, ChatRole::User, "publish")
        .await
        .unwrap();
    mqtt.request_llm_reply(&chat.id, None).await.unwrap();

    let results = tool_results_seen(&host.provider, 1);
    assert!(results[0].is_error);
    assert!(results[0].content.contains("broker unreachable"));
}

#[tokio::test]
async fn test_skill_name_is_unique_until_owner_leaves() {
    let host = TestHost::start(Vec::new());
    let first = host.plugin("first").await;
    let second = host.plugin("second").await;

    first
        .register_skill(simple_skill("ping"), pong)
        .await
        .unwrap();

    let err = second
        .register_skill(simple_skill("ping"), pong)
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::DuplicateName));

    first.close();
    let skills = host.kernel.skills();
    let released = eventually(Duration::from_secs(5), async || {
        skills.owner("ping").await.is_none()
    });
    assert!(released.await);

    second
        .register_skill(simple_skill("ping"), pong)
        .await
        .unwrap();
    assert_eq!(skills.owner("ping").await, Some(second.session_id()));

    let output = skills
        .invoke("ping", json!({}), Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(output, "pong");
}

#[tokio::test]
async fn test_disconnect_fails_in_flight_invocation() {
    let host = TestHost::start(Vec::new());
    let plugin = host.plugin("flaky").await;

    let (entered_tx, entered_rx) = tokio::sync::mpsc::channel::<()>(1);
    plugin
        .register_skill(simple_skill("hang"), move |_: Value| {
            let entered = entered_tx.clone();
            async move {
                let _ = entered.send(()).await;
                std::future::pending::<()>().await;
                Ok::<_, String>(String::new())
            }
        })
        .await
        .unwrap();

    let skills = Arc::clone(host.kernel.skills());
    let call = tokio::spawn(async move {
        skills
            .invoke("hang", json!({}), Duration::from_secs(10))
            .await
    });

    let mut entered_rx = entered_rx;
    tokio::time::timeout(Duration::from_secs(5), entered_rx.recv())
        .await
        .unwrap();
    plugin.close();

    let err = tokio::time::timeout(Duration::from_secs(5), call)
        .await
        .unwrap()
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, KernelError::SessionClosed), "{err}");

    let sessions = host.kernel.sessions();
    assert!(eventually(Duration::from_secs(5), async || sessions.is_empty().await).await);
    assert!(host.kernel.skills().is_empty().await);

    let err = host
        .kernel
        .skills()
        .invoke("hang", json!({}), Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, KernelError::UnknownSkill(_)));
}

#[tokio::test]
async fn test_unknown_provider_is_invalid_request() {
    let host = TestHost::start(Vec::new());
    let plugin = host.plugin("telegram").await;
    let chat = plugin.get_or_create_chat("tg-1", None).await.unwrap();

    let err = plugin
        .request_llm_reply(&chat.id, Some("nope".into()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SdkError::Host {
            code: ErrorCode::InvalidRequest,
            ..
        }
    ));
}
