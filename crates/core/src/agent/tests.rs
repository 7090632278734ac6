use std::time::Duration;

use toolchat_model::{ErrorKind, ModelMessage};
use toolchat_test_model::{
    PresetEvent, PresetFailure, PresetResponse, TestModelProvider,
};
use tokio_util::sync::CancellationToken;

use super::*;

fn chat_agent(model_provider: &TestModelProvider) -> Agent {
    let mut config = AgentConfig::new("chat");
    config.model = Some("chat-model".to_owned());
    config.temperature = Some(0.5);
    config.messages = vec![
        ModelMessage::System("Be nice.".to_owned()),
        ModelMessage::User("Hello".to_owned()),
    ];
    Agent::with_model_provider(model_provider.clone(), config)
}

fn chunks<const N: usize>(texts: [&str; N]) -> PresetResponse {
    PresetResponse::with_events(
        texts.map(|text| PresetEvent::MessageDelta(text.to_owned())),
    )
}

#[tokio::test]
async fn test_complete() {
    let model_provider = TestModelProvider::default();
    model_provider.add_response(chunks(["Hi, ", "what can I do for you?"]));
    let mut agent = chat_agent(&model_provider);

    let text = agent.complete().await.unwrap();
    assert_eq!(text, "Hi, what can I do for you?");

    let requests = model_provider.requests();
    assert_eq!(requests.len(), 1);
    let req = &requests[0];
    assert!(!req.stream);
    assert_eq!(req.model.as_deref(), Some("chat-model"));
    assert_eq!(req.temperature, Some(0.5));
    assert_eq!(req.messages, agent.messages());
}

#[tokio::test]
async fn test_complete_without_choices() {
    let model_provider = TestModelProvider::default();
    model_provider.add_response(PresetResponse::without_choices());
    let mut agent = chat_agent(&model_provider);

    let err = agent.complete().await.unwrap_err();
    assert!(matches!(err, Error::NoChoices), "{err:?}");
}

#[tokio::test]
async fn test_complete_transport_error() {
    let model_provider = TestModelProvider::default();
    model_provider.add_response(PresetResponse::failing(PresetFailure::RateLimited));
    let mut agent = chat_agent(&model_provider);

    let err = agent.complete().await.unwrap_err();
    assert!(
        matches!(
            err,
            Error::Transport {
                kind: ErrorKind::RateLimitExceeded,
                ..
            }
        ),
        "{err:?}"
    );
}

#[tokio::test]
async fn test_complete_for_tool_calls() {
    let model_provider = TestModelProvider::default();
    model_provider.add_response(PresetResponse::with_tool_calls([
        ("list_workspaces", "{}"),
        ("start_workspace", r#"{"workspace_name":"demo"}"#),
    ]));
    let mut config = AgentConfig::new("tools");
    config.parallel_tool_calls = Some(false);
    config.temperature = Some(0.0);
    let mut agent = Agent::with_model_provider(model_provider.clone(), config);
    agent.replace_messages([ModelMessage::User("Start demo".to_owned())]);

    let calls = agent.complete_for_tool_calls().await.unwrap();
    let names = calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, ["list_workspaces", "start_workspace"]);
    assert_eq!(calls[1].arguments, r#"{"workspace_name":"demo"}"#);

    let req = &model_provider.requests()[0];
    assert!(!req.stream);
    assert_eq!(req.parallel_tool_calls, Some(false));
    assert_eq!(req.messages, [ModelMessage::User("Start demo".to_owned())]);
}

#[tokio::test]
async fn test_complete_for_tool_calls_without_calls() {
    let model_provider = TestModelProvider::default();
    model_provider.add_response(PresetResponse::with_text("No tools needed."));
    let mut agent = chat_agent(&model_provider);

    let err = agent.complete_for_tool_calls().await.unwrap_err();
    assert!(matches!(err, Error::NoToolCalls), "{err:?}");
}

#[tokio::test]
async fn test_complete_streaming() {
    let model_provider = TestModelProvider::default();
    model_provider.add_response(chunks(["How ", "", "are ", "you?"]));
    let mut agent = chat_agent(&model_provider);

    let mut seen = vec![];
    let text = agent
        .complete_streaming(&CancellationToken::new(), |agent, chunk| {
            assert_eq!(agent.name(), "chat");
            seen.push(chunk.to_owned());
            Ok(())
        })
        .await
        .unwrap();

    // Empty deltas never reach the callback.
    assert_eq!(seen, ["How ", "are ", "you?"]);
    assert_eq!(text, "How are you?");
    assert!(model_provider.requests()[0].stream);
}

#[tokio::test]
async fn test_complete_streaming_interrupted() {
    let model_provider = TestModelProvider::default();
    model_provider.add_response(chunks(["one ", "two ", "three"]));
    let mut agent = chat_agent(&model_provider);

    let mut calls = 0;
    let err = agent
        .complete_streaming(&CancellationToken::new(), |_, chunk| {
            calls += 1;
            if chunk == "two " {
                return Err("terminal closed".into());
            }
            Ok(())
        })
        .await
        .unwrap_err();

    assert_eq!(calls, 2);
    assert_eq!(err.partial, "one two ");
    assert!(matches!(err.error, Error::Interrupted(_)), "{err:?}");
}

#[tokio::test]
async fn test_complete_streaming_transport_error() {
    let model_provider = TestModelProvider::default();
    model_provider.add_response(PresetResponse::with_events([
        PresetEvent::MessageDelta("partial ".to_owned()),
        PresetEvent::StreamError("connection reset".to_owned()),
        PresetEvent::MessageDelta("never".to_owned()),
    ]));
    let mut agent = chat_agent(&model_provider);

    let err = agent
        .complete_streaming(&CancellationToken::new(), |_, _| Ok(()))
        .await
        .unwrap_err();
    assert_eq!(err.partial, "partial ");
    assert!(err.error.is_transport(), "{err:?}");
}

#[tokio::test(start_paused = true)]
async fn test_complete_streaming_cancelled() {
    let mut model_provider = TestModelProvider::default();
    model_provider.set_delay(Duration::from_millis(100));
    model_provider.add_response(chunks(["first ", "second ", "third"]));
    let mut agent = chat_agent(&model_provider);

    let cancel = CancellationToken::new();
    let cancel_after_first = cancel.clone();
    let err = agent
        .complete_streaming(&cancel, move |_, _| {
            cancel_after_first.cancel();
            Ok(())
        })
        .await
        .unwrap_err();

    assert_eq!(err.partial, "first ");
    assert!(matches!(err.error, Error::Cancelled), "{err:?}");
}

#[tokio::test]
async fn test_complete_streaming_already_cancelled() {
    let model_provider = TestModelProvider::default();
    model_provider.add_response(chunks(["unused"]));
    let mut agent = chat_agent(&model_provider);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = agent
        .complete_streaming(&cancel, |_, _| Ok(()))
        .await
        .unwrap_err();
    assert!(err.partial.is_empty());
    assert!(matches!(err.error, Error::Cancelled));
    assert!(model_provider.requests().is_empty());
}
