use async_trait::async_trait;
use polyllm::message::{ContentBlock, Role, Turn};
use polyllm::tool_registry::{ToolDefinition, ToolParameter, ToolParameterType, ToolRegistry};
use polyllm::{Capabilities, ProviderAdapter, ProviderError, Router, RouterError, TransportKind};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

// Mock adapter for testing: returns scripted outcomes in order and records
// what the router actually sent it.
struct MockAdapter {
    id: String,
    caps: Capabilities,
    script: Mutex<VecDeque<Result<Turn, ProviderError>>>,
    call_count: Mutex<usize>,
    last_history: Mutex<Vec<Turn>>,
    last_tool_names: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl MockAdapter {
    fn new(id: &str, script: Vec<Result<Turn, ProviderError>>) -> Self {
        Self {
            id: id.to_string(),
            caps: Capabilities {
                supports_tool_calls: true,
                supports_images: true,
                max_context_turns: 128,
            },
            script: Mutex::new(script.into()),
            call_count: Mutex::new(0),
            last_history: Mutex::new(Vec::new()),
            last_tool_names: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    fn with_capabilities(mut self, caps: Capabilities) -> Self {
        self.caps = caps;
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn call_count(&self) -> usize {
        *self.call_count.lock().await
    }

    async fn last_history(&self) -> Vec<Turn> {
        self.last_history.lock().await.clone()
    }

    async fn last_tool_names(&self) -> Vec<String> {
        self.last_tool_names.lock().await.clone()
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    async fn call(
        &self,
        history: &[Turn],
        available_tools: &[polyllm::ToolSpec],
    ) -> Result<Turn, ProviderError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        *self.call_count.lock().await += 1;
        *self.last_history.lock().await = history.to_vec();
        *self.last_tool_names.lock().await =
            available_tools.iter().map(|t| t.name.clone()).collect();

        self.script
            .lock()
            .await
            .pop_front()
            .expect("mock script exhausted")
    }
}

fn transport_err(id: &str) -> ProviderError {
    ProviderError::Transport {
        provider: id.to_string(),
        kind: TransportKind::ConnectionRefused,
        message: "connection refused".to_string(),
    }
}

fn tool_call_turn(call_id: &str, tool_name: &str, arguments: serde_json::Value) -> Turn {
    let arguments = match arguments {
        serde_json::Value::Object(map) => map,
        other => panic!("arguments must be an object, got {:?}", other),
    };
    Turn::new(
        Role::Assistant,
        vec![ContentBlock::ToolCall {
            call_id: call_id.to_string(),
            tool_name: tool_name.to_string(),
            arguments,
        }],
    )
    .unwrap()
}

fn echo_registry() -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry
        .register(
            ToolDefinition::new("echo", "Echoes its input.")
                .with_parameter(
                    ToolParameter::new("x", ToolParameterType::String).required(),
                )
                .with_handler(Arc::new(|args| {
                    Box::pin(async move { Ok(args["x"].clone()) })
                })),
        )
        .unwrap();
    Arc::new(registry)
}

fn router_with(adapter: Arc<MockAdapter>, registry: Arc<ToolRegistry>) -> Router {
    Router::with_adapters("mock", vec![adapter], registry)
        .unwrap()
        .with_retry_policy(3, Duration::from_millis(1))
}

#[tokio::test]
async fn send_appends_user_and_assistant_turns() {
    let adapter = Arc::new(MockAdapter::new(
        "mock",
        vec![Ok(Turn::assistant_text("Vier."))],
    ));
    let router = router_with(adapter.clone(), Arc::new(ToolRegistry::new()));

    let session = router.create_session(None, None).unwrap();
    let reply = router
        .send(&session, Turn::user_text("2+2?"), None)
        .await
        .unwrap();

    assert_eq!(reply, Turn::assistant_text("Vier."));
    let history = router.session_history(&session).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0], Turn::user_text("2+2?"));
    assert_eq!(history[1], Turn::assistant_text("Vier."));

    // The adapter saw the user turn but not its own (not yet appended) reply.
    assert_eq!(adapter.last_history().await, vec![Turn::user_text("2+2?")]);
}

#[tokio::test]
async fn tool_loop_executes_and_feeds_results_back() {
    let adapter = Arc::new(MockAdapter::new(
        "mock",
        vec![
            Ok(tool_call_turn("call_0", "echo", json!({"x": "hallo"}))),
            Ok(Turn::assistant_text("It said hallo.")),
        ],
    ));
    let router = router_with(adapter.clone(), echo_registry());

    let session = router.create_session(None, None).unwrap();
    let reply = router
        .send(&session, Turn::user_text("run echo"), None)
        .await
        .unwrap();

    assert_eq!(reply, Turn::assistant_text("It said hallo."));

    // user, assistant tool call, tool results, final answer
    let history = router.session_history(&session).await.unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history[1].tool_calls().len(), 1);
    match &history[2].content[0] {
        ContentBlock::ToolResult {
            call_id,
            result,
            is_error,
            ..
        } => {
            assert_eq!(call_id, "call_0");
            assert_eq!(result, &json!("hallo"));
            assert!(!is_error);
        }
        other => panic!("expected tool result, got {:?}", other),
    }

    // The second round trip saw the staged tool exchange.
    assert_eq!(adapter.call_count().await, 2);
    assert_eq!(adapter.last_history().await.len(), 3);
}

#[tokio::test]
async fn tool_failures_are_data_the_model_can_recover_from() {
    let adapter = Arc::new(MockAdapter::new(
        "mock",
        vec![
            Ok(tool_call_turn("call_0", "no_such_tool", json!({}))),
            Ok(Turn::assistant_text("That tool does not exist, sorry.")),
        ],
    ));
    let router = router_with(adapter.clone(), echo_registry());

    let session = router.create_session(None, None).unwrap();
    let reply = router
        .send(&session, Turn::user_text("try it"), None)
        .await
        .unwrap();

    assert_eq!(reply.text(), "That tool does not exist, sorry.");
    let history = router.session_history(&session).await.unwrap();
    match &history[2].content[0] {
        ContentBlock::ToolResult { is_error, .. } => assert!(is_error),
        other => panic!("expected tool result, got {:?}", other),
    }
}

#[tokio::test]
async fn transport_faults_are_retried_until_success() {
    let adapter = Arc::new(MockAdapter::new(
        "mock",
        vec![
            Err(transport_err("mock")),
            Err(transport_err("mock")),
            Ok(Turn::assistant_text("finally")),
        ],
    ));
    let router = router_with(adapter.clone(), Arc::new(ToolRegistry::new()));

    let session = router.create_session(None, None).unwrap();
    let reply = router
        .send(&session, Turn::user_text("hi"), None)
        .await
        .unwrap();

    assert_eq!(reply.text(), "finally");
    assert_eq!(adapter.call_count().await, 3);
}

#[tokio::test]
async fn auth_errors_surface_immediately_without_retry() {
    let adapter = Arc::new(MockAdapter::new(
        "mock",
        vec![Err(ProviderError::Auth {
            provider: "mock".to_string(),
            message: "bad key".to_string(),
        })],
    ));
    let router = router_with(adapter.clone(), Arc::new(ToolRegistry::new()));

    let session = router.create_session(None, None).unwrap();
    let err = router
        .send(&session, Turn::user_text("hi"), None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RouterError::Provider(ProviderError::Auth { .. })
    ));
    assert_eq!(adapter.call_count().await, 1);

    // The failed iteration staged nothing; only the user turn remains.
    let history = router.session_history(&session).await.unwrap();
    assert_eq!(history, vec![Turn::user_text("hi")]);
}

#[tokio::test]
async fn tool_loop_budget_is_enforced() {
    let adapter = Arc::new(MockAdapter::new(
        "mock",
        vec![
            Ok(tool_call_turn("call_0", "echo", json!({"x": "a"}))),
            Ok(tool_call_turn("call_1", "echo", json!({"x": "b"}))),
        ],
    ));
    let router = Router::with_adapters("mock", vec![adapter.clone()], echo_registry())
        .unwrap()
        .with_max_tool_iterations(2);

    let session = router.create_session(None, None).unwrap();
    let err = router
        .send(&session, Turn::user_text("loop"), None)
        .await
        .unwrap_err();

    match err {
        RouterError::ToolLoopExceeded {
            provider,
            iterations,
        } => {
            assert_eq!(provider, "mock");
            assert_eq!(iterations, 2);
        }
        other => panic!("expected ToolLoopExceeded, got {:?}", other),
    }

    // Both completed iterations are on the record: user + 2 * (call + results).
    let history = router.session_history(&session).await.unwrap();
    assert_eq!(history.len(), 5);
}

#[tokio::test]
async fn no_tools_are_advertised_to_a_text_only_provider() {
    let adapter = Arc::new(
        MockAdapter::new("mock", vec![Ok(Turn::assistant_text("plain"))]).with_capabilities(
            Capabilities {
                supports_tool_calls: false,
                supports_images: true,
                max_context_turns: 128,
            },
        ),
    );
    let router = router_with(adapter.clone(), echo_registry());

    let session = router.create_session(None, None).unwrap();
    router
        .send(&session, Turn::user_text("hi"), None)
        .await
        .unwrap();

    assert!(adapter.last_tool_names().await.is_empty());
}

#[tokio::test]
async fn tags_select_which_tools_are_advertised() {
    let mut registry = ToolRegistry::new();
    registry
        .register(
            ToolDefinition::new("always", "Untagged.").with_handler(Arc::new(|_| {
                Box::pin(async { Ok(json!(null)) })
            })),
        )
        .unwrap();
    registry
        .register(
            ToolDefinition::new("db_lookup", "Tagged.")
                .with_tag("database")
                .with_handler(Arc::new(|_| Box::pin(async { Ok(json!(null)) }))),
        )
        .unwrap();

    let adapter = Arc::new(MockAdapter::new(
        "mock",
        vec![
            Ok(Turn::assistant_text("one")),
            Ok(Turn::assistant_text("two")),
        ],
    ));
    let router = router_with(adapter.clone(), Arc::new(registry));
    let session = router.create_session(None, None).unwrap();

    router
        .send(&session, Turn::user_text("first"), None)
        .await
        .unwrap();
    assert_eq!(adapter.last_tool_names().await, vec!["always"]);

    let tags = vec!["database".to_string()];
    router
        .send(&session, Turn::user_text("second"), Some(&tags))
        .await
        .unwrap();
    assert_eq!(adapter.last_tool_names().await, vec!["always", "db_lookup"]);
}

#[tokio::test]
async fn images_are_downgraded_for_providers_without_vision() {
    let adapter = Arc::new(
        MockAdapter::new("mock", vec![Ok(Turn::assistant_text("ok"))]).with_capabilities(
            Capabilities {
                supports_tool_calls: true,
                supports_images: false,
                max_context_turns: 128,
            },
        ),
    );
    let router = router_with(adapter.clone(), Arc::new(ToolRegistry::new()));

    let session = router.create_session(None, None).unwrap();
    let turn = Turn::user_with_image(
        "what is this?",
        "image/png",
        polyllm::ImageData::Bytes(vec![1, 2, 3]),
    );
    router.send(&session, turn.clone(), None).await.unwrap();

    let seen = adapter.last_history().await;
    assert_eq!(
        seen[0].content[1],
        ContentBlock::text("[image omitted: image/png]")
    );

    // The stored transcript keeps the original image untouched.
    let history = router.session_history(&session).await.unwrap();
    assert_eq!(history[0], turn);
}

#[tokio::test]
async fn truncation_never_starts_the_view_inside_a_tool_exchange() {
    let adapter = Arc::new(
        MockAdapter::new(
            "mock",
            vec![
                Ok(tool_call_turn("call_0", "echo", json!({"x": "hallo"}))),
                Ok(Turn::assistant_text("done")),
                Ok(Turn::assistant_text("again")),
            ],
        )
        .with_capabilities(Capabilities {
            supports_tool_calls: true,
            supports_images: true,
            max_context_turns: 3,
        }),
    );
    let router = router_with(adapter.clone(), echo_registry());

    let session = router.create_session(None, None).unwrap();
    router
        .send(&session, Turn::user_text("run echo"), None)
        .await
        .unwrap();
    router
        .send(&session, Turn::user_text("and now?"), None)
        .await
        .unwrap();

    // A plain 3-turn tail of the 5-turn transcript would begin with the
    // tool-result turn; the adapter must never see that orphan.
    let seen = adapter.last_history().await;
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], Turn::assistant_text("done"));
    assert_eq!(seen[1], Turn::user_text("and now?"));
    assert!(seen.iter().all(|t| t.role != Role::Tool));
}

#[tokio::test]
async fn send_with_timeout_abandons_the_iteration_cleanly() {
    let adapter = Arc::new(
        MockAdapter::new("mock", vec![Ok(Turn::assistant_text("too late"))])
            .with_delay(Duration::from_millis(250)),
    );
    let router = router_with(adapter.clone(), Arc::new(ToolRegistry::new()));

    let session = router.create_session(None, None).unwrap();
    let err = router
        .send_with_timeout(
            &session,
            Turn::user_text("hi"),
            None,
            Duration::from_millis(20),
        )
        .await
        .unwrap_err();

    match err {
        RouterError::Provider(ProviderError::Transport { kind, .. }) => {
            assert_eq!(kind, TransportKind::Timeout)
        }
        other => panic!("expected timeout transport fault, got {:?}", other),
    }

    // The abandoned iteration appended no assistant turn.
    let history = router.session_history(&session).await.unwrap();
    assert_eq!(history, vec![Turn::user_text("hi")]);
}

#[tokio::test]
async fn sessions_are_isolated_from_each_other() {
    let adapter = Arc::new(MockAdapter::new(
        "mock",
        vec![
            Ok(Turn::assistant_text("for a")),
            Ok(Turn::assistant_text("for b")),
        ],
    ));
    let router = router_with(adapter.clone(), Arc::new(ToolRegistry::new()));

    let a = router.create_session(None, None).unwrap();
    let b = router.create_session(None, None).unwrap();

    router.send(&a, Turn::user_text("from a"), None).await.unwrap();
    router.send(&b, Turn::user_text("from b"), None).await.unwrap();

    assert_eq!(router.session_history(&a).await.unwrap().len(), 2);
    assert_eq!(router.session_history(&b).await.unwrap().len(), 2);
    assert_eq!(
        router.session_history(&b).await.unwrap()[0],
        Turn::user_text("from b")
    );
}
