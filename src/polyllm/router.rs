//! The routing core: owns the adapter table, the tool registry, and every
//! live session, and drives the dispatch loop that turns one user turn into
//! one final assistant turn.
//!
//! Each session is guarded by its own `tokio::sync::Mutex`, so concurrent
//! `send` calls against the same session serialize while different sessions
//! proceed in parallel. Appends to a session happen only after a dispatch
//! iteration (network round trip plus tool execution) has fully completed,
//! so a call that times out or is cancelled mid-iteration leaves the
//! transcript exactly as it was.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use uuid::Uuid;

use crate::polyllm::chat_session::ChatSession;
use crate::polyllm::config::{ProviderKind, RouterConfig};
use crate::polyllm::error::{ProviderError, RouterError, TransportKind};
use crate::polyllm::message::{ContentBlock, Role, Turn};
use crate::polyllm::provider::{Capabilities, ProviderAdapter};
use crate::polyllm::providers::{GeminiAdapter, OllamaAdapter, OpenAiAdapter};
use crate::polyllm::tool_registry::{ToolRegistry, ToolSpec};

/// Handle identifying one live session.
pub type SessionId = String;

pub struct Router {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
    /// Providers whose config failed validation, with the reason. Kept so
    /// callers get a precise error instead of "unknown provider".
    disabled: HashMap<String, String>,
    default_provider: String,
    registry: Arc<ToolRegistry>,
    sessions: Mutex<HashMap<SessionId, Arc<tokio::sync::Mutex<ChatSession>>>>,
    system_prompt: Option<String>,
    max_tool_iterations: usize,
    retry_attempts: usize,
    retry_base_delay: Duration,
}

impl Router {
    /// Build a router from a config document.
    ///
    /// A missing or invalid default provider is fatal. Any other provider
    /// entry that fails validation is disabled rather than aborting startup,
    /// and selecting it later yields
    /// [`RouterError::ProviderUnavailable`].
    pub fn from_config(
        config: RouterConfig,
        registry: Arc<ToolRegistry>,
    ) -> Result<Self, RouterError> {
        config.validate().map_err(RouterError::InvalidConfig)?;

        let mut adapters: HashMap<String, Arc<dyn ProviderAdapter>> = HashMap::new();
        let mut disabled = HashMap::new();

        for (id, provider) in &config.providers {
            if let Err(reason) = provider.validate() {
                log::warn!("provider '{}' disabled: {}", id, reason);
                disabled.insert(id.clone(), reason);
                continue;
            }
            let adapter: Arc<dyn ProviderAdapter> = match provider.kind {
                ProviderKind::Gemini => Arc::new(GeminiAdapter::from_config(id, provider)),
                ProviderKind::Openai => Arc::new(OpenAiAdapter::from_config(id, provider)),
                ProviderKind::Ollama => Arc::new(OllamaAdapter::from_config(id, provider)),
            };
            adapters.insert(id.clone(), adapter);
        }

        Ok(Router {
            adapters,
            disabled,
            default_provider: config.default_provider,
            registry,
            sessions: Mutex::new(HashMap::new()),
            system_prompt: config.system_prompt,
            max_tool_iterations: config.max_tool_iterations,
            retry_attempts: config.retry_attempts,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
        })
    }

    /// Build a router around pre-constructed adapters. This is the seam for
    /// embedding custom backends (and for tests).
    pub fn with_adapters(
        default_provider: impl Into<String>,
        adapters: Vec<Arc<dyn ProviderAdapter>>,
        registry: Arc<ToolRegistry>,
    ) -> Result<Self, RouterError> {
        let default_provider = default_provider.into();
        let adapters: HashMap<String, Arc<dyn ProviderAdapter>> = adapters
            .into_iter()
            .map(|a| (a.id().to_string(), a))
            .collect();
        if !adapters.contains_key(&default_provider) {
            return Err(RouterError::InvalidConfig(format!(
                "default provider '{}' has no adapter",
                default_provider
            )));
        }
        Ok(Router {
            adapters,
            disabled: HashMap::new(),
            default_provider,
            registry,
            sessions: Mutex::new(HashMap::new()),
            system_prompt: None,
            max_tool_iterations: 5,
            retry_attempts: 3,
            retry_base_delay: Duration::from_millis(200),
        })
    }

    /// Override the default system prompt applied to new sessions.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Override the tool-loop iteration budget.
    pub fn with_max_tool_iterations(mut self, iterations: usize) -> Self {
        self.max_tool_iterations = iterations;
        self
    }

    /// Override the transport retry policy.
    pub fn with_retry_policy(mut self, attempts: usize, base_delay: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_base_delay = base_delay;
        self
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    /// Switch the default provider for subsequently created sessions.
    /// Sessions already bound to another provider are unaffected.
    ///
    /// Rejects ids with no adapter ([`RouterError::UnknownProvider`]) or a
    /// failed config ([`RouterError::ProviderUnavailable`]).
    pub fn select_provider(&mut self, id: &str) -> Result<(), RouterError> {
        self.select_adapter(id)?;
        self.default_provider = id.to_string();
        Ok(())
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    fn select_adapter(&self, id: &str) -> Result<Arc<dyn ProviderAdapter>, RouterError> {
        if let Some(adapter) = self.adapters.get(id) {
            return Ok(Arc::clone(adapter));
        }
        if let Some(reason) = self.disabled.get(id) {
            return Err(RouterError::ProviderUnavailable {
                provider: id.to_string(),
                reason: reason.clone(),
            });
        }
        Err(RouterError::UnknownProvider(id.to_string()))
    }

    /// Open a session bound to `provider_id` (or the default provider).
    ///
    /// `system_prompt` overrides the router-level prompt for this session;
    /// `None` inherits it.
    pub fn create_session(
        &self,
        provider_id: Option<&str>,
        system_prompt: Option<&str>,
    ) -> Result<SessionId, RouterError> {
        let provider_id = provider_id.unwrap_or(&self.default_provider);
        // Fail now rather than on the first send.
        self.select_adapter(provider_id)?;

        let prompt = system_prompt.or(self.system_prompt.as_deref());
        let session = ChatSession::new(provider_id, prompt);

        let id = Uuid::new_v4().to_string();
        let mut sessions = self.sessions.lock().unwrap();
        sessions.insert(id.clone(), Arc::new(tokio::sync::Mutex::new(session)));
        log::info!("session {} opened on provider '{}'", id, provider_id);
        Ok(id)
    }

    /// Drop a session and its transcript.
    pub fn close_session(&self, session_id: &str) -> Result<(), RouterError> {
        let mut sessions = self.sessions.lock().unwrap();
        match sessions.remove(session_id) {
            Some(_) => {
                log::info!("session {} closed", session_id);
                Ok(())
            }
            None => Err(RouterError::UnknownSession(session_id.to_string())),
        }
    }

    /// Snapshot a session's transcript, oldest turn first.
    pub async fn session_history(&self, session_id: &str) -> Result<Vec<Turn>, RouterError> {
        let session = self.lookup_session(session_id)?;
        let guard = session.lock().await;
        Ok(guard.history().to_vec())
    }

    fn lookup_session(
        &self,
        session_id: &str,
    ) -> Result<Arc<tokio::sync::Mutex<ChatSession>>, RouterError> {
        let sessions = self.sessions.lock().unwrap();
        sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| RouterError::UnknownSession(session_id.to_string()))
    }

    /// Append `turn` to the session and drive the dispatch loop until the
    /// model produces a turn with no tool calls, which is returned as the
    /// final answer.
    ///
    /// `tags` selects which tagged tools are advertised for this call;
    /// untagged tools are always advertised. Tool execution failures never
    /// abort the loop: they are fed back as error-flagged results so the
    /// model can recover.
    pub async fn send(
        &self,
        session_id: &str,
        turn: Turn,
        tags: Option<&[String]>,
    ) -> Result<Turn, RouterError> {
        let session = self.lookup_session(session_id)?;
        let mut session = session.lock().await;

        let adapter = self.select_adapter(session.provider_id())?;
        let caps = adapter.capabilities();

        let tools: Vec<ToolSpec> = if caps.supports_tool_calls {
            self.registry.schemas_for(tags).collect()
        } else {
            Vec::new()
        };

        session.append(turn)?;

        for iteration in 0..self.max_tool_iterations {
            let view = prepare_history(session.history(), &caps);
            let assistant = self.call_with_retry(&adapter, &view, &tools).await?;

            if !assistant.has_tool_calls() {
                session.append(assistant.clone())?;
                return Ok(assistant);
            }

            log::debug!(
                "session iteration {}: {} tool call(s) from '{}'",
                iteration,
                assistant.tool_calls().len(),
                adapter.id()
            );

            let mut results = Vec::new();
            for block in assistant.tool_calls() {
                if let ContentBlock::ToolCall {
                    call_id,
                    tool_name,
                    arguments,
                } = block
                {
                    results.push(self.registry.invoke(call_id, tool_name, arguments).await);
                }
            }
            let tool_turn = Turn::tool_results(results)?;

            // Stage both turns only now that the whole iteration succeeded.
            session.append(assistant)?;
            session.append(tool_turn)?;
        }

        Err(RouterError::ToolLoopExceeded {
            provider: adapter.id().to_string(),
            iterations: self.max_tool_iterations,
        })
    }

    /// Like [`send`](Router::send) but bounded by a caller deadline. On
    /// expiry the in-flight iteration is abandoned without touching the
    /// transcript and the error is a timeout-kind transport fault.
    pub async fn send_with_timeout(
        &self,
        session_id: &str,
        turn: Turn,
        tags: Option<&[String]>,
        deadline: Duration,
    ) -> Result<Turn, RouterError> {
        let provider = {
            let session = self.lookup_session(session_id)?;
            let guard = session.lock().await;
            guard.provider_id().to_string()
        };

        match tokio::time::timeout(deadline, self.send(session_id, turn, tags)).await {
            Ok(result) => result,
            Err(_) => Err(RouterError::Provider(ProviderError::Transport {
                provider,
                kind: TransportKind::Timeout,
                message: format!("send exceeded deadline of {:?}", deadline),
            })),
        }
    }

    async fn call_with_retry(
        &self,
        adapter: &Arc<dyn ProviderAdapter>,
        history: &[Turn],
        tools: &[ToolSpec],
    ) -> Result<Turn, ProviderError> {
        let mut delay = self.retry_base_delay;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match adapter.call(history, tools).await {
                Ok(turn) => return Ok(turn),
                Err(err) if err.is_retryable() && attempt < self.retry_attempts => {
                    log::warn!(
                        "provider '{}' attempt {}/{} failed, retrying in {:?}: {}",
                        adapter.id(),
                        attempt,
                        self.retry_attempts,
                        delay,
                        err
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Build the history view actually sent to a provider: images downgraded to
/// text placeholders when unsupported, and the transcript truncated to the
/// provider's context window, always keeping the leading system turn.
fn prepare_history(history: &[Turn], caps: &Capabilities) -> Vec<Turn> {
    let mut view: Vec<Turn> = if caps.supports_images {
        history.to_vec()
    } else {
        history
            .iter()
            .map(|turn| Turn {
                role: turn.role,
                content: turn
                    .content
                    .iter()
                    .map(|block| match block {
                        ContentBlock::Image { mime_type, .. } => {
                            ContentBlock::text(format!("[image omitted: {}]", mime_type))
                        }
                        other => other.clone(),
                    })
                    .collect(),
            })
            .collect()
    };

    if view.len() > caps.max_context_turns {
        let system = match view.first() {
            Some(t) if t.role == Role::System => Some(view.remove(0)),
            _ => None,
        };
        let budget = caps
            .max_context_turns
            .saturating_sub(system.is_some() as usize);
        let mut start = view.len().saturating_sub(budget);
        // A tool-result turn whose matching tool-call turn fell outside the
        // window is protocol-invalid on every wire format; drop such
        // orphans so the view never starts inside a tool exchange.
        while start < view.len() && view[start].role == Role::Tool {
            start += 1;
        }
        view.drain(..start);
        if let Some(system) = system {
            view.insert(0, system);
        }
    }

    view
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polyllm::config::ProviderConfig;
    use crate::polyllm::message::ImageData;
    use std::collections::HashMap as StdHashMap;

    fn test_config() -> RouterConfig {
        let mut providers = StdHashMap::new();
        providers.insert(
            "local".to_string(),
            ProviderConfig {
                kind: ProviderKind::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                max_tokens: 2048,
                temperature: 0.2,
                extra: StdHashMap::new(),
            },
        );
        providers.insert(
            "hosted".to_string(),
            ProviderConfig {
                kind: ProviderKind::Openai,
                api_key: None, // invalid on purpose
                base_url: None,
                model: "gpt-4o".to_string(),
                max_tokens: 2048,
                temperature: 0.2,
                extra: StdHashMap::new(),
            },
        );
        RouterConfig {
            default_provider: "local".to_string(),
            providers,
            system_prompt: Some("Be terse.".to_string()),
            max_tool_iterations: 5,
            retry_attempts: 3,
            retry_base_delay_ms: 10,
        }
    }

    #[test]
    fn invalid_non_default_provider_is_disabled_not_fatal() {
        let mut router =
            Router::from_config(test_config(), Arc::new(ToolRegistry::new())).unwrap();
        match router.select_provider("hosted") {
            Err(RouterError::ProviderUnavailable { provider, .. }) => {
                assert_eq!(provider, "hosted")
            }
            other => panic!("expected ProviderUnavailable, got {:?}", other),
        }
        // A failed selection leaves the default untouched.
        assert_eq!(router.default_provider(), "local");

        assert!(router.select_provider("local").is_ok());
        assert!(matches!(
            router.select_provider("nope"),
            Err(RouterError::UnknownProvider(_))
        ));
    }

    #[tokio::test]
    async fn sessions_inherit_and_override_the_system_prompt() {
        let router = Router::from_config(test_config(), Arc::new(ToolRegistry::new())).unwrap();

        let inherited = router.create_session(None, None).unwrap();
        let history = router.session_history(&inherited).await.unwrap();
        assert_eq!(history[0], Turn::system("Be terse."));

        let overridden = router.create_session(None, Some("Answer in German.")).unwrap();
        let history = router.session_history(&overridden).await.unwrap();
        assert_eq!(history[0], Turn::system("Answer in German."));
    }

    #[test]
    fn closing_an_unknown_session_errors() {
        let router = Router::from_config(test_config(), Arc::new(ToolRegistry::new())).unwrap();
        let id = router.create_session(None, None).unwrap();
        assert!(router.close_session(&id).is_ok());
        assert!(matches!(
            router.close_session(&id),
            Err(RouterError::UnknownSession(_))
        ));
    }

    #[test]
    fn create_session_rejects_disabled_provider() {
        let router = Router::from_config(test_config(), Arc::new(ToolRegistry::new())).unwrap();
        assert!(matches!(
            router.create_session(Some("hosted"), None),
            Err(RouterError::ProviderUnavailable { .. })
        ));
    }

    #[test]
    fn prepare_history_downgrades_images_for_text_only_providers() {
        let caps = Capabilities {
            supports_tool_calls: true,
            supports_images: false,
            max_context_turns: 64,
        };
        let history = vec![Turn::user_with_image(
            "what is this?",
            "image/png",
            ImageData::Bytes(vec![1, 2, 3]),
        )];
        let view = prepare_history(&history, &caps);
        assert_eq!(
            view[0].content[1],
            ContentBlock::text("[image omitted: image/png]")
        );
    }

    #[test]
    fn prepare_history_drops_tool_results_orphaned_by_truncation() {
        let caps = Capabilities {
            supports_tool_calls: true,
            supports_images: true,
            max_context_turns: 3,
        };
        let call = Turn::new(
            Role::Assistant,
            vec![ContentBlock::ToolCall {
                call_id: "call_0".to_string(),
                tool_name: "lookup".to_string(),
                arguments: serde_json::Map::new(),
            }],
        )
        .unwrap();
        let result = Turn::tool_results(vec![ContentBlock::ToolResult {
            call_id: "call_0".to_string(),
            tool_name: "lookup".to_string(),
            result: serde_json::json!("ok"),
            is_error: false,
        }])
        .unwrap();
        let history = vec![
            Turn::user_text("q0"),
            call,
            result,
            Turn::user_text("q1"),
            Turn::assistant_text("a1"),
        ];

        // A plain 3-turn tail would begin with the tool-result turn whose
        // matching call was dropped; the orphan goes too.
        let view = prepare_history(&history, &caps);
        assert_eq!(view.len(), 2);
        assert_eq!(view[0], Turn::user_text("q1"));
        assert_eq!(view[1], Turn::assistant_text("a1"));
    }

    #[test]
    fn prepare_history_honors_the_cap_even_with_a_system_turn() {
        let caps = Capabilities {
            supports_tool_calls: true,
            supports_images: true,
            max_context_turns: 1,
        };
        let history = vec![
            Turn::system("Be terse."),
            Turn::user_text("q0"),
            Turn::assistant_text("a0"),
        ];
        let view = prepare_history(&history, &caps);
        assert_eq!(view, vec![Turn::system("Be terse.")]);
    }

    #[test]
    fn prepare_history_truncates_but_keeps_the_system_turn() {
        let caps = Capabilities {
            supports_tool_calls: true,
            supports_images: true,
            max_context_turns: 4,
        };
        let mut history = vec![Turn::system("Be terse.")];
        for i in 0..10 {
            history.push(Turn::user_text(format!("q{}", i)));
            history.push(Turn::assistant_text(format!("a{}", i)));
        }
        let view = prepare_history(&history, &caps);
        assert_eq!(view.len(), 4);
        assert_eq!(view[0], Turn::system("Be terse."));
        assert_eq!(view[3], Turn::assistant_text("a9"));
    }
}
