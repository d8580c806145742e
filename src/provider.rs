use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::options::TranslationOptions;

/// Failure classes a provider implementation must distinguish. The
/// executor needs schema rejection separated from everything retryable.
#[derive(Debug)]
pub enum ProviderError {
    /// Structured-output mode is not available for the chosen model.
    SchemaUnsupported(String),
    /// Timeout, rate limit, 5xx. Worth retrying.
    Transient(String),
    /// Authentication or request errors a retry cannot fix.
    Fatal(String),
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::SchemaUnsupported(m) => write!(f, "schema unsupported: {m}"),
            ProviderError::Transient(m) => write!(f, "transient: {m}"),
            ProviderError::Fatal(m) => write!(f, "fatal: {m}"),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ChatRequest<'a> {
    pub system_prompt: &'a str,
    pub user_payload: &'a str,
    /// Ask for schema-guided JSON output. Providers that cannot honor
    /// it for the chosen model must fail with `SchemaUnsupported`, not
    /// silently ignore it.
    pub json_mode: bool,
}

/// The chat-completion capability the engine consumes. One blocking
/// request per call; implementations own their transport details.
pub trait ChatProvider: Send + Sync {
    fn chat_complete(&self, req: &ChatRequest<'_>) -> Result<String, ProviderError>;
}

/// OpenAI-compatible HTTP provider (`POST {base_url}/chat/completions`).
pub struct OpenAiProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    top_p: f32,
}

impl OpenAiProvider {
    pub fn new(options: &TranslationOptions) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: options.base_url.trim_end_matches('/').to_string(),
            api_key: options.api_key.clone(),
            model: options.model.clone(),
            temperature: options.temperature,
            top_p: options.top_p,
        })
    }
}

#[derive(Deserialize)]
struct CompletionReply {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

impl ChatProvider for OpenAiProvider {
    fn chat_complete(&self, req: &ChatRequest<'_>) -> Result<String, ProviderError> {
        let mut body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": req.system_prompt},
                {"role": "user", "content": req.user_payload},
            ],
            "temperature": self.temperature,
            "top_p": self.top_p,
        });
        if req.json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }

        let url = format!("{}/chat/completions", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    ProviderError::Transient(e.to_string())
                } else {
                    ProviderError::Fatal(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            let detail = format!("{status}: {}", truncate(&text, 300));
            if status.as_u16() == 429 || status.is_server_error() {
                return Err(ProviderError::Transient(detail));
            }
            // Models that predate response_format report it as an
            // invalid request parameter.
            if req.json_mode && text.contains("response_format") {
                return Err(ProviderError::SchemaUnsupported(detail));
            }
            return Err(ProviderError::Fatal(detail));
        }

        let reply: CompletionReply = resp
            .json()
            .map_err(|e| ProviderError::Transient(format!("malformed completion reply: {e}")))?;
        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(ProviderError::Transient("empty completion reply".to_string()));
        }
        Ok(content.trim().to_string())
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{cut}…")
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::{ChatProvider, ChatRequest, ProviderError};

    type Behavior =
        Box<dyn Fn(&ChatRequest<'_>, usize) -> Result<String, ProviderError> + Send + Sync>;

    /// Scripted in-process provider: the closure sees the request plus a
    /// zero-based call number and decides the outcome.
    pub struct FakeProvider {
        calls: AtomicUsize,
        behavior: Behavior,
    }

    impl FakeProvider {
        pub fn new(
            behavior: impl Fn(&ChatRequest<'_>, usize) -> Result<String, ProviderError>
                + Send
                + Sync
                + 'static,
        ) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                behavior: Box::new(behavior),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ChatProvider for FakeProvider {
        fn chat_complete(&self, req: &ChatRequest<'_>) -> Result<String, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            (self.behavior)(req, n)
        }
    }

    /// Keys of the payload object, in payload order.
    pub fn payload_keys(req: &ChatRequest<'_>) -> Vec<String> {
        let map: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(req.user_payload).expect("payload json");
        map.keys().cloned().collect()
    }

    /// Deterministic pseudo-translation: every value gets a `T:` prefix.
    pub fn echo_translation(req: &ChatRequest<'_>) -> String {
        let map: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(req.user_payload).expect("payload json");
        let out: serde_json::Map<String, serde_json::Value> = map
            .into_iter()
            .map(|(k, v)| {
                let text = v.as_str().unwrap_or_default();
                (k, serde_json::Value::String(format!("T:{text}")))
            })
            .collect();
        serde_json::Value::Object(out).to_string()
    }
}
