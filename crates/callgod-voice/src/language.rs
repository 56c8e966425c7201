//! Language response client: prompt → short persona reply.
//!
//! Replies are cached by normalized prompt. Any remote failure (timeout, transport,
//! non-success status, empty or malformed body) degrades to a fixed apology line that is
//! never cached, so the caller always gets text back.

use crate::cache::CacheKey;
use crate::coordinator::Coordinator;
use crate::error::{VoiceError, VoiceResult};
use crate::store::SessionStore;
use crate::text::truncate_chars;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Persona instruction, model and sampling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageSettings {
    /// OpenAI-compatible base URL (`…/v1`).
    pub api_url: String,
    pub model: String,
    pub system_prompt: String,
    /// User prompt is cut to this many characters before sending.
    pub max_prompt_chars: usize,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Spoken in place of a reply when the provider fails.
    pub apology: String,
}

impl Default for LanguageSettings {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            system_prompt: "You are a sarcastic and humorous version of God. Always respond with very short, witty, and punchy one-liners. No more than 10 words, prioritizing sarcasm and humor over depth.".to_string(),
            max_prompt_chars: 100,
            max_tokens: 25,
            temperature: 0.7,
            timeout_secs: 15,
            apology: "I'm having trouble connecting to divine wisdom right now.".to_string(),
        }
    }
}

impl LanguageSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// One completion call as the backend sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Remote provider of reply text.
#[async_trait]
pub trait LanguageBackend: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> VoiceResult<String>;
}

// OpenAI chat completions wire format
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

/// OpenAI chat completions backend.
pub struct OpenAiChat {
    api_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiChat {
    pub fn new(api_key: impl Into<String>, settings: &LanguageSettings) -> VoiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| VoiceError::Config(format!("language client build failed: {}", e)))?;
        Ok(Self {
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            api_key: api_key.into().trim().to_string(),
            model: settings.model.clone(),
            client,
        })
    }

    fn remote(reason: impl ToString) -> VoiceError {
        VoiceError::TransientRemote {
            service: "language",
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl LanguageBackend for OpenAiChat {
    async fn complete(&self, request: &CompletionRequest) -> VoiceResult<String> {
        let url = format!("{}/chat/completions", self.api_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let res = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(Self::remote)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(Self::remote(format!("API error {}: {}", status, text)));
        }

        let data: ChatResponse = res.json().await.map_err(Self::remote)?;
        let content = data
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(Self::remote("empty completion"));
        }
        Ok(content)
    }
}

pub struct LanguageClient {
    backend: Arc<dyn LanguageBackend>,
    store: Arc<SessionStore>,
    coordinator: Arc<Coordinator>,
    settings: LanguageSettings,
}

impl LanguageClient {
    pub fn new(
        backend: Arc<dyn LanguageBackend>,
        store: Arc<SessionStore>,
        coordinator: Arc<Coordinator>,
        settings: LanguageSettings,
    ) -> Self {
        Self {
            backend,
            store,
            coordinator,
            settings,
        }
    }

    pub fn apology(&self) -> &str {
        &self.settings.apology
    }

    /// Reply text for `prompt`. With `bypass_cache` the language cache is neither read nor written.
    pub async fn resolve(&self, prompt: &str, bypass_cache: bool) -> String {
        let key = CacheKey::for_prompt(prompt);
        let cache = self.store.language_cache();
        if !bypass_cache {
            if let Some(hit) = cache.get(&key) {
                debug!(target: "callgod::language", key = %key, "language cache hit");
                return hit;
            }
        }

        let request = CompletionRequest {
            system: self.settings.system_prompt.clone(),
            user: truncate_chars(prompt, self.settings.max_prompt_chars).to_string(),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        let started = Instant::now();
        let outcome = self
            .coordinator
            .run("language", self.settings.timeout(), self.backend.complete(&request))
            .await
            .and_then(|r| r);

        match outcome {
            Ok(reply) => {
                info!(
                    target: "callgod::language",
                    latency_ms = started.elapsed().as_millis() as u64,
                    bypass_cache,
                    "language reply received"
                );
                if !bypass_cache {
                    cache.put(key, reply.clone());
                }
                reply
            }
            Err(e) => {
                warn!(target: "callgod::language", "language call failed, using apology: {}", e);
                self.settings.apology.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::CoordinatorConfig;
    use crate::voice::VoiceProfile;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<CompletionRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl LanguageBackend for Recorder {
        async fn complete(&self, request: &CompletionRequest) -> VoiceResult<String> {
            self.seen.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(VoiceError::TransientRemote {
                    service: "language",
                    reason: "503".into(),
                });
            }
            Ok(format!("reply to {}", request.user))
        }
    }

    fn client(backend: Arc<Recorder>) -> LanguageClient {
        let store = Arc::new(SessionStore::new(
            VoiceProfile {
                id: "v".into(),
                display_name: "Nikki".into(),
            },
            10,
        ));
        LanguageClient::new(
            backend,
            store,
            Arc::new(Coordinator::new(CoordinatorConfig::default())),
            LanguageSettings::default(),
        )
    }

    #[tokio::test]
    async fn prompt_is_truncated_and_persona_attached() {
        let backend = Arc::new(Recorder::default());
        let lang = client(Arc::clone(&backend));
        let long = "a".repeat(250);
        lang.resolve(&long, false).await;

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].user.chars().count(), 100);
        assert!(seen[0].system.contains("sarcastic"));
        assert_eq!(seen[0].max_tokens, 25);
    }

    #[tokio::test]
    async fn cached_reply_skips_the_backend() {
        let backend = Arc::new(Recorder::default());
        let lang = client(Arc::clone(&backend));
        let first = lang.resolve("who are you", false).await;
        let second = lang.resolve("  Who are you ", false).await;
        assert_eq!(first, second);
        assert_eq!(backend.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failure_returns_apology_and_caches_nothing() {
        let backend = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let lang = client(backend);
        let reply = lang.resolve("anything", false).await;
        assert_eq!(reply, LanguageSettings::default().apology);
        assert!(lang.store.language_cache().is_empty());
    }
}
