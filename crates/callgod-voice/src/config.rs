//! Configuration for the callgod turn pipeline
//!
//! Layering (later wins): compiled defaults → TOML file → `CALLGOD__*` environment variables.
//! The TOML path comes from `CALLGOD_CONFIG` (default `config/callgod.toml`); a missing file
//! is not an error. Provider credentials are never read from the file, only from the
//! environment (see [`Credentials::from_env`]).

use crate::attention::AttentionConfig;
use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::coordinator::CoordinatorConfig;
use crate::error::{VoiceError, VoiceResult};
use crate::language::LanguageSettings;
use crate::router::RoutingConfig;
use crate::speech::SpeechSettings;
use crate::voice::VoiceCatalog;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Env var naming the TOML config file.
pub const CONFIG_PATH_ENV: &str = "CALLGOD_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/callgod.toml";
/// Prefix for per-key overrides, e.g. `CALLGOD__CACHE_CAPACITY=50` or `CALLGOD__SPEECH__TIMEOUT_SECS=10`.
pub const ENV_PREFIX: &str = "CALLGOD";

/// Fixed lines spoken by the reserved artifacts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Phrases {
    pub welcome: String,
    pub fallback: String,
    pub exit: String,
    /// Primed into the response cache at startup alongside the language apology.
    pub canned: Vec<String>,
}

impl Default for Phrases {
    fn default() -> Self {
        Self {
            welcome: "Welcome, my child! What divine wisdom do you seek today?".to_string(),
            fallback: "Sorry, I didn't catch that. Can you repeat?".to_string(),
            exit: "Goodbye, my child!".to_string(),
            canned: vec!["Oh, you're back. I was just starting to enjoy the peace and quiet.".to_string()],
        }
    }
}

/// Full pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Directory holding every audio artifact (default: `static/cached_responses`)
    pub cache_dir: PathBuf,
    /// Public URL prefix the gateway plays artifacts from (default: `http://localhost:5001/static`)
    pub public_base_url: String,
    /// Entries per cache, both language and response (default: 100)
    pub cache_capacity: usize,
    pub coordinator: CoordinatorConfig,
    pub language: LanguageSettings,
    pub speech: SpeechSettings,
    pub voices: VoiceCatalog,
    pub routing: RoutingConfig,
    pub attention: AttentionConfig,
    pub phrases: Phrases,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("static/cached_responses"),
            public_base_url: "http://localhost:5001/static".to_string(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            coordinator: CoordinatorConfig::default(),
            language: LanguageSettings::default(),
            speech: SpeechSettings::default(),
            voices: VoiceCatalog::default(),
            routing: RoutingConfig::default(),
            attention: AttentionConfig::default(),
            phrases: Phrases::default(),
        }
    }
}

impl VoiceConfig {
    /// Load from `CALLGOD_CONFIG` (or the default path) plus environment overrides.
    pub fn load() -> VoiceResult<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(path)
    }

    /// Load from an explicit TOML path plus environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> VoiceResult<Self> {
        let path = path.as_ref();
        let builder = config::Config::builder().add_source(config::Config::try_from(&VoiceConfig::default())?);
        let builder = if path.exists() {
            info!(target: "callgod::config", path = %path.display(), "loading config file");
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let loaded: VoiceConfig = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject configurations the pipeline cannot start with.
    pub fn validate(&self) -> VoiceResult<()> {
        if self.voices.is_empty() {
            return Err(VoiceError::Config("at least one voice must be configured".into()));
        }
        if let Some(entry) = self.voices.entries().iter().find(|v| v.id.trim().is_empty()) {
            return Err(VoiceError::Config(format!("voice '{}' has no provider id", entry.display_name)));
        }
        if self.cache_capacity == 0 {
            return Err(VoiceError::Config("cache_capacity must be at least 1".into()));
        }
        if self.coordinator.workers == 0 {
            return Err(VoiceError::Config("coordinator.workers must be at least 1".into()));
        }
        if self.routing.songs.is_empty() {
            return Err(VoiceError::Config("routing.songs must not be empty".into()));
        }
        if self.public_base_url.trim().is_empty() {
            return Err(VoiceError::Config("public_base_url must not be empty".into()));
        }
        Ok(())
    }
}

/// Provider API keys
#[derive(Clone)]
pub struct Credentials {
    pub openai_api_key: String,
    pub elevenlabs_api_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("openai_api_key", &"<redacted>")
            .field("elevenlabs_api_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Read `OPENAI_API_KEY` and `ELEVENLABS_API_KEY`. Either missing is a configuration failure.
    pub fn from_env() -> VoiceResult<Self> {
        Ok(Self {
            openai_api_key: required_env("OPENAI_API_KEY")?,
            elevenlabs_api_key: required_env("ELEVENLABS_API_KEY")?,
        })
    }
}

fn required_env(name: &str) -> VoiceResult<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(VoiceError::Config(format!("Missing {} environment variable.", name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = VoiceConfig::default();
        config.validate().unwrap();
        assert_eq!(config.cache_capacity, 100);
        assert_eq!(config.coordinator.workers, 4);
        assert_eq!(config.language.max_tokens, 25);
        assert_eq!(config.speech.chunk_size, 512);
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
cache_capacity = 7
public_base_url = "https://god.example.com/static"

[language]
model = "gpt-4o-mini"

[[routing.easter_eggs]]
phrase = "Are you there?"
reply = "Always. Unfortunately."
"#
        )
        .unwrap();

        let config = VoiceConfig::load_from(file.path()).unwrap();
        assert_eq!(config.cache_capacity, 7);
        assert_eq!(config.language.model, "gpt-4o-mini");
        assert_eq!(config.language.max_tokens, 25);
        assert_eq!(config.routing.easter_eggs.len(), 1);
        assert_eq!(config.routing.easter_eggs[0].phrase, "Are you there?");
        assert_eq!(config.voices.entries().len(), 2);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = VoiceConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.public_base_url, "http://localhost:5001/static");
    }

    #[test]
    fn empty_voice_catalog_is_rejected() {
        let config = VoiceConfig {
            voices: VoiceCatalog::new(Vec::new()),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(VoiceError::Config(_))));
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let creds = Credentials {
            openai_api_key: "sk-secret".into(),
            elevenlabs_api_key: "xi-secret".into(),
        };
        let shown = format!("{:?}", creds);
        assert!(!shown.contains("secret"));
    }
}
