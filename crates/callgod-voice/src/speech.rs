//! **Speech synthesis**: text + voice → audio artifact on disk.
//!
//! Audio is streamed from the provider into a per-writer partial file in bounded chunks and
//! renamed into place only when the stream completes, so a failed or timed-out synthesis never
//! leaves a file that a cache hit could trust. Lookups go through the response cache first.

use crate::artifact::{ArtifactStore, AudioRef, PartialArtifact, Reserved};
use crate::cache::CacheKey;
use crate::coordinator::Coordinator;
use crate::error::{SynthesisError, VoiceError, VoiceResult};
use crate::store::SessionStore;
use crate::voice::VoiceProfile;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Audio bytes as they arrive from the provider.
pub type AudioStream = BoxStream<'static, Result<Bytes, SynthesisError>>;

/// Provider that turns text into a stream of encoded audio (MP3).
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    async fn stream(&self, text: &str, voice: &VoiceProfile) -> Result<AudioStream, SynthesisError>;
}

/// Tuning for synthesis requests and artifact writes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechSettings {
    /// Provider base URL without trailing slash.
    pub api_url: String,
    pub stability: f32,
    pub similarity_boost: f32,
    /// Provider latency optimisation level (0–4).
    pub optimize_streaming_latency: u8,
    /// Largest write issued to the artifact file.
    pub chunk_size: usize,
    pub timeout_secs: u64,
    /// Local player command for on-device monitoring (e.g. `mpg123 -q`). `None` serves remotely only.
    pub monitor_player: Option<String>,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            api_url: "https://api.elevenlabs.io".to_string(),
            stability: 0.3,
            similarity_boost: 0.4,
            optimize_streaming_latency: 3,
            chunk_size: 512,
            timeout_secs: 15,
            monitor_player: None,
        }
    }
}

impl SpeechSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// ElevenLabs streaming TTS.
#[derive(Debug, Clone)]
pub struct ElevenLabsTts {
    base_url: String,
    api_key: String,
    stability: f32,
    similarity_boost: f32,
    optimize_streaming_latency: u8,
    client: reqwest::Client,
}

impl ElevenLabsTts {
    pub fn new(api_key: impl Into<String>, settings: &SpeechSettings) -> VoiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| VoiceError::Config(format!("TTS client build failed: {}", e)))?;
        Ok(Self {
            base_url: settings.api_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            stability: settings.stability,
            similarity_boost: settings.similarity_boost,
            optimize_streaming_latency: settings.optimize_streaming_latency,
            client,
        })
    }
}

#[async_trait]
impl SpeechBackend for ElevenLabsTts {
    async fn stream(&self, text: &str, voice: &VoiceProfile) -> Result<AudioStream, SynthesisError> {
        let url = format!(
            "{}/v1/text-to-speech/{}/stream?optimize_streaming_latency={}",
            self.base_url, voice.id, self.optimize_streaming_latency
        );
        let body = serde_json::json!({
            "text": text,
            "voice_settings": {
                "stability": self.stability,
                "similarity_boost": self.similarity_boost,
            },
        });
        let res = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(SynthesisError::Status { status, body });
        }
        Ok(res
            .bytes_stream()
            .map(|chunk| chunk.map_err(SynthesisError::from))
            .boxed())
    }
}

/// On-device monitor playback. At most one player process runs at a time.
pub struct LocalPlayback {
    player: Option<String>,
    child: Mutex<Option<Child>>,
}

impl LocalPlayback {
    pub fn new(player: Option<String>) -> Self {
        Self {
            player: player.filter(|p| !p.trim().is_empty()),
            child: Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.player.is_some()
    }

    /// Kill the running player, if any.
    pub async fn stop(&self) {
        let mut child = self.child.lock().await;
        if let Some(mut running) = child.take() {
            if let Err(e) = running.kill().await {
                debug!(target: "callgod::speech", "monitor player already exited: {}", e);
            }
        }
    }

    pub async fn play(&self, audio: &AudioRef) -> std::io::Result<()> {
        let Some(player) = self.player.as_deref() else {
            return Ok(());
        };
        let mut parts = player.split_whitespace();
        let Some(program) = parts.next() else {
            return Ok(());
        };
        self.stop().await;
        let spawned = Command::new(program)
            .args(parts)
            .arg(audio.path())
            .kill_on_drop(true)
            .spawn()?;
        *self.child.lock().await = Some(spawned);
        Ok(())
    }
}

pub struct SpeechClient {
    backend: Arc<dyn SpeechBackend>,
    store: Arc<SessionStore>,
    artifacts: Arc<ArtifactStore>,
    coordinator: Arc<Coordinator>,
    playback: LocalPlayback,
    settings: SpeechSettings,
}

impl SpeechClient {
    pub fn new(
        backend: Arc<dyn SpeechBackend>,
        store: Arc<SessionStore>,
        artifacts: Arc<ArtifactStore>,
        coordinator: Arc<Coordinator>,
        settings: SpeechSettings,
    ) -> Self {
        let playback = LocalPlayback::new(settings.monitor_player.clone());
        Self {
            backend,
            store,
            artifacts,
            coordinator,
            playback,
            settings,
        }
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Stream `text` spoken by `voice` into `destination`.
    pub async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceProfile,
        destination: &Path,
    ) -> Result<AudioRef, SynthesisError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SynthesisError::EmptyText);
        }
        if self.playback.is_enabled() {
            self.playback.stop().await;
        }

        let started = Instant::now();
        let write = self.stream_to_file(text, voice, destination);
        let audio = match self
            .coordinator
            .run("synthesis", self.settings.timeout(), write)
            .await
        {
            Ok(result) => result?,
            Err(VoiceError::Timeout { after, .. }) => return Err(SynthesisError::Timeout(after)),
            Err(e) => return Err(SynthesisError::Transport(e.to_string())),
        };

        info!(
            target: "callgod::speech",
            artifact = %audio.file_name(),
            voice = %voice.display_name,
            latency_ms = started.elapsed().as_millis() as u64,
            "TTS saved"
        );
        Ok(audio)
    }

    async fn stream_to_file(
        &self,
        text: &str,
        voice: &VoiceProfile,
        destination: &Path,
    ) -> Result<AudioRef, SynthesisError> {
        let mut stream = self.backend.stream(text, voice).await?;
        let (partial, mut file) = PartialArtifact::create(destination).await?;
        let chunk_size = self.settings.chunk_size.max(1);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for piece in chunk.chunks(chunk_size) {
                file.write_all(piece).await?;
            }
        }
        file.flush().await?;
        drop(file);
        Ok(partial.commit().await?)
    }

    /// Speak `text` in the active voice, reusing a cached artifact when allowed.
    pub async fn speak(&self, text: &str, bypass_cache: bool) -> Result<AudioRef, SynthesisError> {
        let voice = self.store.current_voice();
        self.speak_as(text, &voice, bypass_cache).await
    }

    /// Speak `text` in `voice`. A cache hit is trusted only if its artifact still exists;
    /// a dangling entry is dropped and the artifact regenerated under the same name.
    pub async fn speak_as(
        &self,
        text: &str,
        voice: &VoiceProfile,
        bypass_cache: bool,
    ) -> Result<AudioRef, SynthesisError> {
        let key = CacheKey::for_speech(text, &voice.id);
        let cache = self.store.response_cache();

        if !bypass_cache {
            if let Some(hit) = cache.get(&key) {
                if hit.is_live().await {
                    debug!(target: "callgod::speech", artifact = %hit.file_name(), "response cache hit");
                    return Ok(hit);
                }
                let stale = VoiceError::CacheInconsistency(hit.path().to_path_buf());
                warn!(target: "callgod::speech", "{}; regenerating", stale);
                cache.remove(&key);
            }
        }

        let target = self.artifacts.cached(&key);
        let audio = self.synthesize(text, voice, target.path()).await?;
        if !bypass_cache {
            cache.put(key, audio.clone());
        }
        if let Err(e) = self.playback.play(&audio).await {
            warn!(target: "callgod::speech", "monitor playback failed: {}", e);
        }
        Ok(audio)
    }

    /// Make sure a reserved artifact exists, synthesizing it in the active voice if missing.
    pub async fn ensure_reserved(&self, which: Reserved, text: &str) -> Result<AudioRef, SynthesisError> {
        let audio = self.artifacts.reserved(which);
        if audio.is_live().await {
            return Ok(audio);
        }
        let voice = self.store.current_voice();
        self.synthesize(text, &voice, audio.path()).await
    }
}
