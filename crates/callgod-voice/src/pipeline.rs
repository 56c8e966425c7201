//! Wiring: one process-scoped store and coordinator shared by every component.

use crate::artifact::ArtifactStore;
use crate::attention::AttentionMachine;
use crate::config::{Credentials, VoiceConfig};
use crate::coordinator::Coordinator;
use crate::error::{VoiceError, VoiceResult};
use crate::language::{LanguageBackend, LanguageClient, OpenAiChat};
use crate::preload::Preloader;
use crate::router::{IntentClassifier, TurnRequest, TurnResponse, TurnRouter};
use crate::speech::{ElevenLabsTts, SpeechBackend, SpeechClient};
use crate::store::SessionStore;
use crate::voice::VoiceProfileManager;
use std::sync::Arc;
use tracing::info;

pub struct Pipeline {
    config: VoiceConfig,
    store: Arc<SessionStore>,
    artifacts: Arc<ArtifactStore>,
    coordinator: Arc<Coordinator>,
    speech: Arc<SpeechClient>,
    voices: Arc<VoiceProfileManager>,
    attention: Arc<AttentionMachine>,
    router: TurnRouter,
    preloader: Preloader,
}

impl Pipeline {
    /// Build against the real providers.
    pub fn connect(config: VoiceConfig, credentials: &Credentials) -> VoiceResult<Self> {
        let language = OpenAiChat::new(credentials.openai_api_key.clone(), &config.language)?;
        let speech = ElevenLabsTts::new(credentials.elevenlabs_api_key.clone(), &config.speech)?;
        Self::build(config, Arc::new(language), Arc::new(speech))
    }

    /// Build with explicit backends.
    pub fn build(
        config: VoiceConfig,
        language_backend: Arc<dyn LanguageBackend>,
        speech_backend: Arc<dyn SpeechBackend>,
    ) -> VoiceResult<Self> {
        config.validate()?;
        let initial_voice = config
            .voices
            .default_profile()
            .ok_or_else(|| VoiceError::Config("at least one voice must be configured".into()))?;

        let store = Arc::new(SessionStore::new(initial_voice.clone(), config.cache_capacity));
        let artifacts = Arc::new(ArtifactStore::open(&config.cache_dir)?);
        let coordinator = Arc::new(Coordinator::new(config.coordinator));

        let language = Arc::new(LanguageClient::new(
            language_backend,
            Arc::clone(&store),
            Arc::clone(&coordinator),
            config.language.clone(),
        ));
        let speech = Arc::new(SpeechClient::new(
            speech_backend,
            Arc::clone(&store),
            Arc::clone(&artifacts),
            Arc::clone(&coordinator),
            config.speech.clone(),
        ));
        let voices = Arc::new(VoiceProfileManager::new(
            config.voices.clone(),
            Arc::clone(&store),
            Arc::clone(&artifacts),
            Arc::clone(&speech),
        ));
        let attention = Arc::new(AttentionMachine::new(config.attention.clone()));

        let router = TurnRouter::new(
            IntentClassifier::new(config.routing.clone(), config.voices.clone()),
            config.phrases.clone(),
            Arc::clone(&voices),
            Arc::clone(&language),
            Arc::clone(&speech),
            Arc::clone(&attention),
            Arc::clone(&coordinator),
        );
        let preloader = Preloader::new(
            Arc::clone(&speech),
            Arc::clone(&coordinator),
            config.phrases.clone(),
            config.language.apology.clone(),
        );

        info!(
            target: "callgod::pipeline",
            voice = %initial_voice.display_name,
            cache_dir = %artifacts.dir().display(),
            workers = coordinator.config().workers,
            "pipeline ready"
        );

        Ok(Self {
            config,
            store,
            artifacts,
            coordinator,
            speech,
            voices,
            attention,
            router,
            preloader,
        })
    }

    /// Process one turn from the gateway.
    pub async fn handle_turn(&self, request: TurnRequest) -> VoiceResult<TurnResponse> {
        self.router.handle(request).await
    }

    pub fn config(&self) -> &VoiceConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn artifacts(&self) -> &Arc<ArtifactStore> {
        &self.artifacts
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn speech(&self) -> &Arc<SpeechClient> {
        &self.speech
    }

    pub fn voices(&self) -> &Arc<VoiceProfileManager> {
        &self.voices
    }

    pub fn attention(&self) -> &Arc<AttentionMachine> {
        &self.attention
    }

    pub fn router(&self) -> &TurnRouter {
        &self.router
    }

    pub fn preloader(&self) -> &Preloader {
        &self.preloader
    }
}
