//! # Callgod Voice - Turn Processing for a Voice Line
//!
//! Receives the recognized text of one phone-call turn, decides how to answer, obtains or
//! synthesizes the spoken reply, and hands back a reference to a playable audio artifact.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Turn Router                              │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────────┐  │
//! │  │  Attention   │ → │    Intent    │ → │ greeting / fallback  │  │
//! │  │ (idle/wake)  │   │  Classifier  │   │ voice switch / song  │  │
//! │  └──────────────┘   └──────────────┘   │ easter egg / dynamic │  │
//! │                                        └──────────────────────┘  │
//! │         dynamic: ┌──────────────┐   ┌──────────────┐            │
//! │                  │   Language   │ → │    Speech    │ → artifact │
//! │                  │    Client    │   │    Client    │            │
//! │                  └──────┬───────┘   └──────┬───────┘            │
//! │                   Language Cache     Response Cache + artifacts  │
//! │                         └──── Coordinator (worker slots) ───┘     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All shared state (active voice, both caches) lives in one [`SessionStore`] owned by the
//! [`Pipeline`] and injected into the components.

pub mod artifact;
pub mod attention;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod language;
pub mod pipeline;
pub mod preload;
pub mod router;
pub mod speech;
pub mod store;
pub mod text;
pub mod turn;
pub mod voice;

pub use artifact::{ArtifactStore, AudioRef, Reserved};
pub use attention::{spawn_idle_watch, AttentionConfig, AttentionMachine, AttentionState, ChannelSource, SilentSource, UtteranceSource};
pub use cache::{BoundedCache, CacheKey, LanguageCache, ResponseCache};
pub use config::{Credentials, Phrases, VoiceConfig};
pub use coordinator::{Coordinator, CoordinatorConfig, CoordinatorStats};
pub use error::{SynthesisError, VoiceError, VoiceResult};
pub use language::{CompletionRequest, LanguageBackend, LanguageClient, LanguageSettings, OpenAiChat};
pub use pipeline::Pipeline;
pub use preload::{PreloadReport, Preloader};
pub use router::{CallStatus, Intent, IntentClassifier, ListenDirective, RoutingConfig, TurnRequest, TurnResponse, TurnRouter};
pub use speech::{AudioStream, ElevenLabsTts, SpeechBackend, SpeechClient, SpeechSettings};
pub use store::SessionStore;
pub use turn::{TurnCategory, TurnRecord};
pub use voice::{VoiceCatalog, VoiceEntry, VoiceProfile, VoiceProfileManager, VoiceSwitch};
