//! **Turn router**: one recognized utterance in, one playable artifact out.
//!
//! Classification runs in a fixed priority order, first match wins:
//!
//! 1. empty input on a just-connected call → welcome
//! 2. empty input otherwise → fallback
//! 3. a known voice name → voice switch + confirmation
//! 4. a song request → random line from the song pool
//! 5. exact easter-egg phrase → its canned reply
//! 6. anything else → dynamic turn (language reply, then speech)
//!
//! Every branch keeps the call listening. Failures inside a branch degrade to the reserved
//! fallback artifact, or to text the gateway speaks itself when that artifact does not exist
//! yet; the only error a caller sees is `CapacityExceeded`.

use crate::artifact::{AudioRef, Reserved};
use crate::attention::AttentionMachine;
use crate::config::Phrases;
use crate::coordinator::Coordinator;
use crate::error::VoiceResult;
use crate::language::LanguageClient;
use crate::speech::SpeechClient;
use crate::text::{contains_any, normalize_input};
use crate::turn::{TurnCategory, TurnRecord};
use crate::voice::{VoiceCatalog, VoiceProfileManager};
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Call progress as reported by the telephony gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    JustConnected,
    InProgress,
}

impl CallStatus {
    /// Map the gateway's `CallStatus` field. `ringing` and `just-connected` both mean the
    /// caller has not said anything yet.
    pub fn from_gateway(status: Option<&str>) -> Self {
        match status.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("ringing") | Some("just-connected") | Some("just_connected") => CallStatus::JustConnected,
            _ => CallStatus::InProgress,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EasterEgg {
    pub phrase: String,
    pub reply: String,
}

/// Fixed bits and keyword lists used for classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Any of these (whole words) forces a fresh reply that skips both caches.
    pub freshness_keywords: Vec<String>,
    /// Any of these (whole words) is a song request.
    pub song_triggers: Vec<String>,
    pub songs: Vec<String>,
    /// Matched against the whole normalized input.
    pub easter_eggs: Vec<EasterEgg>,
    /// Listen window after greeting/fallback (default: 2s)
    pub greeting_listen_secs: u64,
    /// Listen window after every other turn (default: 3s)
    pub listen_secs: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        let songs = [
            "I'm no Adele, but here goes... Let it gooo, let it gooo!",
            "You want a song? Fine. Twinkle, twinkle, little star, I wish you'd make this conversation less bizarre.",
            "Do re mi fa so... I think that's enough for free entertainment.",
            "La la la... okay, that's it, my vocal cords are unionized.",
            "If I were a pop star, you'd already owe me royalties. Lucky for you, I work pro bono.",
            "Here's my Grammy performance: Happy birthday to you, now go find someone who cares!",
            "Do you hear that? That's the sound of me pretending to be Beyoncé. You're welcome.",
            "I could sing 'Baby Shark,' but I don't hate you that much.",
            "Here's a classic: 'This is the song that never ends...' Wait, you don't want me to finish it?",
            "Singing in the rain... oh wait, I'm not waterproof. Moving on.",
            "And IIIIIII will always love... myself. Because no one does it better.",
            "They told me I'd sing like Sinatra... they lied, but I'm still better than karaoke night.",
        ];
        let eggs = [
            (
                "What is the airspeed velocity of an unladen swallow?",
                "African or European? Pick one and we'll talk.",
            ),
            ("Open the pod bay doors, HAL", "I'm sorry, Dave. I'm afraid I can't do that."),
            ("What is love?", "Baby, don't hurt me. Don't hurt me. No more."),
        ];
        Self {
            freshness_keywords: ["new", "another", "different", "something else"]
                .into_iter()
                .map(String::from)
                .collect(),
            song_triggers: vec!["song".to_string(), "songs".to_string()],
            songs: songs.into_iter().map(String::from).collect(),
            easter_eggs: eggs
                .into_iter()
                .map(|(phrase, reply)| EasterEgg {
                    phrase: phrase.to_string(),
                    reply: reply.to_string(),
                })
                .collect(),
            greeting_listen_secs: 2,
            listen_secs: 3,
        }
    }
}

/// Classified intent of one turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Greeting,
    Fallback,
    VoiceSwitch,
    Song,
    EasterEgg { reply: String },
    Dynamic { fresh: bool },
}

impl Intent {
    pub fn category(&self) -> TurnCategory {
        match self {
            Intent::Greeting => TurnCategory::Greeting,
            Intent::Fallback => TurnCategory::Fallback,
            Intent::VoiceSwitch => TurnCategory::VoiceSwitch,
            Intent::Song => TurnCategory::Song,
            Intent::EasterEgg { .. } => TurnCategory::EasterEgg,
            Intent::Dynamic { .. } => TurnCategory::Dynamic,
        }
    }
}

pub struct IntentClassifier {
    routing: RoutingConfig,
    voices: VoiceCatalog,
}

impl IntentClassifier {
    pub fn new(routing: RoutingConfig, voices: VoiceCatalog) -> Self {
        Self { routing, voices }
    }

    pub fn routing(&self) -> &RoutingConfig {
        &self.routing
    }

    /// Classify already-normalized input.
    pub fn classify(&self, normalized: &str, status: CallStatus) -> Intent {
        if normalized.is_empty() {
            return match status {
                CallStatus::JustConnected => Intent::Greeting,
                CallStatus::InProgress => Intent::Fallback,
            };
        }
        if self.voices.match_phrase(normalized).is_some() {
            return Intent::VoiceSwitch;
        }
        if contains_any(normalized, &self.routing.song_triggers) {
            return Intent::Song;
        }
        if let Some(egg) = self
            .routing
            .easter_eggs
            .iter()
            .find(|egg| normalize_input(&egg.phrase) == normalized)
        {
            return Intent::EasterEgg {
                reply: egg.reply.clone(),
            };
        }
        Intent::Dynamic {
            fresh: contains_any(normalized, &self.routing.freshness_keywords),
        }
    }
}

/// One inbound turn from the gateway
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub text: String,
    pub status: CallStatus,
}

impl TurnRequest {
    pub fn new(text: impl Into<String>, status: CallStatus) -> Self {
        Self {
            text: text.into(),
            status,
        }
    }
}

/// Keep listening for this long after playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenDirective {
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct TurnResponse {
    pub category: TurnCategory,
    pub audio: Option<AudioRef>,
    pub reply_text: Option<String>,
    /// Text for the gateway to speak itself when no artifact is playable.
    /// `audio` and `say` are both `None` only for input ignored while idle.
    pub say: Option<String>,
    pub listen: ListenDirective,
}

/// What a branch ended up playing
type Spoken = (Option<AudioRef>, Option<String>);

pub struct TurnRouter {
    classifier: IntentClassifier,
    phrases: Phrases,
    voices: Arc<VoiceProfileManager>,
    language: Arc<LanguageClient>,
    speech: Arc<SpeechClient>,
    attention: Arc<AttentionMachine>,
    coordinator: Arc<Coordinator>,
}

impl TurnRouter {
    pub fn new(
        classifier: IntentClassifier,
        phrases: Phrases,
        voices: Arc<VoiceProfileManager>,
        language: Arc<LanguageClient>,
        speech: Arc<SpeechClient>,
        attention: Arc<AttentionMachine>,
        coordinator: Arc<Coordinator>,
    ) -> Self {
        Self {
            classifier,
            phrases,
            voices,
            language,
            speech,
            attention,
            coordinator,
        }
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    /// Reply for a turn that failed outside the router. Keeps the call listening.
    pub async fn fallback_response(&self) -> TurnResponse {
        let (audio, say) = self.fallback_or_say(&self.phrases.fallback).await;
        TurnResponse {
            category: TurnCategory::Fallback,
            audio,
            reply_text: Some(self.phrases.fallback.clone()),
            say,
            listen: self.listen(),
        }
    }

    fn short_listen(&self) -> ListenDirective {
        ListenDirective {
            timeout: Duration::from_secs(self.classifier.routing.greeting_listen_secs),
        }
    }

    fn listen(&self) -> ListenDirective {
        ListenDirective {
            timeout: Duration::from_secs(self.classifier.routing.listen_secs),
        }
    }

    /// Process one turn. Fails only when the turn cannot be admitted.
    pub async fn handle(&self, request: TurnRequest) -> VoiceResult<TurnResponse> {
        let _permit = self.coordinator.admit_turn()?;
        let mut record = TurnRecord::begin(&request.text);

        let response = if self.attention.is_idle() {
            self.handle_idle(&record.normalized_input).await
        } else {
            let intent = self.classifier.classify(&record.normalized_input, request.status);
            debug!(target: "callgod::router", intent = ?intent, "turn classified");
            self.dispatch(intent, &mut record).await
        };

        record.category = Some(response.category);
        record.response_text = response.reply_text.clone();
        record.audio = response.audio.clone();
        record.finish();
        Ok(response)
    }

    async fn handle_idle(&self, normalized: &str) -> TurnResponse {
        if self.attention.observe(normalized) {
            let (audio, say) = self.reserved_or_fallback(Reserved::Welcome, &self.phrases.welcome).await;
            return TurnResponse {
                category: TurnCategory::Wake,
                audio,
                reply_text: Some(self.phrases.welcome.clone()),
                say,
                listen: self.short_listen(),
            };
        }
        TurnResponse {
            category: TurnCategory::Ignored,
            audio: None,
            reply_text: None,
            say: None,
            listen: self.listen(),
        }
    }

    async fn dispatch(&self, intent: Intent, record: &mut TurnRecord) -> TurnResponse {
        let category = intent.category();
        let listen = match intent {
            Intent::Greeting | Intent::Fallback => self.short_listen(),
            _ => self.listen(),
        };
        let (reply_text, (audio, say)) = match intent {
            Intent::Greeting => (
                self.phrases.welcome.clone(),
                self.reserved_or_fallback(Reserved::Welcome, &self.phrases.welcome).await,
            ),
            Intent::Fallback => (
                self.phrases.fallback.clone(),
                self.reserved_or_fallback(Reserved::Fallback, &self.phrases.fallback).await,
            ),
            Intent::VoiceSwitch => match self.voices.switch(&record.normalized_input).await {
                Some(switch) => {
                    let spoken = match switch.confirmation {
                        Some(audio) => (Some(audio), None),
                        None => self.fallback_or_say(&switch.confirmation_text).await,
                    };
                    (format!("voice: {}", switch.profile.display_name), spoken)
                }
                None => (
                    self.phrases.fallback.clone(),
                    self.fallback_or_say(&self.phrases.fallback).await,
                ),
            },
            Intent::Song => {
                let line = self.pick_song();
                let spoken = self.speak_or_fallback(&line, false, record).await;
                (line, spoken)
            }
            Intent::EasterEgg { reply } => {
                let spoken = self.speak_or_fallback(&reply, false, record).await;
                (reply, spoken)
            }
            Intent::Dynamic { fresh } => {
                let started = Instant::now();
                let reply = self.language.resolve(&record.normalized_input, fresh).await;
                record.latencies.language = Some(started.elapsed());
                let spoken = self.speak_or_fallback(&reply, fresh, record).await;
                (reply, spoken)
            }
        };
        TurnResponse {
            category,
            audio,
            reply_text: Some(reply_text),
            say,
            listen,
        }
    }

    fn pick_song(&self) -> String {
        self.classifier
            .routing
            .songs
            .choose(&mut rand::rng())
            .cloned()
            .unwrap_or_else(|| self.phrases.fallback.clone())
    }

    async fn speak_or_fallback(&self, text: &str, bypass_cache: bool, record: &mut TurnRecord) -> Spoken {
        let started = Instant::now();
        let result = self.speech.speak(text, bypass_cache).await;
        record.latencies.synthesis = Some(started.elapsed());
        match result {
            Ok(audio) => (Some(audio), None),
            Err(e) => {
                warn!(target: "callgod::router", "synthesis failed, playing fallback: {}", e);
                self.fallback_or_say(text).await
            }
        }
    }

    async fn reserved_or_fallback(&self, which: Reserved, text: &str) -> Spoken {
        match self.speech.ensure_reserved(which, text).await {
            Ok(audio) => (Some(audio), None),
            Err(e) => {
                warn!(target: "callgod::router", artifact = which.label(), "reserved artifact unavailable: {}", e);
                self.fallback_or_say(text).await
            }
        }
    }

    /// The reserved fallback if it exists on disk, else `text` for the gateway to speak.
    async fn fallback_or_say(&self, text: &str) -> Spoken {
        let fallback = self.speech.artifacts().reserved(Reserved::Fallback);
        if fallback.is_live().await {
            return (Some(fallback), None);
        }
        warn!(target: "callgod::router", "fallback artifact missing, answering with gateway speech");
        (None, Some(text.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> IntentClassifier {
        IntentClassifier::new(RoutingConfig::default(), VoiceCatalog::default())
    }

    #[test]
    fn empty_input_depends_on_call_status() {
        let c = classifier();
        assert_eq!(c.classify("", CallStatus::JustConnected), Intent::Greeting);
        assert_eq!(c.classify("", CallStatus::InProgress), Intent::Fallback);
    }

    #[test]
    fn priority_order_is_fixed() {
        let c = classifier();
        // Voice names win over song requests.
        assert_eq!(c.classify("tom sing me a song", CallStatus::InProgress), Intent::VoiceSwitch);
        assert_eq!(c.classify("sing me a song", CallStatus::InProgress), Intent::Song);
        // Song requests win over freshness keywords.
        assert_eq!(c.classify("another song", CallStatus::InProgress), Intent::Song);
    }

    #[test]
    fn easter_eggs_need_an_exact_match() {
        let c = classifier();
        assert_eq!(
            c.classify(&normalize_input("What is love?"), CallStatus::InProgress),
            Intent::EasterEgg {
                reply: "Baby, don't hurt me. Don't hurt me. No more.".into()
            }
        );
        assert_eq!(
            c.classify("so what is love?", CallStatus::InProgress),
            Intent::Dynamic { fresh: false }
        );
    }

    #[test]
    fn freshness_keywords_mark_dynamic_turns() {
        let c = classifier();
        assert_eq!(
            c.classify("tell me something else", CallStatus::InProgress),
            Intent::Dynamic { fresh: true }
        );
        assert_eq!(
            c.classify("any news today", CallStatus::InProgress),
            Intent::Dynamic { fresh: false }
        );
    }

    #[test]
    fn gateway_statuses() {
        assert_eq!(CallStatus::from_gateway(Some("ringing")), CallStatus::JustConnected);
        assert_eq!(CallStatus::from_gateway(Some("just-connected")), CallStatus::JustConnected);
        assert_eq!(CallStatus::from_gateway(Some("in-progress")), CallStatus::InProgress);
        assert_eq!(CallStatus::from_gateway(None), CallStatus::InProgress);
    }

    #[test]
    fn default_pools_are_populated() {
        let routing = RoutingConfig::default();
        assert_eq!(routing.songs.len(), 12);
        assert_eq!(routing.easter_eggs.len(), 3);
    }
}
