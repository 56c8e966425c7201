//! End-to-end turn handling against counting fake providers.

use async_trait::async_trait;
use bytes::Bytes;
use callgod_voice::{
    AudioStream, CallStatus, CompletionRequest, LanguageBackend, Pipeline, Reserved, RoutingConfig,
    SpeechBackend, SynthesisError, TurnCategory, TurnRequest, VoiceConfig, VoiceError, VoiceProfile,
    VoiceResult,
};
use futures_util::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[derive(Default)]
struct CountingLanguage {
    calls: AtomicUsize,
    delay: Option<Duration>,
}

#[async_trait]
impl LanguageBackend for CountingLanguage {
    async fn complete(&self, request: &CompletionRequest) -> VoiceResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(format!("Divine answer to: {}", request.user))
    }
}

#[derive(Default)]
struct CountingSpeech {
    calls: AtomicUsize,
    current: AtomicUsize,
    peak: AtomicUsize,
    delay: Option<Duration>,
    fail: bool,
}

#[async_trait]
impl SpeechBackend for CountingSpeech {
    async fn stream(&self, text: &str, voice: &VoiceProfile) -> Result<AudioStream, SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.current.fetch_sub(1, Ordering::SeqCst);
        if self.fail {
            return Err(SynthesisError::Status {
                status: 500,
                body: "provider down".into(),
            });
        }
        let body = Bytes::from(format!("{}|{}", voice.id, text));
        Ok(stream::iter(vec![Ok(body)]).boxed())
    }
}

struct Harness {
    pipeline: Arc<Pipeline>,
    language: Arc<CountingLanguage>,
    speech: Arc<CountingSpeech>,
    _dir: TempDir,
}

fn harness_with(
    language: CountingLanguage,
    speech: CountingSpeech,
    tweak: impl FnOnce(&mut VoiceConfig),
) -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let dir = tempfile::tempdir().unwrap();
    let mut config = VoiceConfig {
        cache_dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    tweak(&mut config);

    let language = Arc::new(language);
    let speech = Arc::new(speech);
    let pipeline = Pipeline::build(config, language.clone(), speech.clone()).unwrap();
    Harness {
        pipeline: Arc::new(pipeline),
        language,
        speech,
        _dir: dir,
    }
}

fn harness() -> Harness {
    harness_with(CountingLanguage::default(), CountingSpeech::default(), |_| {})
}

fn said(text: &str) -> TurnRequest {
    TurnRequest::new(text, CallStatus::InProgress)
}

#[tokio::test]
async fn just_connected_silence_plays_welcome() {
    let h = harness();
    let turn = h
        .pipeline
        .handle_turn(TurnRequest::new("", CallStatus::JustConnected))
        .await
        .unwrap();

    assert_eq!(turn.category, TurnCategory::Greeting);
    assert_eq!(turn.audio.unwrap().file_name(), "welcome.mp3");
    assert_eq!(turn.listen.timeout, Duration::from_secs(2));
    assert_eq!(h.language.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn mid_call_silence_plays_fallback() {
    let h = harness();
    let turn = h.pipeline.handle_turn(said("   ")).await.unwrap();
    assert_eq!(turn.category, TurnCategory::Fallback);
    assert_eq!(turn.audio.unwrap().file_name(), "fallback.mp3");
    assert_eq!(turn.listen.timeout, Duration::from_secs(2));
}

#[tokio::test]
async fn repeated_question_is_served_from_both_caches() {
    let h = harness();
    let first = h.pipeline.handle_turn(said("Why is the sky blue?")).await.unwrap();
    let second = h.pipeline.handle_turn(said("  why is the sky blue?")).await.unwrap();

    assert_eq!(first.category, TurnCategory::Dynamic);
    assert_eq!(first.audio, second.audio);
    assert_eq!(first.listen.timeout, Duration::from_secs(3));
    assert_eq!(h.language.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.speech.calls.load(Ordering::SeqCst), 1);
    assert!(first.audio.unwrap().file_name().starts_with("cached_"));
}

#[tokio::test]
async fn freshness_keyword_bypasses_both_caches() {
    let h = harness();
    h.pipeline.handle_turn(said("tell me something new")).await.unwrap();
    h.pipeline.handle_turn(said("tell me something new")).await.unwrap();

    assert_eq!(h.language.calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.speech.calls.load(Ordering::SeqCst), 2);
    assert!(h.pipeline.store().language_cache().is_empty());
    assert!(h.pipeline.store().response_cache().is_empty());
}

#[tokio::test]
async fn fresh_turn_ignores_an_existing_cache_entry() {
    let h = harness();
    h.pipeline.handle_turn(said("give me another joke")).await.unwrap();
    // Same prompt without the keyword populates the caches.
    h.pipeline.handle_turn(said("give me a joke")).await.unwrap();
    assert_eq!(h.pipeline.store().language_cache().len(), 1);

    h.pipeline.handle_turn(said("give me another joke")).await.unwrap();
    assert_eq!(h.language.calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.pipeline.store().language_cache().len(), 1);
}

#[tokio::test]
async fn switching_voice_clears_caches_and_confirms() {
    let h = harness();
    let before = h.pipeline.handle_turn(said("who made the moon")).await.unwrap();
    let old_artifact = before.audio.unwrap();
    h.pipeline.handle_turn(TurnRequest::new("", CallStatus::JustConnected)).await.unwrap();
    assert_eq!(h.pipeline.store().language_cache().len(), 1);

    let turn = h.pipeline.handle_turn(said("switch to tom")).await.unwrap();
    assert_eq!(turn.category, TurnCategory::VoiceSwitch);
    assert_eq!(h.pipeline.voices().current().display_name, "Tom");
    assert!(h.pipeline.store().language_cache().is_empty());

    // Only the confirmation, spoken in the new voice, is cached afterwards.
    let confirmation = turn.audio.unwrap();
    assert!(confirmation.is_live().await);
    assert_eq!(h.pipeline.store().response_cache().len(), 1);
    let bytes = std::fs::read(confirmation.path()).unwrap();
    assert!(String::from_utf8_lossy(&bytes).starts_with("tom-voice-id|"));

    assert!(!old_artifact.is_live().await);
    assert!(h.pipeline.artifacts().reserved(Reserved::Welcome).is_live().await);

    // The earlier prompt is a miss now.
    h.pipeline.handle_turn(said("who made the moon")).await.unwrap();
    assert_eq!(h.language.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn song_requests_come_from_the_pool() {
    let h = harness();
    let pool = RoutingConfig::default().songs;
    for _ in 0..10 {
        let turn = h.pipeline.handle_turn(said("sing me a song")).await.unwrap();
        assert_eq!(turn.category, TurnCategory::Song);
        assert!(pool.contains(turn.reply_text.as_ref().unwrap()));
        assert!(turn.audio.unwrap().is_live().await);
    }
    assert_eq!(h.language.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn easter_egg_skips_the_language_provider() {
    let h = harness();
    let turn = h.pipeline.handle_turn(said("What is love?")).await.unwrap();
    assert_eq!(turn.category, TurnCategory::EasterEgg);
    assert_eq!(
        turn.reply_text.as_deref(),
        Some("Baby, don't hurt me. Don't hurt me. No more.")
    );
    assert_eq!(h.language.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.speech.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn language_timeout_uses_apology_and_caches_nothing() {
    let h = harness_with(
        CountingLanguage {
            delay: Some(Duration::from_secs(5)),
            ..Default::default()
        },
        CountingSpeech::default(),
        |c| c.language.timeout_secs = 1,
    );
    let turn = h.pipeline.handle_turn(said("what is the meaning of life")).await.unwrap();

    assert_eq!(turn.category, TurnCategory::Dynamic);
    assert_eq!(
        turn.reply_text.as_deref(),
        Some("I'm having trouble connecting to divine wisdom right now.")
    );
    assert!(h.pipeline.store().language_cache().is_empty());
    assert!(turn.audio.unwrap().is_live().await);
    assert_eq!(h.pipeline.coordinator().stats().timed_out, 1);
}

#[tokio::test]
async fn synthesis_failure_falls_back_to_reserved_artifact() {
    let h = harness_with(
        CountingLanguage::default(),
        CountingSpeech {
            fail: true,
            ..Default::default()
        },
        |_| {},
    );
    let fallback = h.pipeline.artifacts().reserved(Reserved::Fallback);
    std::fs::write(fallback.path(), b"id3").unwrap();

    let turn = h.pipeline.handle_turn(said("are you real")).await.unwrap();
    assert_eq!(turn.audio, Some(fallback));
    assert!(turn.say.is_none());
    assert!(h.pipeline.store().response_cache().is_empty());
    let leftovers = std::fs::read_dir(h.pipeline.artifacts().dir()).unwrap().count();
    assert_eq!(leftovers, 1);
}

#[tokio::test]
async fn outage_before_any_preload_hands_text_to_the_gateway() {
    let h = harness_with(
        CountingLanguage::default(),
        CountingSpeech {
            fail: true,
            ..Default::default()
        },
        |_| {},
    );

    let greeting = h
        .pipeline
        .handle_turn(TurnRequest::new("", CallStatus::JustConnected))
        .await
        .unwrap();
    assert!(greeting.audio.is_none());
    assert_eq!(greeting.say.as_deref(), Some(h.pipeline.config().phrases.welcome.as_str()));

    let turn = h.pipeline.handle_turn(said("are you real")).await.unwrap();
    assert!(turn.audio.is_none());
    assert_eq!(turn.say.as_deref(), Some("Divine answer to: are you real"));
    assert_eq!(turn.listen.timeout, Duration::from_secs(3));
    assert_eq!(std::fs::read_dir(h.pipeline.artifacts().dir()).unwrap().count(), 0);
}

#[tokio::test]
async fn missing_artifact_is_regenerated_not_trusted() {
    let h = harness();
    let first = h.pipeline.handle_turn(said("where are my keys")).await.unwrap();
    let audio = first.audio.unwrap();
    std::fs::remove_file(audio.path()).unwrap();

    let second = h.pipeline.handle_turn(said("where are my keys")).await.unwrap();
    assert_eq!(second.audio.as_ref(), Some(&audio));
    assert!(audio.is_live().await);
    assert_eq!(h.language.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.speech.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn excess_turns_are_rejected_with_capacity_error() {
    let h = harness_with(
        CountingLanguage {
            delay: Some(Duration::from_millis(400)),
            ..Default::default()
        },
        CountingSpeech::default(),
        |c| c.coordinator.max_concurrent_turns = 1,
    );
    let pipeline = Arc::clone(&h.pipeline);
    let running = tokio::spawn(async move { pipeline.handle_turn(said("slow question")).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let rejected = h.pipeline.handle_turn(said("impatient question")).await;
    assert!(matches!(rejected, Err(VoiceError::CapacityExceeded { limit: 1 })));
    assert!(running.await.unwrap().is_ok());
    assert!(h.pipeline.handle_turn(said("next question")).await.is_ok());
}

#[tokio::test]
async fn concurrent_calls_never_exceed_worker_slots() {
    let h = harness_with(
        CountingLanguage::default(),
        CountingSpeech {
            delay: Some(Duration::from_millis(30)),
            ..Default::default()
        },
        |c| c.coordinator.workers = 2,
    );
    let mut turns = Vec::new();
    for i in 0..8 {
        let pipeline = Arc::clone(&h.pipeline);
        turns.push(tokio::spawn(async move {
            pipeline.handle_turn(said(&format!("question number {}", i))).await
        }));
    }
    for turn in turns {
        assert!(turn.await.unwrap().unwrap().audio.is_some());
    }
    assert!(h.speech.peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(h.speech.calls.load(Ordering::SeqCst), 8);
}

#[tokio::test]
async fn idle_line_ignores_everything_but_wake_phrases() {
    let h = harness();
    h.pipeline.attention().go_idle();

    let ignored = h.pipeline.handle_turn(said("what time is it")).await.unwrap();
    assert_eq!(ignored.category, TurnCategory::Ignored);
    assert!(ignored.audio.is_none());
    assert_eq!(h.language.calls.load(Ordering::SeqCst), 0);

    let woken = h.pipeline.handle_turn(said("hey god")).await.unwrap();
    assert_eq!(woken.category, TurnCategory::Wake);
    assert_eq!(woken.audio.unwrap().file_name(), "welcome.mp3");
    assert!(!h.pipeline.attention().is_idle());

    let routed = h.pipeline.handle_turn(said("what time is it")).await.unwrap();
    assert_eq!(routed.category, TurnCategory::Dynamic);
}

#[tokio::test]
async fn preload_primes_reserved_and_canned_artifacts() {
    let h = harness();
    let report = h.pipeline.preloader().run().await;

    assert!(report.is_complete(), "failed: {:?}", report.failed);
    assert_eq!(report.ready.len(), 5);
    for which in Reserved::ALL {
        assert!(h.pipeline.artifacts().reserved(which).is_live().await);
    }
    assert_eq!(h.pipeline.store().response_cache().len(), 2);

    // A second pass finds the reserved files and the cached lines already in place.
    let calls = h.speech.calls.load(Ordering::SeqCst);
    h.pipeline.preloader().run().await;
    assert_eq!(h.speech.calls.load(Ordering::SeqCst), calls);
}
