//! Per-turn record for structured latency logging
//!
//! A `TurnRecord` lives for exactly one webhook turn: it is created when the text arrives,
//! filled in by the router as stages complete, logged once, and dropped.

use crate::artifact::AudioRef;
use crate::text::normalize_input;
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::info;

/// What kind of turn the router decided this was
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnCategory {
    Greeting,
    Fallback,
    VoiceSwitch,
    Song,
    EasterEgg,
    Dynamic,
    /// Input arrived while idle and was not a wake phrase.
    Ignored,
    /// Wake phrase arrived while idle.
    Wake,
}

impl TurnCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            TurnCategory::Greeting => "greeting",
            TurnCategory::Fallback => "fallback",
            TurnCategory::VoiceSwitch => "voice_switch",
            TurnCategory::Song => "song",
            TurnCategory::EasterEgg => "easter_egg",
            TurnCategory::Dynamic => "dynamic",
            TurnCategory::Ignored => "ignored",
            TurnCategory::Wake => "wake",
        }
    }
}

impl fmt::Display for TurnCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time spent in each remote stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageLatencies {
    pub language: Option<Duration>,
    pub synthesis: Option<Duration>,
    pub total: Duration,
}

#[derive(Debug, Clone)]
pub struct TurnRecord {
    pub started_at: DateTime<Utc>,
    pub raw_input: String,
    pub normalized_input: String,
    pub category: Option<TurnCategory>,
    pub response_text: Option<String>,
    pub audio: Option<AudioRef>,
    pub latencies: StageLatencies,
    clock: Instant,
}

impl TurnRecord {
    pub fn begin(raw_input: &str) -> Self {
        Self {
            started_at: Utc::now(),
            raw_input: raw_input.to_string(),
            normalized_input: normalize_input(raw_input),
            category: None,
            response_text: None,
            audio: None,
            latencies: StageLatencies::default(),
            clock: Instant::now(),
        }
    }

    /// Close the record and emit it as one structured event.
    pub fn finish(mut self) -> Self {
        self.latencies.total = self.clock.elapsed();
        self.log();
        self
    }

    fn log(&self) {
        let ms = |d: Option<Duration>| d.map(|d| d.as_millis() as u64);
        info!(
            target: "callgod::turn",
            category = self.category.map(TurnCategory::as_str).unwrap_or("unrouted"),
            user_said = %self.normalized_input,
            reply = self.response_text.as_deref().unwrap_or(""),
            artifact = self.audio.as_ref().map(|a| a.file_name()).unwrap_or(""),
            language_ms = ms(self.latencies.language),
            synthesis_ms = ms(self.latencies.synthesis),
            total_ms = self.latencies.total.as_millis() as u64,
            started_at = %self.started_at.to_rfc3339(),
            "turn processed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_normalizes_and_finish_sets_total() {
        let record = TurnRecord::begin("  What IS Love? ");
        assert_eq!(record.normalized_input, "what is love?");
        assert_eq!(record.raw_input, "  What IS Love? ");
        std::thread::sleep(Duration::from_millis(2));
        let done = record.finish();
        assert!(done.latencies.total >= Duration::from_millis(2));
    }
}
