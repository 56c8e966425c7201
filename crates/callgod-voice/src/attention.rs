//! Idle/wake attention state machine
//!
//! `Active` is the default: every turn is routed. `Idle` is entered by an explicit trigger
//! (the gateway's attention endpoint); while idle, captured utterances are discarded until one
//! contains a wake phrase, which returns the machine to `Active`.
//!
//! The idle watcher is a background task on a fixed tick. It only captures while idle and
//! stops when the shutdown signal flips, at the latest one tick later.

use crate::error::VoiceResult;
use crate::text::{contains_any, normalize_input};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttentionState {
    Active,
    Idle,
}

impl fmt::Display for AttentionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttentionState::Active => f.write_str("active"),
            AttentionState::Idle => f.write_str("idle"),
        }
    }
}

/// Configuration for wake detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttentionConfig {
    /// Phrases that wake the machine (whole-word match, default: "wake up", "hello", "hey god")
    pub wake_phrases: Vec<String>,
    /// Idle poll tick (default: 1000ms)
    pub poll_interval_ms: u64,
}

impl Default for AttentionConfig {
    fn default() -> Self {
        Self {
            wake_phrases: vec!["wake up".into(), "hello".into(), "hey god".into()],
            poll_interval_ms: 1000,
        }
    }
}

impl AttentionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }
}

pub struct AttentionMachine {
    config: AttentionConfig,
    state: watch::Sender<AttentionState>,
}

impl AttentionMachine {
    /// New machine, `Active`.
    pub fn new(config: AttentionConfig) -> Self {
        let (state, _) = watch::channel(AttentionState::Active);
        Self { config, state }
    }

    pub fn config(&self) -> &AttentionConfig {
        &self.config
    }

    pub fn state(&self) -> AttentionState {
        *self.state.borrow()
    }

    pub fn is_idle(&self) -> bool {
        self.state() == AttentionState::Idle
    }

    /// Receiver that sees every state change.
    pub fn subscribe(&self) -> watch::Receiver<AttentionState> {
        self.state.subscribe()
    }

    pub fn go_idle(&self) {
        if self.transition(AttentionState::Idle) {
            info!(target: "callgod::attention", "💤 entering idle mode, waiting for a wake phrase");
        }
    }

    pub fn wake(&self) {
        if self.transition(AttentionState::Active) {
            info!(target: "callgod::attention", "👂 attention resumed");
        }
    }

    /// Feed one utterance. Returns `true` when it woke the machine from `Idle`.
    /// Has no effect while `Active`.
    pub fn observe(&self, utterance: &str) -> bool {
        if !self.is_idle() {
            return false;
        }
        let heard = normalize_input(utterance);
        if contains_any(&heard, &self.config.wake_phrases) {
            info!(target: "callgod::attention", heard = %heard, "wake phrase detected");
            self.transition(AttentionState::Active)
        } else {
            debug!(target: "callgod::attention", heard = %heard, "ignored while idle");
            false
        }
    }

    fn transition(&self, to: AttentionState) -> bool {
        self.state.send_if_modified(|current| {
            if *current == to {
                false
            } else {
                *current = to;
                true
            }
        })
    }
}

/// Where the idle watcher gets utterances from.
#[async_trait]
pub trait UtteranceSource: Send + Sync {
    /// Capture one utterance; empty when nothing was heard.
    async fn capture(&self) -> VoiceResult<String>;
}

/// Source that never hears anything. Used when wake phrases only arrive through the webhook.
pub struct SilentSource;

#[async_trait]
impl UtteranceSource for SilentSource {
    async fn capture(&self) -> VoiceResult<String> {
        Ok(String::new())
    }
}

/// Source fed by a channel (a local recognizer, or tests).
pub struct ChannelSource {
    rx: Mutex<mpsc::Receiver<String>>,
}

impl ChannelSource {
    pub fn new(buffer: usize) -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, Self { rx: Mutex::new(rx) })
    }
}

#[async_trait]
impl UtteranceSource for ChannelSource {
    async fn capture(&self) -> VoiceResult<String> {
        Ok(self.rx.lock().await.try_recv().unwrap_or_default())
    }
}

/// Spawn the idle watcher. It exits once `shutdown` holds `true` or its sender is dropped.
pub fn spawn_idle_watch(
    machine: Arc<AttentionMachine>,
    source: Arc<dyn UtteranceSource>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(machine.config().poll_interval());
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!(target: "callgod::attention", "idle watcher started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tick.tick() => {
                    if !machine.is_idle() {
                        continue;
                    }
                    let captured = tokio::select! {
                        _ = shutdown.changed() => break,
                        captured = source.capture() => captured,
                    };
                    match captured {
                        Ok(text) if !text.trim().is_empty() => {
                            machine.observe(&text);
                        }
                        Ok(_) => {}
                        Err(e) => warn!(target: "callgod::attention", "capture failed while idle: {}", e),
                    }
                }
            }
        }
        debug!(target: "callgod::attention", "idle watcher stopped");
    })
}
