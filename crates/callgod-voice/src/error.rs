//! Error types for the callgod turn pipeline

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors that can occur while processing a call turn
#[derive(Error, Debug)]
pub enum VoiceError {
    /// Missing credential or unusable configuration. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider call failed (5xx, transport, malformed payload). Always recovered locally.
    #[error("{service} request failed: {reason}")]
    TransientRemote {
        service: &'static str,
        reason: String,
    },

    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: &'static str, after: Duration },

    /// Turn admission refused; surfaced to the gateway as a "slow down" reply.
    #[error("Too many concurrent turns (limit {limit})")]
    CapacityExceeded { limit: usize },

    #[error("Cached artifact missing: {}", .0.display())]
    CacheInconsistency(PathBuf),

    #[error("Synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VoiceError {
    /// True for failures the turn pipeline substitutes a canned reply for.
    pub fn is_transient(&self) -> bool {
        match self {
            VoiceError::TransientRemote { .. }
            | VoiceError::Timeout { .. }
            | VoiceError::CacheInconsistency(_) => true,
            VoiceError::Synthesis(e) => e.is_transient(),
            VoiceError::Config(_) | VoiceError::CapacityExceeded { .. } | VoiceError::Io(_) => false,
        }
    }
}

impl From<config::ConfigError> for VoiceError {
    fn from(err: config::ConfigError) -> Self {
        VoiceError::Config(err.to_string())
    }
}

/// Errors from the speech synthesis provider or while writing the artifact
#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("TTS API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("TTS transport error: {0}")]
    Transport(String),

    #[error("Nothing to synthesize")]
    EmptyText,

    #[error("TTS timed out after {0:?}")]
    Timeout(Duration),

    #[error("Artifact write failed: {0}")]
    Io(#[from] std::io::Error),
}

impl SynthesisError {
    pub fn is_transient(&self) -> bool {
        !matches!(self, SynthesisError::EmptyText)
    }
}

impl From<reqwest::Error> for SynthesisError {
    fn from(err: reqwest::Error) -> Self {
        SynthesisError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_failures_are_transient_config_is_not() {
        let remote = VoiceError::TransientRemote {
            service: "language",
            reason: "502".into(),
        };
        assert!(remote.is_transient());
        assert!(!VoiceError::Config("missing OPENAI_API_KEY".into()).is_transient());
        assert!(!VoiceError::CapacityExceeded { limit: 4 }.is_transient());
        assert!(VoiceError::from(SynthesisError::Timeout(Duration::from_secs(1))).is_transient());
    }
}
