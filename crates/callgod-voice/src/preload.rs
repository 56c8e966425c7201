//! Startup preloading of reserved artifacts and canned responses.
//!
//! Each item is an independent background job; its synthesis call takes a worker slot like
//! any live turn, so priming overlaps with request handling instead of blocking it.

use crate::artifact::Reserved;
use crate::config::Phrases;
use crate::coordinator::Coordinator;
use crate::speech::SpeechClient;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of one preload pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreloadReport {
    /// Labels of items that are ready to play
    pub ready: Vec<String>,
    /// Labels of items that could not be produced
    pub failed: Vec<String>,
}

impl PreloadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Preloader {
    speech: Arc<SpeechClient>,
    coordinator: Arc<Coordinator>,
    phrases: Phrases,
    apology: String,
}

impl Preloader {
    pub fn new(speech: Arc<SpeechClient>, coordinator: Arc<Coordinator>, phrases: Phrases, apology: String) -> Self {
        Self {
            speech,
            coordinator,
            phrases,
            apology,
        }
    }

    fn reserved_text(&self, which: Reserved) -> &str {
        match which {
            Reserved::Welcome => &self.phrases.welcome,
            Reserved::Fallback => &self.phrases.fallback,
            Reserved::Exit => &self.phrases.exit,
        }
    }

    /// Synthesize missing reserved artifacts and prime the response cache with canned lines.
    pub async fn run(&self) -> PreloadReport {
        let mut jobs = Vec::new();

        for which in Reserved::ALL {
            let speech = Arc::clone(&self.speech);
            let text = self.reserved_text(which).to_string();
            let handle = self.coordinator.submit("preload", async move {
                speech.ensure_reserved(which, &text).await.map(|_| ())
            });
            jobs.push((which.label().to_string(), handle));
        }

        let canned = self.phrases.canned.iter().chain(std::iter::once(&self.apology));
        for line in canned {
            let speech = Arc::clone(&self.speech);
            let text = line.clone();
            let handle = self
                .coordinator
                .submit("preload", async move { speech.speak(&text, false).await.map(|_| ()) });
            jobs.push((line.clone(), handle));
        }

        let mut report = PreloadReport::default();
        for (label, handle) in jobs {
            match handle.await {
                Ok(Ok(())) => report.ready.push(label),
                Ok(Err(e)) => {
                    warn!(target: "callgod::preload", item = %label, "preload failed: {}", e);
                    report.failed.push(label);
                }
                Err(e) => {
                    warn!(target: "callgod::preload", item = %label, "preload job aborted: {}", e);
                    report.failed.push(label);
                }
            }
        }

        info!(
            target: "callgod::preload",
            ready = report.ready.len(),
            failed = report.failed.len(),
            "preload finished"
        );
        report
    }
}
