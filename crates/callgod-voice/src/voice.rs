//! **Voice profiles**: the single active synthetic voice and the switch that replaces it.
//!
//! Switching atomically (under the store's switch lock) sets the new profile, clears the
//! language cache and the response cache, purges every non-reserved artifact, and then
//! synthesizes a confirmation line in the new voice. Turns already in flight keep the
//! profile snapshot they started with; the next turn sees the new one.

use crate::artifact::{ArtifactStore, AudioRef};
use crate::speech::SpeechClient;
use crate::store::SessionStore;
use crate::text::{last_phrase_end, normalize_input};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// A synthetic-speech identity: provider voice id plus a name for logs and prompts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub id: String,
    pub display_name: String,
}

/// One selectable voice and how callers ask for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceEntry {
    pub id: String,
    pub display_name: String,
    /// Spoken names that select this voice (matched as whole words).
    pub aliases: Vec<String>,
    /// Line spoken in the new voice after switching.
    pub confirmation: String,
}

impl VoiceEntry {
    pub fn profile(&self) -> VoiceProfile {
        VoiceProfile {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

/// Known voices in priority order. The first entry is active at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoiceCatalog {
    entries: Vec<VoiceEntry>,
}

impl Default for VoiceCatalog {
    fn default() -> Self {
        Self {
            entries: vec![
                VoiceEntry {
                    id: "nikki-voice-id".to_string(),
                    display_name: "Nikki".to_string(),
                    aliases: vec!["nikki".to_string()],
                    confirmation: "Voice switched to Nikki. Here I am, sassy and ready to judge you!"
                        .to_string(),
                },
                VoiceEntry {
                    id: "tom-voice-id".to_string(),
                    display_name: "Tom".to_string(),
                    aliases: vec!["tom".to_string(), "major tom".to_string()],
                    confirmation: "Voice switched to Major Tom. Ground control, ready for lift-off for your mother."
                        .to_string(),
                },
            ],
        }
    }
}

impl VoiceCatalog {
    pub fn new(entries: Vec<VoiceEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[VoiceEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn default_profile(&self) -> Option<VoiceProfile> {
        self.entries.first().map(VoiceEntry::profile)
    }

    /// The voice whose name or alias is mentioned last in the text, so "switch from nikki
    /// to tom" picks Tom. Ties go to the earlier catalog entry.
    pub fn match_phrase(&self, text: &str) -> Option<&VoiceEntry> {
        let text = normalize_input(text);
        let mut best: Option<(usize, &VoiceEntry)> = None;
        for entry in &self.entries {
            let mentioned = std::iter::once(&entry.display_name)
                .chain(&entry.aliases)
                .filter_map(|name| last_phrase_end(&text, &normalize_input(name)))
                .max();
            if let Some(end) = mentioned {
                if best.map_or(true, |(best_end, _)| end > best_end) {
                    best = Some((end, entry));
                }
            }
        }
        best.map(|(_, entry)| entry)
    }
}

/// Result of a successful switch
#[derive(Debug, Clone)]
pub struct VoiceSwitch {
    pub profile: VoiceProfile,
    /// Confirmation artifact in the new voice; `None` when synthesis failed.
    pub confirmation: Option<AudioRef>,
    pub confirmation_text: String,
}

pub struct VoiceProfileManager {
    catalog: VoiceCatalog,
    store: Arc<SessionStore>,
    artifacts: Arc<ArtifactStore>,
    speech: Arc<SpeechClient>,
}

impl VoiceProfileManager {
    pub fn new(
        catalog: VoiceCatalog,
        store: Arc<SessionStore>,
        artifacts: Arc<ArtifactStore>,
        speech: Arc<SpeechClient>,
    ) -> Self {
        Self {
            catalog,
            store,
            artifacts,
            speech,
        }
    }

    pub fn catalog(&self) -> &VoiceCatalog {
        &self.catalog
    }

    pub fn current(&self) -> VoiceProfile {
        self.store.current_voice()
    }

    /// Parse free text for a voice name and switch to it. `None` when no name is present.
    pub async fn switch(&self, candidate_phrase: &str) -> Option<VoiceSwitch> {
        let entry = self.catalog.match_phrase(candidate_phrase)?;
        let profile = entry.profile();

        let _guard = self.store.lock_switch().await;
        self.store.set_voice(profile.clone());
        let cleared_text = self.store.language_cache().clear();
        let cleared_responses = self.store.response_cache().clear();
        let removed_artifacts = match self.artifacts.purge_except_reserved().await {
            Ok(n) => n,
            Err(e) => {
                warn!(target: "callgod::voice", "artifact purge after voice switch failed: {}", e);
                0
            }
        };
        info!(
            target: "callgod::voice",
            voice = %profile.display_name,
            cleared_text,
            cleared_responses,
            removed_artifacts,
            "voice switched, caches cleared"
        );

        let confirmation = match self.speech.speak_as(&entry.confirmation, &profile, false).await {
            Ok(audio) => Some(audio),
            Err(e) => {
                warn!(target: "callgod::voice", voice = %profile.display_name, "confirmation synthesis failed: {}", e);
                None
            }
        };

        Some(VoiceSwitch {
            profile,
            confirmation,
            confirmation_text: entry.confirmation.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_whole_word_names() {
        let catalog = VoiceCatalog::default();
        assert_eq!(catalog.match_phrase("switch to tom").unwrap().display_name, "Tom");
        assert_eq!(catalog.match_phrase("Switch to Nikki please").unwrap().display_name, "Nikki");
        assert_eq!(catalog.match_phrase("ground control to major tom").unwrap().display_name, "Tom");
        assert!(catalog.match_phrase("what about tomorrow").is_none());
        assert!(catalog.match_phrase("").is_none());
    }

    #[test]
    fn last_named_voice_wins() {
        let catalog = VoiceCatalog::default();
        assert_eq!(catalog.match_phrase("switch from nikki to tom").unwrap().display_name, "Tom");
        assert_eq!(catalog.match_phrase("not tom, I want nikki").unwrap().display_name, "Nikki");
    }

    #[test]
    fn first_entry_is_default() {
        let catalog = VoiceCatalog::default();
        assert_eq!(catalog.default_profile().unwrap().display_name, "Nikki");
        assert!(VoiceCatalog::new(Vec::new()).default_profile().is_none());
    }
}
