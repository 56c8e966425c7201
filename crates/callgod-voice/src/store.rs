//! Process-scoped conversation state: the active voice and both caches.
//!
//! Owned by the pipeline and injected into every component that needs it. Reads are
//! snapshots; mutation goes through methods that take the relevant lock internally.

use crate::cache::{LanguageCache, ResponseCache};
use crate::voice::VoiceProfile;
use std::sync::RwLock;
use tokio::sync::{Mutex, MutexGuard};

pub struct SessionStore {
    voice: RwLock<VoiceProfile>,
    language: LanguageCache,
    responses: ResponseCache,
    switch_lock: Mutex<()>,
}

impl SessionStore {
    pub fn new(initial_voice: VoiceProfile, cache_capacity: usize) -> Self {
        Self {
            voice: RwLock::new(initial_voice),
            language: LanguageCache::new("language", cache_capacity),
            responses: ResponseCache::new("response", cache_capacity),
            switch_lock: Mutex::new(()),
        }
    }

    /// Snapshot of the active voice. A turn keeps using its snapshot even if a switch lands mid-turn.
    pub fn current_voice(&self) -> VoiceProfile {
        self.voice
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn language_cache(&self) -> &LanguageCache {
        &self.language
    }

    pub fn response_cache(&self) -> &ResponseCache {
        &self.responses
    }

    /// Serializes voice switches. Held for the whole switch sequence.
    pub(crate) async fn lock_switch(&self) -> MutexGuard<'_, ()> {
        self.switch_lock.lock().await
    }

    pub(crate) fn set_voice(&self, profile: VoiceProfile) {
        *self.voice.write().unwrap_or_else(|e| e.into_inner()) = profile;
    }
}
