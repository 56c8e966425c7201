//! On-disk audio artifacts under the cache directory.
//!
//! Dynamic artifacts are named `cached_<hash>.mp3`, so a lost file can be re-derived from the
//! same text and voice. A small set of reserved files survives voice-switch purges.

use crate::cache::CacheKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

const PART_SUFFIX: &str = "part";

/// Distinguishes concurrent writers of the same destination.
static NEXT_PART: AtomicU64 = AtomicU64::new(0);

/// Reserved static artifacts. These are never removed by a cache purge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reserved {
    Welcome,
    Fallback,
    Exit,
}

impl Reserved {
    pub const ALL: [Reserved; 3] = [Reserved::Welcome, Reserved::Fallback, Reserved::Exit];

    pub fn file_name(self) -> &'static str {
        match self {
            Reserved::Welcome => "welcome.mp3",
            Reserved::Fallback => "fallback.mp3",
            Reserved::Exit => "exit.mp3",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Reserved::Welcome => "welcome",
            Reserved::Fallback => "fallback",
            Reserved::Exit => "exit",
        }
    }
}

/// Reference to a playable artifact: its path on disk. The file name doubles as the
/// public reference handed to the static-file transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AudioRef {
    path: PathBuf,
}

impl AudioRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// Whether the backing file still exists. Cache hits must pass this before being trusted.
    pub async fn is_live(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// URL under which the static transport serves this artifact.
    pub fn public_url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.file_name())
    }
}

impl fmt::Display for AudioRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Owns the cache directory layout.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Create the store, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic artifact location for a response-cache key.
    pub fn cached(&self, key: &CacheKey) -> AudioRef {
        AudioRef::new(self.dir.join(format!("cached_{key}.mp3")))
    }

    pub fn reserved(&self, which: Reserved) -> AudioRef {
        AudioRef::new(self.dir.join(which.file_name()))
    }

    pub fn is_reserved(file_name: &str) -> bool {
        Reserved::ALL.iter().any(|r| r.file_name() == file_name)
    }

    /// Delete every artifact except the reserved allow-list. Returns the number removed.
    pub async fn purge_except_reserved(&self) -> std::io::Result<usize> {
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            // In-flight writes belong to a running turn; their keys carry the old voice id.
            if Self::is_reserved(&name) || name.ends_with(PART_SUFFIX) {
                continue;
            }
            if !entry.file_type().await?.is_file() {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                // Another turn may have finished writing or removed it already.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        debug!(target: "callgod::artifact", removed, dir = %self.dir.display(), "purged artifacts");
        Ok(removed)
    }
}

/// In-progress artifact. Bytes go to `<dest>.<pid>-<n>.part`, private to this writer;
/// `commit` renames it into place. Two writers racing on one destination each publish a
/// complete file and the later rename wins. Dropping without commit removes the partial
/// file, so a cancelled or failed write is never visible under the final name.
pub struct PartialArtifact {
    part: PathBuf,
    dest: PathBuf,
    committed: bool,
}

impl PartialArtifact {
    pub async fn create(dest: &Path) -> std::io::Result<(Self, tokio::fs::File)> {
        let n = NEXT_PART.fetch_add(1, Ordering::Relaxed);
        let mut part = dest.as_os_str().to_owned();
        part.push(format!(".{}-{}.{}", std::process::id(), n, PART_SUFFIX));
        let part = PathBuf::from(part);
        let file = tokio::fs::File::create(&part).await?;
        Ok((
            Self {
                part,
                dest: dest.to_path_buf(),
                committed: false,
            },
            file,
        ))
    }

    pub async fn commit(mut self) -> std::io::Result<AudioRef> {
        tokio::fs::rename(&self.part, &self.dest).await?;
        self.committed = true;
        Ok(AudioRef::new(self.dest.clone()))
    }
}

impl Drop for PartialArtifact {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = std::fs::remove_file(&self.part) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(target: "callgod::artifact", part = %self.part.display(), "failed to remove partial artifact: {}", e);
                }
            }
        }
    }
}
