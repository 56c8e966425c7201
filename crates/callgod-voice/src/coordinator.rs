//! Concurrency coordinator: bounds outstanding provider calls and admitted turns.
//!
//! Remote-bound work runs on a fixed number of worker slots regardless of call volume.
//! Within a turn, synthesis waits on the resolved text; the slots only let independent
//! work (other calls' turns, preloading) overlap.

use crate::error::{VoiceError, VoiceResult};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Sizing for the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CoordinatorConfig {
    /// Worker slots for provider calls (default: 4)
    pub workers: usize,
    /// Turns processed at once before admission answers "slow down" (default: 32)
    pub max_concurrent_turns: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_concurrent_turns: 32,
        }
    }
}

/// Admission ticket for one turn. Dropping it frees the slot.
#[derive(Debug)]
pub struct TurnPermit {
    _permit: OwnedSemaphorePermit,
}

#[derive(Debug, Default)]
struct Counters {
    completed: AtomicU64,
    background: AtomicU64,
    timed_out: AtomicU64,
    rejected_turns: AtomicU64,
}

/// Snapshot of coordinator activity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub in_flight: usize,
    pub completed: u64,
    pub background_jobs: u64,
    pub timed_out: u64,
    pub rejected_turns: u64,
}

pub struct Coordinator {
    config: CoordinatorConfig,
    workers: Arc<Semaphore>,
    turns: Arc<Semaphore>,
    counters: Arc<Counters>,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        let workers = config.workers.max(1);
        let turns = config.max_concurrent_turns.max(1);
        Self {
            config: CoordinatorConfig {
                workers,
                max_concurrent_turns: turns,
            },
            workers: Arc::new(Semaphore::new(workers)),
            turns: Arc::new(Semaphore::new(turns)),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn config(&self) -> CoordinatorConfig {
        self.config
    }

    /// Admit a turn without waiting. Full means `CapacityExceeded`.
    pub fn admit_turn(&self) -> VoiceResult<TurnPermit> {
        match Arc::clone(&self.turns).try_acquire_owned() {
            Ok(permit) => Ok(TurnPermit { _permit: permit }),
            Err(_) => {
                self.counters.rejected_turns.fetch_add(1, Ordering::Relaxed);
                warn!(target: "callgod::coordinator", limit = self.config.max_concurrent_turns, "turn rejected: at capacity");
                Err(VoiceError::CapacityExceeded {
                    limit: self.config.max_concurrent_turns,
                })
            }
        }
    }

    /// Run a provider call on a worker slot. Waiting for the slot counts against `timeout`;
    /// on timeout the call is dropped, which releases the slot.
    pub async fn run<F, T>(&self, stage: &'static str, timeout: Duration, call: F) -> VoiceResult<T>
    where
        F: Future<Output = T>,
    {
        let workers = Arc::clone(&self.workers);
        let guarded = async move {
            let _permit = workers.acquire_owned().await.map_err(|_| VoiceError::TransientRemote {
                service: stage,
                reason: "worker pool closed".to_string(),
            })?;
            Ok::<T, VoiceError>(call.await)
        };

        match tokio::time::timeout(timeout, guarded).await {
            Ok(result) => {
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                result
            }
            Err(_) => {
                self.counters.timed_out.fetch_add(1, Ordering::Relaxed);
                warn!(target: "callgod::coordinator", stage, ?timeout, "remote stage timed out");
                Err(VoiceError::Timeout {
                    stage,
                    after: timeout,
                })
            }
        }
    }

    /// Spawn independent background work (preloading). The job holds no worker slot itself;
    /// its provider calls take one each through [`Coordinator::run`].
    pub fn submit<F>(&self, label: &'static str, job: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let counters = Arc::clone(&self.counters);
        tokio::spawn(async move {
            debug!(target: "callgod::coordinator", label, "background job started");
            let out = job.await;
            counters.background.fetch_add(1, Ordering::Relaxed);
            out
        })
    }

    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            in_flight: self.config.workers - self.workers.available_permits(),
            completed: self.counters.completed.load(Ordering::Relaxed),
            background_jobs: self.counters.background.load(Ordering::Relaxed),
            timed_out: self.counters.timed_out.load(Ordering::Relaxed),
            rejected_turns: self.counters.rejected_turns.load(Ordering::Relaxed),
        }
    }
}
