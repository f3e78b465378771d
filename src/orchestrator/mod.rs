//! Push orchestrator: a single actor that serializes state updates.
//!
//! ```text
//! webhook / CLI ──► OrchestratorHandle ──mpsc──► Orchestrator ──► BuildSystem
//!                                                (one message at a time)
//! ```
//!
//! Each message runs to completion on the blocking pool before the next is
//! received, so graph updates and persisted documents never interleave.
//! Garbage collection goes through the same queue so it never deletes a
//! build that an in-flight push is about to publish.

mod push;

pub use push::{PushOutcome, handle_push, recompute};

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::store::GcReport;
use crate::system::BuildSystem;

/// Queued pushes before senders wait.
const CHANNEL_BUFFER: usize = 64;

/// A version-control push notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    /// Repository path, absolute or relative to the workspace root.
    pub repo: PathBuf,
    pub branch: String,
    pub commit: String,
}

type Reply = oneshot::Sender<Result<PushOutcome>>;
type GcReply = oneshot::Sender<Result<GcReport>>;

/// Messages to the orchestrator actor.
#[derive(Debug)]
pub enum OrchestratorMsg {
    Push {
        event: PushEvent,
        reply: Option<Reply>,
    },
    /// Forced full rediscovery.
    Recompute { reply: Option<Reply> },
    /// Drop stored builds except the current ones of `units`, or of every
    /// buildable unit when `None`.
    Gc {
        units: Option<Vec<String>>,
        reply: GcReply,
    },
    Shutdown,
}

/// Consumer side of the queue.
pub struct Orchestrator {
    system: Arc<BuildSystem>,
    rx: mpsc::Receiver<OrchestratorMsg>,
}

impl Orchestrator {
    /// Spawn the actor on the current tokio runtime.
    pub fn spawn(system: Arc<BuildSystem>) -> (OrchestratorHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER);
        let actor = Self { system, rx };
        let task = tokio::spawn(actor.run());
        (OrchestratorHandle { tx }, task)
    }

    async fn run(mut self) {
        crate::debug!("orchestrator"; "start");
        while let Some(msg) = self.rx.recv().await {
            match msg {
                OrchestratorMsg::Push { event, reply } => {
                    let system = Arc::clone(&self.system);
                    let label = format!("{}@{}", event.repo.display(), event.branch);
                    let result = run_blocking(move || handle_push(&system, &event)).await;
                    report(&label, &result);
                    respond(reply, result);
                }
                OrchestratorMsg::Recompute { reply } => {
                    let system = Arc::clone(&self.system);
                    let result = run_blocking(move || recompute(&system)).await;
                    report("recompute", &result);
                    respond(reply, result);
                }
                OrchestratorMsg::Gc { units, reply } => {
                    let system = Arc::clone(&self.system);
                    let result = run_blocking(move || {
                        let units = units.unwrap_or_else(|| {
                            system.list_buildables().into_iter().map(|u| u.name).collect()
                        });
                        system.gc(&units)
                    })
                    .await;
                    if let Err(e) = &result {
                        crate::log!("gc"; "failed: {:#}", e);
                    }
                    let _ = reply.send(result);
                }
                OrchestratorMsg::Shutdown => break,
            }
        }
        crate::debug!("orchestrator"; "stopped");
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .unwrap_or_else(|e| Err(anyhow!("handler panicked: {e}")))
}

fn report(label: &str, result: &Result<PushOutcome>) {
    match result {
        Ok(PushOutcome::Ignored { reason }) => crate::debug!("push"; "{}: {}", label, reason),
        Ok(outcome) => crate::log!("push"; "{}", outcome),
        Err(e) => crate::log!("push"; "{} failed, keeping last good state: {:#}", label, e),
    }
}

fn respond(reply: Option<Reply>, result: Result<PushOutcome>) {
    if let Some(reply) = reply {
        // The caller may have given up waiting.
        let _ = reply.send(result);
    }
}

/// Producer side of the queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::Sender<OrchestratorMsg>,
}

impl OrchestratorHandle {
    /// Queue a push without waiting for it.
    pub async fn notify(&self, event: PushEvent) -> Result<()> {
        self.send(OrchestratorMsg::Push { event, reply: None }).await
    }

    /// Queue a push and wait for its outcome.
    pub async fn push(&self, event: PushEvent) -> Result<PushOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(OrchestratorMsg::Push {
            event,
            reply: Some(reply),
        })
        .await?;
        rx.await.map_err(|_| anyhow!("orchestrator dropped the push"))?
    }

    pub async fn recompute(&self) -> Result<PushOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(OrchestratorMsg::Recompute { reply: Some(reply) })
            .await?;
        rx.await.map_err(|_| anyhow!("orchestrator dropped the recompute"))?
    }

    /// Blocking variant of [`push`](Self::push) for non-async callers.
    pub fn push_blocking(&self, event: PushEvent) -> Result<PushOutcome> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .blocking_send(OrchestratorMsg::Push {
                event,
                reply: Some(reply),
            })
            .map_err(|_| anyhow!("orchestrator is not running"))?;
        rx.blocking_recv()
            .map_err(|_| anyhow!("orchestrator dropped the push"))?
    }

    pub fn recompute_blocking(&self) -> Result<PushOutcome> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .blocking_send(OrchestratorMsg::Recompute { reply: Some(reply) })
            .map_err(|_| anyhow!("orchestrator is not running"))?;
        rx.blocking_recv()
            .map_err(|_| anyhow!("orchestrator dropped the recompute"))?
    }

    /// Queue a garbage collection behind every pending push.
    pub async fn gc(&self, units: Option<Vec<String>>) -> Result<GcReport> {
        let (reply, rx) = oneshot::channel();
        self.send(OrchestratorMsg::Gc { units, reply }).await?;
        rx.await.map_err(|_| anyhow!("orchestrator dropped the gc"))?
    }

    pub fn gc_blocking(&self, units: Option<Vec<String>>) -> Result<GcReport> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .blocking_send(OrchestratorMsg::Gc { units, reply })
            .map_err(|_| anyhow!("orchestrator is not running"))?;
        rx.blocking_recv()
            .map_err(|_| anyhow!("orchestrator dropped the gc"))?
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(OrchestratorMsg::Shutdown).await;
    }

    pub fn shutdown_blocking(&self) {
        let _ = self.tx.blocking_send(OrchestratorMsg::Shutdown);
    }

    async fn send(&self, msg: OrchestratorMsg) -> Result<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| anyhow!("orchestrator is not running"))
    }
}

#[cfg(test)]
mod tests;
