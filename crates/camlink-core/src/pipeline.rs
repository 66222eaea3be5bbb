//! Video pipeline collaborator handle
//!
//! The decode/render pipeline itself lives outside this crate. The control
//! plane only needs to know whether a session is active and to hand it a
//! restart signal when the rotation changes. Signalling is fire-and-forget
//! into the collaborator's own execution context; nothing here blocks on the
//! pipeline doing the work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Commands the control plane may send to the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineCommand {
    /// Tear the pipeline down and bring it back up with the current config
    Restart,
}

/// Sending half of the pipeline boundary.
///
/// The collaborator keeps the receiver and flips the activity flag around
/// its own start/stop.
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    commands: mpsc::UnboundedSender<PipelineCommand>,
    active: Arc<AtomicBool>,
}

impl PipelineHandle {
    /// Create the handle and the command receiver for the collaborator
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PipelineCommand>) {
        let (commands, rx) = mpsc::unbounded_channel();
        (
            Self {
                commands,
                active: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    /// Mark the video session as running or stopped
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    /// Whether a video session currently runs
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Queue a restart without waiting for it; a gone collaborator is fine
    pub fn schedule_restart(&self) {
        if self.commands.send(PipelineCommand::Restart).is_err() {
            debug!("pipeline receiver dropped; restart signal discarded");
        }
    }
}
