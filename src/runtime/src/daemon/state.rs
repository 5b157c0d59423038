//! Lifecycle of a single image operation.
//!
//! ```text
//! Idle → Streaming → DaemonProcessing → Reporting → Done
//!    \________\______________\______________\____→ Failed
//! ```

use std::fmt;

use kpm_core::error::{KpmError, Result};

/// Which daemon operation is being tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Build,
    Push,
    Pull,
    Delete,
    Extract,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationKind::Build => "build",
            OperationKind::Push => "push",
            OperationKind::Pull => "pull",
            OperationKind::Delete => "delete",
            OperationKind::Extract => "extract",
        };
        f.write_str(s)
    }
}

/// Operation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    /// Nothing sent yet
    Idle,
    /// Request (and body) being sent
    Streaming,
    /// Daemon accepted the request and is working
    DaemonProcessing,
    /// Progress frames are arriving
    Reporting,
    Done,
    Failed,
}

impl OperationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationState::Done | OperationState::Failed)
    }
}

/// State tracker for one operation.
#[derive(Debug)]
pub struct Operation {
    kind: OperationKind,
    state: OperationState,
    frames: usize,
}

impl Operation {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            state: OperationState::Idle,
            frames: 0,
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn state(&self) -> OperationState {
        self.state
    }

    /// Number of frames reported so far.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Idle → Streaming
    pub fn begin(&mut self) -> Result<()> {
        self.transition(OperationState::Idle, OperationState::Streaming)
    }

    /// Streaming → DaemonProcessing
    pub fn acknowledged(&mut self) -> Result<()> {
        self.transition(OperationState::Streaming, OperationState::DaemonProcessing)
    }

    /// DaemonProcessing | Reporting → Reporting
    pub fn frame_received(&mut self) -> Result<()> {
        match self.state {
            OperationState::DaemonProcessing | OperationState::Reporting => {
                self.state = OperationState::Reporting;
                self.frames += 1;
                Ok(())
            }
            other => Err(self.invalid(other, OperationState::Reporting)),
        }
    }

    /// DaemonProcessing | Reporting → Done
    pub fn finish(&mut self) -> Result<()> {
        match self.state {
            OperationState::DaemonProcessing | OperationState::Reporting => {
                self.state = OperationState::Done;
                tracing::debug!(operation = %self.kind, frames = self.frames, "Operation done");
                Ok(())
            }
            other => Err(self.invalid(other, OperationState::Done)),
        }
    }

    /// Move to Failed and hand back `err`. A finished operation keeps its state.
    pub fn fail(&mut self, err: KpmError) -> KpmError {
        if !self.state.is_terminal() {
            tracing::debug!(
                operation = %self.kind,
                from = ?self.state,
                error = %err,
                "Operation failed"
            );
            self.state = OperationState::Failed;
        }
        err
    }

    fn transition(&mut self, from: OperationState, to: OperationState) -> Result<()> {
        if self.state != from {
            return Err(self.invalid(self.state, to));
        }
        tracing::trace!(operation = %self.kind, from = ?from, to = ?to, "Operation transition");
        self.state = to;
        Ok(())
    }

    fn invalid(&self, from: OperationState, to: OperationState) -> KpmError {
        KpmError::InvalidState(format!("{} cannot move from {:?} to {:?}", self.kind, from, to))
    }
}
