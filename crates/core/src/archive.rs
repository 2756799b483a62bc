//! Nested archive handling: a depth bound shared across recursive
//! traversals, and the per-archive state machine stepping it.

use scanners::UnpackOutcome;
use std::fs;
use std::path::Path;

/// Nesting level of the archive currently being expanded.
#[derive(Debug)]
pub struct ArchiveDepth {
    current: usize,
    max: usize,
}

impl ArchiveDepth {
    pub fn new(max: usize) -> Self {
        Self { current: 0, max }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Descends one level. Returns `false` once the bound is reached; the
    /// level still has to be left with [`ArchiveDepth::exit`].
    pub fn enter(&mut self) -> bool {
        self.current += 1;
        self.current < self.max
    }

    pub fn exit(&mut self) {
        debug_assert!(self.current > 0, "archive depth exited more often than entered");
        self.current = self.current.saturating_sub(1);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveState {
    Inspecting,
    Bomb,
    Extracting,
    Done,
}

impl ArchiveState {
    /// Advances the machine. Entering `Bomb` or `Extracting` takes a depth
    /// level and reaching `Done` gives it back.
    pub fn step(self, depth: &mut ArchiveDepth) -> ArchiveState {
        match self {
            ArchiveState::Inspecting => {
                if depth.enter() {
                    ArchiveState::Extracting
                } else {
                    ArchiveState::Bomb
                }
            }
            ArchiveState::Bomb | ArchiveState::Extracting => {
                depth.exit();
                ArchiveState::Done
            }
            ArchiveState::Done => ArchiveState::Done,
        }
    }
}

/// Error map entry for an unsuccessful unpack, `None` on success.
pub fn describe_outcome(outcome: &UnpackOutcome) -> Option<String> {
    match outcome {
        UnpackOutcome::Success => None,
        UnpackOutcome::Failed(Some(code)) => Some(format!("exit status {}", code)),
        UnpackOutcome::Failed(None) => Some("extraction failed".into()),
        UnpackOutcome::Unreadable(e) => Some(format!("unreadable archive: {}", e)),
        UnpackOutcome::TimedOut(after) => Some(format!("timed out after {}s", after.as_secs())),
        UnpackOutcome::SpawnFailed(e) => Some(format!("could not run unpacker: {}", e)),
    }
}

/// The container could not be read at all: either the unpacker said so, or
/// it failed without leaving a single entry behind. Timeouts are not counted.
pub fn is_unreadable(outcome: &UnpackOutcome, out_dir: &Path) -> bool {
    match outcome {
        UnpackOutcome::Unreadable(_) => true,
        UnpackOutcome::Failed(_) => fs::read_dir(out_dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(true),
        _ => false,
    }
}
