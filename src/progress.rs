//! Progress reporting hooks for long-running stages.
//!
//! Stages call a [`ProgressReporter`] after each unit of work instead of
//! printing directly, so the same pipeline can feed a log, a terminal
//! status line, or a test recorder.

use std::fmt;
use tracing::info;

/// Which stage a progress report belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Collect,
    Enrich,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Collect => "collect",
            Stage::Enrich => "enrich",
        })
    }
}

/// Receives `done/total` updates from a running stage.
pub trait ProgressReporter {
    fn report(&self, stage: Stage, done: usize, total: usize);
}

impl<F> ProgressReporter for F
where
    F: Fn(Stage, usize, usize),
{
    fn report(&self, stage: Stage, done: usize, total: usize) {
        self(stage, done, total)
    }
}

/// Default reporter: one `info` event per update.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn report(&self, stage: Stage, done: usize, total: usize) {
        info!(%stage, done, total, "Current progress: {done}/{total}");
    }
}
