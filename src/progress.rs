//! Batch reindex progress reporting.
//!
//! Progress goes to **stderr** so stdout stays parseable (dry-run tables,
//! summaries). Human output is on only when stderr is a terminal.

use std::io::Write;

/// A single progress event during a reindex batch.
#[derive(Clone, Debug)]
pub enum ReindexEvent {
    /// Candidate files were enumerated.
    Discovered { label: String, total: u64 },
    /// File `n` of `total` finished with `status`.
    Processed {
        n: u64,
        total: u64,
        id: String,
        status: &'static str,
    },
}

/// Receives progress from the reindex engine.
pub trait ReindexProgress: Send + Sync {
    fn report(&self, event: ReindexEvent);
}

/// Human-friendly progress on stderr: "reindex  12 / 1,340 files".
pub struct StderrProgress;

impl ReindexProgress for StderrProgress {
    fn report(&self, event: ReindexEvent) {
        let line = match &event {
            ReindexEvent::Discovered { label, total } => {
                format!("reindex {}  {} files\n", label, format_number(*total))
            }
            ReindexEvent::Processed { n, total, id, status } => format!(
                "reindex  {} / {}  {}  {}\n",
                format_number(*n),
                format_number(*total),
                status,
                id
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

pub struct NoProgress;

impl ReindexProgress for NoProgress {
    fn report(&self, _event: ReindexEvent) {}
}

pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ReindexProgress> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
        }
    }
}
