//! Harvest progress reporting.
//!
//! Reports observable progress during `harvest fetch` so operators see how
//! far a long run has come and where it will resume from. Progress is
//! emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event for a harvest run.
#[derive(Clone, Debug)]
pub enum HarvestProgressEvent {
    /// Run started at `cursor` (non-zero when resuming a checkpoint).
    Started {
        dataset: String,
        cursor: u64,
        total: u64,
    },
    /// `n` of `total` ids processed.
    Advanced { dataset: String, n: u64, total: u64 },
    /// A checkpoint was written at `cursor`.
    Checkpointed { dataset: String, cursor: u64 },
}

/// Reports harvest progress. Implementations write to stderr (human or JSON).
pub trait HarvestProgressReporter: Send + Sync {
    fn report(&self, event: HarvestProgressEvent);
}

/// Human-friendly progress on stderr: "harvest details  1,234 / 5,000 ids".
pub struct StderrProgress;

impl HarvestProgressReporter for StderrProgress {
    fn report(&self, event: HarvestProgressEvent) {
        let line = match &event {
            HarvestProgressEvent::Started {
                dataset,
                cursor,
                total,
            } => format!(
                "harvest {}  starting at {} / {} ids\n",
                dataset,
                format_number(*cursor),
                format_number(*total)
            ),
            HarvestProgressEvent::Advanced { dataset, n, total } => format!(
                "harvest {}  {} / {} ids\n",
                dataset,
                format_number(*n),
                format_number(*total)
            ),
            HarvestProgressEvent::Checkpointed { dataset, cursor } => format!(
                "harvest {}  checkpoint at {}\n",
                dataset,
                format_number(*cursor)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl HarvestProgressReporter for JsonProgress {
    fn report(&self, event: HarvestProgressEvent) {
        let obj = match &event {
            HarvestProgressEvent::Started {
                dataset,
                cursor,
                total,
            } => serde_json::json!({
                "event": "started",
                "dataset": dataset,
                "cursor": cursor,
                "total": total
            }),
            HarvestProgressEvent::Advanced { dataset, n, total } => serde_json::json!({
                "event": "progress",
                "dataset": dataset,
                "n": n,
                "total": total
            }),
            HarvestProgressEvent::Checkpointed { dataset, cursor } => serde_json::json!({
                "event": "checkpoint",
                "dataset": dataset,
                "cursor": cursor
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl HarvestProgressReporter for NoProgress {
    fn report(&self, _event: HarvestProgressEvent) {}
}

/// `1234567` → `"1,234,567"`.
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn HarvestProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
