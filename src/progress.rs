//! Ingestion progress reporting.
//!
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event for ingestion.
#[derive(Clone, Debug)]
pub enum IngestProgressEvent {
    /// Rows fetched from the source.
    Fetched { source: String, rows: u64 },
    /// `n` of `total` documents embedded.
    Embedding { n: u64, total: u64 },
}

/// Reports ingestion progress.
pub trait IngestProgressReporter: Send + Sync {
    fn report(&self, event: IngestProgressEvent);
}

/// Human-friendly progress on stderr: "ingest  embedding  1,234 / 5,000 documents".
pub struct StderrProgress;

impl IngestProgressReporter for StderrProgress {
    fn report(&self, event: IngestProgressEvent) {
        let line = match &event {
            IngestProgressEvent::Fetched { source, rows } => {
                format!("ingest  fetched {} rows from {}\n", format_number(*rows), source)
            }
            IngestProgressEvent::Embedding { n, total } => format!(
                "ingest  embedding  {} / {} documents\n",
                format_number(*n),
                format_number(*total)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Discards all events.
pub struct NoProgress;

impl IngestProgressReporter for NoProgress {
    fn report(&self, _event: IngestProgressEvent) {}
}

/// Format a number with thousands separators (e.g. 1234 → "1,234").
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut out = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }
}
