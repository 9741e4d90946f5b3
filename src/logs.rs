//! Filtered views of a work item's log file.
//!
//! Log files are plain newline-delimited text written by the executor.
//! Lines may start with a caller-defined token (`notify:`, `INFO`, ...);
//! extraction keeps the lines carrying a given token and strips it.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use opentelemetry::KeyValue;
use tracing::debug;

use crate::error::{Error, Result};
use crate::telemetry::metrics;

/// Read `path` once, front to back, and return every line that starts
/// with `prefix`, with the prefix and any following spaces removed.
///
/// An empty prefix matches every line. Failing to open or read the file
/// is an error; a file without matching lines yields an empty string.
pub fn extract_log(path: impl AsRef<Path>, prefix: &str) -> Result<String> {
    let path = path.as_ref();

    let result = File::open(path)
        .map_err(|source| Error::LogOpen {
            path: path.to_path_buf(),
            source,
        })
        .and_then(|file| {
            filter_lines(BufReader::new(file), prefix).map_err(|source| Error::LogRead {
                path: path.to_path_buf(),
                source,
            })
        });

    let outcome = if result.is_ok() { "ok" } else { "error" };
    metrics::log_extractions().add(1, &[KeyValue::new("result", outcome)]);

    match &result {
        Ok(content) => debug!(
            path = %path.display(),
            prefix,
            lines = content.lines().count(),
            "log extracted"
        ),
        Err(e) => debug!(path = %path.display(), prefix, error = %e, "log extraction failed"),
    }

    result
}

/// Line filter behind [`extract_log`], usable on any reader.
///
/// Matching is a byte-wise, case-sensitive prefix test. Only ASCII
/// spaces are trimmed after the prefix, tabs are kept. A trailing `\r`
/// is dropped with the newline. On a read error the partial output is
/// discarded.
pub fn filter_lines<R: BufRead>(mut reader: R, prefix: &str) -> io::Result<String> {
    let prefix = prefix.as_bytes();
    let mut out = String::new();
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }

        let mut bytes = line.as_slice();
        bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
        bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);

        let Some(rest) = bytes.strip_prefix(prefix) else {
            continue;
        };
        let start = rest.iter().position(|&b| b != b' ').unwrap_or(rest.len());

        out.push_str(&String::from_utf8_lossy(&rest[start..]));
        out.push('\n');
    }

    Ok(out)
}
