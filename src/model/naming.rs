//! File naming for work items.
//!
//! Every work item owns two files under the output directory:
//! `<snake_name>_<id>_<YYYYMMDD_HHMM>.arg` for its arguments and the
//! `.txt` sibling for its log. The id makes the name unique even when
//! two items with the same name start in the same minute.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use super::id::WorkId;

/// `chrono` format for the timestamp part of a file name.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M";

pub const ARG_EXTENSION: &str = "arg";
pub const LOG_EXTENSION: &str = "txt";

/// Convert a hook name to snake case.
///
/// Word boundaries are case changes (`deployApp`, `HTTPServer`) and the
/// delimiters space, `-`, `.`, `_`, `/` and `\`. Runs of delimiters
/// collapse into one underscore; leading and trailing ones are dropped.
pub fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.trim().chars().collect();
    let mut out = String::with_capacity(chars.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if is_delimiter(c) {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            continue;
        }

        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|j| chars[j]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                // Last capital of an acronym run starts a new word: HTTPServer
                Some(p) if p.is_uppercase() => next.is_some_and(char::is_lowercase),
                _ => false,
            };
            if boundary && !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }

    while out.ends_with('_') {
        out.pop();
    }
    out
}

fn is_delimiter(c: char) -> bool {
    matches!(c, ' ' | '-' | '.' | '_' | '/' | '\\')
}

/// `<snake_name>_<id>_<YYYYMMDD_HHMM>`, without extension.
pub fn file_stem(name: &str, id: WorkId, created_at: &DateTime<Local>) -> String {
    format!(
        "{}_{}_{}",
        snake_case(name),
        id,
        created_at.format(TIMESTAMP_FORMAT)
    )
}

/// Path of the argument file for a work item.
pub fn arg_file(dir: &Path, name: &str, id: WorkId, created_at: &DateTime<Local>) -> PathBuf {
    dir.join(format!("{}.{ARG_EXTENSION}", file_stem(name, id, created_at)))
}

/// Path of the log file for a work item.
pub fn log_file(dir: &Path, name: &str, id: WorkId, created_at: &DateTime<Local>) -> PathBuf {
    dir.join(format!("{}.{LOG_EXTENSION}", file_stem(name, id, created_at)))
}
