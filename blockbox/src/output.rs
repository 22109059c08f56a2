//! Command results for the blockbox CLI.
//!
//! One-shot commands print either a human summary or, with `--json`, the
//! serialized result record. Logs never go to stdout, so both forms can be
//! piped.

use anyhow::Result;
use blockbox_core::{ContainerStats, Listing, Problem, VerifyReport};
use serde::Serialize;
use std::io::{self, Write};

/// Prints command results and failures in the format picked by `--json`.
pub struct OutputWriter {
    json: bool,
}

impl OutputWriter {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    /// Print `data` as pretty JSON, or the text from `text_fn` otherwise.
    ///
    /// `text_fn` only runs in text mode.
    pub fn write<T: Serialize>(&self, data: &T, text_fn: impl FnOnce() -> String) -> Result<()> {
        let rendered = self.render(data, text_fn)?;
        let mut stdout = io::stdout().lock();
        stdout.write_all(rendered.as_bytes())?;
        stdout.flush()?;
        Ok(())
    }

    /// Report a failed command on stderr, with its full context chain.
    pub fn write_error(&self, error: &anyhow::Error, result_code: u8) {
        let message = format!("{:#}", error);
        let rendered = if self.json {
            let failure = ErrorOutput {
                success: false,
                result_code,
                error: message,
            };
            serde_json::to_string_pretty(&failure)
                .map(|json| json + "\n")
                .unwrap_or_default()
        } else {
            format!("Error: {}\n", message)
        };
        let _ = io::stderr().write_all(rendered.as_bytes());
    }

    fn render<T: Serialize>(&self, data: &T, text_fn: impl FnOnce() -> String) -> Result<String> {
        if self.json {
            Ok(serde_json::to_string_pretty(data)? + "\n")
        } else {
            Ok(text_fn())
        }
    }
}

// Result records. Every record carries `success` and `result_code` so JSON
// consumers can branch without parsing text.

/// Error output structure.
#[derive(Debug, Serialize)]
pub struct ErrorOutput {
    pub success: bool,
    pub result_code: u8,
    pub error: String,
}

/// Output for `init` command.
#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub result_code: u8,
    pub container: String,
    pub block_size: u32,
}

/// Output for `copy-in` command.
#[derive(Debug, Serialize)]
pub struct CopyInOutput {
    pub success: bool,
    pub result_code: u8,
    pub source: String,
    pub path: String,
    pub size: u64,
}

/// Output for `copy-out` command.
#[derive(Debug, Serialize)]
pub struct CopyOutOutput {
    pub success: bool,
    pub result_code: u8,
    pub path: String,
    pub destination: String,
    pub size: u64,
}

/// Output for `rm` command.
#[derive(Debug, Serialize)]
pub struct RmOutput {
    pub success: bool,
    pub result_code: u8,
    pub path: String,
}

/// Output for `ls` command.
#[derive(Debug, Serialize)]
pub struct LsOutput {
    pub success: bool,
    pub result_code: u8,
    #[serde(flatten)]
    pub listing: Listing,
}

/// Output for `stat` command.
#[derive(Debug, Serialize)]
pub struct StatOutput {
    pub success: bool,
    pub result_code: u8,
    pub container: String,
    #[serde(flatten)]
    pub stats: ContainerStats,
}

/// Output for `verify` command.
#[derive(Debug, Serialize)]
pub struct VerifyOutput {
    pub success: bool,
    pub result_code: u8,
    #[serde(flatten)]
    pub report: VerifyReport,
}

/// Output for `import` command.
#[derive(Debug, Serialize)]
pub struct ImportOutput {
    pub success: bool,
    pub result_code: u8,
    pub source: String,
    pub destination: String,
    pub files: usize,
    pub bytes: u64,
}

/// Render a directory listing as text, directories first.
pub fn listing_text(listing: &Listing) -> String {
    let mut out = String::new();
    for dir in &listing.dirs {
        out.push_str(&format!("{}\\\n", dir));
    }
    for file in &listing.files {
        match file.size {
            Some(size) => out.push_str(&format!("{:>10}  {}\n", size, file.name)),
            None => out.push_str(&format!("{:>10}  {}\n", "?", file.name)),
        }
    }
    if out.is_empty() {
        out.push_str("(empty)\n");
    }
    out
}

/// Render one verification problem as text.
pub fn problem_text(problem: &Problem) -> String {
    match problem {
        Problem::HashMismatch { stored, computed } => {
            format!("hash mismatch: stored {} but data hashes to {}", stored, computed)
        }
        Problem::RefCountMismatch {
            hash,
            stored,
            referenced,
        } => format!(
            "refcount mismatch on {}: stored {} but {} references",
            hash, stored, referenced
        ),
        Problem::DanglingReference { path, index } => {
            format!("dangling reference in {} at block {}", path, index)
        }
        Problem::OversizedBlock { hash, len } => {
            format!("block {} is {} bytes, larger than the block size", hash, len)
        }
    }
}
