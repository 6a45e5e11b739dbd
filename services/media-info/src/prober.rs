//! Runs ffprobe against a downloaded file
//!
//! The tool is invoked with an argument vector, never through a shell, so file
//! names cannot change the command line.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::context::RequestContext;

/// Arguments placed before the input path
const PROBE_ARGS: [&str; 6] = [
    "-v",
    "quiet",
    "-print_format",
    "json",
    "-show_format",
    "-show_streams",
];

/// Exit code shells use for "command not found"
const EXIT_COMMAND_NOT_FOUND: i32 = 127;

/// ffprobe could not be started or exited non-zero
#[derive(Error, Debug)]
#[error("{diagnosis}")]
pub struct ProbeError {
    pub diagnosis: ProbeDiagnosis,
    /// Command line that was run, for the request log
    pub command: String,
    /// Combined stdout and stderr
    pub output: String,
}

impl ProbeError {
    pub fn detail(&self) -> String {
        let mut detail = format!("Command: {}\n{}", self.command, self.diagnosis.verbose());
        if !self.output.is_empty() {
            detail.push_str("\nFull output:\n");
            detail.push_str(&self.output);
        }
        detail
    }
}

/// Best-effort explanation of a failed ffprobe run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeDiagnosis {
    /// `None` when the process never ran or was killed by a signal
    pub exit_code: Option<i32>,
    pub command_not_found: bool,
    pub tool_path: String,
    /// First output line that looks like an error message
    pub cause_line: Option<String>,
    pub last_line: Option<String>,
}

impl ProbeDiagnosis {
    /// Summary plus the last line of output
    pub fn verbose(&self) -> String {
        match &self.last_line {
            Some(line) => format!("{} Last line of output: {}", self, line),
            None => self.to_string(),
        }
    }
}

impl fmt::Display for ProbeDiagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.command_not_found {
            write!(
                f,
                "FFprobe execution failed: Command not found. Path used: '{}'.",
                self.tool_path
            )?;
        } else {
            match self.exit_code {
                Some(code) => write!(f, "FFprobe failed with exit code {}.", code)?,
                None => write!(f, "FFprobe terminated without an exit code.")?,
            }
        }

        if let Some(cause) = &self.cause_line {
            write!(f, " Potential cause: {}", cause)?;
        }
        Ok(())
    }
}

/// Classify a failed run from its exit code and combined output
pub fn explain_probe_failure(tool_path: &Path, exit_code: Option<i32>, output: &str) -> ProbeDiagnosis {
    static DIAGNOSTIC_LINE: OnceLock<Regex> = OnceLock::new();
    let diagnostic_line = DIAGNOSTIC_LINE.get_or_init(|| {
        Regex::new(r"(?i)(error|fail|invalid|corrupt|no such file|unable to open)")
            .expect("Failed to compile diagnostic line regex")
    });

    let tool_path = tool_path.display().to_string();
    let lowered = output.to_lowercase();
    let mentions_missing =
        lowered.contains("not found") || lowered.contains("no such file or directory");
    let command_not_found = exit_code == Some(EXIT_COMMAND_NOT_FOUND)
        || (mentions_missing && output.contains(&tool_path));

    let lines = || output.lines().map(str::trim).filter(|l| !l.is_empty());

    ProbeDiagnosis {
        exit_code,
        command_not_found,
        cause_line: lines()
            .find(|line| diagnostic_line.is_match(line))
            .map(str::to_string),
        last_line: lines().last().map(str::to_string),
        tool_path,
    }
}

#[derive(Debug, Clone)]
pub struct Prober {
    ffprobe_path: PathBuf,
}

impl Prober {
    pub fn new(ffprobe_path: PathBuf) -> Self {
        Self { ffprobe_path }
    }

    /// Run ffprobe and return its JSON report as text
    ///
    /// The child is killed if this future is dropped, which is how the
    /// request budget interrupts a hanging probe.
    pub async fn probe(&self, ctx: &RequestContext, local_path: &Path) -> Result<String, ProbeError> {
        let command = format!(
            "{} {} {}",
            self.ffprobe_path.display(),
            PROBE_ARGS.join(" "),
            local_path.display()
        );
        ctx.log(&format!("Executing FFprobe: {}", command)).await;

        let output = Command::new(&self.ffprobe_path)
            .args(PROBE_ARGS)
            .arg(local_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                warn!("Failed to spawn {}: {}", self.ffprobe_path.display(), e);
                let message = format!("{}: {}", self.ffprobe_path.display(), e);
                let mut diagnosis = explain_probe_failure(&self.ffprobe_path, None, &message);
                diagnosis.command_not_found |= e.kind() == std::io::ErrorKind::NotFound;
                return Err(ProbeError {
                    diagnosis,
                    command,
                    output: message,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            let combined = combine_output(&stdout, &stderr);
            let diagnosis =
                explain_probe_failure(&self.ffprobe_path, output.status.code(), &combined);
            ctx.log(&format!(
                "FFprobe Execution Failed (Return Code: {:?})",
                output.status.code()
            ))
            .await;
            return Err(ProbeError {
                diagnosis,
                command,
                output: combined,
            });
        }

        if !stderr.trim().is_empty() {
            debug!(request_id = %ctx.id(), "ffprobe stderr: {}", stderr.trim());
        }

        Ok(stdout)
    }
}

fn combine_output(stdout: &str, stderr: &str) -> String {
    match (stdout.trim().is_empty(), stderr.trim().is_empty()) {
        (true, _) => stderr.to_string(),
        (false, true) => stdout.to_string(),
        (false, false) => format!("{}\n{}", stdout.trim_end(), stderr),
    }
}
