//! Packer CLI wrapper
//!
//! The build tool is an opaque external command. [`BuildTool`] is the seam
//! the builders depend on; [`Packer`] implements it by running `packer`.

use crate::error::{BuildError, Result};
use crate::progress::BuildProgress;
use async_trait::async_trait;
use colored::Colorize;
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

/// Lines of tool output kept for error reports
const OUTPUT_TAIL_LINES: usize = 20;

/// An external image-building tool
#[async_trait]
pub trait BuildTool: Send + Sync {
    /// Tool name for messages
    fn name(&self) -> &str;

    /// Initialize the working directory (plugin installation etc.)
    async fn init(&self, workdir: &Path) -> Result<()>;

    /// Build `template` inside `workdir` with the given variable overrides
    async fn build(
        &self,
        workdir: &Path,
        template: &str,
        variables: &BTreeMap<String, String>,
    ) -> Result<()>;
}

/// How tool output reaches the terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Print every line
    Stream,
    /// Spinner showing the latest line
    #[default]
    Spinner,
    /// Log at debug level only
    Quiet,
}

/// `packer` CLI wrapper
pub struct Packer {
    program: PathBuf,
    output: OutputMode,
}

impl Default for Packer {
    fn default() -> Self {
        Self::new("packer")
    }
}

impl Packer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            output: OutputMode::default(),
        }
    }

    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    /// Arguments of `packer build`
    pub fn build_args(template: &str, variables: &BTreeMap<String, String>) -> Vec<String> {
        let mut args = vec!["build".to_string(), "-force".to_string()];
        for (key, value) in variables {
            args.push("-var".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(template.to_string());
        args
    }

    /// Run packer in `workdir`, forwarding output according to the output mode
    async fn run(&self, workdir: &Path, args: &[String]) -> Result<()> {
        let command_line = format!("{} {}", self.program.display(), args.join(" "));
        tracing::debug!(workdir = %workdir.display(), "Running: {}", command_line);

        let mut child = Command::new(&self.program)
            .args(args)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    BuildError::ToolNotFound(self.program.display().to_string())
                }
                _ => BuildError::Io(e),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BuildError::InvalidConfig("packer stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BuildError::InvalidConfig("packer stderr not captured".to_string()))?;

        let progress = match self.output {
            OutputMode::Spinner => BuildProgress::new(&format!("packer {}", args[0])),
            _ => BuildProgress::hidden(),
        };
        let output = self.output;

        // QEMU console output is not always UTF-8; decode lossily and keep
        // draining so packer never writes into a closed pipe
        let read_stdout = async {
            let mut tail = VecDeque::with_capacity(OUTPUT_TAIL_LINES);
            let mut reader = BufReader::new(stdout);
            let mut raw = Vec::new();
            loop {
                raw.clear();
                if reader.read_until(b'\n', &mut raw).await? == 0 {
                    break;
                }
                let line = String::from_utf8_lossy(&raw).trim_end().to_string();
                tracing::debug!(target: "packer", "{}", line);
                match output {
                    OutputMode::Stream => println!("  {} {}", "│".dimmed(), line),
                    OutputMode::Spinner => progress.set_message(&line),
                    OutputMode::Quiet => {}
                }
                if tail.len() == OUTPUT_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Ok::<_, std::io::Error>(tail)
        };
        let read_stderr = async {
            let mut buf = Vec::new();
            BufReader::new(stderr).read_to_end(&mut buf).await?;
            Ok::<_, std::io::Error>(String::from_utf8_lossy(&buf).into_owned())
        };

        let (tail, errors, status) = tokio::join!(read_stdout, read_stderr, child.wait());
        let (tail, errors, status) = (tail?, errors?, status?);

        if !status.success() {
            progress.finish_error(&command_line);
            // packer reports most failures on stdout
            let output = if errors.trim().is_empty() {
                tail.into_iter().collect::<Vec<_>>().join("\n")
            } else {
                errors.trim_end().to_string()
            };
            return Err(BuildError::BuildFailed {
                stage: format!("packer {}", args[0]),
                command: command_line,
                status: status.to_string(),
                output,
            });
        }

        progress.finish_success(&command_line);
        Ok(())
    }
}

#[async_trait]
impl BuildTool for Packer {
    fn name(&self) -> &str {
        "packer"
    }

    async fn init(&self, workdir: &Path) -> Result<()> {
        self.run(workdir, &["init".to_string(), ".".to_string()])
            .await
    }

    async fn build(
        &self,
        workdir: &Path,
        template: &str,
        variables: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.run(workdir, &Self::build_args(template, variables))
            .await
    }
}
