//src/aligner.rs

use std::fmt;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::process::{Command, Stdio};

use crate::errors::{Error, Result};
use crate::sam::LineBuffer;

/// Default program names, overridable from the command line.
pub const BOWTIE2: &str = "bowtie2";
pub const BOWTIE2_BUILD: &str = "bowtie2-build";

const READ_CHUNK: usize = 64 * 1024;

/// A program plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for a in &self.args {
            write!(f, " {a}")?;
        }
        Ok(())
    }
}

/// How a tool run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// Output received after the last newline.
    pub remainder: String,
}

impl ToolOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs an external tool, handing each complete stdout line to `on_line`.
///
/// An error from `on_line` stops the run and is returned as-is.
pub trait ToolRunner {
    fn invoke(
        &mut self,
        command: &ToolCommand,
        on_line: &mut dyn FnMut(&str) -> Result<()>,
    ) -> Result<ToolOutcome>;
}

/// Spawns the tool as a child process with piped stdout and blocks until it exits.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubprocessRunner;

impl ToolRunner for SubprocessRunner {
    fn invoke(
        &mut self,
        command: &ToolCommand,
        on_line: &mut dyn FnMut(&str) -> Result<()>,
    ) -> Result<ToolOutcome> {
        log::info!("Running this command:\n{command}");

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Spawn {
                program: command.program.clone(),
                source: e,
            })?;

        let mut stdout = child.stdout.take().ok_or_else(|| Error::Spawn {
            program: command.program.clone(),
            source: std::io::Error::new(ErrorKind::BrokenPipe, "stdout was not captured"),
        })?;

        let mut lines = LineBuffer::new();
        let mut buf = vec![0u8; READ_CHUNK];
        let pumped: Result<()> = loop {
            let n = match stdout.read(&mut buf) {
                Ok(0) => break Ok(()),
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    break Err(Error::io(format!("<{} stdout>", command.program), e))
                }
            };
            lines.push(&buf[..n]);
            let handled = drain_lines(&mut lines, on_line);
            if handled.is_err() {
                break handled;
            }
        };
        drop(stdout);

        if let Err(e) = pumped {
            // Don't leave the tool running once its output is no longer wanted.
            let _ = child.kill();
            let _ = child.wait();
            return Err(e);
        }

        let status = child
            .wait()
            .map_err(|e| Error::io(format!("<{}>", command.program), e))?;

        Ok(ToolOutcome {
            exit_code: status.code(),
            remainder: lines.take_remainder(),
        })
    }
}

/// Hands every complete buffered line to `on_line`.
pub fn drain_lines(
    lines: &mut LineBuffer,
    on_line: &mut dyn FnMut(&str) -> Result<()>,
) -> Result<()> {
    while let Some(line) = lines.next_line() {
        on_line(&line)?;
    }
    Ok(())
}

/// `bowtie2` invocation reporting every end-to-end alignment of the query reads.
pub fn alignment_command(program: &str, threads: usize, index_prefix: &str, query: &Path) -> ToolCommand {
    ToolCommand::new(program)
        .args([
            "--quiet",
            "--no-head",
            "--no-unal",
            "--omit-sec-seq",
            "--all",
            "--end-to-end",
            "--fast",
            "-f",
        ])
        .arg("--threads")
        .arg(threads.to_string())
        .arg("-x")
        .arg(index_prefix)
        .arg("-U")
        .arg(query.display().to_string())
}

/// `bowtie2-build` invocation for one reference chunk.
pub fn index_build_command(program: &str, threads: usize, chunk: &Path, index_prefix: &str) -> ToolCommand {
    ToolCommand::new(program)
        .args(["-f", "-o", "3", "-q"])
        .arg("--threads")
        .arg(threads.to_string())
        .arg(chunk.display().to_string())
        .arg(index_prefix)
}

/// Replays canned output, split into uneven slices, instead of running a program.
#[cfg(test)]
pub(crate) struct CannedRunner {
    pub outputs: std::collections::VecDeque<(Vec<u8>, Option<i32>)>,
    pub commands: Vec<ToolCommand>,
}

#[cfg(test)]
impl CannedRunner {
    pub fn new<I, O>(outputs: I) -> Self
    where
        I: IntoIterator<Item = (O, Option<i32>)>,
        O: Into<Vec<u8>>,
    {
        Self {
            outputs: outputs
                .into_iter()
                .map(|(out, code)| (out.into(), code))
                .collect(),
            commands: Vec::new(),
        }
    }
}

#[cfg(test)]
impl ToolRunner for CannedRunner {
    fn invoke(
        &mut self,
        command: &ToolCommand,
        on_line: &mut dyn FnMut(&str) -> Result<()>,
    ) -> Result<ToolOutcome> {
        self.commands.push(command.clone());
        let (output, exit_code) = self.outputs.pop_front().unwrap_or_default();

        let mut lines = LineBuffer::new();
        for piece in output.chunks(7) {
            lines.push(piece);
            drain_lines(&mut lines, on_line)?;
        }
        Ok(ToolOutcome {
            exit_code,
            remainder: lines.take_remainder(),
        })
    }
}
