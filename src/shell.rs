//! External command execution.
//!
//! Every call out to bash, docker helper scripts, `aws` or `vh` is described
//! by a [`CommandSpec`] and executed through a [`CommandRunner`], so the
//! orchestration layers can be exercised with a recording runner in tests.
//! Failed commands are never retried; callers decide how to report them.

use anyhow::{Context, Result, bail};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub env: Vec<(OsString, OsString)>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
        }
    }

    /// `bash <script> [args...]`
    pub fn bash(script: impl Into<OsString>) -> Self {
        Self::new("bash").arg(script)
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Program and arguments joined for messages and logs.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|part| part.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Program followed by arguments, lossily converted; handy in assertions.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|part| part.to_string_lossy().into_owned())
            .collect()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

pub trait CommandRunner {
    /// Run `spec` to completion. When `verbose`, the child's output is echoed
    /// to our stderr as it arrives; it is captured either way.
    fn run(&self, spec: &CommandSpec, verbose: bool) -> Result<CommandOutput>;
}

/// Runs commands as child processes of the current one.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run(&self, spec: &CommandSpec, verbose: bool) -> Result<CommandOutput> {
        debug!(command = %spec.display(), cwd = ?spec.cwd, "running");
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in &spec.env {
            command.env(key, value);
        }
        if let Some(dir) = spec.cwd.as_ref() {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to execute {}", spec.display()))?;
        let stdout = child.stdout.take().context("child stdout was not piped")?;
        let stderr = child.stderr.take().context("child stderr was not piped")?;

        // Drain stderr on its own thread so neither pipe can fill up and
        // stall the child.
        let stderr_reader = thread::spawn(move || collect_lines(stderr, verbose));
        let stdout = collect_lines(stdout, verbose);
        let stderr = stderr_reader
            .join()
            .map_err(|_| anyhow::anyhow!("stderr reader panicked"))?;

        // Reap the child before reporting a broken pipe.
        let status = child
            .wait()
            .with_context(|| format!("waiting for {}", spec.display()))?;
        debug!(command = %spec.display(), code = ?status.code(), "finished");
        let stdout = stdout.with_context(|| format!("reading stdout of {}", spec.display()))?;
        let stderr = stderr.with_context(|| format!("reading stderr of {}", spec.display()))?;

        Ok(CommandOutput {
            code: status.code(),
            stdout,
            stderr,
        })
    }
}

/// Run `spec` and turn a non-zero exit into an error carrying the captured
/// stderr, prefixed with `failure`.
pub fn run_checked(
    runner: &dyn CommandRunner,
    spec: &CommandSpec,
    verbose: bool,
    failure: &str,
) -> Result<CommandOutput> {
    let output = runner.run(spec, verbose)?;
    if output.success() {
        return Ok(output);
    }
    match output.code {
        Some(code) => bail!("{failure} (exit {code}): {}", output.stderr.trim_end()),
        None => bail!("{failure} (terminated by signal): {}", output.stderr.trim_end()),
    }
}

/// Records every command instead of running it and answers with canned
/// outputs (success with empty streams once the queue runs dry).
#[derive(Debug, Default)]
pub struct RecordingRunner {
    calls: RefCell<Vec<(CommandSpec, bool)>>,
    replies: RefCell<VecDeque<CommandOutput>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the output returned by the next unanswered `run`.
    pub fn reply(&self, output: CommandOutput) -> &Self {
        self.replies.borrow_mut().push_back(output);
        self
    }

    /// Queue a failing reply with the given exit code and stderr.
    pub fn fail_next(&self, code: i32, stderr: &str) -> &Self {
        self.reply(CommandOutput {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.to_string(),
        })
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls
            .borrow()
            .iter()
            .map(|(spec, _)| spec.clone())
            .collect()
    }

    /// Verbosity flag passed with each recorded call.
    pub fn verbosity(&self) -> Vec<bool> {
        self.calls.borrow().iter().map(|(_, verbose)| *verbose).collect()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, spec: &CommandSpec, verbose: bool) -> Result<CommandOutput> {
        self.calls.borrow_mut().push((spec.clone(), verbose));
        Ok(self.replies.borrow_mut().pop_front().unwrap_or(CommandOutput {
            code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        }))
    }
}

fn collect_lines(stream: impl Read, verbose: bool) -> std::io::Result<String> {
    let mut reader = BufReader::new(stream);
    let mut captured = String::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(captured);
        }
        let text = String::from_utf8_lossy(&line);
        if verbose {
            let mut sink = std::io::stderr().lock();
            let _ = sink.write_all(text.as_bytes());
            let _ = sink.flush();
        }
        captured.push_str(&text);
    }
}
