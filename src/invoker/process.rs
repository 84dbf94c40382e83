//! Child-process implementation of [`Invoker`].

use super::{Invocation, InvocationResult, Invoker, IoMode, StatusLog};
use crate::error::{GpgError, Result};
use std::ffi::OsString;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::{Builder, NamedTempFile};
use tracing::{debug, trace, warn};

/// Locale forced onto machine-readable calls
const NEUTRAL_LOCALE: &str = "C";

/// Poll interval while waiting on a child under a deadline
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Baseline flags prepended to every non-bare call
const BASELINE_FLAGS: &[&str] = &[
    "--no-tty",
    "--no-secmem-warning",
    "--no-default-keyring",
    "--yes",
    "--batch",
];

/// Runs the engine binary as a child process
#[derive(Debug, Clone)]
pub struct ProcessInvoker {
    binary: PathBuf,
    extra_args: Vec<String>,
    timeout: Option<Duration>,
}

impl ProcessInvoker {
    /// Create an invoker for the given engine binary
    pub fn new<P: Into<PathBuf>>(binary: P) -> Self {
        Self {
            binary: binary.into(),
            extra_args: Vec::new(),
            timeout: None,
        }
    }

    /// Additional flags appended after the fixed baseline
    pub fn with_extra_args(mut self, extra_args: Vec<String>) -> Self {
        self.extra_args = extra_args;
        self
    }

    /// Kill the child once this much time has passed
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Full argument vector for a call, status/output paths already allocated
    fn command_line(
        &self,
        invocation: &Invocation,
        status_path: Option<&Path>,
        output_path: Option<&Path>,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();

        if invocation.uses_baseline() {
            args.extend(BASELINE_FLAGS.iter().map(OsString::from));
            if let Some(home) = invocation.home() {
                args.push("--homedir".into());
                args.push(home.as_os_str().to_os_string());
            }
            if !invocation.is_verbose() {
                args.push("--quiet".into());
            }
            if let Some(path) = status_path {
                args.push("--status-file".into());
                args.push(path.as_os_str().to_os_string());
            }
            args.extend(self.extra_args.iter().map(OsString::from));
        }

        if let Some(path) = output_path {
            args.push("--output".into());
            args.push(path.as_os_str().to_os_string());
        }

        args.extend(invocation.arguments().iter().cloned());
        args
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus> {
        let Some(timeout) = self.timeout else {
            return child
                .wait()
                .map_err(|e| GpgError::process(format!("Failed to wait for engine: {}", e)));
        };

        let deadline = Instant::now() + timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) if Instant::now() >= deadline => {
                    warn!(timeout_secs = timeout.as_secs(), "Engine timed out, killing it");
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(GpgError::process(format!(
                        "Engine did not finish within {:?}",
                        timeout
                    )));
                }
                Ok(None) => thread::sleep(WAIT_POLL_INTERVAL),
                Err(e) => {
                    return Err(GpgError::process(format!(
                        "Failed to wait for engine: {}",
                        e
                    )))
                }
            }
        }
    }
}

/// Scoped capture file; removed when dropped
fn capture_file(dir: Option<&Path>, prefix: &str) -> Result<NamedTempFile> {
    let mut builder = Builder::new();
    builder.prefix(prefix);
    let file = match dir {
        Some(dir) if dir.is_dir() => builder.tempfile_in(dir),
        _ => builder.tempfile(),
    };
    file.map_err(|e| GpgError::process(format!("Failed to create capture file: {}", e)))
}

fn read_capture(file: &NamedTempFile) -> Result<Vec<u8>> {
    fs::read(file.path())
        .map_err(|e| GpgError::process(format!("Failed to read engine output: {}", e)))
}

impl Invoker for ProcessInvoker {
    fn invoke(&self, invocation: &Invocation) -> Result<InvocationResult> {
        let home = invocation.home();
        let status_file = if invocation.uses_baseline() {
            Some(capture_file(home, "status-")?)
        } else {
            None
        };
        let output_file = if invocation.wants_output() {
            Some(capture_file(home, "output-")?)
        } else {
            None
        };
        let stderr_file = if invocation.wants_stderr() {
            Some(capture_file(home, "stderr-")?)
        } else {
            None
        };

        let program = invocation.program_override().unwrap_or(self.binary.as_path());
        let args = self.command_line(
            invocation,
            status_file.as_ref().map(NamedTempFile::path),
            output_file.as_ref().map(NamedTempFile::path),
        );

        debug!(
            program = %program.display(),
            args = ?args,
            mode = ?invocation.mode(),
            machine_readable = invocation.is_machine_readable(),
            "Invoking engine"
        );

        let mut command = Command::new(program);
        command.args(&args);
        command.stdin(match invocation.mode() {
            IoMode::Write => Stdio::piped(),
            IoMode::Read => Stdio::null(),
        });
        command.stdout(if invocation.wants_output() {
            Stdio::null()
        } else {
            Stdio::piped()
        });
        command.stderr(match &stderr_file {
            Some(file) => Stdio::from(file.reopen().map_err(|e| {
                GpgError::process(format!("Failed to open stderr capture: {}", e))
            })?),
            None => Stdio::null(),
        });
        if invocation.is_machine_readable() {
            command
                .env("LC_ALL", NEUTRAL_LOCALE)
                .env("LANG", NEUTRAL_LOCALE)
                .env("LANGUAGE", NEUTRAL_LOCALE);
        }

        let mut child = command.spawn().map_err(|e| {
            GpgError::process(format!(
                "Failed to start engine {}: {}",
                program.display(),
                e
            ))
        })?;

        let stdout_reader = child.stdout.take().map(|mut stdout| {
            thread::spawn(move || {
                let mut buffer = Vec::new();
                stdout.read_to_end(&mut buffer).map(|_| buffer)
            })
        });

        // Fed from its own thread so the bounded wait also covers a child that never drains it
        let stdin_writer = child.stdin.take().map(|mut stdin| {
            let input = invocation.encoded_input();
            thread::spawn(move || stdin.write_all(&input))
        });

        let exit = self.wait(&mut child)?;

        if let Some(handle) = stdin_writer {
            match handle.join() {
                Ok(Ok(())) => {}
                // A child that exits before draining its input closes the pipe;
                // its status file then says what went wrong.
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!("Engine closed its input early")
                }
                Ok(Err(e)) => {
                    return Err(GpgError::process(format!(
                        "Failed to write to engine: {}",
                        e
                    )))
                }
                Err(_) => return Err(GpgError::process("Engine stdin writer panicked")),
            }
        }

        let stdout = match stdout_reader {
            Some(handle) => handle
                .join()
                .map_err(|_| GpgError::process("Engine stdout reader panicked"))?
                .map_err(|e| GpgError::process(format!("Failed to read from engine: {}", e)))?,
            None => Vec::new(),
        };

        let status = match &status_file {
            Some(file) => StatusLog::parse(&String::from_utf8_lossy(&read_capture(file)?)),
            None => StatusLog::default(),
        };
        for line in status.keywords() {
            trace!(keyword = line, "Engine status");
        }

        let output = output_file.as_ref().map(read_capture).transpose()?;
        let stderr = match &stderr_file {
            Some(file) => String::from_utf8_lossy(&read_capture(file)?).into_owned(),
            None => String::new(),
        };

        debug!(
            exit_code = ?exit.code(),
            status = ?status.keywords(),
            output_bytes = output.as_ref().map(Vec::len),
            "Engine finished"
        );

        Ok(InvocationResult {
            stdout,
            output,
            stderr,
            status,
            exit_code: exit.code(),
        })
    }
}
