//! Process invocation of the external OpenPGP engine.
//!
//! An [`Invocation`] describes one engine call: the operation-specific
//! arguments, whether the caller streams input lines to the engine, and what
//! has to be captured. An [`Invoker`] turns it into an [`InvocationResult`].
//! [`ProcessInvoker`] is the real implementation; tests substitute a
//! scripted one so the orchestrators can be exercised from recorded
//! transcripts.

pub mod process;
pub mod status;

#[cfg(test)]
pub(crate) mod testing;

use crate::error::Result;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

pub use process::ProcessInvoker;
pub use status::{StatusLine, StatusLog};

/// Direction of the data exchanged with the engine's input stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoMode {
    /// The caller writes input lines to the engine
    Write,
    /// The caller only reads what the engine produces
    Read,
}

/// One engine call, built additively on top of the fixed baseline
#[derive(Clone)]
pub struct Invocation {
    program: Option<PathBuf>,
    home: Option<PathBuf>,
    baseline: bool,
    args: Vec<OsString>,
    mode: IoMode,
    input: Vec<Zeroizing<String>>,
    capture_output: bool,
    capture_stderr: bool,
    machine_readable: bool,
    verbose: bool,
}

impl Invocation {
    /// Engine call with the full baseline, rooted at the given scratch home
    pub fn engine<P: AsRef<Path>>(home: P) -> Self {
        Self {
            program: None,
            home: Some(home.as_ref().to_path_buf()),
            baseline: true,
            args: Vec::new(),
            mode: IoMode::Read,
            input: Vec::new(),
            capture_output: false,
            capture_stderr: false,
            machine_readable: false,
            verbose: false,
        }
    }

    /// Call without baseline flags or status file, e.g. `--version`
    pub fn bare() -> Self {
        Self {
            home: None,
            baseline: false,
            ..Self::engine("")
        }
    }

    /// Run a different program than the configured engine binary
    pub fn program<P: Into<PathBuf>>(mut self, program: P) -> Self {
        self.program = Some(program.into());
        self
    }

    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Append one input line; switches the call to write mode
    pub fn input_line<S: Into<String>>(mut self, line: S) -> Self {
        self.mode = IoMode::Write;
        self.input.push(Zeroizing::new(line.into()));
        self
    }

    /// Request the payload through an explicit output file
    pub fn capture_output(mut self) -> Self {
        self.capture_output = true;
        self
    }

    /// Request the diagnostic stream
    pub fn capture_stderr(mut self) -> Self {
        self.capture_stderr = true;
        self
    }

    /// Force the neutral locale so diagnostics can be parsed
    pub fn machine_readable(mut self) -> Self {
        self.machine_readable = true;
        self
    }

    /// Keep informational diagnostics (no `--quiet`)
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = self.verbose || verbose;
        self
    }

    pub fn program_override(&self) -> Option<&Path> {
        self.program.as_deref()
    }

    pub fn home(&self) -> Option<&Path> {
        self.home.as_deref()
    }

    pub fn uses_baseline(&self) -> bool {
        self.baseline
    }

    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    /// Check whether an argument was passed verbatim
    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    pub fn mode(&self) -> IoMode {
        self.mode
    }

    pub fn input_lines(&self) -> impl Iterator<Item = &str> {
        self.input.iter().map(|line| line.as_str())
    }

    pub fn wants_output(&self) -> bool {
        self.capture_output
    }

    pub fn wants_stderr(&self) -> bool {
        self.capture_stderr
    }

    pub fn is_machine_readable(&self) -> bool {
        self.machine_readable
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Input stream bytes: every line newline terminated, CRLF-bearing lines split per fragment
    pub(crate) fn encoded_input(&self) -> Zeroizing<Vec<u8>> {
        let mut encoded = Zeroizing::new(Vec::new());
        for line in &self.input {
            if line.contains("\r\n") {
                let mut fragments: Vec<&str> = line.split("\r\n").collect();
                if fragments.last() == Some(&"") {
                    fragments.pop();
                }
                for fragment in fragments {
                    encoded.extend_from_slice(fragment.as_bytes());
                    encoded.push(b'\n');
                }
            } else {
                encoded.extend_from_slice(line.as_bytes());
                encoded.push(b'\n');
            }
        }
        encoded
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("program", &self.program)
            .field("home", &self.home)
            .field("baseline", &self.baseline)
            .field("args", &self.args)
            .field("mode", &self.mode)
            .field("input_lines", &self.input.len())
            .field("capture_output", &self.capture_output)
            .field("capture_stderr", &self.capture_stderr)
            .field("machine_readable", &self.machine_readable)
            .field("verbose", &self.verbose)
            .finish()
    }
}

/// Captured streams of one engine call
#[derive(Debug, Clone, Default)]
pub struct InvocationResult {
    /// Raw stdout, used for programmatic parsing
    pub stdout: Vec<u8>,
    /// Content of the explicit output file, if one was requested
    pub output: Option<Vec<u8>>,
    /// Diagnostic text, empty unless requested
    pub stderr: String,
    /// Status tokens
    pub status: StatusLog,
    /// Exit code, `None` when the child was terminated by a signal
    pub exit_code: Option<i32>,
}

impl InvocationResult {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Output file content, empty when nothing was produced
    pub fn output_bytes(&self) -> &[u8] {
        self.output.as_deref().unwrap_or_default()
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Stderr trimmed for inclusion in error messages
    pub fn diagnostics(&self) -> &str {
        self.stderr.trim()
    }
}

/// Capability to execute one engine invocation
pub trait Invoker: Send + Sync {
    fn invoke(&self, invocation: &Invocation) -> Result<InvocationResult>;
}
