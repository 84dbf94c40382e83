//! Recording invoker that replays canned engine transcripts.

use super::{Invocation, InvocationResult, Invoker, StatusLog};
use crate::engine::{EngineConfig, GpgEngine};
use crate::error::Result;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub(crate) const MODERN_BANNER: &str = "gpg (GnuPG) 2.2.27\nlibgcrypt 1.8.8\n";
pub(crate) const LEGACY_BANNER: &str = "gpg (GnuPG) 1.4.23\n";

/// Replays queued results in order and records every invocation it sees.
/// Once the queue is drained, each call gets an empty successful result.
/// Agent control calls (`gpgconf`) are recorded apart and always succeed
/// without consuming the queue.
#[derive(Default, Clone)]
pub(crate) struct ScriptedInvoker {
    responses: Arc<Mutex<VecDeque<Result<InvocationResult>>>>,
    seen: Arc<Mutex<Vec<Invocation>>>,
    tools: Arc<Mutex<Vec<Invocation>>>,
}

impl ScriptedInvoker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue the banner a `--version` query answers with
    pub(crate) fn with_version(self, banner: &str) -> Self {
        self.respond(InvocationResult {
            stdout: banner.as_bytes().to_vec(),
            exit_code: Some(0),
            ..Default::default()
        })
    }

    /// Invoker that first answers the version query of a loopback engine
    pub(crate) fn modern() -> Self {
        Self::new().with_version(MODERN_BANNER)
    }

    pub(crate) fn legacy() -> Self {
        Self::new().with_version(LEGACY_BANNER)
    }

    /// Engine handle driven by this invoker; the version answer must be queued first
    pub(crate) fn engine(&self) -> GpgEngine {
        GpgEngine::with_invoker(EngineConfig::default(), Arc::new(self.clone()))
            .expect("scripted engine")
    }

    /// Invocations after the version query
    pub(crate) fn operations(&self) -> Vec<Invocation> {
        self.invocations().into_iter().skip(1).collect()
    }

    pub(crate) fn respond(self, result: InvocationResult) -> Self {
        self.responses.lock().unwrap().push_back(Ok(result));
        self
    }

    pub(crate) fn fail(self, error: crate::error::GpgError) -> Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    /// Everything invoked so far
    pub(crate) fn invocations(&self) -> Vec<Invocation> {
        self.seen.lock().unwrap().clone()
    }

    /// Agent control calls, in order
    pub(crate) fn tool_calls(&self) -> Vec<Invocation> {
        self.tools.lock().unwrap().clone()
    }

    pub(crate) fn last(&self) -> Invocation {
        self.seen
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no invocation recorded")
    }
}

impl Invoker for ScriptedInvoker {
    fn invoke(&self, invocation: &Invocation) -> Result<InvocationResult> {
        if invocation.program_override().is_some() {
            self.tools.lock().unwrap().push(invocation.clone());
            return Ok(InvocationResult {
                exit_code: Some(0),
                ..Default::default()
            });
        }
        self.seen.lock().unwrap().push(invocation.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(InvocationResult {
                    exit_code: Some(0),
                    ..Default::default()
                })
            })
    }
}

/// Result carrying the given status lines
pub(crate) fn with_status(lines: &[&str]) -> InvocationResult {
    let text: String = lines
        .iter()
        .map(|line| format!("[GNUPG:] {}\n", line))
        .collect();
    InvocationResult {
        status: StatusLog::parse(&text),
        exit_code: Some(0),
        ..Default::default()
    }
}

/// Result carrying an output payload plus status lines
pub(crate) fn with_output(output: &[u8], lines: &[&str]) -> InvocationResult {
    InvocationResult {
        output: Some(output.to_vec()),
        ..with_status(lines)
    }
}

/// Result carrying stdout text
pub(crate) fn with_stdout(stdout: &str) -> InvocationResult {
    InvocationResult {
        stdout: stdout.as_bytes().to_vec(),
        exit_code: Some(0),
        ..Default::default()
    }
}
