// In-memory engine for exercising the executor and evaluator without an interpreter

use crate::engine::{RawExecution, SandboxEngine, SandboxRequest};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Mutex;

type Script = Box<dyn Fn(&str, &Path) -> Result<RawExecution> + Send + Sync>;

pub struct ScriptedEngine {
    script: Script,
    sources: Mutex<Vec<String>>,
}

pub fn envelope_ok(output: &str) -> RawExecution {
    let body = serde_json::json!({ "ok": true, "output": output, "error": null });
    RawExecution {
        stdout: format!("{}\n", body),
        exit_code: Some(0),
        execution_time_ms: 5,
        ..Default::default()
    }
}

pub fn envelope_err(name: &str, message: &str) -> RawExecution {
    let body = serde_json::json!({
        "ok": false,
        "output": "",
        "error": { "name": name, "message": message }
    });
    RawExecution {
        stdout: format!("{}\n", body),
        exit_code: Some(0),
        execution_time_ms: 5,
        ..Default::default()
    }
}

pub fn timed_out() -> RawExecution {
    RawExecution {
        timed_out: true,
        execution_time_ms: 5000,
        ..Default::default()
    }
}

impl ScriptedEngine {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&str, &Path) -> Result<RawExecution> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            sources: Mutex::new(Vec::new()),
        }
    }

    /// Every run prints `output`
    pub fn printing(output: &str) -> Self {
        let output = output.to_string();
        Self::new(move |_, _| Ok(envelope_ok(&output)))
    }

    /// Every run prints the content of `filename` from its workspace
    pub fn echo_file(filename: &str) -> Self {
        let filename = filename.to_string();
        Self::new(move |_, workdir| match std::fs::read_to_string(workdir.join(&filename)) {
            Ok(content) => Ok(envelope_ok(&content)),
            Err(e) => Ok(envelope_err("FileNotFoundError", &e.to_string())),
        })
    }

    /// Every run fails inside the backend
    pub fn broken(message: &str) -> Self {
        let message = message.to_string();
        Self::new(move |_, _| bail!("{}", message))
    }

    pub fn calls(&self) -> usize {
        self.sources.lock().unwrap().len()
    }

    pub fn sources(&self) -> Vec<String> {
        self.sources.lock().unwrap().clone()
    }
}

#[async_trait]
impl SandboxEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn run(&self, request: &SandboxRequest<'_>) -> Result<RawExecution> {
        self.sources.lock().unwrap().push(request.source.to_string());
        (self.script)(request.source, request.workdir)
    }
}
