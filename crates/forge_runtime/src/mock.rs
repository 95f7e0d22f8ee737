//! Mock environment runtime for testing.
//!
//! Provides a scriptable implementation of the EnvironmentRuntime trait
//! for use in tests without requiring Docker. Instances get sequential
//! host ports, exec responses are matched by command substring, and each
//! instance's log stream is fed by the test and closed when it is stopped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use parking_lot::RwLock;

use crate::config::InstanceSpec;
use crate::error::{RuntimeError, RuntimeResult};
use crate::runner::{
    BuildRequest, Endpoint, EnvironmentRuntime, ExecOutput, ImageRef, InstanceHandle, LogLine,
    LogSource, LogStream,
};

/// Captured call information for verification.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub method: String,
    pub instance: Option<String>,
    pub command: Option<String>,
}

impl CapturedCall {
    fn new(method: &str, instance: Option<&str>, command: Option<&str>) -> Self {
        Self {
            method: method.to_string(),
            instance: instance.map(str::to_string),
            command: command.map(str::to_string),
        }
    }
}

/// Mock environment runtime for testing.
#[derive(Clone)]
pub struct MockRuntime {
    /// Exec responses keyed by a substring of the command, first match wins.
    exec_responses: Arc<RwLock<Vec<(String, ExecOutput)>>>,
    /// Methods that should fail, with the message to fail with.
    failures: Arc<RwLock<HashMap<String, String>>>,
    /// Captured calls for verification.
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
    /// Open log feeds per instance id.
    log_feeds: Arc<RwLock<HashMap<String, mpsc::UnboundedSender<LogLine>>>>,
    /// Lines queued for instances whose stream has not been opened yet.
    pending_logs: Arc<RwLock<HashMap<String, Vec<LogLine>>>>,
    /// Artificial latency added to `start`.
    start_delay: Arc<RwLock<Option<Duration>>>,
    next_port: Arc<AtomicU16>,
    next_instance: Arc<AtomicUsize>,
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRuntime {
    /// Create a new mock runtime.
    pub fn new() -> Self {
        Self {
            exec_responses: Arc::new(RwLock::new(Vec::new())),
            failures: Arc::new(RwLock::new(HashMap::new())),
            captured_calls: Arc::new(RwLock::new(Vec::new())),
            log_feeds: Arc::new(RwLock::new(HashMap::new())),
            pending_logs: Arc::new(RwLock::new(HashMap::new())),
            start_delay: Arc::new(RwLock::new(None)),
            next_port: Arc::new(AtomicU16::new(40000)),
            next_instance: Arc::new(AtomicUsize::new(1)),
        }
    }

    /// Respond to any command containing `pattern` with `output`.
    pub fn on_exec(self, pattern: impl Into<String>, output: ExecOutput) -> Self {
        self.exec_responses.write().push((pattern.into(), output));
        self
    }

    /// Make every call to `method` fail with `message`.
    pub fn fail_on(self, method: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures.write().insert(method.into(), message.into());
        self
    }

    /// Stop failing calls to `method`.
    pub fn clear_failure(&self, method: &str) {
        self.failures.write().remove(method);
    }

    /// Delay every `start` call.
    pub fn with_start_delay(self, delay: Duration) -> Self {
        *self.start_delay.write() = Some(delay);
        self
    }

    /// Emit a stdout line from an instance.
    pub fn push_log(&self, instance_id: &str, message: impl Into<String>) {
        let line = LogLine::new(LogSource::Stdout, message);
        let sender = self.log_feeds.read().get(instance_id).cloned();
        match sender {
            Some(sender) => {
                let _ = sender.unbounded_send(line);
            }
            None => self
                .pending_logs
                .write()
                .entry(instance_id.to_string())
                .or_default()
                .push(line),
        }
    }

    /// End an instance's log stream as if it crashed.
    pub fn end_logs(&self, instance_id: &str) {
        if let Some(sender) = self.log_feeds.write().remove(instance_id) {
            sender.close_channel();
        }
    }

    /// Whether a log stream is currently open for the instance.
    pub fn is_streaming(&self, instance_id: &str) -> bool {
        self.log_feeds.read().contains_key(instance_id)
    }

    /// Clear all captured calls.
    pub fn clear_calls(&self) {
        self.captured_calls.write().clear();
    }

    /// Get all captured calls.
    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    /// Total number of captured calls.
    pub fn call_count(&self) -> usize {
        self.captured_calls.read().len()
    }

    /// Check if a specific method was called.
    pub fn was_called(&self, method: &str) -> bool {
        self.captured_calls.read().iter().any(|c| c.method == method)
    }

    /// Get calls to a specific method.
    pub fn get_method_calls(&self, method: &str) -> Vec<CapturedCall> {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    /// Commands passed to `exec`, in call order.
    pub fn executed_commands(&self) -> Vec<String> {
        self.get_method_calls("exec")
            .into_iter()
            .filter_map(|c| c.command)
            .collect()
    }

    fn record_call(&self, call: CapturedCall) {
        self.captured_calls.write().push(call);
    }

    fn check_failure(&self, method: &str) -> RuntimeResult<()> {
        match self.failures.read().get(method) {
            Some(message) => Err(RuntimeError::ExecFailed(message.clone())),
            None => Ok(()),
        }
    }

    fn exec_response(&self, command: &str) -> ExecOutput {
        self.exec_responses
            .read()
            .iter()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| ExecOutput::success(""))
    }
}

#[async_trait]
impl EnvironmentRuntime for MockRuntime {
    async fn build(&self, request: &BuildRequest) -> RuntimeResult<ImageRef> {
        self.record_call(CapturedCall::new("build", None, Some(&request.tag)));
        self.check_failure("build")?;
        Ok(ImageRef(request.tag.clone()))
    }

    async fn run(&self, image: &ImageRef, spec: &InstanceSpec) -> RuntimeResult<InstanceHandle> {
        self.record_call(CapturedCall::new("run", None, Some(image.as_str())));
        self.check_failure("run")?;
        let n = self.next_instance.fetch_add(1, Ordering::SeqCst);
        Ok(InstanceHandle {
            id: format!("mock-{}", n),
            name: spec.name.clone(),
        })
    }

    async fn start(&self, handle: &InstanceHandle, spec: &InstanceSpec) -> RuntimeResult<Endpoint> {
        self.record_call(CapturedCall::new("start", Some(&handle.id), None));
        let delay = *self.start_delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_failure("start")?;
        let port = self.next_port.fetch_add(1, Ordering::SeqCst);
        Ok(Endpoint::new(spec.host.clone(), port))
    }

    async fn exec(&self, handle: &InstanceHandle, command: &str) -> RuntimeResult<ExecOutput> {
        self.record_call(CapturedCall::new("exec", Some(&handle.id), Some(command)));
        self.check_failure("exec")?;
        Ok(self.exec_response(command))
    }

    async fn stream_logs(&self, handle: &InstanceHandle) -> RuntimeResult<LogStream> {
        self.record_call(CapturedCall::new("stream_logs", Some(&handle.id), None));
        self.check_failure("stream_logs")?;

        let (sender, receiver) = mpsc::unbounded();
        let pending = self.pending_logs.write().remove(&handle.id).unwrap_or_default();
        for line in pending {
            let _ = sender.unbounded_send(line);
        }
        if let Some(previous) = self.log_feeds.write().insert(handle.id.clone(), sender) {
            previous.close_channel();
        }

        Ok(receiver.map(Ok).boxed())
    }

    async fn stop(&self, handle: &InstanceHandle) -> RuntimeResult<()> {
        self.record_call(CapturedCall::new("stop", Some(&handle.id), None));
        self.end_logs(&handle.id);
        self.check_failure("stop")
    }

    async fn remove(&self, handle: &InstanceHandle) -> RuntimeResult<()> {
        self.record_call(CapturedCall::new("remove", Some(&handle.id), None));
        self.check_failure("remove")
    }
}
