//! Execution environment manager.
//!
//! Owns the table of resident environments. Every mutation of the table
//! happens under one lock that is never held across an await, so the
//! capacity check in [`EnvironmentManager::create`] and the
//! presence-check-and-remove in [`EnvironmentManager::destroy`] are atomic
//! with respect to concurrent callers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use forge_notify::{ClientId, EnvironmentUpdate, Event, Notifier};
use forge_runtime::{
    BuildRequest, EnvironmentRuntime, ExecOutput, InstanceHandle, InstanceSpec, LogLine,
    MountConfig,
};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::SandboxConfig;
use crate::environment::{Environment, EnvironmentSnapshot, EnvironmentStatus};
use crate::error::{SandboxError, SandboxResult};
use crate::tasks::{spawn_periodic, Shutdown};
use crate::template::{Dependencies, ProjectTemplate};

/// Mount point of the project tree inside the instance.
const APP_DIR: &str = "/app";

/// Input to [`EnvironmentManager::create`].
#[derive(Debug, Clone, Default)]
pub struct CreateRequest {
    pub project_id: String,
    /// Source for `src/App.tsx`
    pub code: String,
    pub dependencies: Dependencies,
    /// Client that receives lifecycle and console events
    pub client: Option<ClientId>,
}

impl CreateRequest {
    pub fn new(project_id: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            code: code.into(),
            ..Default::default()
        }
    }

    pub fn dependencies(mut self, dependencies: Dependencies) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn client(mut self, client: impl Into<ClientId>) -> Self {
        self.client = Some(client.into());
        self
    }
}

/// Manages the lifecycle of execution environments.
pub struct EnvironmentManager {
    runtime: Arc<dyn EnvironmentRuntime>,
    notifier: Arc<dyn Notifier>,
    config: SandboxConfig,
    template: ProjectTemplate,
    environments: Mutex<HashMap<String, Environment>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown: Shutdown,
}

impl EnvironmentManager {
    /// Create a manager over the given runtime and notifier.
    pub fn new(
        runtime: Arc<dyn EnvironmentRuntime>,
        notifier: Arc<dyn Notifier>,
        config: SandboxConfig,
    ) -> Arc<Self> {
        let template = ProjectTemplate::new(config.base_image.clone(), config.app_port);
        Arc::new(Self {
            runtime,
            notifier,
            config,
            template,
            environments: Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
            shutdown: Shutdown::new(),
        })
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Create an environment and wait until it serves on its endpoint.
    ///
    /// Fails with [`SandboxError::CapacityExceeded`] when the resident count
    /// is at the ceiling and with [`SandboxError::ShuttingDown`] once
    /// [`Self::shutdown`] has begun. Any later failure marks the environment `error`
    /// and is returned to the caller; the entry stays resident until it is
    /// destroyed or reclaimed.
    pub async fn create(self: &Arc<Self>, request: CreateRequest) -> SandboxResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.reserve(&id, &request)?;
        info!(environment_id = %id, project_id = %request.project_id, "Creating environment");

        match self.provision(&id, &request).await {
            Ok(()) => {
                info!(environment_id = %id, "Environment created");
                Ok(id)
            }
            Err(SandboxError::Aborted(aborted)) => {
                info!(environment_id = %aborted, "Environment destroyed during creation");
                Err(SandboxError::Aborted(aborted))
            }
            Err(e) => {
                error!(environment_id = %id, "Error creating environment: {}", e);
                self.mark_failed(&id, &e).await;
                Err(e)
            }
        }
    }

    fn reserve(&self, id: &str, request: &CreateRequest) -> SandboxResult<()> {
        let mut environments = self.environments.lock();
        // Shutdown triggers before it lists the table, so anything reserved
        // here is seen and destroyed by it.
        if self.shutdown.is_triggered() {
            warn!("Rejecting environment request, manager is shutting down");
            return Err(SandboxError::ShuttingDown);
        }
        let resident = environments
            .values()
            .filter(|env| env.status.is_resident())
            .count();
        if resident >= self.config.max_concurrent {
            warn!(limit = self.config.max_concurrent, "Environment capacity reached");
            return Err(SandboxError::CapacityExceeded {
                limit: self.config.max_concurrent,
            });
        }
        environments.insert(
            id.to_string(),
            Environment::creating(
                id.to_string(),
                request.project_id.clone(),
                request.client.clone(),
            ),
        );
        Ok(())
    }

    async fn provision(self: &Arc<Self>, id: &str, request: &CreateRequest) -> SandboxResult<()> {
        let template = self.template.clone();
        let code = request.code.clone();
        let dependencies = request.dependencies.clone();
        let workdir = tokio::task::spawn_blocking(move || template.materialize(&code, &dependencies))
            .await
            .map_err(|e| SandboxError::Template(e.to_string()))??;
        let context_dir = workdir.path().to_path_buf();

        {
            let mut environments = self.environments.lock();
            let env = environments
                .get_mut(id)
                .ok_or_else(|| SandboxError::Aborted(id.to_string()))?;
            env.workdir = Some(workdir);
        }

        let name = format!("sandbox-{}", id);
        let image = self
            .runtime
            .build(&BuildRequest {
                context_dir: context_dir.clone(),
                base_image: self.config.base_image.clone(),
                tag: name.clone(),
            })
            .await?;

        let spec = InstanceSpec::new(name, self.config.app_port)
            .env("NODE_ENV", "development")
            .env("VITE_HOST", "0.0.0.0")
            .workdir(APP_DIR)
            .mount(MountConfig::new(context_dir, APP_DIR))
            .host(self.config.host.clone());
        let handle = self.runtime.run(&image, &spec).await?;

        let attached = {
            let mut environments = self.environments.lock();
            match environments.get_mut(id) {
                Some(env) => {
                    env.handle = Some(handle.clone());
                    env.status = EnvironmentStatus::Starting;
                    true
                }
                None => false,
            }
        };
        if !attached {
            self.teardown_instance(id, &handle).await;
            return Err(SandboxError::Aborted(id.to_string()));
        }

        self.notify(
            request.client.as_ref(),
            EnvironmentUpdate::new(id, "created").message("Environment created successfully"),
        )
        .await;

        // From here on a concurrent destroy owns the handle and tears it down.
        let endpoint = self.runtime.start(&handle, &spec).await?;

        {
            // The follower is registered under the table lock so a destroy or
            // shutdown either precedes it or finds it in the task list.
            let mut environments = self.environments.lock();
            let env = environments
                .get_mut(id)
                .ok_or_else(|| SandboxError::Aborted(id.to_string()))?;
            env.status = EnvironmentStatus::Running;
            env.endpoint = Some(endpoint.clone());
            self.spawn_follower(id.to_string(), handle, request.client.clone());
        }
        info!(environment_id = %id, port = endpoint.port, "Environment started");

        self.notify(
            request.client.as_ref(),
            EnvironmentUpdate::new(id, "running").endpoint(endpoint.url(), endpoint.port),
        )
        .await;
        Ok(())
    }

    async fn mark_failed(&self, id: &str, cause: &SandboxError) {
        let failed = {
            let mut environments = self.environments.lock();
            environments.get_mut(id).map(|env| {
                env.status = EnvironmentStatus::Error;
                env.error = Some(cause.to_string());
                env.endpoint = None;
                (env.handle.take(), env.client.clone())
            })
        };
        let Some((handle, client)) = failed else {
            return;
        };

        if let Some(handle) = handle {
            self.teardown_instance(id, &handle).await;
        }
        self.notify(
            client.as_ref(),
            EnvironmentUpdate::new(id, "error").message(cause.to_string()),
        )
        .await;
    }

    /// Snapshot of one environment.
    pub fn status(&self, id: &str) -> SandboxResult<EnvironmentSnapshot> {
        self.environments
            .lock()
            .get(id)
            .map(Environment::snapshot)
            .ok_or_else(|| SandboxError::NotFound(id.to_string()))
    }

    /// Snapshots of every resident environment, oldest first.
    pub fn list(&self) -> Vec<EnvironmentSnapshot> {
        let mut snapshots: Vec<EnvironmentSnapshot> = self
            .environments
            .lock()
            .values()
            .map(Environment::snapshot)
            .collect();
        snapshots.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        snapshots
    }

    /// Ids of every resident environment.
    pub fn ids(&self) -> Vec<String> {
        self.environments.lock().keys().cloned().collect()
    }

    pub fn resident_count(&self) -> usize {
        self.environments
            .lock()
            .values()
            .filter(|env| env.status.is_resident())
            .count()
    }

    /// Run a shell command inside an environment's instance.
    pub async fn execute(&self, id: &str, command: &str) -> SandboxResult<ExecOutput> {
        let handle = self.instance(id)?;
        debug!(environment_id = %id, command = %command, "Executing command");
        self.runtime.exec(&handle, command).await.map_err(|e| {
            error!(environment_id = %id, "Error executing command: {}", e);
            SandboxError::Collaborator(e)
        })
    }

    fn instance(&self, id: &str) -> SandboxResult<InstanceHandle> {
        let environments = self.environments.lock();
        let env = environments
            .get(id)
            .ok_or_else(|| SandboxError::NotFound(id.to_string()))?;
        env.handle
            .clone()
            .ok_or_else(|| SandboxError::NotRunning(id.to_string()))
    }

    /// Take the buffered recent output of an environment.
    pub fn drain_output(&self, id: &str) -> SandboxResult<Vec<String>> {
        let mut environments = self.environments.lock();
        let env = environments
            .get_mut(id)
            .ok_or_else(|| SandboxError::NotFound(id.to_string()))?;
        Ok(env.recent.drain(..).collect())
    }

    /// Read recent output by running the configured tail command.
    pub async fn tail_output(&self, id: &str) -> SandboxResult<Vec<String>> {
        let output = self.execute(id, &self.config.tail_command).await?;
        Ok(output
            .combined_output()
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Tear an environment down. No-op if it is not resident.
    ///
    /// Returns whether this call performed the teardown. Sub-step failures
    /// are logged and do not stop the remaining steps.
    pub async fn destroy(&self, id: &str) -> bool {
        let Some(mut env) = self.environments.lock().remove(id) else {
            debug!(environment_id = %id, "Destroy skipped, environment not resident");
            return false;
        };

        if let Some(handle) = env.handle.take() {
            self.teardown_instance(id, &handle).await;
        }

        if let Some(workdir) = env.workdir.take() {
            let path = workdir.path().to_path_buf();
            let removed = tokio::task::spawn_blocking(move || workdir.close()).await;
            match removed {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(environment_id = %id, "Error removing {:?}: {}", path, e),
                Err(e) => warn!(environment_id = %id, "Error removing {:?}: {}", path, e),
            }
        }

        env.status = EnvironmentStatus::Destroyed;
        self.notify(
            env.client.as_ref(),
            EnvironmentUpdate::new(id, env.status.to_string()).message("Environment destroyed"),
        )
        .await;

        info!(environment_id = %id, "Environment destroyed");
        true
    }

    async fn teardown_instance(&self, id: &str, handle: &InstanceHandle) {
        if let Err(e) = self.runtime.stop(handle).await {
            warn!(environment_id = %id, "Error stopping instance: {}", e);
        }
        if let Err(e) = self.runtime.remove(handle).await {
            warn!(environment_id = %id, "Error removing instance: {}", e);
        }
    }

    fn spawn_follower(self: &Arc<Self>, id: String, handle: InstanceHandle, client: Option<ClientId>) {
        let manager = Arc::clone(self);
        let task = tokio::spawn(async move {
            manager.follow_logs(&id, &handle, client.as_ref()).await;
            manager.destroy(&id).await;
        });
        self.tasks.lock().push(task);
    }

    /// Forward instance output until the stream ends.
    async fn follow_logs(&self, id: &str, handle: &InstanceHandle, client: Option<&ClientId>) {
        let mut lines = match self.runtime.stream_logs(handle).await {
            Ok(lines) => lines,
            Err(e) => {
                error!(environment_id = %id, "Error following logs: {}", e);
                return;
            }
        };

        while let Some(item) = lines.next().await {
            match item {
                Ok(line) => self.record_line(id, client, line).await,
                Err(e) => {
                    error!(environment_id = %id, "Error following logs: {}", e);
                    break;
                }
            }
        }
        debug!(environment_id = %id, "Log stream ended");
    }

    async fn record_line(&self, id: &str, client: Option<&ClientId>, line: LogLine) {
        let lowered = line.message.to_lowercase();
        if lowered.contains("error") || lowered.contains("failed") {
            warn!(environment_id = %id, "Error in environment: {}", line.message);
        }

        {
            let mut environments = self.environments.lock();
            if let Some(env) = environments.get_mut(id) {
                env.remember(line.message.clone(), self.config.output_buffer_lines);
            }
        }

        if let Some(client) = client {
            self.notifier
                .send(client, Event::console(id, line.source.to_string(), line.message))
                .await;
        }
    }

    async fn notify(&self, client: Option<&ClientId>, update: EnvironmentUpdate) {
        if let Some(client) = client {
            self.notifier
                .send(client, Event::EnvironmentUpdate(update))
                .await;
        }
    }

    /// Ids of environments older than the idle timeout at `now`.
    pub fn expired_ids(&self, now: Instant) -> Vec<String> {
        let timeout = self.config.idle_timeout();
        self.environments
            .lock()
            .values()
            .filter(|env| now.saturating_duration_since(env.started) > timeout)
            .map(|env| env.id.clone())
            .collect()
    }

    /// Destroy every environment past its idle timeout.
    pub async fn reclaim_expired(&self) -> Vec<String> {
        let mut reclaimed = Vec::new();
        for id in self.expired_ids(Instant::now()) {
            info!(environment_id = %id, "Cleaning up expired environment");
            if self.destroy(&id).await {
                reclaimed.push(id);
            }
        }
        self.tasks.lock().retain(|task| !task.is_finished());
        reclaimed
    }

    /// Start the periodic reclaimer.
    pub fn start_reclaimer(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        let task = spawn_periodic(
            "reclaimer",
            self.config.reclaim_interval(),
            self.shutdown.subscribe(),
            move || {
                let manager = Arc::clone(&manager);
                async move {
                    let reclaimed = manager.reclaim_expired().await;
                    if !reclaimed.is_empty() {
                        debug!(count = reclaimed.len(), "Reclaimer pass finished");
                    }
                }
            },
        );
        self.tasks.lock().push(task);
        info!(
            interval_secs = self.config.reclaim_interval_secs,
            timeout_secs = self.config.idle_timeout_secs,
            "Reclaimer started"
        );
    }

    /// Destroy every resident environment.
    pub async fn cleanup_all(&self) -> usize {
        let mut destroyed = 0;
        for id in self.ids() {
            if self.destroy(&id).await {
                destroyed += 1;
            }
        }
        destroyed
    }

    /// Stop background tasks, destroy every environment and join the tasks.
    pub async fn shutdown(&self) {
        info!("Shutting down environment manager");
        self.shutdown.trigger();
        self.cleanup_all().await;

        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                error!("Background task failed: {}", e);
            }
        }
    }
}
