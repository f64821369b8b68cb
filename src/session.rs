use crate::errors::{Result, StreamError};
use crate::supervisor::{ExitWatch, LaunchSpec, ProcessControl, ProcessExit, Supervisor};
use crate::transcode;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Inactive,
    Active,
    Failed,
}

/// One live stream's lifecycle state. All mutation goes through the inner
/// lock; the process control half is owned here exclusively and never leaves.
#[derive(Debug)]
pub struct Session {
    id: String,
    app: String,
    name: String,
    output_dir: PathBuf,
    created_at: DateTime<Utc>,
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    state: SessionState,
    process: Option<ProcessControl>,
    /// Bumped on every successful start. A monitor task only applies its
    /// result while the generation it was launched under is still current.
    generation: u64,
    last_activity: DateTime<Utc>,
}

/// Point-in-time copy handed to the control plane. Never carries the process
/// handle.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub id: String,
    pub app: String,
    pub name: String,
    pub state: SessionState,
    pub output_dir: PathBuf,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(app: &str, name: &str, output_dir: PathBuf) -> Arc<Self> {
        let created_at = Utc::now();
        Arc::new(Self {
            id: crate::session_id(app, name),
            app: app.to_string(),
            name: name.to_string(),
            output_dir,
            created_at,
            inner: Mutex::new(Inner {
                state: SessionState::Inactive,
                process: None,
                generation: 0,
                last_activity: created_at,
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Launches the transcoder and transitions to Active. Fails with
    /// `AlreadyActive` when a process is already running and with
    /// `SpawnFailed` (state untouched) when the launch itself fails.
    pub async fn start(self: &Arc<Self>, supervisor: &dyn Supervisor, spec: LaunchSpec) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.state == SessionState::Active {
            return Err(StreamError::AlreadyActive {
                id: self.id.clone(),
            });
        }

        crate::prepare_stream_directory(&self.output_dir)?;

        let handle = supervisor.launch(spec).await?;
        let (control, exit) = handle.into_parts();

        inner.generation += 1;
        inner.state = SessionState::Active;
        inner.process = Some(control);
        let generation = inner.generation;
        drop(inner);

        let session = Arc::clone(self);
        tokio::spawn(async move {
            session.monitor(generation, exit).await;
        });

        log::info!("Started transcoder for session: {}", self.id);
        Ok(())
    }

    /// Waits for the process launched under `generation` and folds its exit
    /// into the state machine. A session that was stopped (or restarted) in
    /// the meantime discards the notification: Stop wins.
    async fn monitor(self: Arc<Self>, generation: u64, exit: ExitWatch) {
        // A dropped reporter counts as a kill.
        let exit = exit.await.unwrap_or(ProcessExit::Killed);

        let mut inner = self.inner.lock().await;
        if inner.generation != generation || inner.state != SessionState::Active {
            log::debug!(
                "Discarding stale exit notification for {}: {:?}",
                self.id,
                exit
            );
            return;
        }

        inner.process = None;
        let clean = exit.is_clean();
        inner.state = if clean {
            SessionState::Inactive
        } else {
            SessionState::Failed
        };
        drop(inner);

        if clean {
            log::info!("Transcoder for {} exited cleanly", self.id);
        } else {
            log::error!("Transcoder for {} exited abnormally: {:?}", self.id, exit);
            transcode::cleanup_partial_output(&self.output_dir);
        }
    }

    /// Idempotent and total: leaves the session Inactive with no process,
    /// whatever state it was in. Termination is requested here; the
    /// supervisor's owner task enforces the grace period and the forced kill.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state != SessionState::Active {
            return;
        }
        if let Some(process) = inner.process.take() {
            process.terminate();
        }
        inner.state = SessionState::Inactive;
        log::info!("Stopped session: {}", self.id);
    }

    /// Liveness signal from the ingest side, independent of process health.
    pub async fn update_activity(&self) {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        if now > inner.last_activity {
            inner.last_activity = now;
        }
    }

    pub async fn is_active(&self) -> bool {
        self.inner.lock().await.state == SessionState::Active
    }

    pub async fn status(&self) -> SessionStatus {
        let inner = self.inner.lock().await;
        SessionStatus {
            id: self.id.clone(),
            app: self.app.clone(),
            name: self.name.clone(),
            state: inner.state,
            output_dir: self.output_dir.clone(),
            created_at: self.created_at,
            last_activity: inner.last_activity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::testing::{FakeSupervisor, Script};
    use std::time::Duration;
    use tokio::time::sleep;

    fn test_session(name: &str) -> Arc<Session> {
        let output_dir = std::env::temp_dir()
            .join(format!("seglive-session-{}", std::process::id()))
            .join(name);
        Session::new("live", name, output_dir)
    }

    fn spec() -> LaunchSpec {
        LaunchSpec {
            program: "transcoder".to_string(),
            args: vec![],
            label: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_start_activates_session() {
        let supervisor = FakeSupervisor::run_until_terminated();
        let session = test_session("start");

        session.start(supervisor.as_ref(), spec()).await.unwrap();

        let status = session.status().await;
        assert_eq!(status.state, SessionState::Active);
        assert_eq!(status.id, "live/start");
        assert!(session.output_dir().exists());

        session.stop().await;
    }

    #[tokio::test]
    async fn test_start_on_active_fails_without_second_launch() {
        let supervisor = FakeSupervisor::run_until_terminated();
        let session = test_session("double-start");

        session.start(supervisor.as_ref(), spec()).await.unwrap();
        let err = session.start(supervisor.as_ref(), spec()).await.unwrap_err();

        assert_eq!(err.error_code(), "ALREADY_ACTIVE");
        assert_eq!(supervisor.launch_count(), 1);
        assert!(session.is_active().await);

        session.stop().await;
    }

    #[tokio::test]
    async fn test_spawn_failure_leaves_state_unchanged() {
        let supervisor = FakeSupervisor::failing_spawn();
        let session = test_session("spawn-fail");

        let err = session.start(supervisor.as_ref(), spec()).await.unwrap_err();

        assert_eq!(err.error_code(), "SPAWN_FAILED");
        assert_eq!(session.status().await.state, SessionState::Inactive);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_in_every_state() {
        let supervisor = FakeSupervisor::run_until_terminated();
        let session = test_session("stop");

        // never started
        session.stop().await;
        assert_eq!(session.status().await.state, SessionState::Inactive);

        session.start(supervisor.as_ref(), spec()).await.unwrap();
        session.stop().await;
        session.stop().await;
        assert_eq!(session.status().await.state, SessionState::Inactive);

        // the process slot is free again
        session.start(supervisor.as_ref(), spec()).await.unwrap();
        session.stop().await;
    }

    #[tokio::test]
    async fn test_abnormal_exit_transitions_to_failed() {
        let supervisor =
            FakeSupervisor::exit_after(Duration::from_millis(10), ProcessExit::Failed(Some(1)));
        let session = test_session("failed-exit");

        session.start(supervisor.as_ref(), spec()).await.unwrap();
        sleep(Duration::from_millis(100)).await;

        assert_eq!(session.status().await.state, SessionState::Failed);
    }

    #[tokio::test]
    async fn test_clean_exit_transitions_to_inactive() {
        let supervisor = FakeSupervisor::exit_after(Duration::from_millis(10), ProcessExit::Clean);
        let session = test_session("clean-exit");

        session.start(supervisor.as_ref(), spec()).await.unwrap();
        sleep(Duration::from_millis(100)).await;

        assert_eq!(session.status().await.state, SessionState::Inactive);
    }

    #[tokio::test]
    async fn test_failed_session_can_be_restarted() {
        let supervisor =
            FakeSupervisor::exit_after(Duration::from_millis(10), ProcessExit::Failed(Some(1)));
        let session = test_session("restart-after-failure");

        session.start(supervisor.as_ref(), spec()).await.unwrap();
        sleep(Duration::from_millis(100)).await;
        assert_eq!(session.status().await.state, SessionState::Failed);

        let supervisor = FakeSupervisor::run_until_terminated();
        session.start(supervisor.as_ref(), spec()).await.unwrap();
        assert_eq!(session.status().await.state, SessionState::Active);

        session.stop().await;
    }

    #[tokio::test]
    async fn test_stop_wins_over_stale_exit_notification() {
        let supervisor = FakeSupervisor::with_script(Script::ExitAfterIgnoringTerminate(
            Duration::from_millis(50),
            ProcessExit::Failed(Some(1)),
        ));
        let session = test_session("stop-wins");

        session.start(supervisor.as_ref(), spec()).await.unwrap();
        session.stop().await;
        assert_eq!(session.status().await.state, SessionState::Inactive);

        // the stale failure report arrives now and must be discarded
        sleep(Duration::from_millis(150)).await;
        assert_eq!(session.status().await.state, SessionState::Inactive);
    }

    #[tokio::test]
    async fn test_generation_guard_protects_restarted_session() {
        let supervisor = FakeSupervisor::with_script(Script::ExitAfterIgnoringTerminate(
            Duration::from_millis(50),
            ProcessExit::Killed,
        ));
        let session = test_session("generation-guard");

        session.start(supervisor.as_ref(), spec()).await.unwrap();
        session.stop().await;

        // restarted before the first process's exit report lands
        let second = FakeSupervisor::run_until_terminated();
        session.start(second.as_ref(), spec()).await.unwrap();

        sleep(Duration::from_millis(150)).await;
        assert_eq!(session.status().await.state, SessionState::Active);

        session.stop().await;
    }

    #[tokio::test]
    async fn test_activity_is_monotonic() {
        let session = test_session("activity");

        let before = session.status().await;
        assert_eq!(before.last_activity, before.created_at);

        sleep(Duration::from_millis(10)).await;
        session.update_activity().await;

        let after = session.status().await;
        assert!(after.last_activity >= before.last_activity);
        assert!(after.last_activity >= after.created_at);
    }
}
