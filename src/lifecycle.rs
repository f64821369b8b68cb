use crate::config::Settings;
use crate::errors::{Result, StreamError};
use crate::metrics::Metrics;
use crate::registry::SessionRegistry;
use crate::session::{Session, SessionStatus};
use crate::supervisor::Supervisor;
use crate::transcode::TranscodeOptions;
use std::path::PathBuf;
use std::sync::Arc;

/// Validated lifecycle operations over the registry, consumed by the HTTP
/// control plane and the ingest adapter. Every mutation goes through the
/// session's own synchronized methods; this layer adds preconditions, output
/// directory placement, and launch specs.
pub struct Lifecycle {
    registry: Arc<SessionRegistry>,
    supervisor: Arc<dyn Supervisor>,
    options: TranscodeOptions,
    data_path: PathBuf,
    metrics: Arc<Metrics>,
}

impl Lifecycle {
    pub fn new(
        registry: Arc<SessionRegistry>,
        supervisor: Arc<dyn Supervisor>,
        options: TranscodeOptions,
        data_path: PathBuf,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            registry,
            supervisor,
            options,
            data_path,
            metrics,
        }
    }

    pub fn from_settings(
        settings: &Settings,
        registry: Arc<SessionRegistry>,
        supervisor: Arc<dyn Supervisor>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self::new(
            registry,
            supervisor,
            TranscodeOptions::from_settings(settings),
            PathBuf::from(&settings.hls.data_path),
            metrics,
        )
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    fn validate_key(app: &str, name: &str) -> Result<()> {
        if app.is_empty() || name.is_empty() {
            return Err(StreamError::InvalidKey {
                message: "app and stream name must be non-empty".to_string(),
            });
        }
        Ok(())
    }

    fn output_dir(&self, app: &str, name: &str) -> PathBuf {
        self.data_path.join(app).join(name)
    }

    async fn start_session(&self, session: &Arc<Session>) -> Result<()> {
        let spec = self
            .options
            .launch_spec(session.app(), session.name(), session.output_dir());
        match session.start(self.supervisor.as_ref(), spec).await {
            Ok(()) => {
                self.metrics.record_transcoder_spawned();
                Ok(())
            }
            Err(err) => {
                if let StreamError::SpawnFailed { .. } = err {
                    self.metrics.record_spawn_failure();
                }
                Err(err)
            }
        }
    }

    /// Ingest callback for a new publisher: materializes the session
    /// (idempotent per key) and starts its transcoder.
    pub async fn publish_start(&self, app: &str, name: &str) -> Result<Arc<Session>> {
        Self::validate_key(app, name)?;
        let id = crate::session_id(app, name);
        log::info!("Publish request: {}", id);

        let existed = self.registry.get(&id).await.is_some();
        let session = self
            .registry
            .get_or_create(app, name, self.output_dir(app, name))
            .await;
        if !existed {
            self.metrics.record_session_created();
        }

        self.start_session(&session).await?;
        session.update_activity().await;
        Ok(session)
    }

    /// Ingest callback for a new player: only an Active session is playable.
    pub async fn play_start(&self, app: &str, name: &str) -> Result<Arc<Session>> {
        Self::validate_key(app, name)?;
        let id = crate::session_id(app, name);
        log::info!("Play request: {}", id);

        let session = self
            .registry
            .get(&id)
            .await
            .ok_or_else(|| StreamError::NotFound { id: id.clone() })?;
        if !session.is_active().await {
            return Err(StreamError::NotFound { id });
        }
        session.update_activity().await;
        Ok(session)
    }

    /// Ingest callback when a publisher connection closes.
    pub async fn publish_end(&self, id: &str) {
        if self.registry.remove(id).await {
            self.metrics.record_session_removed();
        }
    }

    pub async fn list(&self) -> Vec<SessionStatus> {
        let sessions = self.registry.list().await;
        let mut statuses = Vec::with_capacity(sessions.len());
        for session in sessions {
            statuses.push(session.status().await);
        }
        statuses
    }

    pub async fn get(&self, id: &str) -> Result<SessionStatus> {
        let session = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| StreamError::NotFound { id: id.to_string() })?;
        Ok(session.status().await)
    }

    pub async fn start(&self, id: &str) -> Result<SessionStatus> {
        let session = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| StreamError::NotFound { id: id.to_string() })?;
        self.start_session(&session).await?;
        Ok(session.status().await)
    }

    pub async fn stop(&self, id: &str) -> Result<SessionStatus> {
        let session = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| StreamError::NotFound { id: id.to_string() })?;
        session.stop().await;
        Ok(session.status().await)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        if self.registry.remove(id).await {
            self.metrics.record_session_removed();
            Ok(())
        } else {
            Err(StreamError::NotFound { id: id.to_string() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use crate::supervisor::testing::FakeSupervisor;
    use crate::supervisor::ProcessExit;
    use std::time::Duration;
    use tokio::time::sleep;

    fn lifecycle(supervisor: Arc<FakeSupervisor>) -> Lifecycle {
        let data_path = std::env::temp_dir()
            .join(format!("seglive-lifecycle-{}", std::process::id()));
        Lifecycle::new(
            Arc::new(SessionRegistry::new()),
            supervisor,
            TranscodeOptions::default(),
            data_path,
            Arc::new(Metrics::new()),
        )
    }

    #[tokio::test]
    async fn test_publish_start_creates_and_activates() {
        let lifecycle = lifecycle(FakeSupervisor::run_until_terminated());

        let session = lifecycle.publish_start("live", "alice").await.unwrap();
        assert_eq!(session.status().await.state, SessionState::Active);
        assert_eq!(lifecycle.list().await.len(), 1);

        lifecycle.publish_end("live/alice").await;
        assert!(lifecycle.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_publish_start_rejects_empty_key() {
        let lifecycle = lifecycle(FakeSupervisor::run_until_terminated());

        let err = lifecycle.publish_start("", "alice").await.unwrap_err();
        assert_eq!(err.error_code(), "INVALID_KEY");
        assert!(lifecycle.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_second_publish_hits_already_active() {
        let supervisor = FakeSupervisor::run_until_terminated();
        let lifecycle = lifecycle(Arc::clone(&supervisor));

        lifecycle.publish_start("live", "alice").await.unwrap();
        let err = lifecycle.publish_start("live", "alice").await.unwrap_err();

        assert_eq!(err.error_code(), "ALREADY_ACTIVE");
        assert_eq!(supervisor.launch_count(), 1);
        assert_eq!(lifecycle.list().await.len(), 1);

        lifecycle.publish_end("live/alice").await;
    }

    #[tokio::test]
    async fn test_play_start_requires_active_session() {
        let lifecycle = lifecycle(FakeSupervisor::run_until_terminated());

        let err = lifecycle.play_start("live", "alice").await.unwrap_err();
        assert_eq!(err.error_code(), "SESSION_NOT_FOUND");

        lifecycle.publish_start("live", "alice").await.unwrap();
        lifecycle.play_start("live", "alice").await.unwrap();

        lifecycle.stop("live/alice").await.unwrap();
        let err = lifecycle.play_start("live", "alice").await.unwrap_err();
        assert_eq!(err.error_code(), "SESSION_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_control_ops_on_unknown_id() {
        let lifecycle = lifecycle(FakeSupervisor::run_until_terminated());

        assert_eq!(
            lifecycle.get("live/ghost").await.unwrap_err().error_code(),
            "SESSION_NOT_FOUND"
        );
        assert_eq!(
            lifecycle.start("live/ghost").await.unwrap_err().error_code(),
            "SESSION_NOT_FOUND"
        );
        assert_eq!(
            lifecycle.stop("live/ghost").await.unwrap_err().error_code(),
            "SESSION_NOT_FOUND"
        );
        assert_eq!(
            lifecycle.delete("live/ghost").await.unwrap_err().error_code(),
            "SESSION_NOT_FOUND"
        );
    }

    #[tokio::test]
    async fn test_stop_then_start_via_control_plane() {
        let lifecycle = lifecycle(FakeSupervisor::run_until_terminated());

        lifecycle.publish_start("live", "alice").await.unwrap();

        let status = lifecycle.stop("live/alice").await.unwrap();
        assert_eq!(status.state, SessionState::Inactive);

        let status = lifecycle.start("live/alice").await.unwrap();
        assert_eq!(status.state, SessionState::Active);

        lifecycle.stop("live/alice").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_failed_session_removes_it() {
        let supervisor =
            FakeSupervisor::exit_after(Duration::from_millis(10), ProcessExit::Failed(Some(1)));
        let lifecycle = lifecycle(supervisor);

        lifecycle.publish_start("live", "alice").await.unwrap();
        sleep(Duration::from_millis(100)).await;
        assert_eq!(
            lifecycle.get("live/alice").await.unwrap().state,
            SessionState::Failed
        );

        lifecycle.delete("live/alice").await.unwrap();
        assert!(lifecycle.list().await.is_empty());
    }
}
