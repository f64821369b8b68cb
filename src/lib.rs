pub mod config;
pub mod errors;
pub mod lifecycle;
pub mod metrics;
pub mod registry;
pub mod session;
pub mod supervisor;
pub mod transcode;

#[cfg(feature = "http-api")]
pub mod http;

pub type SessionId = String;

use std::{fs, path::Path};

use crate::errors::{Result, StreamError};

pub use self::{
    lifecycle::Lifecycle,
    registry::SessionRegistry,
    session::{Session, SessionState, SessionStatus},
    supervisor::{CommandSupervisor, LaunchSpec, ProcessExit, Supervisor},
    transcode::TranscodeOptions,
};

/// Session ids are `app/name`, the same path shape the ingest URL carries.
pub fn session_id(app: &str, name: &str) -> SessionId {
    format!("{}/{}", app, name)
}

fn prepare_stream_directory<P: AsRef<Path>>(path: P) -> Result<()> {
    let stream_path = path.as_ref();
    if stream_path.exists() && !stream_path.is_dir() {
        return Err(StreamError::Storage {
            source: std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!(
                    "Path '{}' exists, but is not a directory",
                    stream_path.display()
                ),
            ),
        });
    }
    log::debug!("Creating output directory at '{}'", stream_path.display());
    fs::create_dir_all(&stream_path)?;
    Ok(())
}
