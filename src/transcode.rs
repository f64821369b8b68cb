use crate::config::Settings;
use crate::supervisor::LaunchSpec;
use std::fs;
use std::path::Path;

pub const PLAYLIST_FILE: &str = "playlist.m3u8";
pub const SEGMENT_PATTERN: &str = "segment_%03d.ts";

/// Everything needed to assemble a transcoder command line. The external
/// process owns the media bytes and the playlist format; this crate only
/// hands it a command line and a directory.
#[derive(Debug, Clone)]
pub struct TranscodeOptions {
    pub binary_path: String,
    pub video_codec: String,
    pub audio_codec: String,
    pub video_bitrate: String,
    pub audio_bitrate: String,
    pub resolution: String,
    pub frame_rate: String,
    pub segment_duration: u32,
    pub playlist_window: u32,
    /// Port the ingest listener publishes on; the transcoder pulls its input
    /// back from there.
    pub ingest_port: i32,
}

impl TranscodeOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            binary_path: settings.ffmpeg.binary_path.clone(),
            video_codec: settings.ffmpeg.video_codec.clone(),
            audio_codec: settings.ffmpeg.audio_codec.clone(),
            video_bitrate: settings.ffmpeg.video_bitrate.clone(),
            audio_bitrate: settings.ffmpeg.audio_bitrate.clone(),
            resolution: settings.ffmpeg.resolution.clone(),
            frame_rate: settings.ffmpeg.frame_rate.clone(),
            segment_duration: settings.hls.segment_duration,
            playlist_window: settings.hls.playlist_window,
            ingest_port: settings.rtmp.port,
        }
    }

    /// Builds the command line for one stream. Output lands in
    /// `{output_dir}/playlist.m3u8` + `{output_dir}/segment_%03d.ts`;
    /// `delete_segments` makes the transcoder prune segments that fall out of
    /// the playlist window.
    pub fn launch_spec(&self, app: &str, name: &str, output_dir: &Path) -> LaunchSpec {
        let input_url = format!("rtmp://127.0.0.1:{}/{}/{}", self.ingest_port, app, name);
        let playlist_path = output_dir.join(PLAYLIST_FILE);
        let segment_pattern = output_dir.join(SEGMENT_PATTERN);

        let args = vec![
            "-i".to_string(),
            input_url,
            "-c:v".to_string(),
            self.video_codec.clone(),
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:v".to_string(),
            self.video_bitrate.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
            "-s".to_string(),
            self.resolution.clone(),
            "-r".to_string(),
            self.frame_rate.clone(),
            "-f".to_string(),
            "hls".to_string(),
            "-hls_time".to_string(),
            self.segment_duration.to_string(),
            "-hls_list_size".to_string(),
            self.playlist_window.to_string(),
            "-hls_flags".to_string(),
            "delete_segments".to_string(),
            "-hls_segment_filename".to_string(),
            segment_pattern.to_string_lossy().into_owned(),
            playlist_path.to_string_lossy().into_owned(),
        ];

        LaunchSpec {
            program: self.binary_path.clone(),
            args,
            label: format!("{}/{}", app, name),
        }
    }
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Best-effort removal of whatever a failed transcoder left behind. Failures
/// are logged and swallowed; the session is already Failed at this point.
pub fn cleanup_partial_output(output_dir: &Path) {
    log::warn!("Cleaning up partial output in: {}", output_dir.display());

    let entries = match fs::read_dir(output_dir) {
        Ok(entries) => entries,
        Err(err) => {
            log::warn!(
                "Failed to read '{}' for cleanup: {}",
                output_dir.display(),
                err
            );
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            continue;
        }
        if let Err(err) = fs::remove_file(&path) {
            log::warn!("Failed to remove '{}' during cleanup: {}", path.display(), err);
        } else {
            log::debug!("Removed file during cleanup: {}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_launch_spec_args() {
        let options = TranscodeOptions::default();
        let spec = options.launch_spec("live", "alice", &PathBuf::from("data/hls/live/alice"));

        assert_eq!(spec.program, "ffmpeg");
        assert_eq!(spec.label, "live/alice");
        assert_eq!(
            spec.args,
            vec![
                "-i",
                "rtmp://127.0.0.1:1935/live/alice",
                "-c:v",
                "libx264",
                "-c:a",
                "aac",
                "-b:v",
                "1000k",
                "-b:a",
                "128k",
                "-s",
                "1280x720",
                "-r",
                "30",
                "-f",
                "hls",
                "-hls_time",
                "4",
                "-hls_list_size",
                "10",
                "-hls_flags",
                "delete_segments",
                "-hls_segment_filename",
                "data/hls/live/alice/segment_%03d.ts",
                "data/hls/live/alice/playlist.m3u8",
            ]
        );
    }

    #[test]
    fn test_cleanup_missing_directory_is_silent() {
        cleanup_partial_output(&PathBuf::from("data/does-not-exist"));
    }

    #[test]
    fn test_cleanup_removes_files_not_directories() {
        let dir = std::env::temp_dir().join(format!("seglive-cleanup-{}", std::process::id()));
        let nested = dir.join("nested");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.join("segment_000.ts"), b"x").unwrap();
        fs::write(dir.join("playlist.m3u8"), b"#EXTM3U").unwrap();

        cleanup_partial_output(&dir);

        assert!(!dir.join("segment_000.ts").exists());
        assert!(!dir.join("playlist.m3u8").exists());
        assert!(nested.exists());

        let _ = fs::remove_dir_all(&dir);
    }
}
