use crate::errors::{Result, StreamError};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

pub struct ConfigManager {
    settings: Settings,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        let settings = Self::load_config()?;
        Ok(Self { settings })
    }

    fn find_config_file() -> Result<PathBuf> {
        let possible_paths = [
            std::env::var("SEGLIVE_CONFIG").ok().map(PathBuf::from),
            Some(PathBuf::from("conf.yaml")),
            Some(PathBuf::from("config/conf.yaml")),
            Some(PathBuf::from("/etc/seglive/conf.yaml")),
            Some(PathBuf::from("config/default.yaml")),
        ];

        for path in possible_paths.iter().flatten() {
            if path.exists() {
                log::info!("Using config file: {}", path.display());
                return Ok(path.clone());
            }
        }

        Err(StreamError::Config {
            message: "No configuration file found. Tried: conf.yaml, config/conf.yaml, /etc/seglive/conf.yaml, config/default.yaml".to_string(),
        })
    }

    fn load_config() -> Result<Settings> {
        let mut config = Config::builder();

        // 尝试加载配置文件
        if let Ok(config_path) = Self::find_config_file() {
            config = config.add_source(File::from(config_path.as_ref()));
        } else {
            log::warn!("No config file found, using defaults and environment variables only");
        }

        // 添加环境变量支持
        config = config.add_source(Environment::with_prefix("SEGLIVE").separator("_"));

        // 设置默认值
        config = config
            .set_default("rtmp.port", 1935)?
            .set_default("http.port", 8080)?
            .set_default("hls.data_path", "data/hls")?
            .set_default("hls.segment_duration", 4)?
            .set_default("hls.playlist_window", 10)?
            .set_default("ffmpeg.binary_path", "ffmpeg")?
            .set_default("ffmpeg.video_codec", "libx264")?
            .set_default("ffmpeg.audio_codec", "aac")?
            .set_default("ffmpeg.video_bitrate", "1000k")?
            .set_default("ffmpeg.audio_bitrate", "128k")?
            .set_default("ffmpeg.resolution", "1280x720")?
            .set_default("ffmpeg.frame_rate", "30")?
            .set_default("log_level", "info")?
            .set_default("shutdown_timeout_secs", 30)?;

        let config = config.build().map_err(|e| StreamError::Config {
            message: format!("Failed to build config: {}", e),
        })?;

        config.try_deserialize().map_err(|e| StreamError::Config {
            message: format!("Failed to deserialize config: {}", e),
        })
    }

    pub fn get_settings(&self) -> &Settings {
        &self.settings
    }

    pub fn reload(&mut self) -> Result<()> {
        log::info!("Reloading configuration...");
        self.settings = Self::load_config()?;
        log::info!("Configuration reloaded successfully");
        Ok(())
    }
}

// 保持向后兼容的全局函数
pub fn get_setting() -> Settings {
    match ConfigManager::new() {
        Ok(manager) => manager.settings.clone(),
        Err(e) => {
            log::error!("Failed to load config: {}", e);
            Settings::default()
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub rtmp: Rtmp,
    pub http: Http,
    pub hls: Hls,
    pub ffmpeg: Ffmpeg,
    pub log_level: String,
    pub shutdown_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rtmp: Rtmp::default(),
            http: Http::default(),
            hls: Hls::default(),
            ffmpeg: Ffmpeg::default(),
            log_level: "info".to_string(),
            shutdown_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Rtmp {
    pub port: i32,
}

impl Default for Rtmp {
    fn default() -> Self {
        Self { port: 1935 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Http {
    pub port: i32,
}

impl Default for Http {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Hls {
    pub data_path: String,
    pub segment_duration: u32,
    pub playlist_window: u32,
}

impl Default for Hls {
    fn default() -> Self {
        Self {
            data_path: "data/hls".to_string(),
            segment_duration: 4,
            playlist_window: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Ffmpeg {
    pub binary_path: String,
    pub video_codec: String,
    pub audio_codec: String,
    pub video_bitrate: String,
    pub audio_bitrate: String,
    pub resolution: String,
    pub frame_rate: String,
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self {
            binary_path: "ffmpeg".to_string(),
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            video_bitrate: "1000k".to_string(),
            audio_bitrate: "128k".to_string(),
            resolution: "1280x720".to_string(),
            frame_rate: "30".to_string(),
        }
    }
}
