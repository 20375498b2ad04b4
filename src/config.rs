use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Where the folder camera picks up new photos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Inbox the phone/tethering software drops images into
    pub source_dir: PathBuf,
    /// Whether tap-to-focus is forwarded to the device
    pub supports_focus: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        let mut source_dir = dirs::picture_dir().unwrap_or_else(|| PathBuf::from("."));
        source_dir.push("ocr-camera-inbox");
        Self {
            source_dir,
            supports_focus: false,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub upload_url: String,
    pub messages_url: String,
    pub poll_interval_secs: u64,
    pub camera: CameraConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upload_url: String::new(),
            messages_url: String::new(),
            poll_interval_secs: 5,
            camera: CameraConfig::default(),
        }
    }
}

impl Config {
    /// Directory: ~/.config/ocr-camera/
    pub fn dir() -> PathBuf {
        let mut p = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        p.push("ocr-camera");
        p
    }

    fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load from disk, returning defaults if file doesn't exist or is invalid.
    /// `UPLOAD_URL` and `MESSAGES_URL` from the environment win over the file.
    pub fn load() -> Self {
        let path = Self::path();
        let mut config = match fs::read_to_string(&path) {
            Ok(data) => Self::parse(&data),
            Err(_) => {
                let config = Self::default();
                if let Err(e) = config.save() {
                    log::warn!("Failed to write default config: {e}");
                }
                config
            }
        };
        config.apply_overrides(
            std::env::var("UPLOAD_URL").ok(),
            std::env::var("MESSAGES_URL").ok(),
        );
        config
    }

    fn parse(data: &str) -> Self {
        serde_json::from_str(data).unwrap_or_else(|e| {
            log::warn!("Invalid config file, using defaults: {e}");
            Self::default()
        })
    }

    fn apply_overrides(&mut self, upload_url: Option<String>, messages_url: Option<String>) {
        if let Some(url) = upload_url.filter(|u| !u.is_empty()) {
            self.upload_url = url;
        }
        if let Some(url) = messages_url.filter(|u| !u.is_empty()) {
            self.messages_url = url;
        }
    }

    /// Persist to disk.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let dir = Self::dir();
        fs::create_dir_all(&dir)?;
        let data = serde_json::to_string_pretty(self)?;
        fs::write(Self::path(), data)?;
        Ok(())
    }

    /// Both endpoints must be known before the session can run.
    pub fn validate(&self) -> Result<(), String> {
        let mut missing = Vec::new();
        if self.upload_url.trim().is_empty() {
            missing.push("upload_url (or UPLOAD_URL)");
        }
        if self.messages_url.trim().is_empty() {
            missing.push("messages_url (or MESSAGES_URL)");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(format!(
                "missing {} in {}",
                missing.join(", "),
                Self::path().display()
            ))
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}
