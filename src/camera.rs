use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::config::CameraConfig;

type CameraResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Camera access as reported by the platform. `not-determined` maps to `Unknown`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionStatus {
    #[default]
    #[serde(alias = "not-determined")]
    Unknown,
    Granted,
    Denied,
}

/// Tap position in viewfinder coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// Still capture options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhotoOptions {
    /// Trade image quality for capture latency
    pub prioritize_speed: bool,
    pub shutter_sound: bool,
}

impl Default for PhotoOptions {
    fn default() -> Self {
        Self {
            prioritize_speed: true,
            shutter_sound: false,
        }
    }
}

#[async_trait]
pub trait Camera: Send + Sync {
    fn permission_status(&self) -> PermissionStatus;
    async fn request_permission(&self) -> PermissionStatus;
    /// Capture a still and return the path of the stored file.
    async fn take_photo(&self, options: PhotoOptions) -> CameraResult<PathBuf>;
    fn supports_focus(&self) -> bool;
    async fn focus(&self, point: Point) -> CameraResult<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PermissionRecord {
    status: PermissionStatus,
}

/// Camera backed by an inbox directory: the newest image dropped there is the shot.
pub struct FolderCamera {
    source_dir: PathBuf,
    captures_dir: PathBuf,
    permission_file: PathBuf,
    supports_focus: bool,
}

impl FolderCamera {
    /// Data directory: ~/.local/share/ocr-camera/
    fn data_dir() -> PathBuf {
        let mut p = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        p.push("ocr-camera");
        p
    }

    pub fn new(config: &CameraConfig) -> Self {
        Self::with_data_dir(config, &Self::data_dir())
    }

    pub fn with_data_dir(config: &CameraConfig, data_dir: &Path) -> Self {
        Self {
            source_dir: config.source_dir.clone(),
            captures_dir: data_dir.join("captures"),
            permission_file: data_dir.join("permission.json"),
            supports_focus: config.supports_focus,
        }
    }

    fn save_permission(&self, status: PermissionStatus) -> CameraResult<()> {
        if let Some(dir) = self.permission_file.parent() {
            fs::create_dir_all(dir)?;
        }
        let data = serde_json::to_string_pretty(&PermissionRecord { status })?;
        fs::write(&self.permission_file, data)?;
        Ok(())
    }

    fn newest_image(&self) -> CameraResult<PathBuf> {
        let mut newest: Option<(SystemTime, PathBuf)> = None;
        for entry in fs::read_dir(&self.source_dir)? {
            let path = entry?.path();
            if !is_image(&path) {
                continue;
            }
            let modified = fs::metadata(&path)?.modified()?;
            if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
                newest = Some((modified, path));
            }
        }
        newest
            .map(|(_, path)| path)
            .ok_or_else(|| format!("no image in {}", self.source_dir.display()).into())
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[async_trait]
impl Camera for FolderCamera {
    fn permission_status(&self) -> PermissionStatus {
        match fs::read_to_string(&self.permission_file) {
            Ok(data) => serde_json::from_str::<PermissionRecord>(&data)
                .map(|r| r.status)
                .unwrap_or_default(),
            Err(_) => PermissionStatus::Unknown,
        }
    }

    async fn request_permission(&self) -> PermissionStatus {
        let status = if self.source_dir.is_dir() {
            PermissionStatus::Granted
        } else {
            log::warn!("Camera inbox {} is not a directory", self.source_dir.display());
            PermissionStatus::Denied
        };
        if let Err(e) = self.save_permission(status) {
            log::warn!("Failed to save permission: {e}");
        }
        status
    }

    async fn take_photo(&self, options: PhotoOptions) -> CameraResult<PathBuf> {
        log::info!(
            "Taking photo (speed first: {}, shutter sound: {})...",
            options.prioritize_speed,
            options.shutter_sound
        );
        if self.permission_status() != PermissionStatus::Granted {
            return Err("camera permission not granted".into());
        }
        let source = self.newest_image()?;
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("jpg")
            .to_ascii_lowercase();

        tokio::fs::create_dir_all(&self.captures_dir).await?;
        let name = format!("photo-{}.{ext}", Local::now().format("%Y%m%d-%H%M%S%.3f"));
        let dest = self.captures_dir.join(name);
        tokio::fs::copy(&source, &dest).await?;
        log::info!("Captured {} -> {}", source.display(), dest.display());
        Ok(dest)
    }

    fn supports_focus(&self) -> bool {
        self.supports_focus
    }

    async fn focus(&self, point: Point) -> CameraResult<()> {
        log::info!("Focus at ({:.0}, {:.0})", point.x, point.y);
        Ok(())
    }
}
