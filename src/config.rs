use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::camera::{validate_device_uri, CameraConfig, CameraFacing};

const DEFAULT_DEVICE: &str = "stub://back_camera";
const DEFAULT_TARGET_FPS: u32 = 30;
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_PUMP_TIMEOUT_MS: u64 = 100;

#[derive(Debug, Deserialize, Default)]
struct ScanstreamConfigFile {
    camera: Option<CameraConfigFile>,
    pump_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    facing: Option<CameraFacing>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ScanstreamConfig {
    pub camera: CameraConfig,
    /// How long one mailbox pump waits for a detection event.
    pub pump_timeout: Duration,
}

impl ScanstreamConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SCANSTREAM_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load from an explicit file path (or defaults when `None`), then apply
    /// environment overrides and validate.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ScanstreamConfigFile) -> Self {
        let camera = CameraConfig {
            device: file
                .camera
                .as_ref()
                .and_then(|camera| camera.device.clone())
                .unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
            facing: file
                .camera
                .as_ref()
                .and_then(|camera| camera.facing)
                .unwrap_or(CameraFacing::Back),
            width: file
                .camera
                .as_ref()
                .and_then(|camera| camera.width)
                .unwrap_or(DEFAULT_WIDTH),
            height: file
                .camera
                .as_ref()
                .and_then(|camera| camera.height)
                .unwrap_or(DEFAULT_HEIGHT),
            target_fps: file
                .camera
                .as_ref()
                .and_then(|camera| camera.target_fps)
                .unwrap_or(DEFAULT_TARGET_FPS),
        };
        let pump_timeout =
            Duration::from_millis(file.pump_timeout_ms.unwrap_or(DEFAULT_PUMP_TIMEOUT_MS));
        Self {
            camera,
            pump_timeout,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(device) = std::env::var("SCANSTREAM_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.device = device;
            }
        }
        if let Ok(facing) = std::env::var("SCANSTREAM_FACING") {
            if !facing.trim().is_empty() {
                self.camera.facing = parse_facing(&facing)?;
            }
        }
        if let Ok(fps) = std::env::var("SCANSTREAM_TARGET_FPS") {
            let fps: u32 = fps
                .parse()
                .map_err(|_| anyhow!("SCANSTREAM_TARGET_FPS must be an integer"))?;
            self.camera.target_fps = fps;
        }
        if let Ok(timeout) = std::env::var("SCANSTREAM_PUMP_TIMEOUT_MS") {
            let ms: u64 = timeout.parse().map_err(|_| {
                anyhow!("SCANSTREAM_PUMP_TIMEOUT_MS must be an integer number of milliseconds")
            })?;
            self.pump_timeout = Duration::from_millis(ms);
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        validate_device_uri(&self.camera.device)?;
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera resolution must be non-zero"));
        }
        if self.camera.target_fps == 0 {
            return Err(anyhow!("camera target_fps must be greater than zero"));
        }
        if self.pump_timeout.is_zero() {
            return Err(anyhow!("pump_timeout_ms must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ScanstreamConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn parse_facing(value: &str) -> Result<CameraFacing> {
    match value.trim().to_lowercase().as_str() {
        "back" => Ok(CameraFacing::Back),
        "front" => Ok(CameraFacing::Front),
        other => Err(anyhow!(
            "SCANSTREAM_FACING must be 'back' or 'front', got '{}'",
            other
        )),
    }
}
