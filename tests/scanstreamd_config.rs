use std::sync::Mutex;

use tempfile::NamedTempFile;

use scanstream::config::ScanstreamConfig;
use scanstream::CameraFacing;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SCANSTREAM_CONFIG",
        "SCANSTREAM_DEVICE",
        "SCANSTREAM_FACING",
        "SCANSTREAM_TARGET_FPS",
        "SCANSTREAM_PUMP_TIMEOUT_MS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "camera": {
            "device": "stub://front_camera",
            "facing": "front",
            "width": 800,
            "height": 600,
            "target_fps": 15
        },
        "pump_timeout_ms": 250
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("SCANSTREAM_CONFIG", file.path());
    std::env::set_var("SCANSTREAM_DEVICE", "stub://rear_camera");
    std::env::set_var("SCANSTREAM_TARGET_FPS", "24");

    let cfg = ScanstreamConfig::load().expect("load config");

    assert_eq!(cfg.camera.device, "stub://rear_camera");
    assert_eq!(cfg.camera.facing, CameraFacing::Front);
    assert_eq!(cfg.camera.width, 800);
    assert_eq!(cfg.camera.height, 600);
    assert_eq!(cfg.camera.target_fps, 24);
    assert_eq!(cfg.pump_timeout.as_millis(), 250);

    clear_env();
}

#[test]
fn defaults_apply_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = ScanstreamConfig::load().expect("load config");

    assert_eq!(cfg.camera.device, "stub://back_camera");
    assert_eq!(cfg.camera.facing, CameraFacing::Back);
    assert_eq!(cfg.camera.width, 640);
    assert_eq!(cfg.camera.height, 480);
    assert_eq!(cfg.camera.target_fps, 30);
    assert_eq!(cfg.pump_timeout.as_millis(), 100);
}

#[test]
fn rejects_invalid_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SCANSTREAM_TARGET_FPS", "0");
    assert!(ScanstreamConfig::load().is_err());
    clear_env();

    std::env::set_var("SCANSTREAM_DEVICE", "/dev/video0");
    assert!(ScanstreamConfig::load().is_err());
    clear_env();

    std::env::set_var("SCANSTREAM_FACING", "sideways");
    assert!(ScanstreamConfig::load().is_err());
    clear_env();
}
