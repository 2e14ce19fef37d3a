use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use strip_beacon::config::BeaconConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "BEACON_CONFIG",
        "BEACON_SERIAL_PATH",
        "BEACON_SERIAL_BAUD",
        "BEACON_TARGET_LABEL",
        "BEACON_LED_COUNT",
        "BEACON_SAMPLE_PATH",
        "BEACON_MODEL_PATH",
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
        "serial": { "path": "/dev/ttyACM1", "baud": 57600, "settle_ms": 20 },
        "strip": { "led_count": 60, "target_label": "crack" },
        "camera": { "device_prefix": "/dev/video", "primary_index": 2, "secondary_index": 2 },
        "sample": { "path": "clips/road.mp4" },
        "model": { "backend": "scripted", "input_size": 320 },
        "display": { "viewport_width": 1280, "viewport_height": 720 },
        "stop_grace_ms": 250
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("BEACON_CONFIG", file.path());
    std::env::set_var("BEACON_TARGET_LABEL", "  Pothole ");
    std::env::set_var("BEACON_LED_COUNT", "144");

    let cfg = BeaconConfig::load().expect("load config");

    assert_eq!(cfg.serial.path, "/dev/ttyACM1");
    assert_eq!(cfg.serial.baud, 57600);
    assert_eq!(cfg.serial.settle, Duration::from_millis(20));
    assert!(cfg.serial.enabled);
    assert_eq!(cfg.strip.led_count, 144);
    assert_eq!(cfg.strip.target_label, "Pothole");
    assert_eq!(cfg.camera.primary_index, 2);
    assert_eq!(cfg.camera.secondary_index, Some(2));
    assert_eq!(cfg.sample_path, "clips/road.mp4");
    assert_eq!(cfg.model.backend, "scripted");
    assert_eq!(cfg.model.input_size, 320);
    assert_eq!(cfg.display.viewport_width, 1280);
    assert_eq!(
        cfg.display.preview_path,
        Some(PathBuf::from("preview.jpg"))
    );
    assert_eq!(cfg.stop_grace, Duration::from_millis(250));

    clear_env();
}

#[test]
fn defaults_apply_without_a_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = BeaconConfig::load().expect("load defaults");
    assert_eq!(cfg.serial.baud, 115_200);
    assert_eq!(cfg.strip.led_count, 144);
    assert_eq!(cfg.strip.target_label, "pothole");
    assert_eq!(cfg.sample_path, "sample_video.mp4");
    assert_eq!(cfg.model.backend, "tract");
}

#[test]
fn rejects_invalid_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("BEACON_SERIAL_BAUD", "fast");
    assert!(BeaconConfig::load().is_err());
    clear_env();

    std::env::set_var("BEACON_LED_COUNT", "0");
    assert!(BeaconConfig::load().is_err());
    clear_env();
}

#[test]
fn display_can_be_disabled_from_the_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(
        &mut file,
        br#"{ "display": { "enabled": false, "preview_path": "frames/live.jpg" } }"#,
    )
    .expect("write config");
    let cfg = BeaconConfig::load_from(Some(file.path())).expect("load config");
    assert_eq!(cfg.display.preview_path, None);

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(
        &mut file,
        br#"{ "display": { "preview_path": "frames/live.jpg" } }"#,
    )
    .expect("write config");
    let cfg = BeaconConfig::load_from(Some(file.path())).expect("load config");
    assert_eq!(
        cfg.display.preview_path,
        Some(PathBuf::from("frames/live.jpg"))
    );
}

#[test]
fn rejects_malformed_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, b"{ \"strip\": ").expect("write config");
    let err = BeaconConfig::load_from(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("invalid config file"));
}
