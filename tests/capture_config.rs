use std::sync::Mutex;

use tempfile::NamedTempFile;

use depth_capture::config::{CaptureConfig, ExportMode};
use depth_capture::{PixelFormat, StreamKind};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "DEPTH_CAPTURE_CONFIG",
        "DEPTH_CAPTURE_SOURCE_URL",
        "DEPTH_CAPTURE_OUTPUT_DIR",
        "DEPTH_CAPTURE_WARMUP_BUNDLES",
        "DEPTH_CAPTURE_MAX_BUNDLES",
        "DEPTH_CAPTURE_EXPORT_MODE",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "source": {
            "url": "stub://bench",
            "timeout_ms": 1500,
            "row_padding": 16,
            "realtime": false
        },
        "streams": {
            "color": { "width": 640, "height": 480, "format": "bgr8", "fps": 15 },
            "depth": { "width": 848, "height": 480 },
            "infrared": { "format": "y8" }
        },
        "capture": { "warmup_bundles": 10 },
        "export": { "output_dir": "/tmp/frames", "mode": "pooled", "queue_capacity": 8 },
        "display": { "width": 800, "height": 600 }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("DEPTH_CAPTURE_CONFIG", file.path());
    std::env::set_var("DEPTH_CAPTURE_SOURCE_URL", "stub://override");
    std::env::set_var("DEPTH_CAPTURE_MAX_BUNDLES", "12");

    let cfg = CaptureConfig::load().expect("load config");

    assert_eq!(cfg.source.url, "stub://override");
    assert_eq!(cfg.source.timeout.as_millis(), 1500);
    assert_eq!(cfg.source.synthetic.row_padding, 16);
    assert!(!cfg.source.synthetic.realtime);

    let color = cfg.streams[0];
    assert_eq!(color.kind, StreamKind::Color);
    assert_eq!((color.width, color.height), (Some(640), Some(480)));
    assert_eq!(color.format, Some(PixelFormat::Bgr8));
    assert_eq!(color.fps, Some(15));
    let depth = cfg.streams[1];
    assert_eq!((depth.width, depth.height), (Some(848), Some(480)));
    assert_eq!(depth.format, None);
    assert_eq!(cfg.streams[2].format, Some(PixelFormat::Y8));
    assert_eq!((cfg.streams[2].index, cfg.streams[3].index), (0, 1));

    assert_eq!(cfg.warmup_bundles, 10);
    assert_eq!(cfg.max_bundles, Some(12));
    assert_eq!(cfg.export.output_dir.to_str(), Some("/tmp/frames"));
    assert_eq!(cfg.export.mode, ExportMode::Pooled);
    assert_eq!(cfg.export.queue_capacity, 8);
    assert_eq!((cfg.window.width, cfg.window.height), (800, 600));

    let settings = cfg.capture_settings();
    assert_eq!(settings.warmup_bundles, 10);
    assert_eq!(settings.streams.len(), 4);

    clear_env();
}

#[test]
fn defaults_apply_without_a_config_file() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let cfg = CaptureConfig::load().expect("load defaults");
    assert_eq!(cfg.source.url, "stub://depth_camera");
    assert_eq!(cfg.warmup_bundles, 30);
    assert_eq!(cfg.max_bundles, None);
    assert_eq!(cfg.export.mode, ExportMode::Inline);
    assert_eq!(cfg.export.output_dir.to_str(), Some("."));
}

#[test]
fn rejects_bad_env_values() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    std::env::set_var("DEPTH_CAPTURE_WARMUP_BUNDLES", "thirty");
    assert!(CaptureConfig::load().is_err());
    clear_env();

    std::env::set_var("DEPTH_CAPTURE_EXPORT_MODE", "threads");
    assert!(CaptureConfig::load().is_err());
    clear_env();
}

#[test]
fn rejects_invalid_config_file() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(
        &mut file,
        br#"{ "streams": { "depth": { "width": 0 } } }"#,
    )
    .expect("write config");
    assert!(CaptureConfig::load_from(Some(file.path())).is_err());

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, b"{ not json").expect("write config");
    assert!(CaptureConfig::load_from(Some(file.path())).is_err());
}
