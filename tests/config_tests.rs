// SPDX-License-Identifier: MPL-2.0

//! Integration tests for configuration module

use frame_transcoder::errors::TranscodeError;
use frame_transcoder::{ExtractConfig, MediaConfig};
use std::time::Duration;

#[test]
fn test_config_default() {
    let config = MediaConfig::default();

    assert_eq!(config.mime_type, "video/avc");
    assert_eq!(config.bit_rate, 1_000_000);
    assert_eq!(config.frame_rate, 30);
    assert_eq!(config.i_frame_interval, 1);
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_uses_camel_case_keys() {
    let json = serde_json::to_value(MediaConfig::default()).unwrap();
    for key in ["mimeType", "bitRate", "frameRate", "iFrameInterval"] {
        assert!(json.get(key).is_some(), "missing key {}", key);
    }
}

#[test]
fn test_config_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let config = MediaConfig {
        mime_type: "video/hevc".into(),
        bit_rate: 4_000_000,
        frame_rate: 24,
        i_frame_interval: 2,
    };
    config.save(&path).unwrap();

    assert_eq!(MediaConfig::load(&path).unwrap(), config);
}

#[test]
fn test_config_load_rejects_invalid_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"mimeType": "video/x-vnd.on2.vp8"}"#).unwrap();

    assert!(matches!(
        MediaConfig::load(&path),
        Err(TranscodeError::Config(_))
    ));
}

#[test]
fn test_config_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = MediaConfig::load(&dir.path().join("absent.json"));
    assert!(matches!(result, Err(TranscodeError::Config(_))));
}

#[test]
fn test_extract_config_default() {
    let config = ExtractConfig::default();
    assert_eq!((config.width, config.height), (1280, 720));
    assert_eq!(config.photo_quality, 100);
    assert_eq!(config.frame_timeout, Duration::from_secs(3));
}
