//! Config loading through the public API, against real files on disk.

use std::io::Write;

use pl_common::config::ConfigResolution;
use pl_common::{Config, ConfigPaths, ConfigResolver, Error, ErrorCategory, StructuredError};

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(contents.as_bytes()).unwrap();
    tmp
}

fn resolver_for(file: &tempfile::NamedTempFile) -> ConfigResolver {
    ConfigResolver::new(ConfigPaths {
        config_path: Some(file.path().to_path_buf()),
    })
}

#[test]
fn partial_file_keeps_default_sections() {
    let file = write_config(r#"{"risk": {"low_high_boundary": 20, "medium_high_boundary": 80}}"#);
    let config = Config::load(&resolver_for(&file)).unwrap();

    assert_eq!(config.risk.low_high_boundary, 20.0);
    assert_eq!(config.risk.medium_high_boundary, 80.0);
    assert_eq!(config.risk.thread_weight, 30.0);
    assert!(config
        .classification
        .critical_names
        .iter()
        .any(|n| n == "lsass.exe"));
    assert_eq!(config.source.resolution, ConfigResolution::CliFlag);
    assert_eq!(config.source.hash.as_ref().map(String::len), Some(64));
    config.validate().unwrap();
}

#[test]
fn same_contents_hash_identically() {
    let a = write_config(r#"{"risk": {"handle_weight": 10}}"#);
    let b = write_config(r#"{"risk": {"handle_weight": 10}}"#);
    let first = Config::load(&resolver_for(&a)).unwrap();
    let second = Config::load(&resolver_for(&b)).unwrap();
    assert_eq!(first.source.hash, second.source.hash);
    assert_ne!(first.source.path, second.source.path);
}

#[test]
fn inverted_boundaries_are_rejected() {
    let file = write_config(r#"{"risk": {"low_high_boundary": 70, "medium_high_boundary": 30}}"#);
    let err = Config::load(&resolver_for(&file)).unwrap_err();
    assert!(matches!(err, Error::InvalidConfiguration(_)));
    assert_eq!(err.category(), ErrorCategory::Config);
    assert!(err.is_recoverable());
}

#[test]
fn malformed_json_is_invalid_configuration() {
    let file = write_config("{ not json");
    let err = Config::load(&resolver_for(&file)).unwrap_err();
    let structured = StructuredError::from(&err);
    assert_eq!(structured.code, 20);
    assert!(structured.message.contains("failed to parse"));
}

#[test]
fn bad_classification_regex_is_rejected() {
    let file = write_config(r#"{"classification": {"critical_patterns": ["(oops"]}}"#);
    let err = Config::load(&resolver_for(&file)).unwrap_err();
    assert!(err.to_string().contains("critical_patterns[0]"));
}

#[test]
fn defaults_validate() {
    let config = Config::load_defaults();
    config.validate().unwrap();
    assert_eq!(config.source.resolution, ConfigResolution::Default);
    assert!(config.source.path.is_none());
}
