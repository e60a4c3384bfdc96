use super::*;

#[test]
fn empty_document_yields_full_defaults() {
    let config: Config = serde_yml::from_str("settings: {}").unwrap();
    assert!(!config.settings.debug_mode);
    assert_eq!(config.settings.default_shell, None);
    assert_eq!(config.settings.write_queue_capacity, 256);
    assert_eq!(config.settings.write_timeout_ms, 2_000);
    assert_eq!(config.settings.output_buffer_limit, 1024 * 1024);
    assert!(config.settings.watch_profiles);
}

#[test]
fn explicit_values_override_defaults() {
    let yaml = r#"
settings:
  debug_mode: true
  default_shell: /bin/zsh
  write_queue_capacity: 16
  write_timeout_ms: 250
  output_buffer_limit: 4096
  watch_profiles: false
"#;
    let config: Config = serde_yml::from_str(yaml).unwrap();
    assert!(config.settings.debug_mode);
    assert_eq!(config.settings.default_shell.as_deref(), Some("/bin/zsh"));
    assert_eq!(config.settings.write_queue_capacity, 16);
    assert_eq!(config.settings.write_timeout_ms, 250);
    assert_eq!(config.settings.output_buffer_limit, 4096);
    assert!(!config.settings.watch_profiles);
}

#[test]
fn shipped_default_template_parses() {
    let template = include_str!("../../../templates/default-config.yaml");
    let config: Config = serde_yml::from_str(template).unwrap();
    assert_eq!(config.settings.write_queue_capacity, 256);
    assert!(config.settings.watch_profiles);
}
