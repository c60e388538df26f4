use std::fs;

use gungnir_lib::{load_from_path, PrefilterSetting};

#[test]
fn loads_minimal_config() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("engine.toml");
    fs::write(&path, "")?;

    let cfg = load_from_path(&path)?;
    assert_eq!(cfg.prefilter, PrefilterSetting::Mpm);
    assert!(!cfg.firewall);
    assert!(cfg.features.is_empty());
    Ok(())
}

#[test]
fn loads_full_config() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("engine.toml");
    let toml = r#"
prefilter = "auto"
strict_keywords = ["classtype", "metadata"]
raw_packet_injection = true
firewall = true
features = ["output::file-store"]
disabled_app_protos = ["smb", "ftp"]
"#;
    fs::write(&path, toml)?;

    let cfg = load_from_path(&path)?;
    assert_eq!(cfg.prefilter, PrefilterSetting::Auto);
    assert_eq!(cfg.strict_keywords.len(), 2);
    assert!(cfg.raw_packet_injection);
    assert!(cfg.firewall);
    assert_eq!(cfg.disabled_app_protos, vec!["smb", "ftp"]);
    Ok(())
}

#[test]
fn missing_file_is_an_error() {
    assert!(load_from_path("/no/such/config.toml").is_err());
}

#[test]
fn malformed_toml_is_an_error() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("engine.toml");
    fs::write(&path, "prefilter = [broken")?;
    assert!(load_from_path(&path).is_err());
    Ok(())
}
