use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, RuleError};

/// Prefilter engine selection strategy
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PrefilterSetting {
    /// Only multi-pattern content prefilters are used
    #[default]
    Mpm,
    /// Non-content keywords that support prefiltering may be promoted
    /// when a rule has no usable content pattern
    Auto,
}

/// Engine build configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct EngineConfig {
    /// Prefilter selection strategy
    /// Default: "mpm"
    #[serde(default)]
    pub prefilter: PrefilterSetting,
    /// Keywords whose parsers run in strict mode. The single entry "all"
    /// enables strict parsing for every keyword.
    #[serde(default)]
    pub strict_keywords: Vec<String>,
    /// Whether this process can inject raw packets on the wire.
    /// The reject actions are refused at parse time without it.
    /// Default: false
    #[serde(default)]
    pub raw_packet_injection: bool,
    /// Load rules as firewall rules (explicit action scopes required,
    /// accept/drop authoritative)
    /// Default: false
    #[serde(default)]
    pub firewall: bool,
    /// Capability names visible to the `requires` keyword
    #[serde(default)]
    pub features: Vec<String>,
    /// Application-layer protocols with detection disabled; using one in a
    /// rule header is a parse error
    #[serde(default)]
    pub disabled_app_protos: Vec<String>,
}

pub fn load_from_path<P: AsRef<Path>>(p: P) -> Result<EngineConfig> {
    let txt = fs::read_to_string(p)
        .map_err(|e| RuleError::Parse(format!("failed to read config file: {e}")))?;
    let cfg: EngineConfig = toml::from_str(&txt)
        .map_err(|e| RuleError::Parse(format!("failed to parse config: {e}")))?;

    validate(&cfg)?;

    Ok(cfg)
}

fn validate(cfg: &EngineConfig) -> Result<()> {
    if cfg.strict_keywords.iter().any(|k| k.trim().is_empty()) {
        return Err(RuleError::parse("strict_keywords entries cannot be empty"));
    }
    if cfg.features.iter().any(|f| f.trim().is_empty()) {
        return Err(RuleError::parse("features entries cannot be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.prefilter, PrefilterSetting::Mpm);
        assert!(!cfg.raw_packet_injection);
        assert!(!cfg.firewall);
        assert!(cfg.features.is_empty());
    }

    #[test]
    fn parses_full_config() {
        let toml = r#"
prefilter = "auto"
strict_keywords = ["classtype"]
raw_packet_injection = true
features = ["output::file-store"]
disabled_app_protos = ["smb"]
"#;
        let cfg: EngineConfig = toml::from_str(toml).expect("valid config");
        assert_eq!(cfg.prefilter, PrefilterSetting::Auto);
        assert_eq!(cfg.strict_keywords, vec!["classtype"]);
        assert!(cfg.raw_packet_injection);
        assert_eq!(cfg.disabled_app_protos, vec!["smb"]);
    }

    #[test]
    fn rejects_empty_feature_name() {
        let cfg = EngineConfig { features: vec!["".into()], ..Default::default() };
        assert!(validate(&cfg).is_err());
    }
}
