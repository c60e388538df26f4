//! The keyword registry.
//!
//! Every rule option keyword registers one [`KeywordSpec`] here: its name,
//! optional alias, parsing behavior, setup entry point and which detect
//! tables it may run in. The registry is built once per process (or per
//! engine) from the built-in set and is read-only afterwards.

use ahash::AHashMap;

use crate::config::EngineConfig;
use crate::engine::EngineTables;
use crate::signature::Signature;

/// Keyword identifiers. The discriminant is the dense keyword id used on
/// match instances and for the stable prefilter tie-break (lowest id wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u16)]
pub enum Kw {
    Sid,
    Gid,
    Rev,
    Msg,
    Priority,
    Classtype,
    Metadata,
    Reference,
    Requires,
    Dsize,
    Flow,
    StreamSize,
    Content,
    Nocase,
    Offset,
    Depth,
    Distance,
    Within,
    Rawbytes,
    FastPattern,
    Prefilter,
    FileData,
    FileName,
    HttpUri,
    HttpUriModifier,
}

impl Kw {
    pub fn id(self) -> u16 {
        self as u16
    }
}

/// Whether a keyword takes a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueMode {
    Required,
    None,
    Optional,
}

/// Quoting requirements for a keyword's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteMode {
    Forbidden,
    Optional,
    Mandatory,
}

/// Error taxonomy a keyword setup may produce. Nothing else crosses the
/// keyword module boundary.
#[derive(Debug)]
pub enum SetupError {
    Parse(String),
    /// Reject the rule; the message is emitted at most once per engine
    /// build for this keyword.
    Silent(String),
    RequirementsUnmet,
}

impl SetupError {
    pub fn parse(msg: impl Into<String>) -> Self {
        SetupError::Parse(msg.into())
    }
}

pub type SetupResult = Result<(), SetupError>;

/// Context handed to keyword setup callbacks.
pub struct SetupCtx<'a> {
    pub sig: &'a mut Signature,
    pub tables: &'a EngineTables,
    pub config: &'a EngineConfig,
    pub registry: &'a KeywordRegistry,
    /// Strict-parsing flag of the keyword being set up.
    pub strict: bool,
}

pub type SetupFn = fn(&mut SetupCtx<'_>, Option<&str>) -> SetupResult;

/// Registration record for one rule keyword.
pub struct KeywordSpec {
    pub kw: Kw,
    pub name: &'static str,
    pub alias: Option<&'static str>,
    pub value: ValueMode,
    pub quoting: QuoteMode,
    /// A leading `!` in the value marks the match negated.
    pub negation: bool,
    /// The value may start with `to_server` or `to_client`.
    pub direction: bool,
    /// Whether the keyword has been validated for firewall rules.
    pub firewall_ok: bool,
    pub strict: bool,
    /// Deprecated keyword; the replacement, if any, is suggested in the
    /// warning.
    pub deprecated: bool,
    pub alternative: Option<Kw>,
    /// Bitmap of detect tables this keyword may run in; 0 means any.
    pub tables: u8,
    pub setup: SetupFn,
    /// Present when the keyword can serve as a non-content prefilter.
    pub supports_prefilter: Option<fn(&Signature) -> bool>,
    /// Whether the keyword evaluates against raw packets at runtime. Drives
    /// the packet-evaluation flag for rules without app-layer matching.
    pub packet_match: bool,
}

impl KeywordSpec {
    /// Baseline spec; registration sites override the handful of fields
    /// that differ from the common case.
    pub fn new(kw: Kw, name: &'static str, setup: SetupFn) -> Self {
        KeywordSpec {
            kw,
            name,
            alias: None,
            value: ValueMode::Required,
            quoting: QuoteMode::Forbidden,
            negation: false,
            direction: false,
            firewall_ok: false,
            strict: false,
            deprecated: false,
            alternative: None,
            tables: 0,
            setup,
            supports_prefilter: None,
            packet_match: false,
        }
    }
}

/// Process-wide keyword table with case-insensitive name lookup.
pub struct KeywordRegistry {
    specs: Vec<KeywordSpec>,
    by_name: AHashMap<String, usize>,
}

impl KeywordRegistry {
    pub fn from_specs(specs: Vec<KeywordSpec>) -> Self {
        let mut by_name = AHashMap::with_capacity(specs.len() * 2);
        for (i, spec) in specs.iter().enumerate() {
            by_name.insert(spec.name.to_ascii_lowercase(), i);
            if let Some(alias) = spec.alias {
                by_name.insert(alias.to_ascii_lowercase(), i);
            }
        }
        KeywordRegistry { specs, by_name }
    }

    /// The built-in keyword set.
    pub fn builtin() -> Self {
        Self::from_specs(crate::keywords::builtin_specs())
    }

    /// Apply the strict-parsing toggles from the engine configuration.
    /// `"all"` enables strict mode on every keyword; unknown names warn.
    pub fn apply_strict(&mut self, keywords: &[String]) {
        for name in keywords {
            if name == "all" {
                for spec in &mut self.specs {
                    spec.strict = true;
                }
                return;
            }
        }
        for name in keywords {
            match self.by_name.get(&name.to_ascii_lowercase()).copied() {
                Some(i) => self.specs[i].strict = true,
                None => {
                    tracing::warn!(keyword = %name, "strict option names an unknown keyword")
                }
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&KeywordSpec> {
        self.by_name
            .get(&name.to_ascii_lowercase())
            .map(|i| &self.specs[*i])
    }

    pub fn spec(&self, kw: Kw) -> &KeywordSpec {
        self.specs
            .iter()
            .find(|s| s.kw == kw)
            .expect("built-in keyword is registered")
    }

    pub fn name_of(&self, kw: Kw) -> &'static str {
        self.spec(kw).name
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeywordSpec> {
        self.specs.iter()
    }

    /// Whether any registered keyword of this id can act as a prefilter.
    pub fn prefilter_capable(&self, kw: Kw) -> bool {
        self.spec(kw).supports_prefilter.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let reg = KeywordRegistry::builtin();
        assert!(reg.get("SID").is_some());
        assert!(reg.get("content").is_some());
        assert!(reg.get("no_such_keyword").is_none());
    }

    #[test]
    fn aliases_resolve_to_the_same_spec() {
        let reg = KeywordRegistry::builtin();
        let by_name = reg.get("file.data").expect("registered");
        let by_alias = reg.get("file_data").expect("registered");
        assert_eq!(by_name.kw, by_alias.kw);
    }

    #[test]
    fn strict_all_flips_every_keyword() {
        let mut reg = KeywordRegistry::builtin();
        reg.apply_strict(&["all".to_string()]);
        assert!(reg.iter().all(|s| s.strict));
    }

    #[test]
    fn strict_by_name() {
        let mut reg = KeywordRegistry::builtin();
        reg.apply_strict(&["classtype".to_string()]);
        assert!(reg.get("classtype").expect("registered").strict);
        assert!(!reg.get("msg").expect("registered").strict);
    }
}
