//! The rule option parser: iterates `name[:value];` pairs, normalizes
//! quoting, negation and direction prefixes, and dispatches to the keyword
//! registry.

use ahash::AHashSet;
use tracing::warn;

use crate::config::EngineConfig;
use crate::engine::EngineTables;
use crate::error::{Result, RuleError};
use crate::keyword::{Kw, KeywordRegistry, QuoteMode, SetupCtx, SetupError, ValueMode};
use crate::proto::Direction;
use crate::signature::{
    Signature, SIG_FLAG_TOCLIENT, SIG_FLAG_TOSERVER, SIG_FLAG_TXBOTHDIR,
    SIG_INIT_FORCE_TOCLIENT, SIG_INIT_FORCE_TOSERVER,
};

/// Which of the two parsing passes is running. The scan pass evaluates only
/// `requires` and `sid`; the build pass everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Scan,
    Build,
}

pub struct OptionParser<'a> {
    pub registry: &'a KeywordRegistry,
    pub tables: &'a EngineTables,
    pub config: &'a EngineConfig,
    pub silent_seen: &'a mut AHashSet<Kw>,
}

impl OptionParser<'_> {
    pub fn parse(&mut self, sig: &mut Signature, opts: &str, pass: Pass) -> Result<()> {
        let mut rest = opts;
        loop {
            let s = rest.trim_start();
            if s.is_empty() {
                return Ok(());
            }
            let end = find_unescaped_semicolon(s)
                .ok_or_else(|| RuleError::parse("no terminating \";\" found"))?;
            let option = &s[..end];
            rest = &s[end + 1..];

            self.parse_one(sig, option, pass)?;
        }
    }

    fn parse_one(&mut self, sig: &mut Signature, option: &str, pass: Pass) -> Result<()> {
        let (name, value) = match option.split_once(':') {
            Some((n, v)) => (n.trim(), Some(v.trim())),
            None => (option.trim(), None),
        };

        // requires and sid are evaluated in the scan pass and skipped in
        // the build pass; everything else is the other way around
        let scan_only =
            name.eq_ignore_ascii_case("requires") || name.eq_ignore_ascii_case("sid");
        if (pass == Pass::Scan) != scan_only {
            return Ok(());
        }

        let spec = self
            .registry
            .get(name)
            .ok_or_else(|| RuleError::Parse(format!("unknown rule keyword \"{name}\"")))?;

        let has_value = value.map(|v| !v.is_empty()).unwrap_or(false);
        match spec.value {
            ValueMode::Required if !has_value => {
                return Err(RuleError::Parse(format!(
                    "invalid formatting or malformed option to {name} keyword: \"{option}\""
                )));
            }
            ValueMode::None if has_value => {
                return Err(RuleError::Parse(format!(
                    "unexpected option to {name} keyword: \"{option}\""
                )));
            }
            _ => {}
        }

        sig.init_data_mut().negated = false;
        if spec.supports_prefilter.is_some() {
            sig.init_data_mut().has_possible_prefilter = true;
        }

        if spec.deprecated {
            match spec.alternative {
                Some(alt) => warn!(
                    keyword = spec.name,
                    replacement = self.registry.name_of(alt),
                    "keyword is deprecated and will be removed"
                ),
                None => warn!(keyword = spec.name, "keyword is deprecated and will be removed"),
            }
        }
        if sig.init_data().firewall_rule && !spec.firewall_ok {
            warn!(keyword = spec.name, "keyword has not been tested for firewall rules");
        }

        let setup_value = if has_value {
            Some(self.normalize_value(sig, spec, name, option, value.expect("has_value"))?)
        } else {
            None
        };

        let result = {
            let mut ctx = SetupCtx {
                sig: &mut *sig,
                tables: self.tables,
                config: self.config,
                registry: self.registry,
                strict: spec.strict,
            };
            let val = setup_value.as_deref().filter(|v| !v.is_empty());
            (spec.setup)(&mut ctx, val)
        };

        let init = sig.init_data_mut();
        init.negated = false;
        init.init_flags &= !(SIG_INIT_FORCE_TOSERVER | SIG_INIT_FORCE_TOCLIENT);

        match result {
            Ok(()) => Ok(()),
            Err(SetupError::Parse(msg)) => Err(RuleError::Parse(msg)),
            Err(SetupError::Silent(msg)) => {
                if self.silent_seen.insert(spec.kw) {
                    Err(RuleError::Parse(msg))
                } else {
                    Err(RuleError::Silent)
                }
            }
            Err(SetupError::RequirementsUnmet) => Err(RuleError::RequirementsUnmet),
        }
    }

    /// Strip negation, quoting and a leading direction from the raw value.
    fn normalize_value(
        &self,
        sig: &mut Signature,
        spec: &crate::keyword::KeywordSpec,
        name: &str,
        option: &str,
        value: &str,
    ) -> Result<String> {
        let mut val = value.trim_start();
        if val.is_empty() {
            return Err(RuleError::Parse(format!(
                "invalid formatting or malformed option to {name} keyword: \"{option}\""
            )));
        }

        if spec.negation {
            if let Some(rest) = val.strip_prefix('!') {
                sig.init_data_mut().negated = true;
                val = rest.trim_start();
                if val.is_empty() {
                    return Err(RuleError::Parse(format!(
                        "invalid formatting or malformed option to {name} keyword: \"{option}\""
                    )));
                }
            }
        }

        match spec.quoting {
            QuoteMode::Mandatory if !val.starts_with('"') => {
                return Err(RuleError::Parse(format!(
                    "invalid formatting to {name} keyword: value must be double quoted \"{option}\""
                )));
            }
            QuoteMode::Mandatory | QuoteMode::Optional if val.starts_with('"') => {
                let inner = val
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| {
                        RuleError::Parse(format!(
                            "bad option value formatting (possible missing semicolon) \
                             for keyword {name}: \"{value}\""
                        ))
                    })?;
                val = inner;
            }
            _ if val.starts_with('"') => {
                return Err(RuleError::Parse(format!(
                    "quotes on {name} keyword that doesn't support them: \"{option}\""
                )));
            }
            _ => {}
        }

        if spec.direction {
            let only_dir = spec.value == ValueMode::Optional;
            let (dir, rest) = parse_leading_direction(val, only_dir)
                .map_err(|e| RuleError::Parse(format!("{name} failed to setup direction: {e}")))?;
            val = rest;
            if let Some(dir) = dir {
                apply_forced_direction(sig, dir)?;
            }
        }

        Ok(val.to_string())
    }
}

/// Find the end of the current option: the first `;` not preceded by a
/// backslash.
fn find_unescaped_semicolon(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut from = 0;
    loop {
        let pos = s[from..].find(';')? + from;
        if pos > 0 && bytes[pos - 1] == b'\\' {
            from = pos + 1;
            continue;
        }
        return Some(pos);
    }
}

/// Parse an optional leading `to_server` / `to_client` from a keyword
/// value. With `only_dir` the value may contain nothing else.
fn parse_leading_direction(val: &str, only_dir: bool) -> std::result::Result<(Option<Direction>, &str), String> {
    for (literal, dir) in
        [("to_client", Direction::ToClient), ("to_server", Direction::ToServer)]
    {
        if let Some(rest) = val.strip_prefix(literal) {
            let trimmed = rest.trim_start();
            if trimmed.is_empty() {
                return Ok((Some(dir), ""));
            }
            if let Some(after) = trimmed.strip_prefix(',') {
                if only_dir {
                    return Err("only accepts to_server or to_client".to_string());
                }
                return Ok((Some(dir), after.trim_start()));
            }
            if only_dir {
                return Err("only accepts to_server or to_client".to_string());
            }
            // something like to_server_something belongs to the keyword
            return Ok((None, val));
        }
    }
    if only_dir {
        return Err("only accepts to_server or to_client".to_string());
    }
    Ok((None, val))
}

/// Record a forced direction for the keyword being set up, and align the
/// rule direction with it unless the rule is transactional.
fn apply_forced_direction(sig: &mut Signature, dir: Direction) -> Result<()> {
    match dir {
        Direction::ToClient => {
            sig.init_data_mut().init_flags |= SIG_INIT_FORCE_TOCLIENT;
            if sig.flags & SIG_FLAG_TXBOTHDIR == 0 {
                if sig.flags & SIG_FLAG_TOSERVER != 0 {
                    return Err(RuleError::parse("contradictory directions"));
                }
                sig.flags |= SIG_FLAG_TOCLIENT;
            }
        }
        Direction::ToServer => {
            sig.init_data_mut().init_flags |= SIG_INIT_FORCE_TOSERVER;
            if sig.flags & SIG_FLAG_TXBOTHDIR == 0 {
                if sig.flags & SIG_FLAG_TOCLIENT != 0 {
                    return Err(RuleError::parse("contradictory directions"));
                }
                sig.flags |= SIG_FLAG_TOSERVER;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyword::{KeywordSpec, SetupResult};

    fn silent_failing_setup(_ctx: &mut SetupCtx<'_>, _value: Option<&str>) -> SetupResult {
        Err(SetupError::Silent("flaky keyword rejected the rule".to_string()))
    }

    #[test]
    fn silent_errors_surface_once_per_keyword() {
        let registry = KeywordRegistry::from_specs(vec![KeywordSpec::new(
            Kw::Dsize,
            "flaky",
            silent_failing_setup,
        )]);
        let tables = EngineTables::new();
        let config = EngineConfig::default();
        let mut seen = AHashSet::new();
        let mut parser = OptionParser {
            registry: &registry,
            tables: &tables,
            config: &config,
            silent_seen: &mut seen,
        };

        let mut sig = Signature::new("test");
        match parser.parse(&mut sig, "flaky:1;", Pass::Build) {
            Err(RuleError::Parse(_)) => {}
            other => panic!("first failure should be loud, got {other:?}"),
        }

        let mut sig = Signature::new("test");
        match parser.parse(&mut sig, "flaky:1;", Pass::Build) {
            Err(RuleError::Silent) => {}
            other => panic!("repeat failure should be silent, got {other:?}"),
        }
    }

    #[test]
    fn semicolon_scan_honors_escapes() {
        assert_eq!(find_unescaped_semicolon("msg:\"a\"; rest"), Some(8));
        assert_eq!(find_unescaped_semicolon(r#"content:"a\;b"; rest"#), Some(14));
        assert_eq!(find_unescaped_semicolon("no terminator"), None);
    }

    #[test]
    fn leading_direction_forms() {
        let (d, rest) = parse_leading_direction("to_server", true).expect("parses");
        assert_eq!(d, Some(Direction::ToServer));
        assert!(rest.is_empty());

        let (d, rest) = parse_leading_direction("to_client, foo", false).expect("parses");
        assert_eq!(d, Some(Direction::ToClient));
        assert_eq!(rest, "foo");

        // an unrelated word is left for the keyword parser
        let (d, rest) = parse_leading_direction("to_serverish", false).expect("parses");
        assert_eq!(d, None);
        assert_eq!(rest, "to_serverish");

        assert!(parse_leading_direction("to_serverish", true).is_err());
        assert!(parse_leading_direction("established", true).is_err());
    }
}
