//! The `requires` keyword.
//!
//! Comma-separated requirement terms, each one of:
//!   `feature <name>`            a capability the engine build exposes
//!   `version <op> <x.y.z> ...`  engine version constraints
//!   `keyword <name>`            a rule keyword must be registered
//!
//! An unsatisfied or unrecognized term skips the rule without an error.
//! Terms are evaluated during the scan pass, before any stateful keyword
//! setup runs.

use crate::keyword::{SetupCtx, SetupError, SetupResult};

/// Engine version the `version` terms compare against.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Version(u16, u16, u16);

fn parse_version(s: &str) -> Result<Version, SetupError> {
    let mut parts = s.split('.');
    let mut next = |required: bool| -> Result<u16, SetupError> {
        match parts.next() {
            Some(p) => p
                .parse::<u16>()
                .map_err(|_| SetupError::Parse(format!("invalid version \"{s}\""))),
            None if required => Err(SetupError::Parse(format!("invalid version \"{s}\""))),
            None => Ok(0),
        }
    };
    let major = next(true)?;
    let minor = next(false)?;
    let patch = next(false)?;
    if parts.next().is_some() {
        return Err(SetupError::Parse(format!("invalid version \"{s}\"")));
    }
    Ok(Version(major, minor, patch))
}

fn version_satisfied(op: &str, wanted: Version, actual: Version) -> Result<bool, SetupError> {
    Ok(match op {
        ">" => actual > wanted,
        ">=" => actual >= wanted,
        "<" => actual < wanted,
        "<=" => actual <= wanted,
        "=" | "==" => actual == wanted,
        _ => {
            return Err(SetupError::Parse(format!(
                "invalid version comparison operator \"{op}\""
            )))
        }
    })
}

pub fn setup_requires(ctx: &mut SetupCtx<'_>, value: Option<&str>) -> SetupResult {
    let value = value.expect("value presence is enforced by the option parser");
    let actual = parse_version(ENGINE_VERSION)
        .expect("the crate version is a valid version string");

    for term in value.split(',') {
        let term = term.trim();
        if term.is_empty() {
            continue;
        }
        let mut words = term.split_whitespace();
        match words.next() {
            Some("feature") => {
                let name = words
                    .next()
                    .ok_or_else(|| SetupError::parse("feature term is missing a name"))?;
                if !ctx.config.features.iter().any(|f| f == name) {
                    return Err(SetupError::RequirementsUnmet);
                }
            }
            Some("keyword") => {
                let name = words
                    .next()
                    .ok_or_else(|| SetupError::parse("keyword term is missing a name"))?;
                if ctx.registry.get(name).is_none() {
                    return Err(SetupError::RequirementsUnmet);
                }
            }
            Some("version") => {
                let mut saw_constraint = false;
                loop {
                    let Some(op) = words.next() else { break };
                    let ver = words.next().ok_or_else(|| {
                        SetupError::parse("version term is missing a version number")
                    })?;
                    saw_constraint = true;
                    if !version_satisfied(op, parse_version(ver)?, actual)? {
                        return Err(SetupError::RequirementsUnmet);
                    }
                }
                if !saw_constraint {
                    return Err(SetupError::parse("version term is missing a constraint"));
                }
            }
            // an unknown requirement type means the rule is for a newer
            // engine; skip, don't fail
            Some(_) => return Err(SetupError::RequirementsUnmet),
            None => unreachable!("empty terms are skipped above"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_ordering() {
        assert!(parse_version("1.2.3").expect("parses") < parse_version("1.10").expect("parses"));
        assert_eq!(parse_version("1").expect("parses"), Version(1, 0, 0));
        assert!(parse_version("1.2.3.4").is_err());
        assert!(parse_version("a.b").is_err());
    }

    #[test]
    fn operators() {
        let v1 = Version(1, 0, 0);
        let v2 = Version(2, 0, 0);
        assert!(version_satisfied(">=", v1, v2).expect("valid op"));
        assert!(!version_satisfied("<", v1, v2).expect("valid op"));
        assert!(version_satisfied("==", v2, v2).expect("valid op"));
        assert!(version_satisfied("=", v2, v2).expect("valid op"));
        assert!(version_satisfied("<=", v2, v2).expect("valid op"));
        assert!(version_satisfied(">", v1, v2).expect("valid op"));
        assert!(version_satisfied("~", v1, v2).is_err());
    }
}
