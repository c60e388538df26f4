use thiserror::Error;

/// Errors produced while parsing and installing detection rules
#[derive(Error, Debug)]
pub enum RuleError {
    #[error("parse error: {0}")]
    Parse(String),

    /// A keyword rejected the rule after its diagnostic was already emitted
    /// for an earlier rule in this engine build.
    #[error("rule rejected")]
    Silent,

    /// The rule declared requirements this engine build does not satisfy.
    #[error("rule requirements not met")]
    RequirementsUnmet,

    /// A rule with the same gid/sid and an equal or lower revision already
    /// exists in the engine.
    #[error("duplicate signature gid:{gid} sid:{sid}")]
    Duplicate { gid: u32, sid: u32 },
}

pub type Result<T> = std::result::Result<T, RuleError>;

impl RuleError {
    pub fn parse(msg: impl Into<String>) -> Self {
        RuleError::Parse(msg.into())
    }
}
