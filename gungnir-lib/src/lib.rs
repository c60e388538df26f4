#![forbid(unsafe_code)]

pub mod address;
pub mod buffers;
pub mod config;
pub mod engine;
pub mod error;
pub mod keyword;
pub mod keywords;
pub mod options;
pub mod parse;
pub mod ports;
pub mod prefilter;
pub mod proto;
pub mod sigmatch;
pub mod signature;
pub mod validate;

pub use config::{load_from_path, EngineConfig, PrefilterSetting};
pub use engine::{DetectEngine, EngineTables, SigChain};
pub use error::{Result, RuleError};
pub use keyword::{Kw, KeywordRegistry};
pub use proto::AppProto;
pub use signature::{DetectTable, SigType, Signature};
