#![forbid(unsafe_code)]

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use gungnir_lib::{load_from_path, DetectEngine, EngineConfig, RuleError};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Gungnir detection rule linter")]
struct Cli {
    /// Rule files to load
    #[arg(value_name = "FILE", required = true)]
    rules: Vec<PathBuf>,

    /// Path to engine configuration TOML file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print a JSON summary instead of the plain-text one
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Default)]
struct Summary {
    loaded: usize,
    failed: usize,
    skipped: usize,
    duplicates: usize,
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let config = match cli.config {
        Some(path) => match load_from_path(&path) {
            Ok(cfg) => cfg,
            Err(err) => {
                error!(%err, "failed to load configuration");
                std::process::exit(1);
            }
        },
        None => EngineConfig::default(),
    };

    let mut engine = DetectEngine::new(config);
    let mut summary = Summary::default();

    for path in &cli.rules {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                error!(path = %path.display(), %err, "failed to read rule file");
                std::process::exit(1);
            }
        };
        load_rules(&mut engine, &text, &path.display().to_string(), &mut summary);
    }

    if cli.json {
        let out = serde_json::json!({
            "loaded": summary.loaded,
            "failed": summary.failed,
            "skipped": summary.skipped,
            "duplicates": summary.duplicates,
        });
        println!("{out}");
    } else {
        info!(
            loaded = summary.loaded,
            failed = summary.failed,
            skipped = summary.skipped,
            duplicates = summary.duplicates,
            "rule loading finished"
        );
    }

    if summary.failed > 0 {
        std::process::exit(1);
    }
}

/// Feed every rule of a file into the engine. A trailing backslash
/// continues a rule on the next line; blank lines and `#` comments are
/// skipped.
fn load_rules(engine: &mut DetectEngine, text: &str, path: &str, summary: &mut Summary) {
    let mut pending = String::new();
    for (lineno, line) in text.lines().enumerate() {
        let lineno = lineno + 1;
        if let Some(stripped) = line.strip_suffix('\\') {
            pending.push_str(stripped);
            continue;
        }
        pending.push_str(line);
        let rule = std::mem::take(&mut pending);
        let trimmed = rule.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        match engine.append_rule(trimmed) {
            Ok(_) => summary.loaded += 1,
            Err(RuleError::RequirementsUnmet) => summary.skipped += 1,
            Err(RuleError::Duplicate { .. }) => summary.duplicates += 1,
            Err(RuleError::Silent) => {
                summary.failed += 1;
            }
            Err(err) => {
                summary.failed += 1;
                warn!(%path, lineno, %err, rule = %trimmed, "rule failed to load");
            }
        }
    }
    if !pending.trim().is_empty() {
        summary.failed += 1;
        warn!(%path, "rule file ends with a dangling line continuation");
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}
