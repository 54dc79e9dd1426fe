use anyhow::{bail, Result};
use std::env;
use std::fs;

use crate::config::Config;
use crate::store;

const KNOWN_PROVIDERS: [&str; 4] = ["anthropic", "openai", "openai-compatible", "gemini"];

struct CheckResult {
    passed: Vec<String>,
    warnings: Vec<String>,
    errors: Vec<String>,
}

impl CheckResult {
    fn new() -> Self {
        Self {
            passed: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn pass(&mut self, msg: impl Into<String>) {
        self.passed.push(msg.into());
    }

    fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }
}

pub fn run(config_path: Option<String>) -> Result<()> {
    let mut results = CheckResult::new();

    let config = match Config::load_with_path(config_path.clone()) {
        Ok(config) => {
            let source = config_path.as_deref().unwrap_or("default search path");
            results.pass(format!("Config loaded from {}", source));
            config
        }
        Err(e) => {
            results.error(format!("Failed to load config: {:#}", e));
            print_results(&results);
            bail!("Failed to load config");
        }
    };

    check_config(&config, &mut results);
    print_results(&results);

    if !results.errors.is_empty() {
        bail!("{} config error(s) found", results.errors.len());
    }

    Ok(())
}

fn check_config(config: &Config, results: &mut CheckResult) {
    if KNOWN_PROVIDERS.contains(&config.llm.provider.as_str()) {
        results.pass(format!(
            "LLM provider: {} (model: {})",
            config.llm.provider, config.llm.model
        ));
    } else {
        results.error(format!(
            "Unknown LLM provider '{}'. Valid options: {}",
            config.llm.provider,
            KNOWN_PROVIDERS.join(", ")
        ));
    }

    check_api_key(config, results);

    if config.llm.provider == "openai-compatible" && config.llm.base_url.is_none() {
        results.warn(
            "openai-compatible provider without base_url, will use http://localhost:11434/v1",
        );
    }

    let memory = &config.memory;
    results.pass(format!(
        "Memory limits: entities={}, chapters={}, items per chapter={}, cleanup at {:.0}%",
        memory.entity_capacity,
        memory.chapter_capacity,
        memory.max_items_per_chapter,
        memory.cleanup_threshold * 100.0
    ));
    check_data_dir(config, results);

    if config.extraction.max_tokens > config.llm.get_max_tokens() {
        results.warn(format!(
            "extraction.max_tokens={} exceeds the provider limit {} and will be capped",
            config.extraction.max_tokens,
            config.llm.get_max_tokens()
        ));
    }
}

fn check_api_key(config: &Config, results: &mut CheckResult) {
    let is_oai_compat = config.llm.provider == "openai-compatible";
    match &config.llm.api_key_env {
        Some(env_var) if env_var.to_lowercase() == "none" => {
            results.pass("No API key needed");
        }
        Some(env_var) => match env::var(env_var) {
            Ok(v) if !v.trim().is_empty() => {
                results.pass(format!("{} is set", env_var));
            }
            Ok(_) | Err(_) if is_oai_compat => {
                results.warn(format!(
                    "{} is not set (OK for local models, needed for gateways)",
                    env_var
                ));
            }
            Ok(_) => results.error(format!("{} is set but empty", env_var)),
            Err(_) => results.error(format!("{} is not set", env_var)),
        },
        None => results.warn("No api_key_env configured; requests will be unauthenticated"),
    }
}

fn check_data_dir(config: &Config, results: &mut CheckResult) {
    let dir = &config.memory.data_dir;
    let marker = dir.join(".storykeeper-write-check");
    match store::atomic_write(&marker, b"ok") {
        Ok(()) => {
            let _ = fs::remove_file(&marker);
            results.pass(format!("Data directory {} is writable", dir.display()));
        }
        Err(e) => results.error(format!(
            "Data directory {} is not writable: {}",
            dir.display(),
            e
        )),
    }
}

fn print_results(results: &CheckResult) {
    println!();
    for msg in &results.passed {
        println!("  \u{2713} {}", msg);
    }
    for msg in &results.warnings {
        println!("  ! {}", msg);
    }
    for msg in &results.errors {
        println!("  \u{2717} {}", msg);
    }
    println!();
    println!(
        "{} passed, {} warnings, {} errors",
        results.passed.len(),
        results.warnings.len(),
        results.errors.len()
    );
}
