use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use serde::Deserialize;

use crate::engine::FileTask;
use crate::options::TranslationOptions;

pub const CONFIG_FILE: &str = "locale-translator.toml";
pub const CONFIG_ENV: &str = "LOCALE_TRANSLATOR_CONFIG";

/// A locale as the config declares it: short code for file naming,
/// human-readable name for the prompt.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Locale {
    pub code: String,
    pub name: String,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub prompts: PromptsSection,
    #[serde(default)]
    pub translation: TranslationSection,
    #[serde(default)]
    pub pool: PoolSection,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ProjectSection {
    /// Directory holding the locale files, relative to the config file.
    #[serde(default)]
    pub i18n_dir: Option<String>,
    /// File name per locale; `{locale}` is replaced by the code.
    #[serde(default)]
    pub file_template: Option<String>,
    #[serde(default)]
    pub source_locale: Option<Locale>,
    #[serde(default)]
    pub target_locales: Vec<Locale>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PromptsSection {
    /// Extra system-prompt text for every target locale.
    #[serde(default)]
    pub default: Option<String>,
    /// Per-locale extra text, keyed by locale code, appended after the
    /// default.
    #[serde(default)]
    pub by_locale: HashMap<String, String>,
}

/// Optional overrides for `TranslationOptions`; unset fields keep the
/// engine defaults.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct TranslationSection {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub context_limit: Option<usize>,
    #[serde(default)]
    pub input_budget_ratio: Option<f64>,
    #[serde(default)]
    pub overhead_tokens: Option<usize>,
    #[serde(default)]
    pub max_chunk_items: Option<usize>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub retries: Option<usize>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub backoff_base: Option<f64>,
    #[serde(default)]
    pub backoff_jitter: Option<f64>,
    #[serde(default)]
    pub strict_key_match: Option<bool>,
    #[serde(default)]
    pub prefer_json_schema: Option<bool>,
    #[serde(default)]
    pub placeholder_guard: Option<bool>,
    #[serde(default)]
    pub retranslate_equal_to_source: Option<bool>,
}

impl TranslationSection {
    pub fn apply(&self, mut base: TranslationOptions) -> TranslationOptions {
        macro_rules! take {
            ($field:ident) => {
                if let Some(v) = self.$field.clone() {
                    base.$field = v;
                }
            };
        }
        take!(model);
        take!(api_key);
        take!(base_url);
        take!(context_limit);
        take!(input_budget_ratio);
        take!(overhead_tokens);
        take!(max_chunk_items);
        take!(timeout_secs);
        take!(retries);
        take!(temperature);
        take!(top_p);
        take!(backoff_base);
        take!(backoff_jitter);
        take!(strict_key_match);
        take!(prefer_json_schema);
        take!(placeholder_guard);
        take!(retranslate_equal_to_source);
        base
    }
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PoolSection {
    #[serde(default)]
    pub max_workers: Option<usize>,
    #[serde(default)]
    pub fail_fast: Option<bool>,
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

pub fn find_default_config(workdir: &Path) -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, CONFIG_FILE, 8) {
            return Some(p);
        }
    }
    find_file_upwards(workdir, CONFIG_FILE, 8)
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text).context("parse config toml")?;
    validate(&cfg)?;
    Ok(cfg)
}

fn validate(cfg: &AppConfig) -> anyhow::Result<()> {
    let Some(source) = cfg.project.source_locale.as_ref() else {
        return Err(anyhow!("config: project.source_locale is required"));
    };
    if source.code.trim().is_empty() || source.name.trim().is_empty() {
        return Err(anyhow!("config: source_locale needs a code and a name"));
    }
    if cfg.project.target_locales.is_empty() {
        return Err(anyhow!("config: project.target_locales must not be empty"));
    }
    for (i, t) in cfg.project.target_locales.iter().enumerate() {
        if t.code.trim().is_empty() || t.name.trim().is_empty() {
            return Err(anyhow!("config: target_locales[{i}] needs a code and a name"));
        }
        if t.code == source.code {
            return Err(anyhow!(
                "config: target_locales must not contain the source locale ({})",
                source.code
            ));
        }
    }
    if let Some(tpl) = cfg.project.file_template.as_deref() {
        if !tpl.contains("{locale}") {
            return Err(anyhow!(
                "config: project.file_template must contain {{locale}} (got {tpl:?})"
            ));
        }
    }
    Ok(())
}

/// Enumerate one file task per target locale. `only` restricts target
/// codes when non-empty (unknown codes are an error, not silently
/// skipped).
pub fn build_file_tasks(
    cfg: &AppConfig,
    config_path: &Path,
    only: &[String],
) -> anyhow::Result<Vec<FileTask>> {
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let i18n_dir = base_dir.join(cfg.project.i18n_dir.as_deref().unwrap_or("i18n"));
    let template = cfg
        .project
        .file_template
        .clone()
        .unwrap_or_else(|| "{locale}.json".to_string());
    let source = cfg
        .project
        .source_locale
        .clone()
        .ok_or_else(|| anyhow!("config: project.source_locale is required"))?;

    for code in only {
        if !cfg.project.target_locales.iter().any(|t| &t.code == code) {
            return Err(anyhow!("unknown target locale: {code}"));
        }
    }

    let source_path = i18n_dir.join(template.replace("{locale}", &source.code));
    let mut tasks = Vec::new();
    for target in &cfg.project.target_locales {
        if !only.is_empty() && !only.contains(&target.code) {
            continue;
        }
        tasks.push(FileTask {
            source_path: source_path.clone(),
            target_path: i18n_dir.join(template.replace("{locale}", &target.code)),
            source_locale: source.clone(),
            target_locale: target.clone(),
            extra_prompt: extra_prompt_for(&cfg.prompts, &target.code),
        });
    }
    Ok(tasks)
}

fn extra_prompt_for(prompts: &PromptsSection, code: &str) -> Option<String> {
    let default = prompts.default.as_deref().map(str::trim).unwrap_or("");
    let by_locale = prompts
        .by_locale
        .get(code)
        .map(|s| s.trim())
        .unwrap_or("");
    let parts: Vec<&str> = [default, by_locale]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(CONFIG_FILE);
    if cfg_path.exists() && !force {
        return Ok(cfg_path);
    }

    let cfg_text = r#"[project]
i18n_dir = "i18n"
file_template = "{locale}.json"
source_locale = { code = "en", name = "English" }
target_locales = [
  { code = "ja", name = "Japanese" },
  { code = "ko", name = "Korean" },
  { code = "de", name = "German" },
  { code = "fr", name = "French" },
  { code = "zh_Hant", name = "Traditional Chinese" },
]

[prompts]
default = ""
# Per-locale extra instructions, appended after the default.
# [prompts.by_locale]
# ja = "Use polite form."

[translation]
model = "gpt-4o-mini"
# api_key = ""            # prefer --api-key or OPENAI_API_KEY
# base_url = "https://api.openai.com/v1"
context_limit = 16000
input_budget_ratio = 0.70
overhead_tokens = 64
max_chunk_items = 60
timeout_secs = 30
retries = 2
strict_key_match = true
prefer_json_schema = true
placeholder_guard = true
# Treat target values identical to the source as untranslated.
retranslate_equal_to_source = true

[pool]
max_workers = 8
fail_fast = false
"#;

    std::fs::write(&cfg_path, cfg_text)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}
