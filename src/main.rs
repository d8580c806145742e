use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::{CommandFactory, Parser};

use locale_translator::config::{
    build_file_tasks, find_default_config, init_default_config, load_config, CONFIG_ENV,
    CONFIG_FILE,
};
use locale_translator::diff::DiffMode;
use locale_translator::events::ConsoleSink;
use locale_translator::options::TranslationOptions;
use locale_translator::pool::{translate_files, PoolOptions, PoolResult};
use locale_translator::provider::OpenAiProvider;

#[derive(Parser, Debug)]
#[command(name = "locale-translator")]
#[command(about = "Incremental batch translator for flat locale files", long_about = None)]
struct Args {
    /// Generate a default config file, then exit
    #[arg(long)]
    init_config: bool,

    /// Directory to write the config file (default: current directory)
    #[arg(long, value_name = "DIR")]
    init_config_dir: Option<PathBuf>,

    /// Overwrite an existing config file when used with --init-config
    #[arg(long)]
    force: bool,

    /// Config file path (default: search for locale-translator.toml upwards)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Retranslate every key instead of only the incremental diff
    #[arg(long)]
    full: bool,

    /// API key (default: config, then OPENAI_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Model name override
    #[arg(long)]
    model: Option<String>,

    /// Max concurrent file jobs
    #[arg(long)]
    workers: Option<usize>,

    /// Stop scheduling new files after the first failure
    #[arg(long)]
    fail_fast: bool,

    /// Restrict translation to these target locale codes (repeatable)
    #[arg(long = "locale", value_name = "CODE")]
    locales: Vec<String>,

    /// Suppress progress output (summary is still printed)
    #[arg(long)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.init_config {
        let dir = args
            .init_config_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(());
    }

    let workdir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let config_path = args
        .config
        .clone()
        .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
        .or_else(|| find_default_config(&workdir));
    let Some(config_path) = config_path else {
        let mut cmd = Args::command();
        cmd.print_help().context("print help")?;
        eprintln!("\n\nNo {CONFIG_FILE} found. Run with --init-config to create one.");
        return Ok(());
    };

    let cfg = load_config(&config_path)?;
    let mut options = cfg.translation.apply(TranslationOptions::default());
    if let Some(model) = args.model {
        options.model = model;
    }
    // Credential strategy, resolved exactly once: flag beats config
    // beats environment. The engine itself never reads the environment.
    if let Some(key) = args.api_key {
        options.api_key = key;
    } else if options.api_key.is_empty() {
        options.api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
    }
    if options.api_key.trim().is_empty() {
        return Err(anyhow!(
            "no API key: pass --api-key, set translation.api_key, or export OPENAI_API_KEY"
        ));
    }

    let tasks = build_file_tasks(&cfg, &config_path, &args.locales)?;
    if tasks.is_empty() {
        eprintln!("No target locales to translate.");
        return Ok(());
    }

    let provider = OpenAiProvider::new(&options).context("build provider")?;
    let sink = ConsoleSink::new(!args.quiet);
    let pool_options = PoolOptions {
        max_workers: args.workers.or(cfg.pool.max_workers),
        fail_fast: args.fail_fast || cfg.pool.fail_fast.unwrap_or(false),
        mode: if args.full {
            DiffMode::Full
        } else {
            DiffMode::Incremental
        },
    };

    let result = translate_files(tasks, &provider, &options, &pool_options, &sink)?;
    print_summary(&result);

    if result.fail_count() > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn print_summary(result: &PoolResult) {
    eprintln!(
        "done: ok={} fail={} keys={} elapsed={:.1}s ({:.2} files/s)",
        result.ok_count(),
        result.fail_count(),
        result.total_translated(),
        result.elapsed.as_secs_f64(),
        result.files_per_sec()
    );
    for r in &result.results {
        let status = if r.ok { "OK  " } else { "FAIL" };
        let mut line = format!(
            "{status} {} ({}) {}/{} keys in {:.1}s",
            r.task.label(),
            r.task.target_locale.code,
            r.translated,
            r.todo,
            r.elapsed.as_secs_f64()
        );
        if let Some(err) = r.error.as_deref() {
            line.push_str(&format!(" error={err}"));
        }
        eprintln!("{line}");
    }
}
