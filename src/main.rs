//! 命令行入口
//!
//! 读取纯文本文档（文件或标准输入），按空行切成段落逐段翻译，
//! 译文写到标准输出或指定文件，统计信息输出到标准错误。

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use page_translator::env::{core::LogLevel, EnvVar};
use page_translator::translation::{
    document_units, render_document, ConfigManager, GeminiClient, RequestScheduler,
    TranslationConfig, TranslationError, TranslationResult,
};

#[derive(Parser, Debug)]
#[command(name = "page-translator", version, about, long_about = None)]
struct Cli {
    /// Input text file; reads stdin when omitted
    input: Option<PathBuf>,

    /// Write the translated document to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Configuration file (TOML or JSON); searched in default locations when omitted
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Target language, e.g. zh-CN, ja, en
    #[arg(short, long)]
    target_lang: Option<String>,

    /// Model used for translation
    #[arg(short, long)]
    model: Option<String>,

    /// API key passed to the translation provider
    #[arg(long, env = "PAGE_TRANSLATOR_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Maximum number of batches in flight
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Disable the in-memory translation cache
    #[arg(long)]
    no_cache: bool,

    /// Write an example configuration file and exit
    #[arg(long, value_name = "PATH")]
    generate_config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    if let Some(path) = &cli.generate_config {
        match ConfigManager::generate_example_config(path) {
            Ok(()) => {
                eprintln!("示例配置已写入 {}", path.display());
                return;
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        }
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_tracing() {
    let level = LogLevel::get_or_default("warn".to_string());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!("page_translator={}", level)))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

async fn run(cli: Cli) -> TranslationResult<()> {
    let config = load_config(&cli)?;
    let document = read_input(cli.input.as_ref())?;

    let units = document_units(&document);
    if units.is_empty() {
        eprintln!("输入中没有可翻译的文本");
        return Ok(());
    }

    let client = Arc::new(GeminiClient::new(&config.settings.endpoint));
    let scheduler = RequestScheduler::from_config(&config, client)?;
    let report = scheduler.submit(units).await?;

    write_output(cli.output.as_ref(), &render_document(&report))?;

    let stats = scheduler.stats();
    eprintln!(
        "已翻译 {}/{} 段，{} 段失败；{} 个批次，{} 次请求，{} 次重试，耗时 {:?}",
        report.translated_count(),
        report.units.len(),
        report.failures.len(),
        stats.batches_planned,
        stats.attempts,
        stats.retries,
        stats.processing_time
    );
    for failure in &report.failures {
        eprintln!("  {}: {}", failure.id, failure.error);
    }

    Ok(())
}

fn load_config(cli: &Cli) -> TranslationResult<TranslationConfig> {
    let mut config = match &cli.config {
        Some(path) => ConfigManager::from_path(path)?.into_config(),
        None => ConfigManager::new()?.into_config(),
    };

    // 命令行参数优先于配置文件和环境变量
    if let Some(lang) = &cli.target_lang {
        config.settings.target_language = lang.clone();
    }
    if let Some(model) = &cli.model {
        config.settings.model = model.clone();
    }
    if let Some(key) = &cli.api_key {
        config.settings.api_key = key.clone();
    }
    if let Some(max_concurrent) = cli.max_concurrent {
        config.scheduler.max_concurrent = max_concurrent;
    }
    if cli.no_cache {
        config.cache_enabled = false;
    }

    config.validate()?;
    Ok(config)
}

fn read_input(path: Option<&PathBuf>) -> TranslationResult<String> {
    match path {
        Some(path) => std::fs::read_to_string(path).map_err(|e| {
            TranslationError::InvalidInput(format!("读取 {} 失败: {}", path.display(), e))
        }),
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}

fn write_output(path: Option<&PathBuf>, content: &str) -> TranslationResult<()> {
    match path {
        Some(path) => std::fs::write(path, format!("{}\n", content))?,
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{}", content)?;
        }
    }
    Ok(())
}
