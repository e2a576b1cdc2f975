//! autodocstrings - 为 Python 源码自动生成 docstring
//!
//! 扫描 Python 文件，提取函数、方法和类声明，调用 LLM 生成 docstring 并原位写回。

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod llm;
mod services;

use config::{parse_exclude_list, AppConfig};
use error::AppError;
use llm::LlmClient;
use services::docstrings::{
    DocstringProcessor, ExtractOptions, LlmDocstringGenerator, ProcessOptions, ScanOptions, SourceLocator,
};

/// Generate docstrings for Python functions, methods and classes with an LLM.
#[derive(Parser, Debug)]
#[command(name = "autodocstrings", author, version, about, long_about = None)]
struct Cli {
    /// Python file or directory to process.
    #[arg(required_unless_present_any = ["show_config", "save_config"])]
    input: Option<PathBuf>,

    /// Replace docstrings that already exist.
    #[arg(long)]
    replace_existing_docstrings: bool,

    /// Do not document `__init__` methods.
    #[arg(long)]
    skip_constructor_docstrings: bool,

    /// Only document functions and methods.
    #[arg(long)]
    skip_classes: bool,

    /// Ignore names starting with an underscore.
    #[arg(long)]
    skip_private: bool,

    /// Comma-separated directory names to exclude.
    #[arg(long, value_name = "LIST")]
    exclude_directories: Option<String>,

    /// Comma-separated file names to exclude.
    #[arg(long, value_name = "LIST")]
    exclude_files: Option<String>,

    /// Glob pattern to exclude (can be specified multiple times).
    #[arg(long, value_name = "GLOB")]
    exclude: Vec<String>,

    /// Also walk .git, virtualenvs, caches and build directories.
    #[arg(long)]
    no_default_ignores: bool,

    /// Model name.
    #[arg(long)]
    model: Option<String>,

    /// API base URL.
    #[arg(long)]
    base_url: Option<String>,

    /// Maximum tokens per response.
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Sampling temperature.
    #[arg(long)]
    temperature: Option<f64>,

    /// Number of concurrent requests.
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,

    /// Retries after a rate limit response.
    #[arg(long, value_name = "N")]
    max_retries: Option<u32>,

    /// Seconds to wait after a rate limit response without retry-after.
    #[arg(long, value_name = "SECS")]
    retry_wait: Option<u64>,

    /// Command run on each written file, e.g. "black -q".
    ///
    /// The command is split on whitespace and the file path is appended;
    /// shell quoting is not interpreted, so arguments cannot contain spaces.
    #[arg(long, value_name = "CMD")]
    formatter: Option<String>,

    /// Print a diff instead of writing files.
    #[arg(long)]
    dry_run: bool,

    /// JSON configuration file.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print the effective configuration and exit.
    #[arg(long)]
    show_config: bool,

    /// Save the effective configuration and exit.
    #[arg(long, value_name = "PATH")]
    save_config: Option<PathBuf>,

    /// Enable debug output.
    #[arg(short, long)]
    verbose: bool,

    /// Only print warnings and errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    /// 命令行参数覆盖配置文件和环境变量
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        if let Some(max_tokens) = self.max_tokens {
            config.max_tokens = max_tokens;
        }
        if self.temperature.is_some() {
            config.temperature = self.temperature;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        if let Some(retry_wait) = self.retry_wait {
            config.retry_wait_secs = retry_wait;
        }
        if self.formatter.is_some() {
            config.formatter = self.formatter.clone();
        }
    }

    fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            exclude_dirs: self
                .exclude_directories
                .as_deref()
                .map(parse_exclude_list)
                .unwrap_or_default(),
            exclude_files: self.exclude_files.as_deref().map(parse_exclude_list).unwrap_or_default(),
            exclude_patterns: self.exclude.clone(),
            use_default_ignores: !self.no_default_ignores,
        }
    }

    fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            replace_existing: self.replace_existing_docstrings,
            skip_constructors: self.skip_constructor_docstrings,
            skip_classes: self.skip_classes,
            skip_private: self.skip_private,
        }
    }

    fn log_filter(&self) -> &'static str {
        if self.verbose {
            "autodocstrings=debug"
        } else if self.quiet {
            "autodocstrings=warn"
        } else {
            "autodocstrings=info"
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // 初始化日志
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);

    if let Some(path) = &cli.save_config {
        config.save(path)?;
        println!("Configuration saved to {}", path.display());
        return Ok(ExitCode::SUCCESS);
    }

    if cli.show_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        println!("api_key: {}", config.masked_api_key());
        return Ok(ExitCode::SUCCESS);
    }

    if config.api_key.trim().is_empty() {
        eprintln!("Exiting, as ANTHROPIC_API_KEY is required for the program to run.");
        return Ok(ExitCode::FAILURE);
    }

    let input = cli.input.clone().context("no input path given")?;
    let files = SourceLocator::new(cli.scan_options())
        .locate(&input)
        .map_err(AppError::from)?;
    if files.is_empty() {
        info!("No Python files found in {}", input.display());
        return Ok(ExitCode::SUCCESS);
    }
    info!("Found {} Python files in {}", files.len(), input.display());

    let client = LlmClient::new(
        config.api_key.clone(),
        config.base_url.clone(),
        config.effective_concurrency(),
    )
    .map_err(AppError::from)?;
    let client = Arc::new(client);
    let generator = Arc::new(LlmDocstringGenerator::new(client, &config));
    let processor = DocstringProcessor::new(
        generator,
        ProcessOptions {
            extract: cli.extract_options(),
            max_code_chars: config.max_code_chars,
            concurrency: config.effective_concurrency(),
            dry_run: cli.dry_run,
            formatter: config.formatter.clone(),
        },
    );

    let stats = processor.run(files).await;
    info!(
        "Done: {} files updated, {} unchanged, {} failed; {} docstrings written, {} skipped, {} failed",
        stats.files_updated,
        stats.files_unchanged,
        stats.files_failed,
        stats.documented,
        stats.skipped,
        stats.failed
    );

    Ok(if stats.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_input_required_unless_config_action() {
        assert!(Cli::try_parse_from(["autodocstrings"]).is_err());
        assert!(Cli::try_parse_from(["autodocstrings", "--show-config"]).is_ok());
    }

    #[test]
    fn test_overrides_and_options() {
        let cli = Cli::try_parse_from([
            "autodocstrings",
            "src",
            "--model",
            "claude-3-5-sonnet-latest",
            "--concurrency",
            "8",
            "--exclude-directories",
            "tests, docs",
            "--exclude",
            "*_pb2.py",
            "--skip-classes",
            "--no-default-ignores",
        ])
        .unwrap();

        let mut config = AppConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.model, "claude-3-5-sonnet-latest");
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.max_retries, 5);

        let scan = cli.scan_options();
        assert_eq!(scan.exclude_dirs, vec!["tests", "docs"]);
        assert_eq!(scan.exclude_patterns, vec!["*_pb2.py"]);
        assert!(!scan.use_default_ignores);
        assert!(cli.extract_options().skip_classes);
    }

    #[test]
    fn test_verbosity_filter() {
        let cli = Cli::try_parse_from(["autodocstrings", "-v", "x.py"]).unwrap();
        assert_eq!(cli.log_filter(), "autodocstrings=debug");
        assert!(Cli::try_parse_from(["autodocstrings", "-v", "-q", "x.py"]).is_err());
    }
}
