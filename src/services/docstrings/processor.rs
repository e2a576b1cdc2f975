//! 处理调度器
//!
//! 读取文件 → 提取声明 → 并发生成 docstring → 写回。
//! 单个声明生成失败只跳过该声明；文件级错误只影响该文件。

use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use similar::TextDiff;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use super::extractor;
use super::generator::DocstringSource;
use super::inserter;
use super::types::{Declaration, ExtractOptions, FileOutcome, RunStats};
use crate::error::{AppError, AppResult};

/// 处理选项
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// 声明过滤规则
    pub extract: ExtractOptions,
    /// 发送给模型的代码最大字符数
    pub max_code_chars: usize,
    /// 并发数量（文件和请求共用）
    pub concurrency: usize,
    /// 只输出 diff，不写文件
    pub dry_run: bool,
    /// 写回后执行的格式化命令
    pub formatter: Option<String>,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            extract: ExtractOptions::default(),
            max_code_chars: 12_000,
            concurrency: 4,
            dry_run: false,
            formatter: None,
        }
    }
}

/// docstring 处理器
pub struct DocstringProcessor {
    source: Arc<dyn DocstringSource>,
    options: ProcessOptions,
    /// 限制同时进行的生成请求
    semaphore: Arc<Semaphore>,
    stats: Mutex<RunStats>,
}

impl DocstringProcessor {
    pub fn new(source: Arc<dyn DocstringSource>, options: ProcessOptions) -> Self {
        let concurrency = options.concurrency.max(1);
        info!("Docstring generation concurrency: {}", concurrency);

        Self {
            source,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            options: ProcessOptions {
                concurrency,
                ..options
            },
            stats: Mutex::new(RunStats::default()),
        }
    }

    /// 处理全部文件并返回统计
    pub async fn run(&self, files: Vec<PathBuf>) -> RunStats {
        self.stats.lock().files_scanned = files.len();

        stream::iter(files)
            .for_each_concurrent(self.options.concurrency, |path| async move {
                match self.process_file(&path).await {
                    Ok(FileOutcome::Updated { documented }) => {
                        info!("Updated {} ({} docstrings)", path.display(), documented);
                        let mut stats = self.stats.lock();
                        stats.files_updated += 1;
                        stats.documented += documented;
                    }
                    Ok(FileOutcome::Unchanged) => {
                        debug!("No changes for {}", path.display());
                        self.stats.lock().files_unchanged += 1;
                    }
                    Err(e) => {
                        error!("Failed to process {}: {}", path.display(), e);
                        self.stats.lock().files_failed += 1;
                    }
                }
            })
            .await;

        self.stats.lock().clone()
    }

    /// 处理单个文件
    pub async fn process_file(&self, path: &Path) -> AppResult<FileOutcome> {
        let display = path.display().to_string();
        let source = fs::read_to_string(path)
            .await
            .map_err(|e| AppError::Io(path.to_path_buf(), e))?;

        let declarations = extractor::extract(&source, self.options.max_code_chars)?;
        let candidates = self.select_candidates(declarations, &display);
        if candidates.is_empty() {
            return Ok(FileOutcome::Unchanged);
        }

        let docstrings = self.generate_all(candidates, &display).await;
        if docstrings.is_empty() {
            return Ok(FileOutcome::Unchanged);
        }

        let updated = inserter::splice(&source, &docstrings)?;
        if updated == source {
            return Ok(FileOutcome::Unchanged);
        }

        if self.options.dry_run {
            print_diff(&display, &source, &updated);
        } else {
            inserter::write_file(path, &updated, self.options.formatter.as_deref()).await?;
        }

        Ok(FileOutcome::Updated {
            documented: docstrings.len(),
        })
    }

    /// 按跳过规则过滤声明
    fn select_candidates(&self, declarations: Vec<Declaration>, file: &str) -> Vec<Declaration> {
        let mut skipped = 0;
        let candidates: Vec<Declaration> = declarations
            .into_iter()
            .filter(|decl| match self.options.extract.skip_reason(decl) {
                Some(reason) => {
                    debug!("Skipping {} in {} ({})", decl.qualified_name, file, reason);
                    skipped += 1;
                    false
                }
                None => true,
            })
            .collect();

        self.stats.lock().skipped += skipped;
        candidates
    }

    /// 并发生成 docstring，失败的声明记录后丢弃
    async fn generate_all(&self, candidates: Vec<Declaration>, file: &str) -> Vec<(Declaration, String)> {
        let results: Vec<_> = stream::iter(candidates)
            .map(|decl| async move {
                let _permit = self.semaphore.acquire().await.ok();
                info!("Updating docstring for {} in {}", decl.qualified_name, file);
                let result = self.source.generate(&decl, file).await;
                (decl, result)
            })
            .buffer_unordered(self.options.concurrency)
            .collect()
            .await;

        let mut docstrings = Vec::with_capacity(results.len());
        for (decl, result) in results {
            match result {
                Ok(text) => docstrings.push((decl, text)),
                Err(e) => {
                    warn!(
                        "Skipping {} in {} (line {}): {}",
                        decl.qualified_name, file, decl.line, e
                    );
                    self.stats.lock().failed += 1;
                }
            }
        }
        docstrings
    }
}

/// dry-run 模式下输出统一 diff
fn print_diff(path: &str, old: &str, new: &str) {
    let diff = TextDiff::from_lines(old, new);
    let rendered = diff
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{}", path), &format!("b/{}", path))
        .to_string();
    println!("{}", rendered);
}
