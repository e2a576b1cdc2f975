//! 源文件定位
//!
//! 输入可以是单个 `.py` 文件或目录；目录会被递归遍历，按排除列表剪枝。

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// 默认跳过的目录
pub const IGNORED_DIRS: &[&str] = &[
    ".git", "__pycache__", ".venv", "venv", ".tox", "node_modules",
    "build", "dist", ".mypy_cache", ".pytest_cache",
];

/// 扫描选项
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// 按目录名排除
    pub exclude_dirs: Vec<String>,
    /// 按文件名排除
    pub exclude_files: Vec<String>,
    /// glob 排除模式（匹配名称或完整路径）
    pub exclude_patterns: Vec<String>,
    /// 是否启用 `IGNORED_DIRS`
    pub use_default_ignores: bool,
}

/// 源文件定位器
pub struct SourceLocator {
    options: ScanOptions,
    /// 编译后的排除模式
    patterns: Vec<glob::Pattern>,
}

impl SourceLocator {
    /// 创建新的定位器，无效的 glob 模式会被忽略并记录警告
    pub fn new(options: ScanOptions) -> Self {
        let patterns = options
            .exclude_patterns
            .iter()
            .filter_map(|p| match glob::Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!("Invalid exclude pattern '{}': {}", p, e);
                    None
                }
            })
            .collect();

        Self { options, patterns }
    }

    /// 枚举需要处理的 Python 文件（已排序）
    pub fn locate(&self, input: &Path) -> Result<Vec<PathBuf>, ScanError> {
        if !input.exists() {
            return Err(ScanError::PathNotFound(input.to_path_buf()));
        }

        if input.is_file() {
            if !is_python_file(input) {
                return Err(ScanError::NotPython(input.to_path_buf()));
            }
            if self.is_excluded_file(input) {
                info!("Input file {} is excluded", input.display());
                return Ok(Vec::new());
            }
            return Ok(vec![input.to_path_buf()]);
        }

        if self.is_excluded_dir(input) {
            info!("Input directory {} is excluded", input.display());
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(input)
            .follow_links(false)
            .into_iter()
            // 根目录已在上面检查过
            .filter_entry(|e| e.depth() == 0 || !e.file_type().is_dir() || !self.is_excluded_dir(e.path()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Failed to read directory entry: {}", e);
                    continue;
                }
            };
            if self.accepts(&entry) {
                files.push(entry.into_path());
            }
        }

        files.sort();
        info!("Found {} Python files under {}", files.len(), input.display());
        Ok(files)
    }

    fn accepts(&self, entry: &DirEntry) -> bool {
        if !entry.file_type().is_file() || !is_python_file(entry.path()) {
            return false;
        }
        if self.is_excluded_file(entry.path()) {
            debug!("Excluding file: {}", entry.path().display());
            return false;
        }
        true
    }

    /// 检查目录是否被排除
    fn is_excluded_dir(&self, path: &Path) -> bool {
        let name = file_name(path);
        if self.options.use_default_ignores && IGNORED_DIRS.contains(&name.as_str()) {
            return true;
        }
        if self.options.exclude_dirs.iter().any(|d| d == &name) {
            return true;
        }
        self.matches_pattern(path, &name)
    }

    /// 检查文件是否被排除
    fn is_excluded_file(&self, path: &Path) -> bool {
        let name = file_name(path);
        self.options.exclude_files.iter().any(|f| f == &name) || self.matches_pattern(path, &name)
    }

    fn matches_pattern(&self, path: &Path, name: &str) -> bool {
        let path_str = path.to_string_lossy().replace('\\', "/");
        self.patterns
            .iter()
            .any(|p| p.matches(name) || p.matches(&path_str))
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn is_python_file(path: &Path) -> bool {
    path.extension().map(|ext| ext == "py").unwrap_or(false)
}

/// 扫描错误类型
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("路径不存在: {0}")]
    PathNotFound(PathBuf),

    #[error("不是 Python 文件: {0}")]
    NotPython(PathBuf),
}
