//! 下载归档服务 - 业务能力层
//!
//! 只负责"把浏览器刚保存的文件移到按月份命名的位置"能力：
//! - 扫描下载根目录顶层
//! - 选出最新的文件
//! - 按发票字段生成文件名并移动

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, info, warn};

use crate::error::FileError;
use crate::models::InvoiceFields;

/// 文件名中不允许出现的字符
const FORBIDDEN_CHARS: &[char] = &[
    '/', '\\', ':', '*', '?', '"', '<', '>', '|', '$', '%', '#', '@', '!', '&',
];
/// 文件名最大长度
const MAX_NAME_LEN: usize = 200;
/// 超长时保留的主干长度
const TRUNCATED_STEM_LEN: usize = 190;
/// 扩展名最大长度，更长的 `.` 后缀视为主干的一部分
const MAX_EXTENSION_LEN: usize = 8;
/// 默认扩展名
pub const DEFAULT_EXTENSION: &str = "pdf";

/// 清理文件名
///
/// 1. 非法字符替换为 `_`
/// 2. 连续空白合并为一个空格并去掉首尾空白
/// 3. 超过 200 个字符时保留主干前 190 个字符再加扩展名
///    （没有扩展名或扩展名过长时使用 `pdf`）
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if FORBIDDEN_CHARS.contains(&c) { '_' } else { c })
        .collect();
    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= MAX_NAME_LEN {
        return collapsed;
    }

    let (stem, extension) = match collapsed.rsplit_once('.') {
        Some((stem, ext)) if ext.chars().count() <= MAX_EXTENSION_LEN => (stem, ext),
        _ => (collapsed.as_str(), DEFAULT_EXTENSION),
    };
    let stem: String = stem.chars().take(TRUNCATED_STEM_LEN).collect();
    format!("{}.{}", stem, extension)
}

/// 归档结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// 文件已移动到目标位置
    Filed(PathBuf),
    /// 目标已存在，新下载的文件被丢弃
    Duplicate(PathBuf),
    /// 没有找到可归档的文件
    NoOp,
}

/// 下载归档服务
///
/// 职责：
/// - 只处理下载根目录的顶层（不递归）
/// - 只处理单张发票
/// - 不关心文件是如何产生的
#[derive(Debug, Clone)]
pub struct DownloadReconciler {
    root: PathBuf,
    extension: String,
}

impl DownloadReconciler {
    /// 创建新的归档服务（扩展名默认为 pdf）
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }

    /// 使用自定义扩展名
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_ascii_lowercase();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 准备下载根目录：不存在则创建，并删除顶层残留的文件（保留子目录）
    ///
    /// # 返回
    /// 删除的文件数量
    pub fn prepare_root(&self) -> Result<usize, FileError> {
        create_dir(&self.root)?;

        let mut removed = 0;
        for entry in read_dir(&self.root)? {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            fs::remove_file(&path).map_err(|source| FileError::DeleteFailed {
                path: path.clone(),
                source,
            })?;
            debug!("删除残留文件: {}", path.display());
            removed += 1;
        }

        if removed > 0 {
            info!("🧹 已清理下载目录中的 {} 个残留文件", removed);
        }
        Ok(removed)
    }

    /// 列出下载根目录顶层的条目名（按名称排序）
    pub fn list_root(&self) -> Result<Vec<String>, FileError> {
        let mut names: Vec<String> = read_dir(&self.root)?
            .into_iter()
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        Ok(names)
    }

    /// 找到顶层创建时间最新的下载文件
    pub fn find_latest_download(&self) -> Result<Option<PathBuf>, FileError> {
        let mut latest: Option<(SystemTime, PathBuf)> = None;

        for entry in read_dir(&self.root)? {
            let path = entry.path();
            if !path.is_file() || !self.matches_extension(&path) {
                continue;
            }
            let Some(stamp) = creation_time(&path) else {
                warn!("⚠️ 无法读取文件时间: {}", path.display());
                continue;
            };
            if latest.as_ref().map_or(true, |(best, _)| stamp > *best) {
                latest = Some((stamp, path));
            }
        }

        Ok(latest.map(|(_, path)| path))
    }

    /// 把最新下载的文件归档到 `{root}/{month}/{date}_{number}_{value}.{ext}`
    ///
    /// - 目标已存在：删除源文件，返回 `Duplicate`
    /// - 没有下载文件：返回 `NoOp`
    /// - 重命名失败时回退为复制后删除
    pub fn reconcile(
        &self,
        month: &str,
        fields: &InvoiceFields,
    ) -> Result<ReconcileOutcome, FileError> {
        let month_dir = self.root.join(month);
        create_dir(&month_dir)?;

        let Some(source) = self.find_latest_download()? else {
            info!("📭 未找到下载文件: {}", fields);
            return Ok(ReconcileOutcome::NoOp);
        };

        let target = month_dir.join(sanitize_filename(&fields.file_name(&self.extension)));
        debug!("归档: {} -> {}", source.display(), target.display());

        if target.exists() {
            remove_file(&source)?;
            info!("♻️ 文件已存在，丢弃重复下载: {}", target.display());
            return Ok(ReconcileOutcome::Duplicate(target));
        }

        relocate(&source, &target)?;
        info!("✓ 已归档: {}", target.display());
        Ok(ReconcileOutcome::Filed(target))
    }

    fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| ext.eq_ignore_ascii_case(&self.extension))
    }
}

/// 创建时间，文件系统不支持时回退到修改时间
fn creation_time(path: &Path) -> Option<SystemTime> {
    let metadata = fs::metadata(path).ok()?;
    metadata.created().or_else(|_| metadata.modified()).ok()
}

/// 移动文件，跨设备等原因重命名失败时复制后删除
fn relocate(source: &Path, target: &Path) -> Result<(), FileError> {
    if let Err(e) = fs::rename(source, target) {
        debug!("重命名失败，改为复制: {}", e);
        fs::copy(source, target).map_err(|source_err| FileError::MoveFailed {
            from: source.to_path_buf(),
            to: target.to_path_buf(),
            source: source_err,
        })?;
        remove_file(source)?;
    }
    Ok(())
}

fn create_dir(path: &Path) -> Result<(), FileError> {
    fs::create_dir_all(path).map_err(|source| FileError::CreateDirFailed {
        path: path.to_path_buf(),
        source,
    })
}

fn remove_file(path: &Path) -> Result<(), FileError> {
    fs::remove_file(path).map_err(|source| FileError::DeleteFailed {
        path: path.to_path_buf(),
        source,
    })
}

fn read_dir(path: &Path) -> Result<Vec<fs::DirEntry>, FileError> {
    let wrap = |source| FileError::ReadDirFailed {
        path: path.to_path_buf(),
        source,
    };
    fs::read_dir(path)
        .map_err(wrap)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(wrap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;
    use tempfile::TempDir;

    fn fields(number: &str, date: &str, value: &str) -> InvoiceFields {
        InvoiceFields::from_cells(number, date, value).unwrap()
    }

    fn write_download(root: &Path, name: &str, content: &str) -> PathBuf {
        let path = root.join(name);
        fs::write(&path, content).unwrap();
        // 保证时间戳可区分
        sleep(Duration::from_millis(30));
        path
    }

    fn top_level_pdfs(root: &Path) -> usize {
        fs::read_dir(root)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path().is_file())
            .filter(|e| e.path().extension().map_or(false, |x| x == "pdf"))
            .count()
    }

    #[test]
    fn test_sanitize_replaces_forbidden_chars() {
        let name = sanitize_filename(r#"a/b\c:d*e?f"g<h>i|j$k%l#m@n!o&p.pdf"#);
        assert_eq!(name, "a_b_c_d_e_f_g_h_i_j_k_l_m_n_o_p.pdf");
        assert_eq!(sanitize_filename("01/06/2025_123_1500_00.pdf"), "01_06_2025_123_1500_00.pdf");
    }

    #[test]
    fn test_sanitize_collapses_whitespace() {
        assert_eq!(sanitize_filename("  nota   fiscal \t 1.pdf "), "nota fiscal 1.pdf");
    }

    #[test]
    fn test_sanitize_truncates_long_names() {
        let long = format!("{}.pdf", "x".repeat(300));
        let name = sanitize_filename(&long);
        assert_eq!(name, format!("{}.pdf", "x".repeat(190)));

        let no_ext = "y".repeat(250);
        assert_eq!(sanitize_filename(&no_ext), format!("{}.pdf", "y".repeat(190)));
    }

    #[test]
    fn test_sanitize_long_tail_after_dot_is_not_an_extension() {
        let input = format!("a.{}", "z".repeat(300));
        let name = sanitize_filename(&input);
        assert!(name.chars().count() <= MAX_NAME_LEN);
        assert_eq!(name, format!("a.{}.pdf", "z".repeat(188)));
    }

    #[test]
    fn test_sanitize_output_is_bounded_and_clean() {
        let inputs = [
            "simple.pdf".to_string(),
            format!("{}.pdf", "&".repeat(400)),
            format!("{} {}", "a b".repeat(90), "c?d".repeat(40)),
            "   ".to_string(),
            format!("{}.{}", "n".repeat(195), "pdf"),
            format!("nota.{}", "t".repeat(250)),
        ];
        for input in inputs {
            let name = sanitize_filename(&input);
            assert!(name.chars().count() <= MAX_NAME_LEN, "too long: {}", name);
            assert!(!name.chars().any(|c| FORBIDDEN_CHARS.contains(&c)), "dirty: {}", name);
        }
    }

    #[test]
    fn test_reconcile_files_latest_download() {
        let dir = TempDir::new().unwrap();
        let reconciler = DownloadReconciler::new(dir.path());
        write_download(dir.path(), "older.pdf", "old");
        write_download(dir.path(), "newer.PDF", "new");
        write_download(dir.path(), "notes.txt", "ignored");

        let outcome = reconciler
            .reconcile("Junho", &fields("123", "01/06/2025", "1.500,00"))
            .unwrap();

        let expected = dir.path().join("Junho").join("01_06_2025_123_1500_00.pdf");
        assert_eq!(outcome, ReconcileOutcome::Filed(expected.clone()));
        assert_eq!(fs::read_to_string(&expected).unwrap(), "new");
        assert!(dir.path().join("older.pdf").exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_reconcile_without_download_is_noop() {
        let dir = TempDir::new().unwrap();
        let reconciler = DownloadReconciler::new(dir.path());

        let outcome = reconciler
            .reconcile("Maio", &fields("9", "05/05/2025", "1,00"))
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::NoOp);
        assert!(dir.path().join("Maio").is_dir());
    }

    #[test]
    fn test_reconcile_same_tuple_twice_keeps_one_file() {
        let dir = TempDir::new().unwrap();
        let reconciler = DownloadReconciler::new(dir.path());
        let invoice = fields("123", "01/06/2025", "1.500,00");

        write_download(dir.path(), "first.pdf", "first");
        let first = reconciler.reconcile("Junho", &invoice).unwrap();
        write_download(dir.path(), "second.pdf", "second");
        let second = reconciler.reconcile("Junho", &invoice).unwrap();

        let target = dir.path().join("Junho").join("01_06_2025_123_1500_00.pdf");
        assert_eq!(first, ReconcileOutcome::Filed(target.clone()));
        assert_eq!(second, ReconcileOutcome::Duplicate(target.clone()));
        assert_eq!(fs::read_to_string(&target).unwrap(), "first");
        assert_eq!(fs::read_dir(dir.path().join("Junho")).unwrap().count(), 1);
        assert_eq!(top_level_pdfs(dir.path()), 0);
    }

    #[test]
    fn test_no_download_left_at_top_level() {
        let dir = TempDir::new().unwrap();
        let reconciler = DownloadReconciler::new(dir.path());

        for (i, month) in ["Janeiro", "Fevereiro", "Janeiro"].iter().enumerate() {
            write_download(dir.path(), &format!("download_{}.pdf", i), "x");
            let invoice = fields(&(100 + i).to_string(), "10/01/2025", "2,50");
            reconciler.reconcile(month, &invoice).unwrap();
        }

        assert_eq!(top_level_pdfs(dir.path()), 0);
        assert_eq!(reconciler.list_root().unwrap(), vec!["Fevereiro", "Janeiro"]);
    }

    #[test]
    fn test_prepare_root_removes_stray_files_only() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("notas_fiscais");
        let reconciler = DownloadReconciler::new(&root);
        assert_eq!(reconciler.prepare_root().unwrap(), 0);

        fs::create_dir_all(root.join("Junho")).unwrap();
        fs::write(root.join("stale.pdf"), "x").unwrap();
        fs::write(root.join("stale.tmp"), "x").unwrap();

        assert_eq!(reconciler.prepare_root().unwrap(), 2);
        assert_eq!(reconciler.list_root().unwrap(), vec!["Junho"]);
    }
}
