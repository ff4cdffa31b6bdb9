//! Анализ путей: размер, тип, выбор алгоритма и пути вывода по расширению
//!
//! Только имя файла, содержимое не читается: файл с неверным расширением
//! упадёт уже при декодировании.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::codec::Algorithm;
use crate::error::{PackError, Result};

/// Известные расширения сжатых файлов
const COMPRESSED_SUFFIXES: &[&str] = &[
    "zip", "gz", "gzip", "bz2", "bzip2", "tar.gz", "tgz", "tar.bz2", "tbz2", "7z", "rar", "jar",
    "war", "xz", "lzma", "lz", "z",
];

/// Расширения, которые снимаются при выборе пути распаковки
const STRIPPABLE: &[&str] = &["zip", "jar", "war", "gz", "gzip", "bz2", "bzip2", "tgz", "tbz2"];

/// Описание файла или папки
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Абсолютный путь
    pub path: PathBuf,
    pub name: String,
    /// Для папок - рекурсивная сумма
    pub size: u64,
    /// Расширение в верхнем регистре, "Directory" или "Unknown"
    pub file_type: String,
}

impl FileDescriptor {
    pub fn is_dir(&self) -> bool {
        self.file_type == "Directory"
    }
}

/// Описать существующий путь
pub fn inspect(path: &Path) -> Result<FileDescriptor> {
    let metadata = fs::metadata(path).map_err(|e| PackError::from_io(path, e))?;

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .map_err(|e| PackError::from_io(path, e))?
            .join(path)
    };

    let name = path
        .file_name()
        .or_else(|| absolute.file_name())
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| absolute.display().to_string());

    let (size, file_type) = if metadata.is_dir() {
        (total_size(path)?, "Directory".to_string())
    } else {
        (metadata.len(), type_tag(path))
    };

    Ok(FileDescriptor {
        path: absolute,
        name,
        size,
        file_type,
    })
}

fn type_tag(path: &Path) -> String {
    match path.extension().map(|e| e.to_string_lossy()) {
        Some(ext) if !ext.is_empty() => ext.to_uppercase(),
        _ => "Unknown".to_string(),
    }
}

/// Размер файла или рекурсивная сумма файлов папки.
///
/// Симлинки внутри папки не раскрываются, учитывается размер самой ссылки.
/// Недоступные вложенные элементы пропускаются.
pub fn total_size(path: &Path) -> Result<u64> {
    let metadata = fs::metadata(path).map_err(|e| PackError::from_io(path, e))?;
    if !metadata.is_dir() {
        return Ok(metadata.len());
    }

    let mut total = 0u64;
    for entry in WalkDir::new(path).follow_links(false).min_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if entry.file_type().is_dir() {
            continue;
        }
        match entry.metadata() {
            Ok(meta) => total += meta.len(),
            Err(e) => debug!("Cannot stat {}: {}", entry.path().display(), e),
        }
    }

    Ok(total)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// `name` заканчивается на `.suffix` (ASCII без учёта регистра), перед точкой есть имя
fn has_suffix(name: &str, suffix: &str) -> bool {
    let Some(dot) = name.len().checked_sub(suffix.len() + 1) else {
        return false;
    };
    dot > 0
        && name.get(dot..dot + 1) == Some(".")
        && name
            .get(dot + 1..)
            .is_some_and(|tail| tail.eq_ignore_ascii_case(suffix))
}

fn has_any_suffix(name: &str, suffixes: &[&str]) -> bool {
    suffixes.iter().any(|s| has_suffix(name, s))
}

/// Похоже ли имя на сжатый файл (без учёта регистра)
pub fn is_likely_compressed(path: &Path) -> bool {
    has_any_suffix(&file_name(path), COMPRESSED_SUFFIXES)
}

/// Алгоритм по расширению, по умолчанию ZIP
pub fn algorithm_for(path: &Path) -> Algorithm {
    let name = file_name(path);

    if has_any_suffix(&name, &["zip", "jar", "war"]) {
        Algorithm::Zip
    } else if has_any_suffix(&name, &["gz", "gzip", "tgz", "tar.gz"]) {
        Algorithm::Gzip
    } else if has_any_suffix(&name, &["bz2", "bzip2", "tbz2", "tar.bz2"]) {
        Algorithm::Bzip2
    } else {
        Algorithm::Zip
    }
}

/// Путь распаковки по умолчанию: рядом с архивом, без внешнего расширения.
///
/// `archive.tar.gz` → `archive`, `data.zip` → папка `data`.
/// Нераспознанное расширение даёт `<имя>_extracted`.
pub fn default_decompression_target(path: &Path) -> PathBuf {
    let name = file_name(path);

    let stripped = STRIPPABLE
        .iter()
        .find(|ext| has_suffix(&name, ext))
        .map(|ext| {
            let base = &name[..name.len() - ext.len() - 1];
            let tarball = matches!(*ext, "gz" | "bz2" | "tgz" | "tbz2");
            match base.len().checked_sub(4).and_then(|i| base.get(i..).map(|t| (i, t))) {
                Some((i, tail)) if tarball && tail.eq_ignore_ascii_case(".tar") => base[..i].to_string(),
                _ => base.to_string(),
            }
        });

    let base = match stripped {
        Some(base) if !base.is_empty() => base,
        Some(_) => "extracted".to_string(),
        None if name.is_empty() => "extracted".to_string(),
        None => format!("{name}_extracted"),
    };

    match path.parent() {
        Some(parent) => parent.join(base),
        None => PathBuf::from(base),
    }
}

/// Путь сжатия по умолчанию: `<источник>.<расширение>`
pub fn default_compression_target(path: &Path, algorithm: Algorithm) -> PathBuf {
    let mut target = path.as_os_str().to_owned();
    target.push(".");
    target.push(algorithm.extension());
    PathBuf::from(target)
}
