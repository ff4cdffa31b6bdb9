//! Ошибки движка сжатия

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::codec::Algorithm;

/// Результат операций библиотеки
pub type Result<T> = std::result::Result<T, PackError>;

/// Вид ошибки (без подробностей) - удобно для сравнения в оболочке и тестах
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    PathNotFound,
    PermissionDenied,
    UnsupportedSourceKind,
    UnsupportedAlgorithm,
    UnsafeEntryPath,
    SymlinkLoop,
    Codec,
    Io,
    Cancelled,
    HostShutDown,
}

#[derive(Error, Debug)]
pub enum PackError {
    #[error("Path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("Permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("{} compression only supports single files, not directories: {}", .algorithm.name(), .path.display())]
    UnsupportedSourceKind { algorithm: Algorithm, path: PathBuf },

    #[error("Unsupported compression algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Archive entry escapes the destination directory: {0}")]
    UnsafeEntryPath(String),

    #[error("Symlink loop detected at {}", .0.display())]
    SymlinkLoop(PathBuf),

    #[error("Corrupted or unreadable data in {}: {reason}", .path.display())]
    Codec { path: PathBuf, reason: String },

    #[error("IO error at '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Сигнал отмены из progress sink. Раннер переводит его в Cancelled, а не в Failed.
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Job host is shut down")]
    HostShutDown,
}

impl PackError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PathNotFound(_) => ErrorKind::PathNotFound,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::UnsupportedSourceKind { .. } => ErrorKind::UnsupportedSourceKind,
            Self::UnsupportedAlgorithm(_) => ErrorKind::UnsupportedAlgorithm,
            Self::UnsafeEntryPath(_) => ErrorKind::UnsafeEntryPath,
            Self::SymlinkLoop(_) => ErrorKind::SymlinkLoop,
            Self::Codec { .. } => ErrorKind::Codec,
            Self::Io { .. } => ErrorKind::Io,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::HostShutDown => ErrorKind::HostShutDown,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Ошибка файловой системы с привязкой к пути
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::PathNotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }

    /// Ошибка чтения из декодера: битые данные превращаются в Codec.
    /// bzip2 и zip сообщают о порче потока по-разному, поэтому список видов шире.
    pub fn from_decode(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::InvalidData
            | io::ErrorKind::InvalidInput
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::Other => Self::Codec {
                path: path.to_path_buf(),
                reason: err.to_string(),
            },
            _ => Self::from_io(path, err),
        }
    }

    pub fn from_zip(path: &Path, err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => Self::from_decode(path, e),
            other => Self::Codec {
                path: path.to_path_buf(),
                reason: other.to_string(),
            },
        }
    }

    pub(crate) fn codec(path: &Path, reason: impl Into<String>) -> Self {
        Self::Codec {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}
