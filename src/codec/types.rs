//! Типы движка сжатия

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::PackError;

/// Уровень сжатия по умолчанию (середина шкалы 1..9)
pub const DEFAULT_LEVEL: u32 = 5;

/// Алгоритм сжатия
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    Zip,
    Gzip,
    Bzip2,
}

impl Algorithm {
    pub const ALL: [Algorithm; 3] = [Algorithm::Zip, Algorithm::Gzip, Algorithm::Bzip2];

    /// Каноническое расширение без точки
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Gzip => "gz",
            Self::Bzip2 => "bz2",
        }
    }

    /// Короткое имя формата
    pub fn name(&self) -> &'static str {
        match self {
            Self::Zip => "ZIP",
            Self::Gzip => "GZIP",
            Self::Bzip2 => "BZIP2",
        }
    }

    /// Название для выпадающих списков оболочки
    pub fn label(&self) -> &'static str {
        match self {
            Self::Zip => "ZIP (Standard)",
            Self::Gzip => "GZIP (Fast)",
            Self::Bzip2 => "BZIP2 (High Compression)",
        }
    }

    pub fn identifier(&self) -> &'static str {
        self.extension()
    }

    /// Поддерживает ли алгоритм сжатие целых папок
    pub fn supports_directories(&self) -> bool {
        matches!(self, Self::Zip)
    }

    /// Найти алгоритм по расширению (без учёта регистра), по умолчанию ZIP
    pub fn from_extension(extension: &str) -> Self {
        let lower = extension.trim_start_matches('.').to_lowercase();
        Self::ALL
            .into_iter()
            .find(|a| a.extension() == lower)
            .unwrap_or(Self::Zip)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Строгий разбор имени алгоритма (для CLI и сериализованных заданий)
impl FromStr for Algorithm {
    type Err = PackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "zip" => Ok(Self::Zip),
            "gz" | "gzip" => Ok(Self::Gzip),
            "bz2" | "bzip2" => Ok(Self::Bzip2),
            other => Err(PackError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// Уровень сжатия, всегда в диапазоне 1..=9 (в том числе после десериализации)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "i64")]
pub struct CompressionLevel(u32);

impl CompressionLevel {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 9;

    pub fn new(level: i64) -> Self {
        Self(level.clamp(Self::MIN as i64, Self::MAX as i64) as u32)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl From<i64> for CompressionLevel {
    fn from(level: i64) -> Self {
        Self::new(level)
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self(DEFAULT_LEVEL)
    }
}

/// Направление операции
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Compress,
    Decompress,
}

impl Direction {
    /// "Compression" / "Decompression"
    pub fn noun(&self) -> &'static str {
        match self {
            Self::Compress => "Compression",
            Self::Decompress => "Decompression",
        }
    }

    /// "Compressing" / "Decompressing"
    pub fn gerund(&self) -> &'static str {
        match self {
            Self::Compress => "Compressing",
            Self::Decompress => "Decompressing",
        }
    }
}

/// Неизменяемое описание задания
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub direction: Direction,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub algorithm: Algorithm,
    /// Для распаковки игнорируется
    pub level: CompressionLevel,
    /// Только для ZIP-сжатия папок: добавить имя папки в начало путей
    pub preserve_structure: bool,
}

impl JobSpec {
    pub fn compress(
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        algorithm: Algorithm,
        level: i64,
        preserve_structure: bool,
    ) -> Self {
        Self {
            direction: Direction::Compress,
            source: source.into(),
            destination: destination.into(),
            algorithm,
            level: CompressionLevel::new(level),
            preserve_structure,
        }
    }

    pub fn decompress(
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        algorithm: Algorithm,
    ) -> Self {
        Self {
            direction: Direction::Decompress,
            source: source.into(),
            destination: destination.into(),
            algorithm,
            level: CompressionLevel::default(),
            preserve_structure: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_algorithm_from_extension() {
        assert_eq!(Algorithm::from_extension("zip"), Algorithm::Zip);
        assert_eq!(Algorithm::from_extension("GZ"), Algorithm::Gzip);
        assert_eq!(Algorithm::from_extension(".bz2"), Algorithm::Bzip2);
        assert_eq!(Algorithm::from_extension("unknown"), Algorithm::Zip);
        assert_eq!(Algorithm::from_extension(""), Algorithm::Zip);
    }

    #[test]
    fn test_algorithm_labels() {
        assert_eq!(Algorithm::Zip.to_string(), "ZIP (Standard)");
        assert_eq!(Algorithm::Gzip.label(), "GZIP (Fast)");
        assert_eq!(Algorithm::Bzip2.label(), "BZIP2 (High Compression)");
        assert_eq!(Algorithm::Bzip2.identifier(), "bz2");
    }

    #[test]
    fn test_algorithm_from_str() {
        assert_eq!("gzip".parse::<Algorithm>().unwrap(), Algorithm::Gzip);
        assert_eq!("BZ2".parse::<Algorithm>().unwrap(), Algorithm::Bzip2);

        let err = "xz".parse::<Algorithm>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedAlgorithm);
    }

    #[test]
    fn test_only_zip_supports_directories() {
        assert!(Algorithm::Zip.supports_directories());
        assert!(!Algorithm::Gzip.supports_directories());
        assert!(!Algorithm::Bzip2.supports_directories());
    }

    #[test]
    fn test_level_clamped() {
        assert_eq!(CompressionLevel::new(0).get(), 1);
        assert_eq!(CompressionLevel::new(-3).get(), 1);
        assert_eq!(CompressionLevel::new(5).get(), 5);
        assert_eq!(CompressionLevel::new(10).get(), 9);
        assert_eq!(CompressionLevel::default().get(), DEFAULT_LEVEL);
    }

    #[test]
    fn test_deserialized_level_is_clamped() {
        let json = r#"{"direction":"Compress","source":"a.txt","destination":"a.txt.bz2","algorithm":"Bzip2","level":42,"preserve_structure":false}"#;
        let spec: JobSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.level.get(), 9);

        let json = json.replace("42", "-7");
        let spec: JobSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(spec.level.get(), 1);

        // Сериализованный уровень читается обратно без изменений
        let restored: JobSpec = serde_json::from_str(&serde_json::to_string(&spec).unwrap()).unwrap();
        assert_eq!(restored, spec);
    }

    #[test]
    fn test_job_spec_constructors() {
        let spec = JobSpec::compress("a.txt", "a.txt.gz", Algorithm::Gzip, 12, false);
        assert_eq!(spec.direction, Direction::Compress);
        assert_eq!(spec.level.get(), 9);

        let spec = JobSpec::decompress("a.txt.gz", "a.txt", Algorithm::Gzip);
        assert_eq!(spec.direction, Direction::Decompress);
        assert!(!spec.preserve_structure);
    }

    #[test]
    fn test_direction_words() {
        assert_eq!(Direction::Compress.noun(), "Compression");
        assert_eq!(Direction::Decompress.gerund(), "Decompressing");
    }
}
