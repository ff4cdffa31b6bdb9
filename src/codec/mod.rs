//! Движок сжатия
//!
//! Поддерживаемые форматы:
//! - zip (файлы и папки)
//! - gz (один файл)
//! - bz2 (один файл)
//!
//! Все форматы работают через один буфер 8 КБ и колбэк прогресса,
//! отмена приходит из колбэка как `PackError::Cancelled`.

mod bzip2;
mod gzip;
mod pipeline;
mod stream;
mod types;
mod zip;

pub use self::pipeline::{ProgressSink, BUFFER_SIZE};
pub use self::types::{Algorithm, CompressionLevel, Direction, JobSpec, DEFAULT_LEVEL};

use std::path::Path;
use tracing::info;

use crate::error::Result;

/// Выполнить задание. Возвращает коэффициент сжатия.
pub fn run(spec: &JobSpec, sink: &mut dyn ProgressSink) -> Result<f64> {
    info!(
        "{} with {}: {} -> {}",
        spec.direction.gerund(),
        spec.algorithm.name(),
        spec.source.display(),
        spec.destination.display()
    );

    match (spec.direction, spec.algorithm) {
        (Direction::Compress, Algorithm::Zip) => self::zip::compress(spec, sink),
        (Direction::Compress, Algorithm::Gzip) => stream::compress::<self::gzip::Gzip>(spec, sink),
        (Direction::Compress, Algorithm::Bzip2) => {
            stream::compress::<self::bzip2::Bzip2>(spec, sink)
        }
        (Direction::Decompress, Algorithm::Zip) => self::zip::decompress(spec, sink),
        (Direction::Decompress, Algorithm::Gzip) => {
            stream::decompress::<self::gzip::Gzip>(spec, sink)
        }
        (Direction::Decompress, Algorithm::Bzip2) => {
            stream::decompress::<self::bzip2::Bzip2>(spec, sink)
        }
    }
}

/// Сжать `source` в `destination`
pub fn compress(
    source: &Path,
    destination: &Path,
    algorithm: Algorithm,
    level: i64,
    preserve_structure: bool,
    sink: &mut dyn ProgressSink,
) -> Result<f64> {
    let spec = JobSpec::compress(source, destination, algorithm, level, preserve_structure);
    run(&spec, sink)
}

/// Распаковать `source` в `destination`
pub fn decompress(
    source: &Path,
    destination: &Path,
    algorithm: Algorithm,
    sink: &mut dyn ProgressSink,
) -> Result<f64> {
    let spec = JobSpec::decompress(source, destination, algorithm);
    run(&spec, sink)
}
