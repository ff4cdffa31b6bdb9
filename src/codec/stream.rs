//! Общий скелет для однопоточных кодеков (GZIP, BZIP2)
//!
//! Открыть вход, открыть вывод, гнать буфер с прогрессом, закрыть оба.
//! Конкретный кодек только вставляет свой слой между файлом и буфером.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use super::pipeline::{
    self, close_output, create_output, ensure_parent, file_len, open_input, CountingReader,
    OutputWriter, ProgressSink, ReadSide, Seal, SealedWriter,
};
use super::types::{Algorithm, CompressionLevel, JobSpec};
use crate::error::{PackError, Result};

/// Слой кодека поверх файла
pub(crate) trait StreamCodec {
    const ALGORITHM: Algorithm;
    /// Суффикс, который снимается при распаковке в папку
    const SUFFIX: &'static str;

    type Encoder: Write;
    type Decoder: Read;

    fn encoder(output: OutputWriter, level: CompressionLevel) -> Self::Encoder;
    fn finish(encoder: Self::Encoder) -> io::Result<OutputWriter>;
    fn decoder(input: CountingReader<File>) -> Self::Decoder;
}

/// Сжать одиночный файл
pub(crate) fn compress<C: StreamCodec>(spec: &JobSpec, sink: &mut dyn ProgressSink) -> Result<f64> {
    let source = spec.source.as_path();
    let destination = spec.destination.as_path();

    // Проверяем до открытия вывода: на диске не должно появиться ни байта
    let metadata = fs::metadata(source).map_err(|e| PackError::from_io(source, e))?;
    if !metadata.is_file() {
        return Err(PackError::UnsupportedSourceKind {
            algorithm: C::ALGORITHM,
            path: source.to_path_buf(),
        });
    }
    let total = metadata.len();

    let mut input = open_input(source)?;
    ensure_parent(destination)?;

    let seal = Seal::default();
    let output = SealedWriter::new(BufWriter::new(create_output(destination)?), seal.clone());
    let mut encoder = C::encoder(output, spec.level);

    let mut done = 0u64;
    let streamed = pipeline::pump(
        &mut input,
        source,
        ReadSide::Plain,
        &mut encoder,
        destination,
        |n| {
            done += n;
            pipeline::report(&mut *sink, done, total)
        },
    );
    if let Err(err) = streamed {
        seal.close();
        return Err(err);
    }

    let output = C::finish(encoder).map_err(|e| PackError::from_io(destination, e))?;
    close_output(output.into_inner(), destination)?;

    let ratio = pipeline::ratio(file_len(destination)?, total);
    info!(
        "{} compression complete: {} -> {}, ratio {:.4}",
        C::ALGORITHM.name(),
        source.display(),
        destination.display(),
        ratio
    );
    Ok(ratio)
}

/// Распаковать одиночный поток
pub(crate) fn decompress<C: StreamCodec>(
    spec: &JobSpec,
    sink: &mut dyn ProgressSink,
) -> Result<f64> {
    let source = spec.source.as_path();
    let total = file_len(source)?;
    let destination = resolve_output::<C>(source, &spec.destination);

    if destination == source {
        return Err(PackError::Io {
            path: destination,
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                "decompressed output would overwrite the source",
            ),
        });
    }

    let (input, consumed) = CountingReader::new(open_input(source)?);
    let mut decoder = C::decoder(input);

    ensure_parent(&destination)?;
    let mut output = BufWriter::new(create_output(&destination)?);

    // Размер распакованных данных неизвестен до EOF - оцениваем по позиции сжатого входа
    pipeline::pump(
        &mut decoder,
        source,
        ReadSide::Decoder,
        &mut output,
        &destination,
        |_| pipeline::report(&mut *sink, consumed.get(), total),
    )?;
    close_output(output, &destination)?;

    let ratio = pipeline::ratio(file_len(&destination)?, total);
    info!(
        "{} decompression complete: {} -> {}, ratio {:.4}",
        C::ALGORITHM.name(),
        source.display(),
        destination.display(),
        ratio
    );
    Ok(ratio)
}

/// Если вывод - существующая папка, кладём внутрь файл с именем источника без суффикса
fn resolve_output<C: StreamCodec>(source: &Path, destination: &Path) -> PathBuf {
    if !destination.is_dir() {
        return destination.to_path_buf();
    }

    let file_name = source
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let stripped = strip_suffix_ignore_case(&file_name, C::SUFFIX);

    destination.join(stripped)
}

pub(crate) fn strip_suffix_ignore_case<'a>(name: &'a str, suffix: &str) -> &'a str {
    let split = name.len().saturating_sub(suffix.len());
    match (name.get(..split), name.get(split..)) {
        (Some(head), Some(tail)) if tail.eq_ignore_ascii_case(suffix) => head,
        _ => name,
    }
}
