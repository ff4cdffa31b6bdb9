//! ZIP: сжатие файлов и папок, распаковка с защитой от выхода за пределы папки

use std::fs::{self, Metadata};
use std::io::{self, BufReader, BufWriter};
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR};

use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::pipeline::{
    self, close_output, create_output, ensure_parent, file_len, open_input, OutputWriter,
    ProgressSink, ReadSide, Seal, SealedWriter,
};
use super::types::{CompressionLevel, JobSpec};
use crate::error::{PackError, Result};

/// Записи от 4 ГБ пишутся с флагом Zip64
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

/// Файл, который попадёт в архив
struct PendingEntry {
    source: PathBuf,
    name: String,
    len: u64,
    mode: Option<u32>,
}

pub(crate) fn compress(spec: &JobSpec, sink: &mut dyn ProgressSink) -> Result<f64> {
    let source = spec.source.as_path();
    let destination = spec.destination.as_path();

    let metadata = fs::metadata(source).map_err(|e| PackError::from_io(source, e))?;
    let entries = if metadata.is_dir() {
        collect_directory(source, spec.preserve_structure)?
    } else {
        vec![PendingEntry {
            source: source.to_path_buf(),
            name: leaf_name(source),
            len: metadata.len(),
            mode: file_mode(&metadata),
        }]
    };
    // Симлинки уже разыменованы обходом, считаем по собранным записям
    let total = entries.iter().fold(0u64, |sum, e| sum.saturating_add(e.len));

    ensure_parent(destination)?;
    let seal = Seal::default();
    let output = SealedWriter::new(BufWriter::new(create_output(destination)?), seal.clone());
    let mut writer = ZipWriter::new(output);

    let mut done = 0u64;
    for entry in &entries {
        let written = write_entry(&mut writer, entry, spec.level, destination, &mut |n: u64| {
            done += n;
            pipeline::report(&mut *sink, done, total)
        });
        if let Err(err) = written {
            seal.close();
            return Err(err);
        }
    }

    let output = writer.finish().map_err(|e| match e {
        zip::result::ZipError::Io(io_err) => PackError::from_io(destination, io_err),
        other => PackError::from_zip(destination, other),
    })?;
    close_output(output.into_inner(), destination)?;

    let ratio = pipeline::ratio(file_len(destination)?, total);
    info!(
        "ZIP compression complete: {} -> {} ({} entries), ratio {:.4}",
        source.display(),
        destination.display(),
        entries.len(),
        ratio
    );
    Ok(ratio)
}

fn write_entry(
    writer: &mut ZipWriter<OutputWriter>,
    entry: &PendingEntry,
    level: CompressionLevel,
    destination: &Path,
    on_chunk: &mut dyn FnMut(u64) -> Result<()>,
) -> Result<()> {
    let mut options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(level.get() as i64))
        .large_file(entry.len >= ZIP64_THRESHOLD);
    if let Some(mode) = entry.mode {
        options = options.unix_permissions(mode);
    }

    writer
        .start_file(entry.name.as_str(), options)
        .map_err(|e| PackError::from_zip(destination, e))?;
    debug!("Adding {} as {}", entry.source.display(), entry.name);

    let mut input = open_input(&entry.source)?;
    pipeline::pump(
        &mut input,
        &entry.source,
        ReadSide::Plain,
        writer,
        destination,
        |n| on_chunk(n),
    )?;
    Ok(())
}

/// Обход папки в глубину. Только файлы, имена через системный разделитель.
fn collect_directory(root: &Path, preserve_structure: bool) -> Result<Vec<PendingEntry>> {
    let prefix = if preserve_structure {
        format!("{}{}", leaf_name(root), MAIN_SEPARATOR)
    } else {
        String::new()
    };

    let mut entries = Vec::new();
    for item in WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .min_depth(1)
    {
        let item = match item {
            Ok(item) => item,
            Err(err) => {
                if err.loop_ancestor().is_some() {
                    let path = err.path().unwrap_or(root).to_path_buf();
                    return Err(PackError::SymlinkLoop(path));
                }
                if let Some(path) = dangling_link(&err) {
                    warn!("Skipping dangling symlink: {}", path.display());
                    continue;
                }
                let path = err.path().unwrap_or(root).to_path_buf();
                return Err(match err.into_io_error() {
                    Some(io_err) => PackError::from_io(&path, io_err),
                    None => PackError::Io {
                        path,
                        source: io::Error::other("directory walk failed"),
                    },
                });
            }
        };

        if !item.file_type().is_file() {
            continue;
        }

        let metadata = item
            .metadata()
            .map_err(|e| PackError::Io {
                path: item.path().to_path_buf(),
                source: e.into_io_error().unwrap_or_else(|| io::Error::other("metadata")),
            })?;

        let relative = item.path().strip_prefix(root).unwrap_or(item.path());
        entries.push(PendingEntry {
            source: item.path().to_path_buf(),
            name: format!("{prefix}{}", entry_name(relative)),
            len: metadata.len(),
            mode: file_mode(&metadata),
        });
    }

    Ok(entries)
}

/// Битая ссылка: ошибка NotFound на пути, который сам является симлинком
fn dangling_link(err: &walkdir::Error) -> Option<PathBuf> {
    let path = err.path()?;
    let not_found = err
        .io_error()
        .map(|e| e.kind() == io::ErrorKind::NotFound)
        .unwrap_or(false);
    let is_link = fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false);
    (not_found && is_link).then(|| path.to_path_buf())
}

fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(&MAIN_SEPARATOR.to_string())
}

/// Имя файла/папки; для "." и ".." берём имя после канонизации
fn leaf_name(path: &Path) -> String {
    if let Some(name) = path.file_name() {
        return name.to_string_lossy().to_string();
    }
    fs::canonicalize(path)
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .unwrap_or_else(|| "archive".to_string())
}

#[cfg(unix)]
fn file_mode(metadata: &Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(metadata.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn file_mode(_metadata: &Metadata) -> Option<u32> {
    None
}

/// Запись архива после проверки первого прохода
struct PlannedEntry {
    index: usize,
    relative: PathBuf,
    is_dir: bool,
}

pub(crate) fn decompress(spec: &JobSpec, sink: &mut dyn ProgressSink) -> Result<f64> {
    let source = spec.source.as_path();
    let destination = spec.destination.as_path();

    let input_size = file_len(source)?;
    let mut archive = ZipArchive::new(BufReader::new(open_input(source)?))
        .map_err(|e| PackError::from_zip(source, e))?;

    // Проход 1: проверяем все имена и считаем размер, ничего не пишем
    let mut planned = Vec::with_capacity(archive.len());
    let mut total = 0u64;
    for index in 0..archive.len() {
        let entry = archive
            .by_index_raw(index)
            .map_err(|e| PackError::from_zip(source, e))?;
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| PackError::UnsafeEntryPath(entry.name().to_string()))?;
        total = total
            .checked_add(entry.size())
            .ok_or_else(|| PackError::codec(source, "declared entry sizes overflow"))?;
        planned.push(PlannedEntry {
            index,
            relative,
            is_dir: entry.is_dir(),
        });
    }

    fs::create_dir_all(destination).map_err(|e| PackError::from_io(destination, e))?;

    // Проход 2: распаковка
    let mut done = 0u64;
    for plan in &planned {
        let target = destination.join(&plan.relative);
        if plan.is_dir {
            fs::create_dir_all(&target).map_err(|e| PackError::from_io(&target, e))?;
            continue;
        }

        ensure_parent(&target)?;
        let mut entry = archive
            .by_index(plan.index)
            .map_err(|e| PackError::from_zip(source, e))?;
        let mode = entry.unix_mode();

        let mut output = BufWriter::new(create_output(&target)?);
        pipeline::pump(
            &mut entry,
            source,
            ReadSide::Decoder,
            &mut output,
            &target,
            |n| {
                done += n;
                pipeline::report(&mut *sink, done, total)
            },
        )?;
        close_output(output, &target)?;
        restore_mode(&target, mode);
    }

    let ratio = if total == 0 {
        1.0
    } else {
        pipeline::ratio(total, input_size)
    };
    info!(
        "ZIP decompression complete: {} -> {} ({} entries), ratio {:.4}",
        source.display(),
        destination.display(),
        planned.len(),
        ratio
    );
    Ok(ratio)
}

#[cfg(unix)]
fn restore_mode(path: &Path, mode: Option<u32>) {
    use std::os::unix::fs::PermissionsExt;
    if let Some(mode) = mode {
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777)) {
            debug!("Cannot restore permissions of {}: {}", path.display(), e);
        }
    }
}

#[cfg(not(unix))]
fn restore_mode(_path: &Path, _mode: Option<u32>) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::types::Algorithm;
    use crate::error::ErrorKind;
    use std::fs::File;
    use std::io::{Read, Write};
    use tempfile::TempDir;

    fn quiet(_: f64) -> Result<()> {
        Ok(())
    }

    fn entry_names(archive: &Path) -> Vec<String> {
        let mut zip = ZipArchive::new(File::open(archive).unwrap()).unwrap();
        (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect()
    }

    fn make_tree(root: &Path) {
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("a.txt"), "A").unwrap();
        fs::write(root.join("sub/b.txt"), "BB").unwrap();
    }

    #[test]
    fn test_single_file_entry_is_leaf_name() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("hello.txt");
        fs::write(&source, "hello, world\n").unwrap();

        let archive = temp.path().join("out/hello.zip");
        let spec = JobSpec::compress(&source, &archive, Algorithm::Zip, 5, true);
        compress(&spec, &mut quiet).unwrap();

        assert_eq!(entry_names(&archive), vec!["hello.txt"]);

        let mut zip = ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        let mut content = String::new();
        zip.by_index(0).unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "hello, world\n");
    }

    #[test]
    fn test_directory_entry_names() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("proj");
        make_tree(&root);

        let with_prefix = temp.path().join("with.zip");
        let spec = JobSpec::compress(&root, &with_prefix, Algorithm::Zip, 1, true);
        compress(&spec, &mut quiet).unwrap();
        let sep = MAIN_SEPARATOR;
        assert_eq!(
            entry_names(&with_prefix),
            vec![format!("proj{sep}a.txt"), format!("proj{sep}sub{sep}b.txt")]
        );

        let flat = temp.path().join("flat.zip");
        let spec = JobSpec::compress(&root, &flat, Algorithm::Zip, 1, false);
        compress(&spec, &mut quiet).unwrap();
        assert_eq!(
            entry_names(&flat),
            vec!["a.txt".to_string(), format!("sub{sep}b.txt")]
        );
    }

    #[test]
    fn test_progress_accumulates_across_entries() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("data");
        fs::create_dir_all(&root).unwrap();
        for i in 0..3 {
            fs::write(root.join(format!("f{i}.bin")), vec![i as u8; 20_000]).unwrap();
        }

        let archive = temp.path().join("data.zip");
        let spec = JobSpec::compress(&root, &archive, Algorithm::Zip, 5, false);
        let mut seen = Vec::new();
        compress(&spec, &mut |f: f64| -> Result<()> {
            seen.push(f);
            Ok(())
        })
        .unwrap();

        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(seen.last().copied(), Some(1.0));
    }

    #[test]
    fn test_roundtrip_directory() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("proj");
        make_tree(&root);

        let archive = temp.path().join("proj.zip");
        let spec = JobSpec::compress(&root, &archive, Algorithm::Zip, 9, true);
        compress(&spec, &mut quiet).unwrap();

        let out = temp.path().join("restored");
        let spec = JobSpec::decompress(&archive, &out, Algorithm::Zip);
        let ratio = decompress(&spec, &mut quiet).unwrap();

        assert!(ratio > 0.0);
        assert_eq!(fs::read_to_string(out.join("proj/a.txt")).unwrap(), "A");
        assert_eq!(fs::read_to_string(out.join("proj/sub/b.txt")).unwrap(), "BB");
    }

    #[test]
    fn test_empty_archive_ratio_is_one() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("empty.zip");
        let writer = ZipWriter::new(File::create(&archive).unwrap());
        writer.finish().unwrap();

        let out = temp.path().join("empty");
        let spec = JobSpec::decompress(&archive, &out, Algorithm::Zip);
        assert_eq!(decompress(&spec, &mut quiet).unwrap(), 1.0);
        assert!(out.is_dir());
    }

    #[test]
    fn test_traversal_rejected_before_writing() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("evil.zip");
        {
            let mut writer = ZipWriter::new(File::create(&archive).unwrap());
            let options = SimpleFileOptions::default();
            writer.start_file("ok.txt", options).unwrap();
            writer.write_all(b"fine").unwrap();
            writer.start_file("../evil.txt", options).unwrap();
            writer.write_all(b"pwned").unwrap();
            writer.finish().unwrap();
        }

        let out = temp.path().join("x/out");
        let spec = JobSpec::decompress(&archive, &out, Algorithm::Zip);
        let err = decompress(&spec, &mut quiet).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::UnsafeEntryPath);
        assert!(!out.exists());
        assert!(!temp.path().join("x/evil.txt").exists());
    }

    #[test]
    fn test_not_a_zip_is_codec_error() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("fake.zip");
        fs::write(&archive, b"PK but not really").unwrap();

        let spec = JobSpec::decompress(&archive, temp.path().join("out"), Algorithm::Zip);
        assert_eq!(decompress(&spec, &mut quiet).unwrap_err().kind(), ErrorKind::Codec);
    }

    #[test]
    fn test_cancel_leaves_archive_without_central_directory() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("big.bin");
        let data: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&source, &data).unwrap();

        let archive = temp.path().join("big.zip");
        let spec = JobSpec::compress(&source, &archive, Algorithm::Zip, 5, false);
        let err = compress(&spec, &mut |f: f64| -> Result<()> {
            if f >= 0.2 {
                Err(PackError::Cancelled)
            } else {
                Ok(())
            }
        })
        .unwrap_err();

        assert!(err.is_cancelled());
        assert!(archive.exists());
        assert!(ZipArchive::new(File::open(&archive).unwrap()).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_loop_rejected() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("looped");
        fs::create_dir_all(root.join("inner")).unwrap();
        fs::write(root.join("inner/file.txt"), "x").unwrap();
        std::os::unix::fs::symlink(&root, root.join("inner/back")).unwrap();

        let spec = JobSpec::compress(&root, temp.path().join("loop.zip"), Algorithm::Zip, 5, true);
        let err = compress(&spec, &mut quiet).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SymlinkLoop);
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_skipped() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("links");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("real.txt"), "real").unwrap();
        std::os::unix::fs::symlink(root.join("missing.txt"), root.join("broken")).unwrap();

        let archive = temp.path().join("links.zip");
        let spec = JobSpec::compress(&root, &archive, Algorithm::Zip, 5, false);
        compress(&spec, &mut quiet).unwrap();

        assert_eq!(entry_names(&archive), vec!["real.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_permissions_roundtrip() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let source = temp.path().join("run.sh");
        fs::write(&source, "#!/bin/sh\necho hi\n").unwrap();
        fs::set_permissions(&source, fs::Permissions::from_mode(0o750)).unwrap();

        let archive = temp.path().join("run.zip");
        compress(&JobSpec::compress(&source, &archive, Algorithm::Zip, 5, false), &mut quiet).unwrap();

        let out = temp.path().join("out");
        decompress(&JobSpec::decompress(&archive, &out, Algorithm::Zip), &mut quiet).unwrap();

        let mode = fs::metadata(out.join("run.sh")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    /// Архив из пустых stored-записей, где zip64-поле объявляет заданный распакованный размер
    fn zip64_with_declared_sizes(names: &[&str], declared: u64) -> Vec<u8> {
        let mut out = Vec::new();
        let mut central = Vec::new();

        for name in names {
            let offset = out.len() as u32;

            out.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
            out.extend_from_slice(&45u16.to_le_bytes()); // version needed
            out.extend_from_slice(&0u16.to_le_bytes()); // flags
            out.extend_from_slice(&0u16.to_le_bytes()); // stored
            out.extend_from_slice(&0u16.to_le_bytes()); // time
            out.extend_from_slice(&0x21u16.to_le_bytes()); // date
            out.extend_from_slice(&0u32.to_le_bytes()); // crc
            out.extend_from_slice(&0u32.to_le_bytes()); // compressed
            out.extend_from_slice(&0u32.to_le_bytes()); // uncompressed
            out.extend_from_slice(&(name.len() as u16).to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes()); // extra len
            out.extend_from_slice(name.as_bytes());

            central.extend_from_slice(&0x0201_4b50u32.to_le_bytes());
            central.extend_from_slice(&45u16.to_le_bytes()); // version made by
            central.extend_from_slice(&45u16.to_le_bytes()); // version needed
            central.extend_from_slice(&0u16.to_le_bytes()); // flags
            central.extend_from_slice(&0u16.to_le_bytes()); // stored
            central.extend_from_slice(&0u16.to_le_bytes()); // time
            central.extend_from_slice(&0x21u16.to_le_bytes()); // date
            central.extend_from_slice(&0u32.to_le_bytes()); // crc
            central.extend_from_slice(&0u32.to_le_bytes()); // compressed
            central.extend_from_slice(&u32::MAX.to_le_bytes()); // uncompressed -> zip64
            central.extend_from_slice(&(name.len() as u16).to_le_bytes());
            central.extend_from_slice(&12u16.to_le_bytes()); // extra len
            central.extend_from_slice(&0u16.to_le_bytes()); // comment len
            central.extend_from_slice(&0u16.to_le_bytes()); // disk
            central.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
            central.extend_from_slice(&0u32.to_le_bytes()); // external attrs
            central.extend_from_slice(&offset.to_le_bytes());
            central.extend_from_slice(name.as_bytes());
            central.extend_from_slice(&0x0001u16.to_le_bytes());
            central.extend_from_slice(&8u16.to_le_bytes());
            central.extend_from_slice(&declared.to_le_bytes());
        }

        let central_offset = out.len() as u32;
        out.extend_from_slice(&central);

        out.extend_from_slice(&0x0605_4b50u32.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&(names.len() as u16).to_le_bytes());
        out.extend_from_slice(&(names.len() as u16).to_le_bytes());
        out.extend_from_slice(&(central.len() as u32).to_le_bytes());
        out.extend_from_slice(&central_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }

    #[test]
    fn test_overflowing_declared_sizes_are_codec_error() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("huge.zip");
        fs::write(
            &archive,
            zip64_with_declared_sizes(&["a.bin", "b.bin"], 0x8000_0000_0000_0000),
        )
        .unwrap();

        let out = temp.path().join("out");
        let spec = JobSpec::decompress(&archive, &out, Algorithm::Zip);
        let err = decompress(&spec, &mut quiet).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Codec);
        assert!(!out.exists());
    }

    #[test]
    fn test_corrupted_payload_is_codec_error() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("crc.zip");
        let payload = b"stored payload that will be damaged on disk";
        {
            let mut writer = ZipWriter::new(File::create(&archive).unwrap());
            let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
            writer.start_file("note.txt", options).unwrap();
            writer.write_all(payload).unwrap();
            writer.finish().unwrap();
        }

        let mut bytes = fs::read(&archive).unwrap();
        let at = bytes
            .windows(payload.len())
            .position(|w| w == payload)
            .unwrap();
        bytes[at + 5] ^= 0xFF;
        fs::write(&archive, &bytes).unwrap();

        let out = temp.path().join("out");
        let spec = JobSpec::decompress(&archive, &out, Algorithm::Zip);
        let err = decompress(&spec, &mut quiet).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Codec);
        // Частичный вывод не удаляется
        assert!(out.join("note.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_file_counts_toward_progress() {
        let temp = TempDir::new().unwrap();
        let outside = temp.path().join("outside.txt");
        fs::write(&outside, "linked content\n".repeat(5000)).unwrap();

        let root = temp.path().join("with_link");
        fs::create_dir_all(&root).unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link.txt")).unwrap();

        let archive = temp.path().join("with_link.zip");
        let spec = JobSpec::compress(&root, &archive, Algorithm::Zip, 5, false);
        let mut seen = Vec::new();
        let ratio = compress(&spec, &mut |f: f64| -> Result<()> {
            seen.push(f);
            Ok(())
        })
        .unwrap();

        assert!(seen[0] < 1.0);
        assert_eq!(seen.last().copied(), Some(1.0));
        assert!(ratio < 1.0);
        assert_eq!(entry_names(&archive), vec!["link.txt"]);
    }

    #[test]
    fn test_leaf_name_of_dot() {
        assert_eq!(leaf_name(Path::new("dir/file.txt")), "file.txt");
        assert!(!leaf_name(Path::new(".")).is_empty());
    }
}
