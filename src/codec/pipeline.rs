//! Общий потоковый конвейер: буфер 8 КБ, прогресс, запечатывание вывода

use std::cell::Cell;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::rc::Rc;

use crate::error::{PackError, Result};

/// Размер окна передачи для всех циклов чтения/записи
pub const BUFFER_SIZE: usize = 8 * 1024;

/// Получатель прогресса. Вызывается после каждой записи буфера.
///
/// Возврат `Err(PackError::Cancelled)` прерывает операцию до следующей записи.
pub trait ProgressSink {
    fn report(&mut self, fraction: f64) -> Result<()>;
}

impl<F> ProgressSink for F
where
    F: FnMut(f64) -> Result<()>,
{
    fn report(&mut self, fraction: f64) -> Result<()> {
        self(fraction)
    }
}

/// Откуда читаем: из обычного файла или из декодера
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadSide {
    Plain,
    Decoder,
}

/// Копирование через фиксированный буфер с колбэком после каждой записи.
///
/// `on_chunk` получает размер только что записанного куска.
pub(crate) fn pump<R, W, F>(
    reader: &mut R,
    input: &Path,
    side: ReadSide,
    writer: &mut W,
    output: &Path,
    mut on_chunk: F,
) -> Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
    F: FnMut(u64) -> Result<()>,
{
    let mut buffer = [0u8; BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(match side {
                    ReadSide::Plain => PackError::from_io(input, e),
                    ReadSide::Decoder => PackError::from_decode(input, e),
                })
            }
        };

        writer
            .write_all(&buffer[..bytes_read])
            .map_err(|e| PackError::from_io(output, e))?;
        total += bytes_read as u64;

        on_chunk(bytes_read as u64)?;
    }

    Ok(total)
}

/// Доля выполнения (не больше 1.0). При нулевом объёме прогресс не публикуется.
pub(crate) fn report(sink: &mut dyn ProgressSink, done: u64, total: u64) -> Result<()> {
    if total == 0 {
        return Ok(());
    }
    sink.report((done as f64 / total as f64).min(1.0))
}

/// Коэффициент числитель/знаменатель; для пустого знаменателя 0.0
pub(crate) fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Создать недостающие родительские папки
pub(crate) fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| PackError::from_io(parent, e))?;
        }
    }
    Ok(())
}

pub(crate) fn open_input(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| PackError::from_io(path, e))
}

pub(crate) fn create_output(path: &Path) -> Result<File> {
    File::create(path).map_err(|e| PackError::from_io(path, e))
}

pub(crate) fn file_len(path: &Path) -> Result<u64> {
    fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| PackError::from_io(path, e))
}

/// Сбросить буфер и закрыть файл вывода
pub(crate) fn close_output(writer: BufWriter<File>, path: &Path) -> Result<()> {
    writer
        .into_inner()
        .map_err(|e| PackError::from_io(path, e.into_error()))?;
    Ok(())
}

/// Флаг "вывод запечатан". Общий для кодека и обёртки писателя.
#[derive(Debug, Clone, Default)]
pub(crate) struct Seal(Rc<Cell<bool>>);

impl Seal {
    pub fn close(&self) {
        self.0.set(true);
    }

    pub fn is_closed(&self) -> bool {
        self.0.get()
    }
}

/// Писатель, который после `Seal::close` молча отбрасывает всё, что в него пишут.
///
/// Кодировщики flate2/bzip2/zip дописывают трейлер или центральный каталог в `Drop`.
/// После отмены или ошибки эти байты до файла не доходят, и частичный файл не становится валидным архивом.
pub(crate) struct SealedWriter<W> {
    inner: W,
    seal: Seal,
}

/// Стандартный писатель вывода кодеков
pub(crate) type OutputWriter = SealedWriter<BufWriter<File>>;

impl<W> SealedWriter<W> {
    pub fn new(inner: W, seal: Seal) -> Self {
        Self { inner, seal }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for SealedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.seal.is_closed() {
            return Ok(buf.len());
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.seal.is_closed() {
            return Ok(());
        }
        self.inner.flush()
    }
}

impl<W: Seek> Seek for SealedWriter<W> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if self.seal.is_closed() {
            return Ok(0);
        }
        self.inner.seek(pos)
    }
}

/// Читатель, считающий байты, забранные из файла (позиция сжатого входа)
pub(crate) struct CountingReader<R> {
    inner: R,
    consumed: Rc<Cell<u64>>,
}

impl<R> CountingReader<R> {
    pub fn new(inner: R) -> (Self, Rc<Cell<u64>>) {
        let consumed = Rc::new(Cell::new(0));
        (
            Self {
                inner,
                consumed: Rc::clone(&consumed),
            },
            consumed,
        )
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.consumed.set(self.consumed.get() + n as u64);
        Ok(n)
    }
}
