//! Toolza Packer - потоковое сжатие и распаковка ZIP / GZIP / BZIP2
//!
//! Общая библиотека для CLI и будущих оболочек.
//!
//! # Модули
//! - `codec` - движок сжатия (zip, gz, bz2), буфер 8 КБ, прогресс и отмена
//! - `job` - исполнитель задания с наблюдаемым состоянием и однопоточный хост
//! - `inspect` - анализ путей, выбор алгоритма и пути вывода
//! - `error` - ошибки библиотеки
//! - `utils` - форматирование размеров и путей
//! - `stats` - итоги задания (коэффициент, экономия, скорость)
//! - `history` - история заданий

pub mod codec;
pub mod error;
pub mod history;
pub mod inspect;
pub mod job;
pub mod stats;
pub mod utils;

pub use codec::{Algorithm, CompressionLevel, Direction, JobSpec, ProgressSink};
pub use error::{ErrorKind, PackError, Result};
pub use job::{JobEvent, JobHost, JobId, JobRunner, JobState};
