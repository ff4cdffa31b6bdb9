//! История заданий - сохранение и загрузка

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::codec::{Algorithm, Direction};

/// Максимальное количество записей в истории
pub const MAX_HISTORY_ENTRIES: usize = 100;

/// Чем закончилось задание
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Failed,
    Cancelled,
}

/// Запись в истории
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Временная метка (Unix timestamp)
    pub timestamp: u64,
    pub direction: Direction,
    pub algorithm: Algorithm,
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Размер входа в байтах
    pub input_size: u64,
    /// Коэффициент (только для успешных)
    pub ratio: Option<f64>,
    pub duration_secs: f64,
    pub outcome: Outcome,
    /// Сообщение об ошибке (если есть)
    pub error: Option<String>,
}

impl HistoryEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        direction: Direction,
        algorithm: Algorithm,
        source: PathBuf,
        destination: PathBuf,
        input_size: u64,
        ratio: Option<f64>,
        duration_secs: f64,
        outcome: Outcome,
        error: Option<String>,
    ) -> Self {
        Self {
            timestamp: current_timestamp(),
            direction,
            algorithm,
            source,
            destination,
            input_size,
            ratio,
            duration_secs,
            outcome,
            error,
        }
    }

    /// Дата/время в UTC: `ДД.ММ.ГГГГ ЧЧ:ММ`
    pub fn formatted_time(&self) -> String {
        let days = (self.timestamp / 86_400) as i64;
        let day_secs = self.timestamp % 86_400;
        let (year, month, day) = civil_from_days(days);

        format!(
            "{:02}.{:02}.{} {:02}:{:02}",
            day,
            month,
            year,
            day_secs / 3600,
            (day_secs % 3600) / 60
        )
    }

    /// Форматировать размер
    pub fn formatted_size(&self) -> String {
        crate::utils::format_size(self.input_size)
    }

    /// Форматировать длительность
    pub fn formatted_duration(&self) -> String {
        crate::stats::format_duration(std::time::Duration::from_secs_f64(self.duration_secs.max(0.0)))
    }
}

/// История заданий, новые записи в начале
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct JobHistory {
    pub entries: Vec<HistoryEntry>,
}

impl JobHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Загрузить историю из стандартного места
    pub fn load() -> Self {
        Self::load_from(&history_file_path())
    }

    /// Загрузить историю из файла. Отсутствующий или битый файл - пустая история.
    pub fn load_from(path: &Path) -> Self {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(_) => return Self::new(),
        };
        match serde_json::from_str(&contents) {
            Ok(history) => history,
            Err(e) => {
                debug!("Ignoring unreadable history {}: {}", path.display(), e);
                Self::new()
            }
        }
    }

    /// Сохранить историю в стандартное место
    pub fn save(&self) -> io::Result<()> {
        self.save_to(&history_file_path())
    }

    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
    }

    /// Добавить запись (в начало, не больше MAX_HISTORY_ENTRIES)
    pub fn add(&mut self, entry: HistoryEntry) {
        self.entries.insert(0, entry);
        self.entries.truncate(MAX_HISTORY_ENTRIES);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Общая статистика
    pub fn totals(&self) -> HistoryTotals {
        let mut totals = HistoryTotals {
            total_jobs: self.entries.len(),
            ..Default::default()
        };

        for entry in &self.entries {
            match entry.outcome {
                Outcome::Succeeded => {
                    totals.successful_jobs += 1;
                    match entry.direction {
                        Direction::Compress => totals.bytes_compressed += entry.input_size,
                        Direction::Decompress => totals.bytes_decompressed += entry.input_size,
                    }
                }
                Outcome::Failed => totals.failed_jobs += 1,
                Outcome::Cancelled => totals.cancelled_jobs += 1,
            }
        }

        totals
    }
}

/// Статистика истории
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HistoryTotals {
    pub total_jobs: usize,
    pub successful_jobs: usize,
    pub failed_jobs: usize,
    pub cancelled_jobs: usize,
    pub bytes_compressed: u64,
    pub bytes_decompressed: u64,
}

/// Путь к файлу истории
pub fn history_file_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("toolza_packer")
        .join("history.json")
}

/// Текущий Unix timestamp
fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Дни от 1970-01-01 → (год, месяц, день) по григорианскому календарю
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}
