//! Статистика задания - размер, коэффициент, экономия, скорость

use std::time::Duration;

use crate::codec::Direction;
use crate::utils::format_size;

/// Итоги успешного задания
#[derive(Clone, Debug)]
pub struct CompressionReport {
    pub direction: Direction,
    /// Размер источника (для папки - рекурсивный)
    pub input_size: u64,
    /// Коэффициент из `JobState::Succeeded`
    pub ratio: f64,
    pub elapsed: Duration,
}

impl CompressionReport {
    pub fn new(direction: Direction, input_size: u64, ratio: f64, elapsed: Duration) -> Self {
        Self {
            direction,
            input_size,
            ratio,
            elapsed,
        }
    }

    /// Размер результата, восстановленный по коэффициенту
    pub fn output_size(&self) -> u64 {
        (self.input_size as f64 * self.ratio).round() as u64
    }

    pub fn ratio_percent(&self) -> f64 {
        self.ratio * 100.0
    }

    /// Экономия места, % (для сжатия)
    pub fn space_saved_percent(&self) -> f64 {
        (1.0 - self.ratio) * 100.0
    }

    /// Скорость обработки входа (байт/сек)
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs < 0.001 {
            return 0.0;
        }
        self.input_size as f64 / secs
    }

    /// Строки для вывода пользователю
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = match self.direction {
            Direction::Compress => vec![
                format!("Original size: {}", format_size(self.input_size)),
                format!("Compressed size: {}", format_size(self.output_size())),
                format!("Compression ratio: {:.2}%", self.ratio_percent()),
                format!("Space saved: {:.2}%", self.space_saved_percent()),
            ],
            Direction::Decompress => vec![
                format!("Archive size: {}", format_size(self.input_size)),
                format!("Extracted size: {}", format_size(self.output_size())),
                format!("Expansion ratio: {:.2}x", self.ratio),
            ],
        };
        lines.push(format!(
            "Time: {} ({})",
            format_duration(self.elapsed),
            format_speed(self.throughput())
        ));
        lines
    }
}

/// Форматировать скорость
pub fn format_speed(bytes_per_sec: f64) -> String {
    if bytes_per_sec < 1024.0 {
        format!("{:.0} B/s", bytes_per_sec)
    } else if bytes_per_sec < 1024.0 * 1024.0 {
        format!("{:.1} KB/s", bytes_per_sec / 1024.0)
    } else if bytes_per_sec < 1024.0 * 1024.0 * 1024.0 {
        format!("{:.1} MB/s", bytes_per_sec / 1024.0 / 1024.0)
    } else {
        format!("{:.2} GB/s", bytes_per_sec / 1024.0 / 1024.0 / 1024.0)
    }
}

/// Форматировать длительность
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_speed() {
        assert_eq!(format_speed(0.0), "0 B/s");
        assert_eq!(format_speed(1023.0), "1023 B/s");
        assert_eq!(format_speed(1500.0), "1.5 KB/s");
        assert_eq!(format_speed(1500000.0), "1.4 MB/s");
        assert_eq!(format_speed(2.5 * 1024.0 * 1024.0 * 1024.0), "2.50 GB/s");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m");
    }

    #[test]
    fn test_compression_summary() {
        let report = CompressionReport::new(
            Direction::Compress,
            1024 * 1024,
            0.25,
            Duration::from_secs(2),
        );

        let lines = report.summary_lines();
        assert_eq!(lines[0], "Original size: 1 MB");
        assert_eq!(lines[1], "Compressed size: 256 KB");
        assert_eq!(lines[2], "Compression ratio: 25.00%");
        assert_eq!(lines[3], "Space saved: 75.00%");
        assert_eq!(lines[4], "Time: 2s (512.0 KB/s)");
    }

    #[test]
    fn test_incompressible_data_saves_negative_space() {
        let report = CompressionReport::new(Direction::Compress, 1000, 1.02, Duration::ZERO);
        assert!((report.space_saved_percent() + 2.0).abs() < 1e-9);
        assert_eq!(report.throughput(), 0.0);
    }

    #[test]
    fn test_decompression_summary() {
        let report = CompressionReport::new(Direction::Decompress, 2048, 4.0, Duration::from_secs(1));
        let lines = report.summary_lines();
        assert_eq!(lines[0], "Archive size: 2 KB");
        assert_eq!(lines[1], "Extracted size: 8 KB");
        assert_eq!(lines[2], "Expansion ratio: 4.00x");
    }
}
