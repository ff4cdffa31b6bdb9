//! Вспомогательные утилиты

use std::path::Path;

const UNITS: [&str; 7] = ["B", "KB", "MB", "GB", "TB", "PB", "EB"];

/// Обрезает путь до max_chars символов (не байт!), сохраняя конец.
/// Если путь длиннее - показывает "..." и конец пути
pub fn truncate_path(path: &Path, max_chars: usize) -> String {
    let s = path.display().to_string();
    let char_count = s.chars().count();
    if char_count <= max_chars {
        s
    } else {
        let skip = char_count.saturating_sub(max_chars.saturating_sub(3));
        format!("...{}", s.chars().skip(skip).collect::<String>())
    }
}

/// Размер в человекочитаемом виде: основание 1024, до двух знаков после точки,
/// разряды через запятую. `1023` → `"1,023 B"`, `1536` → `"1.5 KB"`.
pub fn format_size(size: u64) -> String {
    if size == 0 {
        return "0 B".to_string();
    }

    let mut unit = 0;
    let mut divisor = 1u64;
    while unit + 1 < UNITS.len() && size / divisor >= 1024 {
        divisor *= 1024;
        unit += 1;
    }

    let value = size as f64 / divisor as f64;
    format!("{} {}", group_digits(value), UNITS[unit])
}

/// "12345.6" → "12,345.6"; лишние нули дробной части отбрасываются
fn group_digits(value: f64) -> String {
    let fixed = format!("{value:.2}");
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let frac_part = frac_part.trim_end_matches('0');

    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*c);
    }

    if frac_part.is_empty() {
        grouped
    } else {
        format!("{grouped}.{frac_part}")
    }
}
