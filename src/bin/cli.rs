//! Toolza Packer CLI - сжатие и распаковка из консоли

use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use toolza_packer::codec::{Algorithm, Direction, JobSpec, DEFAULT_LEVEL};
use toolza_packer::history::{HistoryEntry, JobHistory, Outcome};
use toolza_packer::inspect;
use toolza_packer::job::{JobEvent, JobHost, JobRunner, JobState};
use toolza_packer::stats::CompressionReport;
use toolza_packer::utils::{format_size, truncate_path};

/// Деления полосы прогресса
const PROGRESS_SCALE: u64 = 1000;

/// Код выхода после Ctrl+C
const EXIT_CANCELLED: i32 = 130;

/// Алгоритм для CLI
#[derive(Clone, Copy, Debug, ValueEnum, Default)]
enum AlgorithmArg {
    /// ZIP - файлы и папки
    #[default]
    Zip,
    /// GZIP - быстрый, один файл
    Gzip,
    /// BZIP2 - сильное сжатие, один файл
    Bzip2,
}

impl From<AlgorithmArg> for Algorithm {
    fn from(a: AlgorithmArg) -> Self {
        match a {
            AlgorithmArg::Zip => Algorithm::Zip,
            AlgorithmArg::Gzip => Algorithm::Gzip,
            AlgorithmArg::Bzip2 => Algorithm::Bzip2,
        }
    }
}

#[derive(Parser)]
#[command(name = "toolza_packer")]
#[command(author = "toolza")]
#[command(version = "1.0")]
#[command(about = "Streaming ZIP / GZIP / BZIP2 compressor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Подробный лог (debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Не записывать задание в историю
    #[arg(long, global = true)]
    no_history: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Сжать файл или папку
    Compress {
        /// Файл или папка
        source: PathBuf,

        /// Путь архива (по умолчанию <source>.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Алгоритм сжатия
        #[arg(short, long, value_enum, default_value_t = AlgorithmArg::Zip)]
        algorithm: AlgorithmArg,

        /// Уровень сжатия 1..9
        #[arg(short, long, default_value_t = DEFAULT_LEVEL as i64, allow_negative_numbers = true)]
        level: i64,

        /// Не добавлять имя папки в начало путей архива
        #[arg(long)]
        flat: bool,
    },

    /// Распаковать архив
    Decompress {
        /// Архив
        archive: PathBuf,

        /// Куда распаковать (по умолчанию рядом с архивом)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Алгоритм (по умолчанию по расширению)
        #[arg(short, long, value_enum)]
        algorithm: Option<AlgorithmArg>,
    },

    /// Информация о файлах и папках
    Info {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// История заданий
    History {
        /// Очистить историю
        #[arg(long)]
        clear: bool,

        /// Сколько последних записей показать
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let record = !cli.no_history;
    let code = match cli.command {
        Commands::Compress { source, output, algorithm, level, flat } => {
            let algorithm = Algorithm::from(algorithm);
            let output = output.unwrap_or_else(|| inspect::default_compression_target(&source, algorithm));
            if !(1..=9).contains(&level) {
                println!("⚠️  Level {} is out of range, clamped to 1..9", level);
            }
            let spec = JobSpec::compress(source, output, algorithm, level, !flat);
            run_job(spec, record).await
        }
        Commands::Decompress { archive, output, algorithm } => {
            let algorithm = algorithm
                .map(Algorithm::from)
                .unwrap_or_else(|| inspect::algorithm_for(&archive));
            let output = output.unwrap_or_else(|| inspect::default_decompression_target(&archive));
            let spec = JobSpec::decompress(archive, output, algorithm);
            run_job(spec, record).await
        }
        Commands::Info { paths } => show_info(&paths),
        Commands::History { clear, limit } => show_history(clear, limit),
    };

    std::process::exit(code);
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with_writer(std::io::stderr)
        .init();
}

async fn run_job(spec: JobSpec, record: bool) -> i32 {
    let input_size = inspect::total_size(&spec.source).unwrap_or(0);

    println!();
    match spec.direction {
        Direction::Compress => {
            println!("🗜  {} → {}", spec.source.display(), spec.destination.display());
            println!("   Algorithm: {}", spec.algorithm);
            println!("   Level: {}", spec.level.get());
            if spec.algorithm.supports_directories() && spec.source.is_dir() {
                if spec.preserve_structure {
                    println!("📂 Folder structure: kept under '{}'", leaf(&spec.source));
                } else {
                    println!("📂 Folder structure: flat (contents only)");
                }
            }
        }
        Direction::Decompress => {
            println!("📦 {} → {}", spec.source.display(), spec.destination.display());
            println!("   Algorithm: {}", spec.algorithm);
        }
    }
    println!("   Size: {}", format_size(input_size));
    println!();

    let host = JobHost::new();
    let runner = JobRunner::new(spec.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    runner.bind(tx);

    let started = Instant::now();
    if let Err(e) = host.submit(runner.clone()) {
        eprintln!("❌ {}", e);
        return 1;
    }

    let pb = ProgressBar::new(PROGRESS_SCALE);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {msg}")
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(JobEvent::Progress(fraction)) => {
                    pb.set_position((fraction * PROGRESS_SCALE as f64) as u64);
                }
                Some(JobEvent::Message(message)) => pb.set_message(message),
                Some(JobEvent::StateChanged(state)) if state.is_terminal() => break,
                Some(JobEvent::StateChanged(_)) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                pb.println("⏹  Cancelling...");
                if host.current().is_some() {
                    host.cancel_current();
                } else {
                    runner.cancel();
                }
            }
        }
    }

    let state = runner.finished().await;
    let elapsed = started.elapsed();
    pb.finish_and_clear();

    let code = match &state {
        JobState::Succeeded(ratio) => {
            println!("✅ {}", runner.message());
            let report = CompressionReport::new(spec.direction, input_size, *ratio, elapsed);
            for line in report.summary_lines() {
                println!("   {}", line);
            }
            0
        }
        JobState::Failed(_) => {
            eprintln!("❌ {}", runner.message());
            1
        }
        _ => {
            println!("⏹  {}", runner.message());
            if spec.destination.exists() {
                println!("   Partial output left at {}", truncate_path(&spec.destination, 60));
            }
            EXIT_CANCELLED
        }
    };

    if record {
        record_history(&spec, &state, input_size, elapsed.as_secs_f64());
    }

    host.join();
    code
}

fn record_history(spec: &JobSpec, state: &JobState, input_size: u64, duration_secs: f64) {
    let outcome = match state {
        JobState::Succeeded(_) => Outcome::Succeeded,
        JobState::Failed(_) => Outcome::Failed,
        _ => Outcome::Cancelled,
    };

    let mut history = JobHistory::load();
    history.add(HistoryEntry::new(
        spec.direction,
        spec.algorithm,
        spec.source.clone(),
        spec.destination.clone(),
        input_size,
        state.ratio(),
        duration_secs,
        outcome,
        state.error().map(|e| e.to_string()),
    ));
    if let Err(e) = history.save() {
        warn!("Cannot save history: {}", e);
    }
}

fn show_info(paths: &[PathBuf]) -> i32 {
    let mut code = 0;
    for path in paths {
        match inspect::inspect(path) {
            Ok(info) => {
                println!("📄 {}", info.name);
                println!("   Path: {}", info.path.display());
                println!("   Type: {}", info.file_type);
                println!("   Size: {}", format_size(info.size));
                if inspect::is_likely_compressed(path) {
                    let algorithm = inspect::algorithm_for(path);
                    println!("   Compressed: yes ({})", algorithm.name());
                    println!(
                        "   Extracts to: {}",
                        inspect::default_decompression_target(&info.path).display()
                    );
                } else {
                    println!(
                        "   Compresses to: {}",
                        inspect::default_compression_target(&info.path, Algorithm::Zip).display()
                    );
                }
                println!();
            }
            Err(e) => {
                eprintln!("❌ {}", e);
                code = 1;
            }
        }
    }
    code
}

fn show_history(clear: bool, limit: usize) -> i32 {
    let mut history = JobHistory::load();

    if clear {
        history.clear();
        return match history.save() {
            Ok(()) => {
                println!("🧹 History cleared");
                0
            }
            Err(e) => {
                eprintln!("❌ Cannot save history: {}", e);
                1
            }
        };
    }

    if history.entries.is_empty() {
        println!("History is empty");
        return 0;
    }

    let totals = history.totals();
    println!(
        "📊 Jobs: {} ({} ok, {} failed, {} cancelled)",
        totals.total_jobs, totals.successful_jobs, totals.failed_jobs, totals.cancelled_jobs
    );
    println!(
        "   Compressed: {}, decompressed: {}",
        format_size(totals.bytes_compressed),
        format_size(totals.bytes_decompressed)
    );
    println!();

    for entry in history.entries.iter().take(limit) {
        let icon = match entry.outcome {
            Outcome::Succeeded => "✅",
            Outcome::Failed => "❌",
            Outcome::Cancelled => "⏹ ",
        };
        let ratio = entry
            .ratio
            .map(|r| format!(" {:.2}%", r * 100.0))
            .unwrap_or_default();
        println!(
            "{} {} {} {} {} ({}, {}){}",
            icon,
            entry.formatted_time(),
            entry.direction.noun(),
            entry.algorithm.name(),
            truncate_path(&entry.source, 40),
            entry.formatted_size(),
            entry.formatted_duration(),
            ratio
        );
        if let Some(err) = &entry.error {
            println!("     {}", err);
        }
    }
    0
}

fn leaf(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
