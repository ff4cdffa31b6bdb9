//! Исполнитель одного задания: состояние, прогресс, статус, отмена

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use super::events::JobEvent;
use super::lock;
use crate::codec::{self, JobSpec};
use crate::error::{PackError, Result};

/// Порядковый номер задания в хосте
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Состояние задания. Финальные состояния не меняются.
#[derive(Debug, Clone)]
pub enum JobState {
    Ready,
    Running,
    /// Коэффициент сжатия
    Succeeded(f64),
    Failed(Arc<PackError>),
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded(_) | Self::Failed(_) | Self::Cancelled)
    }

    /// Коэффициент, только для Succeeded
    pub fn ratio(&self) -> Option<f64> {
        match self {
            Self::Succeeded(ratio) => Some(*ratio),
            _ => None,
        }
    }

    /// Ошибка, только для Failed
    pub fn error(&self) -> Option<&PackError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready => "Ready",
            Self::Running => "Running",
            Self::Succeeded(_) => "Succeeded",
            Self::Failed(_) => "Failed",
            Self::Cancelled => "Cancelled",
        }
    }

    fn can_become(&self, next: &JobState) -> bool {
        matches!(
            (self, next),
            (Self::Ready, Self::Running)
                | (Self::Ready, Self::Cancelled)
                | (Self::Running, Self::Succeeded(_))
                | (Self::Running, Self::Failed(_))
                | (Self::Running, Self::Cancelled)
        )
    }
}

struct Shared {
    spec: JobSpec,
    cancel_requested: AtomicBool,
    progress: watch::Sender<f64>,
    message: watch::Sender<String>,
    state: watch::Sender<JobState>,
    /// Не больше одного наблюдателя; новая привязка заменяет старую
    observer: Mutex<Option<mpsc::UnboundedSender<JobEvent>>>,
}

/// Задание сжатия/распаковки с наблюдаемыми значениями.
///
/// Клонирование даёт ещё одну ручку того же задания.
#[derive(Clone)]
pub struct JobRunner {
    shared: Arc<Shared>,
}

impl fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRunner")
            .field("spec", &self.shared.spec)
            .field("state", &self.state().name())
            .field("progress", &self.progress())
            .finish()
    }
}

impl JobRunner {
    pub fn new(spec: JobSpec) -> Self {
        Self {
            shared: Arc::new(Shared {
                spec,
                cancel_requested: AtomicBool::new(false),
                progress: watch::Sender::new(0.0),
                message: watch::Sender::new(String::new()),
                state: watch::Sender::new(JobState::Ready),
                observer: Mutex::new(None),
            }),
        }
    }

    pub fn spec(&self) -> &JobSpec {
        &self.shared.spec
    }

    pub fn progress(&self) -> f64 {
        *self.shared.progress.borrow()
    }

    pub fn message(&self) -> String {
        self.shared.message.borrow().clone()
    }

    pub fn state(&self) -> JobState {
        self.shared.state.borrow().clone()
    }

    /// Коэффициент сжатия после успеха
    pub fn result(&self) -> Option<f64> {
        self.shared.state.borrow().ratio()
    }

    /// Ошибка после провала
    pub fn error(&self) -> Option<Arc<PackError>> {
        match &*self.shared.state.borrow() {
            JobState::Failed(err) => Some(Arc::clone(err)),
            _ => None,
        }
    }

    /// Подписаться на события. Сразу приходит снимок текущих значений.
    pub fn bind(&self, observer: mpsc::UnboundedSender<JobEvent>) {
        let mut slot = lock(&self.shared.observer);
        let snapshot = [
            JobEvent::Progress(self.progress()),
            JobEvent::Message(self.message()),
            JobEvent::StateChanged(self.state()),
        ];
        for event in snapshot {
            if observer.send(event).is_err() {
                // Новый получатель уже закрыт, старый всё равно отвязываем
                *slot = None;
                return;
            }
        }
        *slot = Some(observer);
    }

    pub fn unbind(&self) {
        lock(&self.shared.observer).take();
    }

    /// Запросить отмену. Повторный вызов и вызов после завершения ничего не делают.
    pub fn cancel(&self) {
        if self.state().is_terminal() {
            return;
        }
        if self.shared.cancel_requested.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("Cancellation requested: {}", self.shared.spec.source.display());

        // Ещё не запущено - сразу в Cancelled, файловая система не трогается.
        // Запущенное задание заметит флаг на следующей записи буфера.
        if self.cancel_if_ready() {
            self.set_message(format!("{} cancelled", self.shared.spec.direction.noun()));
        }
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.shared.cancel_requested.load(Ordering::SeqCst)
    }

    /// Выполнить задание в текущем потоке. Возвращает финальное состояние.
    ///
    /// Повторный запуск не выполняет работу заново.
    pub fn run(&self) -> JobState {
        if !self.transition(JobState::Running) {
            return self.state();
        }

        let spec = &self.shared.spec;
        let noun = spec.direction.noun();
        self.set_message(format!("Starting {}...", noun.to_lowercase()));

        let mut streaming = false;
        let mut sink = |fraction: f64| -> Result<()> {
            if self.is_cancel_requested() {
                return Err(PackError::Cancelled);
            }
            if !streaming {
                streaming = true;
                self.set_message(format!("{} file...", spec.direction.gerund()));
            }
            self.set_progress(fraction);
            Ok(())
        };

        let next = match codec::run(spec, &mut sink) {
            Ok(ratio) => {
                self.set_progress(1.0);
                self.set_message(format!("{noun} complete"));
                info!("{} complete: {}, ratio {:.4}", noun, spec.destination.display(), ratio);
                JobState::Succeeded(ratio)
            }
            Err(err) if err.is_cancelled() => {
                self.set_message(format!("{noun} cancelled"));
                info!("{} cancelled: {}", noun, spec.source.display());
                JobState::Cancelled
            }
            Err(err) => {
                error!("{} failed: {}", noun, err);
                self.set_message(format!("{noun} failed: {err}"));
                JobState::Failed(Arc::new(err))
            }
        };

        self.transition(next);
        self.state()
    }

    /// Дождаться финального состояния
    pub async fn finished(&self) -> JobState {
        let mut rx = self.shared.state.subscribe();
        let finished = rx
            .wait_for(|state| state.is_terminal())
            .await
            .map(|state| state.clone());
        finished.unwrap_or_else(|_| self.state())
    }

    fn emit(&self, event: JobEvent) {
        let mut slot = lock(&self.shared.observer);
        if let Some(observer) = slot.as_ref() {
            if observer.send(event).is_err() {
                // Получатель закрыт
                *slot = None;
            }
        }
    }

    fn set_progress(&self, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0);
        let advanced = self.shared.progress.send_if_modified(|current| {
            if fraction > *current {
                *current = fraction;
                true
            } else {
                false
            }
        });
        if advanced {
            self.emit(JobEvent::Progress(fraction));
        }
    }

    fn set_message(&self, message: String) {
        self.shared.message.send_replace(message.clone());
        self.emit(JobEvent::Message(message));
    }

    fn transition(&self, next: JobState) -> bool {
        let changed = self.shared.state.send_if_modified(|current| {
            if current.can_become(&next) {
                *current = next.clone();
                true
            } else {
                false
            }
        });
        if changed {
            self.emit(JobEvent::StateChanged(next));
        }
        changed
    }

    fn cancel_if_ready(&self) -> bool {
        let changed = self.shared.state.send_if_modified(|current| {
            if matches!(current, JobState::Ready) {
                *current = JobState::Cancelled;
                true
            } else {
                false
            }
        });
        if changed {
            self.emit(JobEvent::StateChanged(JobState::Cancelled));
        }
        changed
    }
}
