//! Задания сжатия: исполнитель с наблюдаемым состоянием и однопоточный хост

mod events;
mod host;
mod runner;

pub use events::JobEvent;
pub use host::JobHost;
pub use runner::{JobId, JobRunner, JobState};

use std::sync::{Mutex, MutexGuard};

/// Захват мьютекса с восстановлением после паники другого потока
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
