//! Однопоточный хост заданий: очередь, текущее задание, завершение

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::lock;
use super::runner::{JobId, JobRunner};
use crate::error::{PackError, Result};

struct HostShared {
    /// Задание, которое сейчас выполняет рабочий поток
    current: Mutex<Option<JobRunner>>,
    /// Принятые, но ещё не взятые в работу
    pending: AtomicUsize,
    shutting_down: AtomicBool,
}

/// Один рабочий поток, задания выполняются строго по очереди.
///
/// `submit` не блокирует вызывающего.
pub struct JobHost {
    queue: Mutex<Option<mpsc::UnboundedSender<JobRunner>>>,
    shared: Arc<HostShared>,
    next_id: AtomicU64,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl JobHost {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(HostShared {
            current: Mutex::new(None),
            pending: AtomicUsize::new(0),
            shutting_down: AtomicBool::new(false),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("toolza-packer-worker".to_string())
            .spawn(move || worker_loop(rx, worker_shared));

        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Cannot spawn worker thread: {}", e);
                None
            }
        };

        Self {
            queue: Mutex::new(worker.as_ref().map(|_| tx)),
            shared,
            next_id: AtomicU64::new(1),
            worker: Mutex::new(worker),
        }
    }

    /// Поставить задание в очередь
    pub fn submit(&self, runner: JobRunner) -> Result<JobId> {
        let queue = lock(&self.queue);
        let Some(sender) = queue.as_ref() else {
            return Err(PackError::HostShutDown);
        };

        let id = JobId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        if sender.send(runner).is_err() {
            self.shared.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(PackError::HostShutDown);
        }

        debug!("Job {} queued", id);
        Ok(id)
    }

    /// Отменить выполняемое задание (если есть)
    pub fn cancel_current(&self) {
        if let Some(runner) = lock(&self.shared.current).as_ref() {
            runner.cancel();
        }
    }

    pub fn current(&self) -> Option<JobRunner> {
        lock(&self.shared.current).clone()
    }

    /// Ничего не выполняется и очередь пуста
    pub fn is_idle(&self) -> bool {
        let current = lock(&self.shared.current);
        current.is_none() && self.shared.pending.load(Ordering::SeqCst) == 0
    }

    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shutting_down.load(Ordering::SeqCst)
    }

    /// Отменить текущее, отбросить очередь, запретить новые задания. Не блокирует.
    pub fn shutdown(&self) {
        if self.shared.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down job host");

        // Закрытие канала завершит рабочий цикл после разбора очереди
        lock(&self.queue).take();
        self.cancel_current();
    }

    /// Завершить работу и дождаться рабочего потока
    pub fn join(&self) {
        self.shutdown();
        if let Some(handle) = lock(&self.worker).take() {
            if handle.join().is_err() {
                warn!("Worker thread panicked");
            }
        }
    }
}

impl Default for JobHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for JobHost {
    fn drop(&mut self) {
        self.join();
    }
}

fn worker_loop(mut rx: mpsc::UnboundedReceiver<JobRunner>, shared: Arc<HostShared>) {
    while let Some(runner) = rx.blocking_recv() {
        {
            let mut current = lock(&shared.current);
            shared.pending.fetch_sub(1, Ordering::SeqCst);
            if shared.shutting_down.load(Ordering::SeqCst) {
                // Отброшено без запуска
                runner.cancel();
                continue;
            }
            *current = Some(runner.clone());
        }

        let state = runner.run();
        debug!("Job finished: {}", state.name());

        lock(&shared.current).take();
    }
    debug!("Worker loop finished");
}
