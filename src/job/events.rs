//! События задания для привязанного наблюдателя (CLI, GUI)

use super::runner::JobState;

/// Изменение одного из наблюдаемых значений исполнителя
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// Доля выполнения 0.0..=1.0, не убывает
    Progress(f64),
    /// Строка статуса
    Message(String),
    /// Новое состояние
    StateChanged(JobState),
}

impl JobEvent {
    /// Событие о финальном состоянии
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::StateChanged(state) if state.is_terminal())
    }
}
