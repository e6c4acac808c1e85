use crate::models::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskFilter {
    All,
    Active,
    Completed,
}

/// In-memory mirror of the server's task list, newest-created first.
///
/// Every mutation stores the server's response verbatim, so after any
/// confirmed operation the mirror matches the backend's authoritative copy
/// of the touched item.
#[derive(Debug, Default)]
pub struct TaskCache {
    tasks: Vec<Task>,
}

impl TaskCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole mirror after a list fetch.
    pub fn replace_all(&mut self, tasks: Vec<Task>) {
        self.tasks = tasks;
    }

    /// Prepends a freshly created task.
    pub fn insert_created(&mut self, task: Task) {
        self.tasks.insert(0, task);
    }

    /// Replaces the task with the same id in place. An unknown id is
    /// prepended, repairing a mirror that had drifted from the server.
    pub fn apply_update(&mut self, task: Task) {
        match self.tasks.iter_mut().find(|t| t.id == task.id) {
            Some(slot) => *slot = task,
            None => self.tasks.insert(0, task),
        }
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        self.tasks.len() < before
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn filtered(&self, filter: TaskFilter) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| match filter {
                TaskFilter::All => true,
                TaskFilter::Active => !t.completed,
                TaskFilter::Completed => t.completed,
            })
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.tasks.iter().filter(|t| !t.completed).count()
    }

    pub fn completed_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.completed).count()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
