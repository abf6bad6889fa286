use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::app::error::TaskError;
use crate::app::models::{NewTask, Priority, ReorderItem, ReorderSummary, Task, TaskPatch};
use crate::app::storage::TaskStore;

// Business rules of the todo list, independent of where tasks are stored.
// Owns the display order, append-at-the-end placement on create, title
// validation and priority defaulting.
pub struct TaskService {
    store: Arc<dyn TaskStore>,
}

// Listing order: priority rank desc, order asc, newest first, then id
pub fn display_order(a: &Task, b: &Task) -> Ordering {
    b.priority
        .rank()
        .cmp(&a.priority.rank())
        .then(a.order.cmp(&b.order))
        .then(b.created_at.cmp(&a.created_at))
        .then(a.id.cmp(&b.id))
}

fn log_backend<T>(operation: &str, result: Result<T, TaskError>) -> Result<T, TaskError> {
    if let Err(TaskError::Backend(detail)) = &result {
        warn!(operation, error = %detail, "task store failed");
    }
    result
}

impl TaskService {
    pub fn new(store: Arc<dyn TaskStore>) -> TaskService {
        TaskService { store }
    }

    pub fn list(&self) -> Result<Vec<Task>, TaskError> {
        let mut tasks = log_backend("list", self.store.list_all())?;
        tasks.sort_by(display_order);
        Ok(tasks)
    }

    // Append a new task after every existing one.
    // An absent or unrecognised priority becomes `medium`.
    pub fn create(
        &self,
        title: &str,
        description: Option<String>,
        priority: Option<Priority>,
    ) -> Result<Task, TaskError> {
        if title.trim().is_empty() {
            return Err(TaskError::Validation("Title is required".into()));
        }

        let max_order = log_backend("max_order", self.store.max_order())?;
        let priority = priority
            .filter(Priority::is_known)
            .unwrap_or(Priority::Medium);

        let task = log_backend(
            "insert",
            self.store.insert(NewTask {
                title: title.to_string(),
                description: description.unwrap_or_default(),
                priority,
                order: max_order + 1,
                completed: false,
            }),
        )?;
        debug!(id = task.id, order = task.order, "task created");
        Ok(task)
    }

    pub fn get(&self, id: i64) -> Result<Task, TaskError> {
        log_backend("get", self.store.get_by_id(id))
    }

    // Title is deliberately not re-validated here, an update may blank it
    pub fn update(&self, id: i64, patch: TaskPatch) -> Result<Task, TaskError> {
        if let Some(priority) = patch.priority.as_ref().filter(|p| !p.is_known()) {
            return Err(TaskError::Validation(format!(
                "priority must be one of high, medium, low, got {:?}",
                priority.as_str()
            )));
        }

        let task = log_backend("update", self.store.update(id, &patch))?;
        debug!(id, "task updated");
        Ok(task)
    }

    pub fn toggle(&self, id: i64) -> Result<Task, TaskError> {
        let current = self.get(id)?;
        let task = log_backend(
            "toggle",
            self.store.update(id, &TaskPatch::completed(!current.completed)),
        )?;
        debug!(id, completed = task.completed, "task toggled");
        Ok(task)
    }

    pub fn delete(&self, id: i64) -> Result<(), TaskError> {
        log_backend("delete", self.store.delete(id))?;
        debug!(id, "task deleted");
        Ok(())
    }

    // Apply a batch of `{id, order}` pairs one update at a time.
    // Ids that do not exist are skipped. A storage failure stops the batch and
    // is returned; updates applied before it are kept.
    pub fn reorder(&self, items: &[ReorderItem]) -> Result<ReorderSummary, TaskError> {
        let mut summary = ReorderSummary::default();
        for item in items {
            match self.store.update(item.id, &TaskPatch::order(item.order)) {
                Ok(_) => summary.applied += 1,
                Err(TaskError::NotFound(_)) => summary.skipped += 1,
                Err(err) => {
                    warn!(
                        id = item.id,
                        applied = summary.applied,
                        error = %err,
                        "reorder stopped part way"
                    );
                    return Err(err);
                }
            }
        }
        debug!(applied = summary.applied, skipped = summary.skipped, "tasks reordered");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::storage::SqliteStore;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn service() -> TaskService {
        TaskService::new(Arc::new(SqliteStore::open_in_memory().unwrap()))
    }

    fn task(id: i64, priority: Priority, order: i64, created_secs: i64) -> Task {
        let created = Utc.timestamp_opt(1_700_000_000 + created_secs, 0).unwrap();
        Task {
            id,
            title: format!("task {id}"),
            description: String::new(),
            completed: false,
            priority,
            order,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn display_order_uses_all_keys() {
        let mut tasks = vec![
            task(1, Priority::Low, 0, 0),
            task(2, Priority::Unknown("urgent".into()), 0, 0),
            task(3, Priority::High, 5, 0),
            task(4, Priority::High, 1, 0),
            task(5, Priority::Medium, 1, 10),
            task(6, Priority::Medium, 1, 20),
            task(8, Priority::Medium, 1, 20),
            task(7, Priority::Medium, 1, 20),
        ];
        tasks.sort_by(display_order);

        let ids: Vec<i64> = tasks.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![4, 3, 6, 7, 8, 5, 1, 2]);
    }

    #[test]
    fn list_is_sorted_and_repeatable() {
        let service = service();
        let low = service.create("low", None, Some(Priority::Low)).unwrap();
        let high = service.create("high", None, Some(Priority::High)).unwrap();
        let medium = service.create("medium", None, None).unwrap();

        let first: Vec<i64> = service.list().unwrap().iter().map(|t| t.id).collect();
        let second: Vec<i64> = service.list().unwrap().iter().map(|t| t.id).collect();
        assert_eq!(first, vec![high.id, medium.id, low.id]);
        assert_eq!(first, second);
    }

    #[test]
    fn create_appends_after_current_max() {
        let service = service();
        let orders: Vec<i64> = (0..4)
            .map(|i| service.create(&format!("t{i}"), None, None).unwrap().order)
            .collect();
        assert_eq!(orders, vec![1, 2, 3, 4]);

        let first = service.list().unwrap().into_iter().find(|t| t.order == 1).unwrap();
        service.update(first.id, TaskPatch::order(40)).unwrap();
        assert_eq!(service.create("after", None, None).unwrap().order, 41);
    }

    #[test]
    fn create_defaults() {
        let service = service();
        let task = service
            .create("散歩", None, Some(Priority::Unknown("asap".into())))
            .unwrap();

        assert_eq!(task.priority, Priority::Medium);
        assert_eq!(task.description, "");
        assert!(!task.completed);
        assert_eq!(task.created_at, task.updated_at);
    }

    #[test]
    fn create_rejects_blank_title() {
        let service = service();
        assert!(matches!(service.create("", None, None), Err(TaskError::Validation(_))));
        assert!(matches!(
            service.create("  \t\n", Some("d".into()), None),
            Err(TaskError::Validation(_))
        ));
        assert!(service.list().unwrap().is_empty());
    }

    #[test]
    fn partial_update_keeps_other_fields() {
        let service = service();
        let task = service
            .create("資料作成", Some("月次報告".into()), Some(Priority::High))
            .unwrap();

        let updated = service
            .update(
                task.id,
                TaskPatch {
                    priority: Some(Priority::Low),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.priority, Priority::Low);
        assert_eq!(updated.title, task.title);
        assert_eq!(updated.description, task.description);
        assert_eq!(updated.completed, task.completed);
        assert_eq!(updated.order, task.order);
        assert_eq!(updated.created_at, task.created_at);
        assert!(updated.updated_at >= task.updated_at);
    }

    #[test]
    fn update_accepts_empty_title() {
        let service = service();
        let task = service.create("temp", None, None).unwrap();
        let updated = service
            .update(
                task.id,
                TaskPatch {
                    title: Some(String::new()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.title, "");
    }

    #[test]
    fn update_rejects_unknown_priority() {
        let service = service();
        let task = service.create("temp", None, None).unwrap();
        let err = service
            .update(
                task.id,
                TaskPatch {
                    priority: Some(Priority::Unknown("urgent".into())),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, TaskError::Validation(_)));
        assert_eq!(service.get(task.id).unwrap().priority, Priority::Medium);
    }

    #[test]
    fn empty_update_still_touches_updated_at() {
        let service = service();
        let task = service.create("temp", None, None).unwrap();
        let updated = service.update(task.id, TaskPatch::default()).unwrap();
        assert!(updated.updated_at >= task.updated_at);
        assert_eq!(updated.title, task.title);
    }

    #[test]
    fn double_toggle_restores_state() {
        let service = service();
        let task = service.create("temp", None, None).unwrap();

        let once = service.toggle(task.id).unwrap();
        assert!(once.completed);
        let twice = service.toggle(task.id).unwrap();
        assert!(!twice.completed);
        assert!(twice.updated_at >= once.updated_at);
    }

    #[test]
    fn missing_ids_are_not_found_and_mutate_nothing() {
        let service = service();
        let task = service.create("keep", None, None).unwrap();

        assert!(matches!(
            service.update(9999, TaskPatch::completed(true)),
            Err(TaskError::NotFound(9999))
        ));
        assert!(matches!(service.toggle(9999), Err(TaskError::NotFound(9999))));
        assert!(matches!(service.delete(9999), Err(TaskError::NotFound(9999))));
        assert!(matches!(service.get(9999), Err(TaskError::NotFound(9999))));

        assert_eq!(service.list().unwrap(), vec![task]);
    }

    #[test]
    fn delete_removes_task() {
        let service = service();
        let task = service.create("gone", None, None).unwrap();
        service.delete(task.id).unwrap();
        assert!(matches!(service.get(task.id), Err(TaskError::NotFound(_))));
    }

    #[test]
    fn reorder_applies_known_and_skips_unknown() {
        let service = service();
        let a = service.create("a", None, None).unwrap();
        let b = service.create("b", None, None).unwrap();

        let summary = service
            .reorder(&[
                ReorderItem { id: b.id, order: 1 },
                ReorderItem { id: 9999, order: 5 },
                ReorderItem { id: a.id, order: 2 },
            ])
            .unwrap();
        assert_eq!(summary, ReorderSummary { applied: 2, skipped: 1 });

        let ids: Vec<i64> = service.list().unwrap().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }

    #[test]
    fn reorder_of_unknown_id_only_changes_nothing() {
        let service = service();
        let before = vec![service.create("a", None, None).unwrap()];

        let summary = service.reorder(&[ReorderItem { id: 9999, order: 5 }]).unwrap();
        assert_eq!(summary, ReorderSummary { applied: 0, skipped: 1 });
        assert_eq!(service.list().unwrap(), before);
    }

    // Succeeds for the first `healthy_updates` calls, then the backend goes away
    struct FlakyStore {
        inner: SqliteStore,
        healthy_updates: usize,
        calls: AtomicUsize,
    }

    impl TaskStore for FlakyStore {
        fn list_all(&self) -> Result<Vec<Task>, TaskError> {
            self.inner.list_all()
        }
        fn get_by_id(&self, id: i64) -> Result<Task, TaskError> {
            self.inner.get_by_id(id)
        }
        fn insert(&self, task: NewTask) -> Result<Task, TaskError> {
            self.inner.insert(task)
        }
        fn update(&self, id: i64, patch: &TaskPatch) -> Result<Task, TaskError> {
            if self.calls.fetch_add(1, AtomicOrdering::SeqCst) >= self.healthy_updates {
                return Err(TaskError::Backend("connection reset".into()));
            }
            self.inner.update(id, patch)
        }
        fn delete(&self, id: i64) -> Result<(), TaskError> {
            self.inner.delete(id)
        }
        fn max_order(&self) -> Result<i64, TaskError> {
            self.inner.max_order()
        }
    }

    #[test]
    fn reorder_reports_backend_failure_without_rollback() {
        let store = Arc::new(FlakyStore {
            inner: SqliteStore::open_in_memory().unwrap(),
            healthy_updates: 1,
            calls: AtomicUsize::new(0),
        });
        let service = TaskService::new(store.clone());
        let a = service.create("a", None, None).unwrap();
        let b = service.create("b", None, None).unwrap();

        let err = service
            .reorder(&[
                ReorderItem { id: a.id, order: 10 },
                ReorderItem { id: b.id, order: 20 },
            ])
            .unwrap_err();
        assert!(matches!(err, TaskError::Backend(_)));

        assert_eq!(store.inner.get_by_id(a.id).unwrap().order, 10);
        assert_eq!(store.inner.get_by_id(b.id).unwrap().order, b.order);
    }

    fn tick() {
        std::thread::sleep(std::time::Duration::from_millis(5));
    }

    #[test]
    fn update_refreshes_updated_at() {
        let service = service();
        let task = service.create("temp", None, None).unwrap();
        tick();

        let updated = service
            .update(
                task.id,
                TaskPatch {
                    description: Some("more".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(updated.updated_at > task.updated_at);
        assert_eq!(updated.created_at, task.created_at);

        tick();
        let untouched = service.update(task.id, TaskPatch::default()).unwrap();
        assert!(untouched.updated_at > updated.updated_at);
    }

    #[test]
    fn toggle_refreshes_updated_at() {
        let service = service();
        let task = service.create("temp", None, None).unwrap();
        tick();

        let once = service.toggle(task.id).unwrap();
        assert!(once.updated_at > task.updated_at);
        tick();
        let twice = service.toggle(task.id).unwrap();
        assert!(twice.updated_at > once.updated_at);
    }

    #[test]
    fn reorder_refreshes_updated_at_of_applied_items_only() {
        let service = service();
        let moved = service.create("moved", None, None).unwrap();
        let still = service.create("still", None, None).unwrap();
        tick();

        service
            .reorder(&[ReorderItem { id: moved.id, order: 10 }])
            .unwrap();

        let after_move = service.get(moved.id).unwrap();
        assert_eq!(after_move.order, 10);
        assert!(after_move.updated_at > moved.updated_at);
        assert_eq!(service.get(still.id).unwrap().updated_at, still.updated_at);
    }

    #[test]
    fn newer_task_first_within_same_bucket() {
        let older = task(1, Priority::Medium, 3, 0);
        let mut newer = task(2, Priority::Medium, 3, 0);
        newer.created_at = older.created_at + Duration::seconds(30);

        let mut tasks = vec![older, newer];
        tasks.sort_by(display_order);
        assert_eq!(tasks[0].id, 2);
    }
}
