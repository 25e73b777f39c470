//! The shared in-memory task collection.
//!
//! [`TaskStore`] owns every [`TaskRecord`] behind a single reader/writer lock.
//! Reads (`list_all`, `get_by_id`, `find_by_*`, `due_unnotified`) share the
//! lock; mutations (`create`, `update`, `delete`, `delete_all`,
//! `mark_notified`) take it exclusively. Every operation returns clones, so no
//! caller ever holds a reference into the collection, and no lock is held
//! beyond the body of a single method.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::task::{TaskDraft, TaskRecord, format_rfc3339_nano};

/// Concurrency-safe collection of todo records, kept in insertion order.
///
/// Share it between request handlers and the notification scanner with an
/// [`Arc`](std::sync::Arc).
///
/// # Examples
///
/// ```
/// use duetodo::store::TaskStore;
/// use duetodo::task::TaskDraft;
///
/// let store = TaskStore::new();
/// let created = store.create(TaskDraft::titled("pay bills").tag("home"));
///
/// assert_eq!(store.get_by_id(&created.id), Some(created.clone()));
/// assert_eq!(store.find_by_tag("home"), vec![created]);
/// assert!(store.find_by_tag("work").is_empty());
/// ```
#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: RwLock<Vec<TaskRecord>>,
}

impl TaskStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a new record built from `draft` and returns a copy of it.
    ///
    /// The record gets a fresh UUID v4 identifier that does not collide with
    /// any live record. `completed` and `notification_sent` start out `false`.
    ///
    /// # Panics
    ///
    /// Panics if the operating system's randomness source is unavailable.
    /// Nothing sensible can be done without one.
    pub fn create(&self, draft: TaskDraft) -> TaskRecord {
        let mut tasks = self.tasks.write();

        let id = loop {
            let candidate = Uuid::new_v4().to_string();
            if !tasks.iter().any(|t| t.id == candidate) {
                break candidate;
            }
        };

        let record = TaskRecord::from_draft(id, draft);
        tasks.push(record.clone());
        drop(tasks);

        debug!(id = %record.id, title = %record.title, "todo created");
        record
    }

    /// Returns a snapshot of every record in insertion order.
    pub fn list_all(&self) -> Vec<TaskRecord> {
        self.tasks.read().clone()
    }

    /// Returns the record with the given id, if any.
    pub fn get_by_id(&self, id: &str) -> Option<TaskRecord> {
        self.tasks.read().iter().find(|t| t.id == id).cloned()
    }

    /// Returns every record whose title equals `title` exactly.
    pub fn find_by_title(&self, title: &str) -> Vec<TaskRecord> {
        self.select(|t| t.title == title)
    }

    /// Returns every record whose description equals `description` exactly.
    pub fn find_by_description(&self, description: &str) -> Vec<TaskRecord> {
        self.select(|t| t.description == description)
    }

    /// Returns every record carrying `tag`. A record with the tag repeated
    /// still appears once.
    pub fn find_by_tag(&self, tag: &str) -> Vec<TaskRecord> {
        self.select(|t| t.has_tag(tag))
    }

    /// Returns every record whose due date, rendered with
    /// [`format_rfc3339_nano`], is byte-for-byte equal to `date`.
    ///
    /// This is a string comparison: `2024-01-01T01:00:00+01:00` does not
    /// find a record due at `2024-01-01T00:00:00Z`.
    pub fn find_by_due_date(&self, date: &str) -> Vec<TaskRecord> {
        self.select(|t| format_rfc3339_nano(&t.due_date) == date)
    }

    /// Returns every record that is due at `now` and not yet notified.
    pub fn due_unnotified(&self, now: DateTime<Utc>) -> Vec<TaskRecord> {
        self.select(|t| !t.notification_sent && t.due_date.with_timezone(&Utc) <= now)
    }

    /// Replaces the editable fields of the record with id `id`.
    ///
    /// `id` and `notification_sent` are preserved and the record keeps its
    /// position. Returns the updated record, or `None` if no record has that id.
    pub fn update(&self, id: &str, draft: TaskDraft) -> Option<TaskRecord> {
        let mut tasks = self.tasks.write();
        let task = tasks.iter_mut().find(|t| t.id == id)?;
        task.apply(draft);
        Some(task.clone())
    }

    /// Removes the record with id `id`. Returns `false` if there was none.
    pub fn delete(&self, id: &str) -> bool {
        let mut tasks = self.tasks.write();
        match tasks.iter().position(|t| t.id == id) {
            Some(index) => {
                tasks.remove(index);
                true
            }
            None => false,
        }
    }

    /// Removes every record.
    pub fn delete_all(&self) {
        let removed = {
            let mut tasks = self.tasks.write();
            let removed = tasks.len();
            tasks.clear();
            removed
        };
        debug!(removed, "all todos deleted");
    }

    /// Sets `notification_sent` on the record with id `id`.
    ///
    /// Returns `true` only for the call that flips the flag; later calls, and
    /// calls for unknown ids, return `false`.
    pub fn mark_notified(&self, id: &str) -> bool {
        let mut tasks = self.tasks.write();
        match tasks.iter_mut().find(|t| t.id == id) {
            Some(task) if !task.notification_sent => {
                task.notification_sent = true;
                true
            }
            _ => false,
        }
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    /// Returns `true` if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }

    fn select(&self, predicate: impl Fn(&TaskRecord) -> bool) -> Vec<TaskRecord> {
        self.tasks
            .read()
            .iter()
            .filter(|t| predicate(t))
            .cloned()
            .collect()
    }
}
