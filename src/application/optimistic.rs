use crate::domain::models::{Task, TaskPatch};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::task_feed::{TaskFeed, TaskSubscription};
use chrono::{DateTime, Utc};

pub type MutationId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskMutation {
    Create(Task),
    Update { task_id: String, patch: TaskPatch },
    Delete { task_id: String },
}

impl TaskMutation {
    pub fn task_id(&self) -> &str {
        match self {
            Self::Create(task) => &task.id,
            Self::Update { task_id, .. } | Self::Delete { task_id } => task_id,
        }
    }

    fn apply(&self, tasks: &mut Vec<Task>, at: DateTime<Utc>) {
        match self {
            Self::Create(task) => {
                if tasks.iter().all(|existing| existing.id != task.id) {
                    tasks.push(task.clone());
                }
            }
            Self::Update { task_id, patch } => {
                if let Some(existing) = tasks.iter_mut().find(|existing| &existing.id == task_id) {
                    existing.apply_patch(patch, at);
                }
            }
            Self::Delete { task_id } => tasks.retain(|existing| &existing.id != task_id),
        }
    }

    fn reflected_in(&self, snapshot: &[Task], at: DateTime<Utc>) -> bool {
        let current = snapshot.iter().find(|task| task.id == self.task_id());
        match (self, current) {
            (Self::Create(_), current) => current.is_some(),
            (Self::Delete { .. }, current) => current.is_none(),
            // An update to a task the store no longer has can never land.
            (Self::Update { .. }, None) => true,
            (Self::Update { patch, .. }, Some(current)) => {
                let mut expected = current.clone();
                expected.apply_patch(patch, at);
                expected.updated_at = current.updated_at;
                &expected == current
            }
        }
    }
}

#[derive(Debug, Clone)]
struct PendingMutation {
    id: MutationId,
    at: DateTime<Utc>,
    mutation: TaskMutation,
}

/// Task list shown to the user while writes are in flight.
///
/// Local mutations apply to the view immediately and stay pending until an
/// authoritative snapshot reflects them or the write is rejected.
/// [`TaskListSession`] drives one of these from a task feed.
#[derive(Debug, Clone, Default)]
pub struct OptimisticTaskList {
    snapshot: Vec<Task>,
    pending: Vec<PendingMutation>,
    next_id: MutationId,
}

impl OptimisticTaskList {
    pub fn new(snapshot: Vec<Task>) -> Self {
        Self {
            snapshot,
            ..Self::default()
        }
    }

    pub fn apply_local(&mut self, mutation: TaskMutation) -> MutationId {
        self.apply_local_at(mutation, Utc::now())
    }

    pub fn apply_local_at(&mut self, mutation: TaskMutation, at: DateTime<Utc>) -> MutationId {
        self.next_id += 1;
        let id = self.next_id;
        self.pending.push(PendingMutation { id, at, mutation });
        id
    }

    pub fn view(&self) -> Vec<Task> {
        let mut tasks = self.snapshot.clone();
        for pending in &self.pending {
            pending.mutation.apply(&mut tasks, pending.at);
        }
        tasks
    }

    /// Installs a newer authoritative snapshot. Returns how many pending
    /// mutations it confirmed.
    pub fn reconcile(&mut self, snapshot: Vec<Task>) -> usize {
        let before = self.pending.len();
        self.pending
            .retain(|pending| !pending.mutation.reflected_in(&snapshot, pending.at));
        self.snapshot = snapshot;
        before - self.pending.len()
    }

    /// Rolls back a mutation the store refused. Returns `false` for unknown ids.
    pub fn reject(&mut self, mutation_id: MutationId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|pending| pending.id != mutation_id);
        self.pending.len() != before
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn snapshot(&self) -> &[Task] {
        &self.snapshot
    }
}

/// One owner's task list as a client sees it: the feed's latest snapshot with
/// the client's own unconfirmed writes layered on top.
#[derive(Debug)]
pub struct TaskListSession {
    subscription: TaskSubscription,
    list: OptimisticTaskList,
}

impl TaskListSession {
    pub async fn open<F>(feed: &F, owner_id: &str) -> Result<Self, InfraError>
    where
        F: TaskFeed + ?Sized,
    {
        let subscription = feed.subscribe(owner_id).await?;
        let list = OptimisticTaskList::new(subscription.current().to_vec());
        Ok(Self { subscription, list })
    }

    pub fn owner_id(&self) -> &str {
        self.subscription.owner_id()
    }

    pub fn view(&self) -> Vec<Task> {
        self.list.view()
    }

    pub fn pending_len(&self) -> usize {
        self.list.pending_len()
    }

    /// Shows `mutation` immediately, then runs `write` against the store.
    /// A failed write is rolled back out of the view and its error returned.
    pub fn submit<T, W>(&mut self, mutation: TaskMutation, write: W) -> Result<T, InfraError>
    where
        W: FnOnce() -> Result<T, InfraError>,
    {
        let task_id = mutation.task_id().to_string();
        let mutation_id = self.list.apply_local(mutation);
        match write() {
            Ok(value) => {
                self.sync();
                Ok(value)
            }
            Err(error) => {
                self.list.reject(mutation_id);
                tracing::warn!(
                    owner_id = self.owner_id(),
                    task_id = %task_id,
                    %error,
                    "rolled back rejected task write"
                );
                Err(error)
            }
        }
    }

    /// Reconciles against the feed's current snapshot.
    pub fn sync(&mut self) -> usize {
        let snapshot = self.subscription.current();
        self.list.reconcile(snapshot.to_vec())
    }

    /// Waits for the next snapshot and returns the reconciled view.
    pub async fn next(&mut self) -> Option<Vec<Task>> {
        let snapshot = self.subscription.next().await?;
        self.list.reconcile(snapshot.to_vec());
        Some(self.list.view())
    }
}
