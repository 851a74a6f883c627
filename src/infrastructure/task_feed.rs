use crate::domain::models::Task;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::task_repository::TaskRepository;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub type TaskSnapshot = Arc<Vec<Task>>;

/// Stream of whole task snapshots for one owner. Only the newest snapshot is
/// retained, so a slow reader skips intermediate states.
#[derive(Debug)]
pub struct TaskSubscription {
    owner_id: String,
    receiver: watch::Receiver<TaskSnapshot>,
}

impl TaskSubscription {
    pub fn new(owner_id: &str, receiver: watch::Receiver<TaskSnapshot>) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            receiver,
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn current(&self) -> TaskSnapshot {
        Arc::clone(&self.receiver.borrow())
    }

    /// Waits for the next snapshot; `None` once the feed is gone.
    pub async fn next(&mut self) -> Option<TaskSnapshot> {
        self.receiver.changed().await.ok()?;
        Some(Arc::clone(&self.receiver.borrow_and_update()))
    }
}

#[async_trait]
pub trait TaskFeed: Send + Sync {
    async fn subscribe(&self, owner_id: &str) -> Result<TaskSubscription, InfraError>;
}

/// Local change feed over a [`TaskRepository`].
///
/// Writers call [`TaskFeedHub::refresh`] after each mutation; the hub reloads the
/// owner's tasks and notifies subscribers only when the snapshot differs.
pub struct TaskFeedHub<R>
where
    R: TaskRepository,
{
    repository: Arc<R>,
    channels: Mutex<HashMap<String, watch::Sender<TaskSnapshot>>>,
}

impl<R> TaskFeedHub<R>
where
    R: TaskRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    fn lock_channels(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, watch::Sender<TaskSnapshot>>>, InfraError>
    {
        self.channels
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("task feed: {error}")))
    }

    /// Reloads `owner_id` and publishes when changed. Returns whether a new
    /// snapshot went out.
    pub fn refresh(&self, owner_id: &str) -> Result<bool, InfraError> {
        let tasks = self.repository.list_by_owner(owner_id)?;
        let mut channels = self.lock_channels()?;
        prune_unwatched(&mut channels);
        let Some(sender) = channels.get(owner_id) else {
            return Ok(false);
        };
        let changed = sender.send_if_modified(|current| {
            if current.as_slice() == tasks.as_slice() {
                return false;
            }
            *current = Arc::new(tasks);
            true
        });
        if changed {
            tracing::debug!(owner_id, "published new task snapshot");
        }
        Ok(changed)
    }

    /// Owners that currently have at least one live subscription.
    pub fn watched_owners(&self) -> Result<Vec<String>, InfraError> {
        let mut channels = self.lock_channels()?;
        prune_unwatched(&mut channels);
        let mut owners = channels.keys().cloned().collect::<Vec<_>>();
        owners.sort();
        Ok(owners)
    }

    /// Refreshes `owner_id` on a fixed interval so writes from other processes
    /// reach local subscribers. Abort the handle to stop.
    pub fn spawn_polling(self: &Arc<Self>, owner_id: &str, every: Duration) -> JoinHandle<()> {
        let hub = Arc::clone(self);
        let owner_id = owner_id.to_string();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(error) = hub.refresh(&owner_id) {
                    tracing::warn!(owner_id = %owner_id, %error, "task feed refresh failed");
                }
            }
        })
    }
}

fn prune_unwatched(channels: &mut HashMap<String, watch::Sender<TaskSnapshot>>) {
    channels.retain(|_, sender| sender.receiver_count() > 0);
}

#[async_trait]
impl<R> TaskFeed for TaskFeedHub<R>
where
    R: TaskRepository + 'static,
{
    async fn subscribe(&self, owner_id: &str) -> Result<TaskSubscription, InfraError> {
        let owner_id = owner_id.trim();
        if owner_id.is_empty() {
            return Err(InfraError::InvalidInput(
                "owner id is required to subscribe".to_string(),
            ));
        }

        let mut channels = self.lock_channels()?;
        prune_unwatched(&mut channels);
        if let Some(sender) = channels.get(owner_id) {
            return Ok(TaskSubscription::new(owner_id, sender.subscribe()));
        }

        let initial = Arc::new(self.repository.list_by_owner(owner_id)?);
        let (sender, receiver) = watch::channel(initial);
        channels.insert(owner_id.to_string(), sender);
        Ok(TaskSubscription::new(owner_id, receiver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{TaskDraft, TaskStatus};
    use crate::infrastructure::task_repository::InMemoryTaskRepository;
    use chrono::Utc;

    fn sample_task(id: &str, owner: &str) -> Task {
        TaskDraft {
            client: "Acme Corp".to_string(),
            task: "Training".to_string(),
            technology: "QA Analyst".to_string(),
            date: "2026-03-02".to_string(),
            in_time: "11:00".to_string(),
            out_time: "12:00".to_string(),
            round: None,
            feedback: None,
        }
        .into_task(id.to_string(), owner, Utc::now())
    }

    fn hub() -> Arc<TaskFeedHub<InMemoryTaskRepository>> {
        Arc::new(TaskFeedHub::new(Arc::new(InMemoryTaskRepository::default())))
    }

    #[tokio::test]
    async fn subscribe_starts_with_current_snapshot() {
        let hub = hub();
        hub.repository()
            .insert(&sample_task("t1", "member-1"))
            .expect("insert");

        let subscription = hub.subscribe("member-1").await.expect("subscribe");
        assert_eq!(subscription.owner_id(), "member-1");
        assert_eq!(subscription.current().len(), 1);
    }

    #[tokio::test]
    async fn refresh_publishes_only_changes() {
        let hub = hub();
        let mut subscription = hub.subscribe("member-1").await.expect("subscribe");
        assert!(subscription.current().is_empty());

        hub.repository()
            .insert(&sample_task("t1", "member-1"))
            .expect("insert");
        assert!(hub.refresh("member-1").expect("refresh"));
        let snapshot = subscription.next().await.expect("snapshot");
        assert_eq!(snapshot.len(), 1);

        assert!(!hub.refresh("member-1").expect("refresh unchanged"));

        let mut task = sample_task("t1", "member-1");
        task.status = TaskStatus::Done;
        hub.repository().update(&task).expect("update");
        assert!(hub.refresh("member-1").expect("refresh"));
        let snapshot = subscription.next().await.expect("snapshot");
        assert_eq!(snapshot[0].status, TaskStatus::Done);
    }

    #[tokio::test]
    async fn owners_are_isolated() {
        let hub = hub();
        let member_one = hub.subscribe("member-1").await.expect("subscribe");
        hub.repository()
            .insert(&sample_task("t2", "member-2"))
            .expect("insert");

        assert!(!hub.refresh("member-1").expect("refresh"));
        assert!(!hub.refresh("member-2").expect("refresh without subscribers"));
        assert!(member_one.current().is_empty());
    }

    #[tokio::test]
    async fn polling_picks_up_out_of_band_writes() {
        let hub = hub();
        let mut subscription = hub.subscribe("member-1").await.expect("subscribe");
        let poller = hub.spawn_polling("member-1", Duration::from_millis(5));

        hub.repository()
            .insert(&sample_task("t1", "member-1"))
            .expect("insert");
        let snapshot = tokio::time::timeout(Duration::from_secs(2), subscription.next())
            .await
            .expect("snapshot before timeout")
            .expect("feed alive");
        assert_eq!(snapshot.len(), 1);
        poller.abort();
    }

    #[tokio::test]
    async fn dropped_subscriptions_release_their_channel() {
        let hub = hub();
        let first = hub.subscribe("member-1").await.expect("subscribe");
        let second = hub.subscribe("member-2").await.expect("subscribe");
        assert_eq!(
            hub.watched_owners().expect("owners"),
            vec!["member-1", "member-2"]
        );

        drop(first);
        assert!(!hub.refresh("member-1").expect("refresh"));
        assert_eq!(hub.watched_owners().expect("owners"), vec!["member-2"]);

        hub.repository()
            .insert(&sample_task("t1", "member-1"))
            .expect("insert");
        let again = hub.subscribe("member-1").await.expect("resubscribe");
        assert_eq!(again.current().len(), 1);
        drop(second);
        assert_eq!(hub.watched_owners().expect("owners"), vec!["member-1"]);
    }

    #[tokio::test]
    async fn subscribe_rejects_blank_owner() {
        let hub = hub();
        assert!(hub.subscribe("  ").await.is_err());
    }
}
