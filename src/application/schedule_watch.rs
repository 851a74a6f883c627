use crate::domain::models::Task;
use crate::domain::schedule::{compute_schedule, ScheduleAnalysis, ScheduleSettings};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::task_feed::TaskFeed;
use chrono::NaiveDate;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Runs the analyzer over one snapshot and reports unusable records.
pub fn analyze_snapshot(
    owner_id: &str,
    tasks: &[Task],
    date: NaiveDate,
    settings: &ScheduleSettings,
) -> Result<ScheduleAnalysis, InfraError> {
    let analysis = compute_schedule(tasks, date, settings)?;
    for diagnostic in &analysis.diagnostics {
        tracing::warn!(
            owner_id,
            task_id = %diagnostic.task_id,
            field = %diagnostic.field,
            value = %diagnostic.value,
            reason = %diagnostic.reason,
            "skipping task with unparseable schedule fields"
        );
    }
    tracing::debug!(
        owner_id,
        %date,
        gaps = analysis.gaps.len(),
        outside = analysis.outside.len(),
        "schedule recomputed"
    );
    Ok(analysis)
}

/// Keeps the schedule of one owner's viewed day current.
///
/// Each new task snapshot or viewed-day change triggers a full recomputation;
/// readers only ever see the latest result. Dropping the watcher stops it.
pub struct ScheduleWatcher {
    owner_id: String,
    date_sender: watch::Sender<NaiveDate>,
    results: watch::Receiver<ScheduleAnalysis>,
    worker: JoinHandle<()>,
}

impl ScheduleWatcher {
    pub async fn spawn<F>(
        feed: &F,
        owner_id: &str,
        date: NaiveDate,
        settings: ScheduleSettings,
    ) -> Result<Self, InfraError>
    where
        F: TaskFeed + ?Sized,
    {
        settings.validate()?;
        let mut subscription = feed.subscribe(owner_id).await?;
        let mut snapshot = subscription.current();
        let initial = analyze_snapshot(owner_id, &snapshot, date, &settings)?;

        let (date_sender, mut date_receiver) = watch::channel(date);
        let (result_sender, results) = watch::channel(initial);
        let owner = owner_id.to_string();

        let worker = tokio::spawn(async move {
            loop {
                tokio::select! {
                    next = subscription.next() => match next {
                        Some(latest) => snapshot = latest,
                        None => break,
                    },
                    changed = date_receiver.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }

                let date = *date_receiver.borrow_and_update();
                match analyze_snapshot(&owner, &snapshot, date, &settings) {
                    Ok(analysis) => {
                        if result_sender.send(analysis).is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        tracing::error!(owner_id = %owner, %error, "schedule recomputation failed");
                    }
                }
            }
            tracing::debug!(owner_id = %owner, "schedule watcher stopped");
        });

        Ok(Self {
            owner_id: owner_id.to_string(),
            date_sender,
            results,
            worker,
        })
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn date(&self) -> NaiveDate {
        *self.date_sender.borrow()
    }

    /// Switches the viewed day; a no-op when the day is unchanged.
    pub fn set_date(&self, date: NaiveDate) {
        self.date_sender.send_if_modified(|current| {
            if *current == date {
                return false;
            }
            *current = date;
            true
        });
    }

    pub fn latest(&self) -> ScheduleAnalysis {
        self.results.borrow().clone()
    }

    /// Waits for the next recomputed schedule; `None` once the watcher stopped.
    pub async fn changed(&mut self) -> Option<ScheduleAnalysis> {
        self.results.changed().await.ok()?;
        Some(self.results.borrow_and_update().clone())
    }
}

impl Drop for ScheduleWatcher {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::parse_date;
    use crate::domain::models::TaskDraft;
    use crate::domain::schedule::ScheduleError;
    use crate::infrastructure::task_feed::TaskFeedHub;
    use crate::infrastructure::task_repository::{InMemoryTaskRepository, TaskRepository};
    use chrono::{NaiveTime, Utc};
    use std::sync::Arc;
    use std::time::Duration;

    fn day(value: &str) -> NaiveDate {
        parse_date(value).expect("valid date")
    }

    fn sample_task(id: &str, date: &str, in_time: &str, out_time: &str) -> Task {
        TaskDraft {
            client: "Acme Corp".to_string(),
            task: "Interview Support".to_string(),
            technology: "Java Full Stack".to_string(),
            date: date.to_string(),
            in_time: in_time.to_string(),
            out_time: out_time.to_string(),
            round: None,
            feedback: None,
        }
        .into_task(id.to_string(), "member-1", Utc::now())
    }

    async fn next_with_timeout(watcher: &mut ScheduleWatcher) -> ScheduleAnalysis {
        tokio::time::timeout(Duration::from_secs(2), watcher.changed())
            .await
            .expect("recomputed before timeout")
            .expect("watcher alive")
    }

    #[tokio::test]
    async fn recomputes_on_new_snapshot() {
        let hub = TaskFeedHub::new(Arc::new(InMemoryTaskRepository::default()));
        let mut watcher = ScheduleWatcher::spawn(
            &hub,
            "member-1",
            day("2026-03-02"),
            ScheduleSettings::default(),
        )
        .await
        .expect("spawn watcher");
        assert_eq!(watcher.latest().gaps.len(), 1);

        hub.repository()
            .insert(&sample_task("t1", "2026-03-02", "11:00", "12:00"))
            .expect("insert");
        hub.refresh("member-1").expect("refresh");

        let analysis = next_with_timeout(&mut watcher).await;
        let durations = analysis
            .gaps
            .iter()
            .map(|gap| gap.duration.as_str())
            .collect::<Vec<_>>();
        assert_eq!(durations, vec!["1h 0m", "7h 0m"]);
    }

    #[tokio::test]
    async fn recomputes_when_viewed_day_changes() {
        let repository = Arc::new(InMemoryTaskRepository::default());
        repository
            .insert(&sample_task("t1", "2026-03-03", "08:00", "09:00"))
            .expect("insert");
        let hub = TaskFeedHub::new(repository);

        let mut watcher = ScheduleWatcher::spawn(
            &hub,
            "member-1",
            day("2026-03-02"),
            ScheduleSettings::default(),
        )
        .await
        .expect("spawn watcher");
        assert!(watcher.latest().outside.is_empty());

        watcher.set_date(day("2026-03-03"));
        let analysis = next_with_timeout(&mut watcher).await;
        assert_eq!(analysis.date, day("2026-03-03"));
        assert_eq!(analysis.outside.len(), 1);
        assert_eq!(watcher.date(), day("2026-03-03"));
    }

    #[tokio::test]
    async fn invalid_window_fails_before_subscribing() {
        let hub = TaskFeedHub::new(Arc::new(InMemoryTaskRepository::default()));
        let settings = ScheduleSettings {
            work_start: NaiveTime::from_hms_opt(18, 0, 0).expect("time"),
            work_end: NaiveTime::from_hms_opt(9, 0, 0).expect("time"),
            ..ScheduleSettings::default()
        };
        let result = ScheduleWatcher::spawn(&hub, "member-1", day("2026-03-02"), settings).await;
        assert!(matches!(
            result,
            Err(InfraError::Schedule(ScheduleError::InvalidWindow { .. }))
        ));
    }
}
