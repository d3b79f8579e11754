use std::{
    collections::HashMap,
    sync::{Arc, Mutex, Weak},
    time::Duration,
};

use chrono::Utc;
use tokio::{runtime::Handle, sync::broadcast, task::JoinHandle};
use uuid::Uuid;

use crate::{
    error::{Result, TelemetryError},
    notifications::{
        DEFAULT_NOTIFICATION_DURATION, Notification, NotificationChange, NotificationKind,
    },
};

const CHANGE_BUFFER: usize = 64;

/// Active notifications plus one auto-dismiss timer per timed notification.
#[derive(Clone)]
pub struct NotificationCenter {
    inner: Arc<CenterInner>,
}

struct CenterInner {
    state: Mutex<CenterState>,
    changes: broadcast::Sender<NotificationChange>,
    runtime: Handle,
}

#[derive(Default)]
struct CenterState {
    active: Vec<Notification>,
    timers: HashMap<Uuid, JoinHandle<()>>,
}

impl NotificationCenter {
    pub fn new() -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| TelemetryError::NoRuntime)?;
        Ok(Self::with_runtime(runtime))
    }

    pub fn with_runtime(runtime: Handle) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            inner: Arc::new(CenterInner {
                state: Mutex::new(CenterState::default()),
                changes,
                runtime,
            }),
        }
    }

    /// Adds a notification. `Duration::ZERO` keeps it until dismissed.
    pub fn show(
        &self,
        message: impl Into<String>,
        kind: NotificationKind,
        duration: Duration,
    ) -> Uuid {
        let notification = Notification {
            id: Uuid::new_v4(),
            message: message.into(),
            kind,
            created_at: Utc::now(),
        };
        let id = notification.id;

        {
            let mut state = self.inner.state.lock().expect("NotificationCenter poisoned");
            state.active.push(notification.clone());

            if !duration.is_zero() {
                let weak: Weak<CenterInner> = Arc::downgrade(&self.inner);
                let handle = self.inner.runtime.spawn(async move {
                    tokio::time::sleep(duration).await;
                    if let Some(inner) = weak.upgrade() {
                        NotificationCenter { inner }.expire(id);
                    }
                });
                state.timers.insert(id, handle);
            }
        }

        let _ = self.inner.changes.send(NotificationChange::Shown(notification));
        id
    }

    pub fn success(&self, message: impl Into<String>) -> Uuid {
        self.show(message, NotificationKind::Success, DEFAULT_NOTIFICATION_DURATION)
    }

    pub fn error(&self, message: impl Into<String>) -> Uuid {
        self.show(message, NotificationKind::Error, DEFAULT_NOTIFICATION_DURATION)
    }

    pub fn warning(&self, message: impl Into<String>) -> Uuid {
        self.show(message, NotificationKind::Warning, DEFAULT_NOTIFICATION_DURATION)
    }

    pub fn info(&self, message: impl Into<String>) -> Uuid {
        self.show(message, NotificationKind::Info, DEFAULT_NOTIFICATION_DURATION)
    }

    /// Removes the notification and cancels its timer. Returns whether it
    /// was still active; dismissing twice is a no-op.
    pub fn dismiss(&self, id: Uuid) -> bool {
        let removed = {
            let mut state = self.inner.state.lock().expect("NotificationCenter poisoned");
            if let Some(handle) = state.timers.remove(&id) {
                handle.abort();
            }
            remove_record(&mut state.active, id)
        };

        if removed {
            let _ = self.inner.changes.send(NotificationChange::Dismissed(id));
        }
        removed
    }

    pub fn dismiss_all(&self) {
        {
            let mut state = self.inner.state.lock().expect("NotificationCenter poisoned");
            for (_, handle) in state.timers.drain() {
                handle.abort();
            }
            state.active.clear();
        }

        let _ = self.inner.changes.send(NotificationChange::Cleared);
    }

    /// Active notifications, oldest first.
    pub fn active(&self) -> Vec<Notification> {
        self.inner
            .state
            .lock()
            .expect("NotificationCenter poisoned")
            .active
            .clone()
    }

    pub fn get(&self, id: Uuid) -> Option<Notification> {
        self.inner
            .state
            .lock()
            .expect("NotificationCenter poisoned")
            .active
            .iter()
            .find(|n| n.id == id)
            .cloned()
    }

    pub fn pending_timers(&self) -> usize {
        self.inner
            .state
            .lock()
            .expect("NotificationCenter poisoned")
            .timers
            .len()
    }

    pub fn has_timer(&self, id: Uuid) -> bool {
        self.inner
            .state
            .lock()
            .expect("NotificationCenter poisoned")
            .timers
            .contains_key(&id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationChange> {
        self.inner.changes.subscribe()
    }

    // Called from the timer task itself, so the handle is dropped, not aborted.
    fn expire(&self, id: Uuid) {
        let removed = {
            let mut state = self.inner.state.lock().expect("NotificationCenter poisoned");
            if state.timers.remove(&id).is_none() {
                // Dismissed while this timer was waking up.
                return;
            }
            remove_record(&mut state.active, id)
        };

        if removed {
            let _ = self.inner.changes.send(NotificationChange::Expired(id));
        }
    }
}

fn remove_record(active: &mut Vec<Notification>, id: Uuid) -> bool {
    let before = active.len();
    active.retain(|n| n.id != id);
    active.len() != before
}

impl Drop for CenterInner {
    fn drop(&mut self) {
        if let Ok(state) = self.state.get_mut() {
            for (_, handle) in state.timers.drain() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOAST: Duration = Duration::from_millis(3000);

    #[tokio::test(start_paused = true)]
    async fn timed_notification_expires_and_releases_its_handle() {
        let center = NotificationCenter::new().unwrap();
        let id = center.show("Campaign scheduled", NotificationKind::Success, TOAST);

        assert!(center.has_timer(id));
        assert_eq!(center.active().len(), 1);

        tokio::time::sleep(TOAST + Duration::from_millis(1)).await;

        assert!(center.get(id).is_none());
        assert_eq!(center.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dismiss_is_idempotent_and_cancels_the_timer() {
        let center = NotificationCenter::new().unwrap();
        let mut changes = center.subscribe();
        let id = center.show("Contact saved", NotificationKind::Info, TOAST);

        assert!(center.dismiss(id));
        assert!(!center.dismiss(id));
        assert!(!center.has_timer(id));

        tokio::time::sleep(TOAST * 2).await;

        assert!(matches!(changes.recv().await, Ok(NotificationChange::Shown(n)) if n.id == id));
        assert_eq!(changes.recv().await, Ok(NotificationChange::Dismissed(id)));
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn dismiss_wins_over_a_timer_that_already_woke() {
        let center = NotificationCenter::new().unwrap();
        let mut changes = center.subscribe();
        let id = center.show("Draft autosaved", NotificationKind::Info, TOAST);

        // Dismiss lands right at the deadline; the timer then runs its expiry.
        tokio::time::sleep(TOAST - Duration::from_millis(1)).await;
        assert!(center.dismiss(id));
        center.expire(id);
        tokio::time::sleep(TOAST).await;

        assert!(center.active().is_empty());
        assert_eq!(center.pending_timers(), 0);
        assert!(matches!(changes.recv().await, Ok(NotificationChange::Shown(n)) if n.id == id));
        assert_eq!(changes.recv().await, Ok(NotificationChange::Dismissed(id)));
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn dismiss_after_expiry_is_a_no_op() {
        let center = NotificationCenter::new().unwrap();
        let id = center.show("Import finished", NotificationKind::Success, TOAST);

        tokio::time::sleep(TOAST * 2).await;

        assert!(!center.dismiss(id));
        assert!(!center.has_timer(id));
        assert_eq!(center.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_duration_persists_until_dismissed() {
        let center = NotificationCenter::new().unwrap();
        let id = center.show(
            "Billing needs attention",
            NotificationKind::Warning,
            Duration::ZERO,
        );

        assert!(!center.has_timer(id));
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(center.get(id).is_some());

        assert!(center.dismiss(id));
        assert!(center.active().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dismiss_all_cancels_every_timer() {
        let center = NotificationCenter::new().unwrap();
        let mut changes = center.subscribe();
        center.show("one", NotificationKind::Info, TOAST);
        center.show("two", NotificationKind::Error, Duration::ZERO);
        center.warning("three");

        center.dismiss_all();
        assert!(center.active().is_empty());
        assert_eq!(center.pending_timers(), 0);

        tokio::time::sleep(DEFAULT_NOTIFICATION_DURATION * 2).await;
        for _ in 0..3 {
            assert!(matches!(changes.recv().await, Ok(NotificationChange::Shown(_))));
        }
        assert_eq!(changes.recv().await, Ok(NotificationChange::Cleared));
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn records_keep_show_order() {
        let center = NotificationCenter::new().unwrap();
        let first = center.success("first");
        let second = center.error("second");
        let third = center.info("third");

        center.dismiss(second);

        let ids: Vec<Uuid> = center.active().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![first, third]);
    }
}
