use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::directory::TargetDirectory;
use crate::domain::{Incident, NotificationEvent, Target, TargetStatus};
use crate::error::AppError;
use crate::notify::{DispatchResult, NotificationDispatcher};
use crate::store::IncidentStore;

/// What happened to the downtime notification for this report. Informational only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    NotAttempted,
    Delivered,
    PartiallyDelivered,
    Failed,
    /// Handed to a background thread; the result only shows up in logs and dispatcher stats.
    /// The thread is joined by `wait_for_pending_notifications` or when the ingestor drops.
    Scheduled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportOutcome {
    pub incident_created: bool,
    pub incident: Option<Incident>,
    pub notification: NotificationStatus,
}

/// Turns reported target statuses into incident lifecycle transitions.
///
/// Only DOWN has an effect: it opens an incident unless one is already open. UP and UNKNOWN never
/// resolve anything; closing an incident is an explicit operator action with a note.
pub struct StatusIngestor {
    store: Arc<IncidentStore>,
    targets: Arc<dyn TargetDirectory>,
    dispatcher: Arc<NotificationDispatcher>,
    notify_in_background: bool,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl StatusIngestor {
    pub fn new(
        store: Arc<IncidentStore>,
        targets: Arc<dyn TargetDirectory>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            store,
            targets,
            dispatcher,
            notify_in_background: false,
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn with_background_notifications(mut self, enabled: bool) -> Self {
        self.notify_in_background = enabled;
        self
    }

    /// Look up the target, then apply the reported status.
    pub fn report_status(
        &self,
        target_id: &str,
        status: TargetStatus,
        reported_by: &str,
    ) -> Result<ReportOutcome, AppError> {
        let target = self.targets.get_target(target_id)?.ok_or_else(|| {
            AppError::not_found("Target not found").with_details(format!("target_id={target_id}"))
        })?;
        self.report_for_target(&target, status, reported_by)
    }

    /// Apply a reported status for a target the caller already holds a snapshot of.
    pub fn report_for_target(
        &self,
        target: &Target,
        status: TargetStatus,
        reported_by: &str,
    ) -> Result<ReportOutcome, AppError> {
        match status {
            TargetStatus::Up | TargetStatus::Unknown => {
                tracing::debug!(target_id = %target.id, ?status, "status recorded; no transition");
                Ok(ReportOutcome {
                    incident_created: false,
                    incident: None,
                    notification: NotificationStatus::NotAttempted,
                })
            }
            TargetStatus::Down => {
                let (incident, already_open) = self.store.open_incident(target, reported_by)?;
                if already_open {
                    return Ok(ReportOutcome {
                        incident_created: false,
                        incident: Some(incident),
                        notification: NotificationStatus::NotAttempted,
                    });
                }

                // The incident is committed at this point; notification is best-effort.
                let notification = self.notify(NotificationEvent::from(&incident));
                Ok(ReportOutcome {
                    incident_created: true,
                    incident: Some(incident),
                    notification,
                })
            }
        }
    }

    fn notify(&self, event: NotificationEvent) -> NotificationStatus {
        if self.notify_in_background {
            let dispatcher = Arc::clone(&self.dispatcher);
            let spawned = std::thread::Builder::new()
                .name("downwatch-notify".to_string())
                .spawn(move || {
                    let _ = dispatch_and_log(&dispatcher, &event);
                });
            return match spawned {
                Ok(handle) => {
                    let mut pending = self.pending.lock();
                    pending.retain(|h| !h.is_finished());
                    pending.push(handle);
                    NotificationStatus::Scheduled
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to spawn notification thread");
                    NotificationStatus::Failed
                }
            };
        }
        dispatch_and_log(&self.dispatcher, &event)
    }

    /// Block until every background dispatch started so far has finished. Returns how many
    /// threads were joined.
    pub fn wait_for_pending_notifications(&self) -> usize {
        let handles: Vec<_> = std::mem::take(&mut *self.pending.lock());
        let joined = handles.len();
        for handle in handles {
            if handle.join().is_err() {
                tracing::warn!("notification thread panicked");
            }
        }
        joined
    }
}

impl Drop for StatusIngestor {
    fn drop(&mut self) {
        self.wait_for_pending_notifications();
    }
}

fn dispatch_and_log(
    dispatcher: &NotificationDispatcher,
    event: &NotificationEvent,
) -> NotificationStatus {
    match dispatcher.dispatch(event) {
        Ok(DispatchResult::Delivered { .. }) => NotificationStatus::Delivered,
        Ok(DispatchResult::PartiallyDelivered { .. }) => NotificationStatus::PartiallyDelivered,
        Err(e) => {
            tracing::warn!(
                code = %e.code,
                target_id = %event.target_id,
                error = %e,
                details = e.details.as_deref().unwrap_or(""),
                "downtime notification failed"
            );
            NotificationStatus::Failed
        }
    }
}
