use std::sync::Arc;

use crate::directory::{PrincipalDirectory, TargetDirectory};
use crate::domain::{Incident, MonthlyReportRow, TargetStatus};
use crate::error::AppError;
use crate::ingest::{ReportOutcome, StatusIngestor};
use crate::notify::NotificationDispatcher;
use crate::report::ReportAggregator;
use crate::store::IncidentStore;
use crate::validate;
use crate::views::{attach_names, IncidentView};

/// The operations exposed to a transport layer. Every component is injected; nothing here is
/// process-global.
pub struct IncidentService {
    store: Arc<IncidentStore>,
    ingestor: StatusIngestor,
    reports: ReportAggregator,
    dispatcher: Arc<NotificationDispatcher>,
}

impl IncidentService {
    pub fn new(
        store: Arc<IncidentStore>,
        targets: Arc<dyn TargetDirectory>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            ingestor: StatusIngestor::new(store.clone(), targets, dispatcher.clone()),
            reports: ReportAggregator::new(store.clone()),
            store,
            dispatcher,
        }
    }

    pub fn with_background_notifications(mut self, enabled: bool) -> Self {
        self.ingestor = self.ingestor.with_background_notifications(enabled);
        self
    }

    /// Join background notification threads; call before the process exits.
    pub fn wait_for_pending_notifications(&self) -> usize {
        self.ingestor.wait_for_pending_notifications()
    }

    pub fn store(&self) -> &Arc<IncidentStore> {
        &self.store
    }

    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.dispatcher
    }

    /// Parse the wire status and report it for the target.
    pub fn report_status(
        &self,
        target_id: &str,
        status: &str,
        reported_by: &str,
    ) -> Result<ReportOutcome, AppError> {
        let status: TargetStatus = status.parse()?;
        self.ingestor.report_status(target_id, status, reported_by)
    }

    pub fn resolve_incident(
        &self,
        incident_id: &str,
        resolved_by: &str,
        note: &str,
    ) -> Result<Incident, AppError> {
        self.store.resolve(incident_id, resolved_by, note)
    }

    pub fn get_incident(&self, incident_id: &str) -> Result<Incident, AppError> {
        self.store.get(incident_id)
    }

    /// Most-recent-first listing, optionally for one target. The limit defaults to 50, must be
    /// positive, and is clamped to 1000.
    pub fn list_incidents(
        &self,
        target_id: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<Incident>, AppError> {
        let limit = validate::list_limit(limit)?;
        match target_id {
            Some(id) => self.store.list_by_target_limited(id, limit),
            None => self.store.list_recent(limit),
        }
    }

    pub fn list_incident_views(
        &self,
        target_id: Option<&str>,
        limit: Option<i64>,
        principals: &dyn PrincipalDirectory,
    ) -> Result<Vec<IncidentView>, AppError> {
        let incidents = self.list_incidents(target_id, limit)?;
        Ok(attach_names(incidents, principals))
    }

    pub fn monthly_report(&self, year: i32, month: u8) -> Result<Vec<MonthlyReportRow>, AppError> {
        self.reports.monthly_report(year, month)
    }
}
