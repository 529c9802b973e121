use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;

/// A monitored endpoint, owned by an external collaborator and referenced here by id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Target {
    pub id: String,
    pub name: String,
    pub address: String,
}

/// Status a monitoring client reports for a target.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum TargetStatus {
    Up,
    Down,
    Unknown,
}

impl FromStr for TargetStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UP" => Ok(Self::Up),
            "DOWN" => Ok(Self::Down),
            "UNKNOWN" => Ok(Self::Unknown),
            _ => Err(
                AppError::invalid_argument("Status must be one of UP, DOWN, UNKNOWN")
                    .with_details(format!("status={s}")),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum IncidentStatus {
    Open,
    Resolved,
}

impl IncidentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Resolved => "RESOLVED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "OPEN" => Some(Self::Open),
            "RESOLVED" => Some(Self::Resolved),
            _ => None,
        }
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One continuous downtime episode for a target.
///
/// Target name and address are a snapshot taken when the incident opened, so renaming a target
/// later never rewrites history. The only permitted mutation is OPEN -> RESOLVED.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Incident {
    pub id: String,
    pub target_id: String,
    pub target_name: String,
    pub target_address: String,
    pub status: IncidentStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub opened_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub resolved_at: Option<OffsetDateTime>,
    pub reported_by: String,
    pub resolved_by: Option<String>,
    pub resolution_note: Option<String>,
}

impl Incident {
    /// Build a fully-populated OPEN incident. Ids and timestamps are assigned here, never by storage.
    pub fn open(target: &Target, reported_by: &str, opened_at: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            target_id: target.id.clone(),
            target_name: target.name.clone(),
            target_address: target.address.clone(),
            status: IncidentStatus::Open,
            opened_at,
            resolved_at: None,
            reported_by: reported_by.to_string(),
            resolved_by: None,
            resolution_note: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == IncidentStatus::Open
    }

    /// Apply the single OPEN -> RESOLVED transition.
    pub fn resolve(
        mut self,
        resolved_by: &str,
        note: &str,
        resolved_at: OffsetDateTime,
    ) -> Result<Self, AppError> {
        if !self.is_open() {
            return Err(AppError::already_resolved("Incident is already resolved")
                .with_details(format!("incident_id={}", self.id)));
        }
        self.status = IncidentStatus::Resolved;
        self.resolved_at = Some(resolved_at);
        self.resolved_by = Some(resolved_by.to_string());
        self.resolution_note = Some(note.to_string());
        Ok(self)
    }

    /// Seconds from detection to resolution, or to `now` while still open.
    pub fn elapsed_seconds(&self, now: OffsetDateTime) -> f64 {
        let end = self.resolved_at.unwrap_or(now);
        (end - self.opened_at).as_seconds_f64()
    }
}

/// Transient "target down" event handed to the notification dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationEvent {
    pub target_id: String,
    pub target_name: String,
    pub target_address: String,
    pub reported_by: String,
}

impl From<&Incident> for NotificationEvent {
    fn from(incident: &Incident) -> Self {
        Self {
            target_id: incident.target_id.clone(),
            target_name: incident.target_name.clone(),
            target_address: incident.target_address.clone(),
            reported_by: incident.reported_by.clone(),
        }
    }
}

/// Per-target downtime statistics for one calendar month. Computed per query, never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthlyReportRow {
    pub target_id: String,
    pub target_name: String,
    pub target_address: String,
    pub down_count: i64,
    pub resolved_count: i64,
    pub mean_resolution_seconds: f64,
}
