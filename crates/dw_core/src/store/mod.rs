use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Params, TransactionBehavior};
use time::{Date, Month, PrimitiveDateTime, Time};

use crate::clock::{format_ts, parse_ts, to_stored_precision, Clock};
use crate::domain::{Incident, IncidentStatus, MonthlyReportRow, Target};
use crate::error::{codes, AppError};
use crate::validate;

const INCIDENT_COLUMNS: &str = r#"
  id, target_id, target_name, target_address, status, opened_at, resolved_at,
  reported_by, resolved_by, resolution_note
"#;

/// Raw row as stored; timestamps and status are decoded in a second step so decoding errors
/// surface as `AppError` rather than as opaque rusqlite conversion failures.
struct IncidentRow {
    id: String,
    target_id: String,
    target_name: String,
    target_address: String,
    status: String,
    opened_at: String,
    resolved_at: Option<String>,
    reported_by: String,
    resolved_by: Option<String>,
    resolution_note: Option<String>,
}

impl IncidentRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            target_id: row.get(1)?,
            target_name: row.get(2)?,
            target_address: row.get(3)?,
            status: row.get(4)?,
            opened_at: row.get(5)?,
            resolved_at: row.get(6)?,
            reported_by: row.get(7)?,
            resolved_by: row.get(8)?,
            resolution_note: row.get(9)?,
        })
    }

    fn into_incident(self) -> Result<Incident, AppError> {
        let status = IncidentStatus::parse(&self.status).ok_or_else(|| {
            AppError::new(codes::DB_QUERY_FAILED, "Stored incident status is invalid")
                .with_details(format!("id={}; status={}", self.id, self.status))
        })?;
        let resolved_at = match self.resolved_at.as_deref() {
            Some(raw) => Some(parse_ts(raw)?),
            None => None,
        };
        Ok(Incident {
            id: self.id,
            target_id: self.target_id,
            target_name: self.target_name,
            target_address: self.target_address,
            status,
            opened_at: parse_ts(&self.opened_at)?,
            resolved_at,
            reported_by: self.reported_by,
            resolved_by: self.resolved_by,
            resolution_note: self.resolution_note,
        })
    }
}

fn query_incidents<P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<Incident>, AppError> {
    let mut stmt = conn.prepare(sql).map_err(|e| {
        AppError::new(codes::DB_QUERY_FAILED, "Failed to prepare incidents query")
            .with_details(e.to_string())
    })?;

    let rows = stmt.query_map(params, IncidentRow::from_row).map_err(|e| {
        AppError::new(codes::DB_QUERY_FAILED, "Failed to query incidents")
            .with_details(e.to_string())
    })?;

    let mut out = Vec::new();
    for r in rows {
        let row = r.map_err(|e| {
            AppError::new(codes::DB_QUERY_FAILED, "Failed to decode incident row")
                .with_details(e.to_string())
        })?;
        out.push(row.into_incident()?);
    }
    Ok(out)
}

fn find_by_id(conn: &Connection, incident_id: &str) -> Result<Option<Incident>, AppError> {
    let sql = format!("SELECT {INCIDENT_COLUMNS} FROM incidents WHERE id = ?1");
    let row = conn
        .query_row(&sql, [incident_id], IncidentRow::from_row)
        .optional()
        .map_err(|e| {
            AppError::new(codes::DB_QUERY_FAILED, "Failed to query incident")
                .with_details(e.to_string())
        })?;
    row.map(IncidentRow::into_incident).transpose()
}

fn find_open(conn: &Connection, target_id: &str) -> Result<Option<Incident>, AppError> {
    let sql = format!(
        "SELECT {INCIDENT_COLUMNS} FROM incidents WHERE target_id = ?1 AND status = 'OPEN'"
    );
    let row = conn
        .query_row(&sql, [target_id], IncidentRow::from_row)
        .optional()
        .map_err(|e| {
            AppError::new(codes::DB_QUERY_FAILED, "Failed to query open incident")
                .with_details(e.to_string())
        })?;
    row.map(IncidentRow::into_incident).transpose()
}

fn insert(conn: &Connection, incident: &Incident) -> Result<(), rusqlite::Error> {
    let opened_at = format_ts(incident.opened_at)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
    conn.execute(
        r#"
      INSERT INTO incidents(
        id, target_id, target_name, target_address, status, opened_at,
        reported_by
      ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
      "#,
        params![
            incident.id,
            incident.target_id,
            incident.target_name,
            incident.target_address,
            incident.status.as_str(),
            opened_at,
            incident.reported_by,
        ],
    )?;
    Ok(())
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn month_bounds(year: i32, month: u8) -> Result<(String, String), AppError> {
    let invalid = |e: time::error::ComponentRange| {
        AppError::invalid_argument("Invalid report period")
            .with_details(format!("year={year}; month={month}; err={e}"))
    };
    let m = Month::try_from(month).map_err(invalid)?;
    let start = Date::from_calendar_date(year, m, 1).map_err(invalid)?;
    let (next_year, next_month) = match m {
        Month::December => (year + 1, Month::January),
        other => (year, other.next()),
    };
    let end = Date::from_calendar_date(next_year, next_month, 1).map_err(invalid)?;
    Ok((
        format_ts(PrimitiveDateTime::new(start, Time::MIDNIGHT).assume_utc())?,
        format_ts(PrimitiveDateTime::new(end, Time::MIDNIGHT).assume_utc())?,
    ))
}

/// Durable record of incidents. The only writer of incident rows.
///
/// `open_incident` and `resolve` each run inside an IMMEDIATE transaction, so the
/// check-then-write sequence is serialized both across threads sharing this store and across
/// separate connections to the same database file. The partial unique index on open incidents
/// backs this up: a rejected insert is answered with the incident that won.
pub struct IncidentStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl IncidentStore {
    /// Wrap an existing connection, applying pending migrations.
    pub fn new(mut conn: Connection, clock: Arc<dyn Clock>) -> Result<Self, AppError> {
        crate::db::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock,
        })
    }

    pub fn open(path: &Path, clock: Arc<dyn Clock>) -> Result<Self, AppError> {
        Self::new(crate::db::open(path)?, clock)
    }

    pub fn open_in_memory(clock: Arc<dyn Clock>) -> Result<Self, AppError> {
        Self::new(crate::db::open_in_memory()?, clock)
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Open an incident for `target`, or return the one already open.
    ///
    /// Returns `(incident, already_open)`.
    pub fn open_incident(
        &self,
        target: &Target,
        reported_by: &str,
    ) -> Result<(Incident, bool), AppError> {
        validate::principal("reported_by", reported_by)?;

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| {
                AppError::new(codes::DB_TX_FAILED, "Failed to start incident transaction")
                    .with_details(e.to_string())
            })?;

        if let Some(existing) = find_open(&tx, &target.id)? {
            tx.rollback().map_err(|e| {
                AppError::new(codes::DB_TX_FAILED, "Failed to end incident transaction")
                    .with_details(e.to_string())
            })?;
            tracing::debug!(
                target_id = %target.id,
                incident_id = %existing.id,
                "incident already open"
            );
            return Ok((existing, true));
        }

        let incident = Incident::open(target, reported_by, to_stored_precision(self.clock.now()));
        match insert(&tx, &incident) {
            Ok(()) => {}
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().map_err(|e| {
                    AppError::new(codes::DB_TX_FAILED, "Failed to roll back incident insert")
                        .with_details(e.to_string())
                })?;
                let existing = find_open(&conn, &target.id)?.ok_or_else(|| {
                    AppError::new(
                        codes::DB_WRITE_FAILED,
                        "Open incident vanished after duplicate insert",
                    )
                    .with_details(format!("target_id={}", target.id))
                })?;
                tracing::debug!(
                    target_id = %target.id,
                    incident_id = %existing.id,
                    "duplicate open rejected by storage; returning existing incident"
                );
                return Ok((existing, true));
            }
            Err(e) => {
                return Err(
                    AppError::new(codes::DB_WRITE_FAILED, "Failed to insert incident")
                        .with_details(e.to_string()),
                );
            }
        }

        tx.commit().map_err(|e| {
            AppError::new(codes::DB_TX_FAILED, "Failed to commit incident")
                .with_details(e.to_string())
        })?;

        tracing::info!(
            target_id = %incident.target_id,
            incident_id = %incident.id,
            reported_by = %incident.reported_by,
            "incident opened"
        );
        Ok((incident, false))
    }

    /// Close an open incident. Exactly one of several concurrent resolvers succeeds.
    pub fn resolve(
        &self,
        incident_id: &str,
        resolved_by: &str,
        note: &str,
    ) -> Result<Incident, AppError> {
        let note = validate::resolution_note(note)?;
        validate::principal("resolved_by", resolved_by)?;

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| {
                AppError::new(codes::DB_TX_FAILED, "Failed to start resolve transaction")
                    .with_details(e.to_string())
            })?;

        let current = find_by_id(&tx, incident_id)?.ok_or_else(|| {
            AppError::not_found("Incident not found")
                .with_details(format!("incident_id={incident_id}"))
        })?;
        let resolved = current.resolve(
            resolved_by,
            note,
            to_stored_precision(self.clock.now()),
        )?;

        let resolved_at = match resolved.resolved_at {
            Some(at) => format_ts(at)?,
            None => {
                return Err(AppError::new(
                    codes::DB_WRITE_FAILED,
                    "Resolved incident is missing its resolution time",
                ))
            }
        };
        let changed = tx
            .execute(
                r#"
          UPDATE incidents
          SET status = 'RESOLVED', resolved_at = ?2, resolved_by = ?3, resolution_note = ?4
          WHERE id = ?1 AND status = 'OPEN'
          "#,
                params![incident_id, resolved_at, resolved_by, note],
            )
            .map_err(|e| {
                AppError::new(codes::DB_WRITE_FAILED, "Failed to resolve incident")
                    .with_details(e.to_string())
            })?;
        if changed != 1 {
            return Err(AppError::already_resolved("Incident is already resolved")
                .with_details(format!("incident_id={incident_id}")));
        }

        tx.commit().map_err(|e| {
            AppError::new(codes::DB_TX_FAILED, "Failed to commit resolution")
                .with_details(e.to_string())
        })?;

        tracing::info!(
            target_id = %resolved.target_id,
            incident_id = %resolved.id,
            resolved_by = %resolved_by,
            "incident resolved"
        );
        Ok(resolved)
    }

    pub fn get(&self, incident_id: &str) -> Result<Incident, AppError> {
        let conn = self.conn.lock();
        find_by_id(&conn, incident_id)?.ok_or_else(|| {
            AppError::not_found("Incident not found")
                .with_details(format!("incident_id={incident_id}"))
        })
    }

    pub fn find_open(&self, target_id: &str) -> Result<Option<Incident>, AppError> {
        let conn = self.conn.lock();
        find_open(&conn, target_id)
    }

    /// All incidents for a target, most recent first.
    pub fn list_by_target(&self, target_id: &str) -> Result<Vec<Incident>, AppError> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {INCIDENT_COLUMNS} FROM incidents WHERE target_id = ?1 \
             ORDER BY opened_at DESC, rowid DESC"
        );
        query_incidents(&conn, &sql, [target_id])
    }

    /// The `limit` most recent incidents for a target. `limit` is clamped to `1..=1000`.
    pub fn list_by_target_limited(
        &self,
        target_id: &str,
        limit: i64,
    ) -> Result<Vec<Incident>, AppError> {
        let limit = validate::clamp_limit(limit);
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {INCIDENT_COLUMNS} FROM incidents WHERE target_id = ?1 \
             ORDER BY opened_at DESC, rowid DESC LIMIT ?2"
        );
        query_incidents(&conn, &sql, params![target_id, limit])
    }

    /// Most recent incidents across all targets. `limit` is clamped to `1..=1000`.
    pub fn list_recent(&self, limit: i64) -> Result<Vec<Incident>, AppError> {
        let limit = validate::clamp_limit(limit);
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {INCIDENT_COLUMNS} FROM incidents ORDER BY opened_at DESC, rowid DESC LIMIT ?1"
        );
        query_incidents(&conn, &sql, [limit])
    }

    pub fn count_open(&self, target_id: &str) -> Result<i64, AppError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM incidents WHERE target_id = ?1 AND status = 'OPEN'",
            [target_id],
            |row| row.get(0),
        )
        .map_err(|e| {
            AppError::new(codes::DB_QUERY_FAILED, "Failed to count open incidents")
                .with_details(e.to_string())
        })
    }

    /// Downtime statistics per target for incidents opened within the calendar month (UTC).
    ///
    /// Still-open incidents count toward the mean with their elapsed time so far. Rows are ordered
    /// by `down_count` descending, then `target_id`. Name and address come from the most recently
    /// opened incident in each group.
    pub fn monthly_aggregate(&self, year: i32, month: u8) -> Result<Vec<MonthlyReportRow>, AppError> {
        let (start, end) = month_bounds(year, month)?;
        let incidents = {
            let conn = self.conn.lock();
            let sql = format!(
                "SELECT {INCIDENT_COLUMNS} FROM incidents \
                 WHERE opened_at >= ?1 AND opened_at < ?2 \
                 ORDER BY opened_at ASC, rowid ASC"
            );
            query_incidents(&conn, &sql, [&start, &end])?
        };
        let now = self.clock.now();

        struct Acc {
            name: String,
            address: String,
            down_count: i64,
            resolved_count: i64,
            total_seconds: f64,
        }

        let mut groups: BTreeMap<String, Acc> = BTreeMap::new();
        for inc in &incidents {
            let acc = groups.entry(inc.target_id.clone()).or_insert_with(|| Acc {
                name: String::new(),
                address: String::new(),
                down_count: 0,
                resolved_count: 0,
                total_seconds: 0.0,
            });
            acc.name.clone_from(&inc.target_name);
            acc.address.clone_from(&inc.target_address);
            acc.down_count += 1;
            if inc.resolved_at.is_some() {
                acc.resolved_count += 1;
            }
            acc.total_seconds += inc.elapsed_seconds(now);
        }

        let mut rows = groups
            .into_iter()
            .map(|(target_id, acc)| MonthlyReportRow {
                target_id,
                target_name: acc.name,
                target_address: acc.address,
                down_count: acc.down_count,
                resolved_count: acc.resolved_count,
                mean_resolution_seconds: acc.total_seconds / acc.down_count as f64,
            })
            .collect::<Vec<_>>();
        // Stable sort keeps target_id order among equal counts.
        rows.sort_by(|a, b| b.down_count.cmp(&a.down_count));
        Ok(rows)
    }
}
