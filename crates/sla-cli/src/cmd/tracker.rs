use crate::output::{print_json, print_table};
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use clap::Subcommand;
use sla_core::{SlaTracker, TrackerDb, TrackerStatus};
use std::path::Path;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Subcommand definition
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum TrackerSubcommand {
    /// Start tracking an SLA for a ticket
    Add {
        /// Ticket identifier
        #[arg(long)]
        ticket: String,
        /// SLA name, e.g. "Response Time"
        #[arg(long)]
        sla_name: String,
        /// Deadline as minutes from now (negative for already overdue)
        #[arg(long, allow_negative_numbers = true, conflicts_with = "breach_time")]
        due_in_mins: Option<i64>,
        /// Deadline as an RFC 3339 timestamp
        #[arg(long)]
        breach_time: Option<String>,
        /// Deadline counts business hours only (stored, not yet applied)
        #[arg(long)]
        business_hours: bool,
    },

    /// List trackers
    List {
        /// Filter by status: running, breached, paused, completed
        #[arg(long)]
        status: Option<String>,
    },

    /// Show one tracker
    Show {
        /// Tracker id or unique id prefix
        id: String,
    },

    /// Pause a running tracker
    Pause { id: String },

    /// Resume a paused tracker
    Resume { id: String },

    /// Mark a tracker completed
    Complete { id: String },

    /// Show status history for a ticket
    History { ticket: String },
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn run(db_path: &Path, subcmd: TrackerSubcommand, json: bool) -> Result<()> {
    let db = TrackerDb::open(db_path)
        .with_context(|| format!("failed to open tracker database {}", db_path.display()))?;

    match subcmd {
        TrackerSubcommand::Add {
            ticket,
            sla_name,
            due_in_mins,
            breach_time,
            business_hours,
        } => add(
            &db,
            &ticket,
            &sla_name,
            deadline(due_in_mins, breach_time.as_deref())?,
            business_hours,
            json,
        ),
        TrackerSubcommand::List { status } => list(&db, status.as_deref(), json),
        TrackerSubcommand::Show { id } => show(&db, &id, json),
        TrackerSubcommand::Pause { id } => set_status(&db, &id, TrackerStatus::Paused, json),
        TrackerSubcommand::Resume { id } => set_status(&db, &id, TrackerStatus::Running, json),
        TrackerSubcommand::Complete { id } => {
            set_status(&db, &id, TrackerStatus::Completed, json)
        }
        TrackerSubcommand::History { ticket } => history(&db, &ticket, json),
    }
}

fn deadline(due_in_mins: Option<i64>, breach_time: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    if let Some(mins) = due_in_mins {
        return Ok(Some(Utc::now() + TimeDelta::minutes(mins)));
    }
    breach_time
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&Utc))
                .with_context(|| format!("invalid --breach-time '{raw}', expected RFC 3339"))
        })
        .transpose()
}

/// Accept a full UUID or a prefix that matches exactly one tracker.
fn resolve_id(db: &TrackerDb, raw: &str) -> Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(raw) {
        return Ok(id);
    }
    let prefix = raw.to_ascii_lowercase();
    let matches: Vec<Uuid> = db
        .list_all()?
        .into_iter()
        .map(|t| t.id)
        .filter(|id| id.to_string().starts_with(&prefix))
        .collect();
    match matches.as_slice() {
        [id] => Ok(*id),
        [] => Err(anyhow!("no tracker matches '{raw}'")),
        _ => Err(anyhow!(
            "'{raw}' matches {} trackers; use a longer prefix",
            matches.len()
        )),
    }
}

fn fmt_time(t: Option<DateTime<Utc>>) -> String {
    t.map(|t| t.format("%Y-%m-%d %H:%M:%SZ").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn print_tracker(t: &SlaTracker) {
    println!("Tracker:  {}", t.id);
    println!("Ticket:   {}", t.ticket_id);
    println!("SLA:      {}", t.sla_name);
    println!("Status:   {}", t.status);
    println!("Deadline: {}", fmt_time(t.breach_time));
    if t.business_hours {
        println!("Business hours: yes");
    }
    println!("Updated:  {}", fmt_time(Some(t.updated_at)));
}

// ---------------------------------------------------------------------------
// add
// ---------------------------------------------------------------------------

fn add(
    db: &TrackerDb,
    ticket: &str,
    sla_name: &str,
    breach_time: Option<DateTime<Utc>>,
    business_hours: bool,
    json: bool,
) -> Result<()> {
    if ticket.trim().is_empty() {
        bail!("--ticket must not be empty");
    }
    let mut tracker = SlaTracker::new(ticket, sla_name, breach_time);
    tracker.business_hours = business_hours;
    db.insert(&tracker)?;

    if json {
        print_json(&tracker)?;
    } else {
        println!("Added tracker {} for ticket {ticket}", tracker.id);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// list / show
// ---------------------------------------------------------------------------

fn list(db: &TrackerDb, status: Option<&str>, json: bool) -> Result<()> {
    let trackers = match status {
        Some(s) => {
            let status: TrackerStatus = s.parse()?;
            let mut found = db.list_by_status(status)?;
            found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            found
        }
        None => db.list_all()?,
    };

    if json {
        return print_json(&trackers);
    }
    if trackers.is_empty() {
        println!("No trackers.");
        return Ok(());
    }
    let rows = trackers
        .iter()
        .map(|t| {
            vec![
                t.id.to_string()[..8].to_string(),
                t.ticket_id.clone(),
                t.sla_name.clone(),
                t.status.to_string(),
                fmt_time(t.breach_time),
            ]
        })
        .collect();
    print_table(&["ID", "TICKET", "SLA", "STATUS", "DEADLINE"], rows);
    Ok(())
}

fn show(db: &TrackerDb, raw_id: &str, json: bool) -> Result<()> {
    let tracker = db.get(resolve_id(db, raw_id)?)?;
    if json {
        print_json(&tracker)
    } else {
        print_tracker(&tracker);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// pause / resume / complete
// ---------------------------------------------------------------------------

fn set_status(db: &TrackerDb, raw_id: &str, status: TrackerStatus, json: bool) -> Result<()> {
    let tracker = db.set_status(resolve_id(db, raw_id)?, status)?;
    if json {
        print_json(&tracker)
    } else {
        println!("Tracker {} is now {}", tracker.id, tracker.status);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// history
// ---------------------------------------------------------------------------

fn history(db: &TrackerDb, ticket: &str, json: bool) -> Result<()> {
    let entries = db.history_for_ticket(ticket)?;
    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No history for ticket {ticket}.");
        return Ok(());
    }
    let rows = entries
        .iter()
        .map(|e| {
            vec![
                fmt_time(Some(e.changed_at)),
                e.old_status.clone(),
                e.new_status.clone(),
            ]
        })
        .collect();
    print_table(&["CHANGED", "FROM", "TO"], rows);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_from_minutes_is_relative_to_now() {
        let before = Utc::now();
        let d = deadline(Some(-5), None).unwrap().unwrap();
        assert!(d <= before - TimeDelta::minutes(5) + TimeDelta::seconds(5));
        assert!(d >= before - TimeDelta::minutes(5) - TimeDelta::seconds(5));
    }

    #[test]
    fn deadline_from_rfc3339_is_normalized_to_utc() {
        let d = deadline(None, Some("2026-03-01T10:00:00+02:00"))
            .unwrap()
            .unwrap();
        assert_eq!(d.to_rfc3339(), "2026-03-01T08:00:00+00:00");
    }

    #[test]
    fn no_deadline_is_none_and_garbage_is_an_error() {
        assert!(deadline(None, None).unwrap().is_none());
        assert!(deadline(None, Some("tomorrow")).is_err());
    }
}
