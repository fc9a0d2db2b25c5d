//! Entries command for listing saved time entries.
//!
//! Revised entries are hidden; only the latest revision of each is shown.
//! Times are printed in UTC.

use std::io::Write;

use anyhow::Result;
use rust_decimal::Decimal;
use wt_core::TimeEntry;
use wt_db::Database;

/// Formats a money amount with two decimals.
pub fn format_amount(amount: Decimal) -> String {
    format!("{amount:.2}")
}

/// Writes entries as a table followed by the billable total.
pub fn write_entries<W: Write>(out: &mut W, entries: &[TimeEntry]) -> Result<()> {
    if entries.is_empty() {
        writeln!(out, "No saved entries.")?;
        return Ok(());
    }

    writeln!(
        out,
        "{:<10}  {:<11}  {:>4}  {:>9}  TASK",
        "DATE", "TIME", "MIN", "AMOUNT"
    )?;
    for entry in entries {
        let time = format!(
            "{}-{}",
            entry.started_at().format("%H:%M"),
            entry.ended_at().format("%H:%M")
        );
        let amount = if entry.billable() {
            format_amount(entry.amount())
        } else {
            "-".to_string()
        };
        writeln!(
            out,
            "{:<10}  {:<11}  {:>4}  {:>9}  {}",
            entry.date().format("%Y-%m-%d"),
            time,
            entry.duration_minutes(),
            amount,
            entry.task()
        )?;
    }

    let total: Decimal = entries.iter().map(TimeEntry::amount).sum();
    writeln!(out)?;
    writeln!(out, "Total billable: {}", format_amount(total))?;
    Ok(())
}

/// Runs the entries command.
pub fn run<W: Write>(out: &mut W, db: &Database, json: bool) -> Result<()> {
    let entries = db.list_current_entries()?;
    tracing::debug!(count = entries.len(), "listing entries");
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&entries)?)?;
    } else {
        write_entries(out, &entries)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use insta::assert_snapshot;
    use wt_core::{ActivityRef, EntryEdit, EntryId, EntryParts, Rate};

    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn entry(task: &str, start: &str, end: &str, minutes: u64, rate: Option<u32>) -> TimeEntry {
        TimeEntry::from_parts(EntryParts {
            id: EntryId::generate(),
            task: task.to_string(),
            started_at: at(start),
            ended_at: at(end),
            duration_minutes: minutes,
            category: "maintenance".to_string(),
            activity: ActivityRef::None,
            billable: rate.is_some(),
            rate: rate.map_or(Rate::ZERO, Rate::per_hour),
            supersedes: None,
        })
    }

    fn render(db: &Database, json: bool) -> String {
        let mut out = Vec::new();
        run(&mut out, db, json).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_entries_empty() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(render(&db, false), "No saved entries.\n");
    }

    #[test]
    fn test_entries_table() {
        let mut db = Database::open_in_memory().unwrap();
        db.append_entry(&entry(
            "Replace conveyor belt",
            "2026-03-02T09:00:00Z",
            "2026-03-02T09:03:00Z",
            3,
            Some(500),
        ))
        .unwrap();
        db.append_entry(&entry(
            "Team meeting",
            "2026-03-02T10:00:00Z",
            "2026-03-02T10:30:00Z",
            30,
            None,
        ))
        .unwrap();

        assert_snapshot!(render(&db, false), @r"
        DATE        TIME          MIN     AMOUNT  TASK
        2026-03-02  09:00-09:03     3      25.00  Replace conveyor belt
        2026-03-02  10:00-10:30    30          -  Team meeting

        Total billable: 25.00
        ");
    }

    #[test]
    fn test_entries_hide_revised() {
        let mut db = Database::open_in_memory().unwrap();
        let original = entry(
            "Replace conveyor belt",
            "2026-03-02T09:00:00Z",
            "2026-03-02T09:03:00Z",
            3,
            Some(500),
        );
        let revised = original.revised(EntryEdit {
            duration_minutes: Some(6),
            ..EntryEdit::default()
        });
        db.append_entry(&original).unwrap();
        db.append_entry(&revised).unwrap();

        let output = render(&db, false);
        assert!(output.contains("Total billable: 50.00"), "{output}");
        assert_eq!(output.matches("Replace conveyor belt").count(), 1);
    }

    #[test]
    fn test_entries_json() {
        let mut db = Database::open_in_memory().unwrap();
        db.append_entry(&entry(
            "Replace conveyor belt",
            "2026-03-02T09:00:00Z",
            "2026-03-02T09:03:00Z",
            3,
            Some(500),
        ))
        .unwrap();

        let json: serde_json::Value = serde_json::from_str(&render(&db, true)).unwrap();
        let entries = json.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["task"], "Replace conveyor belt");
        assert_eq!(entries[0]["duration_minutes"], 3);
        assert_eq!(entries[0]["date"], "2026-03-02");
    }
}
