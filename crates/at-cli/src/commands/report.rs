//! Report command: per-user presence for one day.

use std::collections::BTreeMap;
use std::io::Write;

use anyhow::Result;
use at_core::{AttendanceInterval, UserDirectory};
use at_db::Database;
use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::Serialize;

/// One user's intervals for the reported day, as fractional hours of the day.
#[derive(Debug, Serialize)]
struct UserDay {
    name: String,
    date: BTreeMap<String, Vec<HourSpan>>,
}

#[derive(Debug, Serialize)]
struct HourSpan {
    start: f64,
    end: f64,
}

pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    directory: &UserDirectory,
    date: NaiveDate,
    json: bool,
) -> Result<()> {
    let intervals = db.list_intervals_on(date)?;
    let names = directory.names();

    if json {
        let report: Vec<UserDay> = names
            .iter()
            .map(|name| user_day(name, date, &intervals))
            .collect();
        writeln!(writer, "{}", serde_json::to_string_pretty(&report)?)?;
        return Ok(());
    }

    writeln!(writer, "Attendance on {date}")?;
    if names.is_empty() {
        writeln!(writer, "No users in whitelist.")?;
        return Ok(());
    }
    for name in names {
        let spans: Vec<&AttendanceInterval> = intervals
            .iter()
            .filter(|interval| interval.name == name)
            .collect();
        if spans.is_empty() {
            writeln!(writer, "- {name}: absent")?;
            continue;
        }
        let total_secs: i64 = spans
            .iter()
            .map(|interval| interval.duration().num_seconds())
            .sum();
        let rendered = spans
            .iter()
            .map(|interval| {
                format!(
                    "{}-{}",
                    interval.start.format("%H:%M:%S"),
                    interval.end.format("%H:%M:%S")
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(
            writer,
            "- {name} ({}): {rendered}",
            format_duration(total_secs)
        )?;
    }
    Ok(())
}

fn user_day(name: &str, date: NaiveDate, intervals: &[AttendanceInterval]) -> UserDay {
    let spans: Vec<HourSpan> = intervals
        .iter()
        .filter(|interval| interval.name == name)
        .map(|interval| HourSpan {
            start: relative_hour(interval.start.time()),
            end: relative_hour(interval.end.time()),
        })
        .collect();
    let mut days = BTreeMap::new();
    if !spans.is_empty() {
        days.insert(date.format("%Y-%m-%d").to_string(), spans);
    }
    UserDay {
        name: name.to_string(),
        date: days,
    }
}

/// Hours since midnight, e.g. `10:30:00` is `10.5`.
fn relative_hour(time: NaiveTime) -> f64 {
    f64::from(time.hour()) + f64::from(time.minute()) / 60.0 + f64::from(time.second()) / 3600.0
}

/// Formats seconds as "Xh Ym" if >= 1 hour, "Xm" otherwise.
pub fn format_duration(secs: i64) -> String {
    if secs < 0 {
        return "0m".to_string();
    }
    let total_minutes = secs / 60;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    if hours >= 1 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use at_core::{UserEntry, parse_timestamp};
    use insta::assert_snapshot;

    fn directory() -> UserDirectory {
        UserDirectory::new(vec![
            UserEntry {
                name: "alice".to_string(),
                mac: "AA:BB:CC:DD:EE:01".to_string(),
            },
            UserEntry {
                name: "bob".to_string(),
                mac: "AA:BB:CC:DD:EE:02".to_string(),
            },
        ])
    }

    fn seeded_db() -> Database {
        let mut db = Database::open_in_memory().unwrap();
        for (name, at) in [
            ("alice", "2025-03-02 09:00:00"),
            ("alice", "2025-03-02 10:30:00"),
            ("alice", "2025-03-02 10:45:00"),
            ("alice", "2025-03-03 09:00:00"),
            ("carol", "2025-03-02 12:00:00"),
        ] {
            db.record_presence(name, parse_timestamp(at).unwrap())
                .unwrap();
        }
        db
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 2).unwrap()
    }

    #[test]
    fn text_report_lists_whitelisted_users() {
        let mut output = Vec::new();
        run(&mut output, &seeded_db(), &directory(), day(), false).unwrap();
        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @r"
        Attendance on 2025-03-02
        - alice (15m): 09:00:00-09:00:00, 10:30:00-10:45:00
        - bob: absent
        ");
    }

    #[test]
    fn json_report_uses_fractional_hours() {
        let mut output = Vec::new();
        run(&mut output, &seeded_db(), &directory(), day(), true).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(
            value,
            serde_json::json!([
                {
                    "name": "alice",
                    "date": {
                        "2025-03-02": [
                            {"start": 9.0, "end": 9.0},
                            {"start": 10.5, "end": 10.75}
                        ]
                    }
                },
                {"name": "bob", "date": {}}
            ])
        );
    }

    #[test]
    fn empty_whitelist_is_reported() {
        let mut output = Vec::new();
        run(
            &mut output,
            &seeded_db(),
            &UserDirectory::default(),
            day(),
            false,
        )
        .unwrap();
        let output = String::from_utf8(output).unwrap();
        assert!(output.contains("No users in whitelist."));
    }

    #[test]
    fn format_duration_hours_and_minutes() {
        assert_eq!(format_duration(0), "0m");
        assert_eq!(format_duration(59 * 60), "59m");
        assert_eq!(format_duration(90 * 60 + 30), "1h 30m");
        assert_eq!(format_duration(-5), "0m");
    }

    #[test]
    fn relative_hour_includes_seconds() {
        let time = NaiveTime::from_hms_opt(10, 30, 36).unwrap();
        assert!((relative_hour(time) - 10.51).abs() < 1e-9);
    }
}
