//! Status command for showing each user's most recent interval.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use at_db::Database;

use super::report::format_duration;

pub fn run<W: Write>(writer: &mut W, db: &Database, database_path: &Path) -> Result<()> {
    let latest = db.latest_interval_per_user()?;

    writeln!(writer, "Attendance status")?;
    writeln!(writer, "Database: {}", database_path.display())?;

    if latest.is_empty() {
        writeln!(writer, "No presence recorded.")?;
        return Ok(());
    }

    writeln!(writer, "Last seen:")?;
    for interval in latest {
        writeln!(
            writer,
            "- {}: {} (since {}, {})",
            interval.name,
            interval.end,
            interval.start.format("%H:%M:%S"),
            format_duration(interval.duration().num_seconds())
        )?;
    }

    Ok(())
}
