//! Users command: print the whitelist grouped by user.

use std::io::Write;

use anyhow::Result;
use at_core::UserDirectory;

pub fn run<W: Write>(writer: &mut W, directory: &UserDirectory) -> Result<()> {
    if directory.is_empty() {
        writeln!(writer, "No users in whitelist.")?;
        return Ok(());
    }

    for name in directory.names() {
        let macs: Vec<&str> = directory
            .entries()
            .iter()
            .filter(|entry| entry.name == name)
            .map(|entry| entry.mac.as_str())
            .collect();
        writeln!(writer, "{name}: {}", macs.join(", "))?;
    }

    Ok(())
}
