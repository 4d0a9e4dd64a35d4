//! Whitelist of known users and their devices.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Whitelist loading errors.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("failed to read whitelist {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid whitelist {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A client device currently connected to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub mac: String,
    #[serde(default)]
    pub name: String,
}

/// One whitelist entry: a user and one of their devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub name: String,
    #[serde(rename = "MAC")]
    pub mac: String,
}

/// The static device-to-user mapping.
///
/// Loaded once at startup and never modified afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserDirectory {
    entries: Vec<UserEntry>,
}

impl UserDirectory {
    pub const fn new(entries: Vec<UserEntry>) -> Self {
        Self { entries }
    }

    /// Loads a JSON array of `{"name": ..., "MAC": ...}` objects.
    pub fn load(path: &Path) -> Result<Self, DirectoryError> {
        let content = std::fs::read_to_string(path).map_err(|source| DirectoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let entries: Vec<UserEntry> =
            serde_json::from_str(&content).map_err(|source| DirectoryError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::debug!(path = %path.display(), entries = entries.len(), "loaded whitelist");
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[UserEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct user names in whitelist order.
    pub fn names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .map(|entry| entry.name.as_str())
            .filter(|name| seen.insert(*name))
            .collect()
    }

    /// Names of users with at least one device in `devices`.
    ///
    /// Users are returned once each, in whitelist order. MAC addresses match
    /// case-insensitively.
    pub fn resolve_online(&self, devices: &[Device]) -> Vec<String> {
        let online: HashSet<String> = devices
            .iter()
            .map(|device| device.mac.to_ascii_uppercase())
            .collect();
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .filter(|entry| online.contains(&entry.mac.to_ascii_uppercase()))
            .filter(|entry| seen.insert(entry.name.as_str()))
            .map(|entry| entry.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    fn entry(name: &str, mac: &str) -> UserEntry {
        UserEntry {
            name: name.to_string(),
            mac: mac.to_string(),
        }
    }

    fn device(mac: &str) -> Device {
        Device {
            mac: mac.to_string(),
            name: "phone".to_string(),
        }
    }

    #[test]
    fn load_reads_uppercase_mac_key() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"name":"alice","MAC":"AA:BB:CC:DD:EE:01"}},{{"name":"bob","MAC":"AA:BB:CC:DD:EE:02"}}]"#
        )
        .unwrap();
        let directory = UserDirectory::load(file.path()).unwrap();
        assert_eq!(
            directory.entries(),
            &[
                entry("alice", "AA:BB:CC:DD:EE:01"),
                entry("bob", "AA:BB:CC:DD:EE:02")
            ]
        );
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let temp = tempfile::tempdir().unwrap();
        let err = UserDirectory::load(&temp.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, DirectoryError::Io { .. }));
    }

    #[test]
    fn load_rejects_wrong_shape() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"alice":"AA:BB:CC:DD:EE:01"}}"#).unwrap();
        let err = UserDirectory::load(file.path()).unwrap_err();
        assert!(matches!(err, DirectoryError::Parse { .. }));
    }

    #[test]
    fn resolve_online_keeps_whitelist_order() {
        let directory = UserDirectory::new(vec![
            entry("alice", "AA:BB:CC:DD:EE:01"),
            entry("bob", "AA:BB:CC:DD:EE:02"),
            entry("carol", "AA:BB:CC:DD:EE:03"),
        ]);
        let online = directory.resolve_online(&[
            device("AA:BB:CC:DD:EE:03"),
            device("AA:BB:CC:DD:EE:01"),
            device("FF:FF:FF:FF:FF:FF"),
        ]);
        assert_eq!(online, vec!["alice", "carol"]);
    }

    #[test]
    fn resolve_online_ignores_mac_case() {
        let directory = UserDirectory::new(vec![entry("alice", "aa:bb:cc:dd:ee:01")]);
        let online = directory.resolve_online(&[device("AA:BB:CC:DD:EE:01")]);
        assert_eq!(online, vec!["alice"]);
    }

    #[test]
    fn user_with_two_devices_resolves_once() {
        let directory = UserDirectory::new(vec![
            entry("alice", "AA:BB:CC:DD:EE:01"),
            entry("alice", "AA:BB:CC:DD:EE:02"),
        ]);
        let online =
            directory.resolve_online(&[device("AA:BB:CC:DD:EE:01"), device("AA:BB:CC:DD:EE:02")]);
        assert_eq!(online, vec!["alice"]);
        assert_eq!(directory.names(), vec!["alice"]);
    }

    #[test]
    fn no_devices_means_nobody_online() {
        let directory = UserDirectory::new(vec![entry("alice", "AA:BB:CC:DD:EE:01")]);
        assert!(directory.resolve_online(&[]).is_empty());
    }
}
