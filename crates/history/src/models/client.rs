//! Client directory: devices known to the router, keyed by MAC address

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A device known to the router
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientEntry {
    /// Name reported by the device (DHCP hostname or vendor name)
    #[serde(default)]
    pub name: String,
    /// Nickname assigned by the router admin
    #[serde(default, rename = "nickName")]
    pub nickname: String,
    /// Current IP address
    #[serde(default)]
    pub ip: String,
}

impl ClientEntry {
    pub fn new(
        name: impl Into<String>,
        nickname: impl Into<String>,
        ip: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            nickname: nickname.into(),
            ip: ip.into(),
        }
    }
}

/// Read-only snapshot of the router's client list, fetched once per run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientDirectory {
    entries: HashMap<String, ClientEntry>,
}

impl ClientDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the entry for a MAC address
    pub fn insert(&mut self, mac: impl Into<String>, entry: ClientEntry) {
        self.entries.insert(mac.into(), entry);
    }

    /// Look up a device by MAC address (exact match, as the router reports it)
    pub fn lookup(&self, mac: &str) -> Option<&ClientEntry> {
        self.entries.get(mac)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, ClientEntry)> for ClientDirectory {
    fn from_iter<I: IntoIterator<Item = (String, ClientEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
