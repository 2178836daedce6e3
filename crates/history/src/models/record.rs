//! Raw web-history rows as returned by the router

/// Field index of the client MAC address in a raw row
pub const MAC_FIELD: usize = 0;
/// Field index of the unix timestamp (seconds) in a raw row
pub const TIMESTAMP_FIELD: usize = 1;

/// One raw history entry: `[mac, unix_seconds, host, ...]`
///
/// Fields beyond the timestamp are opaque and passed through unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRow {
    fields: Vec<String>,
}

impl HistoryRow {
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// MAC address of the client, empty if the router did not report one
    pub fn mac(&self) -> &str {
        self.fields.get(MAC_FIELD).map(String::as_str).unwrap_or("")
    }

    /// Timestamp field as sent by the router
    pub fn raw_timestamp(&self) -> Option<&str> {
        self.fields.get(TIMESTAMP_FIELD).map(String::as_str)
    }

    /// Timestamp field parsed as unix seconds
    pub fn timestamp_secs(&self) -> Option<i64> {
        self.raw_timestamp()?.trim().parse().ok()
    }

    /// Fields after the timestamp (host and anything else the router adds)
    pub fn trailing(&self) -> &[String] {
        self.fields.get(TIMESTAMP_FIELD + 1..).unwrap_or(&[])
    }
}

impl<S: Into<String>> FromIterator<S> for HistoryRow {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}
