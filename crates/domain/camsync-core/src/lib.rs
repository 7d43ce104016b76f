use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

pub mod plan;

/// Filenames present in the destination directory at scan time.
pub type LocalFileSet = HashSet<String>;

/// Identifies which request a device message answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandCode(pub u32);

impl CommandCode {
    pub const GET_FILE_LIST: CommandCode = CommandCode(8);
    pub const DELETE_FILES: CommandCode = CommandCode(9);
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            CommandCode::GET_FILE_LIST => write!(f, "get_file_list({})", self.0),
            CommandCode::DELETE_FILES => write!(f, "delete_files({})", self.0),
            CommandCode(other) => write!(f, "{other}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResponseStatus {
    Ok,
    Error,
    Other(String),
}

impl From<String> for ResponseStatus {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "ok" => ResponseStatus::Ok,
            "error" => ResponseStatus::Error,
            _ => ResponseStatus::Other(s),
        }
    }
}

impl From<ResponseStatus> for String {
    fn from(s: ResponseStatus) -> Self {
        match s {
            ResponseStatus::Ok => "ok".to_string(),
            ResponseStatus::Error => "error".to_string(),
            ResponseStatus::Other(other) => other,
        }
    }
}

/// Outbound command understood by the device-API client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum DeviceCommand {
    GetFileList,
    DeleteFiles { uris: Vec<String> },
}

impl DeviceCommand {
    /// Code the device echoes back in the matching response.
    pub fn code(&self) -> CommandCode {
        match self {
            DeviceCommand::GetFileList => CommandCode::GET_FILE_LIST,
            DeviceCommand::DeleteFiles { .. } => CommandCode::DELETE_FILES,
        }
    }
}

/// A decoded message pushed by the device transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceMessage {
    pub status: ResponseStatus,
    pub code: CommandCode,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl DeviceMessage {
    pub fn new(status: ResponseStatus, code: CommandCode, payload: serde_json::Value) -> Self {
        Self {
            status,
            code,
            payload,
        }
    }

    pub fn ok(code: CommandCode, payload: serde_json::Value) -> Self {
        Self::new(ResponseStatus::Ok, code, payload)
    }

    pub fn error(code: CommandCode) -> Self {
        Self::new(ResponseStatus::Error, code, serde_json::Value::Null)
    }

    pub fn is_error(&self) -> bool {
        self.status == ResponseStatus::Error
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ListingError {
    #[error("file list `uri` is not an array")]
    UrisNotArray,
    #[error("file list entry {index} is not a string")]
    InvalidUri { index: usize },
    #[error("file list `total_count` is not an unsigned integer")]
    InvalidTotal,
}

/// Payload of a successful file-list response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileListing {
    pub uris: Vec<String>,
    pub total_count: u64,
}

impl FileListing {
    /// An absent or `null` field counts as empty: the device omits empty
    /// repeated fields, so an empty card arrives without `uri`.
    pub fn from_payload(payload: &serde_json::Value) -> Result<Self, ListingError> {
        let raw: &[serde_json::Value] = match payload.get("uri") {
            None | Some(serde_json::Value::Null) => &[],
            Some(v) => v
                .as_array()
                .map(Vec::as_slice)
                .ok_or(ListingError::UrisNotArray)?,
        };

        let mut uris = Vec::with_capacity(raw.len());
        for (index, v) in raw.iter().enumerate() {
            let s = v.as_str().ok_or(ListingError::InvalidUri { index })?;
            uris.push(s.to_string());
        }

        let total_count = match payload.get("total_count") {
            None | Some(serde_json::Value::Null) => 0,
            Some(v) => v.as_u64().ok_or(ListingError::InvalidTotal)?,
        };

        Ok(Self { uris, total_count })
    }
}

/// A remote file as seen in the listing: camera-relative URI plus its basename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileEntry {
    pub uri: String,
    pub name: String,
}

impl RemoteFileEntry {
    /// Returns `None` when the URI has no usable basename.
    pub fn from_uri(uri: &str) -> Option<Self> {
        let name = plan::basename(uri)?;
        Some(Self {
            uri: uri.to_string(),
            name: name.to_string(),
        })
    }
}

/// Remote files absent locally, keyed by local filename.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    downloads: BTreeMap<String, String>,
}

impl SyncPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later inserts for the same name replace earlier ones.
    pub fn insert(&mut self, entry: RemoteFileEntry) -> Option<String> {
        self.downloads.insert(entry.name, entry.uri)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.downloads.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.downloads.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.downloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.downloads.is_empty()
    }

    /// `(filename, uri)` pairs in filename order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.downloads
            .iter()
            .map(|(name, uri)| (name.as_str(), uri.as_str()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.downloads.keys().map(String::as_str)
    }
}

impl FromIterator<RemoteFileEntry> for SyncPlan {
    fn from_iter<T: IntoIterator<Item = RemoteFileEntry>>(iter: T) -> Self {
        let mut plan = SyncPlan::new();
        for entry in iter {
            plan.insert(entry);
        }
        plan
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Success,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResult {
    pub name: String,
    pub uri: String,
    pub bytes_written: u64,
    /// `content-length` reported by the server, if any.
    pub expected_len: Option<u64>,
    pub outcome: TransferOutcome,
}

impl TransferResult {
    pub fn succeeded(&self) -> bool {
        self.outcome == TransferOutcome::Success
    }

    /// Whether the local copy has been checked against the source.
    ///
    /// No verification scheme exists yet, so nothing qualifies for remote
    /// deletion.
    pub fn is_verified(&self) -> bool {
        false
    }
}

/// Aggregated outcome of one download pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub attempted: usize,
    pub succeeded: usize,
    /// `(filename, reason)` for every failed transfer.
    pub failed: Vec<(String, String)>,
    pub bytes_written: u64,
    pub deletions_skipped: usize,
    pub results: Vec<TransferResult>,
}

impl SyncSummary {
    pub fn from_results(results: Vec<TransferResult>) -> Self {
        let mut summary = SyncSummary {
            attempted: results.len(),
            ..Default::default()
        };
        for res in &results {
            match &res.outcome {
                TransferOutcome::Success => {
                    summary.succeeded += 1;
                    summary.bytes_written += res.bytes_written;
                }
                TransferOutcome::Failed(reason) => {
                    summary.failed.push((res.name.clone(), reason.clone()));
                }
            }
        }
        summary.results = results;
        summary
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn listing_reads_uris_and_total() {
        let listing = FileListing::from_payload(
            &json!({ "uri": ["DCIM/a.mp4", "DCIM/b.mp4"], "total_count": 2 }),
        )
        .unwrap();
        assert_eq!(listing.total_count, 2);
        assert_eq!(listing.uris, vec!["DCIM/a.mp4", "DCIM/b.mp4"]);
    }

    #[test]
    fn missing_total_defaults_to_zero() {
        let listing = FileListing::from_payload(&json!({ "uri": ["DCIM/a.mp4"] })).unwrap();
        assert_eq!(listing.total_count, 0);
        assert_eq!(listing.uris.len(), 1);
    }

    #[test]
    fn listing_rejects_non_string_uri() {
        let err = FileListing::from_payload(&json!({ "uri": ["ok", 7] })).unwrap_err();
        assert_eq!(err, ListingError::InvalidUri { index: 1 });
    }

    #[test]
    fn absent_or_null_uri_is_an_empty_listing() {
        let listing = FileListing::from_payload(&json!({ "total_count": 0 })).unwrap();
        assert_eq!(listing, FileListing::default());

        let listing = FileListing::from_payload(&json!({ "uri": null })).unwrap();
        assert!(listing.uris.is_empty());

        let listing = FileListing::from_payload(&serde_json::Value::Null).unwrap();
        assert!(listing.uris.is_empty());
    }

    #[test]
    fn non_array_uri_is_rejected() {
        let err = FileListing::from_payload(&json!({ "uri": "DCIM/a.mp4" })).unwrap_err();
        assert_eq!(err, ListingError::UrisNotArray);
    }

    #[test]
    fn status_parses_case_insensitively() {
        let msg: DeviceMessage =
            serde_json::from_str(r#"{ "status": "ERROR", "code": 8 }"#).unwrap();
        assert!(msg.is_error());
        assert_eq!(msg.code, CommandCode::GET_FILE_LIST);
        assert_eq!(msg.payload, serde_json::Value::Null);
    }

    #[test]
    fn command_serializes_with_tag() {
        let s = serde_json::to_string(&DeviceCommand::DeleteFiles {
            uris: vec!["DCIM/a.mp4".into()],
        })
        .unwrap();
        assert_eq!(s, r#"{"command":"delete_files","uris":["DCIM/a.mp4"]}"#);
        assert_eq!(
            serde_json::to_string(&DeviceCommand::GetFileList).unwrap(),
            r#"{"command":"get_file_list"}"#
        );
    }

    #[test]
    fn summary_counts_failures_by_name() {
        let ok = TransferResult {
            name: "a.mp4".into(),
            uri: "DCIM/a.mp4".into(),
            bytes_written: 10,
            expected_len: Some(10),
            outcome: TransferOutcome::Success,
        };
        let bad = TransferResult {
            name: "b.mp4".into(),
            uri: "DCIM/b.mp4".into(),
            bytes_written: 0,
            expected_len: None,
            outcome: TransferOutcome::Failed("HTTP status 500".into()),
        };
        let summary = SyncSummary::from_results(vec![ok, bad]);
        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.bytes_written, 10);
        assert_eq!(
            summary.failed,
            vec![("b.mp4".to_string(), "HTTP status 500".to_string())]
        );
        assert!(!summary.is_clean());
    }
}
