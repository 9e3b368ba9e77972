use std::{
    collections::BTreeMap,
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};

use time::{format_description::well_known::Rfc2822, OffsetDateTime};

pub const CONTENT_LENGTH: &str = "content-length";
pub const CONTENT_TYPE: &str = "content-type";
pub const LAST_MODIFIED: &str = "last-modified";
pub const REQUEST_URL: &str = "x-request-url";

pub const DEFAULT_MIMETYPE: &str = "application/octet-stream";

/// One key as returned by a listing call.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: i64,
    pub modified_time: SystemTime,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListRequest {
    pub prefix: String,
    /// `None` flattens nested pseudo-directories into one listing.
    pub delimiter: Option<String>,
    pub marker: Option<String>,
    pub max_keys: i32,
}

/// A single page of a delimiter/prefix listing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListPage {
    pub objects: Vec<ObjectSummary>,
    pub common_prefixes: Vec<String>,
    /// Set when the backend has more keys after this page.
    pub next_marker: Option<String>,
}

/// Structured view of an object's headers, as decoded by the backend.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectInfo {
    pub content_type: String,
    pub content_length: u64,
    pub last_modified: Option<SystemTime>,
    pub url: String,
}

impl ObjectInfo {
    /// Raw header map carrying the same values as `self`.
    pub fn headers(&self) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        headers.insert(CONTENT_TYPE.to_string(), self.content_type.clone());
        headers.insert(CONTENT_LENGTH.to_string(), self.content_length.to_string());
        headers.insert(REQUEST_URL.to_string(), self.url.clone());

        if let Some(modified) = self.last_modified.and_then(format_http_date) {
            headers.insert(LAST_MODIFIED.to_string(), modified);
        }

        headers
    }

    pub fn epoch_seconds(&self) -> Option<i64> {
        self.last_modified.map(epoch_seconds)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ObjectHead {
    pub headers: BTreeMap<String, String>,
    pub info: ObjectInfo,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ObjectBody {
    pub headers: BTreeMap<String, String>,
    pub info: ObjectInfo,
    pub body: Vec<u8>,
}

/// Failure reported by an object-storage client.
///
/// `status` is the HTTP status of the backend answer when one was received;
/// transport failures carry `None`.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientError {
    pub status: Option<u16>,
    pub message: String,
}

impl ClientError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Some(404), message)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (status {})", self.message, status),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ClientError {}

pub fn epoch_seconds(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(err) => -(err.duration().as_secs() as i64),
    }
}

pub fn format_http_date(time: SystemTime) -> Option<String> {
    OffsetDateTime::from(time).format(&Rfc2822).ok()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_epoch_seconds() {
        let cases = vec![
            (UNIX_EPOCH, 0),
            (UNIX_EPOCH + Duration::from_secs(1_700_000_000), 1_700_000_000),
            (UNIX_EPOCH + Duration::from_millis(1_500), 1),
        ];

        for (time, expected) in cases {
            assert_eq!(
                epoch_seconds(time),
                expected,
                "failed epoch seconds for case: {}",
                expected
            );
        }
    }

    #[test]
    fn test_info_headers() {
        let info = ObjectInfo {
            content_type: "text/plain".to_string(),
            content_length: 12,
            last_modified: Some(UNIX_EPOCH + Duration::from_secs(1_445_412_480)),
            url: "mem://bucket/hello.txt".to_string(),
        };

        let headers = info.headers();

        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "text/plain");
        assert_eq!(headers.get(CONTENT_LENGTH).unwrap(), "12");
        assert_eq!(headers.get(REQUEST_URL).unwrap(), "mem://bucket/hello.txt");
        assert_eq!(
            headers.get(LAST_MODIFIED).unwrap(),
            "Wed, 21 Oct 2015 07:28:00 +0000"
        );
    }

    #[test]
    fn test_info_headers_without_modified_time() {
        let info = ObjectInfo {
            content_type: DEFAULT_MIMETYPE.to_string(),
            content_length: 0,
            last_modified: None,
            url: String::new(),
        };

        assert!(info.headers().get(LAST_MODIFIED).is_none());
        assert_eq!(info.epoch_seconds(), None);
    }

    #[test]
    fn test_client_error() {
        let cases = vec![
            (ClientError::not_found("missing"), true, "missing (status 404)"),
            (ClientError::new(Some(403), "denied"), false, "denied (status 403)"),
            (ClientError::new(None, "timeout"), false, "timeout"),
        ];

        for (err, not_found, display) in cases {
            assert_eq!(err.is_not_found(), not_found, "failed not_found for case: {}", display);
            assert_eq!(err.to_string(), display, "failed display for case: {}", display);
        }
    }
}
