use std::{collections::BTreeMap, fmt, io::Read};

use thiserror::Error;

use crate::model::object::ObjectInfo;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("failed to provision bucket: {bucket}, {message}")]
    BucketProvisioning { bucket: String, message: String },

    #[error("failed to {operation} at: {path}, {message}")]
    StorageOperation {
        operation: &'static str,
        path: String,
        message: String,
    },

    #[error("unsupported operation: {operation}")]
    Unsupported { operation: &'static str },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl FsError {
    pub fn storage(operation: &'static str, path: &str, err: impl fmt::Display) -> Self {
        FsError::StorageOperation {
            operation,
            path: path.to_string(),
            message: err.to_string(),
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, FsError::Unsupported { .. })
    }
}

/// Per-call write options.
#[derive(Clone, Debug, Default)]
pub struct WriteConfig {
    /// Overrides the mimetype guessed from the path extension.
    pub mimetype: Option<String>,
}

impl WriteConfig {
    pub fn with_mimetype(mimetype: &str) -> Self {
        Self {
            mimetype: Some(mimetype.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListingEntry {
    File {
        path: String,
        timestamp: i64,
        size: i64,
    },
    Dir {
        path: String,
    },
}

impl ListingEntry {
    pub fn path(&self) -> &str {
        match self {
            ListingEntry::File { path, .. } | ListingEntry::Dir { path } => path,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, ListingEntry::Dir { .. })
    }
}

/// Raw response headers of an object plus the backend's decoded `_info`.
#[derive(Clone, Debug, PartialEq)]
pub struct FileMetadata {
    pub headers: BTreeMap<String, String>,
    pub info: ObjectInfo,
}

impl FileMetadata {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contents {
    pub contents: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Size {
    pub size: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mimetype {
    pub mimetype: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Timestamp {
    pub timestamp: i64,
}

pub struct ReadStream {
    pub stream: Box<dyn Read + Send>,
}

impl fmt::Debug for ReadStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadStream").finish_non_exhaustive()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}
