use std::sync::Arc;

use tracing::{error, info, span, Level};

use crate::{
    adapters,
    model::{
        fs::{FsError, ListingEntry},
        object::{epoch_seconds, ClientError, ListPage},
    },
};

pub const DELIMITER: &str = "/";
pub const MAX_KEYS: i32 = 100;

/// Filesystem view over one bucket of an object store.
///
/// Holds no state besides the shared client, the bucket name and the key
/// prefix; every operation is a direct request against the client.
pub struct ObjectFS {
    pub client: Arc<dyn adapters::ObjectClient>,
    pub bucket: String,
    pub prefix: String,
}

impl ObjectFS {
    /// Binds to `bucket`, creating it with public-read access when absent.
    ///
    /// Fails with [`FsError::BucketProvisioning`] if the bucket can neither
    /// be found nor created.
    pub fn new(
        client: Arc<dyn adapters::ObjectClient>,
        bucket: &str,
        prefix: &str,
    ) -> Result<Self, FsError> {
        let span = span!(Level::INFO, "new", context = "new");
        let _e = span.enter();
        info!(bucket = bucket, prefix = prefix, "called");

        let provisioning = |err: ClientError| {
            error!(error_message=%err, error_group="provision_bucket", bucket=bucket);
            FsError::BucketProvisioning {
                bucket: bucket.to_string(),
                message: err.to_string(),
            }
        };

        if !client.bucket_exists(bucket).map_err(provisioning)? {
            client.create_bucket(bucket).map_err(provisioning)?;
            info!(bucket = bucket, "created bucket");
        }

        Ok(Self {
            client,
            bucket: bucket.to_string(),
            prefix: normalize_prefix(prefix),
        })
    }

    pub fn apply_prefix(&self, path: &str) -> String {
        format!("{}{}", self.prefix, path.trim_start_matches('/'))
    }

    pub fn remove_prefix<'a>(&self, key: &'a str) -> &'a str {
        key.strip_prefix(self.prefix.as_str()).unwrap_or(key)
    }

    /// Key prefix to list for `directory`, always ending in the delimiter unless it is the root.
    pub fn directory_prefix(&self, directory: &str) -> String {
        let dir = directory.trim_matches('/');
        if dir.is_empty() {
            return self.prefix.clone();
        }

        format!("{}{}", self.apply_prefix(dir), DELIMITER)
    }

    /// Reshapes one listing page. `listed` is the prefix being listed; its own
    /// marker object is not an entry of itself.
    pub fn listing_entries(&self, page: &ListPage, listed: &str) -> Vec<ListingEntry> {
        let mut entries = Vec::new();

        for obj in &page.objects {
            if obj.key == listed {
                continue;
            }

            let path = self.remove_prefix(&obj.key).to_string();
            if obj.key.ends_with(DELIMITER) {
                entries.push(ListingEntry::Dir { path });
            } else {
                entries.push(ListingEntry::File {
                    path,
                    timestamp: epoch_seconds(obj.modified_time),
                    size: obj.size,
                });
            }
        }

        for prefix in &page.common_prefixes {
            entries.push(ListingEntry::Dir {
                path: self.remove_prefix(prefix).to_string(),
            });
        }

        entries
    }

    pub fn storage_error(&self, operation: &'static str, path: &str, err: ClientError) -> FsError {
        error!(error_message=%err, error_group=operation, path=path);
        FsError::storage(operation, path, err)
    }
}

pub fn normalize_prefix(prefix: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        return String::new();
    }

    format!("{}{}", prefix, DELIMITER)
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::{adapters::memory::MemoryClient, model::object::ObjectSummary};

    fn object_fs(prefix: &str) -> ObjectFS {
        let client = Arc::new(MemoryClient::with_bucket("dummy-bucket"));
        ObjectFS::new(client, "dummy-bucket", prefix).unwrap()
    }

    #[test]
    fn test_new_creates_missing_bucket() {
        let client = Arc::new(MemoryClient::new());

        let fs = ObjectFS::new(client.clone(), "dummy-bucket", "").unwrap();

        assert_eq!(fs.bucket, "dummy-bucket");
        assert_eq!(client.calls(), vec!["bucket_exists", "create_bucket"]);
    }

    #[test]
    fn test_new_keeps_existing_bucket() {
        let client = Arc::new(MemoryClient::with_bucket("dummy-bucket"));

        ObjectFS::new(client.clone(), "dummy-bucket", "").unwrap();

        assert_eq!(client.calls(), vec!["bucket_exists"]);
    }

    #[test]
    fn test_new_fails_on_rejected_bucket() {
        let client = Arc::new(MemoryClient::new());
        client.fail("create_bucket", ClientError::new(Some(403), "access denied"));

        let result = ObjectFS::new(client, "dummy-bucket", "");

        match result {
            Err(FsError::BucketProvisioning { bucket, message }) => {
                assert_eq!(bucket, "dummy-bucket");
                assert!(message.contains("access denied"));
            }
            other => panic!("unexpected result: {:?}", other.map(|fs| fs.bucket)),
        }
    }

    #[test]
    fn test_normalize_prefix() {
        let cases = vec![
            ("", ""),
            ("/", ""),
            ("uploads", "uploads/"),
            ("/uploads/", "uploads/"),
            ("a/b", "a/b/"),
        ];

        for (prefix, expected) in cases {
            assert_eq!(
                normalize_prefix(prefix),
                expected,
                "failed prefix for case: {}",
                prefix
            );
        }
    }

    #[test]
    fn test_apply_prefix() {
        let cases = vec![
            ("", "file", "file"),
            ("", "/file", "file"),
            ("uploads", "file", "uploads/file"),
            ("uploads", "/folder/file", "uploads/folder/file"),
        ];

        for (prefix, path, expected) in cases {
            let fs = object_fs(prefix);
            let key = fs.apply_prefix(path);

            assert_eq!(key, expected, "failed apply for case: {}", path);
            assert_eq!(
                fs.remove_prefix(&key),
                path.trim_start_matches('/'),
                "failed remove for case: {}",
                path
            );
        }
    }

    #[test]
    fn test_directory_prefix() {
        let cases = vec![
            ("", "", ""),
            ("", "images", "images/"),
            ("", "/images/", "images/"),
            ("uploads", "", "uploads/"),
            ("uploads", "images/png", "uploads/images/png/"),
        ];

        for (prefix, directory, expected) in cases {
            let fs = object_fs(prefix);

            assert_eq!(
                fs.directory_prefix(directory),
                expected,
                "failed directory prefix for case: {}",
                directory
            );
        }
    }

    #[test]
    fn test_listing_entries() {
        let fs = object_fs("uploads");
        let modified_time = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);

        let page = ListPage {
            objects: vec![
                ObjectSummary {
                    key: "uploads/images/".to_string(),
                    size: 0,
                    modified_time,
                },
                ObjectSummary {
                    key: "uploads/images/logo.png".to_string(),
                    size: 42,
                    modified_time,
                },
                ObjectSummary {
                    key: "uploads/images/empty/".to_string(),
                    size: 0,
                    modified_time,
                },
            ],
            common_prefixes: vec!["uploads/images/icons/".to_string()],
            next_marker: None,
        };

        let entries = fs.listing_entries(&page, "uploads/images/");

        assert_eq!(
            entries,
            vec![
                ListingEntry::File {
                    path: "images/logo.png".to_string(),
                    timestamp: 1_700_000_000,
                    size: 42,
                },
                ListingEntry::Dir {
                    path: "images/empty/".to_string(),
                },
                ListingEntry::Dir {
                    path: "images/icons/".to_string(),
                },
            ]
        );
    }
}
