use std::io::Read;

use tracing::{error, info, span, Level};

use crate::{
    fs,
    model::{
        fs::{
            Contents, FileMetadata, FsError, ListingEntry, Mimetype, ReadStream, Size, Timestamp,
            Visibility, WriteConfig,
        },
        object::{ListRequest, CONTENT_LENGTH, REQUEST_URL},
    },
    util::mime::resolve_mimetype,
};

/// Generic file-storage capabilities consumed by a storage facade.
///
/// Paths are relative to the adapter's root. Unsupported capabilities
/// answer `Err(FsError::Unsupported)` deterministically.
pub trait Filesystem {
    fn write(&self, path: &str, contents: &[u8], config: &WriteConfig) -> Result<(), FsError>;

    /// Reads `stream` to its end and uploads it. The stream is dropped on every path.
    fn write_stream(
        &self,
        path: &str,
        stream: Box<dyn Read + Send>,
        config: &WriteConfig,
    ) -> Result<(), FsError>;

    fn update(&self, path: &str, contents: &[u8], config: &WriteConfig) -> Result<(), FsError>;

    fn update_stream(
        &self,
        path: &str,
        stream: Box<dyn Read + Send>,
        config: &WriteConfig,
    ) -> Result<(), FsError>;

    /// Copy then delete. Not atomic: a failed delete leaves both objects behind.
    fn rename(&self, path: &str, new_path: &str) -> Result<(), FsError>;

    fn copy(&self, path: &str, new_path: &str) -> Result<(), FsError>;

    fn delete(&self, path: &str) -> Result<(), FsError>;

    fn delete_dir(&self, dirname: &str) -> Result<(), FsError>;

    fn create_dir(&self, dirname: &str, config: &WriteConfig) -> Result<(), FsError>;

    fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<(), FsError>;

    fn has(&self, path: &str) -> Result<bool, FsError>;

    fn read(&self, path: &str) -> Result<Contents, FsError>;

    fn read_stream(&self, path: &str) -> Result<ReadStream, FsError>;

    /// Entries under `directory`, with the configured prefix stripped.
    ///
    /// The `directory/` marker object written by `create_dir` is not an entry
    /// of its own listing, so a freshly created directory lists as empty.
    /// Nested markers still show up as `ListingEntry::Dir`.
    fn list_contents(&self, directory: &str, recursive: bool)
        -> Result<Vec<ListingEntry>, FsError>;

    fn get_metadata(&self, path: &str) -> Result<FileMetadata, FsError>;

    fn get_size(&self, path: &str) -> Result<Size, FsError>;

    fn get_mimetype(&self, path: &str) -> Result<Mimetype, FsError>;

    fn get_timestamp(&self, path: &str) -> Result<Timestamp, FsError>;

    fn get_visibility(&self, path: &str) -> Result<Visibility, FsError>;
}

impl fs::ObjectFS {
    fn upload(
        &self,
        operation: &'static str,
        path: &str,
        contents: Vec<u8>,
        config: &WriteConfig,
    ) -> Result<(), FsError> {
        let key = self.apply_prefix(path);
        let mimetype = resolve_mimetype(path, config);

        self.client
            .put_object(&self.bucket, &key, contents, &mimetype)
            .map_err(|err| self.storage_error(operation, path, err))
    }

    fn upload_stream(
        &self,
        operation: &'static str,
        path: &str,
        mut stream: Box<dyn Read + Send>,
        config: &WriteConfig,
    ) -> Result<(), FsError> {
        let mut contents = Vec::new();
        if let Err(err) = stream.read_to_end(&mut contents) {
            error!(error_message=%err, error_group="read_stream", path=path);
            return Err(FsError::Io(err));
        }
        drop(stream);

        self.upload(operation, path, contents, config)
    }
}

impl Filesystem for fs::ObjectFS {
    fn write(&self, path: &str, contents: &[u8], config: &WriteConfig) -> Result<(), FsError> {
        let span = span!(Level::INFO, "write", context = "write");
        let _e = span.enter();
        info!(path = path, size = contents.len(), "called");

        self.upload("write", path, contents.to_vec(), config)
    }

    fn write_stream(
        &self,
        path: &str,
        stream: Box<dyn Read + Send>,
        config: &WriteConfig,
    ) -> Result<(), FsError> {
        let span = span!(Level::INFO, "write_stream", context = "write_stream");
        let _e = span.enter();
        info!(path = path, "called");

        self.upload_stream("write_stream", path, stream, config)
    }

    fn update(&self, path: &str, contents: &[u8], config: &WriteConfig) -> Result<(), FsError> {
        let span = span!(Level::INFO, "update", context = "update");
        let _e = span.enter();
        info!(path = path, size = contents.len(), "called");

        self.upload("update", path, contents.to_vec(), config)
    }

    fn update_stream(
        &self,
        path: &str,
        stream: Box<dyn Read + Send>,
        config: &WriteConfig,
    ) -> Result<(), FsError> {
        let span = span!(Level::INFO, "update_stream", context = "update_stream");
        let _e = span.enter();
        info!(path = path, "called");

        self.upload_stream("update_stream", path, stream, config)
    }

    fn rename(&self, path: &str, new_path: &str) -> Result<(), FsError> {
        let span = span!(Level::INFO, "rename", context = "rename");
        let _e = span.enter();
        info!(path = path, new_path = new_path, "called");

        let from = self.apply_prefix(path);
        let to = self.apply_prefix(new_path);

        self.client
            .copy_object(&self.bucket, &from, &self.bucket, &to)
            .map_err(|err| self.storage_error("rename", path, err))?;

        match self.client.delete_object(&self.bucket, &from) {
            Err(err) if !err.is_not_found() => {
                error!(
                    error_message=%err,
                    error_group="delete_object",
                    path=path,
                    new_path=new_path,
                    "object left at both paths"
                );
                Err(FsError::StorageOperation {
                    operation: "rename",
                    path: format!("{} -> {}", path, new_path),
                    message: format!("copied but failed to delete source: {}", err),
                })
            }
            _ => Ok(()),
        }
    }

    fn copy(&self, path: &str, new_path: &str) -> Result<(), FsError> {
        let span = span!(Level::INFO, "copy", context = "copy");
        let _e = span.enter();
        info!(path = path, new_path = new_path, "called");

        self.client
            .copy_object(
                &self.bucket,
                &self.apply_prefix(path),
                &self.bucket,
                &self.apply_prefix(new_path),
            )
            .map_err(|err| self.storage_error("copy", path, err))
    }

    fn delete(&self, path: &str) -> Result<(), FsError> {
        let span = span!(Level::INFO, "delete", context = "delete");
        let _e = span.enter();
        info!(path = path, "called");

        match self.client.delete_object(&self.bucket, &self.apply_prefix(path)) {
            Err(err) if err.is_not_found() => {
                info!(path = path, "already absent");
                Ok(())
            }
            Err(err) => Err(self.storage_error("delete", path, err)),
            Ok(()) => Ok(()),
        }
    }

    fn delete_dir(&self, dirname: &str) -> Result<(), FsError> {
        info!(dirname = dirname, "delete_dir unsupported");
        Err(FsError::Unsupported {
            operation: "delete_dir",
        })
    }

    fn create_dir(&self, dirname: &str, _config: &WriteConfig) -> Result<(), FsError> {
        let span = span!(Level::INFO, "create_dir", context = "create_dir");
        let _e = span.enter();
        info!(dirname = dirname, "called");

        self.client
            .create_dir_marker(&self.bucket, &self.apply_prefix(dirname))
            .map_err(|err| self.storage_error("create_dir", dirname, err))
    }

    fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<(), FsError> {
        info!(path = path, visibility = ?visibility, "set_visibility unsupported");
        Err(FsError::Unsupported {
            operation: "set_visibility",
        })
    }

    fn has(&self, path: &str) -> Result<bool, FsError> {
        let span = span!(Level::INFO, "has", context = "has");
        let _e = span.enter();
        info!(path = path, "called");

        let status = self
            .client
            .object_status(&self.bucket, &self.apply_prefix(path))
            .map_err(|err| self.storage_error("has", path, err))?;

        match status {
            200 => Ok(true),
            404 => Ok(false),
            other => {
                error!(
                    error_message = "unexpected status",
                    error_group = "object_status",
                    status = other,
                    path = path
                );
                Err(FsError::storage(
                    "has",
                    path,
                    format!("unexpected status {}", other),
                ))
            }
        }
    }

    fn read(&self, path: &str) -> Result<Contents, FsError> {
        let span = span!(Level::INFO, "read", context = "read");
        let _e = span.enter();
        info!(path = path, "called");

        let ob = self
            .client
            .get_object(&self.bucket, &self.apply_prefix(path))
            .map_err(|err| self.storage_error("read", path, err))?;

        Ok(Contents { contents: ob.body })
    }

    fn read_stream(&self, path: &str) -> Result<ReadStream, FsError> {
        let span = span!(Level::INFO, "read_stream", context = "read_stream");
        let _e = span.enter();
        info!(path = path, "called");

        let ob = self
            .client
            .get_object(&self.bucket, &self.apply_prefix(path))
            .map_err(|err| self.storage_error("read_stream", path, err))?;

        let url = match ob.headers.get(REQUEST_URL) {
            None => {
                error!(
                    error_message = "missing request url",
                    error_group = "not_found",
                    path = path
                );
                return Err(FsError::storage(
                    "read_stream",
                    path,
                    "missing request url header",
                ));
            }
            Some(url) => url,
        };

        let stream = self
            .client
            .open_stream(url)
            .map_err(|err| self.storage_error("read_stream", path, err))?;

        Ok(ReadStream { stream })
    }

    fn list_contents(
        &self,
        directory: &str,
        recursive: bool,
    ) -> Result<Vec<ListingEntry>, FsError> {
        let span = span!(Level::INFO, "list_contents", context = "list_contents");
        let _e = span.enter();
        info!(directory = directory, recursive = recursive, "called");

        let prefix = self.directory_prefix(directory);
        let delimiter = if recursive {
            None
        } else {
            Some(fs::DELIMITER.to_string())
        };

        let mut entries = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let req = ListRequest {
                prefix: prefix.clone(),
                delimiter: delimiter.clone(),
                marker: marker.take(),
                max_keys: fs::MAX_KEYS,
            };

            let page = self
                .client
                .list_objects(&self.bucket, &req)
                .map_err(|err| self.storage_error("list_contents", directory, err))?;

            entries.extend(self.listing_entries(&page, &prefix));

            marker = page.next_marker;
            if marker.is_none() {
                break;
            }
        }

        Ok(entries)
    }

    fn get_metadata(&self, path: &str) -> Result<FileMetadata, FsError> {
        let span = span!(Level::INFO, "get_metadata", context = "get_metadata");
        let _e = span.enter();
        info!(path = path, "called");

        let ho = self
            .client
            .head_object(&self.bucket, &self.apply_prefix(path))
            .map_err(|err| self.storage_error("get_metadata", path, err))?;

        Ok(FileMetadata {
            headers: ho.headers,
            info: ho.info,
        })
    }

    fn get_size(&self, path: &str) -> Result<Size, FsError> {
        let metadata = self.get_metadata(path)?;

        let size = match metadata.header(CONTENT_LENGTH).map(str::parse::<u64>) {
            Some(Ok(size)) => size,
            Some(Err(err)) => return Err(FsError::storage("get_size", path, err)),
            None => metadata.info.content_length,
        };

        Ok(Size { size })
    }

    fn get_mimetype(&self, path: &str) -> Result<Mimetype, FsError> {
        let metadata = self.get_metadata(path)?;

        Ok(Mimetype {
            mimetype: metadata.info.content_type,
        })
    }

    fn get_timestamp(&self, path: &str) -> Result<Timestamp, FsError> {
        let metadata = self.get_metadata(path)?;

        match metadata.info.epoch_seconds() {
            Some(timestamp) => Ok(Timestamp { timestamp }),
            None => Err(FsError::storage(
                "get_timestamp",
                path,
                "missing last-modified",
            )),
        }
    }

    fn get_visibility(&self, path: &str) -> Result<Visibility, FsError> {
        info!(path = path, "get_visibility unsupported");
        Err(FsError::Unsupported {
            operation: "get_visibility",
        })
    }
}
