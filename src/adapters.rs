use std::io::Read;

use crate::model::object::{ClientError, ListPage, ListRequest, ObjectBody, ObjectHead};

pub mod gcs;
pub mod memory;
pub mod s3;

/// Object-storage operations the filesystem layer is built on.
///
/// Implemented by the S3 and GCS SDK clients and by [`memory::MemoryClient`].
/// Every method is a single blocking backend request.
pub trait ObjectClient: Send + Sync {
    /// Creates `bucket` with public-read access.
    ///
    /// An already existing bucket owned by the caller is not an error.
    fn create_bucket(&self, bucket: &str) -> Result<(), ClientError>;

    fn bucket_exists(&self, bucket: &str) -> Result<bool, ClientError>;

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ClientError>;

    fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody, ClientError>;

    fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead, ClientError>;

    /// Reports a missing key as a 404 `ClientError`.
    fn delete_object(&self, bucket: &str, key: &str) -> Result<(), ClientError>;

    fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<(), ClientError>;

    fn list_objects(&self, bucket: &str, req: &ListRequest) -> Result<ListPage, ClientError>;

    /// HTTP status of an existence check: 200 when found, 404 when missing.
    fn object_status(&self, bucket: &str, key: &str) -> Result<u16, ClientError>;

    /// Writes the zero-byte marker object for `dir`.
    fn create_dir_marker(&self, bucket: &str, dir: &str) -> Result<(), ClientError> {
        let key = format!("{}/", dir.trim_end_matches('/'));
        self.put_object(bucket, &key, Vec::new(), "application/x-directory")
    }

    /// Opens a fresh read stream against a request URL handed out by this client.
    fn open_stream(&self, url: &str) -> Result<Box<dyn Read + Send>, ClientError>;
}
