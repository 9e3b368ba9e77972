use std::{
    borrow::Cow,
    io::{Cursor, Read},
    time::SystemTime,
};

use google_cloud_storage::http::{
    bucket_access_controls::PredefinedBucketAcl,
    buckets::{
        get::GetBucketRequest,
        insert::{BucketCreationConfig, InsertBucketParam, InsertBucketRequest},
    },
    objects::{
        copy::CopyObjectRequest,
        delete::DeleteObjectRequest,
        download::Range,
        get::GetObjectRequest,
        list::ListObjectsRequest,
        upload::{Media, UploadObjectRequest, UploadType},
        Object,
    },
    Error,
};

use crate::{
    adapters,
    model::object::{
        ClientError, ListPage, ListRequest, ObjectBody, ObjectHead, ObjectInfo, ObjectSummary,
        DEFAULT_MIMETYPE,
    },
    util::{
        object::{object_url, parse_object_url, Provider},
        poll::poll_until_ready,
    },
};

const ETAG: &str = "etag";

/// Google Cloud Storage client bound to the project buckets are created in.
pub struct GcsClient {
    pub client: google_cloud_storage::client::Client,
    pub project: String,
}

impl GcsClient {
    pub fn new(client: google_cloud_storage::client::Client, project: &str) -> Self {
        Self {
            client,
            project: project.to_string(),
        }
    }
}

fn client_error(operation: &str, key: &str, err: Error) -> ClientError {
    let status = match &err {
        Error::Response(resp) => Some(resp.code),
        _ => None,
    };

    ClientError::new(
        status,
        format!("failed to {} at: {}, {}", operation, key, err),
    )
}

fn object_head(bucket: &str, obj: &Object) -> ObjectHead {
    let info = ObjectInfo {
        content_type: obj
            .content_type
            .clone()
            .unwrap_or_else(|| DEFAULT_MIMETYPE.to_string()),
        content_length: obj.size.max(0) as u64,
        last_modified: obj.updated.map(SystemTime::from),
        url: object_url(Provider::GCS, bucket, &obj.name),
    };

    let mut headers = info.headers();
    headers.insert(ETAG.to_string(), obj.etag.clone());

    ObjectHead { headers, info }
}

fn insert_bucket_request(project: &str, bucket: &str) -> InsertBucketRequest {
    InsertBucketRequest {
        name: bucket.to_string(),
        param: InsertBucketParam {
            project: project.to_string(),
            predefined_acl: Some(PredefinedBucketAcl::PublicRead),
            ..Default::default()
        },
        bucket: BucketCreationConfig::default(),
    }
}

impl adapters::ObjectClient for GcsClient {
    fn create_bucket(&self, bucket: &str) -> Result<(), ClientError> {
        let req = insert_bucket_request(&self.project, bucket);

        match poll_until_ready(self.client.insert_bucket(&req)) {
            // 409: the bucket name is already taken
            Err(Error::Response(err)) if err.code == 409 => Ok(()),
            Err(err) => Err(client_error("insert_bucket", bucket, err)),
            Ok(_) => Ok(()),
        }
    }

    fn bucket_exists(&self, bucket: &str) -> Result<bool, ClientError> {
        let req = GetBucketRequest {
            bucket: bucket.to_string(),
            ..Default::default()
        };

        match poll_until_ready(self.client.get_bucket(&req)) {
            Err(Error::Response(err)) if err.code == 404 => Ok(false),
            Err(err) => Err(client_error("get_bucket", bucket, err)),
            Ok(_) => Ok(true),
        }
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ClientError> {
        let req = UploadObjectRequest {
            bucket: bucket.to_string(),
            ..Default::default()
        };

        let mut media = Media::new(key.to_string());
        media.content_type = Cow::Owned(content_type.to_string());
        media.content_length = Some(body.len() as u64);

        poll_until_ready(
            self.client
                .upload_object(&req, body, &UploadType::Simple(media)),
        )
        .map_err(|err| client_error("upload_object", key, err))?;

        Ok(())
    }

    fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody, ClientError> {
        let req = GetObjectRequest {
            bucket: bucket.to_string(),
            object: key.to_string(),
            ..Default::default()
        };

        let obj = poll_until_ready(self.client.get_object(&req))
            .map_err(|err| client_error("get_object", key, err))?;

        let body = poll_until_ready(self.client.download_object(&req, &Range::default()))
            .map_err(|err| client_error("download_object", key, err))?;

        let head = object_head(bucket, &obj);

        Ok(ObjectBody {
            headers: head.headers,
            info: head.info,
            body,
        })
    }

    fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead, ClientError> {
        let req = GetObjectRequest {
            bucket: bucket.to_string(),
            object: key.to_string(),
            ..Default::default()
        };

        let obj = poll_until_ready(self.client.get_object(&req))
            .map_err(|err| client_error("get_object", key, err))?;

        Ok(object_head(bucket, &obj))
    }

    fn delete_object(&self, bucket: &str, key: &str) -> Result<(), ClientError> {
        let req = DeleteObjectRequest {
            bucket: bucket.to_string(),
            object: key.to_string(),
            ..Default::default()
        };

        poll_until_ready(self.client.delete_object(&req))
            .map_err(|err| client_error("delete_object", key, err))
    }

    fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<(), ClientError> {
        let req = CopyObjectRequest {
            destination_bucket: dst_bucket.to_string(),
            destination_object: dst_key.to_string(),
            source_bucket: src_bucket.to_string(),
            source_object: src_key.to_string(),
            ..Default::default()
        };

        poll_until_ready(self.client.copy_object(&req))
            .map_err(|err| client_error("copy_object", src_key, err))?;

        Ok(())
    }

    /// `ListRequest::marker` carries the GCS page token.
    fn list_objects(&self, bucket: &str, req: &ListRequest) -> Result<ListPage, ClientError> {
        let lreq = ListObjectsRequest {
            bucket: bucket.to_string(),
            prefix: Some(req.prefix.clone()),
            delimiter: req.delimiter.clone().filter(|d| !d.is_empty()),
            max_results: Some(req.max_keys),
            page_token: req.marker.clone(),
            ..Default::default()
        };

        let lo = poll_until_ready(self.client.list_objects(&lreq))
            .map_err(|err| client_error("list_objects", &req.prefix, err))?;

        let mut page = ListPage::default();

        if let Some(objs) = lo.items {
            for obj in objs {
                page.objects.push(ObjectSummary {
                    key: obj.name,
                    size: obj.size,
                    modified_time: obj
                        .updated
                        .map(SystemTime::from)
                        .unwrap_or(SystemTime::UNIX_EPOCH),
                });
            }
        }

        page.common_prefixes = lo.prefixes.unwrap_or_default();
        page.next_marker = lo.next_page_token;

        Ok(page)
    }

    fn object_status(&self, bucket: &str, key: &str) -> Result<u16, ClientError> {
        let req = GetObjectRequest {
            bucket: bucket.to_string(),
            object: key.to_string(),
            ..Default::default()
        };

        match poll_until_ready(self.client.get_object(&req)) {
            Err(Error::Response(err)) => Ok(err.code),
            Err(err) => Err(client_error("get_object", key, err)),
            Ok(_) => Ok(200),
        }
    }

    fn open_stream(&self, url: &str) -> Result<Box<dyn Read + Send>, ClientError> {
        let (provider, bucket, key) =
            parse_object_url(url).map_err(|err| ClientError::new(None, err.to_string()))?;
        if provider != Provider::GCS {
            return Err(ClientError::new(
                None,
                format!("failed to open foreign url: {}", url),
            ));
        }

        let req = GetObjectRequest {
            bucket,
            object: key.clone(),
            ..Default::default()
        };

        let body = poll_until_ready(self.client.download_object(&req, &Range::default()))
            .map_err(|err| client_error("download_object", &key, err))?;

        Ok(Box::new(Cursor::new(body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_head() {
        let obj = Object {
            name: "folder/hello.txt".to_string(),
            size: 12,
            content_type: Some("text/plain".to_string()),
            etag: "CJn2".to_string(),
            ..Default::default()
        };

        let head = object_head("bucket", &obj);

        assert_eq!(head.info.content_type, "text/plain");
        assert_eq!(head.info.content_length, 12);
        assert_eq!(head.info.last_modified, None);
        assert_eq!(head.info.url, "gs://bucket/folder/hello.txt");
        assert_eq!(head.headers.get(ETAG).unwrap(), "CJn2");
    }

    #[test]
    fn test_object_head_defaults() {
        let obj = Object {
            name: "blob".to_string(),
            ..Default::default()
        };

        let head = object_head("bucket", &obj);

        assert_eq!(head.info.content_type, DEFAULT_MIMETYPE);
        assert_eq!(head.info.content_length, 0);
    }

    #[test]
    fn test_insert_bucket_request() {
        let req = insert_bucket_request("my-project", "dummy-bucket");

        assert_eq!(req.name, "dummy-bucket");
        assert_eq!(req.param.project, "my-project");
        assert!(matches!(
            req.param.predefined_acl,
            Some(PredefinedBucketAcl::PublicRead)
        ));
    }
}
