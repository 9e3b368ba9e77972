use std::{
    io::{Cursor, Read},
    time::{Duration, SystemTime},
};

use aws_sdk_s3::{
    config::http::HttpResponse,
    error::{DisplayErrorContext, SdkError},
    operation::create_bucket::builders::CreateBucketFluentBuilder,
    primitives::{ByteStream, DateTime},
    types::{
        BucketCannedAcl, BucketLocationConstraint, CreateBucketConfiguration, ObjectOwnership,
    },
};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

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
const DEFAULT_REGION: &str = "us-east-1";

/// Bytes escaped in `x-amz-copy-source`; S3 decodes the header before resolving the key.
const COPY_SOURCE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn client_error<E>(operation: &str, key: &str, err: SdkError<E, HttpResponse>) -> ClientError
where
    E: std::error::Error + Send + Sync + 'static,
{
    ClientError::new(
        err.raw_response().map(|r| r.status().as_u16()),
        format!(
            "failed to {} at: {}, {}",
            operation,
            key,
            DisplayErrorContext(&err)
        ),
    )
}

fn modified_time(last_modified: Option<&DateTime>) -> Option<SystemTime> {
    let dt = last_modified?;
    if dt.secs() < 0 {
        return None;
    }

    Some(SystemTime::UNIX_EPOCH + Duration::new(dt.secs() as u64, dt.subsec_nanos()))
}

fn copy_source(bucket: &str, key: &str) -> String {
    format!("{}/{}", bucket, utf8_percent_encode(key, COPY_SOURCE))
}

/// Marker to resume a truncated listing from.
///
/// NextMarker is only sent when a delimiter is set; otherwise resume after
/// the last key of the page.
fn next_marker(truncated: bool, next_marker: Option<&str>, page: &ListPage) -> Option<String> {
    if !truncated {
        return None;
    }

    next_marker
        .map(|m| m.to_string())
        .or_else(|| page.objects.last().map(|o| o.key.clone()))
        .or_else(|| page.common_prefixes.last().cloned())
}

/// Public-read bucket creation.
///
/// New buckets default to `BucketOwnerEnforced`, which rejects any ACL, so
/// ownership is requested as `ObjectWriter` alongside the canned ACL.
fn create_bucket_request(client: &aws_sdk_s3::Client, bucket: &str) -> CreateBucketFluentBuilder {
    let mut req = client
        .create_bucket()
        .bucket(bucket)
        .acl(BucketCannedAcl::PublicRead)
        .object_ownership(ObjectOwnership::ObjectWriter);

    // us-east-1 rejects an explicit location constraint
    if let Some(region) = client.config().region() {
        if region.as_ref() != DEFAULT_REGION {
            req = req.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region.as_ref()))
                    .build(),
            );
        }
    }

    req
}

fn object_info(
    bucket: &str,
    key: &str,
    content_type: Option<&str>,
    content_length: Option<i64>,
    last_modified: Option<&DateTime>,
) -> ObjectInfo {
    ObjectInfo {
        content_type: content_type.unwrap_or(DEFAULT_MIMETYPE).to_string(),
        content_length: content_length.unwrap_or(0).max(0) as u64,
        last_modified: modified_time(last_modified),
        url: object_url(Provider::AWS, bucket, key),
    }
}

impl adapters::ObjectClient for aws_sdk_s3::Client {
    fn create_bucket(&self, bucket: &str) -> Result<(), ClientError> {
        let req = create_bucket_request(self, bucket);

        match poll_until_ready(req.send()) {
            Err(err) => {
                if let Some(svc_err) = err.as_service_error() {
                    if svc_err.is_bucket_already_owned_by_you() {
                        return Ok(());
                    }
                }

                Err(client_error("create_bucket", bucket, err))
            }
            Ok(_) => Ok(()),
        }
    }

    fn bucket_exists(&self, bucket: &str) -> Result<bool, ClientError> {
        let req = self.head_bucket().bucket(bucket);

        match poll_until_ready(req.send()) {
            Err(err) => {
                if let Some(svc_err) = err.as_service_error() {
                    if svc_err.is_not_found() {
                        return Ok(false);
                    }
                }

                Err(client_error("head_bucket", bucket, err))
            }
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
        let req = self
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .content_length(body.len() as i64)
            .body(ByteStream::from(body));

        poll_until_ready(req.send()).map_err(|err| client_error("put_object", key, err))?;

        Ok(())
    }

    fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody, ClientError> {
        let req = self.get_object().bucket(bucket).key(key);

        let o = poll_until_ready(req.send()).map_err(|err| client_error("get_object", key, err))?;

        let info = object_info(
            bucket,
            key,
            o.content_type(),
            o.content_length(),
            o.last_modified(),
        );
        let mut headers = info.headers();
        if let Some(etag) = o.e_tag() {
            headers.insert(ETAG.to_string(), etag.to_string());
        }

        let bytes = poll_until_ready(o.body.collect()).map_err(|err| {
            ClientError::new(None, format!("failed to collect body: {}, {}", key, err))
        })?;

        Ok(ObjectBody {
            headers,
            info,
            body: bytes.into_bytes().to_vec(),
        })
    }

    fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead, ClientError> {
        let req = self.head_object().bucket(bucket).key(key);

        let ho =
            poll_until_ready(req.send()).map_err(|err| client_error("head_object", key, err))?;

        let info = object_info(
            bucket,
            key,
            ho.content_type(),
            ho.content_length(),
            ho.last_modified(),
        );
        let mut headers = info.headers();
        if let Some(etag) = ho.e_tag() {
            headers.insert(ETAG.to_string(), etag.to_string());
        }

        Ok(ObjectHead { headers, info })
    }

    fn delete_object(&self, bucket: &str, key: &str) -> Result<(), ClientError> {
        let req = self.delete_object().bucket(bucket).key(key);

        poll_until_ready(req.send()).map_err(|err| client_error("delete_object", key, err))?;

        Ok(())
    }

    fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<(), ClientError> {
        let req = self
            .copy_object()
            .copy_source(copy_source(src_bucket, src_key))
            .bucket(dst_bucket)
            .key(dst_key);

        poll_until_ready(req.send()).map_err(|err| client_error("copy_object", src_key, err))?;

        Ok(())
    }

    fn list_objects(&self, bucket: &str, req: &ListRequest) -> Result<ListPage, ClientError> {
        let mut lreq = self
            .list_objects()
            .bucket(bucket)
            .prefix(&req.prefix)
            .max_keys(req.max_keys);

        if let Some(delimiter) = &req.delimiter {
            lreq = lreq.delimiter(delimiter);
        }
        if let Some(marker) = &req.marker {
            lreq = lreq.marker(marker);
        }

        let lo = poll_until_ready(lreq.send())
            .map_err(|err| client_error("list_objects", &req.prefix, err))?;

        let mut page = ListPage::default();

        for o in lo.contents() {
            page.objects.push(ObjectSummary {
                key: o.key().unwrap_or("").to_string(),
                size: o.size().unwrap_or(0),
                modified_time: modified_time(o.last_modified()).unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }

        for cp in lo.common_prefixes() {
            if let Some(prefix) = cp.prefix() {
                page.common_prefixes.push(prefix.to_string());
            }
        }

        page.next_marker = next_marker(
            lo.is_truncated().unwrap_or(false),
            lo.next_marker(),
            &page,
        );

        Ok(page)
    }

    fn object_status(&self, bucket: &str, key: &str) -> Result<u16, ClientError> {
        let req = self.head_object().bucket(bucket).key(key);

        match poll_until_ready(req.send()) {
            Err(err) => {
                if let Some(svc_err) = err.as_service_error() {
                    if svc_err.is_not_found() {
                        return Ok(404);
                    }
                }

                match err.raw_response().map(|r| r.status().as_u16()) {
                    Some(status) => Ok(status),
                    None => Err(client_error("head_object", key, err)),
                }
            }
            Ok(_) => Ok(200),
        }
    }

    fn open_stream(&self, url: &str) -> Result<Box<dyn Read + Send>, ClientError> {
        let (provider, bucket, key) =
            parse_object_url(url).map_err(|err| ClientError::new(None, err.to_string()))?;
        if provider != Provider::AWS {
            return Err(ClientError::new(
                None,
                format!("failed to open foreign url: {}", url),
            ));
        }

        let ob = adapters::ObjectClient::get_object(self, &bucket, &key)?;

        Ok(Box::new(Cursor::new(ob.body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modified_time() {
        let cases = vec![
            (Some(DateTime::from_secs(0)), Some(SystemTime::UNIX_EPOCH)),
            (
                Some(DateTime::from_secs_and_nanos(1_700_000_000, 500)),
                Some(SystemTime::UNIX_EPOCH + Duration::new(1_700_000_000, 500)),
            ),
            (Some(DateTime::from_secs(-1)), None),
            (None, None),
        ];

        for (dt, expected) in cases {
            assert_eq!(
                modified_time(dt.as_ref()),
                expected,
                "failed modified_time for case: {:?}",
                dt
            );
        }
    }

    #[test]
    fn test_object_info() {
        let info = object_info("bucket", "hello.txt", None, Some(-1), None);

        assert_eq!(info.content_type, DEFAULT_MIMETYPE);
        assert_eq!(info.content_length, 0);
        assert_eq!(info.last_modified, None);
        assert_eq!(info.url, "s3://bucket/hello.txt");
    }

    #[test]
    fn test_copy_source() {
        let cases = vec![
            ("hello.txt", "bucket/hello.txt"),
            ("folder/a b.txt", "bucket/folder/a%20b.txt"),
            ("100%+?#.txt", "bucket/100%25%2B%3F%23.txt"),
            ("caf\u{e9}.txt", "bucket/caf%C3%A9.txt"),
            ("dir/~x_y-z", "bucket/dir/~x_y-z"),
        ];

        for (key, expected) in cases {
            assert_eq!(
                copy_source("bucket", key),
                expected,
                "failed copy source for case: {}",
                key
            );
        }
    }

    #[test]
    fn test_next_marker() {
        let page = ListPage {
            objects: vec![ObjectSummary {
                key: "d/2".to_string(),
                size: 1,
                modified_time: SystemTime::UNIX_EPOCH,
            }],
            common_prefixes: vec!["d/x/".to_string()],
            next_marker: None,
        };
        let empty = ListPage::default();
        let prefixes_only = ListPage {
            objects: Vec::new(),
            common_prefixes: vec!["d/x/".to_string()],
            next_marker: None,
        };

        let cases = vec![
            ("not truncated", false, Some("d/9"), &page, None),
            ("sent marker", true, Some("d/9"), &page, Some("d/9")),
            ("last key", true, None, &page, Some("d/2")),
            ("last prefix", true, None, &prefixes_only, Some("d/x/")),
            ("empty page", true, None, &empty, None),
        ];

        for (name, truncated, sent, page, expected) in cases {
            assert_eq!(
                next_marker(truncated, sent, page).as_deref(),
                expected,
                "failed next_marker for case: {}",
                name
            );
        }
    }

    #[test]
    fn test_create_bucket_request() {
        let cases = vec![("eu-west-1", Some("eu-west-1")), (DEFAULT_REGION, None)];

        for (region, constraint) in cases {
            let config = aws_sdk_s3::Config::builder()
                .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
                .region(aws_sdk_s3::config::Region::new(region))
                .build();
            let client = aws_sdk_s3::Client::from_conf(config);

            let req = create_bucket_request(&client, "dummy-bucket");

            assert_eq!(req.get_bucket().as_deref(), Some("dummy-bucket"));
            assert_eq!(req.get_acl(), &Some(BucketCannedAcl::PublicRead));
            assert_eq!(
                req.get_object_ownership(),
                &Some(ObjectOwnership::ObjectWriter),
                "failed ownership for case: {}",
                region
            );
            assert_eq!(
                req.get_create_bucket_configuration()
                    .as_ref()
                    .and_then(|c| c.location_constraint())
                    .map(|c| c.as_str()),
                constraint,
                "failed location constraint for case: {}",
                region
            );
        }
    }
}
