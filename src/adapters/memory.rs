use std::{
    collections::{BTreeMap, HashMap},
    io::{Cursor, Read},
    sync::{Mutex, MutexGuard},
    time::SystemTime,
};

use crate::{
    adapters,
    model::object::{
        ClientError, ListPage, ListRequest, ObjectBody, ObjectHead, ObjectInfo, ObjectSummary,
    },
    util::object::{object_url, parse_object_url, Provider},
};

const DEFAULT_MAX_KEYS: usize = 1000;

#[derive(Clone, Debug)]
struct StoredObject {
    body: Vec<u8>,
    content_type: String,
    modified_time: SystemTime,
}

type Bucket = BTreeMap<String, StoredObject>;

/// Object store kept in process memory.
///
/// Failures can be injected per operation name (`"put_object"`,
/// `"delete_object"`, ...) with [`MemoryClient::fail`]. An injected error for
/// `"object_status"` that carries a status is answered as that status.
#[derive(Default)]
pub struct MemoryClient {
    buckets: Mutex<BTreeMap<String, Bucket>>,
    failures: Mutex<HashMap<&'static str, ClientError>>,
    calls: Mutex<Vec<&'static str>>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bucket(bucket: &str) -> Self {
        let client = Self::default();
        lock(&client.buckets).insert(bucket.to_string(), Bucket::new());
        client
    }

    pub fn fail(&self, operation: &'static str, err: ClientError) {
        lock(&self.failures).insert(operation, err);
    }

    pub fn clear_failures(&self) {
        lock(&self.failures).clear();
    }

    /// Operation names in the order they reached the client.
    pub fn calls(&self) -> Vec<&'static str> {
        lock(&self.calls).clone()
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        lock(&self.buckets)
            .get(bucket)
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn record(&self, operation: &'static str) -> Result<(), ClientError> {
        lock(&self.calls).push(operation);

        match lock(&self.failures).get(operation) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn with_bucket_mut<T>(
        &self,
        bucket: &str,
        f: impl FnOnce(&mut Bucket) -> Result<T, ClientError>,
    ) -> Result<T, ClientError> {
        let mut buckets = lock(&self.buckets);
        match buckets.get_mut(bucket) {
            Some(b) => f(b),
            None => Err(ClientError::not_found(format!("no such bucket: {}", bucket))),
        }
    }

    fn stored(&self, bucket: &str, key: &str) -> Result<StoredObject, ClientError> {
        self.with_bucket_mut(bucket, |b| {
            b.get(key)
                .cloned()
                .ok_or_else(|| ClientError::not_found(format!("no such key: {}", key)))
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // a poisoned map is still consistent: every mutation is a single insert/remove
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn info(bucket: &str, key: &str, obj: &StoredObject) -> ObjectInfo {
    ObjectInfo {
        content_type: obj.content_type.clone(),
        content_length: obj.body.len() as u64,
        last_modified: Some(obj.modified_time),
        url: object_url(Provider::Memory, bucket, key),
    }
}

impl adapters::ObjectClient for MemoryClient {
    fn create_bucket(&self, bucket: &str) -> Result<(), ClientError> {
        self.record("create_bucket")?;

        lock(&self.buckets)
            .entry(bucket.to_string())
            .or_insert_with(Bucket::new);

        Ok(())
    }

    fn bucket_exists(&self, bucket: &str) -> Result<bool, ClientError> {
        self.record("bucket_exists")?;

        Ok(lock(&self.buckets).contains_key(bucket))
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ClientError> {
        self.record("put_object")?;

        self.with_bucket_mut(bucket, |b| {
            b.insert(
                key.to_string(),
                StoredObject {
                    body,
                    content_type: content_type.to_string(),
                    modified_time: SystemTime::now(),
                },
            );
            Ok(())
        })
    }

    fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody, ClientError> {
        self.record("get_object")?;

        let obj = self.stored(bucket, key)?;
        let info = info(bucket, key, &obj);

        Ok(ObjectBody {
            headers: info.headers(),
            info,
            body: obj.body,
        })
    }

    fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead, ClientError> {
        self.record("head_object")?;

        let obj = self.stored(bucket, key)?;
        let info = info(bucket, key, &obj);

        Ok(ObjectHead {
            headers: info.headers(),
            info,
        })
    }

    fn delete_object(&self, bucket: &str, key: &str) -> Result<(), ClientError> {
        self.record("delete_object")?;

        self.with_bucket_mut(bucket, |b| match b.remove(key) {
            Some(_) => Ok(()),
            None => Err(ClientError::not_found(format!("no such key: {}", key))),
        })
    }

    fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<(), ClientError> {
        self.record("copy_object")?;

        let mut obj = self.stored(src_bucket, src_key)?;
        obj.modified_time = SystemTime::now();

        self.with_bucket_mut(dst_bucket, |b| {
            b.insert(dst_key.to_string(), obj);
            Ok(())
        })
    }

    fn list_objects(&self, bucket: &str, req: &ListRequest) -> Result<ListPage, ClientError> {
        self.record("list_objects")?;

        let max_keys = if req.max_keys > 0 {
            req.max_keys as usize
        } else {
            DEFAULT_MAX_KEYS
        };
        let delimiter = req.delimiter.as_deref().filter(|d| !d.is_empty());

        self.with_bucket_mut(bucket, |b| {
            let mut page = ListPage::default();
            let mut count = 0;
            let mut last: Option<String> = None;

            for (key, obj) in b.iter() {
                if !key.starts_with(&req.prefix) {
                    continue;
                }

                if let Some(marker) = &req.marker {
                    let rolled_up = delimiter.is_some_and(|d| marker.ends_with(d))
                        && key.starts_with(marker.as_str());
                    if key.as_str() <= marker.as_str() || rolled_up {
                        continue;
                    }
                }

                let common_prefix = delimiter.and_then(|d| {
                    let rest = &key[req.prefix.len()..];
                    rest.find(d)
                        .map(|i| format!("{}{}", req.prefix, &rest[..i + d.len()]))
                });

                if let Some(cp) = &common_prefix {
                    if page.common_prefixes.last() == Some(cp) {
                        continue;
                    }
                }

                if count == max_keys {
                    page.next_marker = last;
                    break;
                }
                count += 1;

                match common_prefix {
                    Some(cp) => {
                        last = Some(cp.clone());
                        page.common_prefixes.push(cp);
                    }
                    None => {
                        last = Some(key.clone());
                        page.objects.push(ObjectSummary {
                            key: key.clone(),
                            size: obj.body.len() as i64,
                            modified_time: obj.modified_time,
                        });
                    }
                }
            }

            Ok(page)
        })
    }

    fn object_status(&self, bucket: &str, key: &str) -> Result<u16, ClientError> {
        if let Err(err) = self.record("object_status") {
            return match err.status {
                Some(status) => Ok(status),
                None => Err(err),
            };
        }

        match self.stored(bucket, key) {
            Ok(_) => Ok(200),
            Err(err) if err.is_not_found() => Ok(404),
            Err(err) => Err(err),
        }
    }

    fn open_stream(&self, url: &str) -> Result<Box<dyn Read + Send>, ClientError> {
        self.record("open_stream")?;

        let (provider, bucket, key) =
            parse_object_url(url).map_err(|err| ClientError::new(None, err.to_string()))?;
        if provider != Provider::Memory {
            return Err(ClientError::new(
                None,
                format!("failed to open foreign url: {}", url),
            ));
        }

        let obj = self.stored(&bucket, &key)?;

        Ok(Box::new(Cursor::new(obj.body)))
    }
}
