use crate::model::fs::FsError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    AWS,
    GCS,
    Memory,
}

impl Provider {
    pub fn scheme(&self) -> &'static str {
        match self {
            Provider::AWS => "s3",
            Provider::GCS => "gs",
            Provider::Memory => "mem",
        }
    }
}

pub fn parse_provider_from_uri(bucket_uri: &str) -> Result<Provider, FsError> {
    return if bucket_uri.starts_with("s3://") {
        Ok(Provider::AWS)
    } else if bucket_uri.starts_with("gs://") {
        Ok(Provider::GCS)
    } else if bucket_uri.starts_with("mem://") {
        Ok(Provider::Memory)
    } else {
        Err(FsError::Config(format!(
            "failed to parse provider of: {}",
            bucket_uri
        )))
    };
}

pub fn parse_bucket_from_uri(bucket_uri: &str) -> &str {
    let rest = bucket_uri
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or("");

    rest.split_once('/').map(|(bucket, _)| bucket).unwrap_or(rest)
}

/// Request URL handed out for `key`, resolved again by `parse_object_url`.
pub fn object_url(provider: Provider, bucket: &str, key: &str) -> String {
    format!("{}://{}/{}", provider.scheme(), bucket, key)
}

pub fn parse_object_url(url: &str) -> Result<(Provider, String, String), FsError> {
    let provider = parse_provider_from_uri(url)?;
    let rest = url.split_once("://").map(|(_, rest)| rest).unwrap_or("");

    match rest.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
            Ok((provider, bucket.to_string(), key.to_string()))
        }
        _ => Err(FsError::Config(format!(
            "failed to parse object url: {}",
            url
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_provider() {
        assert!(matches!(parse_provider_from_uri("s3://bucket"), Ok(Provider::AWS)));
        assert!(matches!(parse_provider_from_uri("gs://bucket"), Ok(Provider::GCS)));
        assert!(matches!(parse_provider_from_uri("mem://bucket"), Ok(Provider::Memory)));
        assert!(matches!(parse_provider_from_uri("ftp://bucket"), Err(_)));
    }

    #[test]
    fn test_parse_bucket() {
        let cases = vec![
            ("s3://bucket", "bucket"),
            ("gs://bucket", "bucket"),
            ("mem://bucket/ignored/path", "bucket"),
            ("bucket", ""),
        ];

        for (uri, expected) in cases {
            assert_eq!(
                parse_bucket_from_uri(uri),
                expected,
                "failed bucket for case: {}",
                uri
            );
        }
    }

    #[test]
    fn test_parse_object_url() {
        let url = object_url(Provider::AWS, "bucket", "folder/file.txt");
        assert_eq!(url, "s3://bucket/folder/file.txt");

        let (provider, bucket, key) = parse_object_url(&url).unwrap();
        assert_eq!(provider, Provider::AWS);
        assert_eq!(bucket, "bucket");
        assert_eq!(key, "folder/file.txt");

        let cases = vec!["s3://bucket", "s3://bucket/", "gs:///key", "http://bucket/key"];
        for url in cases {
            assert!(
                parse_object_url(url).is_err(),
                "failed to reject case: {}",
                url
            );
        }
    }
}
