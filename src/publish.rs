//! Publishes result relations to S3 for downstream consumers.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::info;

pub fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Object key for a published file, with `.gz` appended when compressed.
pub fn object_key(prefix: &str, file_name: &str, gzip: bool) -> String {
    let prefix = prefix.trim_end_matches('/');
    let suffix = if gzip { ".gz" } else { "" };
    if prefix.is_empty() {
        format!("{file_name}{suffix}")
    } else {
        format!("{prefix}/{file_name}{suffix}")
    }
}

/// Uploads every file in `dir` under `prefix`, optionally gzip-compressed.
/// Returns the number of objects written.
#[tracing::instrument(skip(client), fields(dir = %dir.display()))]
pub async fn publish_dir(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    prefix: &str,
    dir: &Path,
    gzip: bool,
) -> Result<usize> {
    let mut upload_count = 0;
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("listing '{}'", dir.display()))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        let file_contents = tokio::fs::read(&path).await?;
        let body = if gzip {
            Bytes::from(self::gzip(&file_contents)?)
        } else {
            Bytes::from(file_contents)
        };
        let key = object_key(prefix, file_name, gzip);

        client
            .put_object()
            .bucket(bucket)
            .key(&key)
            .body(ByteStream::from(body))
            .send()
            .await
            .with_context(|| format!("uploading s3://{bucket}/{key}"))?;

        upload_count += 1;
    }

    info!(upload_count, "S3 upload complete");
    Ok(upload_count)
}
