//! S3 XML response bodies, deserialized via `quick-xml` + `serde`.

use serde::Deserialize;

use crate::error::StoreError;

// -----------------------------------------------------------------------
// ListBucketResult (ListObjectsV2)
// -----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename = "ListBucketResult")]
pub(crate) struct ListBucketResult {
    #[serde(rename = "Contents", default)]
    pub contents: Vec<Contents>,
    #[serde(rename = "IsTruncated", default)]
    pub is_truncated: bool,
    #[serde(rename = "NextContinuationToken", default)]
    pub next_continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Contents {
    #[serde(rename = "Key")]
    pub key: String,
}

pub(crate) fn list_bucket_result(body: &str) -> Result<ListBucketResult, StoreError> {
    quick_xml::de::from_str(body)
        .map_err(|e| StoreError::Protocol(format!("invalid ListBucketResult: {e}")))
}

// -----------------------------------------------------------------------
// Error
// -----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename = "Error")]
struct ErrorXml {
    #[serde(rename = "Code", default)]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

/// `Code: Message` from an S3 error body, if it is one.
pub(crate) fn error_summary(body: &str) -> Option<String> {
    let error: ErrorXml = quick_xml::de::from_str(body).ok()?;
    match (error.code.is_empty(), error.message.is_empty()) {
        (true, true) => None,
        (false, true) => Some(error.code),
        (true, false) => Some(error.message),
        (false, false) => Some(format!("{}: {}", error.code, error.message)),
    }
}
