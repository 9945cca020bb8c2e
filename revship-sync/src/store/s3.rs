//! S3-compatible object store over plain HTTP.
//!
//! Path-style addressing (`{endpoint}/{bucket}/{key}`) so any S3-compatible
//! endpoint works. Every request is signed with SigV4.

use std::time::Duration;

use chrono::Utc;
use url::Url;

use revship_core::{Credentials, DeployConfig};

use crate::error::StoreError;

use super::sigv4::{self, SigningInput};
use super::xml;
use super::{ObjectMeta, ObjectStore, RemoteObject, CONTENT_HASH_HEADER};

const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug)]
pub struct S3Store {
    agent: ureq::Agent,
    scheme: String,
    /// `host[:port]`, port only when not the scheme default.
    host: String,
    /// Endpoint path without trailing `/`, usually empty.
    base_path: String,
    bucket: String,
    region: String,
    credentials: Credentials,
}

impl S3Store {
    pub fn new(config: &DeployConfig, timeout: Duration) -> Result<Self, StoreError> {
        let region = if config.region.trim().is_empty() {
            DEFAULT_REGION.to_string()
        } else {
            config.region.trim().to_string()
        };
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://s3.{region}.amazonaws.com"));
        let url = Url::parse(&endpoint)
            .map_err(|e| StoreError::Rejected(format!("invalid endpoint '{endpoint}': {e}")))?;
        let Some(host) = url.host_str() else {
            return Err(StoreError::Rejected(format!("endpoint '{endpoint}' has no host")));
        };
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        Ok(Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            scheme: url.scheme().to_string(),
            host,
            base_path: url.path().trim_end_matches('/').to_string(),
            bucket: config.bucket.clone(),
            region,
            credentials: config.credentials.clone(),
        })
    }

    fn canonical_uri(&self, key: Option<&str>) -> String {
        let path = match key {
            Some(key) => format!("{}/{}/{key}", self.base_path, self.bucket),
            None => format!("{}/{}", self.base_path, self.bucket),
        };
        sigv4::encode_path(&path)
    }

    fn send(
        &self,
        method: &str,
        key: Option<&str>,
        query: &[(&str, &str)],
        extra_headers: &[(String, String)],
        body: &[u8],
    ) -> Result<ureq::Response, StoreError> {
        let canonical_uri = self.canonical_uri(key);
        let canonical_query = sigv4::canonical_query(query);
        let payload_hash = sigv4::sha256_hex(body);
        let amz_date = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();

        let mut headers = vec![
            ("host".to_string(), self.host.clone()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        headers.extend(extra_headers.iter().cloned());

        let authorization = sigv4::authorization(
            &SigningInput {
                method,
                canonical_uri: &canonical_uri,
                canonical_query: &canonical_query,
                headers: &headers,
                payload_hash: &payload_hash,
                amz_date: &amz_date,
            },
            &self.credentials,
            &self.region,
        );

        let mut url = format!("{}://{}{}", self.scheme, self.host, canonical_uri);
        if !canonical_query.is_empty() {
            url.push('?');
            url.push_str(&canonical_query);
        }

        let mut request = self.agent.request(method, &url);
        for (name, value) in headers.iter().filter(|(name, _)| name != "host") {
            request = request.set(name, value);
        }
        request = request.set("Authorization", &authorization);

        let result = if body.is_empty() && method != "PUT" {
            request.call()
        } else {
            request.send_bytes(body)
        };
        result.map_err(|err| classify(method, &url, err))
    }
}

/// Map an HTTP failure onto the retry/abort classes.
fn classify(method: &str, url: &str, err: ureq::Error) -> StoreError {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            let detail = xml::error_summary(&body).unwrap_or_else(|| format!("HTTP {code}"));
            let message = format!("{method} {url}: {detail}");
            match code {
                401 | 403 => StoreError::Auth(message),
                404 => StoreError::NotFound(message),
                408 | 429 | 500..=599 => StoreError::Transient(message),
                _ => StoreError::Rejected(message),
            }
        }
        ureq::Error::Transport(transport) => {
            StoreError::Transient(format!("{method} {url}: {transport}"))
        }
    }
}

impl ObjectStore for S3Store {
    fn describe(&self) -> String {
        format!("s3://{}", self.bucket)
    }

    fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>, StoreError> {
        let mut objects = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let mut query = vec![("list-type", "2"), ("prefix", prefix)];
            if let Some(token) = token.as_deref() {
                query.push(("continuation-token", token));
            }
            let response = self.send("GET", None, &query, &[], &[])?;
            let body = response
                .into_string()
                .map_err(|e| StoreError::Transient(format!("reading listing: {e}")))?;
            let page = xml::list_bucket_result(&body)?;
            objects.extend(page.contents.into_iter().map(|c| RemoteObject {
                key: c.key,
                content_hash: None,
            }));
            match page.next_continuation_token {
                Some(next) if page.is_truncated => token = Some(next),
                _ => break,
            }
        }
        Ok(objects)
    }

    fn put(&self, key: &str, body: &[u8], meta: &ObjectMeta) -> Result<(), StoreError> {
        let mut headers: Vec<(String, String)> = meta
            .headers
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.clone()))
            .collect();
        if !meta.content_hash.is_empty() {
            headers.push((CONTENT_HASH_HEADER.to_string(), meta.content_hash.clone()));
        }
        self.send("PUT", Some(key), &[], &headers, body)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        match self.send("DELETE", Some(key), &[], &[], &[]) {
            Ok(_) => Ok(()),
            Err(StoreError::NotFound(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }
}
