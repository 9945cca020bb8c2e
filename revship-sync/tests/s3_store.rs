//! S3 client against a local HTTP stub.

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use revship_core::{BranchName, Credentials, DeployConfig, EnvironmentName};
use revship_sync::store::S3Store;
use revship_sync::{ObjectMeta, ObjectStore, StoreError};

#[derive(Debug)]
struct Seen {
    method: String,
    url: String,
    headers: BTreeMap<String, String>,
    body: Vec<u8>,
}

/// Serve `responses` in order, reporting each request on the channel.
fn stub(responses: Vec<(u16, String)>) -> (String, mpsc::Receiver<Seen>) {
    let server = tiny_http::Server::http("127.0.0.1:0").expect("bind");
    let addr = server.server_addr().to_ip().expect("ip listener");
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for (status, body) in responses {
            let Ok(mut request) = server.recv() else {
                return;
            };
            let mut seen = Seen {
                method: request.method().to_string(),
                url: request.url().to_string(),
                headers: request
                    .headers()
                    .iter()
                    .map(|h| {
                        (
                            h.field.as_str().as_str().to_ascii_lowercase(),
                            h.value.as_str().to_string(),
                        )
                    })
                    .collect(),
                body: Vec::new(),
            };
            let _ = request.as_reader().read_to_end(&mut seen.body);
            let _ = tx.send(seen);
            let _ = request.respond(tiny_http::Response::from_string(body).with_status_code(status));
        }
    });
    (format!("http://{addr}"), rx)
}

fn store(endpoint: &str) -> S3Store {
    S3Store::new(
        &DeployConfig {
            region: "eu-west-1".to_string(),
            endpoint: Some(endpoint.to_string()),
            credentials: Credentials {
                access_key_id: "AKIDTEST".to_string(),
                secret_access_key: "secret".to_string(),
            },
            bucket: "site".to_string(),
            branch: BranchName::from("master"),
            environment: EnvironmentName::default(),
            is_ci: false,
        },
        Duration::from_secs(5),
    )
    .expect("store")
}

fn page(keys: &[&str], next: Option<&str>) -> String {
    let contents: String = keys
        .iter()
        .map(|k| format!("<Contents><Key>{k}</Key><Size>1</Size></Contents>"))
        .collect();
    let truncation = match next {
        Some(token) => format!(
            "<IsTruncated>true</IsTruncated><NextContinuationToken>{token}</NextContinuationToken>"
        ),
        None => "<IsTruncated>false</IsTruncated>".to_string(),
    };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/"><Name>site</Name>{truncation}{contents}</ListBucketResult>"#
    )
}

#[test]
fn list_follows_continuation_tokens() {
    let (endpoint, seen) = stub(vec![
        (200, page(&["branch/foo/a.css"], Some("tok"))),
        (200, page(&["branch/foo/b.js"], None)),
    ]);
    let objects = store(&endpoint).list("branch/foo/").expect("list");

    let keys: Vec<&str> = objects.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, vec!["branch/foo/a.css", "branch/foo/b.js"]);
    assert!(objects.iter().all(|o| o.content_hash.is_none()));

    let first = seen.recv().expect("first request");
    assert_eq!(first.method, "GET");
    assert_eq!(first.url, "/site?list-type=2&prefix=branch%2Ffoo%2F");
    let auth = first.headers.get("authorization").expect("signed");
    assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=AKIDTEST/"));
    assert!(auth.contains("/eu-west-1/s3/aws4_request"));

    let second = seen.recv().expect("second request");
    assert!(second.url.contains("continuation-token=tok"));
}

#[test]
fn put_sends_headers_and_content_hash() {
    let (endpoint, seen) = stub(vec![(200, String::new())]);
    let mut headers = BTreeMap::new();
    headers.insert("Cache-Control".to_string(), "no-cache".to_string());
    headers.insert("Content-Type".to_string(), "text/html".to_string());
    let meta = ObjectMeta {
        content_hash: "abc123".to_string(),
        headers,
    };

    store(&endpoint)
        .put("branch/foo/index.html", b"<html>", &meta)
        .expect("put");

    let request = seen.recv().expect("request");
    assert_eq!(request.method, "PUT");
    assert_eq!(request.url, "/site/branch/foo/index.html");
    assert_eq!(request.body, b"<html>");
    assert_eq!(request.headers.get("cache-control").map(String::as_str), Some("no-cache"));
    assert_eq!(
        request.headers.get("x-amz-meta-content-sha256").map(String::as_str),
        Some("abc123")
    );
    let auth = request.headers.get("authorization").expect("signed");
    assert!(auth.contains("SignedHeaders=cache-control;content-type;host;x-amz-content-sha256;x-amz-date;x-amz-meta-content-sha256"));
}

#[test]
fn status_codes_map_to_error_classes() {
    let denied = "<Error><Code>AccessDenied</Code><Message>Access Denied</Message></Error>";
    let (endpoint, _seen) = stub(vec![
        (403, denied.to_string()),
        (503, String::new()),
        (400, String::new()),
        (404, String::new()),
    ]);
    let store = store(&endpoint);
    let meta = ObjectMeta::default();

    let err = store.put("a.css", b"a", &meta).unwrap_err();
    assert!(matches!(err, StoreError::Auth(_)), "got: {err}");
    assert!(err.to_string().contains("AccessDenied"));
    assert!(store.put("a.css", b"a", &meta).unwrap_err().is_transient());
    assert!(matches!(
        store.put("a.css", b"a", &meta).unwrap_err(),
        StoreError::Rejected(_)
    ));
    store.delete("gone.css").expect("404 on delete is success");
}
