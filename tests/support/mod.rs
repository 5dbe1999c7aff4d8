//! Shared helpers for integration tests that mock a Moodle site.

#![allow(dead_code)]

use std::time::Duration;

use moodle_dump_core::RetryPolicy;
use serde_json::Value;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN: &str = "ws-token-0123456789";
pub const ACCESS_KEY: &str = "private-key-abcdef";

/// Retry policy with millisecond delays so retry tests stay fast.
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(
        max_attempts,
        Duration::from_millis(5),
        Duration::from_millis(20),
        2.0,
    )
    .with_max_jitter(Duration::ZERO)
}

/// Mounts a successful `login/token.php` response.
pub async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/login/token.php"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "token": TOKEN,
            "privatetoken": "private-token-xyz",
        })))
        .mount(server)
        .await;
}

/// Mounts a webservice function returning `body`.
pub async fn mount_function(server: &MockServer, function: &str, body: Value) {
    Mock::given(method("POST"))
        .and(path("/webservice/rest/server.php"))
        .and(query_param("wsfunction", function))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Mounts `core_course_get_contents` for one course id.
pub async fn mount_contents(server: &MockServer, course_id: i64, body: Value) {
    Mock::given(method("POST"))
        .and(path("/webservice/rest/server.php"))
        .and(query_param("wsfunction", "core_course_get_contents"))
        .and(query_param("courseid", course_id.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Mounts a direct-download file behind `tokenpluginfile.php`.
pub async fn mount_file(server: &MockServer, file_path: &str, content: &[u8]) {
    Mock::given(method("GET"))
        .and(path(format!("/tokenpluginfile.php/{ACCESS_KEY}{file_path}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.to_vec()))
        .mount(server)
        .await;
}

/// A webservice file URL as it appears in course contents.
pub fn webservice_file_url(server: &MockServer, file_path: &str) -> String {
    format!(
        "{}/webservice/pluginfile.php{file_path}?forcedownload=1",
        server.uri()
    )
}

/// One section with one resource module holding `files` (name, url).
pub fn single_section(section: &str, module: &str, files: &[(&str, String)]) -> Value {
    let contents: Vec<Value> = files
        .iter()
        .map(|(name, url)| {
            serde_json::json!({
                "type": "file",
                "filename": name,
                "fileurl": url,
                "filesize": 3,
            })
        })
        .collect();
    serde_json::json!([{
        "id": 10,
        "section": 0,
        "name": section,
        "modules": [{
            "id": 100,
            "name": module,
            "modname": "resource",
            "contents": contents,
        }],
    }])
}
