//! Mock HTTP endpoints and file fixtures

use std::path::{Path, PathBuf};
use std::time::Duration;

use fetch_jsonl::Config;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Serve `body` as `application/json` at `route`
pub async fn mount_json(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.to_owned(), "application/json"))
        .mount(server)
        .await;
}

/// Serve `body` with an arbitrary status and content type at `route`
pub async fn mount_raw(
    server: &MockServer,
    route: &str,
    status: u16,
    content_type: &str,
    body: &str,
) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).set_body_raw(body.to_owned(), content_type))
        .mount(server)
        .await;
}

/// Serve JSON at `route` only after `delay`
pub async fn mount_slow(server: &MockServer, route: &str, delay: Duration) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("{}", "application/json")
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

/// Write `lines` to `<dir>/urls.txt`, one per line
pub fn write_urls(dir: &Path, lines: &[String]) -> PathBuf {
    let input = dir.join("urls.txt");
    std::fs::write(&input, lines.join("\n") + "\n").expect("Failed to write URL list");
    input
}

/// Parse every line of a JSON Lines file
pub fn read_jsonl(path: &Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
        .expect("Failed to read output")
        .lines()
        .map(|line| serde_json::from_str(line).expect("Output line is not JSON"))
        .collect()
}

/// Default config with a short request timeout
pub fn fast_config(max_concurrent: usize) -> Config {
    let mut config = Config::with_max_concurrent(max_concurrent);
    config.pipeline.request_timeout = Duration::from_millis(500);
    config.pipeline.drain_timeout = Duration::from_secs(10);
    config
}
