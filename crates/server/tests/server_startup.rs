//! Starts the real `turnstile` binary and talks to it over TCP.

use std::io::Write;
use std::net::TcpListener;
use std::process::Output;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use tempfile::NamedTempFile;
use tokio::process::{Child, Command};
use tokio::time::{sleep, timeout};

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn config_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn serving_config(port: u16) -> NamedTempFile {
    config_file(&format!(
        r#"
[server]
host = "127.0.0.1"
port = {port}

[purchase]
url = "https://tickets.example.com/event/42"
sections = ["Floor"]
number_of_tickets = 2
username = "fan@example.com"
password = "hunter2"
"#
    ))
}

fn turnstile() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_turnstile"));
    cmd.env("RUST_LOG", "error").kill_on_drop(true);
    cmd
}

/// A running `turnstile serve` bound to a free local port.
struct RunningServer {
    port: u16,
    child: Child,
    client: Client,
    _config: NamedTempFile,
}

impl RunningServer {
    async fn start() -> Self {
        let port = free_port();
        let config = serving_config(port);
        let child = turnstile()
            .arg("serve")
            .env("TURNSTILE_CONFIG", config.path())
            .spawn()
            .expect("spawn turnstile");

        let server = Self {
            port,
            child,
            client: Client::new(),
            _config: config,
        };
        server.wait_ready().await;
        server
    }

    fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    async fn wait_ready(&self) {
        for _ in 0..40 {
            if self.client.get(self.url("/api/v1/health")).send().await.is_ok() {
                return;
            }
            sleep(Duration::from_millis(50)).await;
        }
        panic!("turnstile did not start listening on port {}", self.port);
    }

    async fn get(&self, path: &str) -> (StatusCode, String) {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("request turnstile");
        let status = response.status();
        (status, response.text().await.unwrap())
    }

    async fn stop(mut self) {
        self.child.kill().await.ok();
    }
}

/// Run a one-shot command and collect its output.
async fn run_to_exit(cmd: &mut Command) -> Output {
    timeout(Duration::from_secs(5), cmd.output())
        .await
        .expect("turnstile kept running")
        .expect("run turnstile")
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = RunningServer::start().await;

    let (status, body) = server.get("/api/v1/health").await;

    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["active_jobs"], 0);

    server.stop().await;
}

#[tokio::test]
async fn test_config_endpoint_hides_password() {
    let server = RunningServer::start().await;

    let (status, body) = server.get("/api/v1/config").await;

    assert_eq!(status, StatusCode::OK);
    assert!(!body.contains("hunter2"));
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["server"]["port"], server.port);
    assert_eq!(json["purchase"]["password_configured"], true);
    assert_eq!(json["purchase"]["username"], "fan@example.com");

    server.stop().await;
}

#[tokio::test]
async fn test_metrics_endpoint_served() {
    let server = RunningServer::start().await;
    server.get("/api/v1/health").await;

    let (status, body) = server.get("/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("turnstile_http_requests_total"));

    server.stop().await;
}

#[tokio::test]
async fn test_missing_config_file_exits_with_error() {
    let output = run_to_exit(
        turnstile()
            .arg("serve")
            .env("TURNSTILE_CONFIG", "/nonexistent/turnstile.toml"),
    )
    .await;

    assert!(!output.status.success());
}

#[tokio::test]
async fn test_zero_tickets_in_purchase_section_exits_with_error() {
    let config = config_file(
        r#"
[purchase]
url = "https://tickets.example.com/event/42"
sections = ["Floor"]
number_of_tickets = 0
username = "fan@example.com"
password = "hunter2"
"#,
    );

    let output = run_to_exit(turnstile().args(["run", "--config"]).arg(config.path())).await;

    assert!(!output.status.success());
}

#[tokio::test]
async fn test_run_without_purchase_section_exits_with_error() {
    let config = config_file("[server]\nport = 8080\n");

    let output = run_to_exit(turnstile().arg("run").arg("-c").arg(config.path())).await;

    assert!(!output.status.success());
    let logged = String::from_utf8_lossy(&output.stdout);
    assert!(logged.contains("[purchase]"), "output: {}", logged);
}
