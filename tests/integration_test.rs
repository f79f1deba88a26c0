use assert_cmd::Command;
use assert_cmd::cargo;
use mockito::{Matcher, Server};
use predicates::prelude::*;

const ENV_VARS: &[&str] = &[
    "WELLNESS_API_BASE_URL",
    "WELLNESS_API_TIMEOUT_MS",
    "WELLNESS_ID_TOKEN",
    "WELLNESS_USER_ID",
    "WELLNESS_REFRESH_TOKEN",
    "WELLNESS_AUTH_API_KEY",
    "WELLNESS_TOKEN_ENDPOINT",
];

/// The binary with a clean environment pointed at `url`.
fn wellness(url: &str) -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("wellness"));
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd.env("WELLNESS_API_BASE_URL", url);
    cmd
}

#[test]
fn test_get_prints_response() {
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/api/moods")
        .match_query(Matcher::UrlEncoded("days".into(), "7".into()))
        .match_header("Authorization", "Bearer secret")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[{"mood":"calm","score":4}]"#)
        .create();

    wellness(&server.url())
        .env("WELLNESS_ID_TOKEN", "secret")
        .args(["get", "/api/moods", "-p", "days=7"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""mood": "calm""#));

    mock.assert();
}

#[test]
fn test_get_without_credentials_is_anonymous() {
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/api/health")
        .match_header("Authorization", Matcher::Missing)
        .with_status(200)
        .with_body("ok")
        .create();

    wellness(&server.url())
        .args(["get", "/api/health"])
        .assert()
        .success()
        .stdout("ok\n");

    mock.assert();
}

#[test]
fn test_base_url_flag_overrides_env() {
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/api/profile")
        .with_status(200)
        .with_body(r#"{"name":"Sam"}"#)
        .create();

    wellness("http://127.0.0.1:9")
        .args(["--base-url", &server.url(), "get", "/api/profile"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Sam"));

    mock.assert();
}

#[test]
fn test_post_failure_exits_with_error() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/api/analyze_sentiment")
        .match_body(Matcher::Json(serde_json::json!({"text": "hello"})))
        .with_status(500)
        .with_body(r#"{"error":"Model unavailable"}"#)
        .expect(1)
        .create();

    wellness(&server.url())
        .env("WELLNESS_ID_TOKEN", "secret")
        .args(["post", "/api/analyze_sentiment", r#"{"text":"hello"}"#])
        .assert()
        .failure()
        .stderr(predicate::str::contains("HTTP 500: Model unavailable"));

    mock.assert();
}

#[test]
fn test_goals_list_requires_credentials() {
    let mut server = Server::new();
    let mock = server.mock("GET", "/api/goals").expect(0).create();

    wellness(&server.url())
        .args(["goals", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("User not authenticated"));

    mock.assert();
}

#[test]
fn test_goals_list_active() {
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/api/goals")
        .with_status(200)
        .with_body(
            r#"[{"id":"g1","title":"Walk","completed":false},
                {"id":"g2","title":"Read","completed":true}]"#,
        )
        .create();

    wellness(&server.url())
        .env("WELLNESS_ID_TOKEN", "secret")
        .args(["goals", "list", "--active"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Walk").and(predicate::str::contains("Read").not()));

    mock.assert();
}

#[test]
fn test_invalid_timeout_is_rejected() {
    wellness("http://127.0.0.1:9")
        .env("WELLNESS_API_TIMEOUT_MS", "soon")
        .args(["get", "/api/goals"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("WELLNESS_API_TIMEOUT_MS"));
}

#[test]
fn test_zero_timeout_flag_is_rejected() {
    wellness("http://127.0.0.1:9")
        .args(["--timeout-ms", "0", "get", "/api/goals"])
        .assert()
        .failure();
}

#[test]
fn test_journal_add_refetches_list() {
    let mut server = Server::new();
    let create = server
        .mock("POST", "/api/journal")
        .match_body(Matcher::PartialJson(serde_json::json!({"share_with_ai": true})))
        .with_status(201)
        .with_body(r#"{"id":"j1"}"#)
        .create();
    let list = server
        .mock("GET", "/api/journals")
        .with_status(200)
        .with_body(r#"[{"id":"j1","title":"Monday","content":"Slept well"}]"#)
        .create();

    wellness(&server.url())
        .env("WELLNESS_ID_TOKEN", "secret")
        .args(["journal", "add", "Monday", "Slept well", "--share-with-ai"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""id": "j1""#));

    create.assert();
    list.assert();
}
