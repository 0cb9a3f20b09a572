use std::time::Duration;

use chrono::{NaiveDate, Utc};
use httpmock::prelude::*;
use serde_json::json;
use tvde_fleet::commission::PlanTier;
use tvde_fleet::config::{RpaConfig, StorageConfig};
use tvde_fleet::fleet::{Partner, Period, Platform};
use tvde_fleet::ingestion::{BoltApiError, BoltEndpoints, BoltFleetClient};
use tvde_fleet::rpa::{BrowserError, BrowserLauncher, WebDriverLauncher};
use tvde_fleet::storage::{StorageError, StorageProvider, StorageRouter, StorageSettings};

fn week() -> Period {
    Period::week_of(NaiveDate::from_ymd_opt(2025, 3, 10).expect("valid date"))
}

fn bolt_client(server: &MockServer) -> BoltFleetClient {
    BoltFleetClient::new(
        reqwest::Client::new(),
        BoltEndpoints {
            auth_url: server.url("/token"),
            api_url: server.base_url(),
        },
        "frota-client",
        "frota-secret",
    )
}

#[tokio::test]
async fn bolt_earnings_are_paged_with_a_client_credentials_token() {
    let server = MockServer::start_async().await;
    let token = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/token")
                .body_contains("grant_type=client_credentials")
                .body_contains("client_id=frota-client");
            then.status(200)
                .json_body(json!({ "access_token": "tok-1", "expires_in": 600 }));
        })
        .await;
    let first_page = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/fleetIntegration/v1/getDriverEarnings")
                .header("authorization", "Bearer tok-1")
                .body_contains("\"offset\":0")
                .body_contains("\"start_date\":\"2025-03-10\"");
            then.status(200).json_body(json!({
                "data": {
                    "total": 2,
                    "drivers": [{
                        "driver_uuid": "bolt-1",
                        "driver_name": "Ana Costa",
                        "gross_earnings": 500.0,
                        "commission": -125.0,
                        "tips": 10.0,
                        "rides": 41
                    }]
                }
            }));
        })
        .await;
    let second_page = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/fleetIntegration/v1/getDriverEarnings")
                .body_contains("\"offset\":1");
            then.status(200).json_body(json!({
                "data": {
                    "total": 2,
                    "drivers": [{
                        "driver_uuid": "bolt-2",
                        "gross_earnings": 200.0,
                        "commission": 40.0,
                        "net_earnings": 150.0,
                        "rides": 12
                    }]
                }
            }));
        })
        .await;

    let records = bolt_client(&server)
        .earnings(week())
        .await
        .expect("earnings fetched");

    token.assert_async().await;
    first_page.assert_async().await;
    second_page.assert_async().await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].platform, Platform::Bolt);
    assert_eq!(records[0].driver_ref.as_deref(), Some("bolt-1"));
    assert_eq!(records[0].platform_fee, 125.0);
    assert_eq!(records[0].net, 375.0);
    assert_eq!(records[0].trips, 41);
    assert_eq!(records[1].driver_name, None);
    assert_eq!(records[1].net, 150.0);
}

#[tokio::test]
async fn rejected_bolt_credentials_surface_the_status() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/token");
            then.status(401).body("invalid_client");
        })
        .await;

    let error = bolt_client(&server)
        .earnings(week())
        .await
        .expect_err("credentials rejected");
    match error {
        BoltApiError::Auth { status, body } => {
            assert_eq!(status, 401);
            assert_eq!(body, "invalid_client");
        }
        other => panic!("unexpected error: {other}"),
    }
}

fn partner_with(provider: StorageProvider, token: Option<&str>) -> Partner {
    Partner {
        id: "parceiro-1".to_string(),
        name: "Frota Faro".to_string(),
        nif: "501442600".to_string(),
        email: "geral@frotafaro.pt".to_string(),
        phone: None,
        plan: PlanTier::Essencial,
        storage: StorageSettings {
            provider,
            root_folder: "Frota".to_string(),
            access_token: token.map(str::to_string),
        },
        approval_limit: 500.0,
        active: true,
        created_at: Utc::now(),
    }
}

fn router(server: &MockServer) -> StorageRouter {
    let local = tempfile::tempdir().expect("tempdir");
    StorageRouter::new(&StorageConfig {
        local_root: local.path().to_path_buf(),
    })
    .with_endpoints(server.base_url(), server.base_url(), server.base_url())
}

#[tokio::test]
async fn dropbox_uploads_below_the_partner_folder_and_lists_files_only() {
    let server = MockServer::start_async().await;
    let upload = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/2/files/upload")
                .header("authorization", "Bearer dbx-token")
                .header_exists("dropbox-api-arg")
                .body("semana");
            then.status(200).json_body(json!({
                "id": "id:abc",
                "name": "bolt.csv",
                "size": 6
            }));
        })
        .await;
    let listing = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/2/files/list_folder")
                .json_body(json!({ "path": "/Frota/importacoes" }));
            then.status(200).json_body(json!({
                "entries": [
                    { ".tag": "folder", "name": "antigas" },
                    { ".tag": "file", "id": "id:abc", "name": "bolt.csv", "size": 6 }
                ]
            }));
        })
        .await;

    let storage = router(&server)
        .for_partner(&partner_with(StorageProvider::Dropbox, Some("dbx-token")))
        .expect("dropbox storage");
    assert_eq!(storage.provider(), StorageProvider::Dropbox);

    let stored = storage
        .upload("importacoes/bolt.csv", b"semana".to_vec(), "text/csv")
        .await
        .expect("uploaded");
    assert_eq!(stored.path, "importacoes/bolt.csv");
    assert_eq!(stored.remote_id.as_deref(), Some("id:abc"));

    let files = storage.list("importacoes").await.expect("listed");
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].path, "importacoes/bolt.csv");
    assert_eq!(files[0].content_type, "text/csv");

    upload.assert_async().await;
    listing.assert_async().await;
}

#[tokio::test]
async fn onedrive_treats_a_missing_folder_as_empty() {
    let server = MockServer::start_async().await;
    let upload = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/me/drive/root:/Frota/faturas/marco.pdf:/content")
                .header("authorization", "Bearer graph-token");
            then.status(201).json_body(json!({
                "id": "01ABC",
                "name": "marco.pdf",
                "size": 4,
                "file": { "mimeType": "application/pdf" }
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/me/drive/root:/Frota/vazia:/children");
            then.status(404)
                .json_body(json!({ "error": { "code": "itemNotFound" } }));
        })
        .await;

    let storage = router(&server)
        .for_partner(&partner_with(StorageProvider::OneDrive, Some("graph-token")))
        .expect("onedrive storage");

    let stored = storage
        .upload("faturas/marco.pdf", b"%PDF".to_vec(), "application/pdf")
        .await
        .expect("uploaded");
    assert_eq!(stored.remote_id.as_deref(), Some("01ABC"));
    assert_eq!(stored.size, 4);
    upload.assert_async().await;

    assert!(storage.list("vazia").await.expect("listed").is_empty());
}

#[tokio::test]
async fn remote_storage_without_a_token_is_not_configured() {
    let server = MockServer::start_async().await;
    let error = router(&server)
        .for_partner(&partner_with(StorageProvider::Dropbox, None))
        .err()
        .expect("token required");
    assert!(matches!(
        error,
        StorageError::NotConfigured(StorageProvider::Dropbox)
    ));
}

#[tokio::test]
async fn webdriver_session_speaks_the_w3c_protocol() {
    let server = MockServer::start_async().await;
    let session = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/session")
                .body_contains("goog:chromeOptions");
            then.status(200).json_body(json!({
                "value": { "sessionId": "s-1", "capabilities": {} }
            }));
        })
        .await;
    let navigate = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/session/s-1/url")
                .json_body(json!({ "url": "https://fleets.bolt.eu/login" }));
            then.status(200).json_body(json!({ "value": null }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/session/s-1/url");
            then.status(200)
                .json_body(json!({ "value": "https://fleets.bolt.eu/login" }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/session/s-1/elements");
            then.status(200).json_body(json!({ "value": [] }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/session/s-1/element");
            then.status(404).json_body(json!({
                "value": { "error": "no such element", "message": "#otp" }
            }));
        })
        .await;
    let close = server
        .mock_async(|when, then| {
            when.method(DELETE).path("/session/s-1");
            then.status(200).json_body(json!({ "value": null }));
        })
        .await;

    let launcher = WebDriverLauncher::new(&RpaConfig {
        webdriver_url: server.base_url(),
        ..RpaConfig::default()
    })
    .with_poll_interval(Duration::from_millis(10));
    let mut browser = launcher.launch().await.expect("session opened");

    browser
        .goto("https://fleets.bolt.eu/login")
        .await
        .expect("navigated");
    assert_eq!(
        browser.current_url().await.expect("url"),
        "https://fleets.bolt.eu/login"
    );
    assert!(!browser.exists("#otp").await.expect("exists"));

    let error = browser
        .wait_for("#otp", Duration::from_millis(50))
        .await
        .expect_err("never appears");
    assert!(matches!(error, BrowserError::Timeout { .. }));

    browser.close().await.expect("closed");
    browser.close().await.expect("second close is a no-op");

    session.assert_async().await;
    navigate.assert_async().await;
    close.assert_hits_async(1).await;
}
