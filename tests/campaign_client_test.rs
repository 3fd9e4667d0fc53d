//! Integration tests for the HTTP campaign client
//!
//! Runs `HttpCampaignClient` against a local mockito server and checks:
//! - request shape (query, JSON body, browser headers)
//! - payload decoding
//! - status and decode error classification

use alloy::primitives::Address;
use mockito::Matcher;
use questbot::campaign::{CampaignApi, CampaignError, HttpCampaignClient};
use questbot::config::CampaignConfig;
use serde_json::json;

const ACCOUNT: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

fn account() -> Address {
    ACCOUNT.parse().unwrap()
}

fn client_for(server: &mockito::Server) -> HttpCampaignClient {
    let config = CampaignConfig {
        base_url: server.url(),
        ..CampaignConfig::default()
    };
    HttpCampaignClient::new(&config, None).unwrap()
}

#[tokio::test]
async fn test_task_status_sends_checksum_address_and_browser_headers() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/v1/get-user-has-xp-to-refresh")
        .match_query(Matcher::UrlEncoded("address".into(), ACCOUNT.into()))
        .match_header("origin", "https://hub.zetachain.com")
        .match_header("referer", "https://hub.zetachain.com/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "xpRefreshTrackingByTask": {
                    "SEND_ZETA": { "hasXpToRefresh": true, "hasAlreadyEarned": true },
                    "POOL_DEPOSIT_ANY_POOL": { "hasXpToRefresh": false, "hasAlreadyEarned": false }
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let status = client_for(&server).task_status(account()).await.unwrap();

    mock.assert_async().await;
    let send = &status.xp_refresh_tracking_by_task["SEND_ZETA"];
    assert!(send.has_xp_to_refresh);
    let pool = &status.xp_refresh_tracking_by_task["POOL_DEPOSIT_ANY_POOL"];
    assert!(!pool.has_xp_to_refresh && !pool.has_already_earned);
}

#[tokio::test]
async fn test_enroll_posts_address_body() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/enroll-in-zeta-xp")
        .match_body(Matcher::Json(json!({ "address": ACCOUNT })))
        .with_status(200)
        .with_body(r#"{"isUserVerified":true}"#)
        .create_async()
        .await;

    let response = client_for(&server).enroll(account()).await.unwrap();

    mock.assert_async().await;
    assert!(response.is_user_verified);
}

#[tokio::test]
async fn test_claim_posts_signed_message() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/xp/claim-task")
        .match_body(Matcher::PartialJson(json!({
            "address": ACCOUNT,
            "task": "SEND_ZETA",
            "signedMessage": "0xabcd"
        })))
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    client_for(&server)
        .claim(account(), "SEND_ZETA", "0xabcd")
        .await
        .unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_service_unavailable_is_transient() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/v1/get-points")
        .match_query(Matcher::Any)
        .with_status(503)
        .with_body("Service Unavailable")
        .create_async()
        .await;

    let err = client_for(&server).stats(account()).await.unwrap_err();

    assert_eq!(
        err,
        CampaignError::Status {
            status: 503,
            body: "Service Unavailable".into()
        }
    );
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_malformed_payload_is_decode_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/v1/get-points")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("<html>maintenance</html>")
        .create_async()
        .await;

    let err = client_for(&server).stats(account()).await.unwrap_err();

    assert!(matches!(err, CampaignError::Decode(ref msg) if msg.contains("maintenance")));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_stats_decodes_standing() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/v1/get-points")
        .match_query(Matcher::UrlEncoded("address".into(), ACCOUNT.into()))
        .with_status(200)
        .with_body(r#"{"level":4,"totalXp":2150,"rank":1337,"extra":"ignored"}"#)
        .create_async()
        .await;

    let stats = client_for(&server).stats(account()).await.unwrap();

    assert_eq!((stats.level, stats.total_xp, stats.rank), (4, 2150, 1337));
}
