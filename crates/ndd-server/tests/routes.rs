mod common;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use common::{Fixture, redcap_config};
use ndd_server::{AppState, router};
use serde_json::Value;
use tower::ServiceExt;

fn app(fx: &Fixture) -> Router {
    let state = AppState::new(
        fx.services.clone(),
        redcap_config(),
        "https://labkey.example.org/family?fnum=",
    );
    router(state, &[])
}

async fn get(app: Router, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
    let request = Request::get(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

async fn post_form(app: Router, uri: &str, form: &str) -> (StatusCode, Option<String>, Vec<u8>) {
    let request = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap();
    send(app, request).await
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Option<String>, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let location = response
        .headers()
        .get(header::LOCATION)
        .map(|v| v.to_str().unwrap().to_string());
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, location, body.to_vec())
}

#[tokio::test]
async fn health_reports_ok() {
    let fx = Fixture::new();
    let (status, _, body) = get(app(&fx), "/health").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn referral_redirects_to_its_data_collection_record() {
    let fx = Fixture::new();
    let (status, location, _) = get(app(&fx), "/gotoDataCollectRC?record=10").await;
    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(
        location.as_deref(),
        Some("https://redcap.example.org/record_home.php?pid=202&arm=1&id=1")
    );
}

#[tokio::test]
async fn family_redirects_to_its_referral() {
    let fx = Fixture::new();
    let (status, location, _) = get(app(&fx), "/gotoReferralRC?record=2").await;
    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(
        location.as_deref(),
        Some("https://redcap.example.org/record_home.php?pid=101&arm=1&id=11")
    );
}

#[tokio::test]
async fn family_page_uses_the_f_number() {
    let fx = Fixture::new();
    let (status, location, _) = get(app(&fx), "/viewSubjInLabKey?record=1").await;
    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(
        location.as_deref(),
        Some("https://labkey.example.org/family?fnum=F190001")
    );
}

#[tokio::test]
async fn family_without_f_number_is_a_bad_request() {
    let fx = Fixture::new();
    let (status, _, body) = get(app(&fx), "/viewSubjInLabKey?record=2").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert!(json["error"].as_str().unwrap().contains("fnum"));
}

#[tokio::test]
async fn unknown_family_is_not_found() {
    let fx = Fixture::new();
    let (status, _, _) = get(app(&fx), "/gotoReferralRC?record=99").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn redirect_without_record_is_rejected() {
    let fx = Fixture::new();
    let (status, _, _) = get(app(&fx), "/copyContactInfo").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn dupe_check_marks_the_referral_and_redirects() {
    let fx = Fixture::new();
    let (status, location, _) = post_form(app(&fx), "/dupe_check", "record=13").await;
    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(
        location.as_deref(),
        Some("https://redcap.example.org/record_home.php?pid=101&arm=1&id=13")
    );
    assert_eq!(fx.referral_row("13").get("verifiedunique"), "0");
}

#[tokio::test]
async fn dupe_check_without_record_returns_to_the_project() {
    let fx = Fixture::new();
    let (status, location, _) = get(app(&fx), "/dupe_check").await;
    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(
        location.as_deref(),
        Some("https://redcap.example.org/record_home.php?pid=101&arm=1")
    );
}

#[tokio::test]
async fn data_trigger_returns_the_assigned_ids() {
    let fx = Fixture::new();
    let (status, _, body) = post_form(
        app(&fx),
        "/data_pipeline",
        "record=1&instrument=enrollment&redcap_repeat_instance=3&project_id=202",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["subject_id"], 200);
    assert_eq!(json["f_individual_id"], "F190001-04");
    assert_eq!(fx.member("1", "3").get("idnum"), "04");
}

#[tokio::test]
async fn redcap_failure_is_a_bad_gateway() {
    let fx = Fixture::new();
    fx.referral.fail_imports();
    let (status, _, body) = post_form(app(&fx), "/copyParentsInfoFromDC", "record=10").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert!(json["error"].is_string());
}
