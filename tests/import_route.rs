//! Callback endpoint behavior that does not need live backing stores:
//! signature enforcement and message parsing. Pools are lazy and never
//! connect because every request here is rejected before the pipeline
//! touches them, except the final case which fails on the first store
//! access and must surface as an internal error rather than a 401.

use linkdock_api::import::signature::{self, SIGNATURE_HEADER};
use linkdock_api::import::ImportConfig;
use linkdock_api::routes::import::import_callback;
use linkdock_api::test_support::{
    lazy_kv_store, lazy_pg_pool, test_import_context, TestRocketBuilder,
};
use rocket::http::{ContentType, Header, Status};
use rocket::local::asynchronous::Client;
use rocket::routes;

const SIGNING_KEY: &str = "integration-test-signing-key";

fn trigger_body() -> String {
    r#"{"workspaceId":1,"provider":"bitly","providerAccountId":"grp","eligibleDomains":["d.co"],"importTags":false}"#
        .to_string()
}

async fn client(verify_signatures: bool) -> Client {
    let mut config = ImportConfig::from_env();
    config.verify_signatures = verify_signatures;
    config.queue_signing_key = SIGNING_KEY.to_string();

    let context = test_import_context(lazy_pg_pool(), lazy_kv_store(), config);

    TestRocketBuilder::new()
        .mount_api_routes(routes![import_callback])
        .manage_import_context(context)
        .async_client()
        .await
}

#[tokio::test]
async fn missing_signature_is_unauthorized() {
    let client = client(true).await;

    let response = client
        .post("/api/v1/import/callback")
        .header(ContentType::JSON)
        .body(trigger_body())
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::Unauthorized);
}

#[tokio::test]
async fn signature_over_different_body_is_unauthorized() {
    let client = client(true).await;
    let token = signature::sign(r#"{"workspaceId":999}"#, SIGNING_KEY).expect("sign");

    let response = client
        .post("/api/v1/import/callback")
        .header(ContentType::JSON)
        .header(Header::new(SIGNATURE_HEADER, token))
        .body(trigger_body())
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::Unauthorized);
}

#[tokio::test]
async fn unparseable_message_is_a_bad_request() {
    let client = client(false).await;

    let response = client
        .post("/api/v1/import/callback")
        .header(ContentType::JSON)
        .body("not a message")
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::BadRequest);
}

#[tokio::test]
async fn valid_signature_reaches_the_pipeline() {
    let client = client(true).await;
    let body = trigger_body();
    let token = signature::sign(&body, SIGNING_KEY).expect("sign");

    let response = client
        .post("/api/v1/import/callback")
        .header(ContentType::JSON)
        .header(Header::new(SIGNATURE_HEADER, token))
        .body(body)
        .dispatch()
        .await;

    // The lazy KV store refuses the credential lookup, so the pipeline
    // fails after authentication: an internal error, not a 401.
    assert_eq!(response.status(), Status::InternalServerError);
}
