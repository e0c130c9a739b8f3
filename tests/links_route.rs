use linkdock_api::import::normalize::NewLink;
use linkdock_api::import::sink::LinkSink;
use linkdock_api::models::{DataResponse, Link, Tag};
use linkdock_api::routes::links::{list_workspace_links, list_workspace_tags};
use linkdock_api::test_support::{TestDatabase, TestFixtures, TestKv, TestRocketBuilder};
use rocket::http::Status;
use rocket::routes;

#[tokio::test]
async fn list_workspace_links_returns_imported_links() {
    let db = TestDatabase::new().await.expect("provision test database");
    let test_kv = TestKv::new().await.expect("provision test kv");
    let fixtures = TestFixtures::new(db.pool());

    let (workspace_id, user_id) = fixtures
        .workspace_with_owner("acme", "owner@acme.test")
        .await
        .expect("seed workspace");
    fixtures
        .insert_domain(workspace_id, "d.co")
        .await
        .expect("seed domain");

    let sink = LinkSink::new(db.pool_clone(), test_kv.store());
    sink.persist_batch(&[NewLink {
        workspace_id,
        user_id,
        domain: "d.co".to_string(),
        key: "abc".to_string(),
        url: "https://example.com/page".to_string(),
        title: Some("Example".to_string()),
        archived: false,
        created_at: None,
        tag_id: None,
    }])
    .await
    .expect("seed link");

    fixtures
        .insert_tag(workspace_id, "marketing", "blue")
        .await
        .expect("seed tag");

    let client = TestRocketBuilder::new()
        .manage_pg_pool(db.pool_clone())
        .mount_api_routes(routes![list_workspace_links, list_workspace_tags])
        .async_client()
        .await;

    let response = client.get("/api/v1/workspaces/acme/links").dispatch().await;
    assert_eq!(response.status(), Status::Ok);

    let payload: DataResponse<Vec<Link>> = response
        .into_json()
        .await
        .expect("payload should deserialize");

    assert_eq!(payload.data.len(), 1);
    let link = &payload.data[0];
    assert_eq!(link.domain, "d.co");
    assert_eq!(link.key, "abc");
    assert_eq!(link.url, "https://example.com/page");

    let tags_response = client.get("/api/v1/workspaces/acme/tags").dispatch().await;
    assert_eq!(tags_response.status(), Status::Ok);
    let tags: DataResponse<Vec<Tag>> = tags_response
        .into_json()
        .await
        .expect("tags payload should deserialize");
    assert_eq!(tags.data.len(), 1);
    assert_eq!(tags.data[0].name, "marketing");

    let missing = client
        .get("/api/v1/workspaces/nope/links")
        .dispatch()
        .await;
    assert_eq!(missing.status(), Status::NotFound);

    db.close().await;
}
