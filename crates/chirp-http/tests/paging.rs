//! Pagination driver tests against a mock API.

mod common;

use chirp_core::{Error, Id, UserRef};
use chirp_http::{SearchOptions, SearchParams, TimelineParams};
use futures_util::StreamExt;
use serde_json::json;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{app_client, collect, id_strs, query_value};

// ============================================================================
// Max-id paging
// ============================================================================

#[tokio::test]
async fn search_pages_backwards_from_lowest_id() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/1.1/search/tweets.json"))
        .and(query_param("q", "rust"))
        .and(query_param_is_missing("max_id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "statuses": [{"id_str": "30"}, {"id_str": "29"}, {"id_str": "28"}],
            "search_metadata": {}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/1.1/search/tweets.json"))
        .and(query_param("max_id", "27"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "statuses": [{"id_str": "27"}, {"id_str": "26"}],
            "search_metadata": {}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/1.1/search/tweets.json"))
        .and(query_param("max_id", "25"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "statuses": [],
            "search_metadata": {}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _) = app_client(&server).await;
    let records = collect(client.search("rust", SearchOptions::default()).unwrap()).await;

    assert_eq!(id_strs(&records), vec!["30", "29", "28", "27", "26"]);
}

#[tokio::test]
async fn search_passes_since_id_through_and_honours_max_pages() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/1.1/search/tweets.json"))
        .and(query_param("since_id", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "statuses": [{"id_str": "10"}, {"id_str": "9"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _) = app_client(&server).await;
    let options = SearchOptions {
        since_id: Some(Id::from(5)),
        max_pages: Some(1),
        ..Default::default()
    };
    let records = collect(client.search("rust", options).unwrap()).await;

    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn timeline_pages_over_bare_lists() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/1.1/statuses/user_timeline.json"))
        .and(query_param("screen_name", "jack"))
        .and(query_param_is_missing("max_id"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"id_str": "20"}, {"id_str": "15"}])),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/1.1/statuses/user_timeline.json"))
        .and(query_param("max_id", "14"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let (client, _) = app_client(&server).await;
    let user = UserRef::parse("@jack").unwrap();
    let records = collect(client.timeline(&user, Default::default()).unwrap()).await;

    assert_eq!(id_strs(&records), vec!["20", "15"]);
}

// ============================================================================
// Cursor paging
// ============================================================================

#[tokio::test]
async fn cursor_stops_at_zero_without_another_request() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/1.1/followers/ids.json"))
        .and(query_param("cursor", "-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ids": ["1", "2"],
            "next_cursor": 1374004777531007833_i64,
            "previous_cursor": 0
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/1.1/followers/ids.json"))
        .and(query_param("cursor", "1374004777531007833"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ids": ["3"],
            "next_cursor": 0,
            "previous_cursor": -1
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _) = app_client(&server).await;
    let user = UserRef::parse("12").unwrap();
    let ids = collect(client.follower_ids(&user).unwrap()).await;

    assert_eq!(ids, vec![json!("1"), json!("2"), json!("3")]);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn follower_ids_treat_404_as_empty() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/1.1/friends/ids.json"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "errors": [{"code": 34, "message": "Sorry, that page does not exist."}]
        })))
        .mount(&server)
        .await;

    let (client, _) = app_client(&server).await;
    let user = UserRef::parse("@gone").unwrap();
    let ids = collect(client.friend_ids(&user).unwrap()).await;

    assert!(ids.is_empty());
}

#[tokio::test]
async fn list_members_propagate_404() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/1.1/lists/members.json"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "errors": [{"code": 34, "message": "Sorry, that page does not exist."}]
        })))
        .mount(&server)
        .await;

    let (client, _) = app_client(&server).await;
    let mut members = client.list_members(&Id::from(99)).unwrap();

    let err = members.next().await.unwrap().unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert!(err.to_string().contains("does not exist"));
    assert!(members.next().await.is_none());
}

// ============================================================================
// Token paging
// ============================================================================

#[tokio::test]
async fn token_paging_stops_only_when_token_is_absent() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/2/tweets/search/recent"))
        .and(query_param_is_missing("next_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "3"}],
            "meta": {"result_count": 1, "next_token": "t1"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    // An empty token is still a token.
    Mock::given(method("GET"))
        .and(path("/2/tweets/search/recent"))
        .and(query_param("next_token", "t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "2"}],
            "meta": {"result_count": 1, "next_token": ""}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/2/tweets/search/recent"))
        .and(query_param("next_token", ""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "1"}],
            "meta": {"result_count": 1}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _) = app_client(&server).await;
    let pages = collect(client.search_recent("rust", SearchParams::default()).unwrap()).await;

    let ids: Vec<&str> = pages
        .iter()
        .map(|p| p["data"][0]["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["3", "2", "1"]);
    // Pages are yielded whole.
    assert_eq!(pages[0]["meta"]["next_token"], "t1");
}

#[tokio::test]
async fn pages_without_data_are_skipped_but_followed() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/2/lists/7/members"))
        .and(query_param_is_missing("pagination_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "meta": {"result_count": 0, "next_token": "p2"}
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/2/lists/7/members"))
        .and(query_param("pagination_token", "p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "11", "username": "a"}],
            "meta": {"result_count": 1}
        })))
        .mount(&server)
        .await;

    let (client, _) = app_client(&server).await;
    let pages = collect(client.list_members_v2(&Id::from(7)).unwrap()).await;

    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0]["data"][0]["username"], "a");
}

#[tokio::test]
async fn username_is_resolved_before_timeline_paging() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/2/users/by"))
        .and(query_param("usernames", "jack"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "12", "username": "jack", "name": "jack"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/2/users/12/tweets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "100", "text": "just setting up my twttr", "author_id": "12"}],
            "meta": {"result_count": 1}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _) = app_client(&server).await;
    let user = UserRef::parse("jack").unwrap();
    let pages = collect(client.timeline_v2(&user, TimelineParams::default()).unwrap()).await;

    assert_eq!(pages.len(), 1);
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests[0].url.path(), "/2/users/by");
    assert_eq!(requests[1].url.path(), "/2/users/12/tweets");
    assert!(query_value(&requests[1], "expansions").is_some());
}

#[tokio::test]
async fn unknown_username_is_an_input_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/2/users/by"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [{"value": "nobody_here", "detail": "Could not find user"}]
        })))
        .mount(&server)
        .await;

    let (client, _) = app_client(&server).await;
    let user = UserRef::parse("nobody_here").unwrap();
    let err = client.user_id(&user).await.unwrap_err();

    assert!(matches!(err, Error::InvalidInput(_)));
}

// ============================================================================
// Batched lookup
// ============================================================================

#[tokio::test]
async fn lookup_batches_ids_by_hundred() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/2/tweets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "1", "text": "one"}]
        })))
        .expect(3)
        .mount(&server)
        .await;

    let (client, _) = app_client(&server).await;
    let ids: Vec<Id> = (1..=250u64).map(Id::from).collect();
    let pages = collect(client.tweet_lookup(ids).unwrap()).await;

    assert_eq!(pages.len(), 3);
    let records: usize = pages
        .iter()
        .map(|p| p["data"].as_array().map_or(0, Vec::len))
        .sum();
    assert!(records <= 250);

    let sizes: Vec<usize> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| query_value(r, "ids").unwrap().split(',').count())
        .collect();
    assert_eq!(sizes, vec![100, 100, 50]);
}

#[tokio::test]
async fn hydrate_sorts_each_batch_by_id() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/1.1/statuses/lookup.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id_str": "300", "id": 300},
            {"id_str": "100", "id": 100},
            {"id_str": "200", "id": 200}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _) = app_client(&server).await;
    let ids = vec![Id::from(100), Id::from(200), Id::from(300), Id::from(400)];
    let records = collect(client.hydrate(ids).unwrap()).await;

    assert_eq!(id_strs(&records), vec!["100", "200", "300"]);
}

#[tokio::test]
async fn user_lookup_rejects_mixed_references() {
    let server = MockServer::start().await;
    let (client, _) = app_client(&server).await;

    let users = vec![
        UserRef::parse("12").unwrap(),
        UserRef::parse("@jack").unwrap(),
    ];
    assert!(matches!(
        client.user_lookup(users),
        Err(Error::InvalidInput(_))
    ));
}
