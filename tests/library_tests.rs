//! Liked-track enumeration against the in-process fake

mod common;

use axum::http::StatusCode;
use common::{body_json, get, FakeSpotify, TestApp};
use futures::{StreamExt, TryStreamExt};
use sputilities::error::AppError;
use sputilities::services::library::{collect_liked_tracks, liked_pages, liked_tracks};
use sputilities::services::AuthContext;
use uuid::Uuid;

fn ctx() -> AuthContext {
    AuthContext {
        session_id: Uuid::new_v4(),
        access_token: "T1".to_string(),
    }
}

#[tokio::test]
async fn test_enumeration_stops_at_empty_page() {
    let spotify = FakeSpotify::with_liked(130);

    let collection = collect_liked_tracks(&spotify, &ctx()).await.unwrap();

    assert_eq!(collection.tracks.len(), 130);
    assert_eq!(collection.pages_requested, 4);
    assert_eq!(collection.total, Some(130));
    assert_eq!(spotify.page_offsets(), vec![0, 50, 100, 130]);
}

#[tokio::test]
async fn test_track_count_is_sum_of_pages() {
    for liked in [0usize, 1, 49, 50, 51, 100, 249] {
        let spotify = FakeSpotify::with_liked(liked);
        let collection = collect_liked_tracks(&spotify, &ctx()).await.unwrap();

        assert_eq!(collection.tracks.len(), liked, "liked = {}", liked);
        // every full or partial page plus the terminating empty one
        assert_eq!(
            collection.pages_requested,
            liked.div_ceil(50) + 1,
            "liked = {}",
            liked
        );
    }
}

#[tokio::test]
async fn test_tracks_keep_library_order() {
    let spotify = FakeSpotify::with_liked(75);

    let uris: Vec<String> = liked_tracks(&spotify, &ctx())
        .map_ok(|track| track.uri)
        .try_collect()
        .await
        .unwrap();

    let expected: Vec<String> = (0..75).map(common::track_uri).collect();
    assert_eq!(uris, expected);
}

#[tokio::test]
async fn test_unavailable_items_still_advance_offset() {
    let spotify = FakeSpotify {
        unavailable: vec![3, 60],
        ..FakeSpotify::with_liked(80)
    };

    let collection = collect_liked_tracks(&spotify, &ctx()).await.unwrap();

    assert_eq!(collection.tracks.len(), 78);
    assert_eq!(spotify.page_offsets(), vec![0, 50, 80]);
}

#[tokio::test]
async fn test_short_pages_advance_by_items_received() {
    // provider serves 20 items per page despite being asked for 50
    let spotify = FakeSpotify {
        page_cap: Some(20),
        ..FakeSpotify::with_liked(70)
    };

    let collection = collect_liked_tracks(&spotify, &ctx()).await.unwrap();

    assert_eq!(collection.tracks.len(), 70);
    assert_eq!(collection.pages_requested, 5);
    assert_eq!(spotify.page_offsets(), vec![0, 20, 40, 60, 70]);

    let uris: Vec<String> = collection.tracks.into_iter().map(|t| t.uri).collect();
    let expected: Vec<String> = (0..70).map(common::track_uri).collect();
    assert_eq!(uris, expected);
}

#[tokio::test]
async fn test_page_failure_ends_stream_with_error() {
    let spotify = FakeSpotify {
        fail_page_call: Some(2),
        ..FakeSpotify::with_liked(130)
    };
    let ctx = ctx();

    let pages: Vec<_> = liked_pages(&spotify, &ctx).collect().await;

    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].as_ref().unwrap().received, 50);
    assert!(matches!(
        pages[1],
        Err(AppError::ExternalApi { status: 503, .. })
    ));
    assert_eq!(spotify.page_offsets(), vec![0, 50]);
}

#[tokio::test]
async fn test_enumeration_uses_callers_token() {
    let spotify = FakeSpotify::with_liked(10);

    collect_liked_tracks(&spotify, &ctx()).await.unwrap();

    let tokens = spotify.tokens_seen.lock().unwrap().clone();
    assert_eq!(tokens, vec!["T1".to_string(), "T1".to_string()]);
}

#[tokio::test]
async fn test_liked_songs_single_page_endpoint() {
    let app = TestApp::new(FakeSpotify::with_liked(120));
    let (_, token) = app.session("T1").await;

    let response = app
        .send(get("/api/v1/liked-songs?limit=50&offset=100", Some(&token)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_json(response).await;

    assert_eq!(page["items"].as_array().unwrap().len(), 20);
    assert_eq!(page["total"], 120);
    assert_eq!(page["offset"], 100);
    assert!(page["next_offset"].is_null());

    let response = app
        .send(get("/api/v1/liked-songs", Some(&token)))
        .await;
    let page = body_json(response).await;
    assert_eq!(page["limit"], 50);
    assert_eq!(page["next_offset"], 50);
}

#[tokio::test]
async fn test_profile_endpoint() {
    let app = TestApp::new(FakeSpotify::default());
    let (_, token) = app.session("T1").await;

    let response = app.send(get("/api/v1/users/info", Some(&token))).await;

    assert_eq!(response.status(), StatusCode::OK);
    let profile = body_json(response).await;
    assert_eq!(profile["id"], "user-1");
    assert_eq!(profile["display_name"], "Test User");
}

#[tokio::test]
async fn test_track_search_endpoint() {
    let app = TestApp::new(FakeSpotify::default());
    let (_, token) = app.session("T1").await;

    let response = app
        .send(get("/api/v1/tracks/search?q=test&limit=500", Some(&token)))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["tracks"].as_array().unwrap().len(), 3);
    assert_eq!(body["tracks"][0]["uri"], common::track_uri(0));
    assert_eq!(body["total"], 3);
    assert_eq!(body["limit"], 50);
    assert!(body["artists"].as_array().unwrap().is_empty());

    let searches = app.spotify.searches.lock().unwrap().clone();
    assert_eq!(searches, vec![("test".to_string(), "track".to_string(), 50, 0)]);
}

#[tokio::test]
async fn test_artist_search_and_legacy_route() {
    let app = TestApp::new(FakeSpotify::default());
    let (_, token) = app.session("T1").await;

    let response = app
        .send(get("/api/v1/tracks/search?q=JVKE&type=artist", Some(&token)))
        .await;
    let body = body_json(response).await;
    assert_eq!(body["artists"][0]["name"], "JVKE");
    assert_eq!(body["total"], 1);

    let response = app.send(get("/api/v1/artist?q=JVKE", Some(&token))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["artists"][0]["id"], "artist-1");

    let searches = app.spotify.searches.lock().unwrap().clone();
    assert_eq!(searches[1], ("JVKE".to_string(), "artist".to_string(), 1, 0));
}

#[tokio::test]
async fn test_empty_search_query_rejected() {
    let app = TestApp::new(FakeSpotify::default());
    let (_, token) = app.session("T1").await;

    let response = app
        .send(get("/api/v1/tracks/search?q=%20", Some(&token)))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["kind"], "validation_error");
    assert!(app.spotify.searches.lock().unwrap().is_empty());
}
