#![cfg(feature = "inmem-store")]

use actix_web::{test, web, App};
use litreview::auth::JwtSecret;
use litreview::repo::inmem::InMemRepo;
use litreview::routes::{config, AppState};
use serde_json::{json, Value};
use std::sync::Arc;

const SECRET: &str = "test-secret-must-be-32-bytes-long!!";

fn state() -> (web::Data<AppState>, web::Data<JwtSecret>) {
    (
        web::Data::new(AppState { repo: Arc::new(InMemRepo::ephemeral()) }),
        web::Data::new(JwtSecret(SECRET.into())),
    )
}

fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {token}"))
}

#[actix_web::test]
async fn feed_follow_and_posts_flow() {
    let (data, secret) = state();
    let app = test::init_service(App::new().app_data(data).app_data(secret).configure(config)).await;

    // register two users
    let mut tokens = Vec::new();
    for name in ["alice", "bob"] {
        let req = test::TestRequest::post().uri("/api/v1/users").set_json(json!({"username": name})).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);
        let v: Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
        assert_eq!(v["user"]["username"], name);
        tokens.push(v["token"].as_str().unwrap().to_string());
    }
    let (alice, bob) = (tokens[0].clone(), tokens[1].clone());

    // duplicate username
    let req = test::TestRequest::post().uri("/api/v1/users").set_json(json!({"username": "alice"})).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 409);

    // alice asks for a review
    let req = test::TestRequest::post().uri("/api/v1/tickets")
        .insert_header(bearer(&alice))
        .set_json(json!({"title": "Dune", "description": ""}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let ticket: Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let ticket_id = ticket["id"].as_i64().unwrap();

    // bob replies without following alice
    let req = test::TestRequest::post().uri("/api/v1/reviews")
        .insert_header(bearer(&bob))
        .set_json(json!({"target": {"existing": ticket_id}, "review": {"rating": 5, "headline": "Spice"}}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);

    // out-of-range rating
    let req = test::TestRequest::post().uri("/api/v1/reviews")
        .insert_header(bearer(&bob))
        .set_json(json!({"target": {"existing": ticket_id}, "review": {"rating": 6, "headline": "Too much"}}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 422);

    // alice sees her ticket and bob's reply
    let req = test::TestRequest::get().uri("/api/v1/feed").insert_header(bearer(&alice)).to_request();
    let feed: Value = serde_json::from_slice(&test::read_body(test::call_service(&app, req).await).await).unwrap();
    let kinds: Vec<&str> = feed.as_array().unwrap().iter().map(|i| i["content_type"].as_str().unwrap()).collect();
    assert_eq!(kinds.len(), 2);
    assert!(kinds.contains(&"TICKET") && kinds.contains(&"REVIEW"));

    // bob follows alice, twice
    let req = test::TestRequest::post().uri("/api/v1/follows").insert_header(bearer(&bob)).set_json(json!({"username": "alice"})).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);
    let req = test::TestRequest::post().uri("/api/v1/follows").insert_header(bearer(&bob)).set_json(json!({"username": "alice"})).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 409);
    let req = test::TestRequest::post().uri("/api/v1/follows").insert_header(bearer(&bob)).set_json(json!({"username": "zed"})).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = test::TestRequest::get().uri("/api/v1/followers").insert_header(bearer(&alice)).to_request();
    let followers: Value = serde_json::from_slice(&test::read_body(test::call_service(&app, req).await).await).unwrap();
    assert_eq!(followers[0]["username"], "bob");

    // alice deletes her ticket through the posts view; bob's reply goes too
    let req = test::TestRequest::delete().uri(&format!("/api/v1/posts/TICKET{ticket_id}")).insert_header(bearer(&alice)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);
    let req = test::TestRequest::get().uri("/api/v1/posts").insert_header(bearer(&bob)).to_request();
    let posts: Value = serde_json::from_slice(&test::read_body(test::call_service(&app, req).await).await).unwrap();
    assert!(posts.as_array().unwrap().is_empty());

    // unfollow, then unfollow again
    let req = test::TestRequest::delete().uri("/api/v1/follows/alice").insert_header(bearer(&bob)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);
    let req = test::TestRequest::delete().uri("/api/v1/follows/alice").insert_header(bearer(&bob)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
async fn combined_create_and_ownership() {
    let (data, secret) = state();
    let app = test::init_service(App::new().app_data(data).app_data(secret).configure(config)).await;

    let mut tokens = Vec::new();
    for name in ["alice", "mallory"] {
        let req = test::TestRequest::post().uri("/api/v1/users").set_json(json!({"username": name})).to_request();
        let v: Value = serde_json::from_slice(&test::read_body(test::call_service(&app, req).await).await).unwrap();
        tokens.push(v["token"].as_str().unwrap().to_string());
    }
    let (alice, mallory) = (tokens[0].clone(), tokens[1].clone());

    let req = test::TestRequest::post().uri("/api/v1/reviews")
        .insert_header(bearer(&alice))
        .set_json(json!({
            "target": {"new_ticket": {"title": "Emma", "description": "Austen"}},
            "review": {"rating": 4, "headline": "Witty", "body": "Loved it"}
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let review: Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let ticket_id = review["ticket_id"].as_i64().unwrap();
    let review_id = review["id"].as_i64().unwrap();

    let req = test::TestRequest::get().uri(&format!("/api/v1/tickets/{ticket_id}/reviews")).insert_header(bearer(&mallory)).to_request();
    let reviews: Value = serde_json::from_slice(&test::read_body(test::call_service(&app, req).await).await).unwrap();
    assert_eq!(reviews.as_array().unwrap().len(), 1);

    // mallory cannot touch alice's posts
    let req = test::TestRequest::patch().uri(&format!("/api/v1/tickets/{ticket_id}"))
        .insert_header(bearer(&mallory)).set_json(json!({"title": "Pwned"})).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
    let req = test::TestRequest::delete().uri(&format!("/api/v1/reviews/{review_id}")).insert_header(bearer(&mallory)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    // alice can
    let req = test::TestRequest::patch().uri(&format!("/api/v1/reviews/{review_id}"))
        .insert_header(bearer(&alice)).set_json(json!({"rating": 5})).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let updated: Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(updated["rating"], 5);
    assert_eq!(updated["headline"], "Witty");

    // malformed post reference
    let req = test::TestRequest::delete().uri("/api/v1/posts/BOOK1").insert_header(bearer(&alice)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 422);

    // no token
    let req = test::TestRequest::get().uri("/api/v1/feed").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
}

#[actix_web::test]
async fn follow_and_unfollow_trim_the_same_way() {
    let (data, secret) = state();
    let app = test::init_service(App::new().app_data(data).app_data(secret).configure(config)).await;

    let mut tokens = Vec::new();
    for name in ["alice", "bob"] {
        let req = test::TestRequest::post().uri("/api/v1/users").set_json(json!({"username": name})).to_request();
        let v: Value = serde_json::from_slice(&test::read_body(test::call_service(&app, req).await).await).unwrap();
        tokens.push(v["token"].as_str().unwrap().to_string());
    }
    let alice = tokens[0].clone();

    let req = test::TestRequest::post().uri("/api/v1/follows").insert_header(bearer(&alice)).set_json(json!({"username": " bob"})).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);
    let req = test::TestRequest::delete().uri("/api/v1/follows/%20bob").insert_header(bearer(&alice)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);

    let req = test::TestRequest::get().uri("/api/v1/follows").insert_header(bearer(&alice)).to_request();
    let following: Value = serde_json::from_slice(&test::read_body(test::call_service(&app, req).await).await).unwrap();
    assert!(following.as_array().unwrap().is_empty());
}
