#![cfg(feature = "inmem-store")]

use std::sync::Arc;

use litreview::models::{NewUser, User};
use litreview::repo::{inmem::InMemRepo, FollowRepo, RepoError, UserRepo};

async fn user(r: &InMemRepo, name: &str) -> User {
    r.create_user(NewUser { username: name.into() }).await.unwrap()
}

fn names(users: &[User]) -> Vec<&str> {
    users.iter().map(|u| u.username.as_str()).collect()
}

#[tokio::test]
async fn follow_and_list_both_directions() {
    let r = InMemRepo::ephemeral();
    let a = user(&r, "alice").await;
    let b = user(&r, "bob").await;
    let c = user(&r, "carol").await;

    let edge = r.add_follow(a.id, "bob").await.unwrap();
    assert_eq!((edge.user_id, edge.followed_user_id), (a.id, b.id));
    r.add_follow(a.id, "carol").await.unwrap();
    r.add_follow(c.id, "bob").await.unwrap();

    assert_eq!(names(&r.list_following(a.id).await.unwrap()), ["bob", "carol"]);
    assert_eq!(names(&r.list_followers(b.id).await.unwrap()), ["alice", "carol"]);
    assert!(r.list_followers(a.id).await.unwrap().is_empty());
    assert!(r.list_following(b.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn following_twice_is_rejected() {
    let r = InMemRepo::ephemeral();
    let a = user(&r, "alice").await;
    user(&r, "bob").await;

    r.add_follow(a.id, "bob").await.unwrap();
    let err = r.add_follow(a.id, "bob").await.unwrap_err();
    assert!(matches!(err, RepoError::DuplicateEdge));
    assert_eq!(r.list_following(a.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn follow_unknown_username() {
    let r = InMemRepo::ephemeral();
    let a = user(&r, "alice").await;
    let err = r.add_follow(a.id, "nobody").await.unwrap_err();
    assert!(matches!(err, RepoError::NotFound));
    assert!(r.list_following(a.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn unfollow_removes_only_that_edge() {
    let r = InMemRepo::ephemeral();
    let a = user(&r, "alice").await;
    user(&r, "bob").await;
    user(&r, "carol").await;
    r.add_follow(a.id, "bob").await.unwrap();
    r.add_follow(a.id, "carol").await.unwrap();

    r.remove_follow(a.id, "bob").await.unwrap();
    assert_eq!(names(&r.list_following(a.id).await.unwrap()), ["carol"]);

    // can follow again afterwards
    r.add_follow(a.id, "bob").await.unwrap();
    assert_eq!(names(&r.list_following(a.id).await.unwrap()), ["carol", "bob"]);
}

#[tokio::test]
async fn unfollow_not_followed_leaves_state() {
    let r = InMemRepo::ephemeral();
    let a = user(&r, "alice").await;
    let b = user(&r, "bob").await;
    user(&r, "carol").await;
    r.add_follow(b.id, "carol").await.unwrap();

    let err = r.remove_follow(a.id, "carol").await.unwrap_err();
    assert!(matches!(err, RepoError::NotFound));
    let err = r.remove_follow(a.id, "nobody").await.unwrap_err();
    assert!(matches!(err, RepoError::NotFound));
    assert_eq!(names(&r.list_following(b.id).await.unwrap()), ["carol"]);
}

#[tokio::test]
async fn self_follow_is_allowed_once() {
    let r = InMemRepo::ephemeral();
    let a = user(&r, "alice").await;
    r.add_follow(a.id, "alice").await.unwrap();
    assert!(matches!(r.add_follow(a.id, "alice").await, Err(RepoError::DuplicateEdge)));
    assert_eq!(names(&r.list_followers(a.id).await.unwrap()), ["alice"]);
}

#[tokio::test]
async fn listing_unknown_user_is_not_found() {
    let r = InMemRepo::ephemeral();
    assert!(matches!(r.list_following(7).await, Err(RepoError::NotFound)));
    assert!(matches!(r.list_followers(7).await, Err(RepoError::NotFound)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicate_follows_store_one_edge() {
    let r = Arc::new(InMemRepo::ephemeral());
    let a = user(&r, "alice").await;
    user(&r, "bob").await;

    let follower = a.id;
    let mut handles = Vec::new();
    for _ in 0..16 {
        let r = r.clone();
        handles.push(tokio::spawn(async move { r.add_follow(follower, "bob").await }));
    }
    let mut ok = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => ok += 1,
            Err(RepoError::DuplicateEdge) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(r.list_following(a.id).await.unwrap().len(), 1);
}
