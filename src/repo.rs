use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;

use crate::models::*;
use crate::visibility::author_set;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("already following this user")] DuplicateEdge,
    #[error("conflict")] Conflict,
    #[error("validation failed: {0}")] Validation(String),
    #[error("integrity violation: {0}")] Integrity(String),
    #[error("internal error: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    async fn find_user_by_username(&self, username: &str) -> RepoResult<User>;
}

#[async_trait]
pub trait FollowRepo: Send + Sync {
    /// Fails with `NotFound` when the username does not resolve and with
    /// `DuplicateEdge` when the edge already exists.
    async fn add_follow(&self, follower: Id, followed_username: &str) -> RepoResult<FollowEdge>;
    async fn remove_follow(&self, follower: Id, followed_username: &str) -> RepoResult<()>;
    /// Users `user` follows, in edge creation order.
    async fn list_following(&self, user: Id) -> RepoResult<Vec<User>>;
    /// Users following `user`, in edge creation order.
    async fn list_followers(&self, user: Id) -> RepoResult<Vec<User>>;
}

#[async_trait]
pub trait TicketRepo: Send + Sync {
    async fn create_ticket(&self, user: Id, new: NewTicket) -> RepoResult<Ticket>;
    async fn get_ticket(&self, id: Id) -> RepoResult<Ticket>;
    async fn update_ticket(&self, user: Id, id: Id, upd: UpdateTicket) -> RepoResult<Ticket>;
    /// Removes the ticket and every review attached to it.
    async fn delete_ticket(&self, user: Id, id: Id) -> RepoResult<Ticket>;
    async fn tickets_by_authors(&self, authors: &[Id]) -> RepoResult<Vec<Ticket>>;
}

#[async_trait]
pub trait ReviewRepo: Send + Sync {
    /// Single write path for reviews. With `ReviewTarget::NewTicket` the
    /// ticket and the review are stored together or not at all.
    async fn create_review(&self, user: Id, target: ReviewTarget, new: NewReview) -> RepoResult<Review>;
    async fn get_review(&self, id: Id) -> RepoResult<Review>;
    async fn update_review(&self, user: Id, id: Id, upd: UpdateReview) -> RepoResult<Review>;
    async fn delete_review(&self, user: Id, id: Id) -> RepoResult<Review>;
    async fn reviews_by_authors(&self, authors: &[Id]) -> RepoResult<Vec<Review>>;
    /// Reviews attached to any ticket owned by `owner`, whoever wrote them.
    async fn reviews_on_tickets_of(&self, owner: Id) -> RepoResult<Vec<Review>>;
    async fn reviews_for_ticket(&self, ticket: Id) -> RepoResult<Vec<Review>>;

    async fn create_review_for_ticket(&self, ticket: Id, user: Id, new: NewReview) -> RepoResult<Review> {
        self.create_review(user, ReviewTarget::Existing(ticket), new).await
    }

    async fn create_ticket_with_review(&self, user: Id, ticket: NewTicket, review: NewReview) -> RepoResult<Review> {
        self.create_review(user, ReviewTarget::NewTicket(ticket), review).await
    }
}

/// Tickets and reviews taken from one consistent view of the store, each
/// list ordered by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibleContent {
    pub tickets: Vec<Ticket>,
    pub reviews: Vec<Review>,
}

#[async_trait]
pub trait VisibilityRepo: Send + Sync {
    /// Content of `user` and everyone `user` follows, plus every review on
    /// a ticket `user` owns. Follow set and content are read together.
    async fn visible_content(&self, user: Id) -> RepoResult<VisibleContent>;
    /// Content written by `user`.
    async fn own_content(&self, user: Id) -> RepoResult<VisibleContent>;
}

pub trait Repo: UserRepo + FollowRepo + TicketRepo + ReviewRepo + VisibilityRepo {}

impl<T> Repo for T where T: UserRepo + FollowRepo + TicketRepo + ReviewRepo + VisibilityRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::path::{Path, PathBuf};
    use std::sync::{RwLockReadGuard, RwLockWriteGuard};
    use tracing::{info, warn};

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        users:   BTreeMap<Id, User>,
        tickets: BTreeMap<Id, Ticket>,
        reviews: BTreeMap<Id, Review>,
        follows: Vec<FollowEdge>, // creation order
        next_id: Id,
    }

    impl State {
        fn next_id(&mut self) -> Id {
            self.next_id += 1;
            self.next_id
        }

        fn user_by_name(&self, username: &str) -> Option<&User> {
            self.users.values().find(|u| u.username == username)
        }

        fn ensure_user(&self, id: Id) -> RepoResult<()> {
            if self.users.contains_key(&id) { Ok(()) } else { Err(RepoError::Integrity(format!("unknown user {id}"))) }
        }

        // one pass over each map, so every item appears once, in id order
        fn content_of(&self, authors: &[Id], replies_to: Option<Id>) -> VisibleContent {
            let owns_ticket = |r: &Review| {
                replies_to.is_some_and(|owner| self.tickets.get(&r.ticket_id).is_some_and(|t| t.user_id == owner))
            };
            VisibleContent {
                tickets: self.tickets.values().filter(|t| authors.contains(&t.user_id)).cloned().collect(),
                reviews: self.reviews.values()
                    .filter(|r| authors.contains(&r.user_id) || owns_ticket(*r))
                    .cloned()
                    .collect(),
            }
        }
    }

    /// Lock-guarded store with an optional JSON snapshot on disk.
    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Option<Arc<PathBuf>>,
    }

    impl InMemRepo {
        /// Store that never touches disk.
        pub fn ephemeral() -> Self {
            Self { state: Arc::new(RwLock::new(State::default())), snapshot_path: None }
        }

        /// Store backed by the snapshot at `path`, loaded now and rewritten
        /// after every mutation. A missing file starts an empty store; a file
        /// that cannot be read or parsed is an error and is left untouched.
        pub fn with_snapshot(path: impl Into<PathBuf>) -> RepoResult<Self> {
            let path = path.into();
            let state = Self::load_state_from(&path)?;
            Ok(Self { state: Arc::new(RwLock::new(state)), snapshot_path: Some(Arc::new(path)) })
        }

        fn load_state_from(path: &Path) -> RepoResult<State> {
            let bytes = match std::fs::read(path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    info!(path = %path.display(), "no snapshot, starting empty");
                    return Ok(State::default());
                }
                Err(e) => {
                    return Err(RepoError::Internal(format!("cannot read snapshot {}: {e}", path.display())));
                }
            };
            let state = serde_json::from_slice::<State>(&bytes)
                .map_err(|e| RepoError::Internal(format!("cannot parse snapshot {}: {e}", path.display())))?;
            info!(path = %path.display(), "loaded snapshot");
            Ok(state)
        }

        /// Called with the write guard still held so snapshots are written
        /// one at a time and in commit order.
        fn persist(&self, state: &State) {
            let Some(path) = self.snapshot_path.as_deref() else { return };
            if let Err(e) = write_snapshot(path, state) {
                warn!(path = %path.display(), error = %e, "failed to write snapshot");
            }
        }

        fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
            self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }

        fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
            self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self { Self::ephemeral() }
    }

    // Written beside the target and renamed over it, so a reader never sees
    // a half-written file.
    fn write_snapshot(path: &Path, state: &State) -> std::io::Result<()> {
        let bytes = serde_json::to_vec_pretty(state)?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp = path.with_file_name(tmp_name);
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            new.validate()?;
            let mut s = self.write()?;
            if s.user_by_name(&new.username).is_some() {
                return Err(RepoError::Conflict);
            }
            let id = s.next_id();
            let user = User { id, username: new.username, created_at: Utc::now() };
            s.users.insert(id, user.clone());
            self.persist(&s);
            drop(s);
            info!(user_id = id, username = %user.username, "user created");
            Ok(user)
        }
        async fn get_user(&self, id: Id) -> RepoResult<User> {
            self.read()?.users.get(&id).cloned().ok_or(RepoError::NotFound)
        }
        async fn find_user_by_username(&self, username: &str) -> RepoResult<User> {
            self.read()?.user_by_name(username).cloned().ok_or(RepoError::NotFound)
        }
    }

    #[async_trait]
    impl FollowRepo for InMemRepo {
        async fn add_follow(&self, follower: Id, followed_username: &str) -> RepoResult<FollowEdge> {
            // lookup, uniqueness check and insert share one write section
            let mut s = self.write()?;
            s.ensure_user(follower)?;
            let followed = s.user_by_name(followed_username).map(|u| u.id).ok_or(RepoError::NotFound)?;
            if s.follows.iter().any(|e| e.user_id == follower && e.followed_user_id == followed) {
                warn!(follower, followed, "duplicate follow rejected");
                return Err(RepoError::DuplicateEdge);
            }
            let edge = FollowEdge { user_id: follower, followed_user_id: followed, created_at: Utc::now() };
            s.follows.push(edge.clone());
            self.persist(&s);
            drop(s);
            info!(follower, followed, "follow added");
            Ok(edge)
        }
        async fn remove_follow(&self, follower: Id, followed_username: &str) -> RepoResult<()> {
            let mut s = self.write()?;
            let pos = {
                let State { follows, users, .. } = &*s;
                follows.iter().position(|e| {
                    e.user_id == follower
                        && users.get(&e.followed_user_id).is_some_and(|u| u.username == followed_username)
                })
            };
            let Some(pos) = pos else { return Err(RepoError::NotFound) };
            let edge = s.follows.remove(pos);
            self.persist(&s);
            drop(s);
            info!(follower, followed = edge.followed_user_id, "follow removed");
            Ok(())
        }
        async fn list_following(&self, user: Id) -> RepoResult<Vec<User>> {
            let s = self.read()?;
            if !s.users.contains_key(&user) { return Err(RepoError::NotFound); }
            Ok(s.follows.iter()
                .filter(|e| e.user_id == user)
                .filter_map(|e| s.users.get(&e.followed_user_id).cloned())
                .collect())
        }
        async fn list_followers(&self, user: Id) -> RepoResult<Vec<User>> {
            let s = self.read()?;
            if !s.users.contains_key(&user) { return Err(RepoError::NotFound); }
            Ok(s.follows.iter()
                .filter(|e| e.followed_user_id == user)
                .filter_map(|e| s.users.get(&e.user_id).cloned())
                .collect())
        }
    }

    #[async_trait]
    impl TicketRepo for InMemRepo {
        async fn create_ticket(&self, user: Id, new: NewTicket) -> RepoResult<Ticket> {
            new.validate()?;
            let mut s = self.write()?;
            s.ensure_user(user)?;
            let id = s.next_id();
            let ticket = Ticket {
                id,
                title: new.title,
                description: new.description,
                user_id: user,
                image: new.image,
                time_created: Utc::now(),
            };
            s.tickets.insert(id, ticket.clone());
            self.persist(&s);
            drop(s);
            info!(ticket_id = id, user_id = user, "ticket created");
            Ok(ticket)
        }
        async fn get_ticket(&self, id: Id) -> RepoResult<Ticket> {
            self.read()?.tickets.get(&id).cloned().ok_or(RepoError::NotFound)
        }
        async fn update_ticket(&self, user: Id, id: Id, upd: UpdateTicket) -> RepoResult<Ticket> {
            upd.validate()?;
            let mut s = self.write()?;
            let ticket = s.tickets.get_mut(&id)
                .filter(|t| t.user_id == user)
                .ok_or(RepoError::NotFound)?;
            upd.apply(ticket);
            let updated = ticket.clone();
            self.persist(&s);
            drop(s);
            info!(ticket_id = id, user_id = user, "ticket updated");
            Ok(updated)
        }
        async fn delete_ticket(&self, user: Id, id: Id) -> RepoResult<Ticket> {
            let mut s = self.write()?;
            if !s.tickets.get(&id).is_some_and(|t| t.user_id == user) {
                return Err(RepoError::NotFound);
            }
            let ticket = s.tickets.remove(&id).ok_or(RepoError::NotFound)?;
            let before = s.reviews.len();
            s.reviews.retain(|_, r| r.ticket_id != id);
            let cascaded = before - s.reviews.len();
            self.persist(&s);
            drop(s);
            info!(ticket_id = id, user_id = user, cascaded, "ticket deleted");
            Ok(ticket)
        }
        async fn tickets_by_authors(&self, authors: &[Id]) -> RepoResult<Vec<Ticket>> {
            let s = self.read()?;
            Ok(s.tickets.values().filter(|t| authors.contains(&t.user_id)).cloned().collect())
        }
    }

    #[async_trait]
    impl ReviewRepo for InMemRepo {
        async fn create_review(&self, user: Id, target: ReviewTarget, new: NewReview) -> RepoResult<Review> {
            // validate everything before the first write so a rejected
            // review never leaves a ticket behind
            target.validate()?;
            new.validate()?;
            let mut s = self.write()?;
            s.ensure_user(user)?;
            let now = Utc::now();
            let ticket_id = match target {
                ReviewTarget::Existing(id) => {
                    if !s.tickets.contains_key(&id) { return Err(RepoError::NotFound); }
                    id
                }
                ReviewTarget::NewTicket(t) => {
                    let id = s.next_id();
                    let ticket = Ticket {
                        id,
                        title: t.title,
                        description: t.description,
                        user_id: user,
                        image: t.image,
                        time_created: now,
                    };
                    s.tickets.insert(id, ticket);
                    id
                }
            };
            let id = s.next_id();
            let review = Review {
                id,
                ticket_id,
                rating: new.rating,
                headline: new.headline,
                body: new.body,
                user_id: user,
                time_created: now,
            };
            s.reviews.insert(id, review.clone());
            self.persist(&s);
            drop(s);
            info!(review_id = id, ticket_id, user_id = user, "review created");
            Ok(review)
        }
        async fn get_review(&self, id: Id) -> RepoResult<Review> {
            self.read()?.reviews.get(&id).cloned().ok_or(RepoError::NotFound)
        }
        async fn update_review(&self, user: Id, id: Id, upd: UpdateReview) -> RepoResult<Review> {
            upd.validate()?;
            let mut s = self.write()?;
            let review = s.reviews.get_mut(&id)
                .filter(|r| r.user_id == user)
                .ok_or(RepoError::NotFound)?;
            upd.apply(review);
            let updated = review.clone();
            self.persist(&s);
            drop(s);
            info!(review_id = id, user_id = user, "review updated");
            Ok(updated)
        }
        async fn delete_review(&self, user: Id, id: Id) -> RepoResult<Review> {
            let mut s = self.write()?;
            if !s.reviews.get(&id).is_some_and(|r| r.user_id == user) {
                return Err(RepoError::NotFound);
            }
            let review = s.reviews.remove(&id).ok_or(RepoError::NotFound)?;
            self.persist(&s);
            drop(s);
            info!(review_id = id, user_id = user, "review deleted");
            Ok(review)
        }
        async fn reviews_by_authors(&self, authors: &[Id]) -> RepoResult<Vec<Review>> {
            let s = self.read()?;
            Ok(s.reviews.values().filter(|r| authors.contains(&r.user_id)).cloned().collect())
        }
        async fn reviews_on_tickets_of(&self, owner: Id) -> RepoResult<Vec<Review>> {
            let s = self.read()?;
            Ok(s.reviews.values()
                .filter(|r| s.tickets.get(&r.ticket_id).is_some_and(|t| t.user_id == owner))
                .cloned()
                .collect())
        }
        async fn reviews_for_ticket(&self, ticket: Id) -> RepoResult<Vec<Review>> {
            let s = self.read()?;
            if !s.tickets.contains_key(&ticket) { return Err(RepoError::NotFound); }
            Ok(s.reviews.values().filter(|r| r.ticket_id == ticket).cloned().collect())
        }
    }

    #[async_trait]
    impl VisibilityRepo for InMemRepo {
        async fn visible_content(&self, user: Id) -> RepoResult<VisibleContent> {
            let s = self.read()?;
            if !s.users.contains_key(&user) { return Err(RepoError::NotFound); }
            let followed = s.follows.iter().filter(|e| e.user_id == user).map(|e| e.followed_user_id);
            let authors = author_set(user, followed);
            Ok(s.content_of(&authors, Some(user)))
        }
        async fn own_content(&self, user: Id) -> RepoResult<VisibleContent> {
            let s = self.read()?;
            if !s.users.contains_key(&user) { return Err(RepoError::NotFound); }
            Ok(s.content_of(&[user], None))
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres};
    use tracing::{info, warn};

    const USER_COLS: &str = "id, username, created_at";
    const TICKET_COLS: &str = "id, title, description, user_id, image, time_created";
    const REVIEW_COLS: &str = "id, ticket_id, rating, headline, body, user_id, time_created";

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

        pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
            sqlx::migrate!("./migrations").run(&self.pool).await
        }
    }

    /// Maps driver errors onto store errors; unique violations are left to
    /// the caller because their meaning depends on the table.
    fn db_err(e: sqlx::Error) -> RepoError {
        match &e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(d) if d.is_foreign_key_violation() => RepoError::Integrity(d.message().to_string()),
            sqlx::Error::Database(d) if d.is_check_violation() => RepoError::Validation(d.message().to_string()),
            _ => RepoError::Internal(e.to_string()),
        }
    }

    fn is_unique_violation(e: &sqlx::Error) -> bool {
        matches!(e, sqlx::Error::Database(d) if d.is_unique_violation())
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            new.validate()?;
            let rec = sqlx::query_as::<_, User>(&format!("INSERT INTO users (username) VALUES ($1) RETURNING {USER_COLS}"))
                .bind(&new.username)
                .fetch_one(&self.pool).await
                .map_err(|e| if is_unique_violation(&e) { RepoError::Conflict } else { db_err(e) })?;
            info!(user_id = rec.id, username = %rec.username, "user created");
            Ok(rec)
        }
        async fn get_user(&self, id: Id) -> RepoResult<User> {
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_one(&self.pool).await.map_err(db_err)
        }
        async fn find_user_by_username(&self, username: &str) -> RepoResult<User> {
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLS} FROM users WHERE username = $1"))
                .bind(username)
                .fetch_one(&self.pool).await.map_err(db_err)
        }
    }

    #[async_trait]
    impl FollowRepo for PgRepo {
        async fn add_follow(&self, follower: Id, followed_username: &str) -> RepoResult<FollowEdge> {
            let followed = self.find_user_by_username(followed_username).await?;
            // the unique index decides, not the lookup above
            let edge = sqlx::query_as::<_, FollowEdge>(
                "INSERT INTO follows (user_id, followed_user_id) VALUES ($1,$2) RETURNING user_id, followed_user_id, created_at"
            )
                .bind(follower)
                .bind(followed.id)
                .fetch_one(&self.pool).await
                .map_err(|e| if is_unique_violation(&e) {
                    warn!(follower, followed = followed.id, "duplicate follow rejected");
                    RepoError::DuplicateEdge
                } else { db_err(e) })?;
            info!(follower, followed = followed.id, "follow added");
            Ok(edge)
        }
        async fn remove_follow(&self, follower: Id, followed_username: &str) -> RepoResult<()> {
            let res = sqlx::query(
                "DELETE FROM follows f USING users u WHERE f.followed_user_id = u.id AND f.user_id = $1 AND u.username = $2"
            )
                .bind(follower)
                .bind(followed_username)
                .execute(&self.pool).await.map_err(db_err)?;
            if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
            info!(follower, followed_username, "follow removed");
            Ok(())
        }
        async fn list_following(&self, user: Id) -> RepoResult<Vec<User>> {
            self.get_user(user).await?;
            sqlx::query_as::<_, User>(
                "SELECT u.id, u.username, u.created_at FROM follows f JOIN users u ON u.id = f.followed_user_id WHERE f.user_id = $1 ORDER BY f.id"
            )
                .bind(user)
                .fetch_all(&self.pool).await.map_err(db_err)
        }
        async fn list_followers(&self, user: Id) -> RepoResult<Vec<User>> {
            self.get_user(user).await?;
            sqlx::query_as::<_, User>(
                "SELECT u.id, u.username, u.created_at FROM follows f JOIN users u ON u.id = f.user_id WHERE f.followed_user_id = $1 ORDER BY f.id"
            )
                .bind(user)
                .fetch_all(&self.pool).await.map_err(db_err)
        }
    }

    #[async_trait]
    impl TicketRepo for PgRepo {
        async fn create_ticket(&self, user: Id, new: NewTicket) -> RepoResult<Ticket> {
            new.validate()?;
            let rec = sqlx::query_as::<_, Ticket>(&format!(
                "INSERT INTO tickets (title, description, user_id, image) VALUES ($1,$2,$3,$4) RETURNING {TICKET_COLS}"
            ))
                .bind(&new.title).bind(&new.description).bind(user).bind(new.image.as_ref())
                .fetch_one(&self.pool).await.map_err(db_err)?;
            info!(ticket_id = rec.id, user_id = user, "ticket created");
            Ok(rec)
        }
        async fn get_ticket(&self, id: Id) -> RepoResult<Ticket> {
            sqlx::query_as::<_, Ticket>(&format!("SELECT {TICKET_COLS} FROM tickets WHERE id = $1"))
                .bind(id)
                .fetch_one(&self.pool).await.map_err(db_err)
        }
        async fn update_ticket(&self, user: Id, id: Id, upd: UpdateTicket) -> RepoResult<Ticket> {
            upd.validate()?;
            let set_image = upd.image.is_some();
            let image = upd.image.flatten();
            let rec = sqlx::query_as::<_, Ticket>(&format!(
                "UPDATE tickets SET title = COALESCE($3, title), description = COALESCE($4, description), \
                 image = CASE WHEN $5 THEN $6 ELSE image END \
                 WHERE id = $1 AND user_id = $2 RETURNING {TICKET_COLS}"
            ))
                .bind(id).bind(user)
                .bind(upd.title.as_ref()).bind(upd.description.as_ref())
                .bind(set_image).bind(image.as_ref())
                .fetch_optional(&self.pool).await.map_err(db_err)?
                .ok_or(RepoError::NotFound)?;
            info!(ticket_id = id, user_id = user, "ticket updated");
            Ok(rec)
        }
        async fn delete_ticket(&self, user: Id, id: Id) -> RepoResult<Ticket> {
            // reviews go with it through ON DELETE CASCADE
            let rec = sqlx::query_as::<_, Ticket>(&format!(
                "DELETE FROM tickets WHERE id = $1 AND user_id = $2 RETURNING {TICKET_COLS}"
            ))
                .bind(id).bind(user)
                .fetch_optional(&self.pool).await.map_err(db_err)?
                .ok_or(RepoError::NotFound)?;
            info!(ticket_id = id, user_id = user, "ticket deleted");
            Ok(rec)
        }
        async fn tickets_by_authors(&self, authors: &[Id]) -> RepoResult<Vec<Ticket>> {
            sqlx::query_as::<_, Ticket>(&format!("SELECT {TICKET_COLS} FROM tickets WHERE user_id = ANY($1) ORDER BY id"))
                .bind(authors)
                .fetch_all(&self.pool).await.map_err(db_err)
        }
    }

    #[async_trait]
    impl ReviewRepo for PgRepo {
        async fn create_review(&self, user: Id, target: ReviewTarget, new: NewReview) -> RepoResult<Review> {
            target.validate()?;
            new.validate()?;
            let mut tx = self.pool.begin().await.map_err(db_err)?;
            let ticket_id = match target {
                ReviewTarget::Existing(id) => {
                    sqlx::query_scalar::<_, Id>("SELECT id FROM tickets WHERE id = $1 FOR SHARE")
                        .bind(id)
                        .fetch_optional(&mut *tx).await.map_err(db_err)?
                        .ok_or(RepoError::NotFound)?
                }
                ReviewTarget::NewTicket(t) => {
                    sqlx::query_scalar::<_, Id>(
                        "INSERT INTO tickets (title, description, user_id, image) VALUES ($1,$2,$3,$4) RETURNING id"
                    )
                        .bind(&t.title).bind(&t.description).bind(user).bind(t.image.as_ref())
                        .fetch_one(&mut *tx).await.map_err(db_err)?
                }
            };
            let rec = sqlx::query_as::<_, Review>(&format!(
                "INSERT INTO reviews (ticket_id, rating, headline, body, user_id) VALUES ($1,$2,$3,$4,$5) RETURNING {REVIEW_COLS}"
            ))
                .bind(ticket_id).bind(new.rating).bind(&new.headline).bind(&new.body).bind(user)
                .fetch_one(&mut *tx).await.map_err(db_err)?;
            tx.commit().await.map_err(db_err)?;
            info!(review_id = rec.id, ticket_id, user_id = user, "review created");
            Ok(rec)
        }
        async fn get_review(&self, id: Id) -> RepoResult<Review> {
            sqlx::query_as::<_, Review>(&format!("SELECT {REVIEW_COLS} FROM reviews WHERE id = $1"))
                .bind(id)
                .fetch_one(&self.pool).await.map_err(db_err)
        }
        async fn update_review(&self, user: Id, id: Id, upd: UpdateReview) -> RepoResult<Review> {
            upd.validate()?;
            let rec = sqlx::query_as::<_, Review>(&format!(
                "UPDATE reviews SET rating = COALESCE($3, rating), headline = COALESCE($4, headline), body = COALESCE($5, body) \
                 WHERE id = $1 AND user_id = $2 RETURNING {REVIEW_COLS}"
            ))
                .bind(id).bind(user)
                .bind(upd.rating).bind(upd.headline.as_ref()).bind(upd.body.as_ref())
                .fetch_optional(&self.pool).await.map_err(db_err)?
                .ok_or(RepoError::NotFound)?;
            info!(review_id = id, user_id = user, "review updated");
            Ok(rec)
        }
        async fn delete_review(&self, user: Id, id: Id) -> RepoResult<Review> {
            let rec = sqlx::query_as::<_, Review>(&format!(
                "DELETE FROM reviews WHERE id = $1 AND user_id = $2 RETURNING {REVIEW_COLS}"
            ))
                .bind(id).bind(user)
                .fetch_optional(&self.pool).await.map_err(db_err)?
                .ok_or(RepoError::NotFound)?;
            info!(review_id = id, user_id = user, "review deleted");
            Ok(rec)
        }
        async fn reviews_by_authors(&self, authors: &[Id]) -> RepoResult<Vec<Review>> {
            sqlx::query_as::<_, Review>(&format!("SELECT {REVIEW_COLS} FROM reviews WHERE user_id = ANY($1) ORDER BY id"))
                .bind(authors)
                .fetch_all(&self.pool).await.map_err(db_err)
        }
        async fn reviews_on_tickets_of(&self, owner: Id) -> RepoResult<Vec<Review>> {
            sqlx::query_as::<_, Review>(
                "SELECT r.id, r.ticket_id, r.rating, r.headline, r.body, r.user_id, r.time_created \
                 FROM reviews r JOIN tickets t ON t.id = r.ticket_id WHERE t.user_id = $1 ORDER BY r.id"
            )
                .bind(owner)
                .fetch_all(&self.pool).await.map_err(db_err)
        }
        async fn reviews_for_ticket(&self, ticket: Id) -> RepoResult<Vec<Review>> {
            self.get_ticket(ticket).await?;
            sqlx::query_as::<_, Review>(&format!("SELECT {REVIEW_COLS} FROM reviews WHERE ticket_id = $1 ORDER BY id"))
                .bind(ticket)
                .fetch_all(&self.pool).await.map_err(db_err)
        }
    }

    impl PgRepo {
        /// Read-only transaction whose statements all see the same snapshot.
        async fn snapshot_tx(&self, user: Id) -> RepoResult<sqlx::Transaction<'static, Postgres>> {
            let mut tx = self.pool.begin().await.map_err(db_err)?;
            sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
                .execute(&mut *tx).await.map_err(db_err)?;
            sqlx::query_scalar::<_, Id>("SELECT id FROM users WHERE id = $1")
                .bind(user)
                .fetch_optional(&mut *tx).await.map_err(db_err)?
                .ok_or(RepoError::NotFound)?;
            Ok(tx)
        }
    }

    #[async_trait]
    impl VisibilityRepo for PgRepo {
        async fn visible_content(&self, user: Id) -> RepoResult<VisibleContent> {
            let mut tx = self.snapshot_tx(user).await?;
            let followed = sqlx::query_scalar::<_, Id>("SELECT followed_user_id FROM follows WHERE user_id = $1 ORDER BY id")
                .bind(user)
                .fetch_all(&mut *tx).await.map_err(db_err)?;
            let authors = author_set(user, followed);
            let tickets = sqlx::query_as::<_, Ticket>(&format!("SELECT {TICKET_COLS} FROM tickets WHERE user_id = ANY($1) ORDER BY id"))
                .bind(&authors[..])
                .fetch_all(&mut *tx).await.map_err(db_err)?;
            let reviews = sqlx::query_as::<_, Review>(&format!(
                "SELECT {REVIEW_COLS} FROM reviews \
                 WHERE user_id = ANY($1) OR ticket_id IN (SELECT id FROM tickets WHERE user_id = $2) ORDER BY id"
            ))
                .bind(&authors[..]).bind(user)
                .fetch_all(&mut *tx).await.map_err(db_err)?;
            tx.commit().await.map_err(db_err)?;
            Ok(VisibleContent { tickets, reviews })
        }
        async fn own_content(&self, user: Id) -> RepoResult<VisibleContent> {
            let mut tx = self.snapshot_tx(user).await?;
            let tickets = sqlx::query_as::<_, Ticket>(&format!("SELECT {TICKET_COLS} FROM tickets WHERE user_id = $1 ORDER BY id"))
                .bind(user)
                .fetch_all(&mut *tx).await.map_err(db_err)?;
            let reviews = sqlx::query_as::<_, Review>(&format!("SELECT {REVIEW_COLS} FROM reviews WHERE user_id = $1 ORDER BY id"))
                .bind(user)
                .fetch_all(&mut *tx).await.map_err(db_err)?;
            tx.commit().await.map_err(db_err)?;
            Ok(VisibleContent { tickets, reviews })
        }
    }
}
