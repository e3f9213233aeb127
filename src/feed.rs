//! Timeline assembly over the visibility sets.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::models::{Id, Review, Ticket};
use crate::repo::{Repo, RepoError, RepoResult, VisibleContent};
use crate::visibility;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContentType {
    Ticket,
    Review,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Ticket => "TICKET",
            ContentType::Review => "REVIEW",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One timeline entry, serialised flat with a `content_type` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "content_type", rename_all = "UPPERCASE")]
pub enum FeedItem {
    Ticket(Ticket),
    Review(Review),
}

impl FeedItem {
    pub fn content_type(&self) -> ContentType {
        match self {
            FeedItem::Ticket(_) => ContentType::Ticket,
            FeedItem::Review(_) => ContentType::Review,
        }
    }

    pub fn id(&self) -> Id {
        match self {
            FeedItem::Ticket(t) => t.id,
            FeedItem::Review(r) => r.id,
        }
    }

    pub fn user_id(&self) -> Id {
        match self {
            FeedItem::Ticket(t) => t.user_id,
            FeedItem::Review(r) => r.user_id,
        }
    }

    pub fn time_created(&self) -> DateTime<Utc> {
        match self {
            FeedItem::Ticket(t) => t.time_created,
            FeedItem::Review(r) => r.time_created,
        }
    }

    pub fn post_ref(&self) -> PostRef {
        PostRef { content_type: self.content_type(), id: self.id() }
    }
}

/// Typed handle on a post, written `TICKET<id>` or `REVIEW<id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostRef {
    pub content_type: ContentType,
    pub id: Id,
}

impl fmt::Display for PostRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.content_type, self.id)
    }
}

impl FromStr for PostRef {
    type Err = RepoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (content_type, rest) = if let Some(rest) = s.strip_prefix("TICKET") {
            (ContentType::Ticket, rest)
        } else if let Some(rest) = s.strip_prefix("REVIEW") {
            (ContentType::Review, rest)
        } else {
            return Err(RepoError::Validation(format!("unknown post reference '{s}'")));
        };
        // digits only: `parse` alone would take a sign
        if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
            return Err(RepoError::Validation(format!("bad post id in '{s}'")));
        }
        let id = rest
            .parse::<Id>()
            .map_err(|_| RepoError::Validation(format!("bad post id in '{s}'")))?;
        Ok(PostRef { content_type, id })
    }
}

/// Reviews first, then tickets, then a stable sort newest first. Items
/// created at the same instant keep that order.
fn merge(VisibleContent { tickets, reviews }: VisibleContent) -> Vec<FeedItem> {
    let mut items: Vec<FeedItem> = reviews
        .into_iter()
        .map(FeedItem::Review)
        .chain(tickets.into_iter().map(FeedItem::Ticket))
        .collect();
    items.sort_by(|a, b| b.time_created().cmp(&a.time_created()));
    items
}

/// Everything `user` may see, newest first.
pub async fn compose_feed(repo: &dyn Repo, user: Id) -> RepoResult<Vec<FeedItem>> {
    Ok(merge(visibility::resolve(repo, user).await?))
}

/// Only what `user` wrote, newest first.
pub async fn compose_own_feed(repo: &dyn Repo, user: Id) -> RepoResult<Vec<FeedItem>> {
    Ok(merge(repo.own_content(user).await?))
}

/// Deletes one of `user`'s own posts. Deleting a ticket takes its reviews
/// with it.
pub async fn delete_own_post(repo: &dyn Repo, user: Id, post: PostRef) -> RepoResult<FeedItem> {
    let deleted = match post.content_type {
        ContentType::Ticket => FeedItem::Ticket(repo.delete_ticket(user, post.id).await?),
        ContentType::Review => FeedItem::Review(repo.delete_review(user, post.id).await?),
    };
    info!(user, post = %post, "own post deleted");
    Ok(deleted)
}
