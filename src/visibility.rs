//! Who sees what.
//!
//! A user sees their own content and the content of everyone they follow.
//! Reviews are wider: replies to a user's own tickets are visible to that
//! user whoever wrote them.

use tracing::debug;

use crate::models::{Id, Review, Ticket};
use crate::repo::{Repo, RepoResult, VisibleContent};

/// `user` followed by everyone `user` follows, without repeats.
///
/// A self-follow would otherwise list the user twice.
pub fn author_set(user: Id, followed: impl IntoIterator<Item = Id>) -> Vec<Id> {
    let mut authors = vec![user];
    for id in followed {
        if !authors.contains(&id) {
            authors.push(id);
        }
    }
    authors
}

/// Visible tickets and reviews of `user`, read in one go so both lists
/// agree on the follow set and on which tickets still exist.
pub async fn resolve(repo: &dyn Repo, user: Id) -> RepoResult<VisibleContent> {
    let mut content = repo.visible_content(user).await?;
    content.tickets.dedup_by_key(|t| t.id);
    content.reviews.dedup_by_key(|r| r.id);
    debug!(user, tickets = content.tickets.len(), reviews = content.reviews.len(), "resolved visible content");
    Ok(content)
}

/// Own tickets plus tickets of followed users, ordered by id.
pub async fn visible_tickets(repo: &dyn Repo, user: Id) -> RepoResult<Vec<Ticket>> {
    Ok(resolve(repo, user).await?.tickets)
}

/// Own reviews, reviews of followed users and replies to the user's own
/// tickets, ordered by id.
pub async fn visible_reviews(repo: &dyn Repo, user: Id) -> RepoResult<Vec<Review>> {
    Ok(resolve(repo, user).await?.reviews)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn author_set_keeps_user_first_and_drops_repeats() {
        assert_eq!(author_set(3, [5, 3, 7, 5]), [3, 5, 7]);
        assert_eq!(author_set(3, std::iter::empty()), [3]);
    }
}
