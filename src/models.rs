use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::repo::RepoError;

pub type Id = i64;

pub const USERNAME_MAX: usize = 150;
pub const TITLE_MAX: usize = 128;
pub const DESCRIPTION_MAX: usize = 2048;
pub const IMAGE_REF_MAX: usize = 255;
pub const HEADLINE_MAX: usize = 128;
pub const BODY_MAX: usize = 8192;
pub const RATING_MIN: i32 = 0;
pub const RATING_MAX: i32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct User {
    pub id: Id,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewUser {
    pub username: String,
}

/// A request for a review of a book or an article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Ticket {
    pub id: Id,
    pub title: String,
    pub description: String,
    pub user_id: Id,
    pub image: Option<String>, // reference only, bytes live elsewhere
    pub time_created: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewTicket {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateTicket {
    pub title: Option<String>,
    pub description: Option<String>,
    /// `Some(None)` clears the image, `None` leaves it untouched.
    #[serde(default, with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub image: Option<Option<String>>,
}

/// A critique attached to exactly one ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Review {
    pub id: Id,
    pub ticket_id: Id,
    pub rating: i32,
    pub headline: String,
    pub body: String,
    pub user_id: Id,
    pub time_created: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewReview {
    pub rating: i32,
    pub headline: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateReview {
    pub rating: Option<i32>,
    pub headline: Option<String>,
    pub body: Option<String>,
}

/// What a new review hangs off: an existing ticket, or a ticket created
/// together with it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReviewTarget {
    Existing(Id),
    NewTicket(NewTicket),
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateReview {
    pub target: ReviewTarget,
    pub review: NewReview,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct FollowEdge {
    pub user_id: Id,
    pub followed_user_id: Id,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewFollow {
    pub username: String,
}

// ---------------- field validation ----------------------------------

fn check_len(field: &str, value: &str, max: usize, required: bool) -> Result<(), RepoError> {
    let n = value.chars().count();
    if required && value.trim().is_empty() {
        return Err(RepoError::Validation(format!("{field} is required")));
    }
    if n > max {
        return Err(RepoError::Validation(format!("{field} exceeds {max} characters ({n})")));
    }
    Ok(())
}

pub fn check_rating(rating: i32) -> Result<(), RepoError> {
    if !(RATING_MIN..=RATING_MAX).contains(&rating) {
        return Err(RepoError::Validation(format!(
            "rating must be between {RATING_MIN} and {RATING_MAX}, got {rating}"
        )));
    }
    Ok(())
}

fn check_image(image: Option<&str>) -> Result<(), RepoError> {
    match image {
        Some(i) => check_len("image", i, IMAGE_REF_MAX, true),
        None => Ok(()),
    }
}

impl NewUser {
    pub fn validate(&self) -> Result<(), RepoError> {
        check_len("username", &self.username, USERNAME_MAX, true)
    }
}

impl NewTicket {
    pub fn validate(&self) -> Result<(), RepoError> {
        check_len("title", &self.title, TITLE_MAX, true)?;
        check_len("description", &self.description, DESCRIPTION_MAX, false)?;
        check_image(self.image.as_deref())
    }
}

impl UpdateTicket {
    pub fn validate(&self) -> Result<(), RepoError> {
        if let Some(t) = &self.title { check_len("title", t, TITLE_MAX, true)?; }
        if let Some(d) = &self.description { check_len("description", d, DESCRIPTION_MAX, false)?; }
        if let Some(i) = &self.image { check_image(i.as_deref())?; }
        Ok(())
    }

    pub fn apply(self, ticket: &mut Ticket) {
        if let Some(t) = self.title { ticket.title = t; }
        if let Some(d) = self.description { ticket.description = d; }
        if let Some(i) = self.image { ticket.image = i; }
    }
}

impl NewReview {
    pub fn validate(&self) -> Result<(), RepoError> {
        check_rating(self.rating)?;
        check_len("headline", &self.headline, HEADLINE_MAX, true)?;
        check_len("body", &self.body, BODY_MAX, false)
    }
}

impl UpdateReview {
    pub fn validate(&self) -> Result<(), RepoError> {
        if let Some(r) = self.rating { check_rating(r)?; }
        if let Some(h) = &self.headline { check_len("headline", h, HEADLINE_MAX, true)?; }
        if let Some(b) = &self.body { check_len("body", b, BODY_MAX, false)?; }
        Ok(())
    }

    pub fn apply(self, review: &mut Review) {
        if let Some(r) = self.rating { review.rating = r; }
        if let Some(h) = self.headline { review.headline = h; }
        if let Some(b) = self.body { review.body = b; }
    }
}

impl ReviewTarget {
    pub fn validate(&self) -> Result<(), RepoError> {
        match self {
            ReviewTarget::Existing(_) => Ok(()),
            ReviewTarget::NewTicket(t) => t.validate(),
        }
    }
}

mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<Option<String>>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(inner) => inner.serialize(s),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Option<String>>, D::Error> {
        Option::<String>::deserialize(d).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(rating: i32) -> NewReview {
        NewReview { rating, headline: "Great".into(), body: String::new() }
    }

    #[test]
    fn rating_bounds_are_inclusive() {
        assert!(review(0).validate().is_ok());
        assert!(review(5).validate().is_ok());
        assert!(matches!(review(-1).validate(), Err(RepoError::Validation(_))));
        assert!(matches!(review(6).validate(), Err(RepoError::Validation(_))));
    }

    #[test]
    fn title_length_counts_chars() {
        let ok = NewTicket { title: "é".repeat(TITLE_MAX), description: String::new(), image: None };
        assert!(ok.validate().is_ok());
        let long = NewTicket { title: "a".repeat(TITLE_MAX + 1), description: String::new(), image: None };
        assert!(long.validate().is_err());
        let blank = NewTicket { title: "   ".into(), description: String::new(), image: None };
        assert!(blank.validate().is_err());
    }

    #[test]
    fn update_image_distinguishes_clear_from_untouched() {
        let clear: UpdateTicket = serde_json::from_str(r#"{"image":null}"#).unwrap();
        assert_eq!(clear.image, Some(None));
        let untouched: UpdateTicket = serde_json::from_str(r#"{"title":"x"}"#).unwrap();
        assert_eq!(untouched.image, None);
    }
}
