use crate::feed::{ContentType, FeedItem};
use crate::models::{
    CreateReview, FollowEdge, NewFollow, NewReview, NewTicket, NewUser, Review, ReviewTarget, Ticket,
    UpdateReview, UpdateTicket, User,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::register_user,
        crate::routes::get_feed,
        crate::routes::get_own_posts,
        crate::routes::delete_own_post,
        crate::routes::list_following,
        crate::routes::list_followers,
        crate::routes::add_follow,
        crate::routes::remove_follow,
        crate::routes::create_ticket,
        crate::routes::get_ticket,
        crate::routes::update_ticket,
        crate::routes::delete_ticket,
        crate::routes::list_ticket_reviews,
        crate::routes::create_review,
        crate::routes::get_review,
        crate::routes::update_review,
        crate::routes::delete_review,
    ),
    components(schemas(
        User, NewUser, Ticket, NewTicket, UpdateTicket, Review, NewReview, UpdateReview,
        ReviewTarget, CreateReview, FollowEdge, NewFollow, FeedItem, ContentType,
        crate::routes::RegisterResponse
    )),
    tags(
        (name = "feed", description = "Timeline operations"),
        (name = "follows", description = "Follow graph operations"),
        (name = "tickets", description = "Ticket operations"),
        (name = "reviews", description = "Review operations"),
    )
)]
pub struct ApiDoc;
