use std::sync::Arc;
use actix_web::{web, HttpResponse};

use crate::auth::{create_jwt, Auth, JwtSecret};
use crate::error::ApiError;
use crate::feed::{self, PostRef};
use crate::models::*;
use crate::repo::Repo;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(web::resource("/users").route(web::post().to(register_user)))
            .service(web::resource("/feed").route(web::get().to(get_feed)))
            .service(web::resource("/posts").route(web::get().to(get_own_posts)))
            .service(web::resource("/posts/{post_ref}").route(web::delete().to(delete_own_post)))
            .service(
                web::resource("/follows")
                    .route(web::get().to(list_following))
                    .route(web::post().to(add_follow)),
            )
            .service(web::resource("/follows/{username}").route(web::delete().to(remove_follow)))
            .service(web::resource("/followers").route(web::get().to(list_followers)))
            .service(web::resource("/tickets").route(web::post().to(create_ticket)))
            .service(
                web::resource("/tickets/{id}")
                    .route(web::get().to(get_ticket))
                    .route(web::patch().to(update_ticket))
                    .route(web::delete().to(delete_ticket)),
            )
            .service(web::resource("/tickets/{id}/reviews").route(web::get().to(list_ticket_reviews)))
            .service(web::resource("/reviews").route(web::post().to(create_review)))
            .service(
                web::resource("/reviews/{id}")
                    .route(web::get().to(get_review))
                    .route(web::patch().to(update_review))
                    .route(web::delete().to(delete_review)),
            ),
    );
}

#[derive(Clone)]
pub struct AppState { pub repo: Arc<dyn Repo> }

#[derive(Debug, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct RegisterResponse {
    pub user: User,
    pub token: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = NewUser,
    responses(
        (status = 201, description = "User registered", body = RegisterResponse),
        (status = 409, description = "Username taken"),
        (status = 422, description = "Invalid username")
    )
)]
pub async fn register_user(
    data: web::Data<AppState>,
    secret: web::Data<JwtSecret>,
    payload: web::Json<NewUser>,
) -> Result<HttpResponse, ApiError> {
    let user = data.repo.create_user(payload.into_inner()).await?;
    let token = create_jwt(&secret, &user).map_err(|e| {
        log::error!("token signing failed: {e}");
        ApiError::Internal
    })?;
    Ok(HttpResponse::Created().json(RegisterResponse { user, token }))
}

// ---------------- feed -------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/feed",
    responses((status = 200, description = "Own and followed content, newest first", body = [FeedItem]))
)]
pub async fn get_feed(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let items = feed::compose_feed(&*data.repo, auth.user_id()).await?;
    Ok(HttpResponse::Ok().json(items))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts",
    responses((status = 200, description = "Own content, newest first", body = [FeedItem]))
)]
pub async fn get_own_posts(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let items = feed::compose_own_feed(&*data.repo, auth.user_id()).await?;
    Ok(HttpResponse::Ok().json(items))
}

#[utoipa::path(
    delete,
    path = "/api/v1/posts/{post_ref}",
    params(("post_ref" = String, Path, description = "TICKET<id> or REVIEW<id>")),
    responses(
        (status = 204, description = "Post deleted"),
        (status = 404, description = "No such post owned by caller"),
        (status = 422, description = "Malformed reference")
    )
)]
pub async fn delete_own_post(auth: Auth, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let post: PostRef = path.into_inner().parse()?;
    feed::delete_own_post(&*data.repo, auth.user_id(), post).await?;
    Ok(HttpResponse::NoContent().finish())
}

// ---------------- follows ----------------------------------------------

// follow and unfollow must resolve the same string to the same user
fn normalize_username(raw: &str) -> &str {
    raw.trim()
}

#[utoipa::path(
    get,
    path = "/api/v1/follows",
    responses((status = 200, description = "Users the caller follows", body = [User]))
)]
pub async fn list_following(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.repo.list_following(auth.user_id()).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/followers",
    responses((status = 200, description = "Users following the caller", body = [User]))
)]
pub async fn list_followers(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.repo.list_followers(auth.user_id()).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/follows",
    request_body = NewFollow,
    responses(
        (status = 201, description = "Now following", body = FollowEdge),
        (status = 404, description = "Unknown username"),
        (status = 409, description = "Already following")
    )
)]
pub async fn add_follow(auth: Auth, data: web::Data<AppState>, payload: web::Json<NewFollow>) -> Result<HttpResponse, ApiError> {
    let edge = data.repo.add_follow(auth.user_id(), normalize_username(&payload.username)).await?;
    Ok(HttpResponse::Created().json(edge))
}

#[utoipa::path(
    delete,
    path = "/api/v1/follows/{username}",
    params(("username" = String, Path, description = "Followed username")),
    responses(
        (status = 204, description = "Unfollowed"),
        (status = 404, description = "Not following that user")
    )
)]
pub async fn remove_follow(auth: Auth, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    data.repo.remove_follow(auth.user_id(), normalize_username(&path)).await?;
    Ok(HttpResponse::NoContent().finish())
}

// ---------------- tickets ----------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/tickets",
    request_body = NewTicket,
    responses(
        (status = 201, description = "Ticket created", body = Ticket),
        (status = 422, description = "Invalid ticket")
    )
)]
pub async fn create_ticket(auth: Auth, data: web::Data<AppState>, payload: web::Json<NewTicket>) -> Result<HttpResponse, ApiError> {
    let ticket = data.repo.create_ticket(auth.user_id(), payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(ticket))
}

#[utoipa::path(
    get,
    path = "/api/v1/tickets/{id}",
    params(("id" = Id, Path, description = "Ticket id")),
    responses(
        (status = 200, description = "Ticket", body = Ticket),
        (status = 404, description = "Ticket not found")
    )
)]
pub async fn get_ticket(_auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.repo.get_ticket(path.into_inner()).await?))
}

#[utoipa::path(
    patch,
    path = "/api/v1/tickets/{id}",
    request_body = UpdateTicket,
    params(("id" = Id, Path, description = "Ticket id")),
    responses(
        (status = 200, description = "Ticket updated", body = Ticket),
        (status = 404, description = "No such ticket owned by caller")
    )
)]
pub async fn update_ticket(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateTicket>,
) -> Result<HttpResponse, ApiError> {
    let ticket = data.repo.update_ticket(auth.user_id(), path.into_inner(), payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ticket))
}

#[utoipa::path(
    delete,
    path = "/api/v1/tickets/{id}",
    params(("id" = Id, Path, description = "Ticket id")),
    responses(
        (status = 204, description = "Ticket and its reviews deleted"),
        (status = 404, description = "No such ticket owned by caller")
    )
)]
pub async fn delete_ticket(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    data.repo.delete_ticket(auth.user_id(), path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    get,
    path = "/api/v1/tickets/{id}/reviews",
    params(("id" = Id, Path, description = "Ticket id")),
    responses(
        (status = 200, description = "Reviews of a ticket", body = [Review]),
        (status = 404, description = "Ticket not found")
    )
)]
pub async fn list_ticket_reviews(_auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.repo.reviews_for_ticket(path.into_inner()).await?))
}

// ---------------- reviews ----------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/reviews",
    request_body = CreateReview,
    responses(
        (status = 201, description = "Review created (with its ticket when requested)", body = Review),
        (status = 404, description = "Ticket not found"),
        (status = 422, description = "Invalid review or ticket")
    )
)]
pub async fn create_review(auth: Auth, data: web::Data<AppState>, payload: web::Json<CreateReview>) -> Result<HttpResponse, ApiError> {
    let CreateReview { target, review } = payload.into_inner();
    let review = data.repo.create_review(auth.user_id(), target, review).await?;
    Ok(HttpResponse::Created().json(review))
}

#[utoipa::path(
    get,
    path = "/api/v1/reviews/{id}",
    params(("id" = Id, Path, description = "Review id")),
    responses(
        (status = 200, description = "Review", body = Review),
        (status = 404, description = "Review not found")
    )
)]
pub async fn get_review(_auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.repo.get_review(path.into_inner()).await?))
}

#[utoipa::path(
    patch,
    path = "/api/v1/reviews/{id}",
    request_body = UpdateReview,
    params(("id" = Id, Path, description = "Review id")),
    responses(
        (status = 200, description = "Review updated", body = Review),
        (status = 404, description = "No such review owned by caller")
    )
)]
pub async fn update_review(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateReview>,
) -> Result<HttpResponse, ApiError> {
    let review = data.repo.update_review(auth.user_id(), path.into_inner(), payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(review))
}

#[utoipa::path(
    delete,
    path = "/api/v1/reviews/{id}",
    params(("id" = Id, Path, description = "Review id")),
    responses(
        (status = 204, description = "Review deleted"),
        (status = 404, description = "No such review owned by caller")
    )
)]
pub async fn delete_review(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    data.repo.delete_review(auth.user_id(), path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
