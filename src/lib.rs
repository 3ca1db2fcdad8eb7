pub mod auth;
pub mod config;
pub mod courses;
pub mod err;
pub mod io;
pub mod models;
pub mod password;
pub mod session;
pub mod store;
pub mod token;


use std::sync::Arc;

use axum::handler::Handler;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Serialize;

pub use crate::err::Error;
use crate::io::ImageStore;
use crate::store::Store;
use crate::token::TokenService;

pub type Payload<T> = Result<Json<T>, Error>;

pub fn proceeds<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok(Json(value))
}

pub fn breaks<V>(err: Error) -> Payload<V>
where
    V: Serialize,
{
    Err(err)
}

/// Shared handles built once at startup and handed to every request through
/// an `Extension` layer.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub tokens: Arc<TokenService>,
    pub images: ImageStore,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/auth/register", post(auth::register_student))
        .route("/auth/login", post(auth::login_student))
        .route("/auth/logout", post(auth::drop_session))
        .route("/auth/me", get(auth::current_student).delete(auth::delete_student))
        .route("/auth/me/courses", get(auth::student_courses))
        .route(
            "/courses",
            get(courses::list_courses).post(courses::create_course),
        )
        .route(
            "/courses/:id",
            get(courses::get_course)
                .put(courses::update_course)
                .delete(courses::delete_course),
        )
        .route(
            "/courses/:id/enroll",
            post(courses::enroll).delete(courses::unenroll),
        )
        .route("/images/:name", get(courses::get_image))
        .fallback(err::handler404.into_service())
        .layer(Extension(state))
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "Hello": "World" }))
}
