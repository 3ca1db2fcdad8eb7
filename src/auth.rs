use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;

use crate::models::{
    check_len, Course, NewStudent, UserResponse, EMAIL_MAX_LEN, NAME_MAX_LEN,
};
use crate::password;
use crate::session::{clear_auth_cookies, set_auth_cookies, CurrentStudent};
use crate::{breaks, proceeds, AppState, Error, Payload};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateStudent {
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginStudent {
    pub email: String,
    pub password: String,
}

impl CreateStudent {
    fn validate(&self) -> Result<(), Error> {
        if self.password.is_empty() {
            return Err(Error::MissingCredentials {
                message: "Provided password was empty!".to_string(),
            });
        }
        if self.name.trim().is_empty() {
            return Err(Error::invalid("`name` parameter was empty"));
        }
        if !looks_like_email(&self.email) {
            return Err(Error::invalid(format!(
                "`{}` is not a valid email address",
                self.email
            )));
        }
        check_len("name", Some(&self.name), NAME_MAX_LEN).map_err(Error::invalid)?;
        check_len("email", Some(&self.email), EMAIL_MAX_LEN).map_err(Error::invalid)
    }
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
                && !domain.contains('@')
        }
        None => false,
    }
}

fn invalid_credentials() -> Error {
    Error::unauthenticated("Invalid credentials")
}

pub async fn register_student(
    Extension(state): Extension<AppState>,
    jar: CookieJar,
    Json(student): Json<CreateStudent>,
) -> Result<(StatusCode, CookieJar, Json<UserResponse>), Error> {
    student.validate()?;

    if state.store.student_by_email(&student.email).await?.is_some() {
        return Err(Error::UserAlreadyExists {
            message: "Email already registered".to_string(),
        });
    }

    let password_hash = password::hash_blocking(student.password).await?;
    let created = state
        .store
        .create_student(NewStudent {
            name: student.name,
            email: student.email,
            password_hash,
        })
        .await?;

    let (access, refresh) = state.tokens.issue_pair(&created.email)?;
    log::info!("Registered student {} <{}>", created.id, created.email);
    Ok((
        StatusCode::CREATED,
        set_auth_cookies(jar, access, refresh),
        Json(UserResponse::from(&created)),
    ))
}

pub async fn login_student(
    Extension(state): Extension<AppState>,
    jar: CookieJar,
    Json(login): Json<LoginStudent>,
) -> Result<(CookieJar, Json<UserResponse>), Error> {
    if login.password.is_empty() {
        return Err(invalid_credentials());
    }

    let student = match state.store.student_by_email(&login.email).await? {
        Some(student) => student,
        None => {
            log::warn!("Login attempt for unknown email <{}>", login.email);
            return Err(invalid_credentials());
        }
    };

    let matches = password::verify_blocking(login.password, student.password_hash.clone()).await?;
    if !matches {
        log::warn!("Failed login for student {}", student.id);
        return Err(invalid_credentials());
    }

    let (access, refresh) = state.tokens.issue_pair(&student.email)?;
    log::info!("Student {} logged in", student.id);
    Ok((
        set_auth_cookies(jar, access, refresh),
        Json(UserResponse::from(&student)),
    ))
}

/// Tokens are stateless, so this only tells the client to forget them.
pub async fn drop_session(jar: CookieJar) -> (CookieJar, Json<serde_json::Value>) {
    (
        clear_auth_cookies(jar),
        Json(serde_json::json!({ "message": "Logged out successfully" })),
    )
}

pub async fn current_student(
    current: CurrentStudent,
    jar: CookieJar,
) -> (CookieJar, Json<UserResponse>) {
    let user = UserResponse::from(current.student());
    (current.attach(jar), Json(user))
}

pub async fn delete_student(
    Extension(state): Extension<AppState>,
    current: CurrentStudent,
    jar: CookieJar,
) -> Response {
    let id = current.student().id;
    let deleted = match state.store.delete_student(id).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(Error::not_found(format!("Student with id {} not found", id))),
        Err(err) => Err(Error::from(err)),
    };
    match deleted {
        Ok(()) => {
            log::info!("Deleted student {}", id);
            (StatusCode::NO_CONTENT, clear_auth_cookies(jar)).into_response()
        }
        Err(err) => (current.attach(jar), err).into_response(),
    }
}

pub async fn student_courses(
    Extension(state): Extension<AppState>,
    current: CurrentStudent,
    jar: CookieJar,
) -> (CookieJar, Payload<Vec<Course>>) {
    let result = match state.store.courses_of(current.student().id).await {
        Ok(courses) => proceeds(courses),
        Err(err) => breaks(err.into()),
    };
    current.respond(jar, result)
}
