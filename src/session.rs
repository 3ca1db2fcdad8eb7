//! Cookie-borne sessions.
//!
//! A request may carry an `access_token` cookie, a `refresh_token` cookie,
//! both or neither. [`negotiate`] turns whatever is present into the current
//! student. When only the refresh token is usable it mints a new access
//! token, which the handler must hand back to the client.
//!
//! Only an *expired* access token falls back to the refresh token. A
//! malformed or wrongly typed access token is a hard failure.

use axum::async_trait;
use axum::extract::{Extension, FromRequest, RequestParts};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::models::Student;
use crate::store::{Store, StoreError};
use crate::token::{TokenError, TokenKind, TokenService};
use crate::token::{ACCESS_TOKEN_EXPIRE_MINUTES, REFRESH_TOKEN_EXPIRE_DAYS};
use crate::{AppState, Error};

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Not authenticated - no tokens provided")]
    NoTokens,
    #[error("User not found")]
    UnknownUser,
    #[error("Authentication expired - please login again")]
    SessionExpired,
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct Session {
    pub student: Student,
    /// Set when the access token was re-minted from the refresh token.
    pub refreshed: Option<String>,
}

pub async fn negotiate(
    tokens: &TokenService,
    store: &dyn Store,
    access: Option<&str>,
    refresh: Option<&str>,
) -> Result<Session, AuthError> {
    let access = access.filter(|token| !token.is_empty());
    let refresh = refresh.filter(|token| !token.is_empty());

    let access = match access {
        Some(access) => access,
        None => {
            let refresh = refresh.ok_or(AuthError::NoTokens)?;
            return refresh_session(tokens, store, refresh).await;
        }
    };

    match tokens.verify(access, TokenKind::Access) {
        Ok(claims) => {
            let student = lookup(store, &claims.sub).await?;
            Ok(Session {
                student,
                refreshed: None,
            })
        }
        Err(TokenError::Expired) => match refresh {
            Some(refresh) => refresh_session(tokens, store, refresh)
                .await
                .map_err(|err| match err {
                    AuthError::Store(err) => AuthError::Store(err),
                    _ => AuthError::SessionExpired,
                }),
            None => Err(TokenError::Expired.into()),
        },
        Err(err) => {
            log::warn!("rejected access token: {}", err);
            Err(err.into())
        }
    }
}

async fn refresh_session(
    tokens: &TokenService,
    store: &dyn Store,
    refresh: &str,
) -> Result<Session, AuthError> {
    let claims = tokens.verify(refresh, TokenKind::Refresh)?;
    let student = lookup(store, &claims.sub).await?;
    let access = tokens.issue_access(&student.email)?;
    log::debug!("silently refreshed access token for student {}", student.id);
    Ok(Session {
        student,
        refreshed: Some(access),
    })
}

async fn lookup(store: &dyn Store, email: &str) -> Result<Student, AuthError> {
    store
        .student_by_email(email)
        .await?
        .ok_or(AuthError::UnknownUser)
}

pub fn access_cookie(token: String) -> Cookie<'static> {
    Cookie::build(ACCESS_COOKIE, token)
        .http_only(true)
        .secure(false)
        .max_age(time::Duration::minutes(ACCESS_TOKEN_EXPIRE_MINUTES))
        .path("/")
        .finish()
}

pub fn refresh_cookie(token: String) -> Cookie<'static> {
    Cookie::build(REFRESH_COOKIE, token)
        .http_only(true)
        .secure(false)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(REFRESH_TOKEN_EXPIRE_DAYS))
        .path("/")
        .finish()
}

pub fn set_auth_cookies(jar: CookieJar, access: String, refresh: String) -> CookieJar {
    jar.add(access_cookie(access)).add(refresh_cookie(refresh))
}

/// Emits expired cookies even when the request carried none.
pub fn clear_auth_cookies(jar: CookieJar) -> CookieJar {
    jar.add(removal_cookie(ACCESS_COOKIE))
        .add(removal_cookie(REFRESH_COOKIE))
}

fn removal_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = Cookie::build(name, "").path("/").finish();
    cookie.make_removal();
    cookie
}

/// Extracts the authenticated student from the request cookies.
///
/// Handlers taking this must pass their response jar through
/// [`CurrentStudent::attach`] or [`CurrentStudent::respond`] so a re-minted
/// access token reaches the client.
#[derive(Debug, Clone)]
pub struct CurrentStudent(pub Session);

impl CurrentStudent {
    pub fn student(&self) -> &Student {
        &self.0.student
    }

    pub fn attach(&self, jar: CookieJar) -> CookieJar {
        match &self.0.refreshed {
            Some(access) => jar.add(access_cookie(access.clone())),
            None => jar,
        }
    }

    /// Pairs a handler outcome with the attached jar, so a re-minted access
    /// token is sent on error responses as well.
    pub fn respond<T>(
        &self,
        jar: CookieJar,
        result: Result<T, Error>,
    ) -> (CookieJar, Result<T, Error>) {
        (self.attach(jar), result)
    }
}

#[async_trait]
impl<B> FromRequest<B> for CurrentStudent
where
    B: Send,
{
    type Rejection = Error;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let Extension(state) = Extension::<AppState>::from_request(req)
            .await
            .map_err(|err| Error::InternalError {
                kind: "StateError",
                message: err.to_string(),
            })?;
        let jar = match CookieJar::from_request(req).await {
            Ok(jar) => jar,
            Err(never) => match never {},
        };

        let access = jar.get(ACCESS_COOKIE).map(|c| c.value().to_string());
        let refresh = jar.get(REFRESH_COOKIE).map(|c| c.value().to_string());
        let session = negotiate(
            &state.tokens,
            state.store.as_ref(),
            access.as_deref(),
            refresh.as_deref(),
        )
        .await?;
        Ok(CurrentStudent(session))
    }
}
