use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{ IntoResponse, Redirect, Response };
use axum_extra::extract::cookie::{ Cookie, CookieJar, SameSite };
use log::debug;
use time::Duration;

use crate::error::ApiError;

pub const AUTH_COOKIE_NAME: &str = "gemini-chat-auth";
pub const AUTH_COOKIE_VALUE: &str = "authenticated";
pub const AUTH_COOKIE_MAX_AGE_DAYS: i64 = 7;

/// Builds the logged-in session cookie. The `Secure` attribute is a
/// deployment switch; plain-HTTP setups leave it off.
pub fn session_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE_NAME, AUTH_COOKIE_VALUE))
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(secure)
        .max_age(Duration::days(AUTH_COOKIE_MAX_AGE_DAYS))
        .path("/")
        .build()
}

/// Cookie handed to `CookieJar::remove`; it must carry the same path the
/// session cookie was set with or browsers keep the original.
pub fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::new(AUTH_COOKIE_NAME, "");
    cookie.set_path("/");
    cookie
}

pub fn is_authenticated(jar: &CookieJar) -> bool {
    jar.get(AUTH_COOKIE_NAME)
        .map(|cookie| cookie.value() == AUTH_COOKIE_VALUE)
        .unwrap_or(false)
}

/// Session guard wrapped around every route. Auth endpoints stay reachable;
/// otherwise browsers without a session land on the login page while API
/// callers get a JSON 401, and a logged-in visit to the login page bounces
/// back home.
pub async fn guard(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();

    if path.starts_with("/api/auth") {
        return next.run(request).await;
    }

    let jar = CookieJar::from_headers(request.headers());
    let authenticated = is_authenticated(&jar);
    let is_login_page = path == "/login";

    if !authenticated {
        if is_login_page {
            return next.run(request).await;
        }
        if path.starts_with("/api") {
            debug!("Rejecting unauthenticated request to {}", path);
            return ApiError::Unauthorized.into_response();
        }
        return Redirect::temporary("/login").into_response();
    }

    if is_login_page {
        return Redirect::temporary("/").into_response();
    }
    next.run(request).await
}
