use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::sse::{ Event, KeepAlive, Sse };
use axum::response::Html;
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use futures::stream::Stream;
use futures_util::StreamExt;
use log::{ info, warn };
use std::convert::Infallible;

use super::AppState;
use crate::auth;
use crate::error::ApiError;
use crate::models::api::{ ChatRequest, ChatResponse, LoginRequest, LoginResponse };

pub async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let Json(request) = payload?;
    let password = request.password.unwrap_or_default();
    if password.is_empty() {
        return Err(ApiError::Validation("Password is required".to_string()));
    }
    if password != state.args.admin_password {
        warn!("Login rejected: wrong password");
        return Err(ApiError::InvalidPassword);
    }

    info!("Login accepted, issuing session cookie");
    let jar = jar.add(auth::session_cookie(state.args.secure_cookies));
    Ok((jar, Json(LoginResponse { success: true })))
}

pub async fn logout_handler(jar: CookieJar) -> (CookieJar, Json<LoginResponse>) {
    (jar.remove(auth::removal_cookie()), Json(LoginResponse { success: true }))
}

fn validate(request: &ChatRequest) -> Result<(), ApiError> {
    if request.message.is_empty() {
        return Err(ApiError::Validation("Message is required".to_string()));
    }
    Ok(())
}

pub async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload?;
    validate(&request)?;
    let message = state.relay.chat(&request).await?;
    Ok(Json(ChatResponse { message, success: true }))
}

/// Relays the model reply as server-sent events, one JSON object per `data:`
/// line. Once the 200 header is on the wire, upstream trouble arrives
/// in-band as an error event.
pub async fn chat_stream_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let Json(request) = payload?;
    validate(&request)?;
    let events = state.relay.chat_stream(request).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().data(data))
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

// The real frontend is built and served separately; these placeholder pages
// back the `/` and `/login` routes.
const INDEX_PAGE: &str =
    r#"<!DOCTYPE html>
<html lang="ja">
<head><meta charset="utf-8"><title>Gemini Chat</title></head>
<body>
  <h1>Gemini Chat</h1>
  <p>POST /api/chat/stream でモデルと対話できます。</p>
</body>
</html>
"#;

const LOGIN_PAGE: &str =
    r#"<!DOCTYPE html>
<html lang="ja">
<head><meta charset="utf-8"><title>Gemini Chat - Login</title></head>
<body>
  <h1>ログイン</h1>
  <p>POST /api/auth/login にパスワードを送信してください。</p>
</body>
</html>
"#;

pub async fn index_page() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

pub async fn login_page() -> Html<&'static str> {
    Html(LOGIN_PAGE)
}
