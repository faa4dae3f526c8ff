use std::collections::BTreeMap;

use spin_sdk::http::{Method, Request, Response};
use uuid::Uuid;

use crate::config::*;
use crate::core::errors::ApiError;
use crate::core::helpers::{cookie_value, html_response, now_iso, verify_password};
use crate::core::query_params::{get_string, parse_form_body, parse_query_params};
use crate::core::store::KvStore;
use crate::models::models::{TokenData, User};
use crate::templates::{render, render_page};
use crate::users::{find_user_by_username, get_user};

/// Unparseable timestamps count as expired.
fn is_expired(created_at: &str) -> bool {
    match chrono::DateTime::parse_from_rfc3339(created_at) {
        Ok(created) => {
            let age_hours = (chrono::Utc::now() - created.with_timezone(&chrono::Utc)).num_hours();
            age_hours > token_expiration_hours()
        }
        Err(_) => true,
    }
}

/// Issues a session token and drops every expired one from the store.
pub fn issue_token<S: KvStore>(store: &S, user_id: &str) -> anyhow::Result<String> {
    let token = Uuid::new_v4().to_string();
    let data = TokenData {
        user_id: user_id.to_string(),
        created_at: now_iso(),
    };
    store.set_json(&token_key(&token), &data)?;

    let expired = store.update_json(TOKENS_INDEX_KEY, |tokens: &mut BTreeMap<String, String>| {
        let expired: Vec<String> = tokens
            .iter()
            .filter(|(_, created_at)| is_expired(created_at))
            .map(|(t, _)| t.clone())
            .collect();
        for t in &expired {
            tokens.remove(t);
        }
        tokens.insert(token.clone(), data.created_at.clone());
        expired
    })?;
    for t in &expired {
        store.delete(&token_key(t))?;
    }
    if !expired.is_empty() {
        tracing::debug!(count = expired.len(), "expired sessions swept");
    }
    Ok(token)
}

pub fn revoke_token<S: KvStore>(store: &S, token: &str) -> anyhow::Result<()> {
    store.delete(&token_key(token))?;
    store.update_json(TOKENS_INDEX_KEY, |tokens: &mut BTreeMap<String, String>| {
        tokens.remove(token);
    })
}

/// Session token from `Authorization: Bearer` or the session cookie.
pub fn request_token(req: &Request) -> Option<String> {
    let bearer = req
        .header("Authorization")
        .and_then(|h| h.as_str())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string());
    bearer
        .or_else(|| cookie_value(req, SESSION_COOKIE))
        .filter(|t| !t.is_empty())
}

pub fn validate_token<S: KvStore>(store: &S, req: &Request) -> anyhow::Result<Option<String>> {
    let token = match request_token(req) {
        Some(t) => t,
        None => return Ok(None),
    };
    let data = match store.get_json::<TokenData>(&token_key(&token))? {
        Some(d) => d,
        None => return Ok(None),
    };

    if is_expired(&data.created_at) {
        revoke_token(store, &token)?;
        return Ok(None);
    }
    Ok(Some(data.user_id))
}

/// The logged-in user, if the token is valid and the user still exists.
pub fn current_user<S: KvStore>(store: &S, req: &Request) -> anyhow::Result<Option<User>> {
    match validate_token(store, req)? {
        Some(user_id) => get_user(store, &user_id),
        None => Ok(None),
    }
}

/// Only local absolute paths are accepted as a post-login target.
fn safe_next(next: Option<String>) -> String {
    next.filter(|n| n.starts_with('/') && !n.starts_with("//"))
        .unwrap_or_else(|| "/".to_string())
}

/// Issues a token, sets the session cookie and redirects to `next`.
pub fn start_session<S: KvStore>(store: &S, user: &User, next: &str) -> anyhow::Result<Response> {
    let token = issue_token(store, &user.id)?;
    tracing::info!(username = %user.username, "session started");
    Ok(Response::builder()
        .status(302)
        .header("Location", next)
        .header(
            "Set-Cookie",
            format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, token),
        )
        .body(Vec::new())
        .build())
}

fn render_login(next: &str, username: &str, error: bool) -> anyhow::Result<String> {
    let errors = if error {
        r#"<p class="errors">Пожалуйста, введите правильные имя пользователя и пароль.</p>"#.to_string()
    } else {
        String::new()
    };
    let content = render("users/login.html", &[
        ("next", html_escape::encode_double_quoted_attribute(next).to_string()),
        ("username", html_escape::encode_double_quoted_attribute(username).to_string()),
        ("errors", errors),
    ])?;
    render_page("Войти", None, content)
}

/// `/auth/login/`
pub fn login_user<S: KvStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let query = parse_query_params(&req.uri());
    match req.method() {
        Method::Get => {
            let next = safe_next(get_string(&query, "next", None));
            Ok(html_response(200, render_login(&next, "", false)?))
        }
        Method::Post => {
            let fields = parse_form_body(req);
            let next = safe_next(get_string(&fields, "next", None).or_else(|| get_string(&query, "next", None)));
            let username = get_string(&fields, "username", Some("")).unwrap_or_default();
            let password = get_string(&fields, "password", Some("")).unwrap_or_default();

            match find_user_by_username(store, &username)? {
                Some(user) if verify_password(&password, &user.password) => start_session(store, &user, &next),
                _ => {
                    tracing::warn!(%username, "failed login");
                    Ok(html_response(200, render_login(&next, &username, true)?))
                }
            }
        }
        _ => Ok(ApiError::MethodNotAllowed.into()),
    }
}

/// `/auth/logout/`
pub fn logout_user<S: KvStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    if let Some(token) = request_token(req) {
        revoke_token(store, &token)?;
    }
    let content = render("users/logged_out.html", &[])?;
    Ok(Response::builder()
        .status(200)
        .header("Content-Type", "text/html; charset=utf-8")
        .header(
            "Set-Cookie",
            format!("{}=; Path=/; HttpOnly; Max-Age=0", SESSION_COOKIE),
        )
        .body(render_page("Вы вышли", None, content)?)
        .build())
}
