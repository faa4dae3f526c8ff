use spin_sdk::http::{Method, Request, Response};

pub mod about;
pub mod auth;
pub mod cache;
pub mod comments;
pub mod config;
pub mod core;
pub mod follow;
pub mod forms;
pub mod groups;
pub mod models;
pub mod posts;
pub mod static_server;
pub mod templates;
pub mod users;

use crate::core::errors::ApiError;
use crate::core::helpers::request_path;
use crate::core::store::KvStore;

// === Component entrypoint ===
#[cfg(target_arch = "wasm32")]
#[spin_sdk::http_component]
fn handle_yatube(req: Request) -> anyhow::Result<impl spin_sdk::http::IntoResponse> {
    let store = spin_sdk::key_value::Store::open_default()?;
    Ok(handle(&store, req))
}

/// Routes a request to its view. Never fails: errors become a 500 page.
pub fn handle<S: KvStore>(store: &S, req: Request) -> Response {
    let path = request_path(&req);
    match dispatch(store, &req, &path) {
        Ok(resp) => resp,
        Err(e) => {
            tracing::error!(%path, error = %e, "request failed");
            ApiError::InternalError("Внутренняя ошибка сервера".to_string()).into()
        }
    }
}

fn dispatch<S: KvStore>(store: &S, req: &Request, path: &str) -> anyhow::Result<Response> {
    if path.starts_with("/static/") {
        return static_server::serve_static(path);
    }

    let segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| urlencoding::decode(s).map(|d| d.into_owned()).unwrap_or_else(|_| s.to_string()))
        .collect();
    let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
    let is_get = matches!(req.method(), Method::Get | Method::Head);

    match segments.as_slice() {
        [] if is_get => posts::index(store, req),
        ["group", slug] if is_get => posts::group_posts(store, req, slug),
        ["profile", username] if is_get => posts::profile(store, req, username),
        ["profile", username, "follow"] => follow::profile_follow(store, req, username),
        ["profile", username, "unfollow"] => follow::profile_unfollow(store, req, username),
        ["posts", post_id] if is_get => posts::post_detail(store, req, post_id),
        ["posts", post_id, "edit"] => posts::post_edit(store, req, post_id),
        ["posts", post_id, "comment"] => comments::add_comment(store, req, post_id),
        ["create"] => posts::post_create(store, req),
        ["follow"] if is_get => follow::follow_index(store, req),
        ["about", "author"] if is_get => about::about_author(store, req),
        ["about", "tech"] if is_get => about::about_tech(store, req),
        ["auth", "signup"] => users::signup(store, req),
        ["auth", "login"] => auth::login_user(store, req),
        ["auth", "logout"] => auth::logout_user(store, req),
        _ => Ok(ApiError::NotFound(path.to_string()).into()),
    }
}
