use spin_sdk::http::{Request, Response};

use crate::auth::current_user;
use crate::core::helpers::html_response;
use crate::core::store::KvStore;
use crate::templates::{render, render_page};

fn static_page<S: KvStore>(store: &S, req: &Request, template: &str, title: &str) -> anyhow::Result<Response> {
    let viewer = current_user(store, req)?;
    let content = render(template, &[])?;
    Ok(html_response(200, render_page(title, viewer.as_ref(), content)?))
}

/// `/about/author/`
pub fn about_author<S: KvStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    static_page(store, req, "about/author.html", "Об авторе проекта")
}

/// `/about/tech/`
pub fn about_tech<S: KvStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    static_page(store, req, "about/tech.html", "Технологии")
}
