use std::collections::HashMap;
use std::sync::OnceLock;

use html_escape::{encode_double_quoted_attribute, encode_text};
use regex::Regex;
use rust_embed::RustEmbed;

use crate::core::helpers::display_date;
use crate::core::paginator::Page;
use crate::forms::FieldErrors;
use crate::models::models::{PostView, User};

#[derive(RustEmbed)]
#[folder = "templates"]
struct Templates;

fn placeholder_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"\{\{\s*([a-z_]+)\s*\}\}").expect("Regex should compile")
    })
}

fn url_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r#"https?://[^\s<>"']+"#).expect("Regex should compile")
    })
}

/// Renders an embedded template, substituting `{{ name }}` placeholders in a single
/// pass. Values are inserted verbatim, callers escape user text. Unknown
/// placeholders render empty.
pub fn render(name: &str, ctx: &[(&str, String)]) -> anyhow::Result<String> {
    let template = Templates::get(name)
        .ok_or_else(|| anyhow::anyhow!("Template {} not found", name))?
        .data
        .to_vec();
    let source = String::from_utf8(template)?;

    let values: HashMap<&str, &str> = ctx.iter().map(|(k, v)| (*k, v.as_str())).collect();
    let html = placeholder_regex().replace_all(&source, |caps: &regex::Captures| {
        values.get(&caps[1]).copied().unwrap_or_default().to_string()
    });
    Ok(html.into_owned())
}

/// Wraps page content into the site layout.
pub fn render_page(title: &str, viewer: Option<&User>, content: String) -> anyhow::Result<String> {
    render("base.html", &[
        ("title", encode_text(title).to_string()),
        ("nav", render_nav(viewer)),
        ("content", content),
        ("year", chrono::Utc::now().format("%Y").to_string()),
    ])
}

fn render_nav(viewer: Option<&User>) -> String {
    match viewer {
        Some(user) => format!(
            r#"<a href="/create/">Новая запись</a>
        <a href="/follow/">Избранные авторы</a>
        <a href="/profile/{}/">{}</a>
        <a href="/auth/logout/">Выйти</a>"#,
            urlencoding::encode(&user.username),
            encode_text(&user.username)
        ),
        None => r#"<a href="/auth/login/">Войти</a>
        <a href="/auth/signup/">Регистрация</a>"#
            .to_string(),
    }
}

pub fn render_not_found(path: &str) -> anyhow::Result<String> {
    let content = render("core/404.html", &[("path", encode_text(path).to_string())])?;
    render_page("Страница не найдена", None, content)
}

pub fn render_error(status: u16, message: &str) -> anyhow::Result<String> {
    let content = render("core/error.html", &[
        ("status", status.to_string()),
        ("message", encode_text(message).to_string()),
    ])?;
    render_page("Ошибка", None, content)
}

/// Escapes post or comment text, turns URLs into links and newlines into `<br>`.
pub fn render_text(text: &str) -> String {
    let mut linked = String::with_capacity(text.len());
    let mut last = 0;
    for m in url_regex().find_iter(text) {
        linked.push_str(&encode_text(&text[last..m.start()]));
        linked.push_str(&format!(
            r#"<a href="{}" target="_blank" rel="noopener noreferrer">{}</a>"#,
            encode_double_quoted_attribute(m.as_str()),
            encode_text(m.as_str())
        ));
        last = m.end();
    }
    linked.push_str(&encode_text(&text[last..]));
    linked.replace("\r\n", "\n").replace('\n', "<br>\n")
}

pub fn render_image(image: Option<&str>) -> String {
    image
        .map(|path| {
            format!(
                r#"<img class="card-img my-2" src="/media/{}" alt="">"#,
                encode_double_quoted_attribute(path)
            )
        })
        .unwrap_or_default()
}

pub fn profile_url(user: &User) -> String {
    format!("/profile/{}/", urlencoding::encode(&user.username))
}

/// One post in a listing. `group_link` is false on the group page itself.
pub fn render_post_card(view: &PostView, group_link: bool) -> anyhow::Result<String> {
    let group = match (&view.group, group_link) {
        (Some(group), true) => format!(
            r#"<a href="/group/{}/">все записи группы {}</a>"#,
            urlencoding::encode(&group.slug),
            encode_text(&group.title)
        ),
        _ => String::new(),
    };

    render("includes/post_card.html", &[
        ("author_name", encode_text(&view.author.display_name()).to_string()),
        ("author_url", profile_url(&view.author)),
        ("date", display_date(&view.post.created_at)),
        ("image", render_image(view.post.image.as_deref())),
        ("text", render_text(&view.post.text)),
        ("post_id", view.post.id.clone()),
        ("group_link", group),
    ])
}

pub fn render_post_list(page: &Page<PostView>, group_link: bool) -> anyhow::Result<String> {
    if page.is_empty() {
        return Ok(r#"<p class="empty">Записей пока нет.</p>"#.to_string());
    }
    let cards = page
        .iter()
        .map(|view| render_post_card(view, group_link))
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(cards.join("\n<hr>\n"))
}

pub fn render_paginator<T>(page: &Page<T>) -> String {
    if page.num_pages <= 1 {
        return String::new();
    }

    let mut links = Vec::new();
    if page.has_previous() {
        links.push(r#"<li><a href="?page=1">&laquo; первая</a></li>"#.to_string());
        links.push(format!(r#"<li><a href="?page={}">назад</a></li>"#, page.number - 1));
    }
    links.push(format!(
        r#"<li class="current">Страница {} из {}</li>"#,
        page.number, page.num_pages
    ));
    if page.has_next() {
        links.push(format!(r#"<li><a href="?page={}">вперёд</a></li>"#, page.number + 1));
        links.push(format!(
            r#"<li><a href="?page={}">последняя &raquo;</a></li>"#,
            page.num_pages
        ));
    }
    format!("<ul class=\"pagination\">\n{}\n</ul>", links.join("\n"))
}

pub fn render_field_errors(errors: &FieldErrors, field: &str) -> String {
    errors
        .get(field)
        .map(|messages| {
            messages
                .iter()
                .map(|m| format!(r#"<p class="field-error">{}</p>"#, encode_text(m)))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}
