use std::collections::HashMap;

use spin_sdk::http::{Method, Request, Response};
use html_escape::{encode_double_quoted_attribute, encode_text};
use uuid::Uuid;

use crate::auth::current_user;
use crate::cache;
use crate::comments::{comments_for_post, delete_comments_for_post, render_comments};
use crate::config::*;
use crate::core::errors::ApiError;
use crate::core::helpers::{display_date, html_response, now_iso, redirect, redirect_to_login, request_path, validate_uuid};
use crate::core::paginator::{page_count, page_param, paginate, resolve_page, Paginator};
use crate::core::query_params::parse_form_body;
use crate::core::store::KvStore;
use crate::follow::{get_followers, get_followings, is_following};
use crate::forms::{CleanedPost, FieldErrors, PostForm};
use crate::groups::{get_group, get_group_by_slug, list_groups};
use crate::models::models::{Group, Post, PostView, User};
use crate::templates::{
    profile_url, render, render_field_errors, render_image, render_page, render_paginator,
    render_post_list, render_text,
};
use crate::users::{find_user_by_username, get_user};

// === Storage ===

pub fn create_post<S: KvStore>(store: &S, author: &User, cleaned: CleanedPost) -> anyhow::Result<Post> {
    let post = Post {
        id: Uuid::new_v4().to_string(),
        author_id: author.id.clone(),
        text: cleaned.text,
        group_id: cleaned.group_id,
        image: cleaned.image,
        created_at: now_iso(),
        updated_at: None,
    };
    store.set_json(&post_key(&post.id), &post)?;

    store.update_json(FEED_KEY, |feed: &mut Vec<String>| feed.insert(0, post.id.clone()))?;

    tracing::info!(post_id = %post.id, author = %author.username, "post created");
    Ok(post)
}

/// Applies edited fields. A blank image keeps the current one.
pub fn update_post<S: KvStore>(store: &S, mut post: Post, cleaned: CleanedPost) -> anyhow::Result<Post> {
    post.text = cleaned.text;
    post.group_id = cleaned.group_id;
    if cleaned.image.is_some() {
        post.image = cleaned.image;
    }
    post.updated_at = Some(now_iso());
    store.set_json(&post_key(&post.id), &post)?;

    tracing::info!(post_id = %post.id, "post edited");
    Ok(post)
}

pub fn get_post<S: KvStore>(store: &S, id: &str) -> anyhow::Result<Option<Post>> {
    if !validate_uuid(id) {
        return Ok(None);
    }
    store.get_json(&post_key(id))
}

/// Removes a post and its comments. Returns false if it did not exist.
pub fn delete_post<S: KvStore>(store: &S, id: &str) -> anyhow::Result<bool> {
    if get_post(store, id)?.is_none() {
        return Ok(false);
    }
    store.delete(&post_key(id))?;
    delete_comments_for_post(store, id)?;

    store.update_json(FEED_KEY, |feed: &mut Vec<String>| feed.retain(|p| p != id))?;

    tracing::info!(post_id = %id, "post deleted");
    Ok(true)
}

/// Every post, newest first.
pub fn all_posts<S: KvStore>(store: &S) -> anyhow::Result<Vec<Post>> {
    let feed: Vec<String> = store.get_json(FEED_KEY)?.unwrap_or_default();
    let mut posts = Vec::with_capacity(feed.len());
    for id in feed {
        if let Some(p) = store.get_json::<Post>(&post_key(&id))? {
            posts.push(p);
        }
    }
    Ok(posts)
}

pub fn count_posts<S: KvStore>(store: &S) -> anyhow::Result<usize> {
    Ok(all_posts(store)?.len())
}

pub fn posts_by_author<S: KvStore>(store: &S, author_id: &str) -> anyhow::Result<Vec<Post>> {
    Ok(all_posts(store)?.into_iter().filter(|p| p.author_id == author_id).collect())
}

pub fn posts_in_group<S: KvStore>(store: &S, group_id: &str) -> anyhow::Result<Vec<Post>> {
    Ok(all_posts(store)?
        .into_iter()
        .filter(|p| p.group_id.as_deref() == Some(group_id))
        .collect())
}

/// Posts written by any of `author_ids`, newest first.
pub fn posts_by_authors<S: KvStore>(store: &S, author_ids: &[String]) -> anyhow::Result<Vec<Post>> {
    Ok(all_posts(store)?
        .into_iter()
        .filter(|p| author_ids.contains(&p.author_id))
        .collect())
}

/// Joins authors and groups onto posts. Posts whose author is gone are skipped.
pub fn to_views<S: KvStore>(store: &S, posts: Vec<Post>) -> anyhow::Result<Vec<PostView>> {
    let mut authors: HashMap<String, User> = HashMap::new();
    let mut groups: HashMap<String, Group> = HashMap::new();
    let mut views = Vec::with_capacity(posts.len());

    for post in posts {
        if !authors.contains_key(&post.author_id) {
            match get_user(store, &post.author_id)? {
                Some(u) => {
                    authors.insert(u.id.clone(), u);
                }
                None => {
                    tracing::warn!(post_id = %post.id, "post author missing");
                    continue;
                }
            }
        }
        let author = authors[&post.author_id].clone();

        let group = match &post.group_id {
            Some(gid) => {
                if !groups.contains_key(gid) {
                    if let Some(g) = get_group(store, gid)? {
                        groups.insert(g.id.clone(), g);
                    }
                }
                groups.get(gid).cloned()
            }
            None => None,
        };

        views.push(PostView { post, author, group });
    }
    Ok(views)
}

// === Views ===

/// `/`: every post, served through the page cache.
pub fn index<S: KvStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let viewer = current_user(store, req)?;
    // Keyed by the resolved page so stray query strings share one entry.
    let feed_len = store.get_json::<Vec<String>>(FEED_KEY)?.map(|f| f.len()).unwrap_or(0);
    let number = resolve_page(page_param(req).as_deref(), page_count(feed_len, posts_per_page()));
    let key = format!(
        "index_page:{}:{}",
        viewer.as_ref().map(|u| u.id.as_str()).unwrap_or("anonymous"),
        number
    );

    let body = cache::cached_page(store, &key, index_cache_seconds(), || {
        let page = Paginator::new(to_views(store, all_posts(store)?)?, posts_per_page())
            .get_page(Some(number.to_string().as_str()));
        let content = render("posts/index.html", &[
            ("posts", render_post_list(&page, true)?),
            ("paginator", render_paginator(&page)),
        ])?;
        render_page("Последние обновления на сайте", viewer.as_ref(), content)
    })?;

    Ok(html_response(200, body))
}

/// `/group/<slug>/`
pub fn group_posts<S: KvStore>(store: &S, req: &Request, slug: &str) -> anyhow::Result<Response> {
    let group = match get_group_by_slug(store, slug)? {
        Some(g) => g,
        None => return Ok(ApiError::NotFound(request_path(req)).into()),
    };
    let viewer = current_user(store, req)?;

    let page = paginate(req, to_views(store, posts_in_group(store, &group.id)?)?);
    let content = render("posts/group_list.html", &[
        ("title", encode_text(&group.title).to_string()),
        ("description", render_text(&group.description)),
        ("posts", render_post_list(&page, false)?),
        ("paginator", render_paginator(&page)),
    ])?;

    Ok(html_response(200, render_page(&format!("Записи сообщества {}", group.title), viewer.as_ref(), content)?))
}

/// `/profile/<username>/`
pub fn profile<S: KvStore>(store: &S, req: &Request, username: &str) -> anyhow::Result<Response> {
    let author = match find_user_by_username(store, username)? {
        Some(u) => u,
        None => return Ok(ApiError::NotFound(request_path(req)).into()),
    };
    let viewer = current_user(store, req)?;

    let posts = posts_by_author(store, &author.id)?;
    let post_count = posts.len();
    let page = paginate(req, to_views(store, posts)?);

    let follow_button = match &viewer {
        Some(v) if v.id != author.id => {
            let url = profile_url(&author);
            if is_following(store, &v.id, &author.id)? {
                format!(r#"<a class="btn btn-light" href="{}unfollow/" role="button">Отписаться</a>"#, url)
            } else {
                format!(r#"<a class="btn btn-primary" href="{}follow/" role="button">Подписаться</a>"#, url)
            }
        }
        _ => String::new(),
    };

    let content = render("posts/profile.html", &[
        ("author_name", encode_text(&author.display_name()).to_string()),
        ("post_count", post_count.to_string()),
        ("follower_count", get_followers(store, &author.id)?.len().to_string()),
        ("following_count", get_followings(store, &author.id)?.len().to_string()),
        ("follow_button", follow_button),
        ("posts", render_post_list(&page, true)?),
        ("paginator", render_paginator(&page)),
    ])?;

    Ok(html_response(200, render_page(
        &format!("Профайл пользователя {}", author.display_name()),
        viewer.as_ref(),
        content,
    )?))
}

/// `/posts/<id>/`
pub fn post_detail<S: KvStore>(store: &S, req: &Request, post_id: &str) -> anyhow::Result<Response> {
    let view = match get_post(store, post_id)? {
        Some(p) => to_views(store, vec![p])?.pop(),
        None => None,
    };
    let view = match view {
        Some(v) => v,
        None => return Ok(ApiError::NotFound(request_path(req)).into()),
    };
    let viewer = current_user(store, req)?;

    let group = view
        .group
        .as_ref()
        .map(|g| {
            format!(
                r#"<li>Группа: <a href="/group/{}/">{}</a></li>"#,
                urlencoding::encode(&g.slug),
                encode_text(&g.title)
            )
        })
        .unwrap_or_default();

    let is_author = viewer.as_ref().map(|v| v.id == view.author.id).unwrap_or(false);
    let edit_link = if is_author {
        format!(r#"<a class="btn btn-primary" href="/posts/{}/edit/">редактировать запись</a>"#, view.post.id)
    } else {
        String::new()
    };

    let comment_form = if viewer.is_some() {
        render("includes/comment_form.html", &[("post_id", view.post.id.clone())])?
    } else {
        String::new()
    };

    let comments = comments_for_post(store, &view.post.id)?;
    let content = render("posts/post_detail.html", &[
        ("date", display_date(&view.post.created_at)),
        ("group", group),
        ("author_name", encode_text(&view.author.display_name()).to_string()),
        ("author_post_count", posts_by_author(store, &view.author.id)?.len().to_string()),
        ("author_url", profile_url(&view.author)),
        ("image", render_image(view.post.image.as_deref())),
        ("text", render_text(&view.post.text)),
        ("edit_link", edit_link),
        ("comment_form", comment_form),
        ("comments", render_comments(&comments)?),
    ])?;

    let title: String = view.post.text.chars().take(30).collect();
    Ok(html_response(200, render_page(&format!("Пост {}", title), viewer.as_ref(), content)?))
}

fn render_post_form<S: KvStore>(
    store: &S,
    viewer: &User,
    form: &PostForm,
    errors: &FieldErrors,
    edit_post_id: Option<&str>,
) -> anyhow::Result<String> {
    let mut options = vec![format!(
        r#"<option value=""{}>{}</option>"#,
        if form.group.is_empty() { " selected" } else { "" },
        PostForm::GROUP_EMPTY_LABEL
    )];
    for group in list_groups(store)? {
        options.push(format!(
            r#"<option value="{}"{}>{}</option>"#,
            encode_double_quoted_attribute(&group.id),
            if form.group == group.id { " selected" } else { "" },
            encode_text(&group.title)
        ));
    }

    let (heading, action, submit) = match edit_post_id {
        Some(id) => ("Редактировать пост", format!("/posts/{}/edit/", id), "Сохранить"),
        None => ("Новый пост", "/create/".to_string(), "Добавить"),
    };

    let content = render("posts/create_post.html", &[
        ("heading", heading.to_string()),
        ("action", action),
        ("text_label", PostForm::TEXT_LABEL.to_string()),
        ("text_help", PostForm::TEXT_HELP.to_string()),
        ("text", encode_text(&form.text).to_string()),
        ("text_errors", render_field_errors(errors, "text")),
        ("group_label", PostForm::GROUP_LABEL.to_string()),
        ("group_help", PostForm::GROUP_HELP.to_string()),
        ("group_options", options.join("\n")),
        ("group_errors", render_field_errors(errors, "group")),
        ("image", encode_double_quoted_attribute(&form.image).to_string()),
        ("image_errors", render_field_errors(errors, "image")),
        ("submit", submit.to_string()),
    ])?;
    render_page(heading, Some(viewer), content)
}

/// `/create/`: on success redirects to the author's profile.
pub fn post_create<S: KvStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let viewer = match current_user(store, req)? {
        Some(u) => u,
        None => return Ok(redirect_to_login(&request_path(req))),
    };

    match req.method() {
        Method::Get => Ok(html_response(
            200,
            render_post_form(store, &viewer, &PostForm::default(), &FieldErrors::new(), None)?,
        )),
        Method::Post => {
            let form = PostForm::from_fields(&parse_form_body(req));
            match form.validate(store)? {
                Ok(cleaned) => {
                    create_post(store, &viewer, cleaned)?;
                    Ok(redirect(&profile_url(&viewer)))
                }
                Err(errors) => Ok(html_response(200, render_post_form(store, &viewer, &form, &errors, None)?)),
            }
        }
        _ => Ok(ApiError::MethodNotAllowed.into()),
    }
}

/// `/posts/<id>/edit/`: only the author may edit, others go back to the post.
pub fn post_edit<S: KvStore>(store: &S, req: &Request, post_id: &str) -> anyhow::Result<Response> {
    let viewer = match current_user(store, req)? {
        Some(u) => u,
        None => return Ok(redirect_to_login(&request_path(req))),
    };
    let post = match get_post(store, post_id)? {
        Some(p) => p,
        None => return Ok(ApiError::NotFound(request_path(req)).into()),
    };
    let detail_url = format!("/posts/{}/", post.id);
    if post.author_id != viewer.id {
        return Ok(redirect(&detail_url));
    }

    match req.method() {
        Method::Get => Ok(html_response(
            200,
            render_post_form(store, &viewer, &PostForm::from_post(&post), &FieldErrors::new(), Some(&post.id))?,
        )),
        Method::Post => {
            let form = PostForm::from_fields(&parse_form_body(req));
            match form.validate(store)? {
                Ok(cleaned) => {
                    update_post(store, post, cleaned)?;
                    Ok(redirect(&detail_url))
                }
                Err(errors) => Ok(html_response(
                    200,
                    render_post_form(store, &viewer, &form, &errors, Some(&post.id))?,
                )),
            }
        }
        _ => Ok(ApiError::MethodNotAllowed.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::MemoryStore;
    use crate::forms::SignupForm;
    use crate::groups::create_group;
    use crate::users::create_user;

    fn author(store: &MemoryStore, name: &str) -> User {
        let form = SignupForm {
            username: name.into(),
            password: "long-enough".into(),
            ..Default::default()
        };
        create_user(store, &form).unwrap()
    }

    fn cleaned(text: &str, group: Option<&Group>) -> CleanedPost {
        CleanedPost {
            text: text.to_string(),
            group_id: group.map(|g| g.id.clone()),
            image: None,
        }
    }

    #[test]
    fn newest_posts_come_first() {
        let store = MemoryStore::new();
        let user = author(&store, "auth");
        create_post(&store, &user, cleaned("first", None)).unwrap();
        create_post(&store, &user, cleaned("second", None)).unwrap();

        let texts: Vec<_> = all_posts(&store).unwrap().into_iter().map(|p| p.text).collect();
        assert_eq!(texts, vec!["second", "first"]);
    }

    #[test]
    fn concurrent_creates_all_reach_the_feed() {
        let store = MemoryStore::new();
        let user = author(&store, "auth");

        std::thread::scope(|s| {
            for t in 0..8 {
                let (store, user) = (&store, &user);
                s.spawn(move || {
                    for i in 0..50 {
                        create_post(store, user, cleaned(&format!("post {} {}", t, i), None)).unwrap();
                    }
                });
            }
        });

        assert_eq!(count_posts(&store).unwrap(), 400);
        assert_eq!(posts_by_author(&store, &user.id).unwrap().len(), 400);
    }

    #[test]
    fn group_filter_keeps_only_that_group() {
        let store = MemoryStore::new();
        let user = author(&store, "auth");
        let a = create_group(&store, "A", "group-a", "").unwrap();
        let b = create_group(&store, "B", "group-b", "").unwrap();
        create_post(&store, &user, cleaned("in a", Some(&a))).unwrap();
        create_post(&store, &user, cleaned("in b", Some(&b))).unwrap();
        create_post(&store, &user, cleaned("nowhere", None)).unwrap();

        let in_a = posts_in_group(&store, &a.id).unwrap();
        assert_eq!(in_a.len(), 1);
        assert_eq!(in_a[0].text, "in a");
    }

    #[test]
    fn update_keeps_image_when_none_given() {
        let store = MemoryStore::new();
        let user = author(&store, "auth");
        let mut first = cleaned("with image", None);
        first.image = Some("posts/small.gif".into());
        let post = create_post(&store, &user, first).unwrap();

        let edited = update_post(&store, post, cleaned("changed", None)).unwrap();
        assert_eq!(edited.text, "changed");
        assert_eq!(edited.image.as_deref(), Some("posts/small.gif"));
        assert!(edited.updated_at.is_some());
    }

    #[test]
    fn delete_removes_post_from_listing() {
        let store = MemoryStore::new();
        let user = author(&store, "auth");
        let post = create_post(&store, &user, cleaned("doomed", None)).unwrap();

        assert!(delete_post(&store, &post.id).unwrap());
        assert!(!delete_post(&store, &post.id).unwrap());
        assert_eq!(count_posts(&store).unwrap(), 0);
        assert!(get_post(&store, &post.id).unwrap().is_none());
    }

    #[test]
    fn views_carry_author_and_group() {
        let store = MemoryStore::new();
        let user = author(&store, "auth");
        let group = create_group(&store, "Тестовая группа", "test-slug", "").unwrap();
        create_post(&store, &user, cleaned("Тестовый пост", Some(&group))).unwrap();

        let views = to_views(&store, all_posts(&store).unwrap()).unwrap();
        assert_eq!(views[0].author, user);
        assert_eq!(views[0].group, Some(group));
    }

    #[test]
    fn non_uuid_ids_are_not_looked_up() {
        let store = MemoryStore::new();
        assert!(get_post(&store, "../../users_list").unwrap().is_none());
    }
}
