use spin_sdk::http::{Method, Request, Response};
use html_escape::encode_text;
use uuid::Uuid;

use crate::auth::current_user;
use crate::config::*;
use crate::core::errors::ApiError;
use crate::core::helpers::{display_date, now_iso, redirect, redirect_to_login, request_path};
use crate::core::query_params::parse_form_body;
use crate::core::store::KvStore;
use crate::forms::CommentForm;
use crate::models::models::{Comment, CommentView, Post, User};
use crate::posts::get_post;
use crate::templates::{profile_url, render, render_text};
use crate::users::get_user;

pub fn create_comment<S: KvStore>(store: &S, post: &Post, author: &User, text: String) -> anyhow::Result<Comment> {
    let comment = Comment {
        id: Uuid::new_v4().to_string(),
        post_id: post.id.clone(),
        author_id: author.id.clone(),
        text,
        created_at: now_iso(),
    };
    store.set_json(&comment_key(&comment.id), &comment)?;

    store.update_json(&post_comments_key(&post.id), |ids: &mut Vec<String>| {
        ids.push(comment.id.clone())
    })?;

    tracing::info!(post_id = %post.id, author = %author.username, "comment added");
    Ok(comment)
}

/// Comments of a post in the order they were written.
pub fn comments_for_post<S: KvStore>(store: &S, post_id: &str) -> anyhow::Result<Vec<CommentView>> {
    let ids: Vec<String> = store.get_json(&post_comments_key(post_id))?.unwrap_or_default();
    let mut comments = Vec::with_capacity(ids.len());
    for id in ids {
        let comment = match store.get_json::<Comment>(&comment_key(&id))? {
            Some(c) => c,
            None => continue,
        };
        if let Some(author) = get_user(store, &comment.author_id)? {
            comments.push(CommentView { comment, author });
        }
    }
    Ok(comments)
}

pub fn delete_comments_for_post<S: KvStore>(store: &S, post_id: &str) -> anyhow::Result<()> {
    let list_key = post_comments_key(post_id);
    let ids: Vec<String> = store.get_json(&list_key)?.unwrap_or_default();
    for id in ids {
        store.delete(&comment_key(&id))?;
    }
    store.delete(&list_key)
}

pub fn render_comments(comments: &[CommentView]) -> anyhow::Result<String> {
    comments
        .iter()
        .map(|c| {
            render("includes/comment.html", &[
                ("author_url", profile_url(&c.author)),
                ("author_name", encode_text(&c.author.username).to_string()),
                ("date", display_date(&c.comment.created_at)),
                ("text", render_text(&c.comment.text)),
            ])
        })
        .collect::<anyhow::Result<Vec<_>>>()
        .map(|parts| parts.join("\n"))
}

/// `/posts/<id>/comment/`: always lands back on the post page.
pub fn add_comment<S: KvStore>(store: &S, req: &Request, post_id: &str) -> anyhow::Result<Response> {
    let viewer = match current_user(store, req)? {
        Some(u) => u,
        None => return Ok(redirect_to_login(&request_path(req))),
    };
    if !matches!(req.method(), Method::Post) {
        return Ok(ApiError::MethodNotAllowed.into());
    }
    let post = match get_post(store, post_id)? {
        Some(p) => p,
        None => return Ok(ApiError::NotFound(request_path(req)).into()),
    };

    match CommentForm::from_fields(&parse_form_body(req)).validate() {
        Ok(text) => {
            create_comment(store, &post, &viewer, text)?;
        }
        Err(errors) => {
            tracing::debug!(?errors, "comment rejected");
        }
    }
    Ok(redirect(&format!("/posts/{}/", post.id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::MemoryStore;
    use crate::forms::{CleanedPost, SignupForm};
    use crate::posts::{create_post, delete_post};
    use crate::users::create_user;

    #[test]
    fn comments_keep_writing_order_and_go_with_the_post() {
        let store = MemoryStore::new();
        let user = create_user(&store, &SignupForm {
            username: "auth".into(),
            password: "long-enough".into(),
            ..Default::default()
        })
        .unwrap();
        let post = create_post(&store, &user, CleanedPost {
            text: "Тестовый пост для комментария".into(),
            group_id: None,
            image: None,
        })
        .unwrap();

        let first = create_comment(&store, &post, &user, "first".into()).unwrap();
        create_comment(&store, &post, &user, "second".into()).unwrap();

        let comments = comments_for_post(&store, &post.id).unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].comment, first);
        assert_eq!(comments[1].author, user);

        delete_post(&store, &post.id).unwrap();
        assert!(comments_for_post(&store, &post.id).unwrap().is_empty());
        assert!(store.get_json::<Comment>(&comment_key(&first.id)).unwrap().is_none());
    }
}
