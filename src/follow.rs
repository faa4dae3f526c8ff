use spin_sdk::http::{Request, Response};

use crate::auth::current_user;
use crate::config::*;
use crate::core::errors::ApiError;
use crate::core::helpers::{html_response, redirect, redirect_to_login, request_path};
use crate::core::paginator::paginate;
use crate::core::store::KvStore;
use crate::models::models::Followings;
use crate::posts::{posts_by_authors, to_views};
use crate::templates::{profile_url, render, render_page, render_paginator, render_post_list};
use crate::users::{find_user_by_username, list_user_ids};

/// Adds `following_id` to the follower's list. Following twice or following
/// yourself changes nothing; returns whether a follow was created.
pub fn follow_user<S: KvStore>(store: &S, follower_id: &str, following_id: &str) -> anyhow::Result<bool> {
    if follower_id == following_id {
        return Ok(false);
    }

    store.update_json(&followings_key(follower_id), |followings: &mut Followings| {
        if followings.iter().any(|id| id == following_id) {
            return false;
        }
        followings.push(following_id.to_string());
        true
    })
}

/// Returns whether a follow was removed.
pub fn unfollow_user<S: KvStore>(store: &S, follower_id: &str, following_id: &str) -> anyhow::Result<bool> {
    store.update_json(&followings_key(follower_id), |followings: &mut Followings| {
        let before = followings.len();
        followings.retain(|id| id != following_id);
        followings.len() != before
    })
}

pub fn get_followings<S: KvStore>(store: &S, user_id: &str) -> anyhow::Result<Followings> {
    Ok(store.get_json(&followings_key(user_id))?.unwrap_or_default())
}

pub fn get_followers<S: KvStore>(store: &S, user_id: &str) -> anyhow::Result<Vec<String>> {
    let mut followers = Vec::new();

    for id in list_user_ids(store)? {
        if get_followings(store, &id)?.iter().any(|f| f == user_id) {
            followers.push(id);
        }
    }

    Ok(followers)
}

pub fn is_following<S: KvStore>(store: &S, follower_id: &str, following_id: &str) -> anyhow::Result<bool> {
    Ok(get_followings(store, follower_id)?.iter().any(|id| id == following_id))
}

/// Number of (user, author) follow pairs in the store.
pub fn count_follows<S: KvStore>(store: &S) -> anyhow::Result<usize> {
    let mut total = 0;
    for id in list_user_ids(store)? {
        total += get_followings(store, &id)?.len();
    }
    Ok(total)
}

// === HTTP Handlers ===

/// `/profile/<username>/follow/`
pub fn profile_follow<S: KvStore>(store: &S, req: &Request, username: &str) -> anyhow::Result<Response> {
    let viewer = match current_user(store, req)? {
        Some(u) => u,
        None => return Ok(redirect_to_login(&request_path(req))),
    };
    let author = match find_user_by_username(store, username)? {
        Some(u) => u,
        None => return Ok(ApiError::NotFound(request_path(req)).into()),
    };

    if follow_user(store, &viewer.id, &author.id)? {
        tracing::info!(user = %viewer.username, author = %author.username, "followed");
    }
    Ok(redirect(&profile_url(&author)))
}

/// `/profile/<username>/unfollow/`
pub fn profile_unfollow<S: KvStore>(store: &S, req: &Request, username: &str) -> anyhow::Result<Response> {
    let viewer = match current_user(store, req)? {
        Some(u) => u,
        None => return Ok(redirect_to_login(&request_path(req))),
    };
    let author = match find_user_by_username(store, username)? {
        Some(u) => u,
        None => return Ok(ApiError::NotFound(request_path(req)).into()),
    };

    if unfollow_user(store, &viewer.id, &author.id)? {
        tracing::info!(user = %viewer.username, author = %author.username, "unfollowed");
    }
    Ok(redirect(&profile_url(&author)))
}

/// `/follow/`: posts of followed authors.
pub fn follow_index<S: KvStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let viewer = match current_user(store, req)? {
        Some(u) => u,
        None => return Ok(redirect_to_login(&request_path(req))),
    };

    let followings = get_followings(store, &viewer.id)?;
    let page = paginate(req, to_views(store, posts_by_authors(store, &followings)?)?);
    let content = render("posts/follow.html", &[
        ("posts", render_post_list(&page, true)?),
        ("paginator", render_paginator(&page)),
    ])?;

    Ok(html_response(200, render_page("Посты избранных авторов", Some(&viewer), content)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::MemoryStore;
    use crate::forms::SignupForm;
    use crate::users::create_user;

    fn user(store: &MemoryStore, name: &str) -> String {
        create_user(store, &SignupForm {
            username: name.into(),
            password: "long-enough".into(),
            ..Default::default()
        })
        .unwrap()
        .id
    }

    #[test]
    fn follow_is_idempotent_and_unfollow_restores_count() {
        let store = MemoryStore::new();
        let auth = user(&store, "auth");
        let noname = user(&store, "noname");
        let baseline = count_follows(&store).unwrap();

        assert!(follow_user(&store, &auth, &noname).unwrap());
        assert!(!follow_user(&store, &auth, &noname).unwrap());
        assert_eq!(count_follows(&store).unwrap(), baseline + 1);
        assert!(is_following(&store, &auth, &noname).unwrap());

        assert!(unfollow_user(&store, &auth, &noname).unwrap());
        assert!(!unfollow_user(&store, &auth, &noname).unwrap());
        assert_eq!(count_follows(&store).unwrap(), baseline);
    }

    #[test]
    fn concurrent_follows_are_all_kept() {
        let store = MemoryStore::new();
        let fan = user(&store, "fan");
        let authors: Vec<String> = (0..6).map(|i| user(&store, &format!("author{}", i))).collect();

        std::thread::scope(|s| {
            for author in &authors {
                let (store, fan) = (&store, &fan);
                s.spawn(move || follow_user(store, fan, author).unwrap());
            }
        });

        assert_eq!(get_followings(&store, &fan).unwrap().len(), authors.len());
    }

    #[test]
    fn users_cannot_follow_themselves() {
        let store = MemoryStore::new();
        let auth = user(&store, "auth");
        assert!(!follow_user(&store, &auth, &auth).unwrap());
        assert_eq!(count_follows(&store).unwrap(), 0);
    }

    #[test]
    fn followers_are_the_reverse_of_followings() {
        let store = MemoryStore::new();
        let a = user(&store, "a");
        let b = user(&store, "b");
        let c = user(&store, "c");
        follow_user(&store, &a, &c).unwrap();
        follow_user(&store, &b, &c).unwrap();

        assert_eq!(get_followers(&store, &c).unwrap(), vec![a.clone(), b]);
        assert_eq!(get_followings(&store, &a).unwrap(), vec![c]);
    }
}
