use spin_sdk::http::{Method, Request, Response};
use std::collections::BTreeMap;

use uuid::Uuid;

use crate::auth::{current_user, start_session};
use crate::config::*;
use crate::core::errors::ApiError;
use crate::core::helpers::{hash_password, html_response, redirect};
use crate::core::query_params::parse_form_body;
use crate::core::store::KvStore;
use crate::forms::{FieldErrors, SignupForm};
use crate::models::models::User;
use crate::templates::{render, render_field_errors, render_page};

/// Inserts a user. A taken username is an [`ApiError::Conflict`].
pub fn create_user<S: KvStore>(store: &S, form: &SignupForm) -> anyhow::Result<User> {
    let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
    let user = User {
        id: Uuid::new_v4().to_string(),
        username: form.username.clone(),
        password: hash_password(&form.password)?,
        first_name: non_empty(&form.first_name),
        last_name: non_empty(&form.last_name),
        email: non_empty(&form.email),
    };
    store.set_json(&user_key(&user.id), &user)?;

    let claimed = store.update_json(USERNAMES_KEY, |names: &mut BTreeMap<String, String>| {
        if names.contains_key(&user.username) {
            return false;
        }
        names.insert(user.username.clone(), user.id.clone());
        true
    })?;
    if !claimed {
        store.delete(&user_key(&user.id))?;
        return Err(ApiError::Conflict("Username exists".to_string()).into());
    }
    store.update_json(USERS_LIST_KEY, |ids: &mut Vec<String>| ids.push(user.id.clone()))?;

    tracing::info!(username = %user.username, "user created");
    Ok(user)
}

pub fn get_user<S: KvStore>(store: &S, id: &str) -> anyhow::Result<Option<User>> {
    store.get_json(&user_key(id))
}

pub fn list_user_ids<S: KvStore>(store: &S) -> anyhow::Result<Vec<String>> {
    Ok(store.get_json(USERS_LIST_KEY)?.unwrap_or_default())
}

pub fn find_user_by_username<S: KvStore>(store: &S, username: &str) -> anyhow::Result<Option<User>> {
    let names: BTreeMap<String, String> = store.get_json(USERNAMES_KEY)?.unwrap_or_default();
    match names.get(username) {
        Some(id) => get_user(store, id),
        None => Ok(None),
    }
}

fn render_signup(form: &SignupForm, errors: &FieldErrors) -> anyhow::Result<String> {
    let escape = |s: &str| html_escape::encode_double_quoted_attribute(s).to_string();
    let content = render("users/signup.html", &[
        ("first_name", escape(&form.first_name)),
        ("last_name", escape(&form.last_name)),
        ("username", escape(&form.username)),
        ("email", escape(&form.email)),
        ("first_name_errors", render_field_errors(errors, "first_name")),
        ("last_name_errors", render_field_errors(errors, "last_name")),
        ("username_errors", render_field_errors(errors, "username")),
        ("email_errors", render_field_errors(errors, "email")),
        ("password_errors", render_field_errors(errors, "password")),
    ])?;
    render_page("Регистрация", None, content)
}

/// `/auth/signup/`: registers, logs the new user in and goes to the index.
pub fn signup<S: KvStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    if current_user(store, req)?.is_some() {
        return Ok(redirect("/"));
    }

    match req.method() {
        Method::Get => Ok(html_response(200, render_signup(&SignupForm::default(), &FieldErrors::new())?)),
        Method::Post => {
            let form = SignupForm::from_fields(&parse_form_body(req));
            if let Err(errors) = form.validate() {
                return Ok(html_response(200, render_signup(&form, &errors)?));
            }

            let user = match create_user(store, &form) {
                Ok(user) => user,
                Err(e) if matches!(e.downcast_ref::<ApiError>(), Some(ApiError::Conflict(_))) => {
                    let mut errors = FieldErrors::new();
                    errors
                        .entry("username")
                        .or_default()
                        .push("Пользователь с таким именем уже существует.".to_string());
                    return Ok(html_response(200, render_signup(&form, &errors)?));
                }
                Err(e) => return Err(e),
            };

            start_session(store, &user, "/")
        }
        _ => Ok(ApiError::MethodNotAllowed.into()),
    }
}
