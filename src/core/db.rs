use crate::core::store::KvStore;
use crate::follow::follow_user;
use crate::forms::{CleanedPost, SignupForm};
use crate::groups::{create_group, get_group_by_slug};
use crate::models::models::{Group, User};
use crate::posts::create_post;
use crate::users::{create_user, find_user_by_username};

fn ensure_user<S: KvStore>(store: &S, username: &str, first_name: &str) -> anyhow::Result<(User, bool)> {
    if let Some(u) = find_user_by_username(store, username)? {
        return Ok((u, false));
    }
    let form = SignupForm {
        first_name: first_name.to_string(),
        username: username.to_string(),
        // Demo accounts log in with their username as the password.
        password: username.to_string(),
        ..Default::default()
    };
    Ok((create_user(store, &form)?, true))
}

fn ensure_group<S: KvStore>(store: &S, title: &str, slug: &str, description: &str) -> anyhow::Result<Group> {
    match get_group_by_slug(store, slug)? {
        Some(g) => Ok(g),
        None => create_group(store, title, slug, description),
    }
}

fn post<S: KvStore>(store: &S, author: &User, text: &str, group: Option<&Group>) -> anyhow::Result<()> {
    create_post(store, author, CleanedPost {
        text: text.to_string(),
        group_id: group.map(|g| g.id.clone()),
        image: None,
    })?;
    Ok(())
}

/// Seeds demo users, groups and posts. Running it twice adds nothing.
pub fn init_demo_data<S: KvStore>(store: &S) -> anyhow::Result<()> {
    let travel = ensure_group(store, "Путешествия", "travel", "Заметки из поездок")?;
    let books = ensure_group(store, "Книги", "books", "Что мы читаем")?;

    let (test, new_test) = ensure_user(store, "test", "Тест")?;
    if new_test {
        post(store, &test, "Это мой первый пост на Yatube!", None)?;
    }

    let (alice, new_alice) = ensure_user(store, "alice", "Алиса")?;
    if new_alice {
        post(store, &alice, "Дочитала «Войну и мир». Это было долго.", Some(&books))?;
        post(store, &alice, "Привет! Буду писать сюда о книгах.", None)?;
    }

    let (bob, new_bob) = ensure_user(store, "bob", "Боб")?;
    if new_bob {
        post(store, &bob, "Вернулся с Байкала, фото позже.", Some(&travel))?;
    }

    follow_user(store, &test.id, &bob.id)?;

    tracing::info!("demo data ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::MemoryStore;
    use crate::follow::is_following;
    use crate::groups::list_groups;
    use crate::posts::count_posts;
    use crate::users::list_user_ids;

    #[test]
    fn seeding_is_idempotent() {
        let store = MemoryStore::new();
        init_demo_data(&store).unwrap();
        init_demo_data(&store).unwrap();

        assert_eq!(list_user_ids(&store).unwrap().len(), 3);
        assert_eq!(list_groups(&store).unwrap().len(), 2);
        assert_eq!(count_posts(&store).unwrap(), 4);

        let test = find_user_by_username(&store, "test").unwrap().unwrap();
        let bob = find_user_by_username(&store, "bob").unwrap().unwrap();
        assert!(is_following(&store, &test.id, &bob.id).unwrap());
    }
}
