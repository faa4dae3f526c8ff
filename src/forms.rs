use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::config::*;
use crate::core::store::KvStore;
use crate::groups::get_group;
use crate::models::models::Post;

/// Field name -> validation messages.
pub type FieldErrors = BTreeMap<&'static str, Vec<String>>;

pub const REQUIRED: &str = "Обязательное поле.";
pub const INVALID_CHOICE: &str =
    "Выберите корректный вариант. Вашего варианта нет среди допустимых значений.";
pub const INVALID_IMAGE: &str =
    "Загрузите правильное изображение. Файл, который вы загрузили, поврежден или не является изображением.";

fn add_error(errors: &mut FieldErrors, field: &'static str, message: impl Into<String>) {
    errors.entry(field).or_default().push(message.into());
}

fn field(fields: &HashMap<String, String>, name: &str) -> String {
    fields.get(name).cloned().unwrap_or_default()
}

/// Submitted post fields. `group` is a group id, `image` a file name.
#[derive(Debug, Clone, Default)]
pub struct PostForm {
    pub text: String,
    pub group: String,
    pub image: String,
}

/// Validated values ready to be stored on a post.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedPost {
    pub text: String,
    pub group_id: Option<String>,
    pub image: Option<String>,
}

impl PostForm {
    pub const TEXT_LABEL: &'static str = "Текст поста";
    pub const TEXT_HELP: &'static str = "Текст нового поста";
    pub const GROUP_LABEL: &'static str = "Группа";
    pub const GROUP_HELP: &'static str = "Группа, к которой будет относиться пост";
    pub const GROUP_EMPTY_LABEL: &'static str = "Без группы";

    pub fn from_fields(fields: &HashMap<String, String>) -> Self {
        Self {
            text: field(fields, "text"),
            group: field(fields, "group"),
            image: field(fields, "image"),
        }
    }

    /// Form bound to an existing post, as shown on the edit page.
    pub fn from_post(post: &Post) -> Self {
        Self {
            text: post.text.clone(),
            group: post.group_id.clone().unwrap_or_default(),
            image: post.image.clone().unwrap_or_default(),
        }
    }

    pub fn validate<S: KvStore>(&self, store: &S) -> anyhow::Result<Result<CleanedPost, FieldErrors>> {
        let mut errors = FieldErrors::new();

        let text = self.text.trim();
        if text.is_empty() {
            add_error(&mut errors, "text", REQUIRED);
        } else if text.chars().count() > MAX_POST_LENGTH {
            add_error(
                &mut errors,
                "text",
                format!("Убедитесь, что это значение содержит не более {} символов.", MAX_POST_LENGTH),
            );
        }

        let group = self.group.trim();
        let group_id = if group.is_empty() {
            None
        } else if get_group(store, group)?.is_some() {
            Some(group.to_string())
        } else {
            add_error(&mut errors, "group", INVALID_CHOICE);
            None
        };

        let image = match clean_image(&self.image) {
            Ok(image) => image,
            Err(message) => {
                add_error(&mut errors, "image", message);
                None
            }
        };

        if !errors.is_empty() {
            return Ok(Err(errors));
        }
        Ok(Ok(CleanedPost { text: text.to_string(), group_id, image }))
    }
}

/// Normalizes an image file name into `posts/<name>`.
fn clean_image(raw: &str) -> Result<Option<String>, &'static str> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    let name = Path::new(raw)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.starts_with('.'))
        .ok_or(INVALID_IMAGE)?;
    let is_image = mime_guess::from_path(name)
        .first()
        .map(|mime| mime.type_() == mime_guess::mime::IMAGE)
        .unwrap_or(false);
    if !is_image {
        return Err(INVALID_IMAGE);
    }
    Ok(Some(format!("posts/{}", name)))
}

#[derive(Debug, Clone, Default)]
pub struct CommentForm {
    pub text: String,
}

impl CommentForm {
    pub fn from_fields(fields: &HashMap<String, String>) -> Self {
        Self { text: field(fields, "text") }
    }

    pub fn validate(&self) -> Result<String, FieldErrors> {
        let mut errors = FieldErrors::new();
        let text = self.text.trim();
        if text.is_empty() {
            add_error(&mut errors, "text", REQUIRED);
        } else if text.chars().count() > MAX_COMMENT_LENGTH {
            add_error(
                &mut errors,
                "text",
                format!("Убедитесь, что это значение содержит не более {} символов.", MAX_COMMENT_LENGTH),
            );
        }
        if errors.is_empty() {
            Ok(text.to_string())
        } else {
            Err(errors)
        }
    }
}

fn username_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[\w.@+-]+$").expect("Regex should compile"))
}

#[derive(Debug, Clone, Default)]
pub struct SignupForm {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    pub password: String,
}

impl SignupForm {
    pub fn from_fields(fields: &HashMap<String, String>) -> Self {
        Self {
            first_name: field(fields, "first_name").trim().to_string(),
            last_name: field(fields, "last_name").trim().to_string(),
            username: field(fields, "username").trim().to_string(),
            email: field(fields, "email").trim().to_string(),
            password: field(fields, "password"),
        }
    }

    /// Checks the fields on their own; username uniqueness is checked on insert.
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();

        if self.username.is_empty() {
            add_error(&mut errors, "username", REQUIRED);
        } else if self.username.chars().count() > MAX_USERNAME_LENGTH
            || !username_regex().is_match(&self.username)
        {
            add_error(
                &mut errors,
                "username",
                "Введите правильное имя пользователя. Оно может содержать только буквы, цифры и знаки @/./+/-/_.",
            );
        }

        for (name, value) in [("first_name", &self.first_name), ("last_name", &self.last_name)] {
            if value.chars().count() > MAX_NAME_LENGTH {
                add_error(
                    &mut errors,
                    name,
                    format!("Убедитесь, что это значение содержит не более {} символов.", MAX_NAME_LENGTH),
                );
            }
        }

        if !self.email.is_empty() && !self.email.contains('@') {
            add_error(&mut errors, "email", "Введите правильный адрес электронной почты.");
        }

        if self.password.is_empty() {
            add_error(&mut errors, "password", REQUIRED);
        } else if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            add_error(
                &mut errors,
                "password",
                format!("Пароль должен содержать как минимум {} символов.", MIN_PASSWORD_LENGTH),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::MemoryStore;
    use crate::groups::create_group;
    use crate::core::query_params::parse_urlencoded;

    #[test]
    fn empty_text_is_required() {
        let store = MemoryStore::new();
        let form = PostForm::from_fields(&parse_urlencoded("text=++&group="));
        let errors = form.validate(&store).unwrap().unwrap_err();
        assert_eq!(errors["text"], vec![REQUIRED.to_string()]);
    }

    #[test]
    fn group_must_exist() {
        let store = MemoryStore::new();
        let group = create_group(&store, "Коты", "cats", "Про котов").unwrap();

        let ok = PostForm { text: "Мурр".into(), group: group.id.clone(), image: String::new() };
        let cleaned = ok.validate(&store).unwrap().unwrap();
        assert_eq!(cleaned.group_id, Some(group.id));
        assert_eq!(cleaned.image, None);

        let bad = PostForm { text: "Мурр".into(), group: "missing".into(), image: String::new() };
        let errors = bad.validate(&store).unwrap().unwrap_err();
        assert_eq!(errors["group"], vec![INVALID_CHOICE.to_string()]);
    }

    #[test]
    fn image_is_stored_under_posts() {
        assert_eq!(clean_image("small.gif"), Ok(Some("posts/small.gif".to_string())));
        assert_eq!(clean_image("posts/small.gif"), Ok(Some("posts/small.gif".to_string())));
        assert_eq!(clean_image("../../etc/cat.png"), Ok(Some("posts/cat.png".to_string())));
        assert_eq!(clean_image(""), Ok(None));
        assert_eq!(clean_image("notes.txt"), Err(INVALID_IMAGE));
    }

    #[test]
    fn comment_text_is_trimmed_and_required() {
        assert_eq!(CommentForm { text: "  nice  ".into() }.validate().unwrap(), "nice");
        assert!(CommentForm { text: "   ".into() }.validate().is_err());
    }

    #[test]
    fn signup_rejects_bad_usernames_and_short_passwords() {
        let form = SignupForm {
            username: "bad name!".into(),
            password: "short".into(),
            email: "nope".into(),
            ..Default::default()
        };
        let errors = form.validate().unwrap_err();
        assert!(errors.contains_key("username"));
        assert!(errors.contains_key("password"));
        assert!(errors.contains_key("email"));

        let ok = SignupForm {
            username: "leo.tolstoy".into(),
            password: "war-and-peace".into(),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());
    }
}
