use spin_sdk::http::{Request, Response};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use argon2::password_hash::SaltString;
use rand::rngs::OsRng;
use uuid::Uuid;

pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Formats a stored RFC 3339 timestamp for display, e.g. `19 Oct 2026 14:05`.
pub fn display_date(iso: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(iso)
        .map(|dt| dt.format("%d %b %Y %H:%M").to_string())
        .unwrap_or_else(|_| iso.to_string())
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    use argon2::PasswordHash;

    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

pub fn validate_uuid(id: &str) -> bool {
    Uuid::parse_str(id).is_ok()
}

pub fn html_response(status: u16, body: String) -> Response {
    Response::builder()
        .status(status)
        .header("Content-Type", "text/html; charset=utf-8")
        .body(body)
        .build()
}

pub fn redirect(location: &str) -> Response {
    Response::builder()
        .status(302)
        .header("Location", location)
        .body(Vec::new())
        .build()
}

/// Redirect to the login page, coming back to `next` afterwards.
/// `next` is percent-encoded except for `/`.
pub fn redirect_to_login(next: &str) -> Response {
    let next = urlencoding::encode(next).replace("%2F", "/");
    redirect(&format!("/auth/login/?next={}", next))
}

/// Path of the request without the query string.
pub fn request_path(req: &Request) -> String {
    let uri = req.uri();
    let without_query = uri.split('?').next().unwrap_or("/");
    // Absolute URIs carry the scheme and authority in front of the path.
    match without_query.find("://") {
        Some(idx) => {
            let rest = &without_query[idx + 3..];
            rest.find('/').map(|p| rest[p..].to_string()).unwrap_or_else(|| "/".to_string())
        }
        None => without_query.to_string(),
    }
}

/// Reads a cookie value from the `Cookie` header.
pub fn cookie_value(req: &Request, name: &str) -> Option<String> {
    let header = req.header("Cookie")?.as_str()?;
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use spin_sdk::http::Method;

    #[test]
    fn password_hash_verifies_only_the_original() {
        let hash = hash_password("s3cret-pass").unwrap();
        assert!(verify_password("s3cret-pass", &hash));
        assert!(!verify_password("other-pass", &hash));
        assert!(!verify_password("s3cret-pass", "not-a-hash"));
    }

    #[test]
    fn redirect_to_login_keeps_next() {
        let resp = redirect_to_login("/create/");
        assert_eq!(*resp.status(), 302);
        let location = resp.header("Location").and_then(|h| h.as_str()).unwrap();
        assert_eq!(location, "/auth/login/?next=/create/");
    }

    #[test]
    fn redirect_to_login_encodes_next() {
        let resp = redirect_to_login("/profile/leo&co/follow/");
        let location = resp.header("Location").and_then(|h| h.as_str()).unwrap();
        assert_eq!(location, "/auth/login/?next=/profile/leo%26co/follow/");
    }

    #[test]
    fn cookie_lookup_picks_the_named_pair() {
        let req = Request::builder()
            .method(Method::Get)
            .uri("/")
            .header("Cookie", "theme=dark; sessionid=abc123")
            .build();
        assert_eq!(cookie_value(&req, "sessionid").as_deref(), Some("abc123"));
        assert_eq!(cookie_value(&req, "missing"), None);
    }

    #[test]
    fn request_path_drops_the_query() {
        let req = Request::builder().method(Method::Get).uri("/group/cats/?page=2").build();
        assert_eq!(request_path(&req), "/group/cats/");
    }
}
