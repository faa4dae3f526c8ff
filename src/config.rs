fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

pub fn token_expiration_hours() -> i64 {
    env_or("YATUBE_TOKEN_EXPIRATION_HOURS", 24)
}

/// Page size used by the paginator on every post listing.
pub fn posts_per_page() -> usize {
    env_or("YATUBE_POSTS_PER_PAGE", 10usize).max(1)
}

pub fn index_cache_seconds() -> i64 {
    env_or("YATUBE_INDEX_CACHE_SECONDS", 20)
}

pub fn bind_addr() -> String {
    std::env::var("YATUBE_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string())
}

pub fn seed_demo_data() -> bool {
    std::env::var("YATUBE_DEMO_DATA")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false)
}

// === Limits ===
pub const MAX_POST_LENGTH: usize = 5000;
pub const MAX_COMMENT_LENGTH: usize = 2000;
pub const MAX_USERNAME_LENGTH: usize = 150;
pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_NAME_LENGTH: usize = 150;

// === Cookies ===
pub const SESSION_COOKIE: &str = "sessionid";

// === Storage keys ===
pub const USERS_LIST_KEY: &str = "users_list";
pub const GROUPS_LIST_KEY: &str = "groups_list";
/// Username -> user id. Claiming a name here is what makes it taken.
pub const USERNAMES_KEY: &str = "usernames";
/// Group slug -> group id.
pub const GROUP_SLUGS_KEY: &str = "group_slugs";
/// Live session token -> creation time, swept for expired tokens on login.
pub const TOKENS_INDEX_KEY: &str = "tokens_index";
/// Cache key -> expiry of every stored page.
pub const CACHE_INDEX_KEY: &str = "cache_index";
/// Post ids, newest first.
pub const FEED_KEY: &str = "feed";

pub fn user_key(id: &str) -> String {
    format!("user:{}", id)
}

pub fn group_key(id: &str) -> String {
    format!("group:{}", id)
}

pub fn post_key(id: &str) -> String {
    format!("post:{}", id)
}

pub fn comment_key(id: &str) -> String {
    format!("comment:{}", id)
}

pub fn post_comments_key(post_id: &str) -> String {
    format!("comments:{}", post_id)
}

pub fn followings_key(user_id: &str) -> String {
    format!("followings:{}", user_id)
}

pub fn token_key(token: &str) -> String {
    format!("token:{}", token)
}

pub fn cache_key(key: &str) -> String {
    format!("cache:{}", key)
}
