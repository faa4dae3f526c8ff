use spin_sdk::http::Response;
use rust_embed::RustEmbed;
use mime_guess::from_path;

use crate::core::errors::ApiError;

#[derive(RustEmbed)]
#[folder = "static"]
struct Assets;

/// Serves `/static/<file>` from the embedded assets.
pub fn serve_static(path: &str) -> anyhow::Result<Response> {
    let file_path = path.trim_start_matches("/static/");

    let file = match Assets::get(file_path) {
        Some(f) => f,
        None => return Ok(ApiError::NotFound(path.to_string()).into()),
    };

    let mime = from_path(file_path).first_or_octet_stream();

    Ok(Response::builder()
        .status(200)
        .header("Content-Type", mime.as_ref())
        .header("Cache-Control", "public, max-age=3600")
        .body(file.data.to_vec())
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stylesheet_is_served_with_its_mime_type() {
        let resp = serve_static("/static/css/style.css").unwrap();
        assert_eq!(*resp.status(), 200);
        let content_type = resp.header("Content-Type").and_then(|h| h.as_str()).unwrap();
        assert_eq!(content_type, "text/css");
    }

    #[test]
    fn unknown_asset_is_not_found() {
        let resp = serve_static("/static/nope.js").unwrap();
        assert_eq!(*resp.status(), 404);
    }
}
