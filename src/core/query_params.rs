use std::collections::HashMap;

use spin_sdk::http::Request;

/// Parse query parameters from a URI string
///
/// Handles URL decoding and returns a HashMap of parameter key-value pairs.
/// Multiple values for the same key are not supported (only the last is kept).
///
/// # Example
/// ```
/// use yatube::core::query_params::parse_query_params;
///
/// let params = parse_query_params("/path?user=john&page=2");
/// assert_eq!(params.get("user"), Some(&"john".to_string()));
/// assert_eq!(params.get("page"), Some(&"2".to_string()));
/// ```
pub fn parse_query_params(uri: &str) -> HashMap<String, String> {
    match uri.find('?') {
        Some(query_start) => parse_urlencoded(&uri[query_start + 1..]),
        None => HashMap::new(),
    }
}

/// Decode an `application/x-www-form-urlencoded` string.
pub fn parse_urlencoded(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    for param in query.split('&').filter(|p| !p.is_empty()) {
        match param.split_once('=') {
            Some((key, value)) => {
                params.insert(decode_component(key), decode_component(value));
            }
            None => {
                // Flag parameter without value
                params.insert(decode_component(param), String::new());
            }
        }
    }

    params
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

/// Form fields of a POST body, JSON or urlencoded depending on `Content-Type`.
///
/// JSON scalars other than strings are kept in their JSON text form so that
/// `{"group": 3}` and `group=3` read the same.
pub fn parse_form_body(req: &Request) -> HashMap<String, String> {
    let content_type = req
        .header("Content-Type")
        .and_then(|h| h.as_str())
        .unwrap_or_default();

    if content_type.starts_with("application/json") {
        let value: serde_json::Value = match serde_json::from_slice(req.body()) {
            Ok(v) => v,
            Err(_) => return HashMap::new(),
        };
        let mut fields = HashMap::new();
        if let serde_json::Value::Object(map) = value {
            for (key, value) in map {
                let text = match value {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                };
                fields.insert(key, text);
            }
        }
        fields
    } else {
        parse_urlencoded(&String::from_utf8_lossy(req.body()))
    }
}

/// Get a string parameter from parsed query params with optional default
pub fn get_string(params: &HashMap<String, String>, key: &str, default: Option<&str>) -> Option<String> {
    params.get(key)
        .cloned()
        .or_else(|| default.map(|d| d.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use spin_sdk::http::Method;

    #[test]
    fn query_values_are_decoded() {
        let params = parse_query_params("/follow/?page=2&next=%2Fcreate%2F&q=a+b");
        assert_eq!(params["page"], "2");
        assert_eq!(params["next"], "/create/");
        assert_eq!(params["q"], "a b");
    }

    #[test]
    fn uri_without_query_has_no_params() {
        assert!(parse_query_params("/group/cats/").is_empty());
    }

    #[test]
    fn json_and_urlencoded_bodies_read_the_same() {
        let json = Request::builder()
            .method(Method::Post)
            .uri("/create/")
            .header("Content-Type", "application/json")
            .body(br#"{"text": "hello there", "group": 3, "image": null}"#.to_vec())
            .build();
        let form = Request::builder()
            .method(Method::Post)
            .uri("/create/")
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(b"text=hello+there&group=3&image=".to_vec())
            .build();

        let a = parse_form_body(&json);
        let b = parse_form_body(&form);
        assert_eq!(a["text"], "hello there");
        assert_eq!(a, b);
    }

    #[test]
    fn get_string_falls_back_to_default() {
        let params = parse_urlencoded("next=/profile/bob/");
        assert_eq!(get_string(&params, "next", Some("/")).as_deref(), Some("/profile/bob/"));
        assert_eq!(get_string(&params, "other", Some("/")).as_deref(), Some("/"));
        assert_eq!(get_string(&params, "other", None), None);
    }
}
