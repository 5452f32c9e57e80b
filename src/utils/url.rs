//! URL normalization for the backend boundary.
//!
//! Endpoints are always built from a configurable base URL; trimming the
//! trailing slashes here keeps the joined URLs free of doubled separators.

/// Strip trailing slashes from a base URL.
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Join a base URL and an endpoint path.
///
/// # Examples
///
/// ```
/// use tabchat::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("http://localhost:8000/", "chat"),
///     "http://localhost:8000/chat"
/// );
/// assert_eq!(
///     construct_api_url("http://localhost:8000", "/chat/upload/image"),
///     "http://localhost:8000/chat/upload/image"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}
