//! Endpoint joining for tool routes.
//!
//! Base URLs arrive from config files and environment variables with or
//! without trailing slashes; route segments arrive with or without leading
//! ones. Everything is joined with exactly one `/`.

/// Strip trailing slashes from a base URL.
///
/// # Examples
///
/// ```
/// use toolwire::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("http://127.0.0.1:8000"), "http://127.0.0.1:8000");
/// assert_eq!(normalize_base_url("http://127.0.0.1:8000/"), "http://127.0.0.1:8000");
/// assert_eq!(normalize_base_url("https://dash.example.com/app///"), "https://dash.example.com/app");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Append a route segment to a base URL.
///
/// # Examples
///
/// ```
/// use toolwire::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("http://127.0.0.1:8000", "mcp/tools"),
///     "http://127.0.0.1:8000/mcp/tools"
/// );
/// assert_eq!(
///     construct_api_url("http://127.0.0.1:8000/mcp/tools/", "/people_list_all"),
///     "http://127.0.0.1:8000/mcp/tools/people_list_all"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}
