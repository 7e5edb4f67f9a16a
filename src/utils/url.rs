//! Endpoint URL helpers.

/// Join a provider base URL and an endpoint path with exactly one slash.
///
/// ```
/// use subconscious::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://api.example.com/v1/", "/chat/completions"),
///     "https://api.example.com/v1/chat/completions"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let endpoint = endpoint.trim_start_matches('/');
    format!("{base}/{endpoint}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_without_duplicate_slashes() {
        let cases = [
            ("https://api.example.com/v1", "chat/completions"),
            ("https://api.example.com/v1/", "chat/completions"),
            ("https://api.example.com/v1", "/chat/completions"),
            ("https://api.example.com/v1///", "///chat/completions"),
        ];
        for (base, endpoint) in cases {
            assert_eq!(
                construct_api_url(base, endpoint),
                "https://api.example.com/v1/chat/completions",
                "base={base:?} endpoint={endpoint:?}"
            );
        }
    }
}
