//! Provider-specific authentication headers.

use crate::core::providers::BuiltinProvider;

/// Anthropic expects `x-api-key` plus a version header; every other provider
/// takes a bearer token.
pub fn add_auth_headers(
    request: reqwest::RequestBuilder,
    provider: &BuiltinProvider,
    api_key: &str,
) -> reqwest::RequestBuilder {
    if provider.is_anthropic_mode() {
        return request
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01");
    }

    request.header("Authorization", format!("Bearer {api_key}"))
}
