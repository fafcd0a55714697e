use anyhow::anyhow;
use reqwest::StatusCode;

/// Error body shapes seen from the auth and query endpoints.
///
/// The OAuth2 token endpoint responds with `{"error":...,"error_description":...}`;
/// the query API uses `{"message":...}` or `{"detail":...}`. All fields are
/// optional so any of these parse.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct ApiErrorResponse {
    #[serde(default)]
    pub(crate) error: Option<String>,
    #[serde(default)]
    pub(crate) error_description: Option<String>,
    #[serde(default)]
    pub(crate) message: Option<String>,
    #[serde(default)]
    pub(crate) detail: Option<String>,
}

/// Formats a non-2xx response into an error naming the failed step and
/// carrying the HTTP status line plus whatever the server said.
pub(crate) fn format_api_error(
    action: &str,
    status: StatusCode,
    url: &str,
    body: &str,
) -> anyhow::Error {
    let reason = status.canonical_reason().unwrap_or("Unknown");

    if let Ok(parsed) = serde_json::from_str::<ApiErrorResponse>(body) {
        let mut parts: Vec<&str> = Vec::new();
        for field in [
            parsed.error.as_deref(),
            parsed.error_description.as_deref(),
            parsed.message.as_deref(),
            parsed.detail.as_deref(),
        ]
        .into_iter()
        .flatten()
        {
            if !field.is_empty() {
                parts.push(field);
            }
        }
        if !parts.is_empty() {
            return anyhow!(
                "{} failed: HTTP {} {} for url ({})\n{}",
                action,
                status.as_u16(),
                reason,
                url,
                parts.join(". ")
            );
        }
    }

    anyhow!(
        "{} failed: HTTP {} {} for url ({})",
        action,
        status.as_u16(),
        reason,
        url
    )
}
