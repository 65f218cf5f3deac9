use relato_common::ExtractError;

const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// GET `url` with a browser-like user agent, following redirects, and
/// return the full response body (§6.2). No cookies, no JS execution.
pub async fn fetch_html(url: &str) -> Result<String, ExtractError> {
    let client = reqwest::Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .build()
        .map_err(|e| ExtractError::Fetch(e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ExtractError::Fetch(e.to_string()))?;

    if !response.status().is_success() {
        return Err(ExtractError::Fetch(format!(
            "status {}",
            response.status()
        )));
    }

    response
        .text()
        .await
        .map_err(|e| ExtractError::Fetch(e.to_string()))
}
