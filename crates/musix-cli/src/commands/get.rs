use std::sync::Arc;

use anyhow::{Context, Result};
use musix_governor::{ApiClient, Config, Provider, StaticToken};

/// Call `endpoint` on `provider` and print the JSON response.
pub async fn run_get(
    config: &Config,
    provider: Provider,
    endpoint: &str,
    params: &[(String, String)],
    token: Option<String>,
) -> Result<()> {
    let governor = Arc::new(config.governor()?);
    let mut client = ApiClient::new(governor, provider.profile());

    if let Some(token) = token.or_else(|| config.token_for(provider)) {
        client = client.with_tokens(Arc::new(StaticToken::new(Some(token))));
    } else if client.profile().requires_auth {
        log::warn!(
            "No {} token configured; set {}_token or pass --token",
            provider,
            provider
        );
    }

    log::info!("GET {}", client.url_for(endpoint, params));
    let value = client
        .get(endpoint, params)
        .await
        .with_context(|| format!("{provider} request to {endpoint} failed"))?;

    let body = serde_json::to_string_pretty(&value).context("Failed to format response")?;
    println!("{body}");

    Ok(())
}

/// Parse a `key=value` query parameter.
pub fn parse_param(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    if key.is_empty() {
        return Err(format!("empty parameter name in `{raw}`"));
    }
    Ok((key.to_string(), value.to_string()))
}
