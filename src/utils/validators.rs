use anyhow::{anyhow, Result};
use url::Url;

pub const MAX_NAME_LEN: usize = 200;
pub const MAX_FUNCTIONAL_REQUIREMENTS: usize = 50;
pub const MAX_FUNCTIONAL_REQUIREMENT_LEN: usize = 1000;

/// Validate that a string is a valid URL with http or https scheme
pub fn validate_url(url_str: &str) -> Result<Url> {
    let url = Url::parse(url_str).map_err(|e| anyhow!("Invalid URL format: {}", e))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(anyhow!(
            "URL must use http or https scheme, got: {}",
            url.scheme()
        ));
    }

    if url.host_str().is_none() {
        return Err(anyhow!("URL must have a host"));
    }

    Ok(url)
}

/// Validate a requirement name (non-blank, bounded length)
pub fn validate_requirement_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("Requirement name must not be empty"));
    }

    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(anyhow!(
            "Requirement name must be at most {} characters",
            MAX_NAME_LEN
        ));
    }

    Ok(())
}

/// Validate the functional requirement list entered in the wizard
pub fn validate_functional_requirements(items: &[String]) -> Result<()> {
    if items.len() > MAX_FUNCTIONAL_REQUIREMENTS {
        return Err(anyhow!(
            "At most {} functional requirements are allowed",
            MAX_FUNCTIONAL_REQUIREMENTS
        ));
    }

    if let Some(position) = items
        .iter()
        .position(|item| item.chars().count() > MAX_FUNCTIONAL_REQUIREMENT_LEN)
    {
        return Err(anyhow!(
            "Functional requirement #{} exceeds {} characters",
            position + 1,
            MAX_FUNCTIONAL_REQUIREMENT_LEN
        ));
    }

    Ok(())
}
