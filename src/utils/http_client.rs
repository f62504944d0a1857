use reqwest::{Client, ClientBuilder};
use std::time::Duration;

const USER_AGENT: &str = concat!("sysdiagram-backend/", env!("CARGO_PKG_VERSION"));

/// Create a configured HTTP client for outbound API calls
pub fn create_http_client(timeout_secs: u64) -> reqwest::Result<Client> {
    ClientBuilder::new()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(USER_AGENT)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_http_client() {
        assert!(create_http_client(30).is_ok());
    }
}
