//! Control-plane identity

/// Immutable identity of this host toward the control plane.
///
/// Built once at startup from configuration. The server code rides on every
/// call, both in the JSON body and in the `X-Server-Code` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEndpoint {
    base_url: String,
    server_code: String,
}

impl RemoteEndpoint {
    pub fn new(base_url: &str, server_code: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            server_code: server_code.to_string(),
        }
    }

    /// Build from the active configuration.
    pub fn from_config(config: &crate::config::ConnectorConfig) -> Self {
        Self::new(&config.web_server.base_url, &config.server.code)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn server_code(&self) -> &str {
        &self.server_code
    }

    /// Absolute URL for an endpoint path such as `/plugin-test.php`.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_normalised() {
        let ep = RemoteEndpoint::new("https://cp.example/api/", "GB-0000-0000-0001");
        assert_eq!(ep.base_url(), "https://cp.example/api");
        assert_eq!(ep.url("/plugin-test.php"), "https://cp.example/api/plugin-test.php");
        assert_eq!(ep.url("plugin-test.php"), "https://cp.example/api/plugin-test.php");
    }
}
