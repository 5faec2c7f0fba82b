use serde::Deserialize;

/// Configuration for the admin REST API server.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Whether the admin server is started by the supervisor.
    #[serde(default = "default_server_enabled")]
    pub enabled: bool,

    /// Address and port for the HTTP server to listen on.
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Optional API key for securing write-endpoints.
    /// If not set in config, falls back to `HERALD_API_KEY` env var.
    #[serde(default = "default_api_key_from_env")]
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: default_server_enabled(),
            listen_address: default_listen_address(),
            api_key: default_api_key_from_env(),
        }
    }
}

fn default_server_enabled() -> bool {
    true
}

fn default_listen_address() -> String {
    "0.0.0.0:8080".to_string()
}

/// Loads the API key from the `HERALD_API_KEY` environment variable.
fn default_api_key_from_env() -> Option<String> {
    std::env::var("HERALD_API_KEY").ok()
}

#[cfg(test)]
mod tests {
    use config::Config;

    use super::*;

    #[test]
    fn test_default_server_config() {
        let config = Config::builder()
            .add_source(config::File::from_str("", config::FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize::<ServerConfig>()
            .unwrap();
        assert!(config.enabled);
        assert_eq!(config.listen_address, "0.0.0.0:8080");
    }

    #[test]
    fn test_custom_server_config() {
        let yaml = r#"
          enabled: false
          listen_address: "127.0.0.1:3333"
          api_key: "secret"
        "#;
        let config = Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize::<ServerConfig>()
            .unwrap();
        assert!(!config.enabled);
        assert_eq!(config.listen_address, "127.0.0.1:3333");
        assert_eq!(config.api_key.as_deref(), Some("secret"));
    }
}
