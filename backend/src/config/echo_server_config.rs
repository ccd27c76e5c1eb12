use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config_loader::{ConfigError, find_config_file, load_json, parse_json};
use logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use webrtc::{
    Credentials, GatherError, GathererConfig, IceAgentConfig, IceServer, PeerConnectionConfig,
};

use crate::config::{IceConfig, ServerConfig, SessionsConfig};

pub const CONFIG_FILE_NAME: &str = "server_config.json";
/// Inline JSON configuration, checked before any file
pub const CONFIG_ENV: &str = "CONFIG";
pub const PORT_ENV: &str = "PORT";
pub const TURN_USERNAME_ENV: &str = "TURN_USERNAME";
pub const TURN_CREDENTIAL_ENV: &str = "TURN_CREDENTIAL";

/// Echo server configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EchoServerConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub sessions: SessionsConfig,
    pub ice: IceConfig,
}

/// Where the configuration was read from, reported once logging is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Environment,
    File(PathBuf),
    Defaults,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Environment => write!(f, "{CONFIG_ENV} environment variable"),
            ConfigSource::File(path) => write!(f, "{}", path.display()),
            ConfigSource::Defaults => f.write_str("built-in defaults"),
        }
    }
}

impl EchoServerConfig {
    /// Loads the configuration from the process environment.
    ///
    /// Lookup order:
    /// 1. `CONFIG` environment variable holding inline JSON
    /// 2. `cli_path` (the `--config` flag)
    /// 3. `server_config.json` found by [`find_config_file`]
    /// 4. Defaults
    ///
    /// `PORT`, `TURN_USERNAME` and `TURN_CREDENTIAL` are applied on top.
    pub fn load(cli_path: Option<&Path>) -> Result<(Self, ConfigSource), ConfigError> {
        Self::load_from(cli_path, |key| env::var(key).ok())
    }

    /// [`load`](Self::load) with an explicit environment lookup.
    pub fn load_from(
        cli_path: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(Self, ConfigSource), ConfigError> {
        let (mut config, source) = if let Some(inline) = lookup(CONFIG_ENV) {
            (parse_json(&inline, CONFIG_ENV)?, ConfigSource::Environment)
        } else if let Some(path) = cli_path {
            (load_json(path)?, ConfigSource::File(path.to_path_buf()))
        } else {
            match find_config_file(CONFIG_FILE_NAME) {
                Ok(path) => (load_json(&path)?, ConfigSource::File(path)),
                Err(ConfigError::FileNotFound(_)) => (Self::default(), ConfigSource::Defaults),
                Err(e) => return Err(e),
            }
        };

        config.apply_env_overrides(lookup)?;
        Ok((config, source))
    }

    /// Applies deployment overrides.
    ///
    /// TURN credentials only fill in TURN endpoints configured without any.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(port) = lookup(PORT_ENV) {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("{PORT_ENV}={port} is not a port")))?;
        }

        if let (Some(username), Some(credential)) =
            (lookup(TURN_USERNAME_ENV), lookup(TURN_CREDENTIAL_ENV))
        {
            for server in self.ice.servers.iter_mut().filter(|s| s.is_turn()) {
                if server.username.is_none() && server.credential.is_none() {
                    server.username = Some(username.clone());
                    server.credential = Some(credential.clone());
                }
            }
        }
        Ok(())
    }

    /// Builds the configuration handed to every peer connection.
    ///
    /// # Errors
    ///
    /// Returns `GatherError` if a STUN/TURN URL is invalid or asks for an
    /// unsupported transport.
    pub fn peer_connection_config(&self) -> Result<PeerConnectionConfig, GatherError> {
        let servers = self
            .ice
            .servers
            .iter()
            .map(|server| {
                let credentials = match (&server.username, &server.credential) {
                    (Some(username), Some(credential)) => {
                        Some(Credentials::new(username.as_str(), credential.as_str()))
                    }
                    _ => None,
                };
                IceServer::parse(&server.url, server.transport.as_deref(), credentials)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let ice = &self.ice;
        Ok(PeerConnectionConfig {
            host_addresses: ice.host_addresses.clone(),
            gatherer: GathererConfig {
                servers,
                request_timeout: Duration::from_millis(ice.stun_timeout_ms),
                allocation_lifetime: Duration::from_secs(ice.allocation_lifetime_secs),
                refresh_ratio: ice.refresh_ratio,
                advertised_address: ice.advertised_address,
            },
            agent: IceAgentConfig {
                max_concurrent_checks: ice.max_concurrent_checks,
                check_timeout: Duration::from_millis(ice.check_timeout_ms),
                check_retries: ice.check_retries,
                keepalive_interval: Duration::from_millis(ice.keepalive_interval_ms),
                liveness_failure_threshold: ice.liveness_failure_threshold,
                recovery_window: Duration::from_millis(ice.recovery_window_ms),
                controlling: false,
            },
            pacing_interval: Duration::from_millis(ice.pacing_interval_ms),
            cancellation_grace: Duration::from_millis(self.sessions.cancellation_grace_ms),
            answer_gather_timeout: Duration::from_millis(self.sessions.answer_gather_timeout_ms),
            ..PeerConnectionConfig::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IceServerConfig;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn turn_server(username: Option<&str>) -> IceServerConfig {
        IceServerConfig {
            url: "turn:turn.example.org:3478".to_string(),
            transport: Some("udp".to_string()),
            username: username.map(str::to_string),
            credential: username.map(|_| "secret".to_string()),
        }
    }

    #[test]
    fn test_defaults() {
        let config = EchoServerConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.request_timeout_ms, 10_000);
        assert_eq!(config.sessions.max_sessions, 100);
        assert_eq!(config.sessions.idle_timeout_secs, 300);
        assert_eq!(config.sessions.terminal_grace_secs, 30);
        assert_eq!(config.ice.check_retries, 2);
        assert_eq!(config.ice.liveness_failure_threshold, 5);
        assert_eq!(config.ice.refresh_ratio, 0.5);
        assert!(config.ice.servers.is_empty());
    }

    #[test]
    fn test_inline_config_takes_precedence() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "server": {{ "port": 9000 }} }}"#).unwrap();

        let lookup = env_of(&[(CONFIG_ENV, r#"{ "sessions": { "max_sessions": 3 } }"#)]);
        let (config, source) = EchoServerConfig::load_from(Some(file.path()), lookup).unwrap();

        assert_eq!(source, ConfigSource::Environment);
        assert_eq!(config.sessions.max_sessions, 3);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_cli_path_with_partial_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "server": {{ "port": 9000 }}, "ice": {{ "check_timeout_ms": 500 }} }}"#
        )
        .unwrap();

        let (config, source) = EchoServerConfig::load_from(Some(file.path()), env_of(&[])).unwrap();
        assert_eq!(source, ConfigSource::File(file.path().to_path_buf()));
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.ice.check_timeout_ms, 500);
        assert_eq!(config.ice.max_concurrent_checks, 4);
    }

    #[test]
    fn test_missing_cli_path_is_an_error() {
        let result = EchoServerConfig::load_from(Some(Path::new("/no/such/config.json")), env_of(&[]));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_invalid_inline_config_is_an_error() {
        let result = EchoServerConfig::load_from(None, env_of(&[(CONFIG_ENV, "{ nope")]));
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_port_override() {
        let mut config = EchoServerConfig::default();
        config.apply_env_overrides(env_of(&[(PORT_ENV, "3000")])).unwrap();
        assert_eq!(config.server.port, 3000);

        let err = config
            .apply_env_overrides(env_of(&[(PORT_ENV, "eighty")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_turn_credentials_fill_only_missing() {
        let mut config = EchoServerConfig::default();
        config.ice.servers = vec![
            turn_server(None),
            turn_server(Some("configured")),
            IceServerConfig {
                url: "stun:stun.example.org".to_string(),
                transport: None,
                username: None,
                credential: None,
            },
        ];

        config
            .apply_env_overrides(env_of(&[
                (TURN_USERNAME_ENV, "injected"),
                (TURN_CREDENTIAL_ENV, "pw"),
            ]))
            .unwrap();

        assert_eq!(config.ice.servers[0].username.as_deref(), Some("injected"));
        assert_eq!(config.ice.servers[0].credential.as_deref(), Some("pw"));
        assert_eq!(config.ice.servers[1].username.as_deref(), Some("configured"));
        assert_eq!(config.ice.servers[2].username, None);
    }

    #[test]
    fn test_peer_connection_config() {
        let mut config = EchoServerConfig::default();
        config.ice.servers = vec![turn_server(Some("user"))];
        config.ice.check_timeout_ms = 750;
        config.sessions.cancellation_grace_ms = 1_500;

        let pc = config.peer_connection_config().unwrap();
        assert_eq!(pc.gatherer.servers.len(), 1);
        assert_eq!(pc.gatherer.servers[0].address, "turn.example.org:3478");
        assert_eq!(
            pc.gatherer.servers[0].credentials,
            Some(Credentials::new("user", "secret"))
        );
        assert_eq!(pc.agent.check_timeout, Duration::from_millis(750));
        assert!(!pc.agent.controlling);
        assert_eq!(pc.cancellation_grace, Duration::from_millis(1_500));
        assert_eq!(pc.answer_gather_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_tcp_transport_rejected() {
        let mut config = EchoServerConfig::default();
        config.ice.servers = vec![IceServerConfig {
            transport: Some("tcp".to_string()),
            ..turn_server(None)
        }];
        assert!(config.peer_connection_config().is_err());
    }
}
