// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jesof

//! Configuration module for the RouterOS API client
//!
//! Loads router credentials and timeouts from environment variables and JSON.

use std::time::Duration;

use serde::Deserialize;

use crate::mikrotik::{ClientOptions, LoginMethod};


/// Default configuration values
pub mod defaults {
    pub const ROUTEROS_PORT: u16 = 8728;
    pub const ROUTEROS_USERNAME: &str = "admin";
    pub const ROUTEROS_PASSWORD: &str = "";
    pub const CONNECT_TIMEOUT_SECS: u64 = 5;
    pub const QUERY_TIMEOUT_SECS: u64 = 30;
}

/// Environment variable names used by the application
pub mod env_vars {
    pub const ROUTERS_CONFIG: &str = "ROUTERS_CONFIG";
    pub const ROUTEROS_ADDRESS: &str = "ROUTEROS_ADDRESS";
    pub const ROUTEROS_PORT: &str = "ROUTEROS_PORT";
    pub const ROUTEROS_USERNAME: &str = "ROUTEROS_USERNAME";
    pub const ROUTEROS_PASSWORD: &str = "ROUTEROS_PASSWORD";
    pub const CONNECT_TIMEOUT_SECONDS: &str = "CONNECT_TIMEOUT_SECONDS";
    pub const QUERY_TIMEOUT_SECONDS: &str = "QUERY_TIMEOUT_SECONDS";
}

fn default_port() -> u16 {
    defaults::ROUTEROS_PORT
}

/// Connection settings for a single MikroTik router
#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    pub name: String,
    /// Host name or IP address
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub login_method: LoginMethod,
}

impl RouterConfig {
    /// Validates router configuration
    pub fn validate(&self) -> Result<(), String> {
        // Validate name is not empty
        if self.name.trim().is_empty() {
            return Err("Router name cannot be empty".to_string());
        }

        if self.address.trim().is_empty() {
            return Err(format!("Address cannot be empty for router '{}'", self.name));
        }

        if self.port == 0 {
            return Err(format!("Invalid port 0 for router '{}'", self.name));
        }

        // Validate username is not empty
        if self.username.trim().is_empty() {
            return Err(format!(
                "Username cannot be empty for router '{}'",
                self.name
            ));
        }

        Ok(())
    }
}

/// Application-wide configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub routers: Vec<RouterConfig>,
    pub connect_timeout_secs: u64,
    pub query_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            routers: vec![],
            connect_timeout_secs: defaults::CONNECT_TIMEOUT_SECS,
            query_timeout_secs: defaults::QUERY_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Loads configuration from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        // Load routers configuration from JSON
        let routers: Vec<RouterConfig> =
            if let Ok(config_json) = std::env::var(env_vars::ROUTERS_CONFIG) {
                serde_json::from_str(&config_json).unwrap_or_else(|e| {
                    tracing::warn!("Failed to parse ROUTERS_CONFIG: {}. Using empty list.", e);
                    vec![]
                })
            } else {
                // Fallback: single router from plain environment variables
                let address = std::env::var(env_vars::ROUTEROS_ADDRESS).ok();
                let port = std::env::var(env_vars::ROUTEROS_PORT)
                    .ok()
                    .and_then(|v| v.parse::<u16>().ok())
                    .unwrap_or(defaults::ROUTEROS_PORT);
                let username = std::env::var(env_vars::ROUTEROS_USERNAME)
                    .unwrap_or_else(|_| defaults::ROUTEROS_USERNAME.to_string());
                let password = std::env::var(env_vars::ROUTEROS_PASSWORD)
                    .unwrap_or_else(|_| defaults::ROUTEROS_PASSWORD.to_string());

                if let Some(address) = address {
                    vec![RouterConfig {
                        name: "default".to_string(),
                        address,
                        port,
                        username,
                        password,
                        login_method: LoginMethod::default(),
                    }]
                } else {
                    tracing::warn!("No router configuration found.");
                    vec![]
                }
            };

        let connect_timeout_secs = env_secs(
            env_vars::CONNECT_TIMEOUT_SECONDS,
            defaults::CONNECT_TIMEOUT_SECS,
        );
        let query_timeout_secs =
            env_secs(env_vars::QUERY_TIMEOUT_SECONDS, defaults::QUERY_TIMEOUT_SECS);

        Config {
            routers: valid_routers(routers),
            connect_timeout_secs,
            query_timeout_secs,
        }
    }

    /// Looks up a router by name
    #[must_use]
    pub fn router(&self, name: &str) -> Option<&RouterConfig> {
        self.routers.iter().find(|r| r.name == name)
    }

    /// Client timeouts derived from this configuration
    #[must_use]
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            query_timeout: Duration::from_secs(self.query_timeout_secs),
            ..ClientOptions::default()
        }
    }
}

fn env_secs(var: &str, default: u64) -> u64 {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|&secs| secs > 0)
        .unwrap_or(default)
}

/// Drops routers that fail validation, logging why
fn valid_routers(routers: Vec<RouterConfig>) -> Vec<RouterConfig> {
    routers
        .into_iter()
        .filter(|router| match router.validate() {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Invalid router configuration: {}", e);
                tracing::warn!("Skipping invalid router: {}", router.name);
                false
            }
        })
        .collect()
}
