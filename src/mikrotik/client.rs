// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jesof

//! High-level RouterOS API client

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::{RouterConfig, defaults};
use crate::error::{ApiError, Result};

use super::connection::{Session, SessionOptions};
use super::types::{AttributeMap, IndexedResult};

/// Timeouts and session options for [`Client`]
#[derive(Clone)]
pub struct ClientOptions {
    pub connect_timeout: Duration,
    pub query_timeout: Duration,
    pub session: SessionOptions,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(defaults::CONNECT_TIMEOUT_SECS),
            query_timeout: Duration::from_secs(defaults::QUERY_TIMEOUT_SECS),
            session: SessionOptions::default(),
        }
    }
}

/// Logged-in connection to one router
///
/// Wraps a [`Session`] and bounds every query by the configured timeout.
pub struct Client {
    config: RouterConfig,
    session: Session,
    query_timeout: Duration,
}

impl Client {
    /// Connects over TCP and logs in
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the connection
    /// cannot be established in time, or login fails.
    pub async fn connect(config: RouterConfig) -> Result<Self> {
        Self::connect_with(config, ClientOptions::default()).await
    }

    /// Connects over TCP with explicit options and logs in
    ///
    /// Every address the host resolves to is tried in turn.
    ///
    /// # Errors
    ///
    /// Same as [`Client::connect`].
    pub async fn connect_with(config: RouterConfig, options: ClientOptions) -> Result<Self> {
        config.validate().map_err(ApiError::Config)?;

        tracing::trace!(
            "Attempting TCP connection to: {}:{}",
            config.address,
            config.port
        );
        let stream = timeout(
            options.connect_timeout,
            TcpStream::connect((config.address.as_str(), config.port)),
        )
        .await
        .map_err(|_| ApiError::Timeout(options.connect_timeout))??;
        stream.set_nodelay(true)?;
        tracing::trace!(
            "TCP connection established to: {}:{}",
            config.address,
            config.port
        );

        Self::over_stream(config, stream, options).await
    }

    /// Logs in over an already connected stream, e.g. a TLS session
    ///
    /// # Errors
    ///
    /// Returns an error if login fails.
    pub async fn over_stream<S>(config: RouterConfig, stream: S, options: ClientOptions) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let session = Session::with_options(stream, options.session);
        if let Err(e) = session
            .login_with(&config.username, &config.password, config.login_method)
            .await
        {
            tracing::debug!("Router '{}' login failed: {}", config.name, e);
            session.close().await;
            return Err(e);
        }
        tracing::debug!("Router '{}' ready", config.name);

        Ok(Self {
            config,
            session,
            query_timeout: options.query_timeout,
        })
    }

    /// Name of the router from configuration
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Underlying session, for untimed or concurrent use
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Sends a command and returns its indexed result
    ///
    /// # Errors
    ///
    /// See [`Session::query`]; also `ApiError::Timeout`.
    pub async fn query<W: AsRef<str>>(&self, words: &[W]) -> Result<IndexedResult> {
        self.session.query_timeout(words, self.query_timeout).await
    }

    /// Sends a command and returns its rows in arrival order
    ///
    /// # Errors
    ///
    /// See [`Session::query`]; also `ApiError::Timeout`.
    pub async fn query_rows<W: AsRef<str>>(&self, words: &[W]) -> Result<Vec<AttributeMap>> {
        timeout(self.query_timeout, self.session.query_rows(words))
            .await
            .map_err(|_| ApiError::Timeout(self.query_timeout))?
    }

    /// Closes the connection
    pub async fn close(self) {
        self.session.close().await;
    }
}
