// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jesof

//! RouterOS authentication

use md5::compute as md5_compute;
use serde::Deserialize;

use crate::error::{ApiError, Result};

use super::{CloseReason, Session, SessionState};

/// Login handshake to run after connecting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginMethod {
    /// MD5 challenge-response (`/login`, then `=response=`)
    #[default]
    Challenge,
    /// Plain-text password in a single `/login` (RouterOS 6.43+)
    Plain,
}

/// Computes the `=response=` value for a hex challenge
///
/// `"00"` followed by the hex MD5 of a zero byte, the password and the raw
/// challenge bytes. The password is sent as Latin-1 when every character
/// fits in a byte, UTF-8 otherwise.
///
/// # Errors
///
/// Returns `ApiError::AuthenticationFailed` if the challenge is not valid hex.
pub fn challenge_response(password: &str, challenge_hex: &str) -> Result<String> {
    let challenge = hex::decode(challenge_hex)
        .map_err(|e| ApiError::AuthenticationFailed(format!("invalid challenge: {e}")))?;
    let password = password_bytes(password);

    // Build MD5 hash of 0 + password + challenge
    let mut data = Vec::with_capacity(1 + password.len() + challenge.len());
    data.push(0u8);
    data.extend_from_slice(&password);
    data.extend_from_slice(&challenge);
    let digest = md5_compute(&data);

    let mut response = String::from("00");
    response.push_str(&hex::encode(digest.0));
    Ok(response)
}

fn password_bytes(password: &str) -> Vec<u8> {
    password
        .chars()
        .map(u8::try_from)
        .collect::<std::result::Result<Vec<u8>, _>>()
        .unwrap_or_else(|_| password.as_bytes().to_vec())
}

impl Session {
    /// Logs in with the MD5 challenge-response handshake
    ///
    /// # Errors
    ///
    /// Returns `ApiError::AuthenticationFailed` if the router rejects the
    /// credentials. The session is closed in that case and a new connection
    /// is needed to try again.
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        self.login_with(username, password, LoginMethod::Challenge)
            .await
    }

    /// Logs in with the given handshake
    ///
    /// # Errors
    ///
    /// Same as [`Session::login`]. `ApiError::InvalidState` if login was
    /// already attempted on this session.
    pub async fn login_with(
        &self,
        username: &str,
        password: &str,
        method: LoginMethod,
    ) -> Result<()> {
        self.advance(&SessionState::Connecting, SessionState::Authenticating)?;
        tracing::trace!("Attempting login for user: {}", username);

        let result = match method {
            LoginMethod::Challenge => self.challenge_login(username, password).await,
            LoginMethod::Plain => self.plain_login(username, password).await,
        };

        match result {
            Ok(()) => {
                self.advance(&SessionState::Authenticating, SessionState::Ready)?;
                tracing::debug!("Login successful for user: {}", username);
                Ok(())
            }
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                tracing::debug!("Login failed for user {}: {}", username, err);
                self.close_with(CloseReason::AuthenticationFailed);
                self.closed().await;
                Err(match err {
                    ApiError::Trap { message, .. } => ApiError::AuthenticationFailed(message),
                    other => other,
                })
            }
        }
    }

    async fn challenge_login(&self, username: &str, password: &str) -> Result<()> {
        let rows = self
            .request(&["/login"], &SessionState::Authenticating)
            .await?;
        let challenge = rows
            .iter()
            .find_map(|row| row.get("ret"))
            .ok_or_else(|| {
                ApiError::AuthenticationFailed("no challenge 'ret' received".to_string())
            })?;
        tracing::trace!("Challenge received, length: {}", challenge.len());

        let response = challenge_response(password, challenge)?;
        self.request(
            &[
                "/login".to_string(),
                format!("=name={username}"),
                format!("=response={response}"),
            ],
            &SessionState::Authenticating,
        )
        .await?;
        Ok(())
    }

    async fn plain_login(&self, username: &str, password: &str) -> Result<()> {
        let rows = self
            .request(
                &[
                    "/login".to_string(),
                    format!("=name={username}"),
                    format!("=password={password}"),
                ],
                &SessionState::Authenticating,
            )
            .await?;
        // pre-6.43 routers answer a plain login with a challenge instead of a trap
        if rows.iter().any(|row| row.contains_key("ret")) {
            return Err(ApiError::AuthenticationFailed(
                "router requires challenge login".to_string(),
            ));
        }
        Ok(())
    }
}
