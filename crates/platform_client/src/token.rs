use serde::Deserialize;

use crate::{PlatformClient, error::PlatformError};

/// Response shape of `POST https://oauth2.<platform>/token`.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    refresh_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub access_token: String,
    pub expires_in: jiff::SignedDuration,
    /// `Some` only when the Platform rotated the refresh token.
    pub refresh_token: Option<String>,
}

impl PlatformClient {
    /// `POST https://oauth2.<platform>/token` with
    /// `client_id, client_secret, refresh_token, grant_type=refresh_token`.
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<RefreshedToken, PlatformError> {
        let response = self
            .http
            .post(&self.token_endpoint)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let status = response.status();
        if let Some(error) = PlatformError::from_status(status) {
            tracing::warn!(%status, "token refresh failed");
            return Err(error);
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|error| PlatformError::Malformed(error.to_string()))?;

        Ok(RefreshedToken {
            access_token: body.access_token,
            expires_in: jiff::SignedDuration::from_secs(body.expires_in),
            refresh_token: body.refresh_token,
        })
    }

    /// `POST https://oauth2.<platform>/token` with
    /// `client_id, client_secret, code, redirect_uri, grant_type=authorization_code`.
    ///
    /// Backs the deposit-authorization-code RPC (§6): the one place outside
    /// the out-of-scope consent flow where this client turns a short-lived
    /// code into the access/refresh token pair the rest of the core stores.
    pub async fn exchange_authorization_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<RefreshedToken, PlatformError> {
        let response = self
            .http
            .post(&self.token_endpoint)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;

        let status = response.status();
        if let Some(error) = PlatformError::from_status(status) {
            tracing::warn!(%status, "authorization code exchange failed");
            return Err(error);
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|error| PlatformError::Malformed(error.to_string()))?;

        Ok(RefreshedToken {
            access_token: body.access_token,
            expires_in: jiff::SignedDuration::from_secs(body.expires_in),
            refresh_token: body.refresh_token,
        })
    }
}
