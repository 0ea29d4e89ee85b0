use google_youtube3::api::SubscriptionListResponse;

use crate::{PlatformClient, error::PlatformError};

#[derive(Debug, Clone)]
pub struct ChannelSubscription {
    pub channel_id: String,
    pub title: String,
    pub thumbnail: Option<String>,
}

impl PlatformClient {
    /// Lists every channel the authenticated user is subscribed to on the
    /// Platform, following `nextPageToken` until exhausted.
    pub async fn list_user_subscriptions(
        &self,
        access_token: &str,
    ) -> Result<Vec<ChannelSubscription>, PlatformError> {
        let mut subscriptions = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(format!("{}/subscriptions", self.api_base))
                .bearer_auth(access_token)
                .query(&[("part", "snippet"), ("mine", "true"), ("maxResults", "50")]);

            if let Some(token) = page_token.as_deref() {
                request = request.query(&[("pageToken", token)]);
            }

            let response = request.send().await?;
            let status = response.status();
            if let Some(error) = PlatformError::from_status(status) {
                tracing::warn!(%status, "list_user_subscriptions failed");
                return Err(error);
            }

            let page: SubscriptionListResponse = response
                .json()
                .await
                .map_err(|error| PlatformError::Malformed(error.to_string()))?;

            for item in page.items.into_iter().flatten() {
                let Some(snippet) = item.snippet else {
                    continue;
                };
                let Some(channel_id) = snippet.resource_id.and_then(|r| r.channel_id) else {
                    continue;
                };

                subscriptions.push(ChannelSubscription {
                    channel_id,
                    title: snippet.title.unwrap_or_default(),
                    thumbnail: snippet
                        .thumbnails
                        .and_then(|t| t.default)
                        .and_then(|t| t.url),
                });
            }

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        Ok(subscriptions)
    }
}
