use google_youtube3::api::{Playlist, PlaylistItem, PlaylistItemSnippet, PlaylistSnippet, PlaylistStatus, ResourceId};

use crate::{PlatformClient, error::PlatformError};

pub enum Privacy {
    Private,
}

impl Privacy {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
        }
    }
}

impl PlatformClient {
    /// `playlists.insert` — creates the per-user managed playlist on first bootstrap.
    pub async fn create_playlist(
        &self,
        access_token: &str,
        name: &str,
        description: &str,
        privacy: Privacy,
    ) -> Result<String, PlatformError> {
        let body = Playlist {
            snippet: Some(PlaylistSnippet {
                title: Some(name.to_owned()),
                description: Some(description.to_owned()),
                ..Default::default()
            }),
            status: Some(PlaylistStatus {
                privacy_status: Some(privacy.as_str().to_owned()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let response = self
            .http
            .post(format!("{}/playlists", self.api_base))
            .bearer_auth(access_token)
            .query(&[("part", "snippet,status")])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if let Some(error) = PlatformError::from_status(status) {
            tracing::warn!(%status, "create_playlist failed");
            return Err(error);
        }

        let created: Playlist = response
            .json()
            .await
            .map_err(|error| PlatformError::Malformed(error.to_string()))?;

        created
            .id
            .ok_or_else(|| PlatformError::Malformed("playlist response missing id".into()))
    }

    /// `playlistItems.insert`, wrapped by the caller in §4.B's retry policy —
    /// this method performs exactly one attempt; see [`Self::insert_playlist_item_with_retry`].
    pub async fn insert_playlist_item(
        &self,
        access_token: &str,
        playlist_id: &str,
        video_id: &str,
    ) -> Result<(), PlatformError> {
        let body = PlaylistItem {
            snippet: Some(PlaylistItemSnippet {
                playlist_id: Some(playlist_id.to_owned()),
                resource_id: Some(ResourceId {
                    kind: Some("youtube#video".to_owned()),
                    video_id: Some(video_id.to_owned()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        let response = self
            .http
            .post(format!("{}/playlistItems", self.api_base))
            .bearer_auth(access_token)
            .query(&[("part", "snippet")])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if let Some(error) = PlatformError::from_status(status) {
            tracing::warn!(%status, playlist_id, video_id, "insert_playlist_item failed");
            return Err(error);
        }

        Ok(())
    }

    /// Exponential-backoff retry for [`Self::insert_playlist_item`]: 3 attempts,
    /// `2^n` seconds between them, only for `Transient` failures — `Unauthorized`
    /// propagates immediately so the caller can trigger a token refresh.
    pub async fn insert_playlist_item_with_retry(
        &self,
        access_token: &str,
        playlist_id: &str,
        video_id: &str,
    ) -> (Result<(), PlatformError>, u32) {
        const MAX_ATTEMPTS: u32 = 3;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .insert_playlist_item(access_token, playlist_id, video_id)
                .await
            {
                Ok(()) => return (Ok(()), attempt),
                Err(error) if error.is_transient() && attempt < MAX_ATTEMPTS => {
                    let backoff = std::time::Duration::from_secs(1 << attempt);
                    tracing::warn!(
                        attempt,
                        ?backoff,
                        %error,
                        "retrying playlist item insert after transient failure"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(error) => return (Err(error), attempt),
            }
        }
    }
}
