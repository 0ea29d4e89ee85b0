use serde::Deserialize;

use crate::{PlatformClient, error::PlatformError};

#[derive(Debug, Clone)]
pub struct RecentVideo {
    pub video_id: String,
    pub title: String,
    pub published_at: jiff::Timestamp,
}

/// Hand-rolled mirror of `search.list`'s JSON shape, scoped to the fields
/// the poller needs. `google_youtube3::api::SearchResult` dates through
/// `chrono`, which would force a second timestamp library into this crate
/// purely for one field — not worth it for three fields we can deserialize
/// directly into `jiff::Timestamp`.
#[derive(Debug, Deserialize)]
struct SearchListResponse {
    items: Option<Vec<SearchResultItem>>,
}

#[derive(Debug, Deserialize)]
struct SearchResultItem {
    id: Option<SearchResultId>,
    snippet: Option<SearchResultSnippet>,
}

#[derive(Debug, Deserialize)]
struct SearchResultId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResultSnippet {
    title: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
}

impl PlatformClient {
    /// `search.list` scoped to one channel's recent uploads, ordered by
    /// publish date ascending, capped at 10 results and `since` per §4.F.
    pub async fn search_channel_recent(
        &self,
        access_token: &str,
        channel_id: &str,
        since: jiff::Timestamp,
    ) -> Result<Vec<RecentVideo>, PlatformError> {
        let response = self
            .http
            .get(format!("{}/search", self.api_base))
            .bearer_auth(access_token)
            .query(&[
                ("part", "snippet"),
                ("channelId", channel_id),
                ("type", "video"),
                ("order", "date"),
                ("maxResults", "10"),
                ("publishedAfter", &since.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if let Some(error) = PlatformError::from_status(status) {
            tracing::warn!(%status, channel_id, "search_channel_recent failed");
            return Err(error);
        }

        let page: SearchListResponse = response
            .json()
            .await
            .map_err(|error| PlatformError::Malformed(error.to_string()))?;

        let mut videos: Vec<RecentVideo> = page
            .items
            .into_iter()
            .flatten()
            .filter_map(|item| {
                let video_id = item.id?.video_id?;
                let snippet = item.snippet?;
                let published_at: jiff::Timestamp = snippet.published_at?.parse().ok()?;

                Some(RecentVideo {
                    video_id,
                    title: snippet.title.unwrap_or_default(),
                    published_at,
                })
            })
            .collect();

        videos.sort_by_key(|video| video.published_at);
        Ok(videos)
    }
}
