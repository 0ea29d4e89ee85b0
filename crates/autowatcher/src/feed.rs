//! Atom feed parsing for the webhook receiver's POST handler (§4.E).
//!
//! The hub delivers one `<entry>` per notification, namespaced with both an
//! Atom xmlns and a platform-specific `yt:` schema. `quick_xml` strips
//! namespace prefixes under serde, hence the `alias`ed field names below —
//! carried forward unchanged from the reference deployment's `feed` module,
//! since this is exactly the XML shape the hub actually sends.

use monostate::MustBe;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Feed {
    #[serde(rename = "@xmlns")]
    _namespace: MustBe!("http://www.w3.org/2005/Atom"),
    #[serde(rename = "@xmlns:yt")]
    _namespace_yt: MustBe!("http://www.youtube.com/xml/schemas/2015"),
    pub entry: Entry,
}

#[derive(Debug, Deserialize)]
pub struct Entry {
    #[serde(rename = "yt:videoId")]
    #[serde(alias = "videoId")]
    pub video_id: String,
    #[serde(rename = "yt:channelId")]
    #[serde(alias = "channelId")]
    pub channel_id: String,
    pub title: Option<String>,
}

#[cfg(test)]
mod test {
    use super::Feed;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns:yt="http://www.youtube.com/xml/schemas/2015" xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <id>yt:video:VID1</id>
    <yt:videoId>VID1</yt:videoId>
    <yt:channelId>CH1</yt:channelId>
    <title>Hello</title>
    <published>2026-07-28T00:00:00+00:00</published>
    <updated>2026-07-28T00:05:00+00:00</updated>
  </entry>
</feed>"#;

    #[test]
    fn parses_sample_notification() {
        let feed = quick_xml::de::from_str::<Feed>(SAMPLE).unwrap();
        assert_eq!(feed.entry.video_id, "VID1");
        assert_eq!(feed.entry.channel_id, "CH1");
        assert_eq!(feed.entry.title.as_deref(), Some("Hello"));
    }

    #[test]
    fn missing_video_id_fails_to_parse() {
        let without_video_id = SAMPLE.replace("<yt:videoId>VID1</yt:videoId>", "");
        assert!(quick_xml::de::from_str::<Feed>(&without_video_id).is_err());
    }

    #[test]
    fn missing_title_still_parses() {
        let without_title = SAMPLE.replace("<title>Hello</title>", "");
        let feed = quick_xml::de::from_str::<Feed>(&without_title).unwrap();
        assert_eq!(feed.entry.title, None);
    }

    #[test]
    fn wrong_namespace_fails_to_parse() {
        let bad_namespace = SAMPLE.replace(
            "http://www.youtube.com/xml/schemas/2015",
            "http://example.com/not-youtube",
        );
        assert!(quick_xml::de::from_str::<Feed>(&bad_namespace).is_err());
    }
}
