//! Thin authenticated HTTP client to the Platform (§4.B).
//!
//! Deliberately does NOT use `google-youtube3`'s bundled `yup_oauth2`
//! authenticator — token lifecycle here is owned by `token_vault` and the
//! refresh loop, not by a second, competing token store. The Google API
//! client's generated request/response model types are still reused for
//! their shape wherever the response is deserialized directly into them.

pub mod error;
mod playlist;
mod search;
mod subscriptions;
mod token;

pub use error::PlatformError;
pub use playlist::Privacy;
pub use search::RecentVideo;
pub use subscriptions::ChannelSubscription;
pub use token::RefreshedToken;

const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3";
const DEFAULT_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

#[derive(Clone)]
pub struct PlatformClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    api_base: String,
    token_endpoint: String,
}

impl PlatformClient {
    pub fn new(http: reqwest::Client, client_id: String, client_secret: String) -> Self {
        Self {
            http,
            client_id,
            client_secret,
            api_base: DEFAULT_API_BASE.to_owned(),
            token_endpoint: DEFAULT_TOKEN_ENDPOINT.to_owned(),
        }
    }

    /// Points this client at a different API base and token endpoint,
    /// e.g. an in-process test double standing in for the real Platform.
    pub fn with_api_base(mut self, api_base: String, token_endpoint: String) -> Self {
        self.api_base = api_base;
        self.token_endpoint = token_endpoint;
        self
    }
}
