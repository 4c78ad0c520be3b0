use std::num::NonZeroU32;
use std::time::Duration;

use color_eyre::eyre::{Result, WrapErr, eyre};
use governor::{
    Quota, RateLimiter, clock::DefaultClock, state::InMemoryState, state::direct::NotKeyed,
};
use reqwest::Client;
use url::Url;

use crate::config::DiscogsConfig;
use crate::discogs_rs::USER_AGENT;
use crate::discogs_rs::collection::{CollectionPage, get_collection_page};
use crate::ports::discogs::DiscogsClient;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub struct DiscogsHttpAdapter {
    client: Client,
    base_url: Url,
    token: Option<String>,
    rate_limiter: DirectRateLimiter,
}

impl DiscogsHttpAdapter {
    pub fn new(config: &DiscogsConfig) -> Result<Self> {
        let mut base_url = Url::parse(&config.api_base)
            .wrap_err_with(|| format!("Invalid Discogs API base URL: {}", config.api_base))?;
        // Url::join drops the last segment unless the base ends with a slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let per_minute = NonZeroU32::new(config.requests_per_minute)
            .ok_or(eyre!("Discogs requests per minute must be greater than 0"))?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .wrap_err("Failed to build Discogs HTTP client")?;

        Ok(Self {
            client,
            base_url,
            token: config.token.clone(),
            rate_limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        })
    }
}

#[async_trait::async_trait]
impl DiscogsClient for DiscogsHttpAdapter {
    async fn collection_page(
        &self,
        user: &str,
        page: u32,
        per_page: u32,
    ) -> Result<CollectionPage> {
        log::debug!("Waiting for Discogs rate limiter");
        self.rate_limiter.until_ready().await;

        get_collection_page(
            &self.client,
            &self.base_url,
            self.token.as_deref(),
            user,
            page,
            per_page,
        )
        .await
    }
}
