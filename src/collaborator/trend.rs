//! Real-time trend endpoint client

use async_trait::async_trait;
use log::debug;
use reqwest::Url;

use crate::{
    config::Trend,
    config_error,
    core::{context, error::RalResult, model::TrendSnapshot, traits::TrendFetch},
};

const REALTIME_TRENDS_PATH: &str = "/trends/api/realtimetrends";

pub struct HttpTrendClient {
    client: reqwest::Client,
    url: Url,
}

impl HttpTrendClient {
    pub fn new(conf: &Trend) -> RalResult<Self> {
        let mut url = Url::parse(&conf.endpoint)
            .and_then(|base| base.join(REALTIME_TRENDS_PATH))
            .map_err(|e| config_error!("invalid trend endpoint {}: {}", conf.endpoint, e))?;
        url.query_pairs_mut().extend_pairs([
            ("hl", conf.language.as_str()),
            ("tz", "-540"),
            ("cat", "all"),
            ("fi", "0"),
            ("fs", "0"),
            ("geo", conf.geo.as_str()),
            ("ri", "300"),
            ("rs", "20"),
            ("sort", "0"),
        ]);

        let client = reqwest::Client::builder()
            .connect_timeout(conf.timeout())
            .timeout(conf.timeout())
            .build()?;

        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl TrendFetch for HttpTrendClient {
    async fn fetch_trend(&self) -> RalResult<Option<TrendSnapshot>> {
        let body = self
            .client
            .get(self.url.clone())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(decode_trend_body(&body))
    }
}

/// Decode a trend response body.
///
/// The endpoint prefixes its JSON with a guard line that is dropped first. A
/// body without a line break is decoded as is. Undecodable bodies are absent.
pub fn decode_trend_body(body: &str) -> Option<TrendSnapshot> {
    let trimmed = body.trim();
    let payload = trimmed
        .split_once('\n')
        .map_or(trimmed, |(_, rest)| rest);

    match serde_json::from_str(payload) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            let correlation_id = context::current_correlation_id().unwrap_or_default();
            debug!(correlation_id = correlation_id.as_str(); "Discarding undecodable trend body: {e}");
            None
        }
    }
}
