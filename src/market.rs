use crate::challenge::PREDICTION_WINDOW;
use serde::{
    Deserialize,
    Serialize,
    de::DeserializeOwned,
};
use std::future::Future;
use thiserror::Error;
use tracing::{
    debug,
    error,
};

pub const STOCK_DATA_FALLBACK: &str = "Failed to fetch data from server.";
pub const PREDICTION_FALLBACK: &str = "Failed to get prediction from model.";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Request to the game server failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// Non-2xx response; holds the server's `error` message or the endpoint
    /// fallback.
    #[error("{0}")]
    Rejected(String),
    #[error("Invalid response from the game server: {0}")]
    InvalidResponse(String),
}

/// Body of `GET /get_stock_data`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    pub dates: Vec<String>,
    pub close_prices: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_prices: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_prices: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_prices: Option<Vec<f64>>,
}

/// Body of `POST /predict`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub ticker: String,
    pub recent_data: [f64; PREDICTION_WINDOW],
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub predicted_price: f64,
    #[serde(default)]
    pub model_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

/// The two backend calls a round needs.
pub trait MarketService {
    fn stock_data(
        &self,
        ticker: &str,
        period: &str,
    ) -> impl Future<Output = Result<PriceHistory, ServiceError>>;

    fn predict(
        &self,
        request: &PredictionRequest,
    ) -> impl Future<Output = Result<Prediction, ServiceError>>;
}

#[derive(Clone, Debug)]
pub struct HttpMarketService {
    base_url: String,
    http: reqwest::Client,
}

impl HttpMarketService {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ServiceError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder().build()?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl MarketService for HttpMarketService {
    async fn stock_data(
        &self,
        ticker: &str,
        period: &str,
    ) -> Result<PriceHistory, ServiceError> {
        let url = format!("{}/get_stock_data", self.base_url);
        debug!(%url, ticker, period, "requesting stock data");
        let res = self
            .http
            .get(url)
            .query(&[("ticker", ticker), ("period", period)])
            .send()
            .await?;
        decode(res, STOCK_DATA_FALLBACK).await
    }

    async fn predict(&self, request: &PredictionRequest) -> Result<Prediction, ServiceError> {
        let url = format!("{}/predict", self.base_url);
        debug!(%url, ticker = %request.ticker, "requesting model prediction");
        let res = self.http.post(url).json(request).send().await?;
        decode(res, PREDICTION_FALLBACK).await
    }
}

async fn decode<T: DeserializeOwned>(
    res: reqwest::Response,
    fallback: &str,
) -> Result<T, ServiceError> {
    let status = res.status();
    let bytes = res.bytes().await?;
    if !status.is_success() {
        let message = serde_json::from_slice::<ErrorBody>(&bytes)
            .ok()
            .and_then(|body| body.error)
            .filter(|msg| !msg.is_empty())
            .unwrap_or_else(|| fallback.to_string());
        error!(%status, %message, "game server rejected request");
        return Err(ServiceError::Rejected(message));
    }
    serde_json::from_slice(&bytes).map_err(|e| ServiceError::InvalidResponse(e.to_string()))
}
