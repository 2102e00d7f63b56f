use crate::market::{
    MarketService,
    Prediction,
    PredictionRequest,
    PriceHistory,
    ServiceError,
};
use chrono::{
    Days,
    NaiveDate,
};
use std::{
    collections::VecDeque,
    sync::{
        Arc,
        Mutex,
    },
};

/// Daily closes starting 2024-01-01, one calendar day apart.
pub fn history(prices: &[f64]) -> PriceHistory {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let dates = (0..prices.len())
        .map(|i| {
            start
                .checked_add_days(Days::new(i as u64))
                .unwrap()
                .format("%Y-%m-%d")
                .to_string()
        })
        .collect();
    PriceHistory {
        dates,
        close_prices: prices.to_vec(),
        ..PriceHistory::default()
    }
}

pub fn prediction(price: f64, model_name: Option<&str>) -> Prediction {
    Prediction {
        predicted_price: price,
        model_name: model_name.map(str::to_string),
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RecordedCall {
    StockData { ticker: String, period: String },
    Predict(PredictionRequest),
}

type Script<T> = Arc<Mutex<VecDeque<Result<T, ServiceError>>>>;

/// Replays scripted responses in order and records every call it receives.
#[derive(Clone, Default)]
pub struct FakeMarketService {
    stock_data: Script<PriceHistory>,
    predictions: Script<Prediction>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl FakeMarketService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_stock_data(&self, response: Result<PriceHistory, ServiceError>) {
        self.stock_data.lock().unwrap().push_back(response);
    }

    pub fn push_prediction(&self, response: Result<Prediction, ServiceError>) {
        self.predictions.lock().unwrap().push_back(response);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn prediction_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, RecordedCall::Predict(_)))
            .count()
    }

    pub fn stock_data_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, RecordedCall::StockData { .. }))
            .count()
    }
}

fn next_scripted<T>(script: &Script<T>) -> Result<T, ServiceError> {
    script
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Err(ServiceError::Rejected("no scripted response".into())))
}

impl MarketService for FakeMarketService {
    async fn stock_data(
        &self,
        ticker: &str,
        period: &str,
    ) -> Result<PriceHistory, ServiceError> {
        self.calls.lock().unwrap().push(RecordedCall::StockData {
            ticker: ticker.to_string(),
            period: period.to_string(),
        });
        next_scripted(&self.stock_data)
    }

    async fn predict(&self, request: &PredictionRequest) -> Result<Prediction, ServiceError> {
        self.calls
            .lock()
            .unwrap()
            .push(RecordedCall::Predict(request.clone()));
        next_scripted(&self.predictions)
    }
}
