use color_eyre::eyre::{
    Result,
    eyre,
};
use std::path::PathBuf;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_LOG_DIR: &str = "./logs";
pub const DEFAULT_PERIOD: &str = "1mo";

/// Look-back windows the data service understands.
pub const PERIODS: [&str; 5] = ["5d", "1mo", "3mo", "6mo", "1y"];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TickerOption {
    pub name: &'static str,
    pub symbol: &'static str,
}

/// Tickers the prediction service has trained models for.
pub const TICKERS: [TickerOption; 6] = [
    TickerOption {
        name: "Google",
        symbol: "GOOGL",
    },
    TickerOption {
        name: "NVIDIA",
        symbol: "NVDA",
    },
    TickerOption {
        name: "Citi",
        symbol: "C",
    },
    TickerOption {
        name: "Reliance Industries",
        symbol: "RELIANCE.NS",
    },
    TickerOption {
        name: "HCL India",
        symbol: "HCLTECH.NS",
    },
    TickerOption {
        name: "Tesla",
        symbol: "TSLA",
    },
];

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub api_url: String,
    pub ticker_index: usize,
    pub period_index: usize,
    pub log_dir: PathBuf,
    pub autoload: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ticker_index: 0,
            period_index: period_index(DEFAULT_PERIOD).unwrap_or(0),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            autoload: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CliCommand {
    Run(AppConfig),
    Help,
}

pub fn ticker_index(symbol: &str) -> Option<usize> {
    TICKERS
        .iter()
        .position(|t| t.symbol.eq_ignore_ascii_case(symbol))
}

pub fn period_index(period: &str) -> Option<usize> {
    PERIODS.iter().position(|p| p.eq_ignore_ascii_case(period))
}

pub fn usage() -> String {
    let tickers: Vec<&str> = TICKERS.iter().map(|t| t.symbol).collect();
    format!(
        "Usage: beat-the-model [--api-url <url>] [--ticker <symbol>] [--period <period>]\n\
         [--log-dir <path>] [--no-autoload]\n\
         \n\
         Flags:\n\
           --api-url <url>     Game server base URL (default {})\n\
           --ticker <symbol>   Ticker to start with, one of: {}\n\
           --period <period>   Look-back period, one of: {} (default {})\n\
           --log-dir <path>    Directory for the rolling log file (default {})\n\
           --no-autoload       Wait for `n` before loading the first challenge",
        DEFAULT_API_URL,
        tickers.join(", "),
        PERIODS.join(", "),
        DEFAULT_PERIOD,
        DEFAULT_LOG_DIR,
    )
}

pub fn parse_args<I>(args: I) -> Result<CliCommand>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut config = AppConfig::default();
    let mut api_url: Option<String> = None;
    let mut ticker: Option<usize> = None;
    let mut period: Option<usize> = None;
    let mut log_dir: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--api-url" => {
                let url = args
                    .next()
                    .ok_or_else(|| eyre!("--api-url requires a URL argument"))?;
                if api_url.is_some() {
                    return Err(eyre!("--api-url may only be specified once"));
                }
                if url.trim().is_empty() {
                    return Err(eyre!("--api-url must not be empty"));
                }
                api_url = Some(url.trim_end_matches('/').to_string());
            }
            "--ticker" => {
                let symbol = args
                    .next()
                    .ok_or_else(|| eyre!("--ticker requires a symbol argument"))?;
                if ticker.is_some() {
                    return Err(eyre!("--ticker may only be specified once"));
                }
                let idx = ticker_index(&symbol)
                    .ok_or_else(|| eyre!("Unknown ticker: {symbol}"))?;
                ticker = Some(idx);
            }
            "--period" => {
                let raw = args
                    .next()
                    .ok_or_else(|| eyre!("--period requires a period argument"))?;
                if period.is_some() {
                    return Err(eyre!("--period may only be specified once"));
                }
                let idx =
                    period_index(&raw).ok_or_else(|| eyre!("Unknown period: {raw}"))?;
                period = Some(idx);
            }
            "--log-dir" => {
                let dir = args
                    .next()
                    .ok_or_else(|| eyre!("--log-dir requires a path argument"))?;
                if log_dir.is_some() {
                    return Err(eyre!("--log-dir may only be specified once"));
                }
                let expanded = shellexpand::tilde(&dir);
                log_dir = Some(PathBuf::from(expanded.into_owned()));
            }
            "--no-autoload" => config.autoload = false,
            "--help" | "-h" => return Ok(CliCommand::Help),
            other => return Err(eyre!("Unknown argument: {other}")),
        }
    }

    if let Some(url) = api_url {
        config.api_url = url;
    }
    if let Some(idx) = ticker {
        config.ticker_index = idx;
    }
    if let Some(idx) = period {
        config.period_index = idx;
    }
    if let Some(dir) = log_dir {
        config.log_dir = dir;
    }
    Ok(CliCommand::Run(config))
}
