use crate::{
    challenge::{
        ChallengeError,
        Game,
        Outcome,
        PhaseKind,
        RevealOutcome,
        SessionBar,
        VisibleSeries,
    },
    config::{
        AppConfig,
        PERIODS,
        TICKERS,
        TickerOption,
    },
    market::{
        MarketService,
        PredictionRequest,
    },
};
use tracing::{
    error,
    info,
    warn,
};

const MAX_ERRORS: usize = 50;
const SHOWN_ERRORS: usize = 5;
const MAX_GUESS_LEN: usize = 16;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Scoreboard {
    pub user_wins: u32,
    pub model_wins: u32,
    pub ties: u32,
}

impl Scoreboard {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::UserWins => self.user_wins += 1,
            Outcome::ModelWins => self.model_wins += 1,
            Outcome::Tie => self.ties += 1,
        }
    }

    pub fn rounds(&self) -> u32 {
        self.user_wins + self.model_wins + self.ties
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoadRequest {
    pub ticker: String,
    pub period: String,
}

/// Everything the UI needs for one frame. The actual price is only present
/// once the round has been revealed.
#[derive(Clone, Debug)]
pub struct AppSnapshot {
    pub ticker: TickerOption,
    pub period: &'static str,
    pub phase: PhaseKind,
    pub round_id: u64,
    /// Ticker the current round was loaded for; the selector may have moved.
    pub round_ticker: Option<String>,
    pub target_date: Option<String>,
    pub visible: Option<VisibleSeries>,
    pub last_session: Option<SessionBar>,
    pub guess_input: String,
    pub result: Option<RevealOutcome>,
    pub scoreboard: Scoreboard,
    pub status: String,
    pub errors: Vec<String>,
}

pub struct AppController<S> {
    service: S,
    game: Game,
    ticker_index: usize,
    period_index: usize,
    guess_input: String,
    round_id: u64,
    scoreboard: Scoreboard,
    status: String,
    errors: Vec<String>,
}

impl<S: MarketService> AppController<S> {
    pub fn new(service: S, config: &AppConfig) -> Self {
        Self {
            service,
            game: Game::new(),
            ticker_index: config.ticker_index.min(TICKERS.len() - 1),
            period_index: config.period_index.min(PERIODS.len() - 1),
            guess_input: String::new(),
            round_id: 0,
            scoreboard: Scoreboard::default(),
            status: String::from("Press n to load a challenge"),
            errors: Vec::new(),
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn ticker(&self) -> TickerOption {
        TICKERS[self.ticker_index]
    }

    pub fn period(&self) -> &'static str {
        PERIODS[self.period_index]
    }

    pub fn guess_input(&self) -> &str {
        &self.guess_input
    }

    pub fn scoreboard(&self) -> Scoreboard {
        self.scoreboard
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn select_next_ticker(&mut self) {
        self.ticker_index = (self.ticker_index + 1) % TICKERS.len();
    }

    pub fn select_prev_ticker(&mut self) {
        self.ticker_index = (self.ticker_index + TICKERS.len() - 1) % TICKERS.len();
    }

    pub fn select_next_period(&mut self) {
        self.period_index = (self.period_index + 1) % PERIODS.len();
    }

    pub fn select_prev_period(&mut self) {
        self.period_index = (self.period_index + PERIODS.len() - 1) % PERIODS.len();
    }

    /// The guess field only takes input while a round is waiting for one.
    pub fn push_guess_char(&mut self, c: char) {
        if self.game.phase().kind() != PhaseKind::Ready {
            return;
        }
        if !(c.is_ascii_digit() || c == '.' || c == '-') {
            return;
        }
        if self.guess_input.len() < MAX_GUESS_LEN {
            self.guess_input.push(c);
        }
    }

    pub fn pop_guess_char(&mut self) {
        if self.game.phase().kind() == PhaseKind::Ready {
            self.guess_input.pop();
        }
    }

    pub fn dismiss_errors(&mut self) {
        self.errors.clear();
    }

    /// Resets the screen and moves the game to `Loading`. The caller awaits
    /// [`Self::complete_load`] with the returned request.
    pub fn begin_load(&mut self) -> Result<LoadRequest, ChallengeError> {
        let ticker = self.ticker().symbol;
        let period = self.period();
        self.errors.clear();
        self.guess_input.clear();
        if let Err(e) = self.game.begin_loading(ticker, period) {
            return Err(self.record_failure(e));
        }
        self.status = format!("Loading {ticker} ({period})...");
        info!(ticker, period, "loading challenge");
        Ok(LoadRequest {
            ticker: ticker.to_string(),
            period: period.to_string(),
        })
    }

    pub async fn complete_load(&mut self, request: LoadRequest) -> Result<(), ChallengeError> {
        let fetched = self
            .service
            .stock_data(&request.ticker, &request.period)
            .await;
        if let Err(e) = self.game.finish_loading(fetched) {
            self.status = format!("Could not load {}", request.ticker);
            return Err(self.record_failure(e));
        }
        self.round_id += 1;
        if let Some(round) = self.game.round() {
            info!(
                ticker = %request.ticker,
                period = %request.period,
                target_date = %round.challenge.target_date,
                points = round.visible.prices.len(),
                "challenge ready"
            );
            self.status = format!(
                "What will {} close at on {}?",
                request.ticker, round.challenge.target_date
            );
        }
        Ok(())
    }

    pub async fn load_round(&mut self) -> Result<(), ChallengeError> {
        let request = self.begin_load()?;
        self.complete_load(request).await
    }

    /// Validates the guess and disables the reveal trigger. Nothing is sent
    /// when this fails.
    pub fn begin_reveal(&mut self) -> Result<PredictionRequest, ChallengeError> {
        match self.game.begin_reveal(&self.guess_input) {
            Ok(request) => {
                self.errors.clear();
                self.status = String::from("Asking the model...");
                Ok(request)
            }
            Err(e) => Err(self.record_failure(e)),
        }
    }

    pub async fn complete_reveal(
        &mut self,
        request: PredictionRequest,
    ) -> Result<(), ChallengeError> {
        let response = self.service.predict(&request).await;
        let result = match self.game.finish_reveal(response) {
            Ok(result) => result.clone(),
            Err(e) => {
                self.status = String::from("Reveal failed, try again");
                return Err(self.record_failure(e));
            }
        };
        self.scoreboard.record(result.verdict.outcome);
        info!(
            ticker = %request.ticker,
            guess = result.guess,
            model_prediction = result.model_prediction,
            actual = result.actual_price,
            model = %result.model_name,
            outcome = ?result.verdict.outcome,
            "round revealed"
        );
        self.status = String::from("Results revealed. Press n for a new challenge");
        Ok(())
    }

    pub async fn reveal(&mut self) -> Result<(), ChallengeError> {
        let request = self.begin_reveal()?;
        self.complete_reveal(request).await
    }

    pub fn snapshot(&self) -> AppSnapshot {
        let round = self.game.round();
        AppSnapshot {
            ticker: self.ticker(),
            period: self.period(),
            phase: self.game.phase().kind(),
            round_id: self.round_id,
            round_ticker: round.map(|r| r.challenge.ticker.clone()),
            target_date: round.map(|r| r.challenge.target_date.clone()),
            visible: round.map(|r| r.visible.clone()),
            last_session: round.and_then(|r| r.last_session),
            guess_input: self.guess_input.clone(),
            result: self.game.revealed().cloned(),
            scoreboard: self.scoreboard,
            status: self.status.clone(),
            errors: self.errors.iter().rev().take(SHOWN_ERRORS).cloned().collect(),
        }
    }

    fn record_failure(&mut self, e: ChallengeError) -> ChallengeError {
        if e.is_user_input() {
            warn!(error = %e, "rejected user action");
        } else {
            error!(error = %e, "round step failed");
        }
        self.errors.push(e.to_string());
        if self.errors.len() > MAX_ERRORS {
            let drain = self.errors.len() - MAX_ERRORS;
            self.errors.drain(0..drain);
        }
        e
    }
}
