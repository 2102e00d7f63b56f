//! Round logic for the "beat the model" game.
//!
//! Everything in here is pure: the controller feeds service responses in and
//! reads the resulting [`Phase`] back out, so a whole round can be driven
//! without a terminal or a network.

use crate::market::{
    Prediction,
    PredictionRequest,
    PriceHistory,
    ServiceError,
};
use std::cmp::Ordering;
use thiserror::Error;

/// Number of closing prices the model consumes.
pub const PREDICTION_WINDOW: usize = 7;
/// Prediction window plus the held-out day.
pub const MIN_SERIES_LEN: usize = PREDICTION_WINDOW + 1;
pub const UNKNOWN_MODEL: &str = "Unknown";

#[derive(Debug, Error)]
pub enum ChallengeError {
    #[error("{0}")]
    Service(#[from] ServiceError),
    #[error("Not enough data to run a challenge. Try a longer period.")]
    InsufficientData { points: usize },
    #[error("Data integrity error. Could not extract 7 days for prediction.")]
    DataIntegrity,
    #[error("Data integrity error. Got {dates} dates for {prices} closing prices.")]
    MismatchedSeries { dates: usize, prices: usize },
    #[error("Please select a ticker and a period first!")]
    MissingSelection,
    #[error("Please enter your prediction first!")]
    MissingPrediction,
    #[error("'{0}' is not a valid price. Enter a number like 123.45")]
    InvalidPrediction(String),
    #[error("Load a challenge before revealing results.")]
    NoActiveRound,
    #[error("Still waiting for the model. Hang on!")]
    RevealInProgress,
    #[error("Results already revealed. Start a new challenge to play again.")]
    AlreadyRevealed,
    #[error("No request is in flight.")]
    NothingPending,
}

impl ChallengeError {
    /// Errors caused by what the user typed or pressed, as opposed to the
    /// data or the service.
    pub fn is_user_input(&self) -> bool {
        matches!(
            self,
            ChallengeError::MissingSelection
                | ChallengeError::MissingPrediction
                | ChallengeError::InvalidPrediction(_)
                | ChallengeError::NoActiveRound
                | ChallengeError::RevealInProgress
                | ChallengeError::AlreadyRevealed
        )
    }
}

/// The hidden part of a round: what gets sent to the model and what both
/// guesses are measured against.
#[derive(Clone, Debug, PartialEq)]
pub struct Challenge {
    pub ticker: String,
    pub target_date: String,
    pub actual_price: f64,
    pub prediction_window: [f64; PREDICTION_WINDOW],
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct VisibleSeries {
    pub dates: Vec<String>,
    pub prices: Vec<f64>,
}

/// OHLC of the last visible trading day, when the service sends it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionBar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Round {
    pub challenge: Challenge,
    pub visible: VisibleSeries,
    pub last_session: Option<SessionBar>,
}

/// Splits a fetched history into the chart series, the held-out target and
/// the prediction window.
pub fn partition(ticker: &str, history: PriceHistory) -> Result<Round, ChallengeError> {
    let PriceHistory {
        mut dates,
        mut close_prices,
        open_prices,
        high_prices,
        low_prices,
    } = history;

    if close_prices.len() < MIN_SERIES_LEN {
        return Err(ChallengeError::InsufficientData {
            points: close_prices.len(),
        });
    }
    if dates.len() != close_prices.len() {
        return Err(ChallengeError::MismatchedSeries {
            dates: dates.len(),
            prices: close_prices.len(),
        });
    }

    let (Some(target_date), Some(actual_price)) = (dates.pop(), close_prices.pop())
    else {
        return Err(ChallengeError::InsufficientData { points: 0 });
    };

    let start = close_prices.len().saturating_sub(PREDICTION_WINDOW);
    let prediction_window: [f64; PREDICTION_WINDOW] = close_prices[start..]
        .try_into()
        .map_err(|_| ChallengeError::DataIntegrity)?;

    let last_session = close_prices.len().checked_sub(1).and_then(|idx| {
        Some(SessionBar {
            open: *open_prices.as_ref()?.get(idx)?,
            high: *high_prices.as_ref()?.get(idx)?,
            low: *low_prices.as_ref()?.get(idx)?,
            close: close_prices[idx],
        })
    });

    Ok(Round {
        challenge: Challenge {
            ticker: ticker.to_string(),
            target_date,
            actual_price,
            prediction_window,
        },
        visible: VisibleSeries {
            dates,
            prices: close_prices,
        },
        last_session,
    })
}

/// Parses the free-text guess. Unparsable or non-finite input is rejected
/// rather than coerced.
pub fn parse_guess(input: &str) -> Result<f64, ChallengeError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ChallengeError::MissingPrediction);
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(ChallengeError::InvalidPrediction(trimmed.to_string())),
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Outcome {
    UserWins,
    ModelWins,
    Tie,
}

impl Outcome {
    pub fn from_diffs(user_diff: f64, model_diff: f64) -> Self {
        match user_diff.total_cmp(&model_diff) {
            Ordering::Less => Outcome::UserWins,
            Ordering::Greater => Outcome::ModelWins,
            Ordering::Equal => Outcome::Tie,
        }
    }

    pub fn banner(self) -> &'static str {
        match self {
            Outcome::UserWins => "🎉 YOU BEAT THE MODEL! 🎉",
            Outcome::ModelWins => "🤖 THE ML MODEL WINS!",
            Outcome::Tie => "IT'S A TIE!",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Verdict {
    pub user_diff: f64,
    pub model_diff: f64,
    pub outcome: Outcome,
}

impl Verdict {
    /// The user side is highlighted on ties as well.
    pub fn user_highlighted(&self) -> bool {
        self.user_diff <= self.model_diff
    }

    pub fn model_highlighted(&self) -> bool {
        self.model_diff < self.user_diff
    }
}

pub fn score(guess: f64, model_prediction: f64, actual: f64) -> Verdict {
    let user_diff = (guess - actual).abs();
    let model_diff = (model_prediction - actual).abs();
    Verdict {
        user_diff,
        model_diff,
        outcome: Outcome::from_diffs(user_diff, model_diff),
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RevealOutcome {
    pub actual_price: f64,
    pub guess: f64,
    pub model_prediction: f64,
    pub model_name: String,
    pub verdict: Verdict,
}

impl RevealOutcome {
    fn new(challenge: &Challenge, guess: f64, prediction: Prediction) -> Self {
        let model_name = prediction
            .model_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_MODEL.to_string());
        Self {
            actual_price: challenge.actual_price,
            guess,
            model_prediction: prediction.predicted_price,
            model_name,
            verdict: score(guess, prediction.predicted_price, challenge.actual_price),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum Phase {
    #[default]
    Idle,
    Loading {
        ticker: String,
        period: String,
    },
    Ready(Round),
    Revealing {
        round: Round,
        guess: f64,
    },
    Revealed {
        round: Round,
        result: RevealOutcome,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PhaseKind {
    Idle,
    Loading,
    Ready,
    Revealing,
    Revealed,
}

impl Phase {
    pub fn kind(&self) -> PhaseKind {
        match self {
            Phase::Idle => PhaseKind::Idle,
            Phase::Loading { .. } => PhaseKind::Loading,
            Phase::Ready(_) => PhaseKind::Ready,
            Phase::Revealing { .. } => PhaseKind::Revealing,
            Phase::Revealed { .. } => PhaseKind::Revealed,
        }
    }
}

/// A round's state machine: `Idle → Loading → Ready → Revealing → Revealed`.
///
/// The round lives inside the phase, so starting a new one always drops the
/// old one wholesale.
#[derive(Debug, Default)]
pub struct Game {
    phase: Phase,
}

impl Game {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn round(&self) -> Option<&Round> {
        match &self.phase {
            Phase::Ready(round)
            | Phase::Revealing { round, .. }
            | Phase::Revealed { round, .. } => Some(round),
            Phase::Idle | Phase::Loading { .. } => None,
        }
    }

    pub fn revealed(&self) -> Option<&RevealOutcome> {
        match &self.phase {
            Phase::Revealed { result, .. } => Some(result),
            _ => None,
        }
    }

    /// Discards whatever round was active and waits for fresh data.
    pub fn begin_loading(&mut self, ticker: &str, period: &str) -> Result<(), ChallengeError> {
        if ticker.trim().is_empty() || period.trim().is_empty() {
            return Err(ChallengeError::MissingSelection);
        }
        self.phase = Phase::Loading {
            ticker: ticker.to_string(),
            period: period.to_string(),
        };
        Ok(())
    }

    /// On failure the game drops back to `Idle`; nothing from the response is
    /// kept.
    pub fn finish_loading(
        &mut self,
        fetched: Result<PriceHistory, ServiceError>,
    ) -> Result<(), ChallengeError> {
        let Phase::Loading { ticker, .. } = &self.phase else {
            return Err(ChallengeError::NothingPending);
        };
        let partitioned = fetched
            .map_err(ChallengeError::from)
            .and_then(|history| partition(ticker, history));
        match partitioned {
            Ok(round) => {
                self.phase = Phase::Ready(round);
                Ok(())
            }
            Err(e) => {
                self.phase = Phase::Idle;
                Err(e)
            }
        }
    }

    /// Validates the guess and moves to `Revealing`, handing back the request
    /// the model service should receive. Any error leaves the phase as it was.
    pub fn begin_reveal(&mut self, guess_input: &str) -> Result<PredictionRequest, ChallengeError> {
        match &self.phase {
            Phase::Idle | Phase::Loading { .. } => return Err(ChallengeError::NoActiveRound),
            Phase::Revealing { .. } => return Err(ChallengeError::RevealInProgress),
            Phase::Revealed { .. } => return Err(ChallengeError::AlreadyRevealed),
            Phase::Ready(_) => {}
        }
        let guess = parse_guess(guess_input)?;
        let Phase::Ready(round) = std::mem::take(&mut self.phase) else {
            return Err(ChallengeError::NoActiveRound);
        };
        let request = PredictionRequest {
            ticker: round.challenge.ticker.clone(),
            recent_data: round.challenge.prediction_window,
        };
        self.phase = Phase::Revealing { round, guess };
        Ok(request)
    }

    /// Scores the round on success; on failure the round goes back to
    /// `Ready` untouched so the user can retry.
    pub fn finish_reveal(
        &mut self,
        response: Result<Prediction, ServiceError>,
    ) -> Result<&RevealOutcome, ChallengeError> {
        if !matches!(self.phase, Phase::Revealing { .. }) {
            return Err(ChallengeError::NothingPending);
        }
        let Phase::Revealing { round, guess } = std::mem::take(&mut self.phase) else {
            return Err(ChallengeError::NothingPending);
        };

        let prediction = response.and_then(|prediction| {
            if prediction.predicted_price.is_finite() {
                Ok(prediction)
            } else {
                Err(ServiceError::InvalidResponse(format!(
                    "model returned a non-finite prediction ({})",
                    prediction.predicted_price
                )))
            }
        });

        match prediction {
            Ok(prediction) => {
                let result = RevealOutcome::new(&round.challenge, guess, prediction);
                self.phase = Phase::Revealed { round, result };
                self.revealed().ok_or(ChallengeError::NothingPending)
            }
            Err(e) => {
                self.phase = Phase::Ready(round);
                Err(e.into())
            }
        }
    }
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::history;
    use proptest::prelude::*;

    fn ready_game(prices: &[f64]) -> Game {
        let mut game = Game::new();
        game.begin_loading("GOOGL", "1mo").unwrap();
        game.finish_loading(Ok(history(prices))).unwrap();
        game
    }

    #[test]
    fn partition__splits_nine_points_into_chart_target_and_window() {
        // given
        let prices = [10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0, 17.0, 18.0];
        let fetched = history(&prices);
        let dates = fetched.dates.clone();

        // when
        let round = partition("GOOGL", fetched).unwrap();

        // then
        assert_eq!(round.challenge.actual_price, 18.0);
        assert_eq!(round.challenge.target_date, dates[8]);
        assert_eq!(
            round.challenge.prediction_window,
            [11.0, 12.0, 13.0, 14.0, 15.0, 16.0, 17.0]
        );
        assert_eq!(round.visible.dates, dates[..8].to_vec());
        assert_eq!(round.visible.prices, prices[..8].to_vec());
    }

    #[test]
    fn partition__rejects_seven_points() {
        let result = partition("GOOGL", history(&[1.0; 7]));

        assert!(matches!(
            result,
            Err(ChallengeError::InsufficientData { points: 7 })
        ));
    }

    #[test]
    fn partition__rejects_dates_and_prices_of_different_length() {
        // given
        let mut fetched = history(&[1.0; 9]);
        fetched.dates.pop();

        // when
        let result = partition("GOOGL", fetched);

        // then
        assert!(matches!(
            result,
            Err(ChallengeError::MismatchedSeries { dates: 8, prices: 9 })
        ));
    }

    #[test]
    fn partition__keeps_ohlc_of_last_visible_day() {
        // given
        let mut fetched = history(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0, 17.0, 18.0]);
        fetched.open_prices = Some((0..9).map(|i| 100.0 + i as f64).collect());
        fetched.high_prices = Some((0..9).map(|i| 200.0 + i as f64).collect());
        fetched.low_prices = Some((0..9).map(|i| 50.0 + i as f64).collect());

        // when
        let round = partition("GOOGL", fetched).unwrap();

        // then
        let expected = SessionBar {
            open: 107.0,
            high: 207.0,
            low: 57.0,
            close: 17.0,
        };
        assert_eq!(round.last_session, Some(expected));
    }

    #[test]
    fn partition__no_session_bar_without_ohlc_columns() {
        let round = partition("GOOGL", history(&[1.0; 8])).unwrap();

        assert_eq!(round.last_session, None);
    }

    #[test]
    fn parse_guess__rejects_blank_input() {
        assert!(matches!(parse_guess(""), Err(ChallengeError::MissingPrediction)));
        assert!(matches!(parse_guess("   "), Err(ChallengeError::MissingPrediction)));
    }

    #[test]
    fn parse_guess__rejects_text_and_non_finite_numbers() {
        for input in ["abc", "1.2.3", "NaN", "inf", "-"] {
            assert!(
                matches!(parse_guess(input), Err(ChallengeError::InvalidPrediction(_))),
                "{input} should be rejected"
            );
        }
    }

    #[test]
    fn parse_guess__accepts_padded_decimal() {
        assert_eq!(parse_guess(" 123.45 ").unwrap(), 123.45);
    }

    #[test]
    fn score__model_closer_wins() {
        let verdict = score(20.0, 19.0, 18.0);

        assert_eq!(verdict.user_diff, 2.0);
        assert_eq!(verdict.model_diff, 1.0);
        assert_eq!(verdict.outcome, Outcome::ModelWins);
        assert!(verdict.model_highlighted());
        assert!(!verdict.user_highlighted());
    }

    #[test]
    fn score__equal_distance_is_a_tie() {
        let verdict = score(19.0, 17.0, 18.0);

        assert_eq!(verdict.user_diff, 1.0);
        assert_eq!(verdict.model_diff, 1.0);
        assert_eq!(verdict.outcome, Outcome::Tie);
        assert!(verdict.user_highlighted());
        assert!(!verdict.model_highlighted());
    }

    #[test]
    fn score__user_closer_wins() {
        let verdict = score(18.5, 20.0, 18.0);

        assert_eq!(verdict.outcome, Outcome::UserWins);
    }

    #[test]
    fn begin_reveal__requires_a_ready_round() {
        let mut game = Game::new();

        let result = game.begin_reveal("10");

        assert!(matches!(result, Err(ChallengeError::NoActiveRound)));
        assert_eq!(game.phase(), &Phase::Idle);
    }

    #[test]
    fn begin_reveal__blank_guess_keeps_round_ready() {
        // given
        let mut game = ready_game(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);

        // when
        let result = game.begin_reveal("");

        // then
        assert!(matches!(result, Err(ChallengeError::MissingPrediction)));
        assert_eq!(game.phase().kind(), PhaseKind::Ready);
    }

    #[test]
    fn begin_reveal__hands_out_window_and_blocks_second_request() {
        // given
        let mut game = ready_game(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);

        // when
        let request = game.begin_reveal("9.5").unwrap();
        let second = game.begin_reveal("9.5");

        // then
        assert_eq!(request.ticker, "GOOGL");
        assert_eq!(request.recent_data, [2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        assert!(matches!(second, Err(ChallengeError::RevealInProgress)));
    }

    #[test]
    fn finish_reveal__failure_returns_to_ready() {
        // given
        let mut game = ready_game(&[1.0; 8]);
        game.begin_reveal("1").unwrap();

        // when
        let result = game.finish_reveal(Err(ServiceError::Rejected("boom".into())));

        // then
        assert_eq!(result.unwrap_err().to_string(), "boom");
        assert_eq!(game.phase().kind(), PhaseKind::Ready);
        assert!(game.begin_reveal("1").is_ok());
    }

    #[test]
    fn finish_reveal__scores_and_locks_the_round() {
        // given
        let mut game = ready_game(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0, 17.0, 18.0]);
        game.begin_reveal("20").unwrap();

        // when
        let result = game
            .finish_reveal(Ok(Prediction {
                predicted_price: 19.0,
                model_name: None,
            }))
            .unwrap()
            .clone();

        // then
        assert_eq!(result.verdict.outcome, Outcome::ModelWins);
        assert_eq!(result.model_name, UNKNOWN_MODEL);
        assert_eq!(result.actual_price, 18.0);
        assert!(matches!(
            game.begin_reveal("20"),
            Err(ChallengeError::AlreadyRevealed)
        ));
    }

    #[test]
    fn finish_reveal__rejects_non_finite_prediction() {
        // given
        let mut game = ready_game(&[1.0; 8]);
        game.begin_reveal("1").unwrap();

        // when
        let result = game.finish_reveal(Ok(Prediction {
            predicted_price: f64::NAN,
            model_name: Some("Broken".into()),
        }));

        // then
        assert!(matches!(
            result,
            Err(ChallengeError::Service(ServiceError::InvalidResponse(_)))
        ));
        assert_eq!(game.phase().kind(), PhaseKind::Ready);
    }

    #[test]
    fn finish_loading__failure_discards_previous_round() {
        // given
        let mut game = ready_game(&[1.0; 8]);
        game.begin_loading("NVDA", "5d").unwrap();

        // when
        let result = game.finish_loading(Ok(history(&[1.0; 5])));

        // then
        assert!(result.is_err());
        assert_eq!(game.phase(), &Phase::Idle);
        assert!(game.round().is_none());
    }

    #[test]
    fn begin_loading__rejects_empty_selection() {
        let mut game = ready_game(&[1.0; 8]);

        let result = game.begin_loading("", "1mo");

        assert!(matches!(result, Err(ChallengeError::MissingSelection)));
        assert_eq!(game.phase().kind(), PhaseKind::Ready);
    }

    proptest! {
        #[test]
        fn partition__window_is_the_seven_prices_before_target(
            prices in prop::collection::vec(0.01f64..10_000.0, MIN_SERIES_LEN..64)
        ) {
            let n = prices.len();
            let round = partition("TSLA", history(&prices)).unwrap();

            prop_assert_eq!(round.challenge.prediction_window.to_vec(), prices[n - 8..n - 1].to_vec());
            prop_assert_eq!(round.challenge.actual_price, prices[n - 1]);
            prop_assert_eq!(round.visible.prices.len(), n - 1);
            prop_assert_eq!(round.visible.dates.len(), n - 1);
        }

        #[test]
        fn partition__short_series_always_fails(
            prices in prop::collection::vec(0.01f64..10_000.0, 0..MIN_SERIES_LEN)
        ) {
            let is_insufficient = matches!(
                partition("TSLA", history(&prices)),
                Err(ChallengeError::InsufficientData { .. })
            );
            prop_assert!(is_insufficient);
        }

        #[test]
        fn score__outcome_follows_distance_order(
            guess in -1_000.0f64..1_000.0,
            model in -1_000.0f64..1_000.0,
            actual in -1_000.0f64..1_000.0,
        ) {
            let verdict = score(guess, model, actual);

            prop_assert!(verdict.user_diff >= 0.0);
            prop_assert!(verdict.model_diff >= 0.0);
            let expected = if verdict.user_diff < verdict.model_diff {
                Outcome::UserWins
            } else if verdict.model_diff < verdict.user_diff {
                Outcome::ModelWins
            } else {
                Outcome::Tie
            };
            prop_assert_eq!(verdict.outcome, expected);
        }
    }
}
