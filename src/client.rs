use crate::ui;
use beat_the_model::{
    config::AppConfig,
    controller::AppController,
    market::{
        HttpMarketService,
        MarketService,
    },
};
use color_eyre::eyre::{
    Result,
    WrapErr,
};

pub async fn run_app(config: AppConfig) -> Result<()> {
    let service = HttpMarketService::new(config.api_url.as_str())
        .wrap_err("failed to build HTTP client")?;
    let controller = AppController::new(service, &config);
    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();

    tracing::info!("Starting UI");
    // UI bootstrap
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(controller, &mut ui_state, &mut input_events, config.autoload).await;
    ui::terminal_exit()?;
    res
}

// Loads draw once before awaiting so the placeholder and the disabled reveal
// label show while the request is in flight.
async fn new_challenge<S: MarketService>(
    controller: &mut AppController<S>,
    ui_state: &mut ui::UiState,
) -> Result<()> {
    let Ok(request) = controller.begin_load() else {
        return Ok(());
    };
    ui::draw(ui_state, &controller.snapshot()).wrap_err("draw while loading failed")?;
    let _ = controller.complete_load(request).await;
    Ok(())
}

async fn reveal<S: MarketService>(
    controller: &mut AppController<S>,
    ui_state: &mut ui::UiState,
) -> Result<()> {
    let Ok(request) = controller.begin_reveal() else {
        return Ok(());
    };
    ui::draw(ui_state, &controller.snapshot()).wrap_err("draw while revealing failed")?;
    let _ = controller.complete_reveal(request).await;
    Ok(())
}

async fn run_loop<S: MarketService>(
    mut controller: AppController<S>,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
    autoload: bool,
) -> Result<()> {
    tracing::info!("Running app loop");
    ui::draw(ui_state, &controller.snapshot()).wrap_err("initial draw failed")?;
    if autoload {
        new_challenge(&mut controller, ui_state).await?;
        ui::draw(ui_state, &controller.snapshot()).wrap_err("draw after autoload failed")?;
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => { break; }
            ev = ui::next_raw_event(input_events) => {
                let Some(user_event) = ui::interpret_event(ui_state, ev?) else {
                    continue;
                };
                match user_event {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::Redraw => {}
                    ui::UserEvent::NextTicker => controller.select_next_ticker(),
                    ui::UserEvent::PrevTicker => controller.select_prev_ticker(),
                    ui::UserEvent::NextPeriod => controller.select_next_period(),
                    ui::UserEvent::PrevPeriod => controller.select_prev_period(),
                    ui::UserEvent::GuessChar(c) => controller.push_guess_char(c),
                    ui::UserEvent::GuessBackspace => controller.pop_guess_char(),
                    ui::UserEvent::DismissError => controller.dismiss_errors(),
                    ui::UserEvent::NewChallenge => new_challenge(&mut controller, ui_state).await?,
                    ui::UserEvent::Reveal => reveal(&mut controller, ui_state).await?,
                }
                ui::draw(ui_state, &controller.snapshot()).wrap_err("draw after input failed")?;
            }
        }
    }
    tracing::info!(rounds = controller.scoreboard().rounds(), "leaving app loop");
    Ok(())
}
