use beat_the_model::{
    challenge::{
        Outcome,
        PhaseKind,
        RevealOutcome,
    },
    controller::AppSnapshot,
};
use chrono::NaiveDate;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use itertools::{
    Itertools,
    MinMaxResult,
};
use ratatui::{prelude::*, widgets::*};
use std::io::stdout;
use tokio::sync::mpsc;

pub enum UserEvent {
    Quit,
    Redraw,
    NextTicker,
    PrevTicker,
    NextPeriod,
    PrevPeriod,
    NewChallenge,
    GuessChar(char),
    GuessBackspace,
    Reveal,
    DismissError,
}

pub type InputEventReceiver = mpsc::UnboundedReceiver<std::io::Result<Event>>;

/// The one live chart. Built from the visible series of a round and replaced
/// wholesale when the next round loads.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceChart {
    title: String,
    points: Vec<(f64, f64)>,
    x_labels: Vec<String>,
    y_bounds: [f64; 2],
}

impl PriceChart {
    pub fn new(ticker: &str, dates: &[String], prices: &[f64]) -> Self {
        let points: Vec<(f64, f64)> = prices
            .iter()
            .enumerate()
            .map(|(i, p)| (i as f64, *p))
            .collect();
        let x_labels = match dates {
            [] => Vec::new(),
            [only] => vec![only.clone()],
            [first, .., last] => {
                vec![first.clone(), dates[dates.len() / 2].clone(), last.clone()]
            }
        };
        Self {
            title: format!("{ticker} Closing Price"),
            points,
            x_labels,
            y_bounds: y_bounds(prices),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    fn x_bounds(&self) -> [f64; 2] {
        [0.0, self.points.len().saturating_sub(1).max(1) as f64]
    }
}

// Padded around the data instead of anchored at zero.
fn y_bounds(prices: &[f64]) -> [f64; 2] {
    match prices.iter().copied().minmax() {
        MinMaxResult::NoElements => [0.0, 1.0],
        MinMaxResult::OneElement(p) => [p - 1.0, p + 1.0],
        MinMaxResult::MinMax(lo, hi) => {
            let pad = ((hi - lo) * 0.05).max(0.01);
            [lo - pad, hi + pad]
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
enum Mode {
    #[default]
    Normal,
    QuitModal,
}

#[derive(Default)]
pub struct UiState {
    mode: Mode,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
    chart: Option<PriceChart>,
    chart_round: Option<u64>,
}

impl UiState {
    /// Drops the previous chart before taking ownership of the new one.
    pub fn install_chart(&mut self, chart: PriceChart) -> Option<PriceChart> {
        let previous = self.chart.take();
        self.chart = Some(chart);
        previous
    }

    pub fn clear_chart(&mut self) {
        self.chart = None;
        self.chart_round = None;
    }

    pub fn chart(&self) -> Option<&PriceChart> {
        self.chart.as_ref()
    }

    fn sync_chart(&mut self, snap: &AppSnapshot) {
        match (&snap.visible, &snap.round_ticker) {
            (Some(visible), Some(ticker)) => {
                if self.chart_round != Some(snap.round_id) {
                    let chart = PriceChart::new(ticker, &visible.dates, &visible.prices);
                    drop(self.install_chart(chart));
                    self.chart_round = Some(snap.round_id);
                }
            }
            _ => self.clear_chart(),
        }
    }
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    // Create a single persistent Terminal to preserve buffers across draws
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

/// Reads crossterm events on a blocking thread so the async loop can
/// `select!` on them.
pub fn input_event_stream() -> InputEventReceiver {
    let (sender, receiver) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        loop {
            let ev = event::read();
            let failed = ev.is_err();
            if sender.send(ev).is_err() || failed {
                break;
            }
        }
    });
    receiver
}

pub async fn next_raw_event(input_events: &mut InputEventReceiver) -> Result<Event> {
    input_events
        .recv()
        .await
        .ok_or_else(|| eyre!("terminal input stream closed"))?
        .wrap_err("failed to read terminal event")
}

pub fn interpret_event(state: &mut UiState, event: Event) -> Option<UserEvent> {
    let key = match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => key,
        Event::Resize(_, _) => return Some(UserEvent::Redraw),
        _ => return None,
    };
    if is_ctrl_c(&key) {
        return Some(UserEvent::Quit);
    }
    if state.mode == Mode::QuitModal {
        return match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => Some(UserEvent::Quit),
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            _ => None,
        };
    }
    match key.code {
        KeyCode::Char('q') => {
            state.mode = Mode::QuitModal;
            Some(UserEvent::Redraw)
        }
        KeyCode::Esc => Some(UserEvent::DismissError),
        KeyCode::Right => Some(UserEvent::NextTicker),
        KeyCode::Left => Some(UserEvent::PrevTicker),
        KeyCode::Down => Some(UserEvent::NextPeriod),
        KeyCode::Up => Some(UserEvent::PrevPeriod),
        KeyCode::Char('n') | KeyCode::F(5) => Some(UserEvent::NewChallenge),
        KeyCode::Enter => Some(UserEvent::Reveal),
        KeyCode::Backspace => Some(UserEvent::GuessBackspace),
        KeyCode::Char(c) if c.is_ascii_digit() || c == '.' || c == '-' => {
            Some(UserEvent::GuessChar(c))
        }
        _ => None,
    }
}

fn is_ctrl_c(key: &KeyEvent) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c')
}

pub fn draw(state: &mut UiState, snap: &AppSnapshot) -> Result<()> {
    state.sync_chart(snap);
    if let Some(mut term) = state.terminal.take() {
        // The terminal goes back into the state even when drawing fails.
        let res = render(&mut term, state, snap);
        state.terminal = Some(term);
        res?;
    }
    Ok(())
}

fn render<B: Backend>(term: &mut Terminal<B>, state: &UiState, snap: &AppSnapshot) -> Result<()> {
    term.draw(|f| ui(f, state, snap)).map(|_| ())?;
    Ok(())
}

fn ui(f: &mut Frame, state: &UiState, snap: &AppSnapshot) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),  // status
            Constraint::Min(12),    // chart
            Constraint::Length(10), // guess + results
            Constraint::Length(4),  // errors
            Constraint::Length(3),  // help
        ])
        .split(f.area());

    draw_top(f, chunks[0], snap);
    draw_chart(f, state, chunks[1], snap);
    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(chunks[2]);
    draw_guess(f, middle[0], snap);
    draw_results(f, middle[1], snap);
    draw_errors(f, chunks[3], snap);
    draw_help(f, chunks[4]);
    draw_modals(f, state);
}

fn draw_top(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let board = snap.scoreboard;
    let text = format!(
        "Ticker: {} ({}) | Period: {} | {} | You {} · Model {} · Ties {}\n{}",
        snap.ticker.name,
        snap.ticker.symbol,
        snap.period,
        phase_label(snap.phase),
        board.user_wins,
        board.model_wins,
        board.ties,
        snap.status
    );
    let status = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title("Beat the Model"));
    f.render_widget(status, area);
}

fn draw_chart(f: &mut Frame, state: &UiState, area: Rect, snap: &AppSnapshot) {
    let Some(chart) = state.chart() else {
        let text = match snap.phase {
            PhaseKind::Loading => "Loading...",
            _ => "No challenge loaded. Press n to start.",
        };
        let empty = Paragraph::new(text)
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL).title("Chart"));
        f.render_widget(empty, area);
        return;
    };

    let dataset = Dataset::default()
        .name(chart.title().to_string())
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(Color::Blue))
        .data(&chart.points);
    let [lo, hi] = chart.y_bounds;
    let grid = Style::default().fg(Color::Gray);
    let widget = Chart::new(vec![dataset])
        .block(Block::default().borders(Borders::ALL).title(chart.title().to_string()))
        .x_axis(
            Axis::default()
                .style(grid)
                .bounds(chart.x_bounds())
                .labels(chart.x_labels.clone()),
        )
        .y_axis(
            Axis::default()
                .style(grid)
                .bounds(chart.y_bounds)
                .labels(vec![
                    format!("{lo:.2}"),
                    format!("{:.2}", (lo + hi) / 2.0),
                    format!("{hi:.2}"),
                ]),
        );
    f.render_widget(widget, area);
}

fn draw_guess(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let target = snap
        .target_date
        .as_deref()
        .map(describe_date)
        .unwrap_or_else(|| String::from("---"));
    let mut lines = vec![
        Line::from(format!("Predicted close for {target}:")),
        Line::from(""),
    ];
    let editable = snap.phase == PhaseKind::Ready;
    let cursor = if editable { "█" } else { "" };
    lines.push(Line::styled(
        format!("  $ {}{}", snap.guess_input, cursor),
        Style::default().add_modifier(Modifier::BOLD),
    ));
    lines.push(Line::from(""));
    let button_style = if editable {
        Style::default().fg(Color::Black).bg(Color::Blue)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    lines.push(Line::styled(format!("[ {} ]", reveal_label(snap.phase)), button_style));
    if let Some(bar) = snap.last_session {
        lines.push(Line::from(""));
        lines.push(Line::styled(
            format!(
                "Last session O {:.2} H {:.2} L {:.2} C {:.2}",
                bar.open, bar.high, bar.low, bar.close
            ),
            Style::default().fg(Color::Gray),
        ));
    }
    let panel = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Your Prediction"));
    f.render_widget(panel, area);
}

fn draw_results(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let lines = match &snap.result {
        Some(result) => result_lines(result, snap.target_date.as_deref()),
        None => vec![
            Line::styled("Actual: hidden until reveal", Style::default().fg(Color::DarkGray)),
            Line::from(""),
            Line::from("You:   ---"),
            Line::from("Model: --- (Model: ---)"),
        ],
    };
    let panel = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Results"));
    f.render_widget(panel, area);
}

fn result_lines(result: &RevealOutcome, target_date: Option<&str>) -> Vec<Line<'static>> {
    let verdict = result.verdict;
    let on = target_date.map(|d| format!(" on {d}")).unwrap_or_default();
    vec![
        Line::from(format!("Actual close{on}: {}", format_price(result.actual_price))),
        Line::from(""),
        Line::from(vec![
            Span::raw(format!("You:   {}   ", format_price(result.guess))),
            Span::styled(
                format!("Off by: {}", format_price(verdict.user_diff)),
                diff_style(verdict.user_highlighted()),
            ),
        ]),
        Line::from(vec![
            Span::raw(format!(
                "Model: {} (Model: {})   ",
                format_price(result.model_prediction),
                result.model_name
            )),
            Span::styled(
                format!("Off by: {}", format_price(verdict.model_diff)),
                diff_style(verdict.model_highlighted()),
            ),
        ]),
        Line::from(""),
        Line::styled(
            format!(" {} ", verdict.outcome.banner()),
            banner_style(verdict.outcome),
        )
        .centered(),
    ]
}

fn draw_errors(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let (lines, color) = if snap.errors.is_empty() {
        (vec![Line::from("No errors")], Color::DarkGray)
    } else {
        (snap.errors.iter().map(|e| Line::from(e.clone())).collect(), Color::Red)
    };
    let errors = Paragraph::new(lines)
        .style(Style::default().fg(color))
        .block(Block::default().borders(Borders::ALL).title("Errors (Esc to dismiss)"));
    f.render_widget(errors, area);
}

fn draw_help(f: &mut Frame, area: Rect) {
    let help = Paragraph::new(
        "←/→ ticker | ↑/↓ period | n new challenge | 0-9 . - guess | Enter reveal | Esc dismiss | q quit",
    )
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, area);
}

fn draw_modals(f: &mut Frame, state: &UiState) {
    if state.mode == Mode::QuitModal {
        let area = centered_rect(40, 20, f.area());
        let block = Block::default().borders(Borders::ALL).title("Confirm Quit");
        let p = Paragraph::new("Quit the game? (Y/N)");
        f.render_widget(Clear, area);
        f.render_widget(block.clone(), area);
        f.render_widget(p, block.inner(area));
    }
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    let vertical = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1]);

    vertical[1]
}

fn phase_label(phase: PhaseKind) -> &'static str {
    match phase {
        PhaseKind::Idle => "Idle",
        PhaseKind::Loading => "Loading",
        PhaseKind::Ready => "Your guess",
        PhaseKind::Revealing => "Revealing",
        PhaseKind::Revealed => "Revealed",
    }
}

fn reveal_label(phase: PhaseKind) -> &'static str {
    match phase {
        PhaseKind::Revealing => "Working...",
        PhaseKind::Revealed => "Results Revealed",
        _ => "Reveal Results",
    }
}

fn diff_style(highlighted: bool) -> Style {
    if highlighted {
        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Red)
    }
}

fn banner_style(outcome: Outcome) -> Style {
    let base = Style::default().add_modifier(Modifier::BOLD);
    match outcome {
        Outcome::UserWins => base.fg(Color::White).bg(Color::Green),
        Outcome::ModelWins => base.fg(Color::White).bg(Color::DarkGray),
        Outcome::Tie => base.fg(Color::Black).bg(Color::Yellow),
    }
}

fn format_price(value: f64) -> String {
    format!("${value:.2}")
}

/// `2024-01-05` becomes `Fri 05 Jan 2024`; other labels pass through.
fn describe_date(label: &str) -> String {
    NaiveDate::parse_from_str(label, "%Y-%m-%d")
        .map(|d| d.format("%a %d %b %Y").to_string())
        .unwrap_or_else(|_| label.to_string())
}
