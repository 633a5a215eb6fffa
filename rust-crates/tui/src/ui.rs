use crate::client::{
    AppSnapshot,
    GateView,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use crossterm::{
    event::{
        self,
        Event,
        KeyCode,
        KeyEvent,
        KeyEventKind,
        KeyModifiers,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use proof_of_tap::{
    amount::Stt,
    contract::UserStats,
    gate::GateStage,
    notifications::Severity,
    presentation::{
        self,
        Controls,
    },
};
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::io::stdout;
use tokio::sync::mpsc;
use tracing::error;

pub type InputEventReceiver = mpsc::UnboundedReceiver<std::io::Result<Event>>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserEvent {
    Quit,
    Redraw,
    Connect,
    Disconnect,
    Tap,
    Claim,
    Search(String),
    Share,
    GateOpenLink(GateStage),
    GateDigit(char),
    GateBackspace,
    GateConfirm,
    GateClose,
}

#[derive(Debug, Default)]
pub struct UiState {
    mode: Mode,
    gate_open: bool,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
enum Mode {
    #[default]
    Normal,
    SearchModal(SearchState),
    RulesModal,
    QuitModal,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct SearchState {
    input: String,
}

/// Terminal input read on a dedicated thread and forwarded to the event loop.
pub fn input_event_stream() -> InputEventReceiver {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        loop {
            let event = event::read();
            let failed = event.is_err();
            if tx.send(event).is_err() || failed {
                break;
            }
        }
    });
    rx
}

pub async fn next_raw_event(input_events: &mut InputEventReceiver) -> Result<Event> {
    match input_events.recv().await {
        Some(event) => Ok(event?),
        None => Err(eyre!("terminal input stream closed")),
    }
}

/// Drops key presses queued while a write was in flight.
pub fn discard_pending_input(input_events: &mut InputEventReceiver) {
    let mut dropped = 0usize;
    while let Ok(event) = input_events.try_recv() {
        if let Err(err) = event {
            error!(%err, "terminal input failed");
        }
        dropped += 1;
    }
    if dropped > 0 {
        tracing::debug!(dropped, "discarded input queued during write");
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

pub fn draw(state: &mut UiState, snap: &AppSnapshot) -> Result<()> {
    state.gate_open = snap.gate.is_some();
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| ui(f, state, snap))?;
        state.terminal = Some(term);
    }
    Ok(())
}

/// Maps a raw terminal event to an action, updating modal state on the way.
pub fn interpret_event(state: &mut UiState, event: Event) -> Option<UserEvent> {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => interpret_key(state, key),
        Event::Resize(_, _) => Some(UserEvent::Redraw),
        _ => None,
    }
}

fn interpret_key(state: &mut UiState, k: KeyEvent) -> Option<UserEvent> {
    // raw mode swallows SIGINT
    if k.modifiers.contains(KeyModifiers::CONTROL) && k.code == KeyCode::Char('c') {
        return Some(UserEvent::Quit);
    }

    match &mut state.mode {
        Mode::QuitModal => {
            return match k.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => Some(UserEvent::Quit),
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                _ => None,
            };
        }
        Mode::SearchModal(search) => {
            return match k.code {
                KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                KeyCode::Enter => {
                    let input = std::mem::take(&mut search.input);
                    state.mode = Mode::Normal;
                    if input.trim().is_empty() {
                        Some(UserEvent::Redraw)
                    } else {
                        Some(UserEvent::Search(input))
                    }
                }
                KeyCode::Backspace => {
                    search.input.pop();
                    Some(UserEvent::Redraw)
                }
                KeyCode::Char(c) if c.is_ascii_alphanumeric() && search.input.len() < 42 => {
                    search.input.push(c);
                    Some(UserEvent::Redraw)
                }
                _ => None,
            };
        }
        Mode::RulesModal => {
            return match k.code {
                KeyCode::Esc | KeyCode::Enter | KeyCode::Char('?') | KeyCode::Char('q') => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                _ => None,
            };
        }
        Mode::Normal => {}
    }

    if state.gate_open {
        return match k.code {
            KeyCode::Char('f') => Some(UserEvent::GateOpenLink(GateStage::Follow)),
            KeyCode::Char('i') => Some(UserEvent::GateOpenLink(GateStage::Interact)),
            KeyCode::Char(c) if c.is_ascii_digit() => Some(UserEvent::GateDigit(c)),
            KeyCode::Backspace => Some(UserEvent::GateBackspace),
            KeyCode::Enter => Some(UserEvent::GateConfirm),
            KeyCode::Esc => Some(UserEvent::GateClose),
            _ => None,
        };
    }

    match k.code {
        KeyCode::Char('q') | KeyCode::Esc => {
            state.mode = Mode::QuitModal;
            Some(UserEvent::Redraw)
        }
        KeyCode::Char('c') => Some(UserEvent::Connect),
        KeyCode::Char('d') => Some(UserEvent::Disconnect),
        KeyCode::Char('t') | KeyCode::Char(' ') => Some(UserEvent::Tap),
        KeyCode::Char('r') => Some(UserEvent::Claim),
        KeyCode::Char('x') => Some(UserEvent::Share),
        KeyCode::Char('s') => {
            state.mode = Mode::SearchModal(SearchState::default());
            Some(UserEvent::Redraw)
        }
        KeyCode::Char('?') => {
            state.mode = Mode::RulesModal;
            Some(UserEvent::Redraw)
        }
        _ => None,
    }
}

fn ui(f: &mut Frame, state: &UiState, snap: &AppSnapshot) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5),  // wallet
            Constraint::Length(12), // stats + progress
            Constraint::Length(6),  // tap area
            Constraint::Min(6),     // lore + notifications
            Constraint::Length(3),  // help
        ])
        .split(f.area());

    draw_wallet_panel(f, chunks[0], snap);
    draw_middle(f, chunks[1], snap);
    draw_tap_panel(f, chunks[2], snap);
    draw_lower(f, chunks[3], snap);
    draw_help(f, chunks[4]);
    draw_modals(f, state, snap);
}

fn draw_wallet_panel(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let account = match snap.account {
        Some(account) => presentation::shorten_address(account),
        None if snap.provider_available => String::from("not connected"),
        None => String::from("no wallet loaded"),
    };
    let network = match snap.chain_id {
        Some(chain_id) if snap.correct_network => format!("{} ({chain_id})", snap.network_name),
        Some(chain_id) => format!("wrong network ({chain_id}), expected {}", snap.network_name),
        None => String::from("unknown"),
    };
    let network_style = if snap.correct_network {
        Style::default().fg(Color::Green)
    } else {
        Style::default().fg(Color::Red)
    };
    let lines = vec![
        Line::from(format!("Account: {account}")),
        Line::from(vec![
            Span::raw("Network: "),
            Span::styled(network, network_style),
        ]),
        Line::from(format!(
            "TapGem: {} | {}",
            snap.contract_address, snap.status
        )),
    ];
    let widget = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("💎 Proof of Tap"));
    f.render_widget(widget, area);
}

fn draw_middle(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);
    draw_stats_panel(f, cols[0], snap);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(3),
        ])
        .split(cols[1]);
    draw_monthly_gauge(f, rows[0], snap);
    draw_streak_gauge(f, rows[1], snap);
    let countdown = Paragraph::new(snap.reset_countdown.clone())
        .block(Block::default().borders(Borders::ALL).title("Daily reset"));
    f.render_widget(countdown, rows[2]);
}

fn stats_lines(stats: &UserStats, daily_tap_cap: u32) -> Vec<Line<'static>> {
    let badge = presentation::badge_for(stats.points);
    vec![
        Line::from(format!("Taps today: {} / {daily_tap_cap}", stats.taps_today)),
        Line::from(format!("Streak: {} day(s)", stats.current_streak)),
        Line::from(format!("Points: {}", stats.points)),
        Line::from(format!("Unclaimed: {} STT", stats.unclaimed_rewards.fixed2())),
        Line::from(format!(
            "Claimed: {} STT",
            stats.total_reward_claimed.fixed2()
        )),
        Line::from(format!("Badge: {} {}", badge.emoji, badge.name)),
    ]
}

fn draw_stats_panel(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let mut lines = match &snap.stats {
        Some(stats) => stats_lines(stats, snap.daily_tap_cap),
        None => vec![Line::from("Connect a wallet to see your stats")],
    };
    if let Some(link) = &snap.share_link {
        lines.push(Line::from(""));
        lines.push(Line::from(format!("Share: {link}")));
    }
    let widget = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Your stats"));
    f.render_widget(widget, area);
}

fn draw_monthly_gauge(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let earned = snap.stats.as_ref().map_or(Stt::ZERO, |stats| {
        stats
            .unclaimed_rewards
            .saturating_add(stats.total_reward_claimed)
    });
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Monthly rewards"))
        .gauge_style(Style::default().fg(Color::Magenta))
        .ratio(snap.monthly_fill.clamp(0.0, 1.0))
        .label(format!(
            "{} / {} STT",
            earned.fixed2(),
            snap.monthly_reward_cap.fixed2()
        ));
    f.render_widget(gauge, area);
}

fn draw_streak_gauge(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let streak = snap.stats.as_ref().map_or(0, |stats| stats.current_streak);
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Streak"))
        .gauge_style(Style::default().fg(Color::Yellow))
        .ratio(snap.streak_fill.clamp(0.0, 1.0))
        .label(format!(
            "{streak} / {} days",
            presentation::STREAK_GOAL_DAYS
        ));
    f.render_widget(gauge, area);
}

fn control_style(enabled: bool) -> Style {
    if enabled {
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray)
    }
}

fn draw_tap_panel(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let Controls {
        tap_enabled,
        claim_visible,
        claim_enabled,
    } = snap.controls;
    let tap_label = if snap.busy {
        "[ working... ]"
    } else {
        "[ t / space  TAP THE GEM ]"
    };
    let mut spans = vec![Span::styled(tap_label, control_style(tap_enabled))];
    if claim_visible {
        spans.push(Span::raw("   "));
        spans.push(Span::styled("[ r  CLAIM ]", control_style(claim_enabled)));
    }
    let mut lines = vec![Line::from(spans)];
    if claim_visible && !claim_enabled {
        lines.push(Line::from(Controls::CLAIM_DISABLED_HINT));
    }
    if let Some(feedback) = &snap.tap_feedback {
        lines.push(Line::from(feedback.clone()));
    }
    if !snap.verified {
        lines.push(Line::from("First tap asks you to verify you're human."));
    }
    let widget = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title("Tap"));
    f.render_widget(widget, area);
}

fn draw_lower(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(area);

    let lore = Paragraph::new(presentation::LORE)
        .wrap(Wrap { trim: true })
        .style(Style::default().fg(Color::Gray))
        .block(Block::default().borders(Borders::ALL).title("Lore"));
    f.render_widget(lore, cols[0]);

    let mut lines: Vec<Line> = Vec::new();
    if snap.notifications.is_empty() {
        lines.push(Line::from("Ready"));
    }
    for note in &snap.notifications {
        let color = match note.severity {
            Severity::Info => Color::White,
            Severity::Success => Color::Green,
            Severity::Error => Color::Red,
        };
        lines.push(Line::styled(note.message.clone(), Style::default().fg(color)));
    }
    if let Some(found) = &snap.search {
        lines.push(Line::from(""));
        lines.push(Line::from(format!(
            "Stats for {}:",
            presentation::shorten_address(found.address)
        )));
        lines.extend(stats_lines(&found.stats, snap.daily_tap_cap));
    }
    let notifications = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Notifications"));
    f.render_widget(notifications, cols[1]);
}

fn draw_help(f: &mut Frame, area: Rect) {
    let help = Paragraph::new(
        "c connect | d disconnect | t/space tap | r claim | s search | ? rules | x share | q quit",
    )
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, area);
}

fn gate_lines(gate: &GateView) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    match gate.stage {
        GateStage::Follow | GateStage::Interact => {
            let (key, verb) = if gate.stage == GateStage::Follow {
                ("f", "Follow us on X")
            } else {
                ("i", "Like or repost our latest post")
            };
            lines.push(Line::from(format!("Step: {verb}")));
            if let Some(link) = &gate.link {
                lines.push(Line::from(link.clone()));
            }
            let opened = if gate.link_opened { "opened" } else { "not opened" };
            lines.push(Line::from(format!("Press {key} to open the link ({opened})")));
        }
        GateStage::Captcha => {
            if let Some(prompt) = &gate.captcha_prompt {
                lines.push(Line::from(prompt.clone()));
            }
            lines.push(Line::from(format!("Answer: {}_", gate.answer)));
        }
        GateStage::Idle | GateStage::Verified => {}
    }
    lines.push(Line::from(""));
    if gate.timer_secs > 0 {
        lines.push(Line::styled(
            format!("Please wait {}s", gate.timer_secs),
            Style::default().fg(Color::Yellow),
        ));
    }
    if gate.decoy_delay_secs > 0 {
        lines.push(Line::styled(
            format!("Penalty: +{}s on every step", gate.decoy_delay_secs),
            Style::default().fg(Color::Red),
        ));
    }
    let close = if gate.can_close {
        "Esc=close"
    } else {
        "Esc unavailable"
    };
    lines.push(Line::from(format!("Enter=confirm  {close}")));
    lines
}

fn draw_modals(f: &mut Frame, state: &UiState, snap: &AppSnapshot) {
    if let Some(gate) = &snap.gate {
        let area = centered_rect(60, 40, f.area());
        let block = Block::default()
            .borders(Borders::ALL)
            .title("Verify you're human");
        f.render_widget(Clear, area);
        f.render_widget(block.clone(), area);
        f.render_widget(
            Paragraph::new(gate_lines(gate)).wrap(Wrap { trim: false }),
            block.inner(area),
        );
    }
    match &state.mode {
        Mode::SearchModal(search) => {
            let area = centered_rect(60, 20, f.area());
            let block = Block::default().borders(Borders::ALL).title("Search stats");
            let p = Paragraph::new(format!(
                "Address: {}_\nEnter=search Esc=cancel",
                search.input
            ));
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::RulesModal => {
            let area = centered_rect(70, 50, f.area());
            let block = Block::default().borders(Borders::ALL).title("Rules");
            let lines: Vec<Line> = presentation::RULES
                .iter()
                .map(|rule| Line::from(format!("• {rule}")))
                .collect();
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(
                Paragraph::new(lines).wrap(Wrap { trim: false }),
                block.inner(area),
            );
        }
        Mode::QuitModal => {
            let area = centered_rect(40, 20, f.area());
            let block = Block::default().borders(Borders::ALL).title("Confirm Quit");
            let p = Paragraph::new("Quit Proof of Tap? (Y/N)");
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::Normal => {}
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

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;

    fn press(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_str(state: &mut UiState, text: &str) {
        for c in text.chars() {
            interpret_event(state, press(KeyCode::Char(c)));
        }
    }

    #[test]
    fn interpret_event__main_keys() {
        let mut state = UiState::default();

        assert_eq!(
            interpret_event(&mut state, press(KeyCode::Char('c'))),
            Some(UserEvent::Connect)
        );
        assert_eq!(
            interpret_event(&mut state, press(KeyCode::Char(' '))),
            Some(UserEvent::Tap)
        );
        assert_eq!(
            interpret_event(&mut state, press(KeyCode::Char('t'))),
            Some(UserEvent::Tap)
        );
        assert_eq!(
            interpret_event(&mut state, press(KeyCode::Char('r'))),
            Some(UserEvent::Claim)
        );
        assert_eq!(
            interpret_event(&mut state, press(KeyCode::Char('x'))),
            Some(UserEvent::Share)
        );
        assert_eq!(interpret_event(&mut state, press(KeyCode::Char('z'))), None);
    }

    #[test]
    fn interpret_event__quit_requires_confirmation() {
        // given
        let mut state = UiState::default();

        // when
        let first = interpret_event(&mut state, press(KeyCode::Char('q')));
        let second = interpret_event(&mut state, press(KeyCode::Char('y')));

        // then
        assert_eq!(first, Some(UserEvent::Redraw));
        assert_eq!(second, Some(UserEvent::Quit));
    }

    #[test]
    fn interpret_event__ctrl_c_quits_immediately() {
        let mut state = UiState::default();
        let event = Event::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));

        assert_eq!(interpret_event(&mut state, event), Some(UserEvent::Quit));
    }

    #[test]
    fn interpret_event__search_modal_collects_address() {
        // given
        let mut state = UiState::default();
        interpret_event(&mut state, press(KeyCode::Char('s')));

        // when
        type_str(&mut state, "0xabc");
        interpret_event(&mut state, press(KeyCode::Backspace));
        let submitted = interpret_event(&mut state, press(KeyCode::Enter));

        // then
        assert_eq!(submitted, Some(UserEvent::Search("0xab".to_owned())));
        assert_eq!(state.mode, Mode::Normal);
    }

    #[test]
    fn interpret_event__gate_routes_keys_while_open() {
        // given
        let mut state = UiState {
            gate_open: true,
            ..UiState::default()
        };

        // then
        assert_eq!(
            interpret_event(&mut state, press(KeyCode::Char('f'))),
            Some(UserEvent::GateOpenLink(GateStage::Follow))
        );
        assert_eq!(
            interpret_event(&mut state, press(KeyCode::Char('i'))),
            Some(UserEvent::GateOpenLink(GateStage::Interact))
        );
        assert_eq!(
            interpret_event(&mut state, press(KeyCode::Char('7'))),
            Some(UserEvent::GateDigit('7'))
        );
        assert_eq!(
            interpret_event(&mut state, press(KeyCode::Enter)),
            Some(UserEvent::GateConfirm)
        );
        assert_eq!(
            interpret_event(&mut state, press(KeyCode::Esc)),
            Some(UserEvent::GateClose)
        );
        assert_eq!(interpret_event(&mut state, press(KeyCode::Char('t'))), None);
    }

    #[test]
    fn interpret_event__ignores_key_release() {
        let mut state = UiState::default();
        let mut key = KeyEvent::new(KeyCode::Char('t'), KeyModifiers::NONE);
        key.kind = KeyEventKind::Release;

        assert_eq!(interpret_event(&mut state, Event::Key(key)), None);
    }
}
