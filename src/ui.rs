use crate::app::{update, AppMsg, Effect, OpenTarget};
use crate::config::AppConfig;
use crate::form_core::collector::LinkConstraints;
use crate::model::FormDefinition;
use crate::services::api::{FormApi, HttpFormApi};
use crate::services::loader::{self, LoadMsg};
use crate::services::memory_api::MemoryFormApi;
use crate::stores::{self, GuestIdentity, NoticeLevel};
use crate::widgets::builder::BuilderWidget;
use crate::widgets::form_widget::FormWidget;
use crate::widgets::menu::draw_home;
use crate::widgets::responses::ResponsesWidget;
use crate::widgets::status_bar::draw_footer;
use crate::widgets::Widget;
use anyhow::Result;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::prelude::*;
use ratatui::widgets::*;
use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ~200ms per tick
const TOAST_TICKS: u64 = 20;

fn run_effects(state: &mut AppState, effects: Vec<Effect>) {
    for eff in effects {
        match eff {
            Effect::FetchLayout { form_id, audience } => {
                state.dbg(format!("fetch layout {form_id} ({audience:?}) t{}", state.ticket));
                if let (Some(api), Some(tx)) = (&state.api, &state.tx) {
                    loader::spawn_fetch_layout(
                        api.clone(),
                        state.ticket,
                        form_id,
                        audience,
                        tx.clone(),
                    );
                }
            }
            Effect::SaveLayout { req } => {
                let verb = if req.create { "create" } else { "update" };
                state.dbg(format!("save layout {} ({verb})", req.form_id));
                state.status_text = Some("Saving...".into());
                if let (Some(api), Some(tx)) = (&state.api, &state.tx) {
                    loader::spawn_save_layout(api.clone(), state.ticket, req, tx.clone());
                } else if let Some(bw) = state.builder.as_mut() {
                    bw.builder.abort_save();
                    state.status_text = None;
                }
            }
            Effect::Submit { pending } => {
                state.dbg(format!(
                    "submit {} attempt {} ({} answers)",
                    pending.form_id,
                    pending.attempt,
                    pending.payload.data.len()
                ));
                state.status_text = Some("Submitting...".into());
                if let (Some(api), Some(tx)) = (&state.api, &state.tx) {
                    loader::spawn_submit(api.clone(), state.ticket, pending, tx.clone());
                }
            }
            Effect::FetchResponses { form_id } => {
                state.dbg(format!("fetch responses {form_id}"));
                state.status_text = Some("Loading responses...".into());
                if let (Some(api), Some(tx)) = (&state.api, &state.tx) {
                    loader::spawn_list_responses(api.clone(), state.ticket, form_id, tx.clone());
                }
            }
            Effect::GenerateLink { form_id, req } => {
                state.dbg(format!("generate link {form_id}"));
                if let (Some(api), Some(tx)) = (&state.api, &state.tx) {
                    loader::spawn_generate_link(api.clone(), state.ticket, form_id, req, tx.clone());
                }
            }
            Effect::ShowToast { text, level } => stores::notify(level, text),
            Effect::CopyToClipboard { text } => {
                match arboard::Clipboard::new().and_then(|mut c| c.set_text(text)) {
                    Ok(()) => state.dbg("copied to clipboard"),
                    Err(e) => {
                        tracing::debug!(error = %e, "clipboard unavailable");
                        state.dbg(format!("clipboard unavailable: {e}"));
                    }
                }
            }
            Effect::Unavailable { reason } => {
                state.dbg(format!("unavailable: {reason}"));
                state.unavailable = Some(reason);
                state.view = View::Unavailable;
            }
        }
    }
}

#[derive(Default)]
pub(crate) struct AppState {
    pub(crate) config: AppConfig,
    pub(crate) view: View,
    // Home list cursor
    pub(crate) selected: usize,
    pub(crate) menu_offset: usize,
    // Identifies the active view; results for older tickets are dropped
    pub(crate) ticket: u64,
    pub(crate) pending: Option<PendingOpen>,
    pub(crate) api: Option<Arc<dyn FormApi>>,
    tx: Option<Sender<LoadMsg>>,
    rx: Option<Receiver<LoadMsg>>,
    pub(crate) fill: Option<FormWidget>,
    pub(crate) builder: Option<BuilderWidget>,
    pub(crate) responses: Option<ResponsesWidget>,
    // Fill view opened from the builder; Back returns there
    pub(crate) previewing: bool,
    pub(crate) layouts: HashMap<String, Arc<FormDefinition>>,
    pub(crate) links: HashMap<String, LinkConstraints>,
    pub(crate) unavailable: Option<String>,
    pub(crate) fallback: Option<Fallback>,
    pub(crate) status_text: Option<String>,
    pub(crate) toast: Option<Toast>,
    pub(crate) tick: u64,
    pub(crate) show_debug: bool,
    pub(crate) debug_log: VecDeque<String>,
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum View {
    #[default]
    Home,
    Loading,
    Fill,
    Builder,
    Responses,
    Unavailable,
    Fallback,
}

impl View {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            View::Home => "Home",
            View::Loading => "Loading",
            View::Fill => "Fill",
            View::Builder => "Builder",
            View::Responses => "Responses",
            View::Unavailable => "Unavailable",
            View::Fallback => "Fallback",
        }
    }
}

/// What the Loading view is waiting for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingOpen {
    pub(crate) form_id: String,
    pub(crate) target: OpenTarget,
}

/// A view that failed to load; `r` reissues the same open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Fallback {
    pub(crate) form_id: String,
    pub(crate) target: OpenTarget,
    pub(crate) message: String,
}

impl AppState {
    pub fn dbg(&mut self, msg: impl Into<String>) {
        const MAX_LOG_LINES: usize = 200;
        if self.debug_log.len() >= MAX_LOG_LINES {
            self.debug_log.pop_front();
        }
        self.debug_log.push_back(msg.into());
    }

    pub(crate) fn next_ticket(&mut self) -> u64 {
        self.ticket = self.ticket.wrapping_add(1);
        self.ticket
    }

    fn active_widget(&mut self) -> Option<&mut dyn Widget> {
        match self.view {
            View::Fill => self.fill.as_mut().map(|w| w as &mut dyn Widget),
            View::Builder => self.builder.as_mut().map(|w| w as &mut dyn Widget),
            View::Responses => self.responses.as_mut().map(|w| w as &mut dyn Widget),
            _ => None,
        }
    }

    fn selected_form_id(&self) -> Option<String> {
        self.config.forms.get(self.selected).map(|f| f.id.clone())
    }
}

pub struct Toast {
    pub text: String,
    pub level: NoticeLevel,
    pub expires_at_tick: u64,
}

fn truthy_env(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes"))
        .unwrap_or(false)
}

fn build_api(cfg: &AppConfig) -> Result<Arc<dyn FormApi>> {
    match &cfg.api_url {
        Some(url) => {
            tracing::info!(url = %url, "using http backend");
            let api = HttpFormApi::new(url, cfg.api_token.as_deref(), cfg.timeout())?;
            Ok(Arc::new(api))
        }
        None => {
            tracing::info!("no api_url configured; using the in-memory demo backend");
            Ok(Arc::new(MemoryFormApi::demo()))
        }
    }
}

pub(crate) fn init_state(config: AppConfig, api: Arc<dyn FormApi>) -> AppState {
    stores::set_guest(GuestIdentity {
        name: config.guest.name.clone(),
        email: config.guest.email.clone(),
    });
    let (tx, rx) = mpsc::channel::<LoadMsg>();
    AppState {
        config,
        api: Some(api),
        tx: Some(tx),
        rx: Some(rx),
        ..Default::default()
    }
}

fn dispatch(state: &mut AppState, msg: AppMsg) {
    let effs = update(state, msg);
    run_effects(state, effs);
}

// Drain worker results and queued notices.
fn pump(state: &mut AppState) {
    let mut drained: Vec<LoadMsg> = Vec::new();
    if let Some(rx) = &state.rx {
        while let Ok(msg) = rx.try_recv() {
            drained.push(msg);
        }
    }
    for msg in drained {
        dispatch(state, AppMsg::Loaded(msg));
    }
    for n in stores::drain_notices() {
        state.dbg(format!("[{:?}] {}", n.level, n.text));
        state.toast = Some(Toast {
            text: n.text,
            level: n.level,
            expires_at_tick: state.tick.saturating_add(TOAST_TICKS),
        });
    }
}

fn home_msg(state: &mut AppState, code: KeyCode) -> Option<AppMsg> {
    let total = state.config.forms.len();
    match code {
        KeyCode::Up => {
            state.selected = state.selected.saturating_sub(1);
            None
        }
        KeyCode::Down => {
            if state.selected + 1 < total {
                state.selected += 1;
            }
            None
        }
        KeyCode::Enter => state.selected_form_id().map(|form_id| AppMsg::Open {
            form_id,
            target: OpenTarget::Fill,
        }),
        KeyCode::Char('b') => state.selected_form_id().map(|form_id| AppMsg::Open {
            form_id,
            target: OpenTarget::Builder,
        }),
        KeyCode::Char('v') => state.selected_form_id().map(|form_id| AppMsg::Open {
            form_id,
            target: OpenTarget::Responses,
        }),
        KeyCode::Char('g') => state
            .selected_form_id()
            .map(|form_id| AppMsg::GenerateLink { form_id }),
        _ => None,
    }
}

/// Route one key press; returns true when the app should quit.
pub(crate) fn handle_key(state: &mut AppState, key: KeyEvent) -> bool {
    if key.kind != KeyEventKind::Press {
        return false;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return true;
    }
    if key.code == KeyCode::F(12) {
        state.show_debug = !state.show_debug;
        return false;
    }
    let capturing = state
        .active_widget()
        .map(|w| w.is_capturing_input())
        .unwrap_or(false);
    if !capturing {
        match (state.view, key.code) {
            (View::Home, KeyCode::Char('q')) => return true,
            (View::Home, code) => {
                if let Some(msg) = home_msg(state, code) {
                    dispatch(state, msg);
                }
                return false;
            }
            (View::Fallback, KeyCode::Char('r') | KeyCode::F(5)) => {
                dispatch(state, AppMsg::Retry);
                return false;
            }
            (View::Builder, KeyCode::Char('p')) => {
                dispatch(state, AppMsg::PreviewDraft);
                return false;
            }
            (_, KeyCode::Esc) => {
                dispatch(state, AppMsg::Back);
                return false;
            }
            _ => {}
        }
    }
    let effs = state
        .active_widget()
        .map(|w| w.on_key(key))
        .unwrap_or_default();
    run_effects(state, effs);
    false
}

pub fn run(config: AppConfig) -> Result<()> {
    let api = build_api(&config)?;
    let mut state = init_state(config, api);
    // Headless smoke mode
    let headless = truthy_env("FORMDESK_HEADLESS");
    let headless_ticks: u64 = std::env::var("FORMDESK_TICKS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(10);
    let headless_open: Option<String> = std::env::var("FORMDESK_HEADLESS_OPEN").ok();
    let headless_summary = truthy_env("FORMDESK_SMOKE_SUMMARY");
    if headless {
        let backend = ratatui::backend::TestBackend::new(100, 30);
        let mut terminal = Terminal::new(backend)?;
        let tick_rate = Duration::from_millis(200);
        let mut open_done = false;
        for _ in 0..headless_ticks {
            if !open_done {
                if let Some(arg) = &headless_open {
                    let msg = parse_open_arg(arg);
                    dispatch(&mut state, msg);
                    open_done = true;
                }
            }
            terminal.draw(|f| ui(f, &mut state))?;
            pump(&mut state);
            state.tick = state.tick.wrapping_add(1);
            std::thread::sleep(tick_rate);
        }
        if headless_summary {
            let summary = serde_json::json!({
                "ok": state.fallback.is_none() && state.unavailable.is_none(),
                "view": state.view.name(),
                "open_done": open_done,
                "form_loaded": state.fill.is_some() || state.builder.is_some(),
                "responses_loaded": state.responses.is_some(),
            });
            println!("{summary}");
        }
        return Ok(());
    }
    // Setup terminal (interactive)
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let tick_rate = Duration::from_millis(200);
    let mut last_tick = Instant::now();
    let res: Result<()> = loop {
        if let Err(e) = terminal.draw(|f| ui(f, &mut state)) {
            break Err(e.into());
        }
        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_millis(0));
        match event::poll(timeout) {
            Ok(true) => match event::read() {
                Ok(Event::Key(key)) => {
                    if handle_key(&mut state, key) {
                        break Ok(());
                    }
                }
                Ok(_) => {}
                Err(e) => break Err(e.into()),
            },
            Ok(false) => {}
            Err(e) => break Err(e.into()),
        }
        pump(&mut state);
        if last_tick.elapsed() >= tick_rate {
            state.tick = state.tick.wrapping_add(1);
            last_tick = Instant::now();
        }
    };
    // Restore
    disable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;
    res
}

/// `builder:<id>`, `responses:<id>` or a bare form id (fill).
pub(crate) fn parse_open_arg(arg: &str) -> AppMsg {
    let (target, form_id) = match arg.split_once(':') {
        Some(("builder", id)) => (OpenTarget::Builder, id),
        Some(("responses", id)) => (OpenTarget::Responses, id),
        Some(("fill", id)) => (OpenTarget::Fill, id),
        _ => (OpenTarget::Fill, arg),
    };
    AppMsg::Open {
        form_id: form_id.to_string(),
        target,
    }
}

fn ui(f: &mut Frame, state: &mut AppState) {
    // Clear expired toast
    if let Some(t) = &state.toast {
        if state.tick >= t.expires_at_tick {
            state.toast = None;
        }
    }
    let theme = crate::theme::Theme::default();
    let screen = f.area();
    f.render_widget(Block::default().style(theme.base_style()), screen);

    const DEBUG_H: u16 = 5;
    let mut constraints = vec![Constraint::Length(1), Constraint::Min(0)];
    if state.show_debug {
        constraints.push(Constraint::Length(DEBUG_H));
    }
    constraints.push(Constraint::Length(1));
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(screen);

    draw_header(f, chunks[0], state, &theme);
    let main = chunks[1];
    let tick = state.tick;
    match state.view {
        View::Home => draw_home(f, main, state),
        View::Loading => draw_loading(f, main, state),
        View::Fill => {
            if let Some(w) = state.fill.as_mut() {
                w.render(f, main, true, tick);
            }
        }
        View::Builder => {
            if let Some(w) = state.builder.as_mut() {
                w.render(f, main, true, tick);
            }
        }
        View::Responses => {
            if let Some(w) = state.responses.as_mut() {
                w.render(f, main, true, tick);
            }
        }
        View::Unavailable => draw_unavailable(f, main, state, &theme),
        View::Fallback => draw_fallback(f, main, state, &theme),
    }
    if state.show_debug {
        draw_debug(f, chunks[2], state);
    }
    let footer = chunks[chunks.len() - 1];
    let help = help_text(state);
    draw_footer(f, footer, state, help);
}

fn help_text(state: &AppState) -> &'static str {
    match state.view {
        View::Home => "↑/↓ select  Enter fill  b build  v responses  g share link  F12 debug  q quit",
        View::Fill => {
            if state.fill.as_ref().is_some_and(|w| w.is_capturing_input()) {
                "type to edit  Enter commit  Esc cancel"
            } else {
                "↑/↓ field  Enter edit/cycle  Space toggle  Del clear  Ctrl+S submit  Ctrl+R new response  Esc back"
            }
        }
        View::Builder => {
            "s section  a field  d delete  J/K move  t type  r required  Enter label  o options  n range  p preview  Ctrl+S save  Esc back"
        }
        View::Responses => "↑/↓ select  r refresh  Esc back",
        View::Fallback => "r retry  Esc back",
        View::Loading | View::Unavailable => "Esc back",
    }
}

fn draw_header(f: &mut Frame, area: Rect, state: &AppState, theme: &crate::theme::Theme) {
    let backend = match &state.config.api_url {
        Some(url) => url.clone(),
        None => "demo backend".to_string(),
    };
    let line = Line::from(vec![
        Span::styled(" formdesk ", theme.title_style().add_modifier(Modifier::BOLD)),
        Span::styled(format!("· {} ", state.view.name()), theme.text_active_bold()),
        Span::styled(format!("· {backend}"), theme.text_muted()),
    ]);
    f.render_widget(Paragraph::new(line), area);
}

fn draw_loading(f: &mut Frame, area: Rect, state: &AppState) {
    let spinner = ["⠋", "⠙", "⠸", "⠴", "⠦", "⠇"][state.tick as usize % 6];
    let what = state
        .pending
        .as_ref()
        .map(|p| p.form_id.clone())
        .unwrap_or_default();
    let block = crate::widgets::chrome::panel_block("Loading", true);
    let p = Paragraph::new(format!("{spinner} loading {what}...")).block(block);
    f.render_widget(p, area);
}

fn draw_unavailable(f: &mut Frame, area: Rect, state: &AppState, theme: &crate::theme::Theme) {
    let reason = state.unavailable.as_deref().unwrap_or("unavailable");
    let lines = vec![
        Line::from(Span::styled(
            "This form is no longer available.",
            theme.text_error().add_modifier(Modifier::BOLD),
        )),
        Line::raw(""),
        Line::raw(reason.to_string()),
        Line::raw(""),
        Line::from(Span::styled("Press Esc to go back.", theme.text_muted())),
    ];
    let block = crate::widgets::chrome::panel_block("Form unavailable", true);
    f.render_widget(
        Paragraph::new(lines).block(block).wrap(Wrap { trim: true }),
        area,
    );
}

fn draw_fallback(f: &mut Frame, area: Rect, state: &AppState, theme: &crate::theme::Theme) {
    let (title, message) = match &state.fallback {
        Some(fb) => (fb.form_id.as_str(), fb.message.as_str()),
        None => ("", "Something went wrong."),
    };
    let lines = vec![
        Line::from(Span::styled(
            format!("Could not open '{title}'"),
            theme.text_error().add_modifier(Modifier::BOLD),
        )),
        Line::raw(""),
        Line::raw(message.to_string()),
        Line::raw(""),
        Line::from(Span::styled("r retry · Esc back", theme.text_muted())),
    ];
    let block = crate::widgets::chrome::panel_block("Error", true);
    f.render_widget(
        Paragraph::new(lines).block(block).wrap(Wrap { trim: true }),
        area,
    );
}

fn draw_debug(f: &mut Frame, area: Rect, state: &AppState) {
    let b = Block::default()
        .borders(Borders::TOP)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            "Debug",
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        ));
    // Take last `area.height` lines
    let h = area.height as usize;
    let start = state.debug_log.len().saturating_sub(h);
    let lines: Vec<Line> = state
        .debug_log
        .iter()
        .skip(start)
        .map(|s| Line::raw(s.clone()))
        .collect();
    let p = Paragraph::new(lines)
        .style(Style::default().fg(Color::Gray))
        .block(b)
        .wrap(Wrap { trim: true });
    f.render_widget(p, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FormEntry;
    use crate::model::Audience;
    use ratatui::backend::TestBackend;

    fn screen_text(state: &mut AppState) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 24)).unwrap();
        terminal.draw(|f| ui(f, state)).unwrap();
        let buf = terminal.backend().buffer().clone();
        let mut out = String::new();
        for y in 0..buf.area.height {
            for x in 0..buf.area.width {
                out.push_str(buf[(x, y)].symbol());
            }
            out.push('\n');
        }
        out
    }

    fn demo_state() -> AppState {
        let config = AppConfig {
            forms: AppConfig::demo_forms(),
            ..Default::default()
        };
        AppState {
            config,
            ..Default::default()
        }
    }

    #[test]
    fn home_lists_configured_forms() {
        let mut st = demo_state();
        let text = screen_text(&mut st);
        assert!(text.contains("Contact (guest)"));
        assert!(text.contains("Product feedback"));
        assert!(text.contains("demo backend"));
    }

    #[test]
    fn home_keys_move_and_open() {
        let mut st = demo_state();
        st.config.forms.push(FormEntry::new("third", Audience::Member));
        assert!(home_msg(&mut st, KeyCode::Up).is_none());
        home_msg(&mut st, KeyCode::Down);
        home_msg(&mut st, KeyCode::Down);
        home_msg(&mut st, KeyCode::Down);
        assert_eq!(st.selected, 2);
        match home_msg(&mut st, KeyCode::Char('b')) {
            Some(AppMsg::Open { form_id, target }) => {
                assert_eq!(form_id, "third");
                assert_eq!(target, OpenTarget::Builder);
            }
            _ => panic!("expected an open message"),
        }
    }

    #[test]
    fn fallback_and_unavailable_screens_explain_themselves() {
        let mut st = demo_state();
        st.view = View::Fallback;
        st.fallback = Some(Fallback {
            form_id: "contact".into(),
            target: OpenTarget::Fill,
            message: "backend unavailable: down".into(),
        });
        let text = screen_text(&mut st);
        assert!(text.contains("Could not open 'contact'"));
        assert!(text.contains("r retry"));

        st.view = View::Unavailable;
        st.unavailable = Some("this link expired".into());
        let text = screen_text(&mut st);
        assert!(text.contains("no longer available"));
        assert!(text.contains("this link expired"));
    }

    #[test]
    fn open_arg_parsing() {
        match parse_open_arg("builder:feedback") {
            AppMsg::Open { form_id, target } => {
                assert_eq!(form_id, "feedback");
                assert_eq!(target, OpenTarget::Builder);
            }
            _ => panic!("expected open"),
        }
        match parse_open_arg("contact") {
            AppMsg::Open { form_id, target } => {
                assert_eq!(form_id, "contact");
                assert_eq!(target, OpenTarget::Fill);
            }
            _ => panic!("expected open"),
        }
    }

    #[test]
    fn ticket_advances_and_debug_log_is_bounded() {
        let mut st = AppState::default();
        assert_eq!(st.next_ticket(), 1);
        assert_eq!(st.next_ticket(), 2);
        for i in 0..250 {
            st.dbg(format!("line {i}"));
        }
        assert_eq!(st.debug_log.len(), 200);
        assert_eq!(st.debug_log.front().map(String::as_str), Some("line 50"));
    }
}
