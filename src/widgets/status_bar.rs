use ratatui::prelude::*;
use ratatui::text::{Line, Span};
use ratatui::widgets::*;

use crate::stores::NoticeLevel;
use crate::ui::{AppState, View};

fn level_tag(level: NoticeLevel) -> &'static str {
    match level {
        NoticeLevel::Success => "[OK]",
        NoticeLevel::Error => "[ERROR]",
        NoticeLevel::Info => "[INFO]",
    }
}

/// Status spinner, latest toast, and the view's key help on one line.
pub fn draw_footer(f: &mut Frame, area: Rect, state: &AppState, help_text: &str) {
    let theme = crate::theme::Theme::default();
    let mut spans: Vec<Span> = Vec::new();
    if let Some(msg) = &state.status_text {
        let spinner = ["⠋", "⠙", "⠸", "⠴", "⠦", "⠇"][state.tick as usize % 6];
        spans.push(Span::raw(format!(" {spinner} {msg}")));
        spans.push(Span::raw("  |  "));
    }
    if let Some(t) = &state.toast {
        let color = theme.toast_color(t.level);
        spans.push(Span::styled(
            format!("{} ", level_tag(t.level)),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ));
        spans.push(Span::styled(
            format!("{}  |  ", t.text),
            Style::default().fg(color),
        ));
    }
    if state.view == View::Fill {
        if let Some(fw) = &state.fill {
            if fw.collector.is_preview() {
                spans.push(Span::styled("preview  |  ", theme.text_editing_bold()));
            } else if crate::widgets::Widget::is_capturing_input(fw) {
                spans.push(Span::styled("editing  |  ", theme.text_editing_bold()));
            }
        }
    }
    if state.view == View::Builder {
        if let Some(bw) = &state.builder {
            if bw.builder.is_saving() {
                spans.push(Span::styled("saving  |  ", theme.text_editing_bold()));
            } else if bw.builder.is_dirty() {
                spans.push(Span::styled("unsaved  |  ", theme.text_editing_bold()));
            }
        }
    }
    spans.push(Span::styled(help_text.to_string(), theme.text_muted()));
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}
