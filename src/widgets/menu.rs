use ratatui::prelude::*;
use ratatui::widgets::*;

use crate::model::Audience;
use crate::ui::AppState;
use crate::widgets::chrome::panel_block;

/// Visible `[start, end)` window that keeps `selected` on screen, scrolling as little as possible.
pub(crate) fn compute_scroll_window(
    offset: usize,
    total: usize,
    selected: usize,
    inner_h: u16,
) -> (usize, usize) {
    if inner_h == 0 || total == 0 {
        return (0, 0);
    }
    let ih = inner_h as usize;
    let sel = selected.min(total - 1);
    let mut start = offset.min(total.saturating_sub(ih));
    if sel < start {
        start = sel;
    } else if sel >= start + ih {
        start = sel + 1 - ih;
    }
    (start, (start + ih).min(total))
}

pub fn draw_home(f: &mut Frame, area: Rect, state: &mut AppState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(area);
    draw_form_list(f, cols[0], state);
    draw_form_details(f, cols[1], state);
}

fn draw_form_list(f: &mut Frame, area: Rect, state: &mut AppState) {
    let inner_h = area.height.saturating_sub(2);
    let total = state.config.forms.len();
    let (start, end) = compute_scroll_window(state.menu_offset, total, state.selected, inner_h);
    state.menu_offset = start;
    let cursor = crate::theme::list_cursor_style();
    let items: Vec<ListItem> = state.config.forms[start..end]
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let idx = start + i;
            let mark = if idx == state.selected { "> " } else { "  " };
            let tag = match entry.audience {
                Audience::Guest => " [guest]",
                Audience::Member => "",
            };
            let mut spans = vec![Span::raw(format!("{mark}{}", entry.display_title()))];
            spans.push(Span::styled(tag, crate::theme::text_muted()));
            if state.links.contains_key(&entry.id) {
                spans.push(Span::styled(" [link]", crate::theme::text_muted()));
            }
            let item = ListItem::new(Line::from(spans));
            if idx == state.selected {
                item.style(cursor)
            } else {
                item
            }
        })
        .collect();
    let title = format!("Forms ({total})");
    f.render_widget(List::new(items).block(panel_block(title, true)), area);
}

fn draw_form_details(f: &mut Frame, area: Rect, state: &AppState) {
    let block = panel_block("Details", false);
    let Some(entry) = state.config.forms.get(state.selected) else {
        let p = Paragraph::new("No forms configured. Add entries under `forms:` in formdesk.yaml.")
            .block(block)
            .wrap(Wrap { trim: true });
        f.render_widget(p, area);
        return;
    };
    let muted = crate::theme::text_muted();
    let mut lines = vec![
        Line::from(Span::styled(
            entry.display_title().to_string(),
            crate::theme::text_active_bold(),
        )),
        Line::from(vec![Span::styled("id        ", muted), Span::raw(entry.id.clone())]),
        Line::from(vec![
            Span::styled("audience  ", muted),
            Span::raw(match entry.audience {
                Audience::Guest => "guest (share link)",
                Audience::Member => "member",
            }),
        ]),
    ];
    let link = state.links.get(&entry.id);
    let expires = link
        .and_then(|l| l.expires_at)
        .or(entry.expires_at)
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string());
    if let Some(exp) = expires {
        lines.push(Line::from(vec![Span::styled("expires   ", muted), Span::raw(exp)]));
    }
    if let Some(min) = link.and_then(|l| l.time_limit).or(entry.time_limit) {
        lines.push(Line::from(vec![
            Span::styled("time      ", muted),
            Span::raw(format!("{min} min")),
        ]));
    }
    if let Some(def) = state.layouts.get(&entry.id) {
        lines.push(Line::from(vec![
            Span::styled("layout    ", muted),
            Span::raw(format!(
                "{} section(s), {} question(s)",
                def.sections.len(),
                def.field_count()
            )),
        ]));
    }
    lines.push(Line::raw(""));
    lines.push(Line::from(Span::styled(
        "Enter fill · b build · v responses · g share link",
        muted,
    )));
    f.render_widget(Paragraph::new(lines).block(block).wrap(Wrap { trim: true }), area);
}
