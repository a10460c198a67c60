use crate::app::Effect;
use crate::model::{FormDefinition, Submission};
use crate::widgets::chrome::panel_block;
use crate::widgets::menu::compute_scroll_window;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::*;
use std::sync::Arc;

/// Read-only browser over a form's submissions.
pub struct ResponsesWidget {
    form_id: String,
    title: String,
    layout: Option<Arc<FormDefinition>>,
    list: Vec<Submission>,
    selected: usize,
    offset: usize,
    raw: bool,
    scroll_y: u16,
    last_viewport_h: u16,
}

impl ResponsesWidget {
    pub fn new(
        form_id: impl Into<String>,
        title: impl Into<String>,
        layout: Option<Arc<FormDefinition>>,
        list: Vec<Submission>,
    ) -> Self {
        let mut w = Self {
            form_id: form_id.into(),
            title: title.into(),
            layout,
            list: Vec::new(),
            selected: 0,
            offset: 0,
            raw: false,
            scroll_y: 0,
            last_viewport_h: 0,
        };
        w.replace(list);
        w
    }

    /// Swap in a fresh list, newest first, keeping the cursor on the same submission when it survives.
    pub fn replace(&mut self, mut list: Vec<Submission>) {
        list.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        let keep = self.list.get(self.selected).map(|s| s.id.clone());
        self.list = list;
        self.selected = keep
            .and_then(|id| self.list.iter().position(|s| s.id == id))
            .unwrap_or(0);
        self.scroll_y = 0;
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn selected(&self) -> Option<&Submission> {
        self.list.get(self.selected)
    }

    fn label_for<'a>(&'a self, field_id: &'a str) -> &'a str {
        self.layout
            .as_ref()
            .and_then(|d| d.find_field(field_id))
            .map(|f| f.label.as_str())
            .unwrap_or(field_id)
    }

    fn detail_lines(&self, sub: &Submission) -> Vec<Line<'static>> {
        if self.raw {
            let text = serde_json::to_string_pretty(sub).unwrap_or_else(|e| e.to_string());
            return text.lines().map(|l| Line::raw(l.to_string())).collect();
        }
        let muted = crate::theme::text_muted();
        let mut lines = vec![
            Line::from(vec![Span::styled("id         ", muted), Span::raw(sub.id.clone())]),
            Line::from(vec![
                Span::styled("submitted  ", muted),
                Span::raw(sub.submitted_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
            ]),
            Line::raw(""),
        ];
        // Layout order first, then answers to fields the layout no longer has
        let mut shown: Vec<&str> = Vec::new();
        if let Some(def) = &self.layout {
            for field in def.fields() {
                if let Some(v) = sub.data.get(&field.id) {
                    shown.push(field.id.as_str());
                    lines.push(Line::from(Span::styled(
                        field.label.clone(),
                        crate::theme::text_active_bold(),
                    )));
                    lines.push(Line::raw(format!("  {}", v.display())));
                }
            }
        }
        for (id, v) in &sub.data {
            if shown.contains(&id.as_str()) {
                continue;
            }
            lines.push(Line::from(Span::styled(
                self.label_for(id).to_string(),
                crate::theme::text_active_bold(),
            )));
            lines.push(Line::raw(format!("  {}", v.display())));
        }
        lines
    }
}

impl crate::widgets::Widget for ResponsesWidget {
    fn render(&mut self, f: &mut Frame, area: Rect, focused: bool, _tick: u64) {
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
            .split(area);

        let inner_h = cols[0].height.saturating_sub(2);
        let (start, end) = compute_scroll_window(self.offset, self.list.len(), self.selected, inner_h);
        self.offset = start;
        let items: Vec<ListItem> = self.list[start..end]
            .iter()
            .enumerate()
            .map(|(i, sub)| {
                let text = format!(
                    "{}  {}",
                    sub.submitted_at.format("%Y-%m-%d %H:%M"),
                    sub.id
                );
                let item = ListItem::new(text);
                if start + i == self.selected {
                    item.style(crate::theme::list_cursor_style())
                } else {
                    item
                }
            })
            .collect();
        let title = format!("{} · {} response(s)", self.title, self.list.len());
        f.render_widget(List::new(items).block(panel_block(title, focused)), cols[0]);

        let lines = match self.list.get(self.selected) {
            Some(sub) => self.detail_lines(sub),
            None => vec![Line::from(Span::styled(
                format!("No responses for '{}' yet. Press r to refresh.", self.form_id),
                crate::theme::text_muted(),
            ))],
        };
        self.last_viewport_h = cols[1].height.saturating_sub(2);
        let max_scroll = (lines.len() as u16).saturating_sub(self.last_viewport_h);
        self.scroll_y = self.scroll_y.min(max_scroll);
        let mode = if self.raw { "Response · raw JSON" } else { "Response" };
        let p = Paragraph::new(lines)
            .block(panel_block(mode, false))
            .wrap(Wrap { trim: false })
            .scroll((self.scroll_y, 0));
        f.render_widget(p, cols[1]);
    }

    fn on_key(&mut self, key: KeyEvent) -> Vec<Effect> {
        match key.code {
            KeyCode::Up => {
                if self.selected > 0 {
                    self.selected -= 1;
                    self.scroll_y = 0;
                }
            }
            KeyCode::Down => {
                if self.selected + 1 < self.list.len() {
                    self.selected += 1;
                    self.scroll_y = 0;
                }
            }
            KeyCode::PageUp => self.scroll_y = self.scroll_y.saturating_sub(self.last_viewport_h),
            KeyCode::PageDown => self.scroll_y = self.scroll_y.saturating_add(self.last_viewport_h),
            KeyCode::Char('j') => {
                self.raw = !self.raw;
                self.scroll_y = 0;
            }
            KeyCode::Char('r') | KeyCode::F(5) => {
                return vec![Effect::FetchResponses {
                    form_id: self.form_id.clone(),
                }];
            }
            KeyCode::Char('y') => {
                if let Some(sub) = self.selected() {
                    if let Ok(text) = serde_json::to_string_pretty(sub) {
                        return vec![Effect::CopyToClipboard { text }];
                    }
                }
            }
            _ => {}
        }
        Vec::new()
    }
}
