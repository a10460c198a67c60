use crate::app::{toast, Effect};
use crate::errors::SubmitRejected;
use crate::form_core::collector::ResponseCollector;
use crate::model::{Field, FieldValue};
use crate::stores::NoticeLevel;
use crate::widgets::form::{draw_form, editor_kind, EditorKind, FormCursor};
use chrono::Utc;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear};
use std::collections::HashMap;
use tui_textarea::{Input, Key, TextArea};

pub struct FormWidget {
    pub collector: ResponseCollector,
    cursor: FormCursor,
    ta_map: HashMap<String, TextArea<'static>>,
}

fn to_input(key: KeyEvent) -> Input {
    let k = match key.code {
        KeyCode::Char(c) => Key::Char(c),
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Enter => Key::Enter,
        KeyCode::Left => Key::Left,
        KeyCode::Right => Key::Right,
        KeyCode::Up => Key::Up,
        KeyCode::Down => Key::Down,
        KeyCode::Tab => Key::Tab,
        KeyCode::Delete => Key::Delete,
        KeyCode::Home => Key::Home,
        KeyCode::End => Key::End,
        KeyCode::PageUp => Key::PageUp,
        KeyCode::PageDown => Key::PageDown,
        KeyCode::Esc => Key::Esc,
        KeyCode::F(n) => Key::F(n),
        _ => Key::Null,
    };
    Input {
        key: k,
        ctrl: key.modifiers.contains(KeyModifiers::CONTROL),
        alt: key.modifiers.contains(KeyModifiers::ALT),
        shift: key.modifiers.contains(KeyModifiers::SHIFT),
    }
}

fn is_submit_key(key: &KeyEvent) -> bool {
    key.code == KeyCode::F(2)
        || (key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('s'))
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let v = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(v[1])[1]
}

impl FormWidget {
    pub fn new(collector: ResponseCollector) -> Self {
        Self {
            collector,
            cursor: FormCursor::default(),
            ta_map: HashMap::new(),
        }
    }

    pub fn selected(&self) -> usize {
        self.cursor.selected
    }

    fn selected_field(&self) -> Option<Field> {
        self.collector
            .edit()
            .slots()
            .get(self.cursor.selected)
            .map(|s| s.field.clone())
    }

    fn field_count(&self) -> usize {
        self.collector.definition().field_count()
    }

    fn set(&mut self, field_id: &str, value: FieldValue) -> Vec<Effect> {
        match self.collector.set_value(field_id, value) {
            Ok(()) => Vec::new(),
            Err(e) => vec![toast(e.to_string(), NoticeLevel::Info)],
        }
    }

    fn clear(&mut self, field_id: &str) -> Vec<Effect> {
        match self.collector.clear_value(field_id) {
            Ok(()) => Vec::new(),
            Err(e) => vec![toast(e.to_string(), NoticeLevel::Info)],
        }
    }

    fn option_index(&self, field: &Field) -> usize {
        let current = self.collector.edit().value(&field.id);
        let first = match current {
            Some(FieldValue::Text(s)) => field.options.iter().position(|o| o == s),
            Some(FieldValue::List(items)) => items
                .first()
                .and_then(|i| field.options.iter().position(|o| o == i)),
            _ => None,
        };
        first.unwrap_or(0)
    }

    fn begin_edit(&mut self, field: &Field) -> Vec<Effect> {
        if !self.collector.is_editable() {
            return vec![toast("The form is read-only right now", NoticeLevel::Info)];
        }
        match editor_kind(field) {
            EditorKind::Toggle => return self.toggle(field),
            EditorKind::Line => {
                self.cursor.buffer = self
                    .collector
                    .edit()
                    .value(&field.id)
                    .map(|v| match v {
                        FieldValue::Text(s) => s.clone(),
                        other => other.display(),
                    })
                    .unwrap_or_default();
            }
            EditorKind::Multiline => {
                let mut ta = TextArea::default();
                if let Some(text) = self.collector.edit().value(&field.id).and_then(|v| v.as_text()) {
                    ta.insert_str(text);
                }
                self.ta_map.insert(field.id.clone(), ta);
            }
            EditorKind::Choice | EditorKind::MultiChoice => {
                if field.options.is_empty() {
                    return vec![toast("This question has no options", NoticeLevel::Info)];
                }
                self.cursor.option_cursor = self.option_index(field);
            }
        }
        self.cursor.editing = true;
        Vec::new()
    }

    fn toggle(&mut self, field: &Field) -> Vec<Effect> {
        let on = matches!(
            self.collector.edit().value(&field.id),
            Some(FieldValue::Bool(true))
        );
        self.set(&field.id, FieldValue::Bool(!on))
    }

    // Step a single choice without opening the option list.
    fn cycle_choice(&mut self, field: &Field, delta: isize) -> Vec<Effect> {
        let n = field.options.len();
        if n == 0 {
            return Vec::new();
        }
        let current = match self.collector.edit().value(&field.id) {
            Some(FieldValue::Text(s)) => field.options.iter().position(|o| o == s),
            _ => None,
        };
        let next = match current {
            Some(i) => (i as isize + delta).rem_euclid(n as isize) as usize,
            None if delta < 0 => n - 1,
            None => 0,
        };
        let value = FieldValue::text(field.options[next].clone());
        self.set(&field.id, value)
    }

    fn commit_line(&mut self, field: &Field) -> Vec<Effect> {
        let text = std::mem::take(&mut self.cursor.buffer);
        self.cursor.editing = false;
        if text.trim().is_empty() {
            self.clear(&field.id)
        } else {
            self.set(&field.id, FieldValue::Text(text))
        }
    }

    pub fn commit_textarea(&mut self) -> Vec<Effect> {
        let Some(field) = self.selected_field() else {
            return Vec::new();
        };
        self.cursor.editing = false;
        let Some(ta) = self.ta_map.remove(&field.id) else {
            return Vec::new();
        };
        let text = ta.lines().join("\n");
        if text.trim().is_empty() {
            self.clear(&field.id)
        } else {
            self.set(&field.id, FieldValue::Text(text))
        }
    }

    fn choose_option(&mut self, field: &Field) -> Vec<Effect> {
        let Some(opt) = field.options.get(self.cursor.option_cursor).cloned() else {
            return Vec::new();
        };
        if editor_kind(field) == EditorKind::Choice {
            self.cursor.editing = false;
            return self.set(&field.id, FieldValue::Text(opt));
        }
        let mut items = match self.collector.edit().value(&field.id) {
            Some(FieldValue::List(items)) => items.clone(),
            _ => Vec::new(),
        };
        if let Some(pos) = items.iter().position(|i| *i == opt) {
            items.remove(pos);
        } else {
            items.push(opt);
            // Keep answers in option order
            items.sort_by_key(|i| field.options.iter().position(|o| o == i));
        }
        if items.is_empty() {
            self.clear(&field.id)
        } else {
            self.set(&field.id, FieldValue::List(items))
        }
    }

    fn submit(&mut self) -> Vec<Effect> {
        match self.collector.begin_submit(Utc::now()) {
            Ok(pending) => vec![Effect::Submit { pending }],
            Err(SubmitRejected::Invalid(errors)) => {
                let first = errors.iter().next().map(|(id, _)| id.to_string());
                if let Some(id) = first {
                    if let Some(pos) = self
                        .collector
                        .edit()
                        .slots()
                        .iter()
                        .position(|s| s.field.id == id)
                    {
                        self.cursor.selected = pos;
                    }
                }
                vec![toast(
                    SubmitRejected::Invalid(errors).to_string(),
                    NoticeLevel::Error,
                )]
            }
            Err(SubmitRejected::Gate(g)) => vec![Effect::Unavailable {
                reason: g.to_string(),
            }],
            Err(e) => vec![toast(e.to_string(), NoticeLevel::Info)],
        }
    }

    fn restart(&mut self) -> Vec<Effect> {
        match self.collector.restart() {
            Ok(()) => {
                self.cursor = FormCursor::default();
                self.ta_map.clear();
                Vec::new()
            }
            Err(e) => vec![toast(e.to_string(), NoticeLevel::Info)],
        }
    }

    fn on_edit_key(&mut self, field: &Field, key: KeyEvent) -> Vec<Effect> {
        match editor_kind(field) {
            EditorKind::Line => match key.code {
                KeyCode::Enter => self.commit_line(field),
                KeyCode::Esc => {
                    self.cursor.editing = false;
                    self.cursor.buffer.clear();
                    Vec::new()
                }
                KeyCode::Backspace => {
                    self.cursor.buffer.pop();
                    Vec::new()
                }
                KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                    self.cursor.buffer.push(c);
                    Vec::new()
                }
                _ => Vec::new(),
            },
            EditorKind::Multiline => {
                if is_submit_key(&key) {
                    return self.commit_textarea();
                }
                if key.code == KeyCode::Esc {
                    self.cursor.editing = false;
                    self.ta_map.remove(&field.id);
                    return Vec::new();
                }
                if let Some(ta) = self.ta_map.get_mut(&field.id) {
                    ta.input(to_input(key));
                }
                Vec::new()
            }
            EditorKind::Choice | EditorKind::MultiChoice => match key.code {
                KeyCode::Up => {
                    self.cursor.option_cursor = self.cursor.option_cursor.saturating_sub(1);
                    Vec::new()
                }
                KeyCode::Down => {
                    if self.cursor.option_cursor + 1 < field.options.len() {
                        self.cursor.option_cursor += 1;
                    }
                    Vec::new()
                }
                KeyCode::Char(' ') => self.choose_option(field),
                KeyCode::Enter if editor_kind(field) == EditorKind::Choice => {
                    self.choose_option(field)
                }
                KeyCode::Enter | KeyCode::Esc => {
                    self.cursor.editing = false;
                    Vec::new()
                }
                _ => Vec::new(),
            },
            EditorKind::Toggle => {
                self.cursor.editing = false;
                Vec::new()
            }
        }
    }
}

impl crate::widgets::Widget for FormWidget {
    fn render(&mut self, f: &mut Frame, area: Rect, focused: bool, tick: u64) {
        draw_form(f, area, &self.collector, &mut self.cursor, focused, tick);
        if !self.cursor.editing {
            return;
        }
        let Some(field) = self.selected_field() else {
            return;
        };
        if let Some(ta) = self.ta_map.get_mut(&field.id) {
            ta.set_block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(crate::theme::border_focused())
                    .title(format!("Editing: {} · Ctrl+S done · Esc cancel", field.label)),
            );
            let rect = centered_rect(80, 70, area);
            f.render_widget(Clear, rect);
            f.render_widget(&*ta, rect);
        }
    }

    fn on_key(&mut self, key: KeyEvent) -> Vec<Effect> {
        let field = self.selected_field();
        if self.cursor.editing {
            return match field {
                Some(field) => self.on_edit_key(&field, key),
                None => {
                    self.cursor.editing = false;
                    Vec::new()
                }
            };
        }
        if is_submit_key(&key) {
            return self.submit();
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('r') {
            return self.restart();
        }
        let total = self.field_count();
        match key.code {
            KeyCode::Up | KeyCode::BackTab => {
                self.cursor.selected = self.cursor.selected.saturating_sub(1);
                Vec::new()
            }
            KeyCode::Down | KeyCode::Tab => {
                if self.cursor.selected + 1 < total {
                    self.cursor.selected += 1;
                }
                Vec::new()
            }
            KeyCode::Home => {
                self.cursor.selected = 0;
                Vec::new()
            }
            KeyCode::End => {
                self.cursor.selected = total.saturating_sub(1);
                Vec::new()
            }
            KeyCode::Enter => match field {
                Some(field) => self.begin_edit(&field),
                None => Vec::new(),
            },
            KeyCode::Char(' ') => match field {
                Some(field) if editor_kind(&field) == EditorKind::Toggle => self.toggle(&field),
                Some(field) => self.begin_edit(&field),
                None => Vec::new(),
            },
            KeyCode::Left | KeyCode::Right => match field {
                Some(field) if editor_kind(&field) == EditorKind::Choice => {
                    let delta = if key.code == KeyCode::Left { -1 } else { 1 };
                    self.cycle_choice(&field, delta)
                }
                Some(field) if editor_kind(&field) == EditorKind::Toggle => self.toggle(&field),
                _ => Vec::new(),
            },
            KeyCode::Delete | KeyCode::Backspace => match field {
                Some(field) => self.clear(&field.id),
                None => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    fn is_capturing_input(&self) -> bool {
        self.cursor.editing
    }
}
