use crate::app::{toast, Effect};
use crate::errors::{BuilderError, SaveError};
use crate::form_core::builder::{FieldPatch, FormBuilder, FormMetaPatch, SectionPatch};
use crate::form_core::validate::validate_definition;
use crate::model::{Field, FieldType};
use crate::stores::NoticeLevel;
use crate::widgets::chrome::panel_block;
use crate::widgets::menu::compute_scroll_window;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::prelude::*;
use ratatui::widgets::*;

/// One line of the outline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Row {
    Form,
    Section(usize),
    Field(usize, usize),
}

/// What the inline prompt is collecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    Title,
    Description,
    Options,
    Range,
    Rename,
    TimeLimit,
}

impl Prompt {
    fn label(&self) -> &'static str {
        match self {
            Prompt::Title => "Label",
            Prompt::Description => "Description",
            Prompt::Options => "Options (comma separated)",
            Prompt::Range => "Range (min..max)",
            Prompt::Rename => "Field id",
            Prompt::TimeLimit => "Time limit in minutes (0 = none)",
        }
    }
}

pub struct BuilderWidget {
    pub builder: FormBuilder,
    // Set after the first Esc on a dirty draft
    pub confirm_discard: bool,
    selected: usize,
    offset: usize,
    prompt: Option<(Prompt, String)>,
}

fn parse_range(input: &str) -> Result<(Option<f64>, Option<f64>), String> {
    let input = input.trim();
    if input.is_empty() {
        return Ok((None, None));
    }
    let (lo, hi) = input
        .split_once("..")
        .ok_or_else(|| format!("expected min..max, got '{input}'"))?;
    let num = |s: &str| -> Result<Option<f64>, String> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(None);
        }
        s.parse::<f64>()
            .map(Some)
            .map_err(|_| format!("'{s}' is not a number"))
    };
    Ok((num(lo)?, num(hi)?))
}

fn fmt_range(field: &Field) -> String {
    match (field.min, field.max) {
        (None, None) => String::new(),
        (lo, hi) => format!(
            "{}..{}",
            lo.map(|v| v.to_string()).unwrap_or_default(),
            hi.map(|v| v.to_string()).unwrap_or_default()
        ),
    }
}

fn none_if_blank(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

// Patch for switching a field to `kind`, keeping the schema valid.
fn retype_patch(field: &Field, kind: FieldType) -> FieldPatch {
    let choice = kind.needs_options() || kind == FieldType::Checkbox;
    let options = if kind.needs_options() && field.options.is_empty() {
        Some(vec!["Option 1".to_string()])
    } else if !choice && !field.options.is_empty() {
        Some(Vec::new())
    } else {
        None
    };
    FieldPatch {
        kind: Some(kind),
        options,
        default_value: Some(None),
        ..Default::default()
    }
}

impl BuilderWidget {
    pub fn new(builder: FormBuilder) -> Self {
        Self {
            builder,
            confirm_discard: false,
            selected: 0,
            offset: 0,
            prompt: None,
        }
    }

    pub fn rows(&self) -> Vec<Row> {
        let mut rows = vec![Row::Form];
        for (si, section) in self.builder.draft().sections.iter().enumerate() {
            rows.push(Row::Section(si));
            rows.extend((0..section.fields.len()).map(|fi| Row::Field(si, fi)));
        }
        rows
    }

    pub fn selected_row(&self) -> Row {
        let rows = self.rows();
        rows.get(self.selected.min(rows.len() - 1))
            .copied()
            .unwrap_or(Row::Form)
    }

    fn select(&mut self, row: Row) {
        if let Some(pos) = self.rows().iter().position(|r| *r == row) {
            self.selected = pos;
        }
    }

    fn clamp_selection(&mut self) {
        self.selected = self.selected.min(self.rows().len() - 1);
    }

    fn ids(&self, row: Row) -> Option<(String, Option<String>)> {
        let draft = self.builder.draft();
        match row {
            Row::Form => None,
            Row::Section(si) => draft.sections.get(si).map(|s| (s.id.clone(), None)),
            Row::Field(si, fi) => draft.sections.get(si).and_then(|s| {
                s.fields
                    .get(fi)
                    .map(|f| (s.id.clone(), Some(f.id.clone())))
            }),
        }
    }

    fn field_at(&self, row: Row) -> Option<&Field> {
        match row {
            Row::Field(si, fi) => self
                .builder
                .draft()
                .sections
                .get(si)
                .and_then(|s| s.fields.get(fi)),
            _ => None,
        }
    }

    fn report(result: Result<(), BuilderError>) -> Vec<Effect> {
        match result {
            Ok(()) => Vec::new(),
            Err(e) => vec![toast(e.to_string(), NoticeLevel::Error)],
        }
    }

    fn add_section(&mut self) -> Vec<Effect> {
        match self.builder.add_section("Untitled section") {
            Ok(_) => {
                let si = self.builder.draft().sections.len() - 1;
                self.select(Row::Section(si));
                Vec::new()
            }
            Err(e) => vec![toast(e.to_string(), NoticeLevel::Error)],
        }
    }

    fn add_field(&mut self) -> Vec<Effect> {
        let si = match self.selected_row() {
            Row::Section(si) | Row::Field(si, _) => si,
            Row::Form if self.builder.draft().sections.is_empty() => {
                let effects = self.add_section();
                if !effects.is_empty() {
                    return effects;
                }
                0
            }
            Row::Form => self.builder.draft().sections.len() - 1,
        };
        let Some(section_id) = self.builder.draft().sections.get(si).map(|s| s.id.clone()) else {
            return Vec::new();
        };
        match self.builder.add_field(&section_id, FieldType::Text) {
            Ok(_) => {
                let fi = self.builder.draft().sections[si].fields.len() - 1;
                self.select(Row::Field(si, fi));
                Vec::new()
            }
            Err(e) => vec![toast(e.to_string(), NoticeLevel::Error)],
        }
    }

    fn delete(&mut self) -> Vec<Effect> {
        let result = match self.ids(self.selected_row()) {
            Some((sid, Some(fid))) => self.builder.remove_field(&sid, &fid),
            Some((sid, None)) => self.builder.remove_section(&sid),
            None => return Vec::new(),
        };
        self.clamp_selection();
        Self::report(result)
    }

    fn shift(&mut self, delta: isize) -> Vec<Effect> {
        let row = self.selected_row();
        let result = match (row, self.ids(row)) {
            (Row::Field(si, fi), Some((sid, Some(fid)))) => {
                let result = self.builder.move_field(&sid, &fid, delta);
                let last = self.builder.draft().sections[si].fields.len().saturating_sub(1);
                let fi = (fi as isize + delta).clamp(0, last as isize) as usize;
                self.select(Row::Field(si, fi));
                result
            }
            (Row::Section(si), Some((sid, None))) => {
                let result = self.builder.move_section(&sid, delta);
                let last = self.builder.draft().sections.len().saturating_sub(1);
                let si = (si as isize + delta).clamp(0, last as isize) as usize;
                self.select(Row::Section(si));
                result
            }
            _ => Ok(()),
        };
        Self::report(result)
    }

    fn update_selected_field(&mut self, patch: FieldPatch) -> Vec<Effect> {
        match self.ids(self.selected_row()) {
            Some((sid, Some(fid))) => Self::report(self.builder.update_field(&sid, &fid, patch)),
            _ => Vec::new(),
        }
    }

    fn cycle_type(&mut self) -> Vec<Effect> {
        let Some(field) = self.field_at(self.selected_row()).cloned() else {
            return Vec::new();
        };
        self.update_selected_field(retype_patch(&field, field.kind.next()))
    }

    fn toggle_required(&mut self) -> Vec<Effect> {
        let Some(required) = self.field_at(self.selected_row()).map(|f| f.required) else {
            return Vec::new();
        };
        self.update_selected_field(FieldPatch {
            required: Some(!required),
            ..Default::default()
        })
    }

    fn open_prompt(&mut self, prompt: Prompt) -> Vec<Effect> {
        let row = self.selected_row();
        let draft = self.builder.draft();
        let field = self.field_at(row);
        let initial = match (prompt, row) {
            (Prompt::Title, Row::Form) => Some(draft.title.clone()),
            (Prompt::Title, Row::Section(si)) => draft.sections.get(si).map(|s| s.title.clone()),
            (Prompt::Title, Row::Field(..)) => field.map(|f| f.label.clone()),
            (Prompt::Description, Row::Form) => Some(draft.description.clone().unwrap_or_default()),
            (Prompt::Description, Row::Section(si)) => draft
                .sections
                .get(si)
                .map(|s| s.description.clone().unwrap_or_default()),
            (Prompt::Description, Row::Field(..)) => {
                field.map(|f| f.placeholder.clone().unwrap_or_default())
            }
            (Prompt::Options, Row::Field(..)) => field
                .filter(|f| f.kind.needs_options() || f.kind == FieldType::Checkbox)
                .map(|f| f.options.join(", ")),
            (Prompt::Range, Row::Field(..)) => field
                .filter(|f| {
                    matches!(f.kind, FieldType::Number | FieldType::Text | FieldType::Textarea)
                })
                .map(fmt_range),
            (Prompt::Rename, Row::Field(..)) => field.map(|f| f.id.clone()),
            (Prompt::TimeLimit, _) => Some(
                draft
                    .advanced
                    .time_limit
                    .map(|m| m.to_string())
                    .unwrap_or_default(),
            ),
            _ => None,
        };
        match initial {
            Some(text) => {
                self.prompt = Some((prompt, text));
                Vec::new()
            }
            None => vec![toast(
                format!("{} does not apply here", prompt.label()),
                NoticeLevel::Info,
            )],
        }
    }

    fn commit_prompt(&mut self, prompt: Prompt, text: String) -> Vec<Effect> {
        let row = self.selected_row();
        let result: Result<(), BuilderError> = match (prompt, row, self.ids(row)) {
            (Prompt::Title, Row::Form, _) => self.builder.update_form_meta(FormMetaPatch {
                title: Some(text.trim().to_string()),
                ..Default::default()
            }),
            (Prompt::Description, Row::Form, _) => self.builder.update_form_meta(FormMetaPatch {
                description: Some(none_if_blank(&text)),
                ..Default::default()
            }),
            (Prompt::TimeLimit, ..) => {
                let minutes = match text.trim() {
                    "" => Ok(None),
                    s => s
                        .parse::<u32>()
                        .map(|m| Some(m).filter(|m| *m > 0))
                        .map_err(|_| format!("'{s}' is not a whole number of minutes")),
                };
                match minutes {
                    Ok(time_limit) => self.builder.update_form_meta(FormMetaPatch {
                        time_limit: Some(time_limit),
                        ..Default::default()
                    }),
                    Err(msg) => return vec![toast(msg, NoticeLevel::Error)],
                }
            }
            (Prompt::Title, Row::Section(_), Some((sid, None))) => self.builder.update_section(
                &sid,
                SectionPatch {
                    title: Some(text.trim().to_string()),
                    ..Default::default()
                },
            ),
            (Prompt::Description, Row::Section(_), Some((sid, None))) => {
                self.builder.update_section(
                    &sid,
                    SectionPatch {
                        description: Some(none_if_blank(&text)),
                        ..Default::default()
                    },
                )
            }
            (_, Row::Field(..), Some((sid, Some(fid)))) => {
                let patch = match prompt {
                    Prompt::Title => FieldPatch {
                        label: Some(text.trim().to_string()),
                        ..Default::default()
                    },
                    Prompt::Description => FieldPatch {
                        placeholder: Some(none_if_blank(&text)),
                        ..Default::default()
                    },
                    Prompt::Options => FieldPatch {
                        options: Some(
                            text.split(',')
                                .map(str::trim)
                                .filter(|s| !s.is_empty())
                                .map(String::from)
                                .collect(),
                        ),
                        default_value: Some(None),
                        ..Default::default()
                    },
                    Prompt::Range => match parse_range(&text) {
                        Ok((min, max)) => FieldPatch {
                            min: Some(min),
                            max: Some(max),
                            ..Default::default()
                        },
                        Err(msg) => return vec![toast(msg, NoticeLevel::Error)],
                    },
                    Prompt::Rename => FieldPatch {
                        id: Some(text.trim().to_string()),
                        ..Default::default()
                    },
                    Prompt::TimeLimit => FieldPatch::default(),
                };
                self.builder.update_field(&sid, &fid, patch)
            }
            _ => Ok(()),
        };
        Self::report(result)
    }

    fn on_prompt_key(&mut self, key: KeyEvent) -> Vec<Effect> {
        let Some((prompt, mut text)) = self.prompt.take() else {
            return Vec::new();
        };
        match key.code {
            KeyCode::Enter => return self.commit_prompt(prompt, text),
            KeyCode::Esc => return Vec::new(),
            KeyCode::Backspace => {
                text.pop();
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => text.push(c),
            _ => {}
        }
        self.prompt = Some((prompt, text));
        Vec::new()
    }

    fn save(&mut self) -> Vec<Effect> {
        match self.builder.begin_save() {
            Ok(req) => vec![Effect::SaveLayout { req }],
            Err(SaveError::InProgress) => vec![toast("Still saving...", NoticeLevel::Info)],
            Err(e) => vec![toast(e.to_string(), NoticeLevel::Error)],
        }
    }

    fn row_line(&self, row: Row) -> Line<'static> {
        let draft = self.builder.draft();
        match row {
            Row::Form => Line::from(Span::styled(
                format!("▣ {}", draft.title),
                crate::theme::text_active_bold(),
            )),
            Row::Section(si) => {
                let s = &draft.sections[si];
                Line::from(vec![
                    Span::raw(format!("  § {}", s.title)),
                    Span::styled(format!("  ({} fields)", s.fields.len()), crate::theme::text_muted()),
                ])
            }
            Row::Field(si, fi) => {
                let f = &draft.sections[si].fields[fi];
                let req = if f.required { " *" } else { "" };
                Line::from(vec![
                    Span::raw(format!("      {}{req}", f.label)),
                    Span::styled(format!("  [{}]", f.kind.as_str()), crate::theme::text_muted()),
                ])
            }
        }
    }

    fn detail_lines(&self, row: Row) -> Vec<Line<'static>> {
        let draft = self.builder.draft();
        let muted = crate::theme::text_muted();
        let kv = |k: &str, v: String| {
            Line::from(vec![Span::styled(format!("{k:<12}"), muted), Span::raw(v)])
        };
        let yes_no = |b: bool| if b { "yes".to_string() } else { "no".to_string() };
        let mut lines = Vec::new();
        match row {
            Row::Form => {
                lines.push(kv("form id", self.builder.form_id().to_string()));
                lines.push(kv("layout id", draft.id.clone().unwrap_or_else(|| "(unsaved)".into())));
                lines.push(kv("title", draft.title.clone()));
                lines.push(kv("description", draft.description.clone().unwrap_or_default()));
                lines.push(kv("sections", draft.sections.len().to_string()));
                lines.push(kv("questions", draft.field_count().to_string()));
                lines.push(kv("proctored", yes_no(draft.advanced.proctored)));
                lines.push(kv(
                    "time limit",
                    draft
                        .advanced
                        .time_limit
                        .map(|m| format!("{m} min"))
                        .unwrap_or_else(|| "none".into()),
                ));
                lines.push(kv("multiple", yes_no(draft.advanced.allow_multiple_attempts)));
                lines.push(Line::raw(""));
                lines.push(Line::from(Span::styled(
                    "Enter title · e description · l time limit · m multiple · x proctored",
                    muted,
                )));
            }
            Row::Section(si) => {
                let s = &draft.sections[si];
                lines.push(kv("section id", s.id.clone()));
                lines.push(kv("title", s.title.clone()));
                lines.push(kv("description", s.description.clone().unwrap_or_default()));
                lines.push(kv("fields", s.fields.len().to_string()));
            }
            Row::Field(si, fi) => {
                let f = &draft.sections[si].fields[fi];
                lines.push(kv("field id", f.id.clone()));
                lines.push(kv("type", f.kind.as_str().to_string()));
                lines.push(kv("label", f.label.clone()));
                lines.push(kv("required", yes_no(f.required)));
                lines.push(kv("placeholder", f.placeholder.clone().unwrap_or_default()));
                if !f.options.is_empty() || f.kind.needs_options() {
                    lines.push(kv("options", f.options.join(", ")));
                }
                let range = fmt_range(f);
                if !range.is_empty() {
                    lines.push(kv("range", range));
                }
                lines.push(Line::raw(""));
                lines.push(Line::from(Span::styled(
                    "Enter label · e placeholder · o options · n range · i id",
                    muted,
                )));
            }
        }
        if let Err(e) = validate_definition(draft) {
            lines.push(Line::raw(""));
            lines.push(Line::from(Span::styled(
                format!("! needs fixing before save: {e}"),
                crate::theme::text_error(),
            )));
        }
        lines
    }
}

impl crate::widgets::Widget for BuilderWidget {
    fn render(&mut self, f: &mut Frame, area: Rect, focused: bool, _tick: u64) {
        self.clamp_selection();
        let prompt_h = if self.prompt.is_some() { 3 } else { 0 };
        let rows_area = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(prompt_h)])
            .split(area);
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(rows_area[0]);

        let rows = self.rows();
        let inner_h = cols[0].height.saturating_sub(2);
        let (start, end) = compute_scroll_window(self.offset, rows.len(), self.selected, inner_h);
        self.offset = start;
        let items: Vec<ListItem> = rows[start..end]
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let item = ListItem::new(self.row_line(*row));
                if start + i == self.selected {
                    item.style(crate::theme::list_cursor_style())
                } else {
                    item
                }
            })
            .collect();
        let dirty = if self.builder.is_dirty() {
            format!(" · {} unsaved change(s)", self.builder.journal().len())
        } else {
            String::new()
        };
        let title = format!("Builder: {}{dirty}", self.builder.form_id());
        f.render_widget(List::new(items).block(panel_block(title, focused)), cols[0]);

        let detail = Paragraph::new(self.detail_lines(self.selected_row()))
            .block(panel_block("Properties", false))
            .wrap(Wrap { trim: false });
        f.render_widget(detail, cols[1]);

        if let Some((prompt, text)) = &self.prompt {
            let p = Paragraph::new(Line::from(vec![
                Span::raw(text.clone()),
                Span::styled("▏", crate::theme::text_editing_bold()),
            ]))
            .block(panel_block(format!("{} · Enter apply · Esc cancel", prompt.label()), true));
            f.render_widget(p, rows_area[1]);
        }
    }

    fn on_key(&mut self, key: KeyEvent) -> Vec<Effect> {
        if self.prompt.is_some() {
            return self.on_prompt_key(key);
        }
        self.confirm_discard = false;
        let navigating = matches!(
            key.code,
            KeyCode::Up | KeyCode::Down | KeyCode::Home | KeyCode::End
        );
        if self.builder.is_saving() && !navigating {
            return vec![toast("Still saving...", NoticeLevel::Info)];
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('s') => self.save(),
                _ => Vec::new(),
            };
        }
        let total = self.rows().len();
        match key.code {
            KeyCode::Up => {
                self.selected = self.selected.saturating_sub(1);
                Vec::new()
            }
            KeyCode::Down => {
                if self.selected + 1 < total {
                    self.selected += 1;
                }
                Vec::new()
            }
            KeyCode::Home => {
                self.selected = 0;
                Vec::new()
            }
            KeyCode::End => {
                self.selected = total - 1;
                Vec::new()
            }
            KeyCode::F(2) => self.save(),
            KeyCode::Char('s') => self.add_section(),
            KeyCode::Char('a') => self.add_field(),
            KeyCode::Char('d') | KeyCode::Delete => self.delete(),
            KeyCode::Char('J') => self.shift(1),
            KeyCode::Char('K') => self.shift(-1),
            KeyCode::Char('t') => self.cycle_type(),
            KeyCode::Char('r') => self.toggle_required(),
            KeyCode::Enter => self.open_prompt(Prompt::Title),
            KeyCode::Char('e') => self.open_prompt(Prompt::Description),
            KeyCode::Char('o') => self.open_prompt(Prompt::Options),
            KeyCode::Char('n') => self.open_prompt(Prompt::Range),
            KeyCode::Char('i') => self.open_prompt(Prompt::Rename),
            KeyCode::Char('l') => self.open_prompt(Prompt::TimeLimit),
            KeyCode::Char('m') => {
                let on = self.builder.draft().advanced.allow_multiple_attempts;
                Self::report(self.builder.update_form_meta(FormMetaPatch {
                    allow_multiple_attempts: Some(!on),
                    ..Default::default()
                }))
            }
            KeyCode::Char('x') => {
                let on = self.builder.draft().advanced.proctored;
                Self::report(self.builder.update_form_meta(FormMetaPatch {
                    proctored: Some(!on),
                    ..Default::default()
                }))
            }
            _ => Vec::new(),
        }
    }

    fn is_capturing_input(&self) -> bool {
        self.prompt.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FormDefinition;
    use crate::widgets::Widget;
    use pretty_assertions::assert_eq;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(w: &mut BuilderWidget, s: &str) {
        for c in s.chars() {
            w.on_key(press(KeyCode::Char(c)));
        }
    }

    fn clear_prompt(w: &mut BuilderWidget) {
        for _ in 0..64 {
            w.on_key(press(KeyCode::Backspace));
        }
    }

    fn blank() -> BuilderWidget {
        BuilderWidget::new(FormBuilder::new("poll", FormDefinition::new("Poll")))
    }

    #[test]
    fn adding_a_field_on_an_empty_form_creates_a_section() {
        let mut w = blank();
        w.on_key(press(KeyCode::Char('a')));
        let draft = w.builder.draft();
        assert_eq!(draft.sections.len(), 1);
        assert_eq!(draft.sections[0].fields.len(), 1);
        assert_eq!(w.selected_row(), Row::Field(0, 0));
        assert!(w.builder.is_dirty());
    }

    #[test]
    fn label_prompt_captures_input_and_applies() {
        let mut w = blank();
        w.on_key(press(KeyCode::Char('a')));
        w.on_key(press(KeyCode::Enter));
        assert!(w.is_capturing_input());
        clear_prompt(&mut w);
        // Keys that are shortcuts elsewhere are plain text inside the prompt
        type_text(&mut w, "Your favourite dish");
        w.on_key(press(KeyCode::Enter));
        assert!(!w.is_capturing_input());
        assert_eq!(w.builder.draft().sections[0].fields[0].label, "Your favourite dish");
    }

    #[test]
    fn type_cycle_adds_options_for_choice_types() {
        let mut w = blank();
        w.on_key(press(KeyCode::Char('a')));
        // text → email → tel → number → date → url → textarea → select
        for _ in 0..7 {
            w.on_key(press(KeyCode::Char('t')));
        }
        let f = &w.builder.draft().sections[0].fields[0];
        assert_eq!(f.kind, FieldType::Select);
        assert_eq!(f.options, vec!["Option 1".to_string()]);

        w.on_key(press(KeyCode::Char('o')));
        clear_prompt(&mut w);
        type_text(&mut w, "Tea, Coffee, ,Water");
        w.on_key(press(KeyCode::Enter));
        let f = &w.builder.draft().sections[0].fields[0];
        assert_eq!(f.options, vec!["Tea", "Coffee", "Water"]);
    }

    #[test]
    fn empty_options_are_refused_with_a_toast() {
        let mut w = blank();
        w.on_key(press(KeyCode::Char('a')));
        for _ in 0..7 {
            w.on_key(press(KeyCode::Char('t')));
        }
        w.on_key(press(KeyCode::Char('o')));
        clear_prompt(&mut w);
        let effects = w.on_key(press(KeyCode::Enter));
        assert!(matches!(
            effects.as_slice(),
            [Effect::ShowToast { level: NoticeLevel::Error, .. }]
        ));
        assert_eq!(w.builder.draft().sections[0].fields[0].options.len(), 1);
    }

    #[test]
    fn move_and_delete_fields() {
        let mut w = blank();
        w.on_key(press(KeyCode::Char('a')));
        w.on_key(press(KeyCode::Char('a')));
        let ids: Vec<String> = w.builder.draft().sections[0]
            .fields
            .iter()
            .map(|f| f.id.clone())
            .collect();
        assert_eq!(w.selected_row(), Row::Field(0, 1));
        w.on_key(press(KeyCode::Char('K')));
        assert_eq!(w.selected_row(), Row::Field(0, 0));
        assert_eq!(w.builder.draft().sections[0].fields[0].id, ids[1]);
        w.on_key(press(KeyCode::Char('d')));
        assert_eq!(w.builder.draft().sections[0].fields.len(), 1);
        assert_eq!(w.builder.draft().sections[0].fields[0].id, ids[0]);
    }

    #[test]
    fn range_and_time_limit_prompts_parse_input() {
        assert_eq!(parse_range("1..10"), Ok((Some(1.0), Some(10.0))));
        assert_eq!(parse_range("..5"), Ok((None, Some(5.0))));
        assert_eq!(parse_range(""), Ok((None, None)));
        assert!(parse_range("ten").is_err());

        let mut w = blank();
        w.on_key(press(KeyCode::Char('l')));
        type_text(&mut w, "30");
        w.on_key(press(KeyCode::Enter));
        assert_eq!(w.builder.draft().advanced.time_limit, Some(30));
        w.on_key(press(KeyCode::Char('m')));
        assert!(w.builder.draft().advanced.allow_multiple_attempts);
    }

    #[test]
    fn ctrl_s_saves_only_a_valid_draft() {
        let mut w = blank();
        w.on_key(press(KeyCode::Char('a')));
        let effects = w.on_key(KeyEvent::new(KeyCode::Char('s'), KeyModifiers::CONTROL));
        match effects.as_slice() {
            [Effect::SaveLayout { req }] => {
                assert!(req.create);
                assert_eq!(req.form_id, "poll");
            }
            _ => panic!("expected a save effect"),
        }

        let mut broken = FormDefinition::new("Broken");
        broken.sections.push(crate::model::Section::new("s", ""));
        let mut w = BuilderWidget::new(FormBuilder::new("poll", broken));
        let effects = w.on_key(press(KeyCode::F(2)));
        assert!(matches!(
            effects.as_slice(),
            [Effect::ShowToast { level: NoticeLevel::Error, .. }]
        ));
    }

    #[test]
    fn outline_renders_rows_and_properties() {
        let mut w = blank();
        w.on_key(press(KeyCode::Char('a')));
        w.on_key(press(KeyCode::Char('r')));
        let mut terminal = Terminal::new(ratatui::backend::TestBackend::new(100, 16)).unwrap();
        terminal
            .draw(|f| w.render(f, f.area(), true, 0))
            .unwrap();
        let buf = terminal.backend().buffer().clone();
        let text: String = (0..buf.area.height)
            .map(|y| (0..buf.area.width).map(|x| buf[(x, y)].symbol()).collect::<String>() + "\n")
            .collect();
        assert!(text.contains("▣ Poll"));
        assert!(text.contains("§ Untitled section"));
        assert!(text.contains("Untitled question *"));
        assert!(text.contains("required    yes"));
    }
}
