use crate::form_core::collector::{Phase, ResponseCollector};
use crate::form_core::renderer::Slot;
use crate::model::{Field, FieldType, FieldValue};
use crate::theme::Theme;
use crate::widgets::chrome::panel_block;
use ratatui::prelude::*;
use ratatui::widgets::*;

pub const OPTIONS_VISIBLE: usize = 6;
const TEXTAREA_PREVIEW_LINES: usize = 3;

/// Cursor and inline-editor state of the fill view.
#[derive(Debug, Clone, Default)]
pub struct FormCursor {
    pub selected: usize,
    pub editing: bool,
    // Single-line editor contents
    pub buffer: String,
    pub option_cursor: usize,
    pub scroll: u16,
}

/// How the selected control is edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorKind {
    Line,
    Multiline,
    Choice,
    MultiChoice,
    Toggle,
}

pub fn editor_kind(field: &Field) -> EditorKind {
    match field.kind {
        FieldType::Textarea => EditorKind::Multiline,
        FieldType::Select | FieldType::Radio => EditorKind::Choice,
        FieldType::Checkbox if field.is_toggle() => EditorKind::Toggle,
        FieldType::Checkbox => EditorKind::MultiChoice,
        _ => EditorKind::Line,
    }
}

fn type_hint(field: &Field) -> Option<String> {
    let range = |unit: &str| match (field.min, field.max) {
        (Some(a), Some(b)) => Some(format!("{a}..{b}{unit}")),
        (Some(a), None) => Some(format!(">= {a}{unit}")),
        (None, Some(b)) => Some(format!("<= {b}{unit}")),
        (None, None) => None,
    };
    match field.kind {
        FieldType::Number => range(""),
        FieldType::Text | FieldType::Textarea => range(" chars"),
        FieldType::Date => Some("YYYY-MM-DD".into()),
        _ => None,
    }
}

fn is_chosen(value: Option<&FieldValue>, option: &str) -> bool {
    match value {
        Some(FieldValue::Text(s)) => s == option,
        Some(FieldValue::List(items)) => items.iter().any(|i| i == option),
        _ => false,
    }
}

fn status_lines(collector: &ResponseCollector, theme: &Theme, tick: u64) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    if collector.is_preview() {
        lines.push(Line::from(Span::styled(
            "PREVIEW · answers are not submitted",
            theme.text_editing_bold(),
        )));
    }
    match collector.phase() {
        Phase::Editing => {}
        Phase::Submitting => {
            let spinner = ["⠋", "⠙", "⠸", "⠴", "⠦", "⠇"][tick as usize % 6];
            lines.push(Line::raw(format!("{spinner} Submitting...")));
        }
        Phase::Submitted(sub) => {
            let again = if collector.definition().advanced.allow_multiple_attempts {
                " · Ctrl+R for a new response"
            } else {
                ""
            };
            lines.push(Line::from(Span::styled(
                format!(
                    "✓ Response {} recorded at {}{again}",
                    sub.id,
                    sub.submitted_at.format("%Y-%m-%d %H:%M UTC")
                ),
                theme.text_success().add_modifier(Modifier::BOLD),
            )));
        }
        Phase::Unavailable(g) => {
            lines.push(Line::from(Span::styled(
                format!("This form is no longer available: {g}"),
                theme.text_error().add_modifier(Modifier::BOLD),
            )));
        }
    }
    if let Some(msg) = collector.last_failure() {
        lines.push(Line::from(Span::styled(
            format!("! Submit failed: {msg} · Ctrl+S to retry"),
            theme.text_error(),
        )));
    }
    if !collector.errors().is_empty() {
        lines.push(Line::from(Span::styled(
            format!("{} field(s) need attention", collector.errors().len()),
            theme.text_error(),
        )));
    }
    lines
}

fn field_lines(
    collector: &ResponseCollector,
    slot: &Slot<'_>,
    selected: bool,
    cursor: &FormCursor,
    cursor_on: bool,
    theme: &Theme,
) -> Vec<Line<'static>> {
    let field = slot.field;
    let value = collector.edit().value(&field.id);
    let editing = selected && cursor.editing;
    let mark = if selected { '›' } else { ' ' };
    let value_style = if editing {
        theme.text_editing_bold()
    } else if selected {
        theme.text_active_bold()
    } else {
        Style::default()
    };
    let mut head = vec![Span::raw(format!("{mark} {}", field.label))];
    if field.required {
        head.push(Span::styled(" *", theme.required_marker()));
    }
    head.push(Span::raw(": "));
    let mut lines = Vec::new();
    match editor_kind(field) {
        EditorKind::Toggle => {
            let on = matches!(value, Some(FieldValue::Bool(true)));
            head.push(Span::styled(if on { "[x]" } else { "[ ]" }, value_style));
            lines.push(Line::from(head));
        }
        EditorKind::Line => {
            if editing {
                let mut text = cursor.buffer.clone();
                if cursor_on {
                    text.push('▏');
                }
                head.push(Span::styled(text, value_style));
            } else {
                match value.filter(|v| !v.is_empty()) {
                    Some(v) => head.push(Span::styled(v.display(), value_style)),
                    None => head.push(Span::styled(
                        field.placeholder.clone().unwrap_or_default(),
                        theme.text_muted(),
                    )),
                }
            }
            if let Some(hint) = type_hint(field) {
                head.push(Span::styled(format!("  ({hint})"), theme.text_muted()));
            }
            lines.push(Line::from(head));
        }
        EditorKind::Multiline => {
            if let Some(hint) = type_hint(field) {
                head.push(Span::styled(format!("({hint})"), theme.text_muted()));
            }
            lines.push(Line::from(head));
            let text = value.and_then(|v| v.as_text()).unwrap_or_default();
            if text.is_empty() {
                lines.push(Line::from(Span::styled(
                    format!("  {}", field.placeholder.clone().unwrap_or_default()),
                    theme.text_muted(),
                )));
            } else {
                let max = field
                    .rows
                    .map(usize::from)
                    .unwrap_or(TEXTAREA_PREVIEW_LINES)
                    .max(1);
                let total = text.lines().count();
                for l in text.lines().take(max) {
                    lines.push(Line::from(Span::styled(format!("  {l}"), value_style)));
                }
                if total > max {
                    let more = total - max;
                    lines.push(Line::from(Span::styled(
                        format!("  … ({more} more line{})", if more == 1 { "" } else { "s" }),
                        theme.text_muted(),
                    )));
                }
            }
        }
        kind @ (EditorKind::Choice | EditorKind::MultiChoice) => {
            let summary = match value.filter(|v| !v.is_empty()) {
                Some(v) => v.display(),
                None => "(none)".into(),
            };
            head.push(Span::styled(summary, value_style));
            lines.push(Line::from(head));
            if editing {
                let total = field.options.len();
                let start = cursor
                    .option_cursor
                    .saturating_sub(OPTIONS_VISIBLE - 1)
                    .min(total.saturating_sub(OPTIONS_VISIBLE));
                let end = (start + OPTIONS_VISIBLE).min(total);
                for (oi, opt) in field.options.iter().enumerate().take(end).skip(start) {
                    let chosen = is_chosen(value, opt);
                    let mark = match (kind, chosen) {
                        (EditorKind::Choice, true) => "(•)",
                        (EditorKind::Choice, false) => "( )",
                        (_, true) => "[x]",
                        (_, false) => "[ ]",
                    };
                    let cur = if oi == cursor.option_cursor { '›' } else { ' ' };
                    let st = if oi == cursor.option_cursor {
                        theme.list_cursor_style()
                    } else {
                        theme.text_muted()
                    };
                    lines.push(Line::from(Span::styled(format!("  {cur} {mark} {opt}"), st)));
                }
            }
        }
    }
    if let Some(err) = collector.field_error(&field.id) {
        lines.push(Line::from(Span::styled(
            format!("  ! {err}"),
            theme.text_error(),
        )));
    }
    lines
}

/// Render the collector's definition and answers. Keeps the selected field in view by adjusting `cursor.scroll`.
pub fn draw_form(
    f: &mut Frame,
    area: Rect,
    collector: &ResponseCollector,
    cursor: &mut FormCursor,
    focused: bool,
    tick: u64,
) {
    let theme = Theme::default();
    let cursor_on = tick % 2 == 0;
    let def = collector.definition();
    let mut lines: Vec<Line> = Vec::new();
    if let Some(desc) = def.description.as_deref().filter(|d| !d.is_empty()) {
        lines.push(Line::from(Span::styled(desc.to_string(), theme.text_muted())));
    }
    if let Some(min) = def.advanced.time_limit.filter(|m| *m > 0) {
        lines.push(Line::from(Span::styled(
            format!("Time limit: {min} min"),
            theme.text_muted(),
        )));
    }
    lines.extend(status_lines(collector, &theme, tick));

    let slots = collector.edit().slots();
    let mut selected_at: Option<(usize, usize)> = None;
    for (i, slot) in slots.iter().enumerate() {
        if slot.index == 0 {
            lines.push(Line::raw(""));
            lines.push(Line::from(Span::styled(
                format!("── {} ──", slot.section.title),
                theme.title_style().add_modifier(Modifier::BOLD),
            )));
            if let Some(desc) = slot.section.description.as_deref() {
                lines.push(Line::from(Span::styled(desc.to_string(), theme.text_muted())));
            }
        }
        let selected = i == cursor.selected;
        let start = lines.len();
        lines.extend(field_lines(collector, slot, selected, cursor, cursor_on, &theme));
        if selected {
            selected_at = Some((start, lines.len()));
        }
    }
    if slots.is_empty() {
        lines.push(Line::from(Span::styled(
            "This form has no questions yet.",
            theme.text_muted(),
        )));
    }
    lines.push(Line::raw(""));
    let submit_style = if collector.is_editable() && !collector.is_preview() {
        theme.text_active_bold()
    } else {
        theme.text_muted()
    };
    lines.push(Line::from(Span::styled("  [ Submit · Ctrl+S ]", submit_style)));

    let inner_h = area.height.saturating_sub(2) as usize;
    if let Some((top, bottom)) = selected_at {
        let scroll = cursor.scroll as usize;
        if top < scroll {
            cursor.scroll = top as u16;
        } else if inner_h > 0 && bottom > scroll + inner_h {
            cursor.scroll = bottom.saturating_sub(inner_h) as u16;
        }
    }
    let max_scroll = lines.len().saturating_sub(inner_h) as u16;
    cursor.scroll = cursor.scroll.min(max_scroll);

    let title = if cursor.editing {
        format!("{} · editing", def.title)
    } else {
        def.title.clone()
    };
    let p = Paragraph::new(lines)
        .block(panel_block(title, focused))
        .scroll((cursor.scroll, 0));
    f.render_widget(p, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FormDefinition, Section};
    use chrono::Utc;
    use ratatui::backend::TestBackend;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn render(collector: &ResponseCollector, cursor: &mut FormCursor, w: u16, h: u16) -> Vec<String> {
        let mut terminal = Terminal::new(TestBackend::new(w, h)).unwrap();
        terminal
            .draw(|f| draw_form(f, f.area(), collector, cursor, true, 1))
            .unwrap();
        let buf = terminal.backend().buffer().clone();
        (0..buf.area.height)
            .map(|y| {
                let mut line: String = (0..buf.area.width).map(|x| buf[(x, y)].symbol()).collect();
                while line.ends_with(' ') {
                    line.pop();
                }
                line
            })
            .collect()
    }

    fn survey() -> Arc<FormDefinition> {
        Arc::new(FormDefinition::new("Survey").with_sections(vec![Section::new("s1", "About you")
            .with_fields(vec![
                Field::new("name", FieldType::Text, "Name").required(),
                Field::new("color", FieldType::Radio, "Color").with_options(["Red", "Green", "Blue"]),
                Field::new("agree", FieldType::Checkbox, "Agree"),
            ])]))
    }

    #[test]
    fn renders_sections_required_markers_and_toggles() {
        let c = ResponseCollector::new("s", crate::model::Audience::Member, survey(), BTreeMap::new(), Utc::now());
        let text = render(&c, &mut FormCursor::default(), 60, 14).join("\n");
        assert!(text.contains("Survey"));
        assert!(text.contains("── About you ──"));
        assert!(text.contains("› Name *:"));
        assert!(text.contains("Color: (none)"));
        assert!(text.contains("Agree: [ ]"));
        assert!(text.contains("[ Submit · Ctrl+S ]"));
    }

    #[test]
    fn choice_editor_lists_options_with_cursor() {
        let mut c = ResponseCollector::new("s", crate::model::Audience::Member, survey(), BTreeMap::new(), Utc::now());
        c.set_value("color", FieldValue::text("Green")).unwrap();
        let mut cursor = FormCursor {
            selected: 1,
            editing: true,
            option_cursor: 2,
            ..Default::default()
        };
        let lines = render(&c, &mut cursor, 50, 14);
        let body: Vec<&str> = lines.iter().map(|l| l.trim_start_matches('│')).collect();
        assert!(body.iter().any(|l| l.contains("  ( ) Red")));
        assert!(body.iter().any(|l| l.contains("  (•) Green")));
        assert!(body.iter().any(|l| l.contains("› ( ) Blue")));
        assert!(lines[0].contains("Survey · editing"));
    }

    #[test]
    fn errors_render_inline_after_failed_submit() {
        let mut c = ResponseCollector::new("s", crate::model::Audience::Member, survey(), BTreeMap::new(), Utc::now());
        assert!(c.begin_submit(Utc::now()).is_err());
        let text = render(&c, &mut FormCursor::default(), 60, 16).join("\n");
        assert!(text.contains("! required"));
        assert!(text.contains("1 field(s) need attention"));
    }

    #[test]
    fn scroll_follows_selection() {
        let fields: Vec<Field> = (0..30)
            .map(|i| Field::new(format!("f{i}"), FieldType::Text, format!("Question {i}")))
            .collect();
        let def = Arc::new(FormDefinition::new("Long").with_sections(vec![Section::new("s", "All").with_fields(fields)]));
        let c = ResponseCollector::new("l", crate::model::Audience::Member, def, BTreeMap::new(), Utc::now());
        let mut cursor = FormCursor {
            selected: 25,
            ..Default::default()
        };
        let text = render(&c, &mut cursor, 40, 10).join("\n");
        assert!(cursor.scroll > 0);
        assert!(text.contains("› Question 25"));
        assert!(!text.contains("Question 0:"));
    }

    #[test]
    fn preview_banner_and_disabled_submit() {
        let c = ResponseCollector::new("s", crate::model::Audience::Member, survey(), BTreeMap::new(), Utc::now())
            .preview();
        let text = render(&c, &mut FormCursor::default(), 60, 14).join("\n");
        assert!(text.contains("PREVIEW"));
    }

    #[test]
    fn editor_kinds_follow_field_types() {
        assert_eq!(editor_kind(&Field::new("a", FieldType::Checkbox, "A")), EditorKind::Toggle);
        assert_eq!(
            editor_kind(&Field::new("a", FieldType::Checkbox, "A").with_options(["x"])),
            EditorKind::MultiChoice
        );
        assert_eq!(editor_kind(&Field::new("a", FieldType::Select, "A")), EditorKind::Choice);
        assert_eq!(editor_kind(&Field::new("a", FieldType::Textarea, "A")), EditorKind::Multiline);
        assert_eq!(editor_kind(&Field::new("a", FieldType::Date, "A")), EditorKind::Line);
    }
}
