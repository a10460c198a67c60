use crate::theme::Theme;
use ratatui::widgets::{Block, Borders};

/// Bordered panel; the border lights up when `focused`.
pub fn panel_block<'a>(title: impl Into<String>, focused: bool) -> Block<'a> {
    let theme = Theme::default();
    let border = if focused {
        theme.border_focused()
    } else {
        theme.border_unfocused()
    };
    Block::default()
        .borders(Borders::ALL)
        .title(title.into())
        .border_style(border)
}
