use crate::stores::NoticeLevel;
use ratatui::style::{Color, Modifier, Style};

#[derive(Clone, Debug)]
pub struct Theme {
    pub bg: Color,
    pub fg: Color,
    pub accent: Color,
    pub frame: Color,
    pub selected: Color,
    pub success: Color,
    pub error: Color,
    pub muted: Color,
    pub required: Color,
}

impl Theme {
    pub fn dark() -> Self {
        Self {
            bg: Color::Rgb(24, 24, 26),
            fg: Color::White,
            accent: Color::Rgb(64, 160, 255),
            frame: Color::Rgb(90, 90, 100),
            selected: Color::Rgb(255, 120, 0),
            success: Color::Green,
            error: Color::Red,
            muted: Color::DarkGray,
            required: Color::Rgb(255, 0, 153),
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::dark()
    }
}

impl Theme {
    pub fn border_focused(&self) -> Style {
        Style::default().fg(self.selected)
    }

    pub fn border_unfocused(&self) -> Style {
        Style::default().fg(self.frame)
    }

    pub fn text_active_bold(&self) -> Style {
        Style::default()
            .fg(self.accent)
            .add_modifier(Modifier::BOLD)
    }

    pub fn text_editing_bold(&self) -> Style {
        Style::default()
            .fg(self.selected)
            .add_modifier(Modifier::BOLD)
    }

    pub fn text_muted(&self) -> Style {
        Style::default().fg(self.muted)
    }

    pub fn text_error(&self) -> Style {
        Style::default().fg(self.error)
    }

    pub fn text_success(&self) -> Style {
        Style::default().fg(self.success)
    }

    pub fn required_marker(&self) -> Style {
        Style::default()
            .fg(self.required)
            .add_modifier(Modifier::BOLD)
    }

    pub fn list_cursor_style(&self) -> Style {
        Style::default()
            .fg(self.bg)
            .bg(self.selected)
            .add_modifier(Modifier::BOLD)
    }

    pub fn title_style(&self) -> Style {
        Style::default().fg(self.accent)
    }

    pub fn base_style(&self) -> Style {
        Style::default().bg(self.bg).fg(self.fg)
    }

    pub fn toast_color(&self, level: NoticeLevel) -> Color {
        match level {
            NoticeLevel::Success => self.success,
            NoticeLevel::Error => self.error,
            NoticeLevel::Info => self.accent,
        }
    }
}

// Shorthands over the default theme
pub fn border_focused() -> Style {
    Theme::default().border_focused()
}

pub fn text_active_bold() -> Style {
    Theme::default().text_active_bold()
}

pub fn text_editing_bold() -> Style {
    Theme::default().text_editing_bold()
}

pub fn text_muted() -> Style {
    Theme::default().text_muted()
}

pub fn text_error() -> Style {
    Theme::default().text_error()
}

pub fn list_cursor_style() -> Style {
    Theme::default().list_cursor_style()
}
