//! Theme configuration and colors.
//!
//! Palettes come from the `ratatui-themes` crate; [`ThemeColors`] turns one
//! into the styles the feed, rich text and panels are drawn with.

use ratatui::style::{Color, Modifier, Style};
use ratatui_themes::{ThemeName, ThemePalette};
use serde::{Deserialize, Serialize};

/// Bluesky brand blue (#0085FF), used for the verification badge
const BADGE_BLUE: Color = Color::Rgb(0, 133, 255);

/// Theme selected in the config file, stored as its `ThemeName`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Theme(pub ThemeName);

impl Theme {
    /// Every selectable theme, in picker order
    #[must_use]
    pub const fn all() -> &'static [ThemeName] {
        ThemeName::all()
    }

    /// Next theme in the picker
    #[must_use]
    pub fn next(&self) -> Self {
        Self(self.0.next())
    }

    /// Display name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.0.display_name()
    }

    /// Styles for this theme
    #[must_use]
    pub fn colors(&self) -> ThemeColors {
        ThemeColors::new(self.0.palette())
    }

    /// Underlying `ThemeName`
    #[must_use]
    pub const fn inner(&self) -> ThemeName {
        self.0
    }
}

impl From<ThemeName> for Theme {
    fn from(name: ThemeName) -> Self {
        Self(name)
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Styles derived from a palette
#[derive(Debug, Clone, Copy)]
pub struct ThemeColors {
    /// Screen background
    pub bg: Color,
    /// Status bar and popup background, a step lighter than `bg`
    pub bg_secondary: Color,
    palette: ThemePalette,
}

impl ThemeColors {
    /// Derive styles from `palette`
    #[must_use]
    pub fn new(palette: ThemePalette) -> Self {
        Self {
            bg: palette.bg,
            bg_secondary: lighten(palette.bg, 10),
            palette,
        }
    }

    fn fg(color: Color) -> Style {
        Style::default().fg(color)
    }

    fn bold(color: Color) -> Style {
        Self::fg(color).add_modifier(Modifier::BOLD)
    }

    /// Body text
    #[must_use]
    pub fn text(&self) -> Style {
        Self::fg(self.palette.fg)
    }

    /// Secondary detail such as URLs and repost lines
    #[must_use]
    pub fn text_dim(&self) -> Style {
        Self::fg(self.palette.muted).add_modifier(Modifier::ITALIC)
    }

    /// Timestamps and separators
    #[must_use]
    pub fn text_muted(&self) -> Style {
        Self::fg(self.palette.muted)
    }

    /// Display names and titles
    #[must_use]
    pub fn text_primary(&self) -> Style {
        Self::fg(self.palette.accent)
    }

    /// Status messages
    #[must_use]
    pub fn text_secondary(&self) -> Style {
        Self::fg(self.palette.secondary)
    }

    /// Active account marker
    #[must_use]
    pub fn text_success(&self) -> Style {
        Self::fg(self.palette.success)
    }

    /// Character counter near the limit
    #[must_use]
    pub fn text_warning(&self) -> Style {
        Self::fg(self.palette.warning)
    }

    /// Character counter over the limit
    #[must_use]
    pub fn text_error(&self) -> Style {
        Self::fg(self.palette.error)
    }

    /// Informational notes
    #[must_use]
    pub fn text_info(&self) -> Style {
        Self::fg(self.palette.info)
    }

    /// Unfocused panel border
    #[must_use]
    pub fn block(&self) -> Style {
        Self::fg(self.palette.muted)
    }

    /// Focused panel border
    #[must_use]
    pub fn block_focus(&self) -> Style {
        Self::fg(self.palette.accent)
    }

    /// Highlighted list row
    #[must_use]
    pub fn selected(&self) -> Style {
        Self::bold(self.palette.fg).bg(self.palette.selection)
    }

    /// Inactive tab
    #[must_use]
    pub fn tab(&self) -> Style {
        Self::fg(self.palette.muted)
    }

    /// Current tab
    #[must_use]
    pub fn tab_active(&self) -> Style {
        Self::bold(self.palette.accent)
    }

    /// Key names in hints and the help popup
    #[must_use]
    pub fn key_hint(&self) -> Style {
        Self::bold(self.palette.secondary)
    }

    /// `@handle` span in post text
    #[must_use]
    pub fn mention(&self) -> Style {
        Self::bold(self.palette.accent)
    }

    /// Link span in post text and link cards
    #[must_use]
    pub fn link(&self) -> Style {
        Self::fg(self.palette.info).add_modifier(Modifier::UNDERLINED)
    }

    /// `#tag` span in post text and article tags
    #[must_use]
    pub fn hashtag(&self) -> Style {
        Self::fg(self.palette.secondary)
    }

    /// Verification badge after an author name
    #[must_use]
    pub fn badge(&self) -> Style {
        Self::bold(BADGE_BLUE)
    }

    /// Bar drawn left of quoted posts
    #[must_use]
    pub fn quote_gutter(&self) -> Style {
        Self::fg(self.palette.muted)
    }

    /// Butterfly in the tab bar
    #[must_use]
    pub fn logo_icon(&self) -> Style {
        Self::bold(self.palette.accent)
    }

    /// "Skyloft" in the tab bar
    #[must_use]
    pub fn logo_text(&self) -> Style {
        Self::bold(self.palette.secondary)
    }
}

/// Raise each RGB channel by `amount`; named and indexed colors pass through
fn lighten(color: Color, amount: u8) -> Color {
    match color {
        Color::Rgb(r, g, b) => Color::Rgb(
            r.saturating_add(amount),
            g.saturating_add(amount),
            b.saturating_add(amount),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lighten_saturates() {
        assert_eq!(lighten(Color::Rgb(0, 250, 20), 10), Color::Rgb(10, 255, 30));
        assert_eq!(lighten(Color::Blue, 10), Color::Blue);
    }

    #[test]
    fn test_theme_roundtrips_through_config_toml() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            theme: Theme,
        }
        let theme = Theme::default().next();
        let text = toml::to_string(&Wrapper { theme }).unwrap();
        let back: Wrapper = toml::from_str(&text).unwrap();
        assert_eq!(back.theme, theme);
        assert_eq!(back.theme.to_string(), theme.name());
    }

    #[test]
    fn test_rich_text_roles_differ() {
        for name in Theme::all() {
            let colors = Theme(*name).colors();
            assert_ne!(colors.mention(), colors.link(), "{}", Theme(*name));
            assert_ne!(colors.link(), colors.hashtag(), "{}", Theme(*name));
            assert_eq!(colors.badge().fg, Some(BADGE_BLUE));
        }
    }
}
