//! Reader theme settings and the declarative style sheet derived from them.
//!
//! The core only produces a [`StyleSheet`]; applying it to rendered content is the engine's job.

use serde::{Deserialize, Serialize};

/// Background/foreground colour pair offered in the theme picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorScheme {
    pub bg: &'static str,
    pub fg: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FontChoice {
    pub name: &'static str,
    pub family: &'static str,
}

pub const COLOR_SCHEMES: &[ColorScheme] = &[
    ColorScheme { bg: "#fff", fg: "#000" },
    ColorScheme { bg: "#000", fg: "#fff" },
    ColorScheme { bg: "#333", fg: "#eee" },
    ColorScheme { bg: "#f5deb3", fg: "#000" },
    ColorScheme { bg: "#111", fg: "#f5deb3" },
    ColorScheme { bg: "#111b21", fg: "#e8e8e8" },
];

pub const FONT_SIZES: &[u32] = &[8, 9, 10, 11, 12, 14, 16, 18];
pub const LINE_SPACINGS: &[f32] = &[1.0, 1.2, 1.4, 1.6, 1.8, 2.0, 2.3, 2.6, 3.0];
pub const MARGINS: &[u32] = &[0, 1, 2, 3, 4, 5, 7, 9, 12, 15];

pub const FONTS: &[FontChoice] = &[
    FontChoice { name: "Arial", family: "'Arial', Arimo, Liberation Sans, sans-serif" },
    FontChoice { name: "Lato", family: "'Lato', sans-serif" },
    FontChoice { name: "Georgia", family: "'Georgia', Liberation Serif, serif" },
    FontChoice {
        name: "Times New Roman",
        family: "'Times New Roman', Tinos, Liberation Serif, Times, serif",
    },
    FontChoice { name: "Spectral", family: "'Spectral', sans-serif" },
    FontChoice { name: "Libre Baskerville", family: "'Libre Baskerville', sans-serif" },
    FontChoice { name: "Merriweather", family: "'Merriweather', serif" },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    Right,
    Center,
    Justify,
}

impl TextAlign {
    fn as_css(self) -> &'static str {
        match self {
            TextAlign::Left => "left",
            TextAlign::Right => "right",
            TextAlign::Center => "center",
            TextAlign::Justify => "justify",
        }
    }
}

/// Flat theme configuration, persisted wholesale per book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Theme {
    pub background: String,
    pub foreground: String,
    pub link: String,
    /// CSS font-family list; empty leaves the book's own font.
    pub font_family: String,
    /// Points; `None` leaves the book's own size.
    pub font_size: Option<u32>,
    pub line_height: f32,
    pub text_align: TextAlign,
    /// Vertical page padding in pixels.
    pub margin: u32,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            background: "#fff".to_string(),
            foreground: "#000".to_string(),
            link: "#1e83d2".to_string(),
            font_family: "'Merriweather', 'Times New Roman', Tinos, Liberation Serif, Times, serif"
                .to_string(),
            font_size: Some(11),
            line_height: 1.6,
            text_align: TextAlign::Justify,
            margin: 5,
        }
    }
}

/// One kind of theme change requested from the settings panel.
#[derive(Debug, Clone, PartialEq)]
pub enum ThemeChange {
    Colors(ColorScheme),
    FontSize(u32),
    LineHeight(f32),
    Margin(u32),
    FontFamily(String),
    TextAlign(TextAlign),
}

impl Theme {
    pub fn apply(&mut self, change: ThemeChange) {
        match change {
            ThemeChange::Colors(scheme) => {
                self.background = scheme.bg.to_string();
                self.foreground = scheme.fg.to_string();
            }
            ThemeChange::FontSize(size) => self.font_size = Some(size),
            ThemeChange::LineHeight(height) => self.line_height = height,
            ThemeChange::Margin(margin) => self.margin = margin,
            ThemeChange::FontFamily(family) => self.font_family = family,
            ThemeChange::TextAlign(align) => self.text_align = align,
        }
    }

    /// Whether switching from `self` to `other` reflows content and invalidates positions.
    pub fn affects_layout(&self, other: &Theme) -> bool {
        self.font_family != other.font_family
            || self.font_size != other.font_size
            || self.line_height != other.line_height
            || self.margin != other.margin
            || self.text_align != other.text_align
    }

    /// Build the rules injected into rendered content.
    pub fn style_sheet(&self) -> StyleSheet {
        let mut sheet = StyleSheet::default();

        let body = sheet.rule("body");
        body.set("background", &self.background);
        body.set("color", &self.foreground);
        if !self.font_family.is_empty() {
            body.important("font-family", &self.font_family);
        }
        if let Some(size) = self.font_size {
            body.important("font-size", &format!("{size}pt"));
        }
        body.important("line-height", &self.line_height.to_string());
        body.important("text-align", self.text_align.as_css());
        body.set("padding-top", &format!("{}px", self.margin));
        body.set("padding-bottom", &format!("{}px", self.margin));

        let paragraph = sheet.rule("p");
        if !self.font_family.is_empty() {
            paragraph.important("font-family", &self.font_family);
        }
        if let Some(size) = self.font_size {
            paragraph.important("font-size", &format!("{size}pt"));
        }

        let anchor = sheet.rule("a");
        anchor.important("color", "inherit");
        anchor.important("text-decoration", "none");
        anchor.important("-webkit-text-fill-color", "inherit");

        let link = sheet.rule("a:link");
        link.important("color", &self.link);
        link.important("text-decoration", "none");
        link.important("-webkit-text-fill-color", &self.link);

        sheet.rule("a:link:hover").important("background", "rgba(0, 0, 0, 0.1)");
        sheet.rule("img").important("max-width", "100%");
        sheet.rule("::selection").set("background", "rgba(255,255,0, 0.3)");

        let highlight = sheet.rule(".epubjs-hl");
        highlight.set("fill", "yellow");
        highlight.set("fill-opacity", "0.3");
        highlight.set("mix-blend-mode", "multiply");

        sheet
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Declaration {
    pub property: String,
    pub value: String,
    pub important: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StyleRule {
    pub selector: String,
    pub declarations: Vec<Declaration>,
}

impl StyleRule {
    pub fn set(&mut self, property: &str, value: &str) -> &mut Self {
        self.push(property, value, false)
    }

    pub fn important(&mut self, property: &str, value: &str) -> &mut Self {
        self.push(property, value, true)
    }

    pub fn get(&self, property: &str) -> Option<&Declaration> {
        self.declarations.iter().find(|decl| decl.property == property)
    }

    fn push(&mut self, property: &str, value: &str, important: bool) -> &mut Self {
        self.declarations.push(Declaration {
            property: property.to_string(),
            value: value.to_string(),
            important,
        });
        self
    }
}

/// Ordered selector → declarations list handed to [`RenderingEngine::apply_styles`].
///
/// [`RenderingEngine::apply_styles`]: crate::engine::RenderingEngine::apply_styles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StyleSheet {
    pub rules: Vec<StyleRule>,
}

impl StyleSheet {
    fn rule(&mut self, selector: &str) -> &mut StyleRule {
        self.rules.push(StyleRule { selector: selector.to_string(), declarations: Vec::new() });
        let last = self.rules.len() - 1;
        &mut self.rules[last]
    }

    pub fn find(&self, selector: &str) -> Option<&StyleRule> {
        self.rules.iter().find(|rule| rule.selector == selector)
    }

    /// Render as CSS text, for engines that take a raw stylesheet.
    pub fn to_css(&self) -> String {
        let mut css = String::new();
        for rule in &self.rules {
            css.push_str(&rule.selector);
            css.push_str(" {");
            for decl in &rule.declarations {
                css.push(' ');
                css.push_str(&decl.property);
                css.push_str(": ");
                css.push_str(&decl.value);
                if decl.important {
                    css.push_str(" !important");
                }
                css.push(';');
            }
            css.push_str(" }\n");
        }
        css
    }
}
