//! Reply rendering
//!
//! Replies go back to the chat either as plain text or, in picture mode, as
//! an HTML card (title, model subtitle, logo and the reply rendered from
//! Markdown). Turning the card into an image is left to the platform.

use crate::error::{ChatllmError, Result};
use pulldown_cmark::{html, Event, Options, Parser};
use regex::Regex;
use std::sync::OnceLock;

fn cjk_then_alnum() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([\p{Han}\p{Hiragana}\p{Katakana}\p{Hangul}])([A-Za-z0-9])")
            .expect("spacing pattern is valid")
    })
}

fn alnum_then_cjk() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([A-Za-z0-9])([\p{Han}\p{Hiragana}\p{Katakana}\p{Hangul}])")
            .expect("spacing pattern is valid")
    })
}

fn css_color() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^#?[A-Za-z0-9]{1,32}$").expect("color pattern is valid"))
}

/// Inserts a space wherever CJK text touches ASCII letters or digits
///
/// # Examples
///
/// ```
/// use chatllm::render::spacing;
///
/// assert_eq!(spacing("使用Rust编写"), "使用 Rust 编写");
/// assert_eq!(spacing("plain text"), "plain text");
/// ```
pub fn spacing(text: &str) -> String {
    let first = cjk_then_alnum().replace_all(text, "$1 $2");
    alnum_then_cjk().replace_all(&first, "$1 $2").into_owned()
}

/// Everything a renderer needs to present one reply
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyCard {
    /// Backend display name, e.g. "ChatGPT"
    pub title: String,
    /// Model name shown next to the title
    pub subtitle: Option<String>,
    /// Logo image URL
    pub logo: Option<String>,
    /// Accent color
    pub logo_color: String,
    /// Reply text
    pub body: String,
}

/// Turns a reply into something the chat platform can display
pub trait Renderer: Send + Sync {
    /// Renders `card`
    ///
    /// # Errors
    ///
    /// Returns `ChatllmError::Render` if the card cannot be rendered
    fn render(&self, card: &ReplyCard) -> Result<String>;
}

/// Text mode: the reply itself
#[derive(Debug, Clone, Copy, Default)]
pub struct TextRenderer;

impl Renderer for TextRenderer {
    fn render(&self, card: &ReplyCard) -> Result<String> {
        Ok(card.body.clone())
    }
}

/// Picture mode: a self-contained HTML card
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlCardRenderer;

impl HtmlCardRenderer {
    /// Renders Markdown to HTML, showing raw HTML in the source as text
    pub fn markdown_to_html(markdown: &str) -> String {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);

        let parser = Parser::new_ext(markdown, options).map(|event| match event {
            Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
            other => other,
        });

        let mut output = String::new();
        html::push_html(&mut output, parser);
        output
    }
}

impl Renderer for HtmlCardRenderer {
    fn render(&self, card: &ReplyCard) -> Result<String> {
        if !css_color().is_match(&card.logo_color) {
            return Err(ChatllmError::Render(format!(
                "invalid logo color: {}",
                card.logo_color
            ))
            .into());
        }

        let title = html_escape::encode_text(&card.title);
        let subtitle = card
            .subtitle
            .as_deref()
            .map(|sub| format!(" (<small>{}</small>)", html_escape::encode_text(sub)))
            .unwrap_or_default();
        let logo = card
            .logo
            .as_deref()
            .map(|src| {
                format!(
                    r#"<img class="card-logo" src="{}" alt="">"#,
                    html_escape::encode_double_quoted_attribute(src)
                )
            })
            .unwrap_or_default();
        let body = Self::markdown_to_html(&card.body);

        Ok(format!(
            r#"<html>
  <style>
    html, body {{ width: 500px; height: auto; background-color: white; }}
    pre, code {{ max-width: 450px; word-wrap: break-word; word-break: break-all; white-space: pre-wrap; }}
    .card-stamp {{ background-color: {color}; }}
    .card-logo {{ width: 60px; height: 60px; }}
  </style>
  <div class="card" id="message">
    <div class="card-stamp">{logo}</div>
    <div class="card-body">
      <h3 class="card-title">{title}{subtitle}</h3>
      <div class="text-secondary">{body}</div>
    </div>
  </div>
</html>
"#,
            color = card.logo_color,
            logo = logo,
            title = title,
            subtitle = subtitle,
            body = body,
        ))
    }
}
