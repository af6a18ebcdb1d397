//! Viewer shell template rendering.
//!
//! The viewer is an opaque HTML page that embeds the vendor SDK. It only needs a
//! token, an avatar id, a voice id and a few lines of text, substituted into
//! fixed placeholders. Placeholders are expected inside quoted JavaScript
//! strings, so substituted values are escaped for that context.

use std::{fmt::Write, io, path::Path};

pub const TOKEN: &str = "__TOKEN__";
pub const AVATAR_ID: &str = "__AVATAR_ID__";
pub const VOICE_ID: &str = "__VOICE_ID__";
pub const LINES: [&str; 3] = ["__LINE1__", "__LINE2__", "__LINE3__"];

pub const DEFAULT_LINES: [&str; 3] = [
    "Hello, how are you.",
    "Welcome to our restaurant.",
    "It is our pleasure serving you.",
];

#[derive(Debug, Clone)]
pub struct ViewerTemplate {
    html: String,
}

impl ViewerTemplate {
    pub fn new(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        std::fs::read_to_string(path).map(Self::new)
    }

    /// Required placeholders the template does not contain.
    pub fn missing_placeholders(&self) -> Vec<&'static str> {
        [TOKEN, AVATAR_ID, VOICE_ID]
            .into_iter()
            .filter(|p| !self.html.contains(p))
            .collect()
    }

    /// Substitutes the values in one left-to-right pass, so a value that itself
    /// contains a placeholder is written out verbatim. Lines beyond the third
    /// are ignored; missing ones become empty strings.
    pub fn render(&self, token: &str, avatar_id: &str, voice_id: &str, lines: &[&str]) -> String {
        let line = |i: usize| lines.get(i).copied().unwrap_or("");
        let substitutions = [
            (TOKEN, token),
            (AVATAR_ID, avatar_id),
            (VOICE_ID, voice_id),
            (LINES[0], line(0)),
            (LINES[1], line(1)),
            (LINES[2], line(2)),
        ];

        let mut html = String::with_capacity(self.html.len());
        let mut rest = self.html.as_str();
        while let Some(start) = rest.find("__") {
            html.push_str(&rest[..start]);
            let tail = &rest[start..];
            match substitutions.iter().find(|(p, _)| tail.starts_with(*p)) {
                Some((placeholder, value)) => {
                    html.push_str(&escape_js(value));
                    rest = &tail[placeholder.len()..];
                }
                None => {
                    // Step one underscore so `___TOKEN__` still matches.
                    html.push('_');
                    rest = &tail[1..];
                }
            }
        }
        html.push_str(rest);
        html
    }
}

fn escape_js(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' | '\'' | '\\' | '<' | '>' | '&' | '`' => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}
