//! Purpose: Print API response bodies for humans and pipes.
//! Exports: `render_json`, `Style`.
//! Role: Used by request-backed plugin commands and `version` on a terminal.
//! Invariants: `Style::Plain` output equals `serde_json::to_string_pretty`.
use std::fmt::Write as _;

use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Style {
    Plain,
    Ansi,
}

impl Style {
    pub fn for_terminal(is_tty: bool) -> Self {
        if is_tty { Style::Ansi } else { Style::Plain }
    }
}

#[derive(Clone, Copy)]
enum Token {
    Key,
    Str,
    Num,
    Bool,
    Null,
}

impl Token {
    fn sgr(self) -> &'static str {
        match self {
            Token::Key => "34",
            Token::Str => "32",
            Token::Num => "33",
            Token::Bool => "35",
            Token::Null => "90",
        }
    }
}

pub fn render_json(value: &Value, style: Style) -> String {
    let mut painter = Painter {
        style,
        out: String::new(),
    };
    painter.value(value, 0);
    painter.out
}

struct Painter {
    style: Style,
    out: String,
}

impl Painter {
    fn value(&mut self, value: &Value, depth: usize) {
        match value {
            Value::Null => self.token(Token::Null, "null"),
            Value::Bool(flag) => self.token(Token::Bool, if *flag { "true" } else { "false" }),
            Value::Number(num) => self.token(Token::Num, &num.to_string()),
            Value::String(text) => self.token(Token::Str, &quote(text)),
            Value::Array(items) if items.is_empty() => self.out.push_str("[]"),
            Value::Object(map) if map.is_empty() => self.out.push_str("{}"),
            Value::Array(items) => {
                self.out.push('[');
                for (idx, item) in items.iter().enumerate() {
                    self.separator(idx, depth + 1);
                    self.value(item, depth + 1);
                }
                self.close(']', depth);
            }
            Value::Object(map) => self.object(map, depth),
        }
    }

    fn object(&mut self, map: &Map<String, Value>, depth: usize) {
        self.out.push('{');
        for (idx, (key, value)) in map.iter().enumerate() {
            self.separator(idx, depth + 1);
            self.token(Token::Key, &quote(key));
            self.out.push_str(": ");
            self.value(value, depth + 1);
        }
        self.close('}', depth);
    }

    fn separator(&mut self, idx: usize, depth: usize) {
        if idx > 0 {
            self.out.push(',');
        }
        self.out.push('\n');
        self.indent(depth);
    }

    fn close(&mut self, bracket: char, depth: usize) {
        self.out.push('\n');
        self.indent(depth);
        self.out.push(bracket);
    }

    fn indent(&mut self, depth: usize) {
        self.out.extend(std::iter::repeat_n("  ", depth));
    }

    fn token(&mut self, token: Token, text: &str) {
        match self.style {
            Style::Plain => self.out.push_str(text),
            Style::Ansi => {
                let _ = write!(self.out, "\u{1b}[{}m{text}\u{1b}[0m", token.sgr());
            }
        }
    }
}

fn quote(text: &str) -> String {
    Value::String(text.to_string()).to_string()
}
