//! Lenient parser for text that no repair pass could make valid JSON.
//!
//! Parsing produces raw key/value occurrences in document order; folding
//! them left to right makes the last duplicate of a key win.

use serde_json::{Map, Number, Value};

const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Raw {
    Object(Vec<(String, Raw)>),
    Array(Vec<Raw>),
    Scalar(Value),
}

/// Parse the first object in `text`. `None` when there is no object or it
/// yields no key/value occurrence at all.
pub(crate) fn parse(text: &str) -> Option<Value> {
    let mut parser = Parser {
        chars: text.chars().collect(),
        pos: 0,
    };
    let start = parser.chars.iter().position(|c| *c == '{')?;
    parser.pos = start;
    let raw = parser.object(0);
    let non_empty = matches!(&raw, Raw::Object(entries) if !entries.is_empty());
    non_empty.then(|| fold(raw))
}

pub(crate) fn fold(raw: Raw) -> Value {
    match raw {
        Raw::Object(entries) => {
            let mut map = Map::new();
            for (key, value) in entries {
                map.insert(key, fold(value));
            }
            Value::Object(map)
        }
        Raw::Array(items) => Value::Array(items.into_iter().map(fold).collect()),
        Raw::Scalar(value) => value,
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    /// Skip whitespace and `//`, `#` and `/* */` comments
    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += 1;
            } else if c == '#' || (c == '/' && self.peek_at(1) == Some('/')) {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.pos += 1;
                }
            } else if c == '/' && self.peek_at(1) == Some('*') {
                self.pos += 2;
                while self.peek().is_some()
                    && !(self.peek() == Some('*') && self.peek_at(1) == Some('/'))
                {
                    self.pos += 1;
                }
                self.pos = (self.pos + 2).min(self.chars.len());
            } else {
                break;
            }
        }
    }

    fn value(&mut self, depth: usize) -> Raw {
        self.skip_trivia();
        match self.peek() {
            Some('{') => self.object(depth + 1),
            Some('[') => self.array(depth + 1),
            Some(q @ ('"' | '\'')) => Raw::Scalar(Value::String(self.string(q))),
            None | Some('}' | ']' | ',' | ';') => Raw::Scalar(Value::Null),
            Some(_) => self.bare(),
        }
    }

    fn object(&mut self, depth: usize) -> Raw {
        self.pos += 1;
        let mut entries: Vec<(String, Raw)> = Vec::new();
        if depth > MAX_DEPTH {
            self.skip_container('{', '}');
            return Raw::Object(entries);
        }

        loop {
            self.skip_trivia();
            match self.peek() {
                None => break,
                Some('}') => {
                    self.pos += 1;
                    break;
                }
                Some(',' | ';' | ':' | '=' | ']') => self.pos += 1,
                Some('{') => {
                    // A stray object where a key belongs repeats the previous key.
                    let value = self.object(depth + 1);
                    match entries.last().map(|(key, _)| key.clone()) {
                        Some(key) => entries.push((key, value)),
                        None => {
                            if let Raw::Object(inner) = value {
                                entries.extend(inner);
                            }
                        }
                    }
                }
                Some('[') => {
                    let _ = self.array(depth + 1);
                }
                Some(c) => {
                    let key = if c == '"' || c == '\'' {
                        self.string(c)
                    } else {
                        match self.key_word() {
                            Some(key) => key,
                            None => continue,
                        }
                    };
                    self.skip_trivia();
                    let value = match self.peek() {
                        Some(':' | '=') => {
                            self.pos += 1;
                            self.value(depth)
                        }
                        None | Some(',' | '}' | ';') => Raw::Scalar(Value::Null),
                        Some(_) => self.value(depth),
                    };
                    entries.push((key, value));
                }
            }
        }
        Raw::Object(entries)
    }

    fn array(&mut self, depth: usize) -> Raw {
        self.pos += 1;
        let mut items = Vec::new();
        if depth > MAX_DEPTH {
            self.skip_container('[', ']');
            return Raw::Array(items);
        }

        loop {
            self.skip_trivia();
            match self.peek() {
                None => break,
                Some(']') => {
                    self.pos += 1;
                    break;
                }
                // A mismatched brace closes the array and is left for the parent.
                Some('}') => break,
                Some(',' | ';' | ':') => self.pos += 1,
                Some(_) => {
                    let before = self.pos;
                    items.push(self.value(depth));
                    if self.pos == before {
                        self.pos += 1;
                    }
                }
            }
        }
        Raw::Array(items)
    }

    fn skip_container(&mut self, open: char, close: char) {
        let mut depth = 1usize;
        while let Some(c) = self.peek() {
            self.pos += 1;
            if c == '"' || c == '\'' {
                self.pos -= 1;
                let _ = self.string(c);
            } else if c == open {
                depth += 1;
            } else if c == close {
                depth -= 1;
                if depth == 0 {
                    return;
                }
            }
        }
    }

    fn string(&mut self, quote: char) -> String {
        self.pos += 1;
        let mut out = String::new();
        while let Some(c) = self.peek() {
            self.pos += 1;
            if c == quote {
                return out;
            }
            if c != '\\' {
                out.push(c);
                continue;
            }
            let Some(escaped) = self.peek() else {
                break;
            };
            self.pos += 1;
            match escaped {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                'b' => out.push('\u{8}'),
                'f' => out.push('\u{c}'),
                'u' => out.push(self.unicode_escape()),
                other => out.push(other),
            }
        }
        out
    }

    fn unicode_escape(&mut self) -> char {
        let hex: String = self.chars[self.pos..].iter().take(4).collect();
        match u32::from_str_radix(&hex, 16) {
            Ok(code) if hex.len() == 4 => {
                self.pos += 4;
                char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER)
            }
            _ => char::REPLACEMENT_CHARACTER,
        }
    }

    /// Unquoted key; `None` (after consuming one char) on junk
    fn key_word(&mut self) -> Option<String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '$') {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.pos == start {
            self.pos += 1;
            return None;
        }
        Some(self.chars[start..self.pos].iter().collect())
    }

    fn at_value_end(&self) -> bool {
        match self.peek() {
            None => true,
            Some(c) => {
                matches!(c, ',' | '}' | ']' | '\n' | '\r' | '"' | ';' | '#')
                    || (c == '/' && self.peek_at(1) == Some('/'))
            }
        }
    }

    fn token(&mut self) {
        while !self.at_value_end() && self.peek().is_some_and(|c| !c.is_whitespace()) {
            self.pos += 1;
        }
    }

    /// Numbers, literals and unquoted words up to the next delimiter.
    ///
    /// A number or literal ends at whitespace; a word keeps absorbing words
    /// on the same line until one of them looks like the next key.
    fn bare(&mut self) -> Raw {
        let start = self.pos;
        self.token();
        if self.pos == start {
            self.pos += 1;
            return Raw::Scalar(Value::Null);
        }

        let first: String = self.chars[start..self.pos].iter().collect();
        let value = classify(&first);
        if !value.is_string() {
            return Raw::Scalar(value);
        }

        let mut end = self.pos;
        loop {
            while matches!(self.peek(), Some(' ' | '\t')) {
                self.pos += 1;
            }
            if self.at_value_end() {
                break;
            }
            let word_start = self.pos;
            self.token();
            if self.pos == word_start {
                break;
            }
            let word: String = self.chars[word_start..self.pos].iter().collect();
            let mut look = self.pos;
            while matches!(self.chars.get(look), Some(' ' | '\t')) {
                look += 1;
            }
            if word.ends_with(':') || self.chars.get(look) == Some(&':') {
                break;
            }
            end = self.pos;
        }
        self.pos = end;

        let phrase: String = self.chars[start..end].iter().collect();
        Raw::Scalar(classify(phrase.trim()))
    }
}

fn classify(word: &str) -> Value {
    match word {
        "" | "null" | "None" | "NULL" | "nil" => return Value::Null,
        "true" | "True" | "TRUE" => return Value::Bool(true),
        "false" | "False" | "FALSE" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(int) = word.parse::<i64>() {
        return Value::Number(int.into());
    }
    if let Some(number) = word.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(number);
    }
    Value::String(word.to_string())
}
