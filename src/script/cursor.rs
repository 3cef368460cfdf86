use crate::{Error, Result};

pub(crate) struct Cursor<'a> {
    bytes: &'a [u8],
    pub pos: usize,
    source: &'a str,
}

impl<'a> Cursor<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            bytes: source.as_bytes(),
            pos: 0,
            source,
        }
    }

    pub fn at_end(&mut self) -> bool {
        self.skip_trivia();
        self.pos >= self.bytes.len()
    }

    pub fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    pub fn remaining_str(&self) -> &'a str {
        &self.source[self.pos..]
    }

    pub fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    // Whitespace plus // and /* */ comments.
    pub fn skip_trivia(&mut self) {
        loop {
            while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
                self.pos += 1;
            }
            if self.starts_with(b"//") {
                while self.peek().is_some_and(|b| b != b'\n') {
                    self.pos += 1;
                }
            } else if self.starts_with(b"/*") {
                self.pos += 2;
                while self.pos < self.bytes.len() && !self.starts_with(b"*/") {
                    self.pos += 1;
                }
                self.pos = (self.pos + 2).min(self.bytes.len());
            } else {
                return;
            }
        }
    }

    pub fn starts_with(&self, s: &[u8]) -> bool {
        self.bytes[self.pos..].starts_with(s)
    }

    pub fn eat(&mut self, b: u8) -> bool {
        self.skip_trivia();
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub fn eat_str(&mut self, s: &[u8]) -> bool {
        self.skip_trivia();
        if self.starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    pub fn expect(&mut self, b: u8) -> Result<()> {
        if self.eat(b) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", b as char)))
        }
    }

    pub fn peek_after_trivia(&mut self) -> Option<u8> {
        self.skip_trivia();
        self.peek()
    }

    // Matches `word` only when not followed by an identifier byte.
    pub fn eat_keyword(&mut self, word: &str) -> bool {
        self.skip_trivia();
        let bytes = word.as_bytes();
        if !self.starts_with(bytes) {
            return false;
        }
        if self
            .peek_at(bytes.len())
            .is_some_and(is_ident_byte)
        {
            return false;
        }
        self.pos += bytes.len();
        true
    }

    pub fn peek_keyword(&mut self, word: &str) -> bool {
        let saved = self.pos;
        let found = self.eat_keyword(word);
        self.pos = saved;
        found
    }

    pub fn parse_identifier(&mut self) -> Result<String> {
        self.skip_trivia();
        let start = self.pos;
        if !self.peek().is_some_and(is_ident_start) {
            return Err(self.error("expected an identifier"));
        }
        while self.peek().is_some_and(is_ident_byte) {
            self.pos += 1;
        }
        Ok(self.source[start..self.pos].to_string())
    }

    pub fn parse_string_literal(&mut self) -> Result<String> {
        self.skip_trivia();
        let quote = match self.peek() {
            Some(b @ (b'"' | b'\'')) => b,
            _ => return Err(self.error("expected a string literal")),
        };
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();
        loop {
            let Some(b) = self.bump() else {
                return Err(self.error_at(start, "unterminated string literal"));
            };
            match b {
                b if b == quote => return Ok(out),
                b'\\' => {
                    let Some(escape) = self.bump() else {
                        return Err(self.error_at(start, "unterminated string literal"));
                    };
                    match escape {
                        b'n' => out.push('\n'),
                        b't' => out.push('\t'),
                        b'r' => out.push('\r'),
                        b'b' => out.push('\u{8}'),
                        b'f' => out.push('\u{C}'),
                        b'v' => out.push('\u{B}'),
                        b'0' => out.push('\0'),
                        b'u' => out.push(self.parse_unicode_escape(start)?),
                        b'x' => {
                            let code = self.parse_hex_digits(2, start)?;
                            match char::from_u32(code) {
                                Some(ch) => out.push(ch),
                                None => return Err(self.error_at(start, "bad escape")),
                            }
                        }
                        other => out.push(other as char),
                    }
                }
                _ => {
                    // Back up and take the full UTF-8 scalar.
                    self.pos -= 1;
                    let Some(ch) = self.source[self.pos..].chars().next() else {
                        return Err(self.error_at(start, "invalid UTF-8 in string"));
                    };
                    out.push(ch);
                    self.pos += ch.len_utf8();
                }
            }
        }
    }

    fn parse_unicode_escape(&mut self, start: usize) -> Result<char> {
        if self.peek() == Some(b'{') {
            self.pos += 1;
            let mut code = 0u32;
            let mut digits = 0;
            while let Some(b) = self.peek() {
                if b == b'}' {
                    self.pos += 1;
                    if digits == 0 {
                        return Err(self.error_at(start, "empty unicode escape"));
                    }
                    return char::from_u32(code)
                        .ok_or_else(|| self.error_at(start, "bad unicode escape"));
                }
                let digit = (b as char)
                    .to_digit(16)
                    .ok_or_else(|| self.error_at(start, "bad unicode escape"))?;
                code = code.saturating_mul(16).saturating_add(digit);
                digits += 1;
                self.pos += 1;
            }
            return Err(self.error_at(start, "unterminated unicode escape"));
        }
        let code = self.parse_hex_digits(4, start)?;
        // Surrogate pairs combine into one scalar.
        if (0xD800..0xDC00).contains(&code) && self.starts_with(b"\\u") {
            let saved = self.pos;
            self.pos += 2;
            if let Ok(low) = self.parse_hex_digits(4, start) {
                if (0xDC00..0xE000).contains(&low) {
                    let combined = 0x10000 + ((code - 0xD800) << 10) + (low - 0xDC00);
                    if let Some(ch) = char::from_u32(combined) {
                        return Ok(ch);
                    }
                }
            }
            self.pos = saved;
        }
        char::from_u32(code).ok_or_else(|| self.error_at(start, "bad unicode escape"))
    }

    fn parse_hex_digits(&mut self, count: usize, start: usize) -> Result<u32> {
        let mut code = 0u32;
        for _ in 0..count {
            let digit = self
                .bump()
                .and_then(|b| (b as char).to_digit(16))
                .ok_or_else(|| self.error_at(start, "bad hex escape"))?;
            code = code * 16 + digit;
        }
        Ok(code)
    }

    pub fn parse_number(&mut self) -> Result<f64> {
        self.skip_trivia();
        let start = self.pos;
        if self.starts_with(b"0x") || self.starts_with(b"0X") {
            self.pos += 2;
            let digits_start = self.pos;
            while self.peek().is_some_and(|b| b.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            if self.pos == digits_start {
                return Err(self.error_at(start, "malformed hex literal"));
            }
            let value = u64::from_str_radix(&self.source[digits_start..self.pos], 16)
                .map_err(|_| self.error_at(start, "malformed hex literal"))?;
            return Ok(value as f64);
        }
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
            while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let mark = self.pos;
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            if self.peek().is_some_and(|b| b.is_ascii_digit()) {
                while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                    self.pos += 1;
                }
            } else {
                self.pos = mark;
            }
        }
        if self.pos == start {
            return Err(self.error("expected a number"));
        }
        self.source[start..self.pos]
            .parse::<f64>()
            .map_err(|_| self.error_at(start, "malformed number literal"))
    }

    pub fn error(&self, message: &str) -> Error {
        self.error_at(self.pos, message)
    }

    pub fn error_at(&self, pos: usize, message: &str) -> Error {
        let mut line = 1usize;
        let mut col = 1usize;
        for &b in &self.bytes[..pos.min(self.bytes.len())] {
            if b == b'\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        Error::ScriptParse(format!("{message} at {line}:{col}"))
    }
}

pub(crate) fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$' || b >= 0x80
}

pub(crate) fn is_ident_byte(b: u8) -> bool {
    is_ident_start(b) || b.is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_both_comment_styles() {
        let mut cur = Cursor::new("  // line\n  /* block\n span */ token");
        cur.skip_trivia();
        assert_eq!(cur.peek(), Some(b't'));
    }

    #[test]
    fn keywords_need_a_boundary() {
        let mut cur = Cursor::new("variable");
        assert!(!cur.eat_keyword("var"));
        let mut cur = Cursor::new("var x");
        assert!(cur.eat_keyword("var"));
    }

    #[test]
    fn string_escapes() {
        let mut cur = Cursor::new(r#"'a\tbA\x41\u{1F600}'"#);
        assert_eq!(cur.parse_string_literal().unwrap(), "a\tbAA\u{1F600}");

        let mut cur = Cursor::new(r#""surrogates: 😀""#);
        assert_eq!(cur.parse_string_literal().unwrap(), "surrogates: \u{1F600}");
    }

    #[test]
    fn number_forms() {
        for (src, expected) in [
            ("42", 42.0),
            ("3.5", 3.5),
            ("0x1F", 31.0),
            ("1e3", 1000.0),
            ("2.5e-1", 0.25),
        ] {
            let mut cur = Cursor::new(src);
            assert_eq!(cur.parse_number().unwrap(), expected, "{src}");
        }
    }

    #[test]
    fn errors_carry_positions() {
        let mut cur = Cursor::new("a\nbc'unterminated");
        cur.pos = 4;
        let err = cur.parse_string_literal().unwrap_err();
        assert!(err.to_string().contains("2:"), "{err}");
    }
}
