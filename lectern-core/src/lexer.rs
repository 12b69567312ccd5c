use once_cell::sync::Lazy;
use regex::Regex;

use crate::numeric::Number;

static DECIMAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").expect("decimal pattern is valid")
});

static HEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#[xX][+-]?[0-9a-fA-F]+$").expect("hex pattern is valid"));

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// `(`, `[` or `{`
    Open,
    /// `)`, `]` or `}`
    Close,
    /// `#(`
    VectorOpen,
    Quote,
    Quasiquote,
    Unquote,
    UnquoteSplicing,
    Dot,
    Str(String),
    Char(char),
    Number(Number),
    Bool(bool),
    Atom(String),
}

// ============================================================================
// Lexer
// ============================================================================

pub struct Lexer {
    input: Vec<char>,
    position: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            position: 0,
        }
    }

    fn current_char(&self) -> char {
        self.peek_ahead(0)
    }

    fn peek_ahead(&self, n: usize) -> char {
        self.input.get(self.position + n).copied().unwrap_or('\0')
    }

    fn advance(&mut self) {
        if self.position < self.input.len() {
            self.position += 1;
        }
    }

    fn is_eof(&self) -> bool {
        self.position >= self.input.len()
    }

    fn is_delimiter(c: char) -> bool {
        c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']' | '{' | '}' | '"' | ';' | '\'' | '`' | ',') || c == '\0'
    }

    fn skip_whitespace(&mut self) {
        loop {
            while !self.is_eof() && self.current_char().is_whitespace() {
                self.advance();
            }
            match (self.current_char(), self.peek_ahead(1)) {
                (';', _) => {
                    while !self.is_eof() && self.current_char() != '\n' {
                        self.advance();
                    }
                }
                ('#', '|') => self.skip_block_comment(),
                _ => break,
            }
        }
    }

    fn skip_block_comment(&mut self) {
        self.position += 2;
        let mut depth = 1;
        while !self.is_eof() && depth > 0 {
            match (self.current_char(), self.peek_ahead(1)) {
                ('|', '#') => {
                    depth -= 1;
                    self.position += 2;
                }
                ('#', '|') => {
                    depth += 1;
                    self.position += 2;
                }
                _ => self.advance(),
            }
        }
    }

    fn read_atom_text(&mut self) -> String {
        let mut text = String::new();
        while !Self::is_delimiter(self.current_char()) {
            text.push(self.current_char());
            self.advance();
        }
        text
    }

    /// Read a string body after the opening quote. `None` when unterminated.
    fn read_string(&mut self) -> Option<String> {
        self.advance();
        let mut content = String::new();
        loop {
            if self.is_eof() {
                return None;
            }
            match self.current_char() {
                '"' => {
                    self.advance();
                    return Some(content);
                }
                '\\' => {
                    self.advance();
                    let c = self.current_char();
                    self.advance();
                    content.push(match c {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        other => other,
                    });
                }
                c => {
                    content.push(c);
                    self.advance();
                }
            }
        }
    }

    /// Read what follows `#\`. `None` for an unknown character name.
    fn read_char(&mut self) -> Option<char> {
        self.position += 2;
        let first = self.current_char();
        self.advance();
        let mut name = String::from(first);
        while !Self::is_delimiter(self.current_char()) {
            name.push(self.current_char());
            self.advance();
        }
        if name.chars().count() == 1 {
            return Some(first);
        }
        match name.to_lowercase().as_str() {
            "space" => Some(' '),
            "newline" | "linefeed" | "nl" => Some('\n'),
            "tab" => Some('\t'),
            "return" => Some('\r'),
            "nul" | "null" => Some('\0'),
            "alarm" => Some('\u{7}'),
            "backspace" => Some('\u{8}'),
            "delete" | "rubout" => Some('\u{7f}'),
            "escape" | "altmode" => Some('\u{1b}'),
            hex if hex.starts_with('x') && hex.len() > 1 => u32::from_str_radix(&hex[1..], 16)
                .ok()
                .and_then(char::from_u32),
            _ => None,
        }
    }

    fn next_token(&mut self) -> Option<Token> {
        self.skip_whitespace();
        if self.is_eof() {
            return None;
        }
        let c = self.current_char();
        match c {
            '(' | '[' | '{' => {
                self.advance();
                Some(Token::Open)
            }
            ')' | ']' | '}' => {
                self.advance();
                Some(Token::Close)
            }
            '\'' => {
                self.advance();
                Some(Token::Quote)
            }
            '`' => {
                self.advance();
                Some(Token::Quasiquote)
            }
            ',' => {
                self.advance();
                if self.current_char() == '@' {
                    self.advance();
                    Some(Token::UnquoteSplicing)
                } else {
                    Some(Token::Unquote)
                }
            }
            '"' => self.read_string().map(Token::Str),
            '#' => match self.peek_ahead(1) {
                '(' => {
                    self.position += 2;
                    Some(Token::VectorOpen)
                }
                '\\' => self.read_char().map(Token::Char),
                _ => {
                    let text = self.read_atom_text();
                    match text.to_lowercase().as_str() {
                        "#t" | "#true" => Some(Token::Bool(true)),
                        "#f" | "#false" => Some(Token::Bool(false)),
                        _ => parse_number(&text).map(Token::Number).or(Some(Token::Atom(text))),
                    }
                }
            },
            _ => {
                let text = self.read_atom_text();
                if text == "." {
                    return Some(Token::Dot);
                }
                Some(parse_number(&text).map_or(Token::Atom(text), Token::Number))
            }
        }
    }
}

/// Decimal and `#x` hexadecimal numerals.
pub fn parse_number(text: &str) -> Option<Number> {
    if HEX.is_match(text) {
        let digits = &text[2..];
        let (negative, digits) = match digits.as_bytes().first() {
            Some(b'-') => (true, &digits[1..]),
            Some(b'+') => (false, &digits[1..]),
            _ => (false, digits),
        };
        let n = i64::from_str_radix(digits, 16).ok()?;
        return Some(Number::Int(if negative { -n } else { n }));
    }
    if !DECIMAL.is_match(text) {
        return None;
    }
    if !text.contains(['.', 'e', 'E']) {
        if let Ok(n) = text.parse::<i64>() {
            return Some(Number::Int(n));
        }
    }
    text.parse::<f64>().ok().map(Number::Float)
}

/// Split source text into tokens. Stops at the first malformed token.
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token() {
        tokens.push(token);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brackets_are_interchangeable() {
        let tokens = tokenize("[a {b} (c)]");
        assert_eq!(tokens.iter().filter(|t| **t == Token::Open).count(), 3);
        assert_eq!(tokens.iter().filter(|t| **t == Token::Close).count(), 3);
    }

    #[test]
    fn test_quote_shorthand() {
        assert_eq!(
            tokenize("'a `b ,c ,@d"),
            vec![
                Token::Quote,
                Token::Atom("a".into()),
                Token::Quasiquote,
                Token::Atom("b".into()),
                Token::Unquote,
                Token::Atom("c".into()),
                Token::UnquoteSplicing,
                Token::Atom("d".into()),
            ]
        );
    }

    #[test]
    fn test_comments_are_stripped() {
        assert_eq!(tokenize("1 ; one\n#| block #| nested |# |# 2").len(), 2);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(parse_number("42"), Some(Number::Int(42)));
        assert_eq!(parse_number("-7"), Some(Number::Int(-7)));
        assert_eq!(parse_number("#xff"), Some(Number::Int(255)));
        assert!(matches!(parse_number("2.5"), Some(Number::Float(f)) if f == 2.5));
        assert!(matches!(parse_number("1e3"), Some(Number::Float(f)) if f == 1000.0));
        assert_eq!(parse_number("+"), None);
        assert_eq!(parse_number("..."), None);
    }

    #[test]
    fn test_chars_and_booleans() {
        assert_eq!(
            tokenize(r"#\a #\space #\newline #t #f"),
            vec![
                Token::Char('a'),
                Token::Char(' '),
                Token::Char('\n'),
                Token::Bool(true),
                Token::Bool(false),
            ]
        );
    }

    #[test]
    fn test_char_literal_for_delimiter() {
        assert_eq!(tokenize(r"#\( #\)"), vec![Token::Char('('), Token::Char(')')]);
    }

    #[test]
    fn test_unterminated_string_stops_tokenizing() {
        assert_eq!(tokenize("1 \"abc"), vec![Token::Number(Number::Int(1))]);
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(tokenize(r#""a\nb\"c""#), vec![Token::Str("a\nb\"c".into())]);
    }
}
