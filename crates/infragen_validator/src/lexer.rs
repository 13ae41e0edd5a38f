//! Tokenizer for HCL native syntax.
//!
//! Only what the structural checks need survives tokenization: identifiers,
//! literals, whether a string or heredoc carries template interpolation, and
//! punctuation. Comments are dropped; newlines are kept because they
//! terminate attributes.

use crate::error::ParseError;

/// A 1-based line/column position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
}

impl Pos {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Number(String),
    /// Quoted template; `value` has interpolations elided.
    Str { value: String, interpolated: bool },
    Heredoc { interpolated: bool },
    Punct(&'static str),
    Newline,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Pos,
}

const TWO_CHAR_PUNCT: [&str; 7] = ["==", "!=", "<=", ">=", "&&", "||", "=>"];
const ONE_CHAR_PUNCT: [&str; 21] = [
    "{", "}", "[", "]", "(", ")", "=", ",", ".", ":", "?", "!", "+", "-", "*", "/", "%", "<",
    ">", ";", "~",
];

pub struct Lexer {
    chars: Vec<char>,
    idx: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(src: &str) -> Self {
        Self {
            chars: src.chars().collect(),
            idx: 0,
            line: 1,
            column: 1,
        }
    }

    fn pos(&self) -> Pos {
        Pos::new(self.line, self.column)
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.idx + offset).copied()
    }

    fn peek(&self) -> Option<char> {
        self.peek_at(0)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.idx += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();

        while let Some(c) = self.peek() {
            let pos = self.pos();
            match c {
                ' ' | '\t' | '\r' => {
                    self.bump();
                }
                '\n' => {
                    self.bump();
                    tokens.push(Token { kind: TokenKind::Newline, pos });
                }
                '#' => self.skip_line_comment(),
                '/' if self.peek_at(1) == Some('/') => self.skip_line_comment(),
                '/' if self.peek_at(1) == Some('*') => self.skip_block_comment(pos)?,
                '"' => {
                    let kind = self.lex_string(pos)?;
                    tokens.push(Token { kind, pos });
                }
                '<' if self.peek_at(1) == Some('<') => {
                    let kind = self.lex_heredoc(pos)?;
                    tokens.push(Token { kind, pos });
                }
                c if c.is_ascii_digit() => {
                    let kind = self.lex_number();
                    tokens.push(Token { kind, pos });
                }
                c if c.is_alphabetic() || c == '_' => {
                    let mut ident = String::new();
                    while let Some(c) = self.peek() {
                        if c.is_alphanumeric() || c == '_' || c == '-' {
                            ident.push(c);
                            self.bump();
                        } else {
                            break;
                        }
                    }
                    tokens.push(Token { kind: TokenKind::Ident(ident), pos });
                }
                _ => {
                    let kind = self.lex_punct(pos)?;
                    tokens.push(Token { kind, pos });
                }
            }
        }

        tokens.push(Token {
            kind: TokenKind::Eof,
            pos: self.pos(),
        });
        Ok(tokens)
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn skip_block_comment(&mut self, start: Pos) -> Result<(), ParseError> {
        self.bump();
        self.bump();
        loop {
            match self.bump() {
                Some('*') if self.peek() == Some('/') => {
                    self.bump();
                    return Ok(());
                }
                Some(_) => {}
                None => {
                    return Err(ParseError::new(
                        "Unterminated block comment: There is no closing marker for this multi-line comment.",
                        start,
                    ))
                }
            }
        }
    }

    fn lex_number(&mut self) -> TokenKind {
        let mut num = String::new();
        while let Some(c) = self.peek() {
            let exponent_sign = (c == '+' || c == '-') && num.ends_with(['e', 'E']);
            let fraction = c == '.' && self.peek_at(1).is_some_and(|n| n.is_ascii_digit());
            if c.is_ascii_digit() || c == 'e' || c == 'E' || exponent_sign || fraction {
                num.push(c);
                self.bump();
            } else {
                break;
            }
        }
        TokenKind::Number(num)
    }

    fn lex_punct(&mut self, pos: Pos) -> Result<TokenKind, ParseError> {
        if self.peek() == Some('.') && self.peek_at(1) == Some('.') && self.peek_at(2) == Some('.') {
            self.bump();
            self.bump();
            self.bump();
            return Ok(TokenKind::Punct("..."));
        }

        if let (Some(a), Some(b)) = (self.peek(), self.peek_at(1)) {
            let pair: String = [a, b].iter().collect();
            if let Some(p) = TWO_CHAR_PUNCT.iter().find(|p| **p == pair) {
                self.bump();
                self.bump();
                return Ok(TokenKind::Punct(*p));
            }
        }

        let c = self.peek().unwrap_or_default().to_string();
        match ONE_CHAR_PUNCT.iter().find(|p| **p == c) {
            Some(p) => {
                self.bump();
                Ok(TokenKind::Punct(*p))
            }
            None => Err(ParseError::new(
                format!("Invalid character: The {c:?} character is not used within HCL syntax."),
                pos,
            )),
        }
    }

    /// Lex a quoted template starting at `"`.
    fn lex_string(&mut self, start: Pos) -> Result<TokenKind, ParseError> {
        let unterminated = || {
            ParseError::new(
                "Unterminated template string: No closing marker was found for the string.",
                start,
            )
        };

        self.bump();
        let mut value = String::new();
        let mut interpolated = false;

        loop {
            match self.peek() {
                None | Some('\n') => return Err(unterminated()),
                Some('"') => {
                    self.bump();
                    break;
                }
                Some('\\') => {
                    self.bump();
                    let escaped = self.bump().ok_or_else(unterminated)?;
                    value.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        other => other,
                    });
                }
                Some(c @ ('$' | '%')) if self.peek_at(1) == Some(c) && self.peek_at(2) == Some('{') => {
                    self.bump();
                    self.bump();
                    self.bump();
                    value.push(c);
                    value.push('{');
                }
                Some('$' | '%') if self.peek_at(1) == Some('{') => {
                    interpolated = true;
                    self.skip_template_sequence(start)?;
                }
                Some(c) => {
                    value.push(c);
                    self.bump();
                }
            }
        }

        Ok(TokenKind::Str { value, interpolated })
    }

    /// Skip a `${ ... }` or `%{ ... }` sequence, including nested strings.
    fn skip_template_sequence(&mut self, start: Pos) -> Result<(), ParseError> {
        self.bump();
        self.bump();
        let mut depth = 1usize;

        while depth > 0 {
            match self.peek() {
                None => {
                    return Err(ParseError::new(
                        "Unterminated template string: No closing marker was found for the string.",
                        start,
                    ))
                }
                Some('"') => {
                    let nested = self.pos();
                    self.lex_string(nested)?;
                }
                Some('{') => {
                    depth += 1;
                    self.bump();
                }
                Some('}') => {
                    depth -= 1;
                    self.bump();
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
        Ok(())
    }

    /// Lex `<<MARKER` / `<<-MARKER` through the closing marker line.
    ///
    /// The newline after the closing marker is left in place so that it can
    /// terminate the attribute.
    fn lex_heredoc(&mut self, start: Pos) -> Result<TokenKind, ParseError> {
        self.bump();
        self.bump();
        if self.peek() == Some('-') {
            self.bump();
        }

        let mut marker = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                marker.push(c);
                self.bump();
            } else {
                break;
            }
        }
        while self.peek() == Some('\r') {
            self.bump();
        }
        if marker.is_empty() || self.peek() != Some('\n') {
            return Err(ParseError::new(
                "Invalid heredoc introducer: A heredoc must start with an identifier followed by a newline.",
                start,
            ));
        }
        self.bump();

        let mut interpolated = false;
        loop {
            if self.peek().is_none() {
                return Err(ParseError::new(
                    format!("Unterminated template string: No closing marker {marker:?} was found for the heredoc."),
                    start,
                ));
            }

            let mut line = String::new();
            while let Some(c) = self.peek() {
                if c == '\n' {
                    break;
                }
                line.push(c);
                self.bump();
            }

            if line.trim() == marker {
                return Ok(TokenKind::Heredoc { interpolated });
            }
            if (line.contains("${") && !line.contains("$${")) || line.contains("%{") {
                interpolated = true;
            }
            self.bump();
        }
    }
}
