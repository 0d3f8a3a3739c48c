//=====================================================
// File: tokenizer.rs
//=====================================================
// Author: PgScript Contributors
// License: MIT (see LICENSE)
// Goal: PgScript lexical analysis
// Objective: Convert raw script text into an ordered token stream with
//            line/column tracking for diagnostics
//=====================================================

use std::collections::VecDeque;
use std::fmt;

use once_cell::sync::Lazy;
use std::collections::HashMap;
use thiserror::Error;

/// Position of a token in the source text. Lines and columns start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// All token kinds produced by the tokenizer.
///
/// Two-character operators are recognized by first classifying the current
/// character as a tentative single-character kind and upgrading it when the
/// next character matches a known combining pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Literals and identifiers, classified after the fact
    Number,
    Float,
    Str,
    True,
    False,
    Identifier,

    // Single character operators
    Equal,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Greater,
    Less,
    Not,
    Question,
    Tilde,
    Ampersand,
    Comma,
    Dot,
    SingleQuote,
    DoubleQuote,
    Backslash,
    Pipe,
    Hash,
    Colon,
    Semicolon,

    // Two character operators
    EqualEqual,
    NotEqual,
    PlusEqual,
    MinusEqual,
    StarEqual,
    SlashEqual,
    PercentEqual,
    GreaterEqual,
    LessEqual,
    Increment,
    Decrement,
    AndAnd,
    OrOr,
    ShiftLeft,
    ShiftRight,
    Arrow,
    Scope,

    // Keywords
    If,
    Else,
    Var,
    While,
    For,
    Fun,
    Return,
    Class,
    This,
    Import,
    From,
    As,

    // Stream control
    Eol,
    Eof,

    /// Internal marker: the character is not an operator at all.
    Noop,
}

/// A single lexical unit: kind, raw text and source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub position: Position,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            position: Position::new(line, column),
        }
    }

    /// Synthetic token for nodes the parser fabricates during desugaring.
    pub fn synthetic(kind: TokenKind, lexeme: impl Into<String>, position: Position) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            position,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("Syntax Error: {message} at {position}")]
pub struct LexerError {
    pub message: String,
    pub position: Position,
}

impl LexerError {
    fn new(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            message: message.into(),
            position: Position::new(line, column),
        }
    }
}

/// The table of reserved keywords and the corresponding token kind.
static KEYWORDS: Lazy<HashMap<&'static str, TokenKind>> = Lazy::new(|| {
    HashMap::from([
        ("true", TokenKind::True),
        ("false", TokenKind::False),
        ("if", TokenKind::If),
        ("else", TokenKind::Else),
        ("var", TokenKind::Var),
        ("while", TokenKind::While),
        ("for", TokenKind::For),
        ("and", TokenKind::AndAnd),
        ("or", TokenKind::OrOr),
        ("not", TokenKind::Not),
        ("fun", TokenKind::Fun),
        ("return", TokenKind::Return),
        ("class", TokenKind::Class),
        ("this", TokenKind::This),
        ("import", TokenKind::Import),
        ("from", TokenKind::From),
        ("as", TokenKind::As),
    ])
});

/// Classify a character as an operator kind, upgrading to a two character
/// operator when the following character combines with it.
fn char_to_op(chara: char, next: Option<char>) -> TokenKind {
    use TokenKind::*;

    match chara {
        '^' => Caret,
        '(' => LeftParen,
        ')' => RightParen,
        '{' => LeftBrace,
        '}' => RightBrace,
        '[' => LeftBracket,
        ']' => RightBracket,
        '?' => Question,
        '~' => Tilde,
        ',' => Comma,
        '.' => Dot,
        '\'' => SingleQuote,
        '"' => DoubleQuote,
        '\\' => Backslash,
        '#' => Hash,
        ';' => Semicolon,

        '=' if next == Some('=') => EqualEqual,
        '=' => Equal,

        '!' if next == Some('=') => NotEqual,
        '!' => Not,

        '+' if next == Some('=') => PlusEqual,
        '+' if next == Some('+') => Increment,
        '+' => Plus,

        '-' if next == Some('=') => MinusEqual,
        '-' if next == Some('>') => Arrow,
        '-' if next == Some('-') => Decrement,
        '-' => Minus,

        '*' if next == Some('=') => StarEqual,
        '*' => Star,

        '/' if next == Some('=') => SlashEqual,
        '/' => Slash,

        '%' if next == Some('=') => PercentEqual,
        '%' => Percent,

        '&' if next == Some('&') => AndAnd,
        '&' => Ampersand,

        '|' if next == Some('|') => OrOr,
        '|' => Pipe,

        '>' if next == Some('=') => GreaterEqual,
        '>' if next == Some('>') => ShiftRight,
        '>' => Greater,

        '<' if next == Some('=') => LessEqual,
        '<' if next == Some('<') => ShiftLeft,
        '<' => Less,

        ':' if next == Some(':') => Scope,
        ':' => Colon,

        _ => Noop,
    }
}

fn is_two_char(kind: TokenKind) -> bool {
    use TokenKind::*;
    matches!(
        kind,
        EqualEqual
            | NotEqual
            | PlusEqual
            | MinusEqual
            | StarEqual
            | SlashEqual
            | PercentEqual
            | GreaterEqual
            | LessEqual
            | Increment
            | Decrement
            | AndAnd
            | OrOr
            | ShiftLeft
            | ShiftRight
            | Arrow
            | Scope
    )
}

fn is_integer(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_digit())
}

fn is_float(text: &str) -> bool {
    text.parse::<f64>().is_ok()
}

/// Classify a flushed buffer against the keyword table, then the numeric
/// literal predicates, falling back to a generic identifier.
fn classify(text: &str) -> TokenKind {
    if let Some(kind) = KEYWORDS.get(text) {
        return *kind;
    }

    if is_integer(text) {
        return TokenKind::Number;
    }

    if is_float(text) {
        return TokenKind::Float;
    }

    TokenKind::Identifier
}

/// Single pass tokenizer over script text.
///
/// Whitespace flushes the pending identifier/number buffer, a dedicated
/// in-string mode accumulates characters until the closing quote, `//`
/// discards the remainder of the line, and every line unconditionally emits
/// an end-of-line token so the parser can treat `;` and end-of-line as
/// interchangeable statement terminators.
pub struct Tokenizer<'a> {
    source: &'a str,
    tokens: VecDeque<Token>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            tokens: VecDeque::new(),
        }
    }

    pub fn tokenize(mut self) -> Result<VecDeque<Token>, LexerError> {
        let mut line_no: u32 = 1;
        let mut column: u32 = 1;

        let mut buffer = String::new();
        let mut buffer_is_number = false;

        let mut in_string = false;
        let mut string_line: u32 = 1;
        let mut string_column: u32 = 1;
        // The column counter is tracked separately while inside a string
        // since a string literal owns every character up to its closing quote.
        let mut string_width: u32 = 1;

        for line in self.source.lines() {
            let chars: Vec<char> = line.chars().collect();

            let mut i = 0;
            'chars: while i < chars.len() {
                let chara = chars[i];

                if !in_string && (chara == ' ' || chara == '\t' || chara == '\r') {
                    if !buffer.is_empty() {
                        self.tokens
                            .push_back(Token::new(classify(&buffer), buffer.as_str(), line_no, column));
                        column += buffer.len() as u32;
                        buffer.clear();
                    }
                    buffer_is_number = false;

                    column += 1;
                    i += 1;
                    continue;
                }

                let next = chars.get(i + 1).copied();
                let op = char_to_op(chara, next);

                if op == TokenKind::Noop {
                    if buffer_is_number && !chara.is_ascii_digit() {
                        return Err(LexerError::new(
                            format!("Can't parse correct number: {buffer}"),
                            line_no,
                            column,
                        ));
                    }

                    buffer.push(chara);

                    if in_string {
                        string_width += 1;
                    }
                } else if op == TokenKind::DoubleQuote {
                    if in_string {
                        self.tokens.push_back(Token::new(
                            TokenKind::Str,
                            &buffer,
                            string_line,
                            string_column,
                        ));
                        buffer.clear();
                        in_string = false;

                        column += string_width;
                    } else {
                        if !buffer.is_empty() {
                            self.tokens
                                .push_back(Token::new(classify(&buffer), buffer.as_str(), line_no, column));
                            column += buffer.len() as u32;
                            buffer.clear();
                        }

                        string_line = line_no;
                        string_column = column;
                        string_width = 1;
                        in_string = true;
                    }
                } else {
                    // A dot directly after a digit buffer keeps accumulating
                    // as a float candidate instead of ending the token.
                    if op == TokenKind::Dot && !buffer.is_empty() && is_integer(&buffer) {
                        buffer.push('.');
                        buffer_is_number = true;
                        i += 1;
                        continue;
                    }

                    // Escaped quote: consume the backslash and keep the quote.
                    if op == TokenKind::Backslash && next == Some('"') {
                        buffer.push('"');
                        column += 2;
                        i += 2;
                        continue;
                    }

                    if in_string {
                        buffer.push(chara);
                        string_width += 1;
                        i += 1;
                        continue;
                    }

                    // A line comment discards the remainder of the line.
                    if op == TokenKind::Slash && next == Some('/') {
                        break 'chars;
                    }

                    if !buffer.is_empty() {
                        self.tokens
                            .push_back(Token::new(classify(&buffer), buffer.as_str(), line_no, column));
                        column += buffer.len() as u32;
                        buffer.clear();
                    }

                    if is_two_char(op) {
                        let mut text = String::from(chara);
                        if let Some(n) = next {
                            text.push(n);
                        }
                        self.tokens.push_back(Token::new(op, text, line_no, column));
                        column += 2;
                        i += 1;
                    } else {
                        self.tokens
                            .push_back(Token::new(op, String::from(chara), line_no, column));
                        column += 1;
                    }

                    buffer_is_number = false;
                }

                i += 1;
            }

            if !in_string {
                if !buffer.is_empty() {
                    self.tokens
                        .push_back(Token::new(classify(&buffer), buffer.as_str(), line_no, column));
                    column += buffer.len() as u32;
                    buffer.clear();
                }

                self.tokens
                    .push_back(Token::new(TokenKind::Eol, "\n", line_no, column));
            }

            line_no += 1;
            column = 1;
            buffer_is_number = false;
        }

        if in_string {
            return Err(LexerError::new(
                "Expected \" at the end of a string declaration",
                string_line,
                string_column,
            ));
        }

        self.tokens
            .push_back(Token::new(TokenKind::Eof, "End of file", line_no, column));

        Ok(self.tokens)
    }
}

//=====================================================
// Tests
//=====================================================
