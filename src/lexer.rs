//! # Lexer
//!
//! Tokenizes Flow source into a flat, located token stream: a
//! `Peekable<Chars>` cursor tracking line/column, a `tokenize` loop that
//! matches on the current character, and a `LocatedToken` wrapper pairing
//! every token with its position. Unknown characters never abort
//! tokenization — the lexer pushes a diagnostic and skips instead.

use crate::diagnostics::{Diagnostics, DiagnosticKind, SourceLocation};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    Proc,
    End,
    Return,
    Use,
    Internal,
    Lazy,
    Fn,
    TimeSig,
    Tempo,
    Swing,
    Key,
    Section,
    Dynamics,
    TypeName(String),

    // Literals
    IntLit(i64),
    LongLit(i64),
    FloatLit(f32),
    DoubleLit(f64),
    StringLit(String),
    BoolLit(bool),
    SemitoneLit(i64),
    CentLit(f64),
    MillisecondLit(f64),
    SecondLit(f64),
    DecibelLit(f64),
    NoteLit { letter: char, alteration: i8, octave: Option<i64> },

    Identifier(String),
    Comment(String),

    // Operators
    Arrow,     // ->
    FatArrow,  // =>
    At,        // @
    Equals,    // =
    Colon,     // :
    Dot,       // .
    Plus,
    Minus,
    Star,
    Slash,
    Less,
    Greater,
    Question,       // ?
    DoubleQuestion, // ??

    // Delimiters
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Pipe,
    Underscore,
    Tilde,
    Comma,
    Semicolon,
    Ellipsis,

    Eof,
}

#[derive(Debug, Clone)]
pub struct LocatedToken {
    pub token: Token,
    pub line: usize,
    pub column: usize,
}

pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    input: &'a str,
    line: usize,
    column: usize,
}

fn keyword_or_type(word: &str) -> Option<Token> {
    Some(match word {
        "proc" => Token::Proc,
        "end" => Token::End,
        "return" => Token::Return,
        "use" => Token::Use,
        "internal" => Token::Internal,
        "lazy" => Token::Lazy,
        "fn" => Token::Fn,
        "timesig" => Token::TimeSig,
        "tempo" => Token::Tempo,
        "swing" => Token::Swing,
        "key" => Token::Key,
        "section" => Token::Section,
        "dynamics" => Token::Dynamics,
        "true" => Token::BoolLit(true),
        "false" => Token::BoolLit(false),
        "Int" | "Long" | "Float" | "Double" | "String" | "Bool" | "Number" | "Void" | "Note"
        | "Semitone" | "Cent" | "Millisecond" | "Second" | "Decibel" | "Beat" | "MusicalNote"
        | "Bar" | "Sequence" | "Chord" | "Section" | "Song" | "TimeSignature" | "NoteValue"
        | "Buffer" | "OscillatorState" | "Envelope" | "Voice" | "Track" | "Function" | "Buf"
        | "Ints" | "Longs" | "Floats" | "Doubles" | "Strings" | "Bools" | "Numbers" | "Voids"
        | "Notes" | "Bars" | "Sequences" | "Chords" | "Songs" | "Buffers" | "Voices" => {
            Token::TypeName(word.to_string())
        }
        _ => return None,
    })
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.char_indices().peekable(),
            input,
            line: 1,
            column: 1,
        }
    }

    fn advance(&mut self) -> Option<char> {
        let (_, c) = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn peek_at(&mut self, offset: usize) -> Option<char> {
        let base = self.chars.peek().map(|(i, _)| *i)?;
        self.input[base..].chars().nth(offset)
    }

    fn rest_from(&self, start: usize) -> &'a str {
        &self.input[start..]
    }

    fn current_index(&mut self) -> usize {
        self.chars.peek().map(|(i, _)| *i).unwrap_or(self.input.len())
    }

    pub fn tokenize(mut self, diags: &mut Diagnostics) -> Vec<LocatedToken> {
        let mut tokens = Vec::new();
        while let Some(c) = self.peek() {
            let line = self.line;
            let column = self.column;

            if c == ' ' || c == '\t' || c == '\r' || c == '\n' {
                self.advance();
                continue;
            }

            let idx = self.current_index();
            if self.rest_from(idx).starts_with("Note:") {
                let start = self.current_index();
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.advance();
                }
                let text = self.rest_from(start);
                let text = &text[..text.len().min(self.current_index() - start)];
                tokens.push(self.located(Token::Comment(text.to_string()), line, column));
                continue;
            }

            if c.is_ascii_digit() || self.looks_like_signed_decibel() {
                if let Some(tok) = self.lex_number(diags, line, column) {
                    tokens.push(tok);
                }
                continue;
            }

            // A lone `_` is the note-stream rest marker; `_foo` is an
            // identifier — `_` is punctuation only when it isn't glued to
            // a following word.
            if c.is_ascii_alphabetic() || (c == '_' && self.peek_at(1).is_some_and(|d| d.is_alphanumeric())) {
                tokens.push(self.lex_identifier_or_note(line, column));
                continue;
            }

            if c == '"' {
                tokens.push(self.lex_string(diags, line, column));
                continue;
            }

            if let Some(tok) = self.lex_operator(line, column) {
                tokens.push(tok);
                continue;
            }

            self.advance();
            diags.push(DiagnosticKind::LexUnexpectedChar(c), SourceLocation::new(line, column));
        }
        tokens.push(self.located(Token::Eof, self.line, self.column));
        tokens
    }

    fn located(&self, token: Token, line: usize, column: usize) -> LocatedToken {
        LocatedToken { token, line, column }
    }

    /// A leading `-` is only ever part of a number literal for the decibel
    /// suffix form, since signed decibels need to be recognized at the
    /// lexer level; everywhere else `-3` is `Minus` followed by `IntLit(3)`
    /// and the parser's unary-sign rule applies.
    fn looks_like_signed_decibel(&mut self) -> bool {
        if self.peek() != Some('-') {
            return false;
        }
        let mut offset = 1;
        let mut saw_digit = false;
        while self.peek_at(offset).is_some_and(|c| c.is_ascii_digit()) {
            saw_digit = true;
            offset += 1;
        }
        saw_digit
            && self.peek_at(offset) == Some('d')
            && self.peek_at(offset + 1) == Some('B')
    }

    /// Numeric literal lexing, including tail-pattern sniffing that turns
    /// a bare number into a semitone/cent/time/decibel literal. Unary sign
    /// here only applies in tempo/swing contexts where
    /// the parser explicitly requests a signed read; elsewhere the minus is
    /// a separate `Token::Minus` left for the parser's unary-sign rule.
    fn lex_number(&mut self, diags: &mut Diagnostics, line: usize, column: usize) -> Option<LocatedToken> {
        let start = self.current_index();
        if self.peek() == Some('-') {
            self.advance();
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        let mut is_float = false;
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        let end = self.current_index();
        let text = &self.input[start..end];

        // Tail-pattern sniffing.
        let idx = self.current_index();
        if !is_float && self.rest_from(idx).starts_with("st")
            && !self.peek_at(2).is_some_and(|c| c.is_alphanumeric())
        {
            self.advance();
            self.advance();
            let v: i64 = text.parse().unwrap_or(0);
            return Some(self.located(Token::SemitoneLit(v), line, column));
        }
        if self.peek() == Some('c') && !self.peek_at(1).is_some_and(|c| c.is_alphanumeric()) {
            self.advance();
            let v: f64 = text.parse().unwrap_or(0.0);
            return Some(self.located(Token::CentLit(v), line, column));
        }
        let idx = self.current_index();
        if self.rest_from(idx).starts_with("ms")
            && !self.peek_at(2).is_some_and(|c| c.is_alphanumeric())
        {
            self.advance();
            self.advance();
            let v: f64 = text.parse().unwrap_or(0.0);
            return Some(self.located(Token::MillisecondLit(v), line, column));
        }
        if self.peek() == Some('s') && !self.peek_at(1).is_some_and(|c| c.is_alphanumeric()) {
            self.advance();
            let v: f64 = text.parse().unwrap_or(0.0);
            return Some(self.located(Token::SecondLit(v), line, column));
        }
        let idx = self.current_index();
        if self.rest_from(idx).starts_with("dB") {
            self.advance();
            self.advance();
            let v: f64 = text.parse().unwrap_or(0.0);
            return Some(self.located(Token::DecibelLit(v), line, column));
        }

        if is_float {
            match text.parse::<f64>() {
                Ok(v) => Some(self.located(Token::DoubleLit(v), line, column)),
                Err(_) => {
                    diags.push(DiagnosticKind::LexNumberOverflow(text.to_string()), SourceLocation::new(line, column));
                    None
                }
            }
        } else {
            match text.parse::<i64>() {
                Ok(v) => Some(self.located(Token::IntLit(v), line, column)),
                Err(_) => {
                    diags.push(DiagnosticKind::LexNumberOverflow(text.to_string()), SourceLocation::new(line, column));
                    None
                }
            }
        }
    }

    /// Identifiers, keywords, type names, and pitch-letter note literals
    /// (A–G with optional `s`/`f` sharp/flat and an octave digit).
    fn lex_identifier_or_note(&mut self, line: usize, column: usize) -> LocatedToken {
        let start = self.current_index();
        let first = self.peek().unwrap();
        self.advance();
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.advance();
        }
        let end = self.current_index();
        let word = &self.input[start..end];

        // Pitch literal: single A-G letter, optional s/f run, optional octave digit.
        if ('A'..='G').contains(&first) {
            let mut chars = word.chars();
            chars.next();
            let rest: String = chars.collect();
            let alt_len = rest.chars().take_while(|c| *c == 's' || *c == 'f').count();
            let (alt_part, oct_part) = rest.split_at(alt_len);
            if oct_part.chars().all(|c| c.is_ascii_digit()) {
                let alteration: i8 = alt_part.chars().fold(0i8, |acc, c| acc + if c == 's' { 1 } else { -1 });
                let octave = if oct_part.is_empty() {
                    None
                } else {
                    oct_part.parse::<i64>().ok()
                };
                return self.located(
                    Token::NoteLit { letter: first, alteration, octave },
                    line,
                    column,
                );
            }
        }

        if let Some(tok) = keyword_or_type(word) {
            return self.located(tok, line, column);
        }
        self.located(Token::Identifier(word.to_string()), line, column)
    }

    fn lex_string(&mut self, diags: &mut Diagnostics, line: usize, column: usize) -> LocatedToken {
        self.advance(); // opening quote
        let mut s = String::new();
        loop {
            match self.peek() {
                None => {
                    diags.push(
                        DiagnosticKind::ParseUnexpectedToken("unterminated string".into()),
                        SourceLocation::new(line, column),
                    );
                    break;
                }
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.advance() {
                        Some('n') => s.push('\n'),
                        Some('t') => s.push('\t'),
                        Some(c) => s.push(c),
                        None => break,
                    }
                }
                Some(c) => {
                    s.push(c);
                    self.advance();
                }
            }
        }
        self.located(Token::StringLit(s), line, column)
    }

    fn lex_operator(&mut self, line: usize, column: usize) -> Option<LocatedToken> {
        let c = self.peek()?;
        let tok = match c {
            '-' if self.peek_at(1) == Some('>') => {
                self.advance();
                self.advance();
                Token::Arrow
            }
            '=' if self.peek_at(1) == Some('>') => {
                self.advance();
                self.advance();
                Token::FatArrow
            }
            '.' if self.peek_at(1) == Some('.') && self.peek_at(2) == Some('.') => {
                self.advance();
                self.advance();
                self.advance();
                Token::Ellipsis
            }
            '@' => { self.advance(); Token::At }
            '=' => { self.advance(); Token::Equals }
            ':' => { self.advance(); Token::Colon }
            '.' => { self.advance(); Token::Dot }
            '+' => { self.advance(); Token::Plus }
            '-' => { self.advance(); Token::Minus }
            '*' => { self.advance(); Token::Star }
            '/' => { self.advance(); Token::Slash }
            '<' => { self.advance(); Token::Less }
            '>' => { self.advance(); Token::Greater }
            '?' if self.peek_at(1) == Some('?') => {
                self.advance();
                self.advance();
                Token::DoubleQuestion
            }
            '?' => { self.advance(); Token::Question }
            '(' => { self.advance(); Token::LParen }
            ')' => { self.advance(); Token::RParen }
            '[' => { self.advance(); Token::LBracket }
            ']' => { self.advance(); Token::RBracket }
            '{' => { self.advance(); Token::LBrace }
            '}' => { self.advance(); Token::RBrace }
            '|' => { self.advance(); Token::Pipe }
            '_' => { self.advance(); Token::Underscore }
            '~' => { self.advance(); Token::Tilde }
            ',' => { self.advance(); Token::Comma }
            ';' => { self.advance(); Token::Semicolon }
            _ => return None,
        };
        Some(self.located(tok, line, column))
    }
}

/// Tokenize `source`, collecting diagnostics rather than failing.
pub fn tokenize(source: &str, diags: &mut Diagnostics) -> Vec<LocatedToken> {
    Lexer::new(source).tokenize(diags)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Token> {
        let mut diags = Diagnostics::new();
        tokenize(src, &mut diags).into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn lexes_arithmetic() {
        assert_eq!(
            toks("3 + 4 * 2"),
            vec![Token::IntLit(3), Token::Plus, Token::IntLit(4), Token::Star, Token::IntLit(2), Token::Eof]
        );
    }

    #[test]
    fn lexes_semitone_cent_time_decibel() {
        assert_eq!(toks("5st")[0], Token::SemitoneLit(5));
        assert_eq!(toks("12c")[0], Token::CentLit(12.0));
        assert_eq!(toks("250ms")[0], Token::MillisecondLit(250.0));
        assert_eq!(toks("2s")[0], Token::SecondLit(2.0));
        assert_eq!(toks("-6dB")[0], Token::DecibelLit(-6.0));
    }

    #[test]
    fn lexes_note_literal_with_accidental_and_octave() {
        assert_eq!(toks("Cs4")[0], Token::NoteLit { letter: 'C', alteration: 1, octave: Some(4) });
        assert_eq!(toks("Ef")[0], Token::NoteLit { letter: 'E', alteration: -1, octave: None });
    }

    #[test]
    fn unknown_char_is_diagnosed_not_fatal() {
        let mut diags = Diagnostics::new();
        let tokens = tokenize("3 ` 4", &mut diags);
        assert_eq!(diags.len(), 1);
        assert_eq!(
            tokens.iter().map(|t| &t.token).collect::<Vec<_>>(),
            vec![&Token::IntLit(3), &Token::IntLit(4), &Token::Eof]
        );
    }

    #[test]
    fn skips_note_comment() {
        let tokens = toks("Int x = 1 Note: this is a comment\nInt y = 2");
        assert!(tokens.iter().any(|t| matches!(t, Token::Comment(_))));
    }
}
