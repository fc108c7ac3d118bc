//! The preprocessing-token lexer.
//!
//! One lexer sits on top of one [`SourceReader`] and hands out tokens lazily.
//! It never expands macros and never consults the macro table; directives and
//! expansion live a layer above. What it does track is the whitespace
//! bookkeeping the preprocessor needs: `lwhite` accumulates across skipped
//! spaces and block comments, `lnew` across newlines and line comments, and
//! `directive` marks the first real token on each logical line.

use cpre_foundation::errors::{Error, ErrorKind, Result, Site};
use cpre_foundation::source::SourceReader;

use crate::token::{Token, TokenFlags, TokenKind};

#[derive(Debug)]
pub struct Lexer {
    reader: SourceReader,
    lwhite: bool,
    lnew: bool,
    directive: bool,
}

impl Lexer {
    pub fn new(reader: SourceReader) -> Self {
        Self {
            reader,
            lwhite: false,
            lnew: false,
            // The first token of a source can introduce a directive.
            directive: true,
        }
    }

    pub fn filename(&self) -> &str {
        self.reader.filename()
    }

    pub fn line(&self) -> u64 {
        self.reader.line()
    }

    pub fn site(&self) -> Site {
        Site::new(self.reader.filename(), self.reader.line())
    }

    fn err(&self, kind: ErrorKind) -> Error {
        Error::new(self.site(), kind)
    }

    /// Produce the next preprocessing token, or `None` at end of input.
    ///
    /// `want_header_name` is set by the directive handler while reading the
    /// operand of `#include`; in that mode `<...>` and `"..."` lex as header
    /// names instead of operators and string literals.
    pub fn next(&mut self, want_header_name: bool) -> Result<Option<Token>> {
        self.skip_trivia()?;

        let Some(ch) = self.reader.peek() else {
            return Ok(None);
        };
        let mut token = match ch {
            'L' if self.reader.peek2() == Some('\'') => {
                Token::new(TokenKind::CharConst, self.quoted_literal('\'', true)?)
            }
            'L' if self.reader.peek2() == Some('"') => {
                Token::new(TokenKind::StringLit, self.quoted_literal('"', true)?)
            }
            'a'..='z' | 'A'..='Z' | '_' => Token::new(TokenKind::Identifier, self.identifier()),
            '0'..='9' => Token::new(TokenKind::PpNumber, self.pp_number()),
            '.' if matches!(self.reader.peek2(), Some('0'..='9')) => {
                Token::new(TokenKind::PpNumber, self.pp_number())
            }
            '\'' => Token::new(TokenKind::CharConst, self.quoted_literal('\'', false)?),
            '"' if want_header_name => {
                Token::new(TokenKind::QuotedHeaderName, self.header_name('"', '"')?)
            }
            '"' => Token::new(TokenKind::StringLit, self.quoted_literal('"', false)?),
            '<' if want_header_name => {
                Token::new(TokenKind::AngledHeaderName, self.header_name('<', '>')?)
            }
            _ => Token::punct(self.punctuator()?),
        };

        if self.lwhite {
            token.flags |= TokenFlags::LWHITE;
        }
        if self.lnew {
            token.flags |= TokenFlags::LNEW;
        }
        if self.directive {
            token.flags |= TokenFlags::DIRECTIVE;
        }
        self.lwhite = false;
        self.lnew = false;
        self.directive = false;
        Ok(Some(token))
    }

    /// Skip whitespace and comments, accumulating the flag state.
    fn skip_trivia(&mut self) -> Result<()> {
        loop {
            match self.reader.peek() {
                // Invisible whitespace.
                Some('\u{b}' | '\u{c}' | '\r') => {
                    self.reader.bump();
                }
                Some(' ' | '\t') => {
                    self.reader.bump();
                    self.lwhite = true;
                }
                Some('\n') => {
                    self.reader.bump();
                    // A newline wipes same-line whitespace and opens a fresh
                    // logical line.
                    self.lwhite = false;
                    self.lnew = true;
                    self.directive = true;
                }
                Some('/') if self.reader.peek2() == Some('/') => {
                    // Line comment; the newline that ends it is processed by
                    // the arm above.
                    while !matches!(self.reader.peek(), None | Some('\n')) {
                        self.reader.bump();
                    }
                }
                Some('/') if self.reader.peek2() == Some('*') => {
                    self.block_comment()?;
                    self.lwhite = true;
                }
                _ => return Ok(()),
            }
        }
    }

    fn block_comment(&mut self) -> Result<()> {
        self.reader.bump();
        self.reader.bump();
        loop {
            match self.reader.bump() {
                None => return Err(self.err(ErrorKind::Unterminated("block comment"))),
                Some('*') if self.reader.eat('/') => return Ok(()),
                Some(_) => {}
            }
        }
    }

    fn identifier(&mut self) -> String {
        let mut text = String::new();
        while let Some(ch @ ('a'..='z' | 'A'..='Z' | '0'..='9' | '_')) = self.reader.peek() {
            text.push(ch);
            self.reader.bump();
        }
        text
    }

    /// C99 pp-number: the caller guarantees a leading digit, or a `.`
    /// followed by a digit. `e`/`E`/`p`/`P` absorb a following sign.
    fn pp_number(&mut self) -> String {
        let mut text = String::new();
        while let Some(ch @ ('.' | '_' | 'a'..='z' | 'A'..='Z' | '0'..='9')) = self.reader.peek() {
            text.push(ch);
            self.reader.bump();
            if matches!(ch, 'e' | 'E' | 'p' | 'P') {
                if let Some(sign @ ('+' | '-')) = self.reader.peek() {
                    text.push(sign);
                    self.reader.bump();
                }
            }
        }
        text
    }

    /// Character constant or string literal. Escape sequences are kept
    /// textually; decoding them is the expression evaluator's business.
    fn quoted_literal(&mut self, delim: char, wide: bool) -> Result<String> {
        let construct = if delim == '\'' {
            "character constant"
        } else {
            "string literal"
        };

        let mut text = String::new();
        if wide {
            text.push('L');
            self.reader.bump();
        }
        text.push(delim);
        self.reader.bump();

        loop {
            match self.reader.peek() {
                None | Some('\n') => return Err(self.err(ErrorKind::Unterminated(construct))),
                Some('\\') => {
                    text.push('\\');
                    self.reader.bump();
                    match self.reader.peek() {
                        None | Some('\n') => {
                            return Err(self.err(ErrorKind::Unterminated(construct)))
                        }
                        Some(ch) => {
                            text.push(ch);
                            self.reader.bump();
                        }
                    }
                }
                Some(ch) => {
                    text.push(ch);
                    self.reader.bump();
                    if ch == delim {
                        return Ok(text);
                    }
                }
            }
        }
    }

    /// `<...>` or `"..."` in header-name mode; no escape processing at all.
    fn header_name(&mut self, open: char, close: char) -> Result<String> {
        let mut text = String::new();
        text.push(open);
        self.reader.bump();
        loop {
            match self.reader.peek() {
                None | Some('\n') => return Err(self.err(ErrorKind::Unterminated("header name"))),
                Some(ch) => {
                    text.push(ch);
                    self.reader.bump();
                    if ch == close {
                        return Ok(text);
                    }
                }
            }
        }
    }

    /// Longest-match punctuator recognition, digraphs included.
    fn punctuator(&mut self) -> Result<TokenKind> {
        use TokenKind::*;

        let Some(ch) = self.reader.bump() else {
            return Err(self.err(ErrorKind::UnrecognizedChar('\0')));
        };
        Ok(match ch {
            '[' => LeftBracket,
            ']' => RightBracket,
            '(' => LeftParen,
            ')' => RightParen,
            '{' => LeftBrace,
            '}' => RightBrace,
            '~' => BitNot,
            '?' => Question,
            ';' => Semi,
            ',' => Comma,
            '.' => {
                if self.reader.eat_str("..") {
                    Ellipsis
                } else {
                    Dot
                }
            }
            '-' => {
                if self.reader.eat('>') {
                    Arrow
                } else if self.reader.eat('-') {
                    Dec
                } else if self.reader.eat('=') {
                    SubAssign
                } else {
                    Minus
                }
            }
            '+' => {
                if self.reader.eat('+') {
                    Inc
                } else if self.reader.eat('=') {
                    AddAssign
                } else {
                    Plus
                }
            }
            '&' => {
                if self.reader.eat('&') {
                    And
                } else if self.reader.eat('=') {
                    AndAssign
                } else {
                    BitAnd
                }
            }
            '*' => {
                if self.reader.eat('=') {
                    MulAssign
                } else {
                    Star
                }
            }
            '!' => {
                if self.reader.eat('=') {
                    NotEqual
                } else {
                    Not
                }
            }
            '/' => {
                // Comments were taken by skip_trivia.
                if self.reader.eat('=') {
                    DivAssign
                } else {
                    Div
                }
            }
            '%' => {
                if self.reader.eat('=') {
                    RemAssign
                } else if self.reader.eat('>') {
                    RightBrace
                } else if self.reader.eat(':') {
                    if self.reader.eat_str("%:") {
                        HashHash
                    } else {
                        Hash
                    }
                } else {
                    Rem
                }
            }
            '<' => {
                if self.reader.eat('<') {
                    if self.reader.eat('=') {
                        ShlAssign
                    } else {
                        ShiftLeft
                    }
                } else if self.reader.eat('=') {
                    LessEqual
                } else if self.reader.eat(':') {
                    LeftBracket
                } else if self.reader.eat('%') {
                    LeftBrace
                } else {
                    Less
                }
            }
            '>' => {
                if self.reader.eat('>') {
                    if self.reader.eat('=') {
                        ShrAssign
                    } else {
                        ShiftRight
                    }
                } else if self.reader.eat('=') {
                    GreaterEqual
                } else {
                    Greater
                }
            }
            '=' => {
                if self.reader.eat('=') {
                    EqualEqual
                } else {
                    Assign
                }
            }
            '^' => {
                if self.reader.eat('=') {
                    XorAssign
                } else {
                    BitXor
                }
            }
            '|' => {
                if self.reader.eat('|') {
                    Or
                } else if self.reader.eat('=') {
                    OrAssign
                } else {
                    BitOr
                }
            }
            ':' => {
                if self.reader.eat('>') {
                    RightBracket
                } else {
                    Colon
                }
            }
            '#' => {
                if self.reader.eat('#') {
                    HashHash
                } else {
                    Hash
                }
            }
            other => return Err(self.err(ErrorKind::UnrecognizedChar(other))),
        })
    }
}
