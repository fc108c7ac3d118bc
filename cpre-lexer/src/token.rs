//! The preprocessing-token model, plus the two token-level operators the
//! expansion engine builds on: stringizing (`#`) and pasting (`##`).

use std::fmt;

use bitflags::bitflags;
use cpre_foundation::errors::{Error, ErrorKind, Result, Site};
use cpre_foundation::source::SourceReader;

use crate::lexer::Lexer;

/// Passes all punctuator kinds as a sequence of `Kind = "spelling",` into the
/// provided macro.
macro_rules! expand_punctuators {
    ($x:path) => {
        $x! {
            LeftBracket  = "[",
            RightBracket = "]",
            LeftParen    = "(",
            RightParen   = ")",
            LeftBrace    = "{",
            RightBrace   = "}",
            Dot          = ".",
            Arrow        = "->",
            Inc          = "++",
            Dec          = "--",
            BitAnd       = "&",
            Star         = "*",
            Plus         = "+",
            Minus        = "-",
            BitNot       = "~",
            Not          = "!",
            Div          = "/",
            Rem          = "%",
            ShiftLeft    = "<<",
            ShiftRight   = ">>",
            Less         = "<",
            Greater      = ">",
            LessEqual    = "<=",
            GreaterEqual = ">=",
            EqualEqual   = "==",
            NotEqual     = "!=",
            BitXor       = "^",
            BitOr        = "|",
            And          = "&&",
            Or           = "||",
            Question     = "?",
            Colon        = ":",
            Semi         = ";",
            Ellipsis     = "...",
            Assign       = "=",
            MulAssign    = "*=",
            DivAssign    = "/=",
            RemAssign    = "%=",
            AddAssign    = "+=",
            SubAssign    = "-=",
            ShlAssign    = "<<=",
            ShrAssign    = ">>=",
            AndAssign    = "&=",
            XorAssign    = "^=",
            OrAssign     = "|=",
            Comma        = ",",
            Hash         = "#",
            HashHash     = "##",
        }
    };
}

macro_rules! token_kind_enum {
    ($($name:ident = $spelling:tt),* $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum TokenKind {
            /// Identifier (or keyword, but the preprocessor does not care).
            Identifier,
            /// Preprocessing number; a superset of integer and floating
            /// constants.
            PpNumber,
            /// Character constant, `L` prefix included in the spelling.
            CharConst,
            /// String literal, `L` prefix included in the spelling.
            StringLit,
            /// `"..."` operand of `#include`. Never escapes the directive
            /// handler.
            QuotedHeaderName,
            /// `<...>` operand of `#include`. Never escapes the directive
            /// handler.
            AngledHeaderName,
            $($name,)*
            /// Empty token standing in for an empty `##` operand.
            Placemarker,
        }
    };
}

expand_punctuators!(token_kind_enum);

macro_rules! punctuator_spelling {
    ($($name:ident = $spelling:tt),* $(,)?) => {
        impl TokenKind {
            /// The fixed spelling of punctuator kinds; `None` for kinds that
            /// carry their spelling on the token.
            pub const fn punctuator_spelling(self) -> Option<&'static str> {
                match self {
                    $(TokenKind::$name => Some($spelling),)*
                    _ => None,
                }
            }
        }
    };
}

expand_punctuators!(punctuator_spelling);

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TokenFlags: u8 {
        /// At least one whitespace character preceded this token on its line.
        const LWHITE = 1 << 0;
        /// At least one newline preceded this token.
        const LNEW = 1 << 1;
        /// First real token on its logical line; a `#` carrying this flag
        /// introduces a directive.
        const DIRECTIVE = 1 << 2;
        /// Painted unexpandable during rescan; sticks for good.
        const NO_EXPAND = 1 << 3;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Owned spelling for identifiers, numbers, literals and header names;
    /// empty for punctuators and placemarkers. Literal spellings keep their
    /// quotes and any `L` prefix; escapes stay textual.
    pub text: String,
    pub flags: TokenFlags,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            flags: TokenFlags::empty(),
        }
    }

    pub fn punct(kind: TokenKind) -> Self {
        Self::new(kind, "")
    }

    pub fn placemarker() -> Self {
        Self::new(TokenKind::Placemarker, "")
    }

    pub fn spelling(&self) -> &str {
        self.kind.punctuator_spelling().unwrap_or(&self.text)
    }

    pub fn is_identifier(&self, name: &str) -> bool {
        self.kind == TokenKind::Identifier && self.text == name
    }
}

/// Renders the token in the standalone output format: one newline if `LNEW`
/// is set, then one space if `LWHITE` is set, then the spelling. This is the
/// minimum whitespace a C parser needs to re-tokenize the stream.
impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.flags.contains(TokenFlags::LNEW) {
            f.write_str("\n")?;
        }
        if self.flags.contains(TokenFlags::LWHITE) {
            f.write_str(" ")?;
        }
        f.write_str(self.spelling())
    }
}

/// The `#` operator: turn a raw actual-argument token list into a single
/// string literal. Gaps of one or more whitespace characters between tokens
/// become exactly one space, leading and trailing whitespace is dropped, and
/// inside literal spellings every `\` and `"` is preceded by a `\`.
pub fn stringize(tokens: &[Token]) -> Token {
    let mut text = String::from("\"");
    for (i, token) in tokens.iter().enumerate() {
        if i > 0
            && token
                .flags
                .intersects(TokenFlags::LNEW | TokenFlags::LWHITE)
        {
            text.push(' ');
        }
        match token.kind {
            TokenKind::CharConst | TokenKind::StringLit => {
                for ch in token.text.chars() {
                    if ch == '\\' || ch == '"' {
                        text.push('\\');
                    }
                    text.push(ch);
                }
            }
            _ => text.push_str(token.spelling()),
        }
    }
    text.push('"');
    Token::new(TokenKind::StringLit, text)
}

/// The `##` operator: concatenate two spellings and re-lex the result as a
/// single token. Placemarkers are the identity. Anything that re-lexes into
/// more than one token is a paste failure.
pub fn glue(left: &Token, right: &Token, site: Site) -> Result<Token> {
    if left.kind == TokenKind::Placemarker && right.kind == TokenKind::Placemarker {
        return Ok(Token::placemarker());
    }
    if left.kind == TokenKind::Placemarker {
        return Ok(right.clone());
    }
    if right.kind == TokenKind::Placemarker {
        return Ok(left.clone());
    }

    let combined = format!("{}{}", left.spelling(), right.spelling());
    let paste_failed = || Error::new(site.clone(), ErrorKind::PasteFailure(combined.clone()));

    let mut lexer = Lexer::new(SourceReader::from_string("<paste>", combined.as_str()));
    let mut result = match lexer.next(false) {
        Ok(Some(token)) => token,
        _ => return Err(paste_failed()),
    };
    match lexer.next(false) {
        Ok(None) => {}
        _ => return Err(paste_failed()),
    }
    result.flags = left.flags & (TokenFlags::LWHITE | TokenFlags::LNEW);
    Ok(result)
}
