//! The `#if` constant-expression evaluator.
//!
//! No AST is built; a hybrid recursive-descent / operator-precedence parser
//! evaluates as it goes. Arithmetic is signed 64-bit with wrapping
//! semantics, and division or modulus by zero is fatal. By the time tokens
//! reach this module, `defined` has been rewritten and every surviving
//! identifier replaced by `0`.

use std::iter::Peekable;
use std::str::Chars;

use cpre_foundation::errors::{Error, ErrorKind, Result, Site};
use cpre_lexer::token::{Token, TokenKind};

pub(crate) fn eval(site: &Site, tokens: &[Token]) -> Result<i64> {
    let mut parser = Parser {
        site,
        tokens,
        pos: 0,
    };
    let value = parser.conditional()?;
    if parser.pos != tokens.len() {
        return Err(parser.error("invalid constant expression"));
    }
    Ok(value)
}

struct Parser<'a> {
    site: &'a Site,
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, message: &str) -> Error {
        Error::new(self.site.clone(), ErrorKind::Expression(message.into()))
    }

    fn peek(&self) -> Option<TokenKind> {
        self.tokens.get(self.pos).map(|token| token.kind)
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn take(&mut self, kind: TokenKind) -> Option<&'a Token> {
        match self.tokens.get(self.pos) {
            Some(token) if token.kind == kind => {
                self.pos += 1;
                Some(token)
            }
            _ => None,
        }
    }

    fn unary(&mut self) -> Result<i64> {
        if self.eat(TokenKind::LeftParen) {
            let value = self.conditional()?;
            if !self.eat(TokenKind::RightParen) {
                return Err(self.error("missing `)`"));
            }
            return Ok(value);
        }
        if let Some(token) = self.take(TokenKind::PpNumber) {
            return self.number(token);
        }
        if let Some(token) = self.take(TokenKind::CharConst) {
            return self.char_const(token);
        }
        if self.eat(TokenKind::Plus) {
            return self.unary();
        }
        if self.eat(TokenKind::Minus) {
            return Ok(self.unary()?.wrapping_neg());
        }
        if self.eat(TokenKind::BitNot) {
            return Ok(!self.unary()?);
        }
        if self.eat(TokenKind::Not) {
            return Ok((self.unary()? == 0) as i64);
        }
        Err(self.error("invalid unary expression"))
    }

    fn precedence(kind: TokenKind) -> Option<u8> {
        use TokenKind::*;
        Some(match kind {
            Star | Div | Rem => 9,
            Plus | Minus => 8,
            ShiftLeft | ShiftRight => 7,
            Less | Greater | LessEqual | GreaterEqual => 6,
            EqualEqual | NotEqual => 5,
            BitAnd => 4,
            BitXor => 3,
            BitOr => 2,
            And => 1,
            Or => 0,
            _ => return None,
        })
    }

    fn binary(&mut self, mut lhs: i64, min_precedence: u8) -> Result<i64> {
        loop {
            let Some(op) = self.peek() else {
                return Ok(lhs);
            };
            let Some(precedence) = Self::precedence(op) else {
                return Ok(lhs);
            };
            if precedence < min_precedence {
                return Ok(lhs);
            }
            self.pos += 1;
            let mut rhs = self.unary()?;
            // Let tighter-binding operators take the right-hand side first.
            while let Some(next) = self.peek().and_then(Self::precedence) {
                if next <= precedence {
                    break;
                }
                rhs = self.binary(rhs, next)?;
            }
            lhs = self.apply(op, lhs, rhs)?;
        }
    }

    fn apply(&self, op: TokenKind, lhs: i64, rhs: i64) -> Result<i64> {
        use TokenKind::*;
        Ok(match op {
            Star => lhs.wrapping_mul(rhs),
            Div => {
                if rhs == 0 {
                    return Err(self.error("division by zero in constant expression"));
                }
                lhs.wrapping_div(rhs)
            }
            Rem => {
                if rhs == 0 {
                    return Err(self.error("division by zero in constant expression"));
                }
                lhs.wrapping_rem(rhs)
            }
            Plus => lhs.wrapping_add(rhs),
            Minus => lhs.wrapping_sub(rhs),
            ShiftLeft => lhs.wrapping_shl(rhs as u32),
            ShiftRight => lhs.wrapping_shr(rhs as u32),
            Less => (lhs < rhs) as i64,
            Greater => (lhs > rhs) as i64,
            LessEqual => (lhs <= rhs) as i64,
            GreaterEqual => (lhs >= rhs) as i64,
            EqualEqual => (lhs == rhs) as i64,
            NotEqual => (lhs != rhs) as i64,
            BitAnd => lhs & rhs,
            BitXor => lhs ^ rhs,
            BitOr => lhs | rhs,
            And => (lhs != 0 && rhs != 0) as i64,
            Or => (lhs != 0 || rhs != 0) as i64,
            _ => unreachable!("not a binary operator"),
        })
    }

    /// `a ? b : c`, right-associative.
    fn conditional(&mut self) -> Result<i64> {
        let first = self.unary()?;
        let condition = self.binary(first, 0)?;
        if !self.eat(TokenKind::Question) {
            return Ok(condition);
        }
        let then = self.conditional()?;
        if !self.eat(TokenKind::Colon) {
            return Err(self.error("missing `:` in conditional expression"));
        }
        let otherwise = self.conditional()?;
        Ok(if condition != 0 { then } else { otherwise })
    }

    /// Integer constant: decimal, octal or hexadecimal, with an optional
    /// `[uU][lL]{0,2}` or `[lL]{1,2}[uU]?` suffix.
    fn number(&self, token: &Token) -> Result<i64> {
        let text = token.text.as_str();
        let mut value: i64 = 0;

        let suffix = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))
        {
            let end = hex
                .find(|ch: char| !ch.is_ascii_hexdigit())
                .unwrap_or(hex.len());
            for ch in hex[..end].chars() {
                let digit = ch.to_digit(16).expect("checked hex digit") as i64;
                value = value.wrapping_shl(4) | digit;
            }
            &hex[end..]
        } else if text.starts_with('0') {
            let end = text
                .find(|ch: char| !('0'..='7').contains(&ch))
                .unwrap_or(text.len());
            for ch in text[..end].chars() {
                let digit = (ch as u8 - b'0') as i64;
                value = value.wrapping_shl(3) | digit;
            }
            &text[end..]
        } else {
            let end = text
                .find(|ch: char| !ch.is_ascii_digit())
                .unwrap_or(text.len());
            for ch in text[..end].chars() {
                let digit = (ch as u8 - b'0') as i64;
                value = value.wrapping_mul(10).wrapping_add(digit);
            }
            &text[end..]
        };

        if !valid_suffix(suffix) {
            return Err(Error::new(self.site.clone(), ErrorKind::BadNumber));
        }
        Ok(value)
    }

    /// Character constant: standard escapes decoded, multi-character
    /// constants composed big-endian. An `L` prefix is accepted and makes
    /// no difference here.
    fn char_const(&self, token: &Token) -> Result<i64> {
        let bad = || Error::new(self.site.clone(), ErrorKind::BadCharConst);

        let body = token.text.strip_prefix('L').unwrap_or(&token.text);
        let mut chars = body.chars().peekable();
        if chars.next() != Some('\'') {
            return Err(bad());
        }

        let mut value: i64 = 0;
        let mut is_empty = true;
        loop {
            match chars.next() {
                None => return Err(bad()),
                Some('\'') => break,
                Some('\\') => {
                    value = value.wrapping_shl(8) | self.escape(&mut chars)?;
                    is_empty = false;
                }
                Some(ch) => {
                    value = value.wrapping_shl(8) | ch as i64;
                    is_empty = false;
                }
            }
        }
        if is_empty || chars.next().is_some() {
            return Err(bad());
        }
        Ok(value)
    }

    fn escape(&self, chars: &mut Peekable<Chars>) -> Result<i64> {
        Ok(match chars.next() {
            Some(ch @ ('\'' | '"' | '?' | '\\')) => ch as i64,
            Some('a') => 0x07,
            Some('b') => 0x08,
            Some('f') => 0x0c,
            Some('n') => 0x0a,
            Some('r') => 0x0d,
            Some('t') => 0x09,
            Some('v') => 0x0b,
            Some(first @ '0'..='7') => {
                // At most three octal digits.
                let mut value = (first as u8 - b'0') as i64;
                for _ in 0..2 {
                    match chars.peek().and_then(|ch| ch.to_digit(8)) {
                        Some(digit) => {
                            chars.next();
                            value = value << 3 | digit as i64;
                        }
                        None => break,
                    }
                }
                value
            }
            Some('x') => {
                let mut value: i64 = 0;
                while let Some(digit) = chars.peek().and_then(|ch| ch.to_digit(16)) {
                    chars.next();
                    value = value.wrapping_shl(4) | digit as i64;
                }
                value
            }
            _ => return Err(Error::new(self.site.clone(), ErrorKind::BadEscape)),
        })
    }
}

fn valid_suffix(suffix: &str) -> bool {
    if suffix.is_empty() {
        return true;
    }
    if let Some(rest) = suffix.strip_prefix(['u', 'U']) {
        return rest.len() <= 2 && rest.chars().all(|ch| matches!(ch, 'l' | 'L'));
    }
    let ells = suffix
        .chars()
        .take_while(|ch| matches!(ch, 'l' | 'L'))
        .count();
    if ells == 0 || ells > 2 {
        return false;
    }
    matches!(&suffix[ells..], "" | "u" | "U")
}

#[cfg(test)]
mod tests {
    use cpre_foundation::source::SourceReader;
    use cpre_lexer::lexer::Lexer;

    use super::*;

    fn eval_str(input: &str) -> Result<i64> {
        let mut lexer = Lexer::new(SourceReader::from_string("expr", input));
        let mut tokens = Vec::new();
        while let Some(token) = lexer.next(false).unwrap() {
            tokens.push(token);
        }
        eval(&Site::new("expr", 1), &tokens)
    }

    fn value(input: &str) -> i64 {
        eval_str(input).unwrap()
    }

    #[test]
    fn literals_and_radixes() {
        assert_eq!(value("42"), 42);
        assert_eq!(value("0x2A"), 42);
        assert_eq!(value("052"), 42);
        assert_eq!(value("0"), 0);
    }

    #[test]
    fn suffixes() {
        assert_eq!(value("42u"), 42);
        assert_eq!(value("42UL"), 42);
        assert_eq!(value("42llu"), 42);
        assert_eq!(value("42ll"), 42);
        assert_eq!(value("42lu"), 42);
        assert!(eval_str("42q").is_err());
        assert!(eval_str("42ulu").is_err());
        assert!(eval_str("42lll").is_err());
        assert!(eval_str("1.5").is_err());
        assert!(eval_str("09").is_err());
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(value("2 + 3 * 4"), 14);
        assert_eq!(value("(2 + 3) * 4"), 20);
        assert_eq!(value("10 - 4 - 3"), 3);
        assert_eq!(value("1 << 4 | 1"), 17);
        assert_eq!(value("8 / 2 / 2"), 2);
        assert_eq!(value("1 + 2 == 3 && 4 > 3"), 1);
    }

    #[test]
    fn unary_operators() {
        assert_eq!(value("-3 + 5"), 2);
        assert_eq!(value("!0"), 1);
        assert_eq!(value("!5"), 0);
        assert_eq!(value("~0"), -1);
        assert_eq!(value("+7"), 7);
        assert_eq!(value("- -3"), 3);
    }

    #[test]
    fn comparisons_and_logic() {
        assert_eq!(value("3 < 5"), 1);
        assert_eq!(value("5 <= 4"), 0);
        assert_eq!(value("1 && 0"), 0);
        assert_eq!(value("1 || 0"), 1);
        // Evaluation is eager; a doomed right-hand side is still an error.
        assert!(eval_str("0 && 1 / 0").is_err());
    }

    #[test]
    fn ternary_is_right_associative() {
        assert_eq!(value("1 ? 2 : 3"), 2);
        assert_eq!(value("0 ? 2 : 3"), 3);
        assert_eq!(value("1 ? 2 : 0 ? 3 : 4"), 2);
        assert_eq!(value("0 ? 2 : 0 ? 3 : 4"), 4);
    }

    #[test]
    fn character_constants() {
        assert_eq!(value("'A'"), 65);
        assert_eq!(value(r"'\n'"), 10);
        assert_eq!(value(r"'\x41'"), 65);
        assert_eq!(value(r"'\101'"), 65);
        assert_eq!(value(r"'\0'"), 0);
        assert_eq!(value("'ab'"), 0x6162);
        assert_eq!(value("L'x'"), 120);
        assert_eq!(value(r"'\''"), 39);
    }

    #[test]
    fn bad_character_constants() {
        assert!(eval_str("''").is_err());
        assert!(eval_str(r"'\q'").is_err());
    }

    #[test]
    fn division_by_zero() {
        assert!(eval_str("1 / 0").is_err());
        assert!(eval_str("1 % 0").is_err());
        assert_eq!(value("7 % 3"), 1);
    }

    #[test]
    fn wrapping_arithmetic() {
        assert_eq!(value("9223372036854775807 + 1"), i64::MIN);
        assert_eq!(value("-9223372036854775807 - 2"), i64::MAX);
    }

    #[test]
    fn trailing_tokens_are_rejected() {
        assert!(eval_str("1 2").is_err());
        assert!(eval_str("1 +").is_err());
        assert!(eval_str("(1").is_err());
        assert!(eval_str("1 ? 2").is_err());
        assert!(eval_str("").is_err());
    }
}
