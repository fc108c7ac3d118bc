//! The macro expansion engine: actual-argument capture, substitution with
//! `#` and `##`, and pre-expansion of actuals in a child context.

use cpre_foundation::errors::{ErrorKind, Result};
use cpre_lexer::token::{glue, stringize, Token, TokenFlags, TokenKind};
use tracing::trace;

use crate::macros::{Macro, Replace};
use crate::Preprocessor;

impl Preprocessor {
    /// Expand one invocation of `definition` and push the result for rescan.
    /// Returns `false` when a function-like name is not followed by `(`, in
    /// which case nothing is consumed and the name stays a plain identifier.
    pub(crate) fn try_expand(&mut self, definition: &Macro) -> Result<bool> {
        let actuals = if definition.function_like {
            let has_lparen = matches!(
                self.peek()?,
                Some(token) if token.kind == TokenKind::LeftParen
            );
            if !has_lparen {
                return Ok(false);
            }
            self.read()?;
            self.capture_actuals(definition)?
        } else {
            Vec::new()
        };
        trace!(name = %definition.name, "expanding macro");
        let expansion = self.substitute(definition, &actuals)?;
        self.push_list_frame(Some(definition.name.clone()), expansion);
        Ok(true)
    }

    /// Capture the actual arguments after the opening `(`, one raw token
    /// list per formal. Commas at nesting depth one separate actuals except
    /// inside the variadic tail; newlines in the argument list are ordinary
    /// whitespace.
    fn capture_actuals(&mut self, definition: &Macro) -> Result<Vec<Vec<Token>>> {
        if definition.formals.is_empty() {
            return match self.read()? {
                Some(token) if token.kind == TokenKind::RightParen => Ok(Vec::new()),
                _ => Err(self.error(ErrorKind::ArityMismatch(
                    "non-empty actual parameters for zero parameter macro".into(),
                ))),
            };
        }

        let mut actuals: Vec<Vec<Token>> = vec![Vec::new()];
        let mut paren_nest = 1usize;
        loop {
            let Some(mut token) = self.read()? else {
                return Err(self.error(ErrorKind::ArityMismatch(
                    "unexpected end of actual parameters".into(),
                )));
            };
            // Arguments may span lines; fold the line structure away.
            if token.flags.contains(TokenFlags::LNEW) {
                token.flags.remove(TokenFlags::LNEW | TokenFlags::DIRECTIVE);
                token.flags.insert(TokenFlags::LWHITE);
            }

            match token.kind {
                TokenKind::Comma
                    if paren_nest == 1
                        && !(definition.has_varargs
                            && actuals.len() == definition.formals.len()) =>
                {
                    if actuals.len() >= definition.formals.len() {
                        return Err(self.error(ErrorKind::ArityMismatch(
                            "too many actual parameters".into(),
                        )));
                    }
                    actuals.push(Vec::new());
                }
                TokenKind::LeftParen => {
                    paren_nest += 1;
                    let last = actuals.len() - 1;
                    actuals[last].push(token);
                }
                TokenKind::RightParen => {
                    paren_nest -= 1;
                    if paren_nest == 0 {
                        if actuals.len() < definition.formals.len() {
                            return Err(self.error(ErrorKind::ArityMismatch(
                                "too few actual parameters".into(),
                            )));
                        }
                        return Ok(actuals);
                    }
                    let last = actuals.len() - 1;
                    actuals[last].push(token);
                }
                _ => {
                    let last = actuals.len() - 1;
                    actuals[last].push(token);
                }
            }
        }
    }

    /// Walk the replacement list and produce the expansion, evaluating `##`
    /// left to right as tokens are produced.
    fn substitute(&mut self, definition: &Macro, actuals: &[Vec<Token>]) -> Result<Vec<Token>> {
        let mut expansion: Vec<Token> = Vec::new();
        let mut glue_next = false;

        for entry in &definition.replacement {
            let produced: Vec<Token> = match entry {
                Replace::Glue => {
                    glue_next = true;
                    continue;
                }
                Replace::Token(token) => vec![token.clone()],
                Replace::Stringize { index } => vec![stringize(&actuals[*index])],
                Replace::Raw { index } => {
                    let actual = &actuals[*index];
                    if actual.is_empty() {
                        vec![Token::placemarker()]
                    } else {
                        actual.clone()
                    }
                }
                Replace::Expanded { index, lwhite } => {
                    let mut tokens = self.expand_list(actuals[*index].clone())?;
                    // The first token takes the spacing the formal had in
                    // the replacement list.
                    if let Some(first) = tokens.first_mut() {
                        first.flags.set(TokenFlags::LWHITE, *lwhite);
                    }
                    tokens
                }
            };

            let mut produced = produced.into_iter();
            if glue_next {
                glue_next = false;
                if let Some(first) = produced.next() {
                    // A `##` operand always produces at least one token
                    // (a placemarker when the actual is empty), so there is
                    // a left operand to take.
                    let left = expansion.pop().expect("`##` must have a left operand");
                    let pasted = glue(&left, &first, self.current_site())?;
                    expansion.push(pasted);
                }
            }
            expansion.extend(produced);
        }

        Ok(expansion)
    }

    /// Fully macro-expand a token list in a transient child context sharing
    /// this context's macro table. Used for `PARAM_EXP` actuals and for
    /// `#if` expressions.
    pub(crate) fn expand_list(&mut self, tokens: Vec<Token>) -> Result<Vec<Token>> {
        self.with_child(|child| {
            child.push_list_frame(None, tokens);
            let mut expanded = Vec::new();
            while let Some(token) = child.next()? {
                expanded.push(token);
            }
            Ok(expanded)
        })
    }
}
