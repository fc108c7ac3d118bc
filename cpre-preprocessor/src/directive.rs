//! The directive handler: `#define`, `#undef`, `#include` and conditional
//! inclusion. Reached from the rescan loop whenever a `#` whose `DIRECTIVE`
//! flag is set comes off a frame.

use std::path::{Path, PathBuf};

use cpre_foundation::errors::{Error, ErrorKind, Result};
use cpre_foundation::source::SourceReader;
use cpre_lexer::lexer::Lexer;
use cpre_lexer::token::{Token, TokenFlags, TokenKind};
use tracing::trace;

use crate::macros::{Macro, Replace};
use crate::{builtin, cexpr, Cond, Frame, Preprocessor};

/// Where a conditional skip stopped.
enum SkipStop {
    Elif,
    Else,
    Endif,
}

impl Preprocessor {
    pub(crate) fn handle_directive(&mut self) -> Result<()> {
        // An empty `#` is a no-op.
        let Some(name) = self.readline()? else {
            return Ok(());
        };
        if name.kind != TokenKind::Identifier {
            return Err(self.error(ErrorKind::DirectiveSyntax(
                "preprocessing directive must be an identifier".into(),
            )));
        }

        match name.text.as_str() {
            "define" => self.dir_define(),
            "undef" => self.dir_undef(),
            "include" => self.dir_include(),
            "if" => {
                let live = self.read_condition()?;
                self.dir_if(live)
            }
            "ifdef" => {
                let live = self.read_defined_name()?;
                self.dir_if(live)
            }
            "ifndef" => {
                let live = !self.read_defined_name()?;
                self.dir_if(live)
            }
            "elif" | "else" => self.dir_else(),
            "endif" => self.dir_endif(),
            _ => Err(self.error(ErrorKind::DirectiveSyntax(format!(
                "unknown preprocessing directive `#{}`",
                name.text
            )))),
        }
    }

    fn dir_define(&mut self) -> Result<()> {
        let name = match self.readline()? {
            Some(token) if token.kind == TokenKind::Identifier => token,
            _ => {
                return Err(self.error(ErrorKind::DirectiveSyntax(
                    "macro name must be an identifier".into(),
                )))
            }
        };

        let mut definition = Macro::object_like(name.text);

        // A `(` immediately after the name, without whitespace, makes the
        // macro function-like; with whitespace it opens the replacement.
        let first = self.readline()?;
        match first {
            Some(token)
                if token.kind == TokenKind::LeftParen
                    && !token.flags.contains(TokenFlags::LWHITE) =>
            {
                definition.function_like = true;
                self.capture_formals(&mut definition)?;
                let first = self.readline()?;
                self.capture_replacement(first, &mut definition)?;
            }
            first => self.capture_replacement(first, &mut definition)?,
        }

        trace!(name = %definition.name, "defined macro");
        self.macros.insert(definition);
        Ok(())
    }

    /// Formal parameters: identifiers separated by commas, closed by `)`;
    /// a trailing `...` becomes the synthetic formal `__VA_ARGS__`.
    fn capture_formals(&mut self, definition: &mut Macro) -> Result<()> {
        loop {
            let Some(token) = self.readline()? else {
                return Err(self.error(ErrorKind::DirectiveSyntax(
                    "unexpected end of formal parameters".into(),
                )));
            };
            let formal = match token.kind {
                TokenKind::RightParen => return Ok(()),
                TokenKind::Ellipsis => {
                    definition.has_varargs = true;
                    "__VA_ARGS__".to_owned()
                }
                TokenKind::Identifier => token.text,
                _ => {
                    return Err(self.error(ErrorKind::DirectiveSyntax(
                        "invalid token in formal parameter list".into(),
                    )))
                }
            };
            if definition.formals.contains(&formal) {
                return Err(self.error(ErrorKind::DirectiveSyntax(
                    "duplicate formal parameter name".into(),
                )));
            }
            definition.formals.push(formal);

            let Some(token) = self.readline()? else {
                return Err(self.error(ErrorKind::DirectiveSyntax(
                    "unexpected end of formal parameters".into(),
                )));
            };
            match token.kind {
                TokenKind::RightParen => return Ok(()),
                TokenKind::Comma => {
                    if definition.has_varargs {
                        return Err(self.error(ErrorKind::DirectiveSyntax(
                            "variable arguments must be the last formal parameter of a macro"
                                .into(),
                        )));
                    }
                }
                _ => {
                    return Err(self.error(ErrorKind::DirectiveSyntax(
                        "invalid token in formal parameter list".into(),
                    )))
                }
            }
        }
    }

    /// The rest of the logical line becomes the replacement list. `#` before
    /// a formal stringizes, formals substitute expanded, and `##` inserts a
    /// glue entry whose neighbours substitute raw.
    fn capture_replacement(
        &mut self,
        mut token: Option<Token>,
        definition: &mut Macro,
    ) -> Result<()> {
        let mut glue_next = false;

        while let Some(current) = token {
            match current.kind {
                TokenKind::HashHash => {
                    if definition.replacement.is_empty() {
                        return Err(self.error(ErrorKind::DirectiveSyntax(
                            "`##` must not be the first token of a replacement list".into(),
                        )));
                    }
                    // The left operand must not be pre-expanded.
                    if let Some(entry) = definition.replacement.last_mut() {
                        if let Replace::Expanded { index, .. } = *entry {
                            *entry = Replace::Raw { index };
                        }
                    }
                    glue_next = true;
                    definition.replacement.push(Replace::Glue);
                }
                TokenKind::Hash if definition.function_like => {
                    let operand = self.readline()?;
                    let index = operand
                        .as_ref()
                        .and_then(|operand| definition.formal_index(operand));
                    let Some(index) = index else {
                        return Err(self.error(ErrorKind::DirectiveSyntax(
                            "`#` must be followed by a formal parameter name".into(),
                        )));
                    };
                    definition.replacement.push(Replace::Stringize { index });
                    glue_next = false;
                }
                _ => {
                    match definition.formal_index(&current) {
                        Some(index) if glue_next => {
                            definition.replacement.push(Replace::Raw { index });
                        }
                        Some(index) => {
                            let lwhite = current.flags.contains(TokenFlags::LWHITE);
                            definition
                                .replacement
                                .push(Replace::Expanded { index, lwhite });
                        }
                        None => definition.replacement.push(Replace::Token(current)),
                    }
                    glue_next = false;
                }
            }
            token = self.readline()?;
        }

        if glue_next {
            return Err(self.error(ErrorKind::DirectiveSyntax(
                "`##` must not be the last token in a replacement list".into(),
            )));
        }
        Ok(())
    }

    fn dir_undef(&mut self) -> Result<()> {
        let name = match self.readline()? {
            Some(token) if token.kind == TokenKind::Identifier => token,
            _ => {
                return Err(self.error(ErrorKind::DirectiveSyntax(
                    "macro name must be an identifier".into(),
                )))
            }
        };
        trace!(name = %name.text, "undefined macro");
        self.macros.remove(&name.text);
        Ok(())
    }

    /// `#if`/`#ifdef`/`#ifndef` with the condition already evaluated: keep
    /// the live branch, or skip forward re-testing `#elif` conditions until
    /// a branch goes live or the matching `#endif` closes the whole thing.
    fn dir_if(&mut self, mut live: bool) -> Result<()> {
        self.push_cond(Cond::If)?;
        loop {
            trace!(live, "conditional branch");
            if live {
                return Ok(());
            }
            match self.skip_cond(true)? {
                SkipStop::Else => {
                    // The else of a skipped branch always runs.
                    self.set_top_cond(Cond::Else);
                    return Ok(());
                }
                SkipStop::Elif => {
                    self.set_top_cond(Cond::Elif);
                    live = self.read_condition()?;
                }
                SkipStop::Endif => {
                    self.pop_cond();
                    return Ok(());
                }
            }
        }
    }

    /// `#elif` or `#else` reached from a live branch: the branch ends here,
    /// so skip to the matching `#endif`.
    fn dir_else(&mut self) -> Result<()> {
        match self.pop_cond() {
            Some(Cond::If | Cond::Elif) => {}
            _ => {
                return Err(self.error(ErrorKind::ConditionalImbalance(
                    "unexpected `#else` or `#elif`".into(),
                )))
            }
        }
        self.skip_cond(false)?;
        Ok(())
    }

    fn dir_endif(&mut self) -> Result<()> {
        if self.pop_cond().is_none() {
            return Err(self.error(ErrorKind::ConditionalImbalance(
                "unexpected `#endif`".into(),
            )));
        }
        Ok(())
    }

    /// Skip a dead region reading raw tokens, tracking `#if`/`#endif`
    /// nesting. With `want_else_elif`, an `#elif` or `#else` at depth one
    /// stops the skip; otherwise only the matching `#endif` does.
    fn skip_cond(&mut self, want_else_elif: bool) -> Result<SkipStop> {
        let unterminated = |pp: &Self| {
            pp.error(ErrorKind::ConditionalImbalance(
                "unterminated conditional inclusion".into(),
            ))
        };

        let mut depth = 1usize;
        let mut pending: Option<Token> = None;
        while depth > 0 {
            let token = match pending.take() {
                Some(token) => token,
                None => match self.read_raw_top()? {
                    Some(token) => token,
                    None => return Err(unterminated(self)),
                },
            };
            if token.kind != TokenKind::Hash || !token.flags.contains(TokenFlags::DIRECTIVE) {
                continue;
            }

            let Some(name) = self.read_raw_top()? else {
                return Err(unterminated(self));
            };
            if name.flags.contains(TokenFlags::LNEW) {
                // The `#` had no directive name; what we read opens the next
                // line and must be reconsidered.
                pending = Some(name);
                continue;
            }
            if name.kind != TokenKind::Identifier {
                continue;
            }
            match name.text.as_str() {
                "else" if depth == 1 && want_else_elif => return Ok(SkipStop::Else),
                "elif" if depth == 1 && want_else_elif => return Ok(SkipStop::Elif),
                "if" | "ifdef" | "ifndef" => depth += 1,
                "endif" => depth -= 1,
                _ => {}
            }
        }
        Ok(SkipStop::Endif)
    }

    /// `#ifdef`/`#ifndef` operand: is the name a built-in or user macro?
    fn read_defined_name(&mut self) -> Result<bool> {
        let name = match self.readline()? {
            Some(token) if token.kind == TokenKind::Identifier => token,
            _ => {
                return Err(self.error(ErrorKind::DirectiveSyntax(
                    "#ifdef and #ifndef must be followed by a macro name".into(),
                )))
            }
        };
        Ok(builtin::find(&name.text).is_some() || self.macros.contains(&name.text))
    }

    /// Read and evaluate an `#if`/`#elif` condition: rewrite `defined`
    /// before expansion, macro-expand the rest in a child context, turn
    /// surviving identifiers into `0`, and evaluate.
    fn read_condition(&mut self) -> Result<bool> {
        let malformed = |pp: &Self| {
            pp.error(ErrorKind::DirectiveSyntax(
                "missing or malformed operand of `defined`".into(),
            ))
        };

        let mut tokens = Vec::new();
        while let Some(token) = self.readline()? {
            if !token.is_identifier("defined") {
                tokens.push(token);
                continue;
            }

            let Some(operand) = self.readline()? else {
                return Err(malformed(self));
            };
            let want_paren = operand.kind == TokenKind::LeftParen;
            let name = if want_paren {
                match self.readline()? {
                    Some(token) => token,
                    None => return Err(malformed(self)),
                }
            } else {
                operand
            };
            if name.kind != TokenKind::Identifier {
                return Err(malformed(self));
            }
            let defined =
                builtin::find(&name.text).is_some() || self.macros.contains(&name.text);
            tokens.push(Token::new(
                TokenKind::PpNumber,
                if defined { "1" } else { "0" },
            ));
            if want_paren {
                match self.readline()? {
                    Some(token) if token.kind == TokenKind::RightParen => {}
                    _ => return Err(malformed(self)),
                }
            }
        }

        let site = self.current_site();
        let expanded: Vec<Token> = self
            .expand_list(tokens)?
            .into_iter()
            .map(|token| {
                if token.kind == TokenKind::Identifier {
                    Token::new(TokenKind::PpNumber, "0")
                } else {
                    token
                }
            })
            .collect();

        let value = cexpr::eval(&site, &expanded)?;
        trace!(value, "evaluated #if condition");
        Ok(value != 0)
    }

    /// `#include`: read the operand in header-name mode, locate the header,
    /// and push it as a new lexer frame.
    fn dir_include(&mut self) -> Result<()> {
        self.header_name = true;
        let header = self.readline();
        self.header_name = false;
        let Some(header) = header? else {
            return Err(self.error(ErrorKind::IncludeFailure(
                "missing header name in `#include`".into(),
            )));
        };
        // Cite the include line itself, and clear the rest of it before the
        // new frame goes on top.
        let site = self.current_site();
        while self.readline()?.is_some() {}

        let lexer = match header.kind {
            TokenKind::AngledHeaderName => {
                let name = trim_delimiters(&header.text);
                self.open_system_header(name).ok_or_else(|| {
                    Error::new(
                        site.clone(),
                        ErrorKind::IncludeFailure(format!("cannot locate header file: {name}")),
                    )
                })?
            }
            TokenKind::QuotedHeaderName => {
                let name = trim_delimiters(&header.text);
                self.open_local_header(name).ok_or_else(|| {
                    Error::new(
                        site.clone(),
                        ErrorKind::IncludeFailure(format!("cannot locate header file: {name}")),
                    )
                })?
            }
            _ => {
                return Err(Error::new(
                    site,
                    ErrorKind::IncludeFailure("invalid header name".into()),
                ))
            }
        };
        trace!(header = lexer.filename(), "entering include");
        self.push_lexer_frame(lexer);
        Ok(())
    }

    /// Angle-bracket search: the configured directory list, in order.
    fn open_system_header(&self, name: &str) -> Option<Lexer> {
        for dir in &self.search_dirs {
            if let Ok(reader) = SourceReader::from_file(&dir.join(name)) {
                return Some(Lexer::new(reader));
            }
        }
        None
    }

    /// Quote search: the including file's directory first, then the
    /// angle-bracket path.
    fn open_local_header(&self, name: &str) -> Option<Lexer> {
        let local_dir = self.frames.iter().rev().find_map(|frame| match frame {
            Frame::Lexer { lexer, .. } => {
                Path::new(lexer.filename()).parent().map(PathBuf::from)
            }
            _ => None,
        });
        if let Some(dir) = local_dir {
            if let Ok(reader) = SourceReader::from_file(&dir.join(name)) {
                return Some(Lexer::new(reader));
            }
        }
        self.open_system_header(name)
    }
}

fn trim_delimiters(text: &str) -> &str {
    &text[1..text.len() - 1]
}
