//! A C99 preprocessor core.
//!
//! [`Preprocessor`] turns a root source file (or an in-memory string) plus
//! any headers it includes into the expanded preprocessing-token stream a C
//! parser consumes. Input is organized as a LIFO stack of frames: a lexer
//! frame per open file, a list frame per macro expansion awaiting rescan.
//! `#include` and macro expansion push frames; end-of-file and exhausted
//! expansions pop them.
//!
//! ```
//! use cpre_preprocessor::Preprocessor;
//!
//! let mut pp = Preprocessor::new();
//! pp.push_string("demo.c", "#define GREETING \"hi\"\nGREETING");
//! let mut out = String::new();
//! while let Some(token) = pp.next().unwrap() {
//!     out += &token.to_string();
//! }
//! assert_eq!(out.trim_start(), "\"hi\"");
//! ```

mod builtin;
mod cexpr;
mod directive;
mod expand;
mod macros;

use std::collections::VecDeque;
use std::mem;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use cpre_foundation::errors::ErrorKind;
use cpre_foundation::source::SourceReader;
use cpre_lexer::lexer::Lexer;
use tracing::trace;

use crate::macros::MacroTable;

pub use cpre_foundation::errors::{Error, Result, Site};
pub use cpre_lexer::token::{Token, TokenFlags, TokenKind};

/// One conditional-inclusion state; a stack of these is scoped to each lexer
/// frame and must be empty when the frame pops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cond {
    If,
    Elif,
    Else,
}

/// One element of the input stack: a live lexer or a buffered token list.
#[derive(Debug)]
pub(crate) enum Frame {
    Lexer {
        lexer: Lexer,
        /// Single-token lookahead slot used by [`Preprocessor::peek`].
        peeked: Option<Token>,
        conds: Vec<Cond>,
    },
    List {
        tokens: VecDeque<Token>,
        /// Name of the macro this frame was expanded from; that macro is
        /// disabled while the frame lives and re-enabled when it pops.
        source: Option<String>,
    },
}

pub struct Preprocessor {
    pub(crate) frames: Vec<Frame>,
    pub(crate) macros: MacroTable,
    pub(crate) search_dirs: Vec<PathBuf>,
    /// Translation start time, snapshotted once; feeds `__DATE__`/`__TIME__`.
    pub(crate) start_time: DateTime<Local>,
    /// While set, the lexer reads `#include` operands as header names.
    pub(crate) header_name: bool,
    /// Error and `__FILE__`/`__LINE__` site used when this stack holds no
    /// lexer frame (transient child contexts).
    pub(crate) fallback_site: Site,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Preprocessor {
    pub fn new() -> Self {
        Self {
            frames: Vec::new(),
            macros: MacroTable::default(),
            search_dirs: Vec::new(),
            start_time: Local::now(),
            header_name: false,
            fallback_site: Site::new("<no input>", 0),
        }
    }

    /// Append a directory to the angle-bracket header search list. The list
    /// is searched in insertion order; it is also the fallback for quoted
    /// includes.
    pub fn add_search_dir(&mut self, dir: impl Into<PathBuf>) {
        self.search_dirs.push(dir.into());
    }

    /// Open `path` and push it as a lexer frame.
    pub fn push_file(&mut self, path: &Path) -> Result<()> {
        let reader = SourceReader::from_file(path).map_err(|error| {
            self.error(ErrorKind::CharSource {
                path: path.display().to_string(),
                message: error.to_string(),
            })
        })?;
        self.push_lexer_frame(Lexer::new(reader));
        Ok(())
    }

    /// Push an in-memory buffer, named `filename` for diagnostics.
    pub fn push_string(&mut self, filename: &str, text: &str) {
        self.push_lexer_frame(Lexer::new(SourceReader::from_string(filename, text)));
    }

    /// The next fully preprocessed token, or `None` once all input is
    /// exhausted. Directives are applied and macros expanded on the way;
    /// neither header names nor placemarkers ever cross this boundary.
    pub fn next(&mut self) -> Result<Option<Token>> {
        loop {
            let Some(token) = self.read()? else {
                return Ok(None);
            };

            match token.kind {
                // Leftovers of `##` with an empty operand; drop them, but
                // let their spacing flow on.
                TokenKind::Placemarker => {
                    self.inherit_spacing(&token)?;
                }
                TokenKind::Hash if token.flags.contains(TokenFlags::DIRECTIVE) => {
                    self.handle_directive()?;
                }
                TokenKind::Identifier => {
                    if let Some(handler) = builtin::find(&token.text) {
                        handler(self);
                        self.inherit_spacing(&token)?;
                        continue;
                    }
                    if token.flags.contains(TokenFlags::NO_EXPAND) {
                        return Ok(Some(token));
                    }
                    match self.macros.get(&token.text).cloned() {
                        Some(definition) if definition.enabled => {
                            if self.try_expand(&definition)? {
                                self.inherit_spacing(&token)?;
                                continue;
                            }
                            // A function-like name without arguments is a
                            // plain identifier.
                            return Ok(Some(token));
                        }
                        Some(_) => {
                            // Disabled here means this occurrence can never
                            // expand, even after the macro is re-enabled.
                            let mut token = token;
                            token.flags |= TokenFlags::NO_EXPAND;
                            return Ok(Some(token));
                        }
                        None => return Ok(Some(token)),
                    }
                }
                _ => return Ok(Some(token)),
            }
        }
    }

    pub(crate) fn push_lexer_frame(&mut self, lexer: Lexer) {
        self.frames.push(Frame::Lexer {
            lexer,
            peeked: None,
            conds: Vec::new(),
        });
    }

    pub(crate) fn push_list_frame(&mut self, source: Option<String>, tokens: Vec<Token>) {
        if let Some(name) = &source {
            if let Some(definition) = self.macros.get_mut(name) {
                definition.enabled = false;
            }
        }
        self.frames.push(Frame::List {
            tokens: tokens.into(),
            source,
        });
    }

    fn pop_frame(&mut self) -> Result<()> {
        match self.frames.pop() {
            Some(Frame::Lexer { lexer, conds, .. }) => {
                if !conds.is_empty() {
                    return Err(Error::new(
                        lexer.site(),
                        ErrorKind::ConditionalImbalance(
                            "unterminated conditional inclusion".into(),
                        ),
                    ));
                }
                trace!(file = lexer.filename(), "leaving file");
            }
            Some(Frame::List {
                source: Some(name), ..
            }) => {
                if let Some(definition) = self.macros.get_mut(&name) {
                    definition.enabled = true;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// The next physical token off the frame stack, popping frames as they
    /// deplete. No directive handling, no expansion; everything sits on
    /// this.
    pub(crate) fn read(&mut self) -> Result<Option<Token>> {
        loop {
            let header_name = self.header_name;
            match self.frames.last_mut() {
                None => return Ok(None),
                Some(Frame::Lexer { lexer, peeked, .. }) => {
                    if let Some(token) = peeked.take() {
                        return Ok(Some(token));
                    }
                    if let Some(token) = lexer.next(header_name)? {
                        return Ok(Some(token));
                    }
                }
                Some(Frame::List { tokens, .. }) => {
                    if let Some(token) = tokens.pop_front() {
                        return Ok(Some(token));
                    }
                }
            }
            self.pop_frame()?;
        }
    }

    /// Index of the topmost frame that can currently yield a token, filling
    /// lexer lookahead slots on the way down. Exhausted frames are looked
    /// through, not popped.
    fn peek_index(&mut self) -> Result<Option<usize>> {
        let header_name = self.header_name;
        for index in (0..self.frames.len()).rev() {
            match &mut self.frames[index] {
                Frame::Lexer { lexer, peeked, .. } => {
                    if peeked.is_none() {
                        *peeked = lexer.next(header_name)?;
                    }
                    if peeked.is_some() {
                        return Ok(Some(index));
                    }
                }
                Frame::List { tokens, .. } => {
                    if !tokens.is_empty() {
                        return Ok(Some(index));
                    }
                }
            }
        }
        Ok(None)
    }

    /// Peek at the next physical token without consuming it.
    pub(crate) fn peek(&mut self) -> Result<Option<&mut Token>> {
        let Some(index) = self.peek_index()? else {
            return Ok(None);
        };
        Ok(match &mut self.frames[index] {
            Frame::Lexer { peeked, .. } => peeked.as_mut(),
            Frame::List { tokens, .. } => tokens.front_mut(),
        })
    }

    /// The next physical token unless it opens a new logical line; how
    /// directive handlers delimit their argument without pre-buffering.
    pub(crate) fn readline(&mut self) -> Result<Option<Token>> {
        let at_line_end = match self.peek()? {
            Some(token) => token.flags.contains(TokenFlags::LNEW),
            None => true,
        };
        if at_line_end {
            Ok(None)
        } else {
            self.read()
        }
    }

    /// Raw read for conditional skipping: list frames are drained through,
    /// but a lexer frame's end-of-file ends the walk (`None`) so an
    /// unterminated conditional cannot leak into the including file.
    pub(crate) fn read_raw_top(&mut self) -> Result<Option<Token>> {
        loop {
            match self.frames.last_mut() {
                None => return Ok(None),
                Some(Frame::Lexer { lexer, peeked, .. }) => {
                    if let Some(token) = peeked.take() {
                        return Ok(Some(token));
                    }
                    return lexer.next(false);
                }
                Some(Frame::List { tokens, .. }) => {
                    if let Some(token) = tokens.pop_front() {
                        return Ok(Some(token));
                    }
                }
            }
            self.pop_frame()?;
        }
    }

    /// The next stream token inherits the consumed token's spacing; this is
    /// how an expansion's first token (or, for an empty expansion, whatever
    /// follows) carries the invocation site's whitespace.
    pub(crate) fn inherit_spacing(&mut self, from: &Token) -> Result<()> {
        let spacing = from.flags & (TokenFlags::LNEW | TokenFlags::LWHITE);
        if let Some(next) = self.peek()? {
            next.flags.remove(TokenFlags::LNEW | TokenFlags::LWHITE);
            next.flags |= spacing;
        }
        Ok(())
    }

    /// `(filename, line)` of the innermost lexer frame, or the fallback site
    /// a child context was spawned with.
    pub(crate) fn current_site(&self) -> Site {
        for frame in self.frames.iter().rev() {
            if let Frame::Lexer { lexer, .. } = frame {
                return lexer.site();
            }
        }
        self.fallback_site.clone()
    }

    pub(crate) fn error(&self, kind: ErrorKind) -> Error {
        Error::new(self.current_site(), kind)
    }

    /// Run `f` over a transient child context that shares this context's
    /// macro table (moved in, moved back out) but owns its own frame stack.
    /// Used to pre-expand macro actuals and `#if` expressions.
    pub(crate) fn with_child<R>(
        &mut self,
        f: impl FnOnce(&mut Preprocessor) -> Result<R>,
    ) -> Result<R> {
        let mut child = Preprocessor {
            frames: Vec::new(),
            macros: mem::take(&mut self.macros),
            search_dirs: Vec::new(),
            start_time: self.start_time,
            header_name: false,
            fallback_site: self.current_site(),
        };
        let result = f(&mut child);
        self.macros = mem::take(&mut child.macros);
        result
    }

    pub(crate) fn push_cond(&mut self, cond: Cond) -> Result<()> {
        for frame in self.frames.iter_mut().rev() {
            if let Frame::Lexer { conds, .. } = frame {
                conds.push(cond);
                return Ok(());
            }
        }
        Err(self.error(ErrorKind::ConditionalImbalance(
            "conditional inclusion outside of a source file".into(),
        )))
    }

    pub(crate) fn pop_cond(&mut self) -> Option<Cond> {
        for frame in self.frames.iter_mut().rev() {
            if let Frame::Lexer { conds, .. } = frame {
                return conds.pop();
            }
        }
        None
    }

    pub(crate) fn set_top_cond(&mut self, cond: Cond) {
        for frame in self.frames.iter_mut().rev() {
            if let Frame::Lexer { conds, .. } = frame {
                if let Some(top) = conds.last_mut() {
                    *top = cond;
                }
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    /// Run the whole pipeline over an in-memory source and render the token
    /// stream in the standalone output format.
    fn preprocess(source: &str) -> String {
        let mut pp = Preprocessor::new();
        pp.push_string("test.c", source);
        let mut out = String::new();
        loop {
            match pp.next() {
                Ok(Some(token)) => out += &token.to_string(),
                Ok(None) => return out,
                Err(error) => panic!("unexpected error: {error}"),
            }
        }
    }

    fn preprocess_err(source: &str) -> Error {
        let mut pp = Preprocessor::new();
        pp.push_string("test.c", source);
        loop {
            match pp.next() {
                Ok(Some(_)) => {}
                Ok(None) => panic!("expected an error"),
                Err(error) => return error,
            }
        }
    }

    /// Whitespace-normalized view for multi-line expectations.
    fn words(source: &str) -> Vec<String> {
        preprocess(source)
            .split_whitespace()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn plain_tokens_pass_through() {
        assert_eq!(preprocess("int x = 42;").trim(), "int x = 42;");
    }

    #[test]
    fn object_like_expansion() {
        let source = indoc! {"
            #define N 100
            int a[N];
        "};
        assert_eq!(preprocess(source).trim(), "int a[100];");
    }

    #[test]
    fn empty_macro_erases_instances() {
        let source = indoc! {"
            #define NOTHING
            a NOTHING b
        "};
        assert_eq!(preprocess(source).trim(), "a b");
    }

    #[test]
    fn object_chain_reactivation_is_not_reexpansion() {
        // X -> Y -> Z -> X, and the final X is painted.
        let source = indoc! {"
            #define X Y
            #define Y Z
            #define Z X
            X
        "};
        assert_eq!(preprocess(source).trim(), "X");
    }

    #[test]
    fn function_like_substitution_c99_example() {
        // First line of C99 section 6.10.3.5, example 3.
        let source = indoc! {"
            #define x 3
            #define f(a) f(x * (a))
            #undef x
            #define x 2
            f(y+1)
        "};
        assert_eq!(preprocess(source).trim(), "f(2 * (y+1))");
    }

    #[test]
    fn hash_hash_forming_a_literal_hash_hash() {
        // The hash_hash example of C99 section 6.10.3.3.
        let source = indoc! {r##"
            #define hash_hash # ## #
            #define mkstr(a) # a
            #define in_between(a) mkstr(a)
            #define join(c, d) in_between(c hash_hash d)
            join(x, y)
        "##};
        assert_eq!(preprocess(source).trim(), r#""x ## y""#);
    }

    #[test]
    fn variadic_stringize() {
        // Commas inside the __VA_ARGS__ tail are retained.
        let source = indoc! {"
            #define showlist(...) puts(#__VA_ARGS__)
            showlist(The first, second, and third items.);
        "};
        assert_eq!(
            preprocess(source).trim(),
            r#"puts("The first, second, and third items.");"#
        );
    }

    #[test]
    fn conditional_skip_with_nested_if() {
        let source = indoc! {"
            #define A 1
            #if A
            yes
            #if 0
            nope
            #else
            still
            #endif
            #else
            skipped
            #endif
        "};
        assert_eq!(words(source), ["yes", "still"]);
    }

    #[test]
    fn include_search_order() {
        // The first hit in the configured directory list wins.
        let d1 = tempfile::tempdir().unwrap();
        let d2 = tempfile::tempdir().unwrap();
        std::fs::write(d1.path().join("h1.h"), "#define M 1\n").unwrap();
        std::fs::write(d2.path().join("h1.h"), "#define M 2\n").unwrap();

        let mut pp = Preprocessor::new();
        pp.add_search_dir(d1.path());
        pp.add_search_dir(d2.path());
        pp.push_string("test.c", "#include <h1.h>\nM\n");
        let mut out = String::new();
        while let Some(token) = pp.next().unwrap() {
            out += &token.to_string();
        }
        assert_eq!(out.trim(), "1");
    }

    #[test]
    fn quote_include_searches_the_including_directory_first() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("main.c");
        std::fs::write(&root, "#include \"local.h\"\nM\n").unwrap();
        std::fs::write(dir.path().join("local.h"), "#define M local\n").unwrap();

        let mut pp = Preprocessor::new();
        pp.push_file(&root).unwrap();
        let mut out = String::new();
        while let Some(token) = pp.next().unwrap() {
            out += &token.to_string();
        }
        assert_eq!(out.trim(), "local");
    }

    #[test]
    fn quote_include_falls_back_to_the_search_path() {
        let headers = tempfile::tempdir().unwrap();
        std::fs::write(headers.path().join("far.h"), "#define M far\n").unwrap();

        let mut pp = Preprocessor::new();
        pp.add_search_dir(headers.path());
        pp.push_string("test.c", "#include \"far.h\"\nM\n");
        let mut out = String::new();
        while let Some(token) = pp.next().unwrap() {
            out += &token.to_string();
        }
        assert_eq!(out.trim(), "far");
    }

    #[test]
    fn missing_header_is_fatal() {
        let error = preprocess_err("#include <no/such/header.h>\n");
        assert!(error.to_string().contains("cannot locate header file"));
    }

    #[test]
    fn include_cites_the_including_line() {
        let error = preprocess_err("one\ntwo\n#include <missing.h>\n");
        assert_eq!(error.site.line, 3);
        assert_eq!(error.site.filename, "test.c");
    }

    #[test]
    fn pp_next_matches_bare_lexer_on_directive_free_input() {
        let source = "int main(void) { return 1 + 2.5e-3; } /* tail */\n\"s\" 'c'";
        let mut lexer = cpre_lexer::lexer::Lexer::new(SourceReader::from_string("lex.c", source));
        let mut reference = Vec::new();
        while let Some(token) = lexer.next(false).unwrap() {
            reference.push(token);
        }

        let mut pp = Preprocessor::new();
        pp.push_string("lex.c", source);
        let mut output = Vec::new();
        while let Some(token) = pp.next().unwrap() {
            output.push(token);
        }

        assert_eq!(output, reference);
    }

    #[test]
    fn define_undef_restores_lookup() {
        let source = indoc! {"
            #define X 1
            #undef X
            X
        "};
        assert_eq!(preprocess(source).trim(), "X");
    }

    #[test]
    fn redefinition_silently_replaces() {
        let source = indoc! {"
            #define X 1
            #define X 2
            X
        "};
        assert_eq!(preprocess(source).trim(), "2");
    }

    #[test]
    fn undef_of_absent_name_is_accepted() {
        assert_eq!(preprocess("#undef NEVER_DEFINED\nok\n").trim(), "ok");
    }

    #[test]
    fn empty_directive_is_a_no_op() {
        assert_eq!(preprocess("#\nok\n").trim(), "ok");
    }

    #[test]
    fn unknown_directive_is_fatal() {
        let error = preprocess_err("#frobnicate\n");
        assert!(error.to_string().contains("unknown preprocessing directive"));
    }

    #[test]
    fn hash_mid_line_is_not_a_directive() {
        // Only the first token on a logical line introduces a directive.
        assert_eq!(preprocess("a # b").trim(), "a # b");
    }

    #[test]
    fn function_like_name_without_parens_stays_put() {
        let source = indoc! {"
            #define f(a) ((a) + 1)
            f; f(2)
        "};
        assert_eq!(preprocess(source).trim(), "f; ((2) + 1)");
    }

    #[test]
    fn arguments_may_span_lines() {
        let source = indoc! {"
            #define add(a, b) ((a) + (b))
            add(1,
                2)
        "};
        assert_eq!(preprocess(source).trim(), "((1) + (2))");
    }

    #[test]
    fn nested_parens_hide_commas() {
        let source = indoc! {"
            #define first(a, b) a
            first((1, 2), 3)
        "};
        assert_eq!(preprocess(source).trim(), "(1, 2)");
    }

    #[test]
    fn zero_parameter_macro_takes_empty_parens() {
        let source = indoc! {"
            #define nil() 0
            nil()
        "};
        assert_eq!(preprocess(source).trim(), "0");
    }

    #[test]
    fn zero_parameter_macro_rejects_arguments() {
        let source = indoc! {"
            #define nil() 0
            nil(x)
        "};
        let error = preprocess_err(source);
        assert!(error.to_string().contains("zero parameter macro"));
    }

    #[test]
    fn too_few_arguments_is_fatal() {
        let error = preprocess_err("#define two(a, b) a b\ntwo(1)\n");
        assert!(error.to_string().contains("too few"));
    }

    #[test]
    fn too_many_arguments_is_fatal() {
        let error = preprocess_err("#define two(a, b) a b\ntwo(1, 2, 3)\n");
        assert!(error.to_string().contains("too many"));
    }

    #[test]
    fn empty_actual_becomes_nothing() {
        let source = indoc! {"
            #define wrap(a) [a]
            wrap()
        "};
        assert_eq!(preprocess(source).trim(), "[]");
    }

    #[test]
    fn paste_forms_single_tokens() {
        let source = indoc! {"
            #define cat(a, b) a ## b
            cat(fn, 1)(cat(2, 3))
        "};
        assert_eq!(preprocess(source).trim(), "fn1(23)");
    }

    #[test]
    fn paste_with_empty_operands_uses_placemarkers() {
        let source = indoc! {"
            #define cat(a, b) [a ## b]
            cat(x,) cat(,y) cat(,)
        "};
        assert_eq!(words(source), ["[x]", "[y]", "[]"]);
    }

    #[test]
    fn paste_failure_is_fatal() {
        let error = preprocess_err("#define cat(a, b) a ## b\ncat(+, -)\n");
        assert!(error.to_string().contains("one token"));
    }

    #[test]
    fn paste_operand_is_not_pre_expanded() {
        let source = indoc! {"
            #define one 1
            #define paste(a) a ## 2
            paste(one)
        "};
        // `one` is glued raw; the result `one2` names no macro.
        assert_eq!(preprocess(source).trim(), "one2");
    }

    #[test]
    fn variadic_tail_keeps_commas_but_splits_heads() {
        let source = indoc! {"
            #define pick(first, ...) first | __VA_ARGS__
            pick(a, b, c)
        "};
        assert_eq!(preprocess(source).trim(), "a | b, c");
    }

    #[test]
    fn stringize_of_expression_argument() {
        let source = indoc! {r##"
            #define str(x) # x
            str(a  +   "q\"t")
        "##};
        assert_eq!(preprocess(source).trim(), r#""a + \"q\\\"t\"""#);
    }

    #[test]
    fn ifdef_and_ifndef() {
        let source = indoc! {"
            #define HAVE_IT
            #ifdef HAVE_IT
            yes
            #endif
            #ifndef HAVE_IT
            no
            #endif
            #ifdef MISSING
            no
            #endif
            #ifndef MISSING
            also
            #endif
        "};
        assert_eq!(words(source), ["yes", "also"]);
    }

    #[test]
    fn elif_chains() {
        let source = indoc! {"
            #define PICK 2
            #if PICK == 1
            one
            #elif PICK == 2
            two
            #elif PICK == 3
            three
            #else
            other
            #endif
        "};
        assert_eq!(words(source), ["two"]);
    }

    #[test]
    fn else_of_a_taken_branch_is_skipped() {
        let source = indoc! {"
            #if 1
            a
            #else
            b
            #endif
        "};
        assert_eq!(words(source), ["a"]);
    }

    #[test]
    fn defined_operator_both_spellings() {
        let source = indoc! {"
            #define A 0
            #if defined A && defined(A)
            both
            #endif
            #if defined(B)
            no
            #endif
        "};
        assert_eq!(words(source), ["both"]);
    }

    #[test]
    fn builtins_count_as_defined() {
        let source = indoc! {"
            #ifdef __STDC__
            hosted
            #endif
        "};
        assert_eq!(words(source), ["hosted"]);
    }

    #[test]
    fn surviving_identifiers_evaluate_to_zero() {
        let source = indoc! {"
            #if UNKNOWN
            no
            #else
            zero
            #endif
        "};
        assert_eq!(words(source), ["zero"]);
    }

    #[test]
    fn if_condition_is_macro_expanded() {
        let source = indoc! {"
            #define FLAG 1
            #define TEST FLAG
            #if TEST
            on
            #endif
        "};
        assert_eq!(words(source), ["on"]);
    }

    #[test]
    fn skipped_regions_do_not_define() {
        let source = indoc! {"
            #if 0
            #define X 1
            #endif
            X
        "};
        assert_eq!(preprocess(source).trim(), "X");
    }

    #[test]
    fn skipped_regions_tolerate_junk_directives() {
        let source = indoc! {"
            #if 0
            #
            #bogus directive
            #endif
            ok
        "};
        assert_eq!(words(source), ["ok"]);
    }

    #[test]
    fn stray_endif_is_fatal() {
        let error = preprocess_err("#endif\n");
        assert!(error.to_string().contains("unexpected `#endif`"));
    }

    #[test]
    fn stray_else_is_fatal() {
        let error = preprocess_err("#else\n");
        assert!(error.to_string().contains("unexpected"));
    }

    #[test]
    fn unterminated_conditional_is_fatal() {
        let error = preprocess_err("#if 1\nbody\n");
        assert!(error.to_string().contains("unterminated conditional"));
    }

    #[test]
    fn unterminated_skipped_conditional_is_fatal() {
        let error = preprocess_err("#if 0\nbody\n");
        assert!(error.to_string().contains("unterminated conditional"));
    }

    #[test]
    fn division_by_zero_in_condition_is_fatal() {
        let error = preprocess_err("#if 1 / 0\n#endif\n");
        assert!(error.to_string().contains("division by zero"));
    }

    #[test]
    fn stdc_version_builtin() {
        assert_eq!(preprocess("__STDC_VERSION__").trim(), "199901L");
        assert_eq!(preprocess("__STDC__ __STDC_HOSTED__").trim(), "1 1");
    }

    #[test]
    fn file_builtin_uses_the_basename() {
        let mut pp = Preprocessor::new();
        pp.push_string("src/deep/unit.c", "__FILE__");
        let token = pp.next().unwrap().unwrap();
        assert_eq!(token.text, "\"unit.c\"");
    }

    #[test]
    fn line_builtin_counts_logical_lines() {
        assert_eq!(words("__LINE__\n__LINE__\n\n__LINE__\n"), ["1", "2", "4"]);
    }

    #[test]
    fn date_and_time_builtins_have_fixed_shapes() {
        let mut pp = Preprocessor::new();
        pp.push_string("test.c", "__DATE__ __TIME__");
        let date = pp.next().unwrap().unwrap().text;
        let time = pp.next().unwrap().unwrap().text;
        // "Mmm dd yyyy" and "hh:mm:ss", quotes included.
        assert_eq!(date.len(), 13);
        assert_eq!(time.len(), 10);
        assert_eq!(&time[3..4], ":");
        assert_eq!(&time[6..7], ":");
    }

    #[test]
    fn builtins_cannot_be_undefined() {
        let source = indoc! {"
            #undef __STDC__
            __STDC__
        "};
        assert_eq!(preprocess(source).trim(), "1");
    }

    #[test]
    fn directives_survive_line_splicing() {
        let source = "#define SPLIT \\\n    42\nSPLIT\n";
        assert_eq!(preprocess(source).trim(), "42");
    }

    #[test]
    fn directive_errors_cite_file_and_line() {
        let error = preprocess_err("fine\n#define 1x\n");
        assert_eq!(error.site.filename, "test.c");
        assert_eq!(error.site.line, 2);
    }

    #[test]
    fn duplicate_formal_is_fatal() {
        let error = preprocess_err("#define f(a, a) a\n");
        assert!(error.to_string().contains("duplicate formal"));
    }

    #[test]
    fn varargs_must_come_last() {
        let error = preprocess_err("#define f(..., a) a\n");
        assert!(error.to_string().contains("last formal"));
    }

    #[test]
    fn hash_hash_must_not_open_or_close() {
        let first = preprocess_err("#define f(a) ## a\n");
        assert!(first.to_string().contains("first token"));
        let last = preprocess_err("#define f(a) a ##\n");
        assert!(last.to_string().contains("last token"));
    }

    #[test]
    fn hash_requires_a_formal() {
        let error = preprocess_err("#define f(a) # b\n");
        assert!(error.to_string().contains("formal parameter"));
    }

    #[test]
    fn hash_is_literal_in_object_like_macros() {
        let source = indoc! {"
            #define H # x
            H
        "};
        assert_eq!(preprocess(source).trim(), "# x");
    }

    #[test]
    fn whitespace_before_parens_means_object_like() {
        let source = indoc! {"
            #define not_fn (a)
            not_fn
        "};
        assert_eq!(preprocess(source).trim(), "(a)");
    }

    #[test]
    fn include_depth_first_then_resume() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("mid.h"), "before\n#include <leaf.h>\nafter\n").unwrap();
        std::fs::write(dir.path().join("leaf.h"), "leaf\n").unwrap();

        let mut pp = Preprocessor::new();
        pp.add_search_dir(dir.path());
        pp.push_string("test.c", "top\n#include <mid.h>\nbottom\n");
        let mut out = Vec::new();
        while let Some(token) = pp.next().unwrap() {
            out.push(token.spelling().to_owned());
        }
        assert_eq!(out, ["top", "before", "leaf", "after", "bottom"]);
    }

    #[test]
    fn macros_defined_in_headers_are_visible_after_return() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("def.h"), "#define FROM_HEADER 7\n").unwrap();

        let mut pp = Preprocessor::new();
        pp.add_search_dir(dir.path());
        pp.push_string("test.c", "#include <def.h>\nFROM_HEADER\n");
        let mut out = String::new();
        while let Some(token) = pp.next().unwrap() {
            out += &token.to_string();
        }
        assert_eq!(out.trim(), "7");
    }

    #[test]
    fn nested_macros_resolve_inside_arguments() {
        let source = indoc! {"
            #define inner 5
            #define wrap(a) (a)
            wrap(inner + inner)
        "};
        assert_eq!(preprocess(source).trim(), "(5 + 5)");
    }

    #[test]
    fn rescan_expands_macros_produced_by_paste() {
        let source = indoc! {"
            #define AB 99
            #define cat(a, b) a ## b
            cat(A, B)
        "};
        assert_eq!(preprocess(source).trim(), "99");
    }
}
