//! Built-in macros: a fixed table of name → handler pairs, consulted before
//! the user macro table. A handler synthesizes the expansion and pushes it
//! as a list frame; built-ins cannot be redefined or undefined.

use cpre_lexer::token::{Token, TokenKind};

use crate::Preprocessor;

type Handler = fn(&mut Preprocessor);

static BUILTINS: &[(&str, Handler)] = &[
    // Required by ISO/IEC 9899:1999.
    ("__DATE__", expand_date),
    ("__TIME__", expand_time),
    ("__FILE__", expand_file),
    ("__LINE__", expand_line),
    ("__STDC__", expand_one),
    ("__STDC_HOSTED__", expand_one),
    ("__STDC_VERSION__", expand_version),
    // Platform identity; system headers expect these.
    ("__x86_64__", expand_one),
    ("__amd64", expand_one),
    ("__amd64__", expand_one),
    ("__LP64__", expand_one),
    ("_LP64", expand_one),
    ("__ELF__", expand_one),
    ("__gnu_linux__", expand_one),
    ("__linux", expand_one),
    ("__linux__", expand_one),
    ("__unix", expand_one),
    ("__unix__", expand_one),
];

pub(crate) fn find(name: &str) -> Option<Handler> {
    BUILTINS
        .iter()
        .find(|(builtin, _)| *builtin == name)
        .map(|(_, handler)| *handler)
}

fn push_single(pp: &mut Preprocessor, token: Token) {
    pp.push_list_frame(None, vec![token]);
}

fn string_literal(text: &str) -> Token {
    Token::new(TokenKind::StringLit, format!("\"{text}\""))
}

fn expand_one(pp: &mut Preprocessor) {
    push_single(pp, Token::new(TokenKind::PpNumber, "1"));
}

fn expand_version(pp: &mut Preprocessor) {
    push_single(pp, Token::new(TokenKind::PpNumber, "199901L"));
}

fn expand_file(pp: &mut Preprocessor) {
    let site = pp.current_site();
    let basename = site.filename.rsplit('/').next().unwrap_or("");
    let token = string_literal(basename);
    push_single(pp, token);
}

fn expand_line(pp: &mut Preprocessor) {
    let line = pp.current_site().line;
    push_single(pp, Token::new(TokenKind::PpNumber, line.to_string()));
}

fn expand_date(pp: &mut Preprocessor) {
    let date = pp.start_time.format("%b %d %Y").to_string();
    let token = string_literal(&date);
    push_single(pp, token);
}

fn expand_time(pp: &mut Preprocessor) {
    let time = pp.start_time.format("%H:%M:%S").to_string();
    let token = string_literal(&time);
    push_single(pp, token);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_builtins_resolve() {
        for (name, _) in BUILTINS {
            assert!(find(name).is_some());
        }
        assert!(find("__FILE__").is_some());
        assert!(find("not_a_builtin").is_none());
    }
}
