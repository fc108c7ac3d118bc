//! The macro database: user-defined macros keyed by name spelling.
//!
//! Built-in macros are not stored here; they live in a fixed table of their
//! own (see `builtin`) which is consulted first, so built-in names can
//! neither be redefined nor removed through this interface.

use std::collections::HashMap;

use cpre_lexer::token::{Token, TokenKind};

/// One entry of a macro's replacement list.
#[derive(Debug, Clone)]
pub(crate) enum Replace {
    /// Substitute this token as-is, with its definition-site whitespace.
    Token(Token),
    /// `#param`: substitute the stringized raw actual.
    Stringize { index: usize },
    /// Substitute the raw actual, or a placemarker when it is empty. Used
    /// for the operands of `##`.
    Raw { index: usize },
    /// Substitute the fully macro-expanded actual.
    Expanded { index: usize, lwhite: bool },
    /// `##`: paste the previously produced token with the next one produced.
    /// Never first, never last, and both neighbours produce at least one
    /// token (possibly a placemarker).
    Glue,
}

#[derive(Debug, Clone)]
pub(crate) struct Macro {
    pub name: String,
    pub function_like: bool,
    /// Formal parameter names in declaration order. When `has_varargs` is
    /// set the last formal is the synthetic `__VA_ARGS__`.
    pub formals: Vec<String>,
    pub has_varargs: bool,
    pub replacement: Vec<Replace>,
    /// Cleared while an expansion of this macro is on the frame stack;
    /// a disabled name reaching the output is painted unexpandable.
    pub enabled: bool,
}

impl Macro {
    pub fn object_like(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            function_like: false,
            formals: Vec::new(),
            has_varargs: false,
            replacement: Vec::new(),
            enabled: true,
        }
    }

    /// Index of the formal the token names, if it names one.
    pub fn formal_index(&self, token: &Token) -> Option<usize> {
        if token.kind != TokenKind::Identifier {
            return None;
        }
        self.formals.iter().position(|formal| *formal == token.text)
    }
}

#[derive(Debug, Default)]
pub(crate) struct MacroTable {
    map: HashMap<String, Macro>,
}

impl MacroTable {
    /// Insert a macro, silently replacing any previous definition of the
    /// same name.
    pub fn insert(&mut self, definition: Macro) {
        self.map.insert(definition.name.clone(), definition);
    }

    pub fn get(&self, name: &str) -> Option<&Macro> {
        self.map.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Macro> {
        self.map.get_mut(name)
    }

    /// Remove a macro; removing an absent name is accepted.
    pub fn remove(&mut self, name: &str) {
        self.map.remove(name);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }
}
