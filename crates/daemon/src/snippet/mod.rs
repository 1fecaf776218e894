//! Snippet resolution.
//!
//! Profile strings embed two template forms: `{{ expr }}` function
//! snippets evaluated by the expression interpreter, and `{name}` shortcut
//! tokens replaced from a registered table (with optional leading/trailing
//! separators preserved around non-empty replacements). Literal booleans
//! and numbers pass through with their braces stripped.

pub mod expr;

use regex::{Captures, Regex};
use thiserror::Error;

use crate::context::SnippetContext;
use expr::evaluate;

/// Error type for snippet resolution.
#[derive(Debug, Error)]
pub enum SnippetError {
    /// An embedded expression failed or yielded null/undefined.
    #[error("SnippetEvalError: expression '{expr}': {message}")]
    Eval { expr: String, message: String },

    /// Braces survived the full resolution pipeline.
    #[error("UnresolvedSnippet: unresolved tokens {residuals:?} in '{text}'")]
    Unresolved { text: String, residuals: Vec<String> },
}

/// Final value of a resolved snippet.
///
/// A fully resolved string is cast to bool/int/float when the whole string
/// is such a literal; everything else stays a string.
#[derive(Debug, Clone, PartialEq)]
pub enum SnippetValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl SnippetValue {
    /// Truthiness for predicate evaluation.
    pub fn is_truthy(&self) -> bool {
        match self {
            SnippetValue::Bool(b) => *b,
            SnippetValue::Int(n) => *n != 0,
            SnippetValue::Float(f) => *f != 0.0,
            SnippetValue::Str(s) => !s.is_empty(),
        }
    }
}

impl std::fmt::Display for SnippetValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnippetValue::Bool(b) => write!(f, "{}", b),
            SnippetValue::Int(n) => write!(f, "{}", n),
            SnippetValue::Float(x) => write!(f, "{}", x),
            SnippetValue::Str(s) => write!(f, "{}", s),
        }
    }
}

/// A registered shortcut: `{name}` (optionally with a separator inside the
/// braces) rewrites to a replacement that may itself contain function
/// snippets.
#[derive(Debug, Clone)]
struct Shortcut {
    replacement: String,
    pattern: Regex,
}

impl Shortcut {
    fn new(name: &str, replacement: &str) -> Self {
        // {name}, {.name}, {name.}: one optional separator on either side,
        // case-insensitive.
        let pattern = Regex::new(&format!(
            r"(?i)\{{([-._])?{}([-._])?\}}",
            regex::escape(name)
        ))
        .expect("shortcut pattern is statically well-formed");
        Self {
            replacement: replacement.to_string(),
            pattern,
        }
    }
}

/// Resolves snippet strings against a [`SnippetContext`].
///
/// Resolution is deterministic: the output is a pure function of the
/// snippet text, the context and the registered shortcut table.
pub struct SnippetResolver {
    shortcuts: Vec<Shortcut>,
    bool_literal: Regex,
    number_literal: Regex,
    function: Regex,
    residual: Regex,
    cast_bool: Regex,
    cast_int: Regex,
    cast_float: Regex,
}

impl Default for SnippetResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SnippetResolver {
    /// Resolver with the built-in shortcut table.
    pub fn new() -> Self {
        let shortcuts = vec![
            Shortcut::new("iid", "{{input.id}}:{{stream.index}}"),
            Shortcut::new("oid", "{{outputStream.index}}"),
            Shortcut::new("fn", "{{input.path.filename}}"),
            Shortcut::new(
                "lng",
                "{{ stream.tags && stream.tags.language ? stream.tags.language : 'und' }}",
            ),
            Shortcut::new(
                "label",
                "{{ (stream.disposition && stream.disposition.forced===1) \
                 || (stream.tags && stream.tags.title && stream.tags.title.match(/forced/i)) \
                 ? 'forced' : \
                 (stream.disposition && stream.disposition.hearing_impaired===1) \
                 || (stream.tags && stream.tags.title && stream.tags.title.match(/hi|sdh/i)) \
                 ? 'sdh' : '' }}",
            ),
        ];
        Self {
            shortcuts,
            bool_literal: Regex::new(r"\{(true|false)\}").expect("static regex"),
            number_literal: Regex::new(r"\{(\d+(?:\.\d+)?)\}").expect("static regex"),
            function: Regex::new(r"(?s)\{\{(.+?)\}\}").expect("static regex"),
            residual: Regex::new(r"\{[^{}]*\}").expect("static regex"),
            cast_bool: Regex::new(r"^(true|false)$").expect("static regex"),
            cast_int: Regex::new(r"^\d+$").expect("static regex"),
            cast_float: Regex::new(r"^\d+\.\d+$").expect("static regex"),
        }
    }

    /// Register an additional shortcut after the built-ins.
    pub fn with_shortcut(mut self, name: &str, replacement: &str) -> Self {
        self.shortcuts.push(Shortcut::new(name, replacement));
        self
    }

    /// Resolve a single snippet string.
    pub fn resolve(
        &self,
        snippet: &str,
        ctx: &SnippetContext,
    ) -> Result<SnippetValue, SnippetError> {
        let text = self.resolve_text(snippet, ctx)?;
        Ok(self.cast(text))
    }

    /// Resolve a sequence of snippet strings, joined with a single space.
    pub fn resolve_seq(
        &self,
        parts: &[String],
        ctx: &SnippetContext,
    ) -> Result<SnippetValue, SnippetError> {
        self.resolve(&parts.join(" "), ctx)
    }

    /// Resolve a snippet and keep the result as a string.
    pub fn resolve_to_string(
        &self,
        snippet: &str,
        ctx: &SnippetContext,
    ) -> Result<String, SnippetError> {
        self.resolve_text(snippet, ctx)
    }

    fn resolve_text(&self, snippet: &str, ctx: &SnippetContext) -> Result<String, SnippetError> {
        // 1. + 2. literal passthrough, braces stripped.
        let text = self.bool_literal.replace_all(snippet, "$1").into_owned();
        let text = self.number_literal.replace_all(&text, "$1").into_owned();

        // 3. shortcuts, in declaration order.
        let mut text = text;
        for shortcut in &self.shortcuts {
            text = self.apply_shortcut(&text, shortcut, ctx)?;
        }

        // 4. function snippets.
        let text = self.resolve_functions(&text, ctx)?;

        // 5. nothing brace-shaped may remain.
        let residuals: Vec<String> = self
            .residual
            .find_iter(&text)
            .map(|m| m.as_str().to_string())
            .collect();
        if !residuals.is_empty() {
            return Err(SnippetError::Unresolved { text, residuals });
        }

        Ok(text)
    }

    fn apply_shortcut(
        &self,
        text: &str,
        shortcut: &Shortcut,
        ctx: &SnippetContext,
    ) -> Result<String, SnippetError> {
        let mut error: Option<SnippetError> = None;
        let replaced = shortcut
            .pattern
            .replace_all(text, |caps: &Captures| {
                let lead = caps.get(1).map_or("", |m| m.as_str());
                let trail = caps.get(2).map_or("", |m| m.as_str());
                match self.resolve_functions(&shortcut.replacement, ctx) {
                    // An empty replacement swallows its separators.
                    Ok(value) if value.is_empty() => String::new(),
                    Ok(value) => format!("{}{}{}", lead, value, trail),
                    Err(e) => {
                        error.get_or_insert(e);
                        String::new()
                    }
                }
            })
            .into_owned();
        match error {
            Some(e) => Err(e),
            None => Ok(replaced),
        }
    }

    fn resolve_functions(
        &self,
        text: &str,
        ctx: &SnippetContext,
    ) -> Result<String, SnippetError> {
        let mut error: Option<SnippetError> = None;
        let replaced = self
            .function
            .replace_all(text, |caps: &Captures| {
                let source = caps
                    .get(1)
                    .map(|m| m.as_str())
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                match evaluate(&source, ctx) {
                    Ok(value) if value.is_nullish() => {
                        error.get_or_insert(SnippetError::Eval {
                            expr: source,
                            message: format!("yielded {}", value),
                        });
                        String::new()
                    }
                    Ok(value) => value.to_string(),
                    Err(e) => {
                        error.get_or_insert(SnippetError::Eval {
                            expr: source,
                            message: e.to_string(),
                        });
                        String::new()
                    }
                }
            })
            .into_owned();
        match error {
            Some(e) => Err(e),
            None => Ok(replaced),
        }
    }

    fn cast(&self, text: String) -> SnippetValue {
        if self.cast_bool.is_match(&text) {
            SnippetValue::Bool(text == "true")
        } else if self.cast_int.is_match(&text) {
            text.parse()
                .map(SnippetValue::Int)
                .unwrap_or(SnippetValue::Str(text))
        } else if self.cast_float.is_match(&text) {
            text.parse()
                .map(SnippetValue::Float)
                .unwrap_or(SnippetValue::Str(text))
        } else {
            SnippetValue::Str(text)
        }
    }
}
