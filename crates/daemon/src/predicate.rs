//! Predicate compilation for `when` clauses.
//!
//! A predicate is a snippet (or a sequence of snippets, AND-composed)
//! evaluated to a boolean against a context. A missing clause is the
//! constant true; empty strings in a sequence are discarded.
//!
//! A clause without braces is an expression evaluated directly, where an
//! undefined result is simply false (`stream.tags` reads naturally as "the
//! stream has tags"). A clause with braces goes through the full snippet
//! pipeline and the resolved value's truthiness is used.

use crate::context::SnippetContext;
use crate::snippet::expr::evaluate;
use crate::snippet::{SnippetError, SnippetResolver};
use transmux_profile::SnippetSeq;

/// A compiled `when` clause.
#[derive(Debug, Clone)]
pub struct Predicate {
    clauses: Vec<String>,
}

impl Predicate {
    /// Compile an optional snippet-or-sequence field.
    pub fn compile(when: Option<&SnippetSeq>) -> Self {
        let clauses = when
            .map(|seq| {
                seq.as_slice()
                    .iter()
                    .filter(|s| !s.is_empty())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Self { clauses }
    }

    /// The constant-true predicate.
    pub fn always() -> Self {
        Self { clauses: Vec::new() }
    }

    /// Evaluate against a context: the AND of every clause.
    pub fn eval(
        &self,
        resolver: &SnippetResolver,
        ctx: &SnippetContext,
    ) -> Result<bool, SnippetError> {
        for clause in &self.clauses {
            let truthy = if clause.contains('{') {
                resolver.resolve(clause, ctx)?.is_truthy()
            } else {
                evaluate(clause, ctx)
                    .map_err(|e| SnippetError::Eval {
                        expr: clause.clone(),
                        message: e.to_string(),
                    })?
                    .truthy()
            };
            if !truthy {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(duration: f64) -> SnippetContext {
        SnippetContext::empty().with_slot("input", json!({"format": {"duration": duration}}))
    }

    #[test]
    fn test_missing_when_is_true() {
        let resolver = SnippetResolver::new();
        let predicate = Predicate::compile(None);
        assert!(predicate.eval(&resolver, &SnippetContext::empty()).unwrap());
    }

    #[test]
    fn test_bare_expression_clause() {
        let resolver = SnippetResolver::new();
        let when = SnippetSeq::One("input.format.duration > 3600".to_string());
        let predicate = Predicate::compile(Some(&when));

        assert!(predicate.eval(&resolver, &ctx(7200.0)).unwrap());
        assert!(!predicate.eval(&resolver, &ctx(1200.0)).unwrap());
    }

    #[test]
    fn test_braced_clause_goes_through_resolver() {
        let resolver = SnippetResolver::new();
        let when = SnippetSeq::One("{{input.format.duration > 3600}}".to_string());
        let predicate = Predicate::compile(Some(&when));

        assert!(predicate.eval(&resolver, &ctx(7200.0)).unwrap());
        assert!(!predicate.eval(&resolver, &ctx(1200.0)).unwrap());
    }

    #[test]
    fn test_sequence_is_and_composed() {
        let resolver = SnippetResolver::new();
        let when = SnippetSeq::Many(vec![
            "input.format.duration > 600".to_string(),
            "input.format.duration < 3600".to_string(),
        ]);
        let predicate = Predicate::compile(Some(&when));

        assert!(predicate.eval(&resolver, &ctx(1200.0)).unwrap());
        assert!(!predicate.eval(&resolver, &ctx(300.0)).unwrap());
        assert!(!predicate.eval(&resolver, &ctx(7200.0)).unwrap());
    }

    #[test]
    fn test_undefined_bare_clause_is_false() {
        let resolver = SnippetResolver::new();
        let when = SnippetSeq::One("stream.tags".to_string());
        let predicate = Predicate::compile(Some(&when));
        assert!(!predicate.eval(&resolver, &SnippetContext::empty()).unwrap());

        let tagged =
            SnippetContext::empty().with_slot("stream", json!({"tags": {"language": "eng"}}));
        assert!(predicate.eval(&resolver, &tagged).unwrap());
    }

    #[test]
    fn test_empty_strings_discarded() {
        let resolver = SnippetResolver::new();
        let when = SnippetSeq::Many(vec![String::new(), "{true}".to_string(), String::new()]);
        let predicate = Predicate::compile(Some(&when));
        assert!(predicate.eval(&resolver, &SnippetContext::empty()).unwrap());
    }

    #[test]
    fn test_all_empty_sequence_is_true() {
        let resolver = SnippetResolver::new();
        let when = SnippetSeq::Many(vec![String::new()]);
        let predicate = Predicate::compile(Some(&when));
        assert!(predicate.eval(&resolver, &SnippetContext::empty()).unwrap());
    }

    #[test]
    fn test_braced_nullish_clause_is_eval_error() {
        let resolver = SnippetResolver::new();
        let when = SnippetSeq::One("{{nosuch.thing}}".to_string());
        let predicate = Predicate::compile(Some(&when));
        assert!(predicate.eval(&resolver, &SnippetContext::empty()).is_err());
    }
}
