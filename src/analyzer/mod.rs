//! Static policy analysis over submitted Python source.
//!
//! The analyzer parses the code into a real syntax tree and walks it
//! structurally, so a denied construct is caught regardless of aliasing,
//! nesting or formatting. It runs fully before any execution resource is
//! allocated and never evaluates the input.

mod rules;
mod visitor;

pub use rules::RuleId;

use rustpython_parser::{ast, Parse};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Location of a violation within the submitted source (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

/// One disallowed construct found during analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule_id: RuleId,
    pub location: Location,
    pub description: String,
}

/// Accept/reject decision for one piece of submitted code.
///
/// A non-empty violation list forces `allowed = false`; the two fields are
/// only ever constructed together so they cannot disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyVerdict {
    pub allowed: bool,
    pub violations: Vec<Violation>,
}

impl PolicyVerdict {
    fn from_violations(violations: Vec<Violation>) -> Self {
        Self {
            allowed: violations.is_empty(),
            violations,
        }
    }

    /// Human-readable summary of every violation, for error reporting.
    pub fn summary(&self) -> Option<String> {
        if self.violations.is_empty() {
            return None;
        }
        Some(
            self.violations
                .iter()
                .map(|v| {
                    format!(
                        "{} at line {}: {}",
                        v.rule_id, v.location.line, v.description
                    )
                })
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Statically vet `code` against the fixed policy rule set.
///
/// Pure and deterministic: the same input always yields the same verdict,
/// with violations reported in source order. Unparseable input is a
/// rejecting verdict with a `syntax_error` rule, never an internal fault,
/// and empty submissions are a policy failure in their own right.
pub fn analyze(code: &str) -> PolicyVerdict {
    if code.trim().is_empty() {
        return PolicyVerdict::from_violations(vec![Violation {
            rule_id: RuleId::EmptyCode,
            location: Location { line: 1, column: 1 },
            description: "empty code submission".to_string(),
        }]);
    }

    let suite = match ast::Suite::parse(code, "<code>") {
        Ok(suite) => suite,
        Err(err) => {
            let offset = u32::from(err.offset) as usize;
            return PolicyVerdict::from_violations(vec![Violation {
                rule_id: RuleId::SyntaxError,
                location: visitor::offset_location(code, offset),
                description: format!("syntax error: {}", err.error),
            }]);
        }
    };

    let mut collector = visitor::Collector::new(code);
    collector.visit_body(&suite);
    let verdict = PolicyVerdict::from_violations(collector.into_violations());

    debug!(
        allowed = verdict.allowed,
        violations = verdict.violations.len(),
        "Policy analysis complete"
    );

    verdict
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_code_is_allowed() {
        let verdict = analyze("x = [i * i for i in range(10)]\nprint(sum(x))");
        assert!(verdict.allowed);
        assert!(verdict.violations.is_empty());
    }

    #[test]
    fn test_denied_import() {
        let verdict = analyze("import os");
        assert!(!verdict.allowed);
        assert_eq!(verdict.violations[0].rule_id, RuleId::DeniedImport);
    }

    #[test]
    fn test_aliased_import_is_caught() {
        let verdict = analyze("import os as o\no.system('id')");
        assert!(!verdict.allowed);
        assert_eq!(verdict.violations[0].rule_id, RuleId::DeniedImport);
    }

    #[test]
    fn test_import_from_submodule() {
        let verdict = analyze("from os.path import join");
        assert!(!verdict.allowed);
        assert_eq!(verdict.violations[0].rule_id, RuleId::DeniedImport);
    }

    #[test]
    fn test_dynamic_evaluation_call() {
        let verdict = analyze("eval('1 + 1')");
        assert!(!verdict.allowed);
        assert_eq!(verdict.violations[0].rule_id, RuleId::DeniedCall);
    }

    #[test]
    fn test_nested_denied_call() {
        let verdict = analyze("def f():\n    def g():\n        return exec('pass')\n");
        assert!(!verdict.allowed);
        assert_eq!(verdict.violations[0].rule_id, RuleId::DeniedCall);
    }

    #[test]
    fn test_denied_call_in_lambda_default() {
        let verdict = analyze("f = lambda x=eval('1'): x");
        assert!(!verdict.allowed);
        assert_eq!(verdict.violations[0].rule_id, RuleId::DeniedCall);
    }

    #[test]
    fn test_attribute_chain_escape() {
        let verdict = analyze("().__class__.__bases__[0].__subclasses__()");
        assert!(!verdict.allowed);
        let rules: Vec<_> = verdict.violations.iter().map(|v| v.rule_id).collect();
        assert!(rules.iter().all(|r| *r == RuleId::DeniedAttribute));
        // class, bases and subclasses each raise their own violation
        assert_eq!(rules.len(), 3);
    }

    #[test]
    fn test_denied_name_reference() {
        let verdict = analyze("b = __builtins__");
        assert!(!verdict.allowed);
        assert_eq!(verdict.violations[0].rule_id, RuleId::DeniedName);
    }

    #[test]
    fn test_denied_call_inside_fstring() {
        let verdict = analyze("x = f\"{open('/etc/passwd')}\"");
        assert!(!verdict.allowed);
        assert_eq!(verdict.violations[0].rule_id, RuleId::DeniedCall);
    }

    #[test]
    fn test_syntax_error_is_rejected_not_crashed() {
        let verdict = analyze("def broken(:\n    pass");
        assert!(!verdict.allowed);
        assert_eq!(verdict.violations[0].rule_id, RuleId::SyntaxError);
    }

    #[test]
    fn test_empty_code_is_policy_failure() {
        for code in ["", "   ", "\n\n"] {
            let verdict = analyze(code);
            assert!(!verdict.allowed);
            assert_eq!(verdict.violations[0].rule_id, RuleId::EmptyCode);
        }
    }

    #[test]
    fn test_violations_reported_in_source_order() {
        let verdict = analyze("import socket\nx = 1\neval('x')");
        assert_eq!(verdict.violations.len(), 2);
        assert_eq!(verdict.violations[0].rule_id, RuleId::DeniedImport);
        assert_eq!(verdict.violations[1].rule_id, RuleId::DeniedCall);
        assert!(verdict.violations[0].location.line < verdict.violations[1].location.line);
    }

    #[test]
    fn test_determinism() {
        let code = "import subprocess\ngetattr(object, 'x')";
        assert_eq!(analyze(code), analyze(code));
    }

    #[test]
    fn test_summary_names_the_rule() {
        let verdict = analyze("import socket");
        let summary = verdict.summary().unwrap();
        assert!(summary.contains("denied_import"));
        assert!(summary.contains("socket"));
    }

    #[test]
    fn test_input_call_is_allowed() {
        // stdin is an explicit part of the request contract
        let verdict = analyze("name = input()\nprint(name)");
        assert!(verdict.allowed);
    }
}
