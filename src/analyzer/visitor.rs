use rustpython_parser::ast::{self, Expr, Pattern, Ranged, Stmt};

use crate::analyzer::rules;
use crate::analyzer::{Location, RuleId, Violation};

/// Walks the parsed program and collects every rule violation in source
/// order. Nothing is evaluated; only the structure is inspected, so aliasing
/// (`import os as o`) and nesting inside functions, classes, comprehensions
/// or decorators cannot hide a denied construct.
pub(super) struct Collector<'a> {
    source: &'a str,
    violations: Vec<Violation>,
}

impl<'a> Collector<'a> {
    pub(super) fn new(source: &'a str) -> Self {
        Self {
            source,
            violations: Vec::new(),
        }
    }

    pub(super) fn into_violations(self) -> Vec<Violation> {
        self.violations
    }

    fn push(&mut self, rule_id: RuleId, offset: usize, description: String) {
        let location = offset_location(self.source, offset);
        self.violations.push(Violation {
            rule_id,
            location,
            description,
        });
    }

    pub(super) fn visit_body(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.visit_stmt(stmt);
        }
    }

    pub(super) fn visit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Import(node) => {
                for alias in &node.names {
                    if rules::module_denied(alias.name.as_str()) {
                        self.push(
                            RuleId::DeniedImport,
                            node_start(alias),
                            format!("import of denied module `{}`", alias.name.as_str()),
                        );
                    }
                }
            }
            Stmt::ImportFrom(node) => {
                if let Some(module) = &node.module {
                    if rules::module_denied(module.as_str()) {
                        self.push(
                            RuleId::DeniedImport,
                            node_start(node),
                            format!("import from denied module `{}`", module.as_str()),
                        );
                    }
                }
            }
            Stmt::FunctionDef(node) => {
                for decorator in &node.decorator_list {
                    self.visit_expr(decorator);
                }
                self.visit_arguments(&node.args);
                if let Some(returns) = &node.returns {
                    self.visit_expr(returns);
                }
                self.visit_body(&node.body);
            }
            Stmt::AsyncFunctionDef(node) => {
                for decorator in &node.decorator_list {
                    self.visit_expr(decorator);
                }
                self.visit_arguments(&node.args);
                if let Some(returns) = &node.returns {
                    self.visit_expr(returns);
                }
                self.visit_body(&node.body);
            }
            Stmt::ClassDef(node) => {
                for decorator in &node.decorator_list {
                    self.visit_expr(decorator);
                }
                for base in &node.bases {
                    self.visit_expr(base);
                }
                for keyword in &node.keywords {
                    self.visit_expr(&keyword.value);
                }
                self.visit_body(&node.body);
            }
            Stmt::Return(node) => {
                if let Some(value) = &node.value {
                    self.visit_expr(value);
                }
            }
            Stmt::Delete(node) => {
                for target in &node.targets {
                    self.visit_expr(target);
                }
            }
            Stmt::Assign(node) => {
                for target in &node.targets {
                    self.visit_expr(target);
                }
                self.visit_expr(&node.value);
            }
            Stmt::AugAssign(node) => {
                self.visit_expr(&node.target);
                self.visit_expr(&node.value);
            }
            Stmt::AnnAssign(node) => {
                self.visit_expr(&node.target);
                self.visit_expr(&node.annotation);
                if let Some(value) = &node.value {
                    self.visit_expr(value);
                }
            }
            Stmt::For(node) => {
                self.visit_expr(&node.target);
                self.visit_expr(&node.iter);
                self.visit_body(&node.body);
                self.visit_body(&node.orelse);
            }
            Stmt::AsyncFor(node) => {
                self.visit_expr(&node.target);
                self.visit_expr(&node.iter);
                self.visit_body(&node.body);
                self.visit_body(&node.orelse);
            }
            Stmt::While(node) => {
                self.visit_expr(&node.test);
                self.visit_body(&node.body);
                self.visit_body(&node.orelse);
            }
            Stmt::If(node) => {
                self.visit_expr(&node.test);
                self.visit_body(&node.body);
                self.visit_body(&node.orelse);
            }
            Stmt::With(node) => {
                for item in &node.items {
                    self.visit_expr(&item.context_expr);
                    if let Some(vars) = &item.optional_vars {
                        self.visit_expr(vars);
                    }
                }
                self.visit_body(&node.body);
            }
            Stmt::AsyncWith(node) => {
                for item in &node.items {
                    self.visit_expr(&item.context_expr);
                    if let Some(vars) = &item.optional_vars {
                        self.visit_expr(vars);
                    }
                }
                self.visit_body(&node.body);
            }
            Stmt::Match(node) => {
                self.visit_expr(&node.subject);
                for case in &node.cases {
                    self.visit_pattern(&case.pattern);
                    if let Some(guard) = &case.guard {
                        self.visit_expr(guard);
                    }
                    self.visit_body(&case.body);
                }
            }
            Stmt::Raise(node) => {
                if let Some(exc) = &node.exc {
                    self.visit_expr(exc);
                }
                if let Some(cause) = &node.cause {
                    self.visit_expr(cause);
                }
            }
            Stmt::Try(node) => {
                self.visit_body(&node.body);
                for handler in &node.handlers {
                    self.visit_except_handler(handler);
                }
                self.visit_body(&node.orelse);
                self.visit_body(&node.finalbody);
            }
            Stmt::TryStar(node) => {
                self.visit_body(&node.body);
                for handler in &node.handlers {
                    self.visit_except_handler(handler);
                }
                self.visit_body(&node.orelse);
                self.visit_body(&node.finalbody);
            }
            Stmt::Assert(node) => {
                self.visit_expr(&node.test);
                if let Some(msg) = &node.msg {
                    self.visit_expr(msg);
                }
            }
            Stmt::Expr(node) => self.visit_expr(&node.value),
            Stmt::Global(_) | Stmt::Nonlocal(_) | Stmt::Pass(_) | Stmt::Break(_)
            | Stmt::Continue(_) => {}
            _ => {}
        }
    }

    fn visit_except_handler(&mut self, handler: &ast::ExceptHandler) {
        match handler {
            ast::ExceptHandler::ExceptHandler(node) => {
                if let Some(type_) = &node.type_ {
                    self.visit_expr(type_);
                }
                self.visit_body(&node.body);
            }
        }
    }

    fn visit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Call(node) => {
                if let Expr::Name(func) = node.func.as_ref() {
                    if rules::call_denied(func.id.as_str()) {
                        self.push(
                            RuleId::DeniedCall,
                            node_start(node),
                            format!("call to denied builtin `{}`", func.id.as_str()),
                        );
                    }
                }
                self.visit_expr(&node.func);
                for arg in &node.args {
                    self.visit_expr(arg);
                }
                for keyword in &node.keywords {
                    self.visit_expr(&keyword.value);
                }
            }
            Expr::Attribute(node) => {
                if rules::attribute_denied(node.attr.as_str()) {
                    self.push(
                        RuleId::DeniedAttribute,
                        node_start(node),
                        format!("access to denied attribute `{}`", node.attr.as_str()),
                    );
                }
                self.visit_expr(&node.value);
            }
            Expr::Name(node) => {
                if rules::name_denied(node.id.as_str()) {
                    self.push(
                        RuleId::DeniedName,
                        node_start(node),
                        format!("reference to denied name `{}`", node.id.as_str()),
                    );
                }
            }
            Expr::BoolOp(node) => {
                for value in &node.values {
                    self.visit_expr(value);
                }
            }
            Expr::NamedExpr(node) => {
                self.visit_expr(&node.target);
                self.visit_expr(&node.value);
            }
            Expr::BinOp(node) => {
                self.visit_expr(&node.left);
                self.visit_expr(&node.right);
            }
            Expr::UnaryOp(node) => self.visit_expr(&node.operand),
            Expr::Lambda(node) => {
                self.visit_arguments(&node.args);
                self.visit_expr(&node.body);
            }
            Expr::IfExp(node) => {
                self.visit_expr(&node.test);
                self.visit_expr(&node.body);
                self.visit_expr(&node.orelse);
            }
            Expr::Dict(node) => {
                for key in node.keys.iter().flatten() {
                    self.visit_expr(key);
                }
                for value in &node.values {
                    self.visit_expr(value);
                }
            }
            Expr::Set(node) => {
                for elt in &node.elts {
                    self.visit_expr(elt);
                }
            }
            Expr::ListComp(node) => {
                self.visit_expr(&node.elt);
                self.visit_comprehensions(&node.generators);
            }
            Expr::SetComp(node) => {
                self.visit_expr(&node.elt);
                self.visit_comprehensions(&node.generators);
            }
            Expr::DictComp(node) => {
                self.visit_expr(&node.key);
                self.visit_expr(&node.value);
                self.visit_comprehensions(&node.generators);
            }
            Expr::GeneratorExp(node) => {
                self.visit_expr(&node.elt);
                self.visit_comprehensions(&node.generators);
            }
            Expr::Await(node) => self.visit_expr(&node.value),
            Expr::Yield(node) => {
                if let Some(value) = &node.value {
                    self.visit_expr(value);
                }
            }
            Expr::YieldFrom(node) => self.visit_expr(&node.value),
            Expr::Compare(node) => {
                self.visit_expr(&node.left);
                for comparator in &node.comparators {
                    self.visit_expr(comparator);
                }
            }
            Expr::FormattedValue(node) => {
                self.visit_expr(&node.value);
                if let Some(spec) = &node.format_spec {
                    self.visit_expr(spec);
                }
            }
            Expr::JoinedStr(node) => {
                for value in &node.values {
                    self.visit_expr(value);
                }
            }
            Expr::Subscript(node) => {
                self.visit_expr(&node.value);
                self.visit_expr(&node.slice);
            }
            Expr::Starred(node) => self.visit_expr(&node.value),
            Expr::List(node) => {
                for elt in &node.elts {
                    self.visit_expr(elt);
                }
            }
            Expr::Tuple(node) => {
                for elt in &node.elts {
                    self.visit_expr(elt);
                }
            }
            Expr::Slice(node) => {
                if let Some(lower) = &node.lower {
                    self.visit_expr(lower);
                }
                if let Some(upper) = &node.upper {
                    self.visit_expr(upper);
                }
                if let Some(step) = &node.step {
                    self.visit_expr(step);
                }
            }
            Expr::Constant(_) => {}
            _ => {}
        }
    }

    fn visit_comprehensions(&mut self, generators: &[ast::Comprehension]) {
        for generator in generators {
            self.visit_expr(&generator.target);
            self.visit_expr(&generator.iter);
            for condition in &generator.ifs {
                self.visit_expr(condition);
            }
        }
    }

    fn visit_arguments(&mut self, args: &ast::Arguments) {
        for arg in args
            .posonlyargs
            .iter()
            .chain(&args.args)
            .chain(&args.kwonlyargs)
        {
            if let Some(annotation) = &arg.def.annotation {
                self.visit_expr(annotation);
            }
            if let Some(default) = &arg.default {
                self.visit_expr(default);
            }
        }
        if let Some(vararg) = &args.vararg {
            if let Some(annotation) = &vararg.annotation {
                self.visit_expr(annotation);
            }
        }
        if let Some(kwarg) = &args.kwarg {
            if let Some(annotation) = &kwarg.annotation {
                self.visit_expr(annotation);
            }
        }
    }

    fn visit_pattern(&mut self, pattern: &Pattern) {
        match pattern {
            Pattern::MatchValue(node) => self.visit_expr(&node.value),
            Pattern::MatchSingleton(_) => {}
            Pattern::MatchSequence(node) => {
                for inner in &node.patterns {
                    self.visit_pattern(inner);
                }
            }
            Pattern::MatchMapping(node) => {
                for key in &node.keys {
                    self.visit_expr(key);
                }
                for inner in &node.patterns {
                    self.visit_pattern(inner);
                }
            }
            Pattern::MatchClass(node) => {
                self.visit_expr(&node.cls);
                for inner in &node.patterns {
                    self.visit_pattern(inner);
                }
                for inner in &node.kwd_patterns {
                    self.visit_pattern(inner);
                }
            }
            Pattern::MatchStar(_) => {}
            Pattern::MatchAs(node) => {
                if let Some(inner) = &node.pattern {
                    self.visit_pattern(inner);
                }
            }
            Pattern::MatchOr(node) => {
                for inner in &node.patterns {
                    self.visit_pattern(inner);
                }
            }
        }
    }
}

fn node_start<N: Ranged>(node: &N) -> usize {
    u32::from(node.range().start()) as usize
}

/// Translate a byte offset into a 1-based line/column location.
pub(super) fn offset_location(source: &str, offset: usize) -> Location {
    let clamped = offset.min(source.len());
    let mut line = 1;
    let mut column = 1;
    for byte in &source.as_bytes()[..clamped] {
        if *byte == b'\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    Location { line, column }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_location() {
        let source = "a = 1\nb = 2\n";
        assert_eq!(offset_location(source, 0), Location { line: 1, column: 1 });
        assert_eq!(offset_location(source, 6), Location { line: 2, column: 1 });
        assert_eq!(offset_location(source, 8), Location { line: 2, column: 3 });
        // Offsets past the end clamp to the last position.
        assert_eq!(offset_location(source, 999).line, 3);
    }
}
