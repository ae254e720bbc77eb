//! Static scanner: AST-level rejection of forbidden constructs.
//!
//! Parses a submitted script as Python and walks the whole tree,
//! collecting a violation for every forbidden import and every call to a
//! forbidden builtin. The scan never short-circuits; all findings are
//! reported in one message. A script that does not parse is rejected
//! outright, since execution cannot prove anything about it.
//!
//! This is a fast-path filter over statically visible names, not a proof
//! of safety. Containment is the sandbox's job; the scanner exists so
//! the sandbox is not asked to contain the obvious cases.

use rustpython_parser::{ast, Parse};
use std::collections::HashSet;
use thiserror::Error;

/// Module names whose import is rejected. Matching is on the top-level
/// segment, so `urllib.request` is caught by `urllib`.
pub const FORBIDDEN_MODULES: &[&str] = &[
    "os",
    "subprocess",
    "shutil",
    "socket",
    "requests",
    "urllib",
    "pickle",
    "sys",
    "importlib",
    "pathlib",
    "ftplib",
];

/// Builtins whose direct call (bare identifier) is rejected.
pub const FORBIDDEN_CALLS: &[&str] = &[
    "exec",
    "eval",
    "compile",
    "open",
    "input",
    "__import__",
    "breakpoint",
];

/// A scan rejection. The message is human-readable and goes verbatim
/// into the job's logs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SecurityViolation(pub String);

/// Scanner with configurable forbidden sets.
pub struct Scanner {
    forbidden_modules: HashSet<String>,
    forbidden_calls: HashSet<String>,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner {
    /// Scanner with the stock forbidden sets.
    pub fn new() -> Self {
        Self::with_sets(
            FORBIDDEN_MODULES.iter().map(|s| s.to_string()),
            FORBIDDEN_CALLS.iter().map(|s| s.to_string()),
        )
    }

    /// Scanner with caller-supplied sets. The sets are data, not code;
    /// deployments tighten or loosen them without touching the walk.
    pub fn with_sets(
        modules: impl IntoIterator<Item = String>,
        calls: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            forbidden_modules: modules.into_iter().collect(),
            forbidden_calls: calls.into_iter().collect(),
        }
    }

    /// Scan raw artifact bytes. `Ok(())` means the script may proceed to
    /// the sandbox.
    pub fn scan(&self, artifact: &[u8]) -> Result<(), SecurityViolation> {
        let source = std::str::from_utf8(artifact)
            .map_err(|e| SecurityViolation(format!("Syntax Error in script: {}", e)))?;

        let suite = ast::Suite::parse(source, "<submission>")
            .map_err(|e| SecurityViolation(format!("Syntax Error in script: {}", e)))?;

        let mut walk = Walk {
            forbidden_modules: &self.forbidden_modules,
            forbidden_calls: &self.forbidden_calls,
            violations: Vec::new(),
        };
        for stmt in &suite {
            walk.stmt(stmt);
        }

        if walk.violations.is_empty() {
            Ok(())
        } else {
            Err(SecurityViolation(walk.violations.join("\n")))
        }
    }
}

struct Walk<'a> {
    forbidden_modules: &'a HashSet<String>,
    forbidden_calls: &'a HashSet<String>,
    violations: Vec<String>,
}

impl<'a> Walk<'a> {
    fn check_import(&mut self, dotted: &str) {
        let top = dotted.split('.').next().unwrap_or(dotted);
        if self.forbidden_modules.contains(top) {
            self.violations
                .push(format!("Security Violation: Import '{}' is forbidden.", dotted));
        }
    }

    fn check_import_from(&mut self, dotted: &str) {
        let top = dotted.split('.').next().unwrap_or(dotted);
        if self.forbidden_modules.contains(top) {
            self.violations.push(format!(
                "Security Violation: From-Import '{}' is forbidden.",
                dotted
            ));
        }
    }

    fn check_call(&mut self, func: &ast::Expr) {
        if let ast::Expr::Name(name) = func {
            if self.forbidden_calls.contains(name.id.as_str()) {
                self.violations.push(format!(
                    "Security Violation: Function '{}()' is forbidden.",
                    name.id.as_str()
                ));
            }
        }
    }

    fn body(&mut self, stmts: &[ast::Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn exprs(&mut self, exprs: &[ast::Expr]) {
        for expr in exprs {
            self.expr(expr);
        }
    }

    fn opt_expr(&mut self, expr: &Option<Box<ast::Expr>>) {
        if let Some(expr) = expr {
            self.expr(expr);
        }
    }

    fn stmt(&mut self, stmt: &ast::Stmt) {
        match stmt {
            ast::Stmt::Import(node) => {
                for alias in &node.names {
                    self.check_import(alias.name.as_str());
                }
            }
            ast::Stmt::ImportFrom(node) => {
                if let Some(module) = &node.module {
                    self.check_import_from(module.as_str());
                }
            }
            ast::Stmt::FunctionDef(node) => {
                self.exprs(&node.decorator_list);
                self.body(&node.body);
            }
            ast::Stmt::AsyncFunctionDef(node) => {
                self.exprs(&node.decorator_list);
                self.body(&node.body);
            }
            ast::Stmt::ClassDef(node) => {
                self.exprs(&node.bases);
                for keyword in &node.keywords {
                    self.expr(&keyword.value);
                }
                self.exprs(&node.decorator_list);
                self.body(&node.body);
            }
            ast::Stmt::Return(node) => self.opt_expr(&node.value),
            ast::Stmt::Delete(node) => self.exprs(&node.targets),
            ast::Stmt::Assign(node) => {
                self.exprs(&node.targets);
                self.expr(&node.value);
            }
            ast::Stmt::AugAssign(node) => {
                self.expr(&node.target);
                self.expr(&node.value);
            }
            ast::Stmt::AnnAssign(node) => {
                self.expr(&node.target);
                self.expr(&node.annotation);
                self.opt_expr(&node.value);
            }
            ast::Stmt::For(node) => {
                self.expr(&node.target);
                self.expr(&node.iter);
                self.body(&node.body);
                self.body(&node.orelse);
            }
            ast::Stmt::AsyncFor(node) => {
                self.expr(&node.target);
                self.expr(&node.iter);
                self.body(&node.body);
                self.body(&node.orelse);
            }
            ast::Stmt::While(node) => {
                self.expr(&node.test);
                self.body(&node.body);
                self.body(&node.orelse);
            }
            ast::Stmt::If(node) => {
                self.expr(&node.test);
                self.body(&node.body);
                self.body(&node.orelse);
            }
            ast::Stmt::With(node) => {
                for item in &node.items {
                    self.expr(&item.context_expr);
                    if let Some(vars) = &item.optional_vars {
                        self.expr(vars);
                    }
                }
                self.body(&node.body);
            }
            ast::Stmt::AsyncWith(node) => {
                for item in &node.items {
                    self.expr(&item.context_expr);
                    if let Some(vars) = &item.optional_vars {
                        self.expr(vars);
                    }
                }
                self.body(&node.body);
            }
            ast::Stmt::Match(node) => {
                self.expr(&node.subject);
                for case in &node.cases {
                    if let Some(guard) = &case.guard {
                        self.expr(guard);
                    }
                    self.body(&case.body);
                }
            }
            ast::Stmt::Raise(node) => {
                self.opt_expr(&node.exc);
                self.opt_expr(&node.cause);
            }
            ast::Stmt::Try(node) => {
                self.body(&node.body);
                for handler in &node.handlers {
                    let ast::ExceptHandler::ExceptHandler(handler) = handler;
                    self.opt_expr(&handler.type_);
                    self.body(&handler.body);
                }
                self.body(&node.orelse);
                self.body(&node.finalbody);
            }
            ast::Stmt::TryStar(node) => {
                self.body(&node.body);
                for handler in &node.handlers {
                    let ast::ExceptHandler::ExceptHandler(handler) = handler;
                    self.opt_expr(&handler.type_);
                    self.body(&handler.body);
                }
                self.body(&node.orelse);
                self.body(&node.finalbody);
            }
            ast::Stmt::Assert(node) => {
                self.expr(&node.test);
                self.opt_expr(&node.msg);
            }
            ast::Stmt::Expr(node) => self.expr(&node.value),
            // Pass, Break, Continue, Global, Nonlocal: no names to check.
            _ => {}
        }
    }

    fn expr(&mut self, expr: &ast::Expr) {
        match expr {
            ast::Expr::Call(node) => {
                self.check_call(&node.func);
                self.expr(&node.func);
                self.exprs(&node.args);
                for keyword in &node.keywords {
                    self.expr(&keyword.value);
                }
            }
            ast::Expr::BoolOp(node) => self.exprs(&node.values),
            ast::Expr::NamedExpr(node) => {
                self.expr(&node.target);
                self.expr(&node.value);
            }
            ast::Expr::BinOp(node) => {
                self.expr(&node.left);
                self.expr(&node.right);
            }
            ast::Expr::UnaryOp(node) => self.expr(&node.operand),
            ast::Expr::Lambda(node) => self.expr(&node.body),
            ast::Expr::IfExp(node) => {
                self.expr(&node.test);
                self.expr(&node.body);
                self.expr(&node.orelse);
            }
            ast::Expr::Dict(node) => {
                for key in node.keys.iter().flatten() {
                    self.expr(key);
                }
                self.exprs(&node.values);
            }
            ast::Expr::Set(node) => self.exprs(&node.elts),
            ast::Expr::ListComp(node) => {
                self.expr(&node.elt);
                self.comprehensions(&node.generators);
            }
            ast::Expr::SetComp(node) => {
                self.expr(&node.elt);
                self.comprehensions(&node.generators);
            }
            ast::Expr::DictComp(node) => {
                self.expr(&node.key);
                self.expr(&node.value);
                self.comprehensions(&node.generators);
            }
            ast::Expr::GeneratorExp(node) => {
                self.expr(&node.elt);
                self.comprehensions(&node.generators);
            }
            ast::Expr::Await(node) => self.expr(&node.value),
            ast::Expr::Yield(node) => self.opt_expr(&node.value),
            ast::Expr::YieldFrom(node) => self.expr(&node.value),
            ast::Expr::Compare(node) => {
                self.expr(&node.left);
                self.exprs(&node.comparators);
            }
            ast::Expr::FormattedValue(node) => {
                self.expr(&node.value);
                self.opt_expr(&node.format_spec);
            }
            ast::Expr::JoinedStr(node) => self.exprs(&node.values),
            ast::Expr::Attribute(node) => self.expr(&node.value),
            ast::Expr::Subscript(node) => {
                self.expr(&node.value);
                self.expr(&node.slice);
            }
            ast::Expr::Starred(node) => self.expr(&node.value),
            ast::Expr::List(node) => self.exprs(&node.elts),
            ast::Expr::Tuple(node) => self.exprs(&node.elts),
            ast::Expr::Slice(node) => {
                self.opt_expr(&node.lower);
                self.opt_expr(&node.upper);
                self.opt_expr(&node.step);
            }
            // Name and Constant are leaves.
            _ => {}
        }
    }

    fn comprehensions(&mut self, generators: &[ast::Comprehension]) {
        for generator in generators {
            self.expr(&generator.target);
            self.expr(&generator.iter);
            self.exprs(&generator.ifs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_script_passes() {
        let scanner = Scanner::new();
        let code = br#"
import math
import json

def main():
    print(json.dumps({"pi": math.pi}))

main()
"#;
        assert!(scanner.scan(code).is_ok());
    }

    #[test]
    fn test_forbidden_import() {
        let scanner = Scanner::new();
        let err = scanner.scan(b"import os\nprint(1)").unwrap_err();
        assert_eq!(err.0, "Security Violation: Import 'os' is forbidden.");
    }

    #[test]
    fn test_forbidden_import_submodule() {
        let scanner = Scanner::new();
        let err = scanner.scan(b"import urllib.request").unwrap_err();
        assert_eq!(
            err.0,
            "Security Violation: Import 'urllib.request' is forbidden."
        );
    }

    #[test]
    fn test_forbidden_from_import() {
        let scanner = Scanner::new();
        let err = scanner.scan(b"from subprocess import run").unwrap_err();
        assert_eq!(
            err.0,
            "Security Violation: From-Import 'subprocess' is forbidden."
        );
    }

    #[test]
    fn test_forbidden_call() {
        let scanner = Scanner::new();
        let err = scanner.scan(b"eval('1+1')").unwrap_err();
        assert_eq!(err.0, "Security Violation: Function 'eval()' is forbidden.");
    }

    #[test]
    fn test_dunder_import_call() {
        let scanner = Scanner::new();
        let err = scanner.scan(b"__import__('os')").unwrap_err();
        assert_eq!(
            err.0,
            "Security Violation: Function '__import__()' is forbidden."
        );
    }

    #[test]
    fn test_import_nested_in_function() {
        let scanner = Scanner::new();
        let code = br#"
def sneak():
    import socket
    return socket
"#;
        let err = scanner.scan(code).unwrap_err();
        assert_eq!(err.0, "Security Violation: Import 'socket' is forbidden.");
    }

    #[test]
    fn test_call_nested_in_expression() {
        let scanner = Scanner::new();
        let code = b"data = [open(f) for f in files]";
        let err = scanner.scan(code).unwrap_err();
        assert_eq!(err.0, "Security Violation: Function 'open()' is forbidden.");
    }

    #[test]
    fn test_call_inside_try_handler() {
        let scanner = Scanner::new();
        let code = br#"
try:
    x = 1
except ValueError:
    exec("x = 2")
"#;
        let err = scanner.scan(code).unwrap_err();
        assert_eq!(err.0, "Security Violation: Function 'exec()' is forbidden.");
    }

    #[test]
    fn test_all_violations_reported() {
        let scanner = Scanner::new();
        let code = b"import os\nfrom subprocess import run\neval('1')\n";
        let err = scanner.scan(code).unwrap_err();
        let lines: Vec<&str> = err.0.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Security Violation: Import 'os' is forbidden.",
                "Security Violation: From-Import 'subprocess' is forbidden.",
                "Security Violation: Function 'eval()' is forbidden.",
            ]
        );
    }

    #[test]
    fn test_syntax_error_is_rejection() {
        let scanner = Scanner::new();
        let err = scanner.scan(b"print(").unwrap_err();
        assert!(err.0.starts_with("Syntax Error"));
    }

    #[test]
    fn test_invalid_utf8_is_rejection() {
        let scanner = Scanner::new();
        let err = scanner.scan(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(err.0.starts_with("Syntax Error"));
    }

    #[test]
    fn test_attribute_call_is_not_a_bare_call() {
        // builtins.open is an attribute call, not a bare identifier; the
        // scanner only matches bare names. The sandbox contains the rest.
        let scanner = Scanner::new();
        assert!(scanner.scan(b"x.open('f')").is_ok());
    }

    #[test]
    fn test_custom_sets() {
        let scanner = Scanner::with_sets(
            ["numpy".to_string()],
            ["print".to_string()],
        );
        assert!(scanner.scan(b"import os").is_ok());
        let err = scanner.scan(b"import numpy").unwrap_err();
        assert_eq!(err.0, "Security Violation: Import 'numpy' is forbidden.");
        let err = scanner.scan(b"print(1)").unwrap_err();
        assert_eq!(err.0, "Security Violation: Function 'print()' is forbidden.");
    }
}
