//! Single-pass syntax-tree walk that extracts a [`FactSheet`].
//!
//! The script is parsed, never executed. Nested functions and closures are
//! walked like any other code; only registration detection cares about scope.

use crate::facts::{FactSheet, InputKey, PrivilegedCall, UnsafePattern};
use crate::value::{resolve, Literal};
use rustpython_parser::ast::{self, Expr, Stmt, Visitor};
use rustpython_parser::Parse;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Module the SDK is imported from.
pub const SDK_MODULE: &str = "appstore";
/// Base class every app derives from.
pub const APP_BASE_CLASS: &str = "BaseApp";
/// Lifecycle method every app must implement.
pub const INSTALL_METHOD: &str = "install";
/// Module-level registration entry point: `run(AppClass)`.
pub const REGISTER_FUNCTION: &str = "run";
/// Attribute on `self` exposing typed user inputs.
pub const INPUTS_ATTRIBUTE: &str = "inputs";

const SELF: &str = "self";

/// Analyzes script source. Parse failures are reported in [`FactSheet::error`].
pub fn analyze(source: &str) -> FactSheet {
    let lines = LineIndex::new(source);
    let suite = match ast::Suite::parse(source, "<script>") {
        Ok(suite) => suite,
        Err(err) => {
            let line = lines.line_of(u32::from(err.offset) as usize);
            return FactSheet::parse_failure(format!("SyntaxError: {} (line {line})", err.error));
        }
    };

    let mut collector = FactCollector::new(&lines);
    for stmt in suite {
        collector.visit_stmt(stmt);
    }
    collector.finish()
}

/// Reads and analyzes a script file.
pub fn analyze_file(path: impl AsRef<Path>) -> std::io::Result<FactSheet> {
    let source = std::fs::read_to_string(path)?;
    Ok(analyze(&source))
}

/// Byte offset to 1-based line number.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    fn line_of(&self, offset: usize) -> usize {
        self.starts.partition_point(|&start| start <= offset)
    }
}

/// Process and shell primitives that bypass the SDK surface.
fn is_unsafe_primitive(module: &str, function: &str) -> bool {
    match module {
        "os" => {
            matches!(function, "system" | "popen" | "posix_spawn" | "posix_spawnp")
                || function.starts_with("exec")
                || function.starts_with("spawn")
        }
        "subprocess" => matches!(
            function,
            "call" | "run" | "Popen" | "check_call" | "check_output" | "getoutput" | "getstatusoutput"
        ),
        _ => false,
    }
}

fn is_name(expr: &Expr, name: &str) -> bool {
    matches!(expr, Expr::Name(ast::ExprName { id, .. }) if id.as_str() == name)
}

fn is_app_base(expr: &Expr) -> bool {
    match expr {
        Expr::Name(ast::ExprName { id, .. }) => id.as_str() == APP_BASE_CLASS,
        Expr::Attribute(ast::ExprAttribute { attr, .. }) => attr.as_str() == APP_BASE_CLASS,
        _ => false,
    }
}

struct FactCollector<'a> {
    lines: &'a LineIndex,
    sheet: FactSheet,
    app_class_found: bool,
    /// Function/class nesting; 0 is module level.
    scope_depth: usize,
    registered: Vec<String>,
    /// Local name bound to `os` / `subprocess`.
    module_aliases: HashMap<String, String>,
    /// Local name bound to an unsafe function, e.g. `Popen` -> `subprocess.Popen`.
    function_aliases: HashMap<String, String>,
}

impl<'a> FactCollector<'a> {
    fn new(lines: &'a LineIndex) -> Self {
        let module_aliases = ["os", "subprocess"]
            .into_iter()
            .map(|m| (m.to_string(), m.to_string()))
            .collect();
        Self {
            lines,
            sheet: FactSheet::default(),
            app_class_found: false,
            scope_depth: 0,
            registered: Vec::new(),
            module_aliases,
            function_aliases: HashMap::new(),
        }
    }

    fn finish(mut self) -> FactSheet {
        let class_name = &self.sheet.class_name;
        self.sheet.has_run_registration =
            !class_name.is_empty() && self.registered.iter().any(|r| r == class_name);
        self.sheet
    }

    fn record_unsafe(&mut self, line: usize, pattern: String) {
        self.sheet.unsafe_patterns.push(UnsafePattern { line, pattern });
    }

    fn record_registration(&mut self, args: &[Expr]) {
        if self.scope_depth != 0 {
            return;
        }
        if let Some(Expr::Name(ast::ExprName { id, .. })) = args.first() {
            self.registered.push(id.as_str().to_owned());
        }
    }

    fn record_privileged_call(&mut self, method: &str, line: usize, call: &ast::ExprCall) {
        let args = call.args.iter().map(resolve).collect();
        let mut kwargs = BTreeMap::new();
        for keyword in &call.keywords {
            match &keyword.arg {
                Some(name) => {
                    kwargs.insert(name.as_str().to_owned(), resolve(&keyword.value));
                }
                None => {
                    kwargs.insert("**".to_owned(), Literal::Dynamic);
                }
            }
        }
        self.sheet.privileged_calls.push(PrivilegedCall {
            method: method.to_owned(),
            line,
            args,
            kwargs,
        });
    }

    fn record_input_key(&mut self, accessor_kind: &str, line: usize, call: &ast::ExprCall) {
        // Unresolvable keys are not recorded: nothing can be claimed about them.
        let first = call.args.first().map(resolve);
        if let Some(key) = first.as_ref().and_then(Literal::as_str) {
            self.sheet.input_keys.push(InputKey {
                key: key.to_owned(),
                line,
                accessor_kind: accessor_kind.to_owned(),
            });
        }
    }
}

impl Visitor for FactCollector<'_> {
    fn visit_stmt_import(&mut self, node: ast::StmtImport) {
        for alias in &node.names {
            let module = alias.name.as_str();
            if module == "os" || module == "subprocess" {
                let local = alias.asname.as_ref().map_or(module, |a| a.as_str());
                self.module_aliases.insert(local.to_owned(), module.to_owned());
            }
        }
        self.generic_visit_stmt_import(node);
    }

    fn visit_stmt_import_from(&mut self, node: ast::StmtImportFrom) {
        let module = node.module.as_ref().map(|m| m.as_str()).unwrap_or_default();
        let from_sdk = module == SDK_MODULE
            || module
                .strip_prefix(SDK_MODULE)
                .is_some_and(|rest| rest.starts_with('.'));

        for alias in &node.names {
            let name = alias.name.as_str();
            if from_sdk && !self.sheet.imports.iter().any(|i| i == name) {
                self.sheet.imports.push(name.to_owned());
            }
            if is_unsafe_primitive(module, name) {
                let local = alias.asname.as_ref().map_or(name, |a| a.as_str());
                self.function_aliases
                    .insert(local.to_owned(), format!("{module}.{name}"));
            }
        }
        self.generic_visit_stmt_import_from(node);
    }

    fn visit_stmt_class_def(&mut self, node: ast::StmtClassDef) {
        // First subclass wins; later ones are walked but not treated as the app.
        if !self.app_class_found && node.bases.iter().any(is_app_base) {
            self.app_class_found = true;
            self.sheet.class_name = node.name.as_str().to_owned();
            for item in &node.body {
                let name = match item {
                    Stmt::FunctionDef(def) => def.name.as_str(),
                    Stmt::AsyncFunctionDef(def) => def.name.as_str(),
                    _ => continue,
                };
                if name == INSTALL_METHOD {
                    self.sheet.has_install_method = true;
                }
                self.sheet.defined_methods.push(name.to_owned());
            }
        }

        self.scope_depth += 1;
        self.generic_visit_stmt_class_def(node);
        self.scope_depth -= 1;
    }

    fn visit_stmt_function_def(&mut self, node: ast::StmtFunctionDef) {
        self.scope_depth += 1;
        self.generic_visit_stmt_function_def(node);
        self.scope_depth -= 1;
    }

    fn visit_stmt_async_function_def(&mut self, node: ast::StmtAsyncFunctionDef) {
        self.scope_depth += 1;
        self.generic_visit_stmt_async_function_def(node);
        self.scope_depth -= 1;
    }

    fn visit_expr_call(&mut self, node: ast::ExprCall) {
        let line = self.lines.line_of(u32::from(node.range.start()) as usize);

        match node.func.as_ref() {
            Expr::Name(ast::ExprName { id, .. }) => {
                let name = id.as_str();
                if let Some(pattern) = self.function_aliases.get(name).cloned() {
                    self.record_unsafe(line, pattern);
                } else if name == REGISTER_FUNCTION {
                    self.record_registration(&node.args);
                }
            }
            Expr::Attribute(ast::ExprAttribute { value, attr, .. }) => {
                let method = attr.as_str();
                match value.as_ref() {
                    // self.<method>(...)
                    Expr::Name(ast::ExprName { id, .. }) if id.as_str() == SELF => {
                        self.record_privileged_call(method, line, &node);
                    }
                    Expr::Name(ast::ExprName { id, .. }) => {
                        let receiver = id.as_str();
                        if receiver == SDK_MODULE && method == REGISTER_FUNCTION {
                            self.record_registration(&node.args);
                        }
                        if let Some(module) = self.module_aliases.get(receiver).cloned() {
                            if is_unsafe_primitive(&module, method) {
                                self.record_unsafe(line, format!("{module}.{method}"));
                            }
                        }
                    }
                    // self.inputs.<kind>("key")
                    Expr::Attribute(ast::ExprAttribute {
                        value: receiver,
                        attr: namespace,
                        ..
                    }) if is_name(receiver, SELF) && namespace.as_str() == INPUTS_ATTRIBUTE => {
                        self.record_input_key(method, line, &node);
                    }
                    _ => {}
                }
            }
            _ => {}
        }

        self.generic_visit_expr_call(node);
    }
}
