// src/calc/mod.rs
//
// Built-in reference backend: a tiny expression language ("calc") that
// exercises every pipeline contract end to end. Fetched module bytes are
// JSON export tables; compilation checks calls against them, type-checks
// `let` annotations, optionally folds integer constants in release mode,
// and emits the checked program as a JSON image the in-memory host can
// load and run.
//
// This backend exists so the pipeline has one real implementation pair
// (CompilerBackend + ModuleHost) for the CLI and the test suite; a
// production deployment substitutes its own backend behind the same trait.

pub mod ast;
pub mod host;
pub mod parser;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::backend::{
    CompilationRequest, CompilerBackend, Diagnostic, Emission, Optimize, Severity, SourceKind,
};
use crate::invoker::CONVENTIONAL_ENTRY;

use self::ast::{BinOp, Expr, ExprKind, Program, Stmt, StmtKind, Ty};

/// Core runtime module of the calc language. Always part of the resolved
/// reference set, whether or not the host lists it.
pub const CORE_MODULE: &str = "calc.core";

const UNRESOLVED_FUNCTION: &str = "CALC0100";
const UNKNOWN_VARIABLE: &str = "CALC0101";
const TYPE_MISMATCH: &str = "CALC0200";
const BAD_OPERATOR: &str = "CALC0201";
const UNREADABLE_REFERENCE: &str = "CALC0002";

/// Entry-point name of a regular unit.
const REGULAR_ENTRY: &str = "main";

/// Export table carried in a module's raw bytes.
#[derive(Debug, Deserialize)]
struct ExportTable {
    exports: HashMap<String, Value>,
}

/// The binary image this backend emits: the checked program plus the
/// import snapshot it was compiled against, JSON-serialized.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct CompiledImage {
    pub(crate) module: String,
    pub(crate) entry: String,
    pub(crate) program: Program,
    pub(crate) exports: HashMap<String, Value>,
}

#[derive(Default)]
pub struct CalcBackend;

impl CalcBackend {
    pub fn new() -> Self {
        CalcBackend
    }
}

impl CompilerBackend for CalcBackend {
    fn baseline_module(&self) -> &str {
        CORE_MODULE
    }

    fn compile(&self, request: &CompilationRequest) -> Emission {
        let parsed = match request.kind() {
            SourceKind::Script => parser::parse_script(request.source()),
            SourceKind::Regular => parser::parse_regular(request.source()),
        };
        let mut program = match parsed {
            Ok(program) => program,
            Err(diag) => {
                return Emission {
                    image: None,
                    entry_point: None,
                    diagnostics: vec![diag],
                };
            }
        };

        let mut diagnostics = Vec::new();

        // Merge export tables from the supplied references. A reference
        // whose bytes are not a readable export table contributes nothing;
        // that is worth a warning but must not block emission.
        let mut exports: HashMap<String, Value> = HashMap::new();
        for reference in request.references() {
            match serde_json::from_slice::<ExportTable>(reference.bytes()) {
                Ok(table) => {
                    debug!(module = %reference.name(), exports = table.exports.len(), "export table loaded");
                    for (name, value) in table.exports {
                        exports.entry(name).or_insert(value);
                    }
                }
                Err(err) => diagnostics.push(Diagnostic {
                    line: 0,
                    column: 0,
                    code: UNREADABLE_REFERENCE.to_string(),
                    severity: Severity::Warning,
                    message: format!(
                        "reference '{}' has no readable export table: {err}",
                        reference.name()
                    ),
                }),
            }
        }

        check_program(&program, &exports, &mut diagnostics);
        if diagnostics.iter().any(|d| d.severity.blocks_emission()) {
            return Emission {
                image: None,
                entry_point: None,
                diagnostics,
            };
        }

        if request.optimize() == Optimize::Release {
            for stmt in &mut program.stmts {
                fold_stmt(stmt);
            }
        }

        let entry = match request.kind() {
            SourceKind::Script => CONVENTIONAL_ENTRY,
            SourceKind::Regular => REGULAR_ENTRY,
        };
        let image = CompiledImage {
            module: request.module_name().to_string(),
            entry: entry.to_string(),
            program,
            exports,
        };
        // The image is plain JSON; the host parses it back on load.
        let bytes = match serde_json::to_vec(&image) {
            Ok(bytes) => bytes,
            Err(err) => {
                diagnostics.push(Diagnostic::error(
                    0,
                    0,
                    "CALC0003",
                    format!("failed to serialize emitted image: {err}"),
                ));
                return Emission {
                    image: None,
                    entry_point: None,
                    diagnostics,
                };
            }
        };

        let entry_point = match request.kind() {
            SourceKind::Script => Some(format!("{}::{}", request.module_name(), entry)),
            SourceKind::Regular => None,
        };
        Emission {
            image: Some(bytes),
            entry_point,
            diagnostics,
        }
    }
}

/// Inferred type during checking. `Any` means "not statically known",
/// typically an export whose constant is neither an integer nor a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckTy {
    Int,
    Str,
    Any,
}

impl CheckTy {
    fn name(self) -> &'static str {
        match self {
            CheckTy::Int => "int",
            CheckTy::Str => "string",
            CheckTy::Any => "any",
        }
    }

    fn compatible_with(self, declared: Ty) -> bool {
        match (self, declared) {
            (CheckTy::Any, _) => true,
            (CheckTy::Int, Ty::Int) => true,
            (CheckTy::Str, Ty::Str) => true,
            _ => false,
        }
    }
}

fn ty_of_export(value: &Value) -> CheckTy {
    if value.is_i64() {
        CheckTy::Int
    } else if value.is_string() {
        CheckTy::Str
    } else {
        CheckTy::Any
    }
}

fn check_program(program: &Program, exports: &HashMap<String, Value>, diags: &mut Vec<Diagnostic>) {
    let mut env: HashMap<String, CheckTy> = HashMap::new();

    for stmt in &program.stmts {
        match &stmt.kind {
            StmtKind::Let { name, ty, value } => {
                let actual = check_expr(value, &env, exports, diags);
                if let Some(declared) = ty {
                    if !actual.compatible_with(*declared) {
                        diags.push(Diagnostic::error(
                            value.line,
                            value.column,
                            TYPE_MISMATCH,
                            format!(
                                "type mismatch: cannot assign a {} value to '{}: {}'",
                                actual.name(),
                                name,
                                declared.name()
                            ),
                        ));
                    }
                }
                let bound = match ty {
                    Some(Ty::Int) => CheckTy::Int,
                    Some(Ty::Str) => CheckTy::Str,
                    None => actual,
                };
                env.insert(name.clone(), bound);
            }
            StmtKind::Return(value) | StmtKind::Expr(value) => {
                check_expr(value, &env, exports, diags);
            }
        }
    }
}

fn check_expr(
    expr: &Expr,
    env: &HashMap<String, CheckTy>,
    exports: &HashMap<String, Value>,
    diags: &mut Vec<Diagnostic>,
) -> CheckTy {
    match &expr.kind {
        ExprKind::Int(_) => CheckTy::Int,
        ExprKind::Str(_) => CheckTy::Str,
        ExprKind::Var(name) => match env.get(name) {
            Some(ty) => *ty,
            None => {
                diags.push(Diagnostic::error(
                    expr.line,
                    expr.column,
                    UNKNOWN_VARIABLE,
                    format!("unknown variable '{name}'"),
                ));
                CheckTy::Any
            }
        },
        ExprKind::Call(name) => match exports.get(name) {
            Some(value) => ty_of_export(value),
            None => {
                diags.push(Diagnostic::error(
                    expr.line,
                    expr.column,
                    UNRESOLVED_FUNCTION,
                    format!("unresolved function '{name}': no referenced module exports it"),
                ));
                CheckTy::Any
            }
        },
        ExprKind::Binary { op, lhs, rhs } => {
            let lt = check_expr(lhs, env, exports, diags);
            let rt = check_expr(rhs, env, exports, diags);
            match (lt, rt) {
                (CheckTy::Int, CheckTy::Int) => CheckTy::Int,
                (CheckTy::Str, CheckTy::Str) if *op == BinOp::Add => CheckTy::Str,
                (CheckTy::Str, CheckTy::Str) => {
                    diags.push(Diagnostic::error(
                        expr.line,
                        expr.column,
                        BAD_OPERATOR,
                        format!("operator '{}' is not defined for strings", op.symbol()),
                    ));
                    CheckTy::Any
                }
                (CheckTy::Any, _) | (_, CheckTy::Any) => CheckTy::Any,
                (lt, rt) => {
                    diags.push(Diagnostic::error(
                        expr.line,
                        expr.column,
                        TYPE_MISMATCH,
                        format!(
                            "type mismatch: operator '{}' cannot combine {} and {}",
                            op.symbol(),
                            lt.name(),
                            rt.name()
                        ),
                    ));
                    CheckTy::Any
                }
            }
        }
    }
}

fn fold_stmt(stmt: &mut Stmt) {
    match &mut stmt.kind {
        StmtKind::Let { value, .. } | StmtKind::Return(value) | StmtKind::Expr(value) => {
            fold_expr(value);
        }
    }
}

/// Constant-fold integer arithmetic in place. Division by zero and
/// overflow are left unfolded so they surface at run time, same as in
/// debug mode.
fn fold_expr(expr: &mut Expr) {
    if let ExprKind::Binary { op, lhs, rhs } = &mut expr.kind {
        fold_expr(lhs);
        fold_expr(rhs);
        if let (ExprKind::Int(a), ExprKind::Int(b)) = (&lhs.kind, &rhs.kind) {
            let folded = match op {
                BinOp::Add => a.checked_add(*b),
                BinOp::Sub => a.checked_sub(*b),
                BinOp::Mul => a.checked_mul(*b),
                BinOp::Div => {
                    if *b == 0 {
                        None
                    } else {
                        a.checked_div(*b)
                    }
                }
            };
            if let Some(value) = folded {
                expr.kind = ExprKind::Int(value);
            }
        }
    }
}
