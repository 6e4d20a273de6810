// src/calc/host.rs
//
// In-memory module host for images emitted by the calc backend. "Loading"
// deserializes the JSON image back into the checked program; invoking the
// entry point evaluates it. Load failures can only come from bytes the
// calc backend did not emit, which is exactly the fatal integration defect
// the loader contract describes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::error::{InvokeError, LoadError};
use crate::loader::{EntryPointResult, LoadedModule, ModuleHost};

use super::ast::{BinOp, Expr, ExprKind, Program, StmtKind};
use super::CompiledImage;

#[derive(Default)]
pub struct CalcHost;

impl CalcHost {
    pub fn new() -> Self {
        CalcHost
    }
}

impl ModuleHost for CalcHost {
    fn load(&self, image: &[u8], module_name: &str) -> Result<Arc<dyn LoadedModule>, LoadError> {
        let image: CompiledImage =
            serde_json::from_slice(image).map_err(|err| LoadError::Malformed {
                module: module_name.to_string(),
                reason: err.to_string(),
            })?;
        info!(module = module_name, entry = %image.entry, "module loaded");

        // Each load installs a fresh module, even if a module with the
        // same name was loaded before. There is no unload.
        let qualified = format!("{}::{}", image.module, image.entry);
        Ok(Arc::new(CalcModule { image, qualified }))
    }
}

/// A loaded calc module: the program plus the export snapshot it was
/// compiled against.
#[derive(Debug)]
pub struct CalcModule {
    image: CompiledImage,
    qualified: String,
}

#[async_trait]
impl LoadedModule for CalcModule {
    fn name(&self) -> &str {
        &self.image.module
    }

    fn has_entry_point(&self, entry: &str) -> bool {
        entry == self.image.entry || entry == self.qualified
    }

    async fn invoke(&self, entry: &str) -> Result<EntryPointResult, InvokeError> {
        if !self.has_entry_point(entry) {
            return Err(InvokeError::EntryPointNotFound {
                module: self.image.module.clone(),
            });
        }
        run_program(&self.image.program, &self.image.exports)
    }
}

fn run_program(
    program: &Program,
    exports: &HashMap<String, Value>,
) -> Result<Value, InvokeError> {
    let mut vars: HashMap<String, Value> = HashMap::new();

    for stmt in &program.stmts {
        match &stmt.kind {
            StmtKind::Let { name, value, .. } => {
                let value = eval(value, &vars, exports)?;
                vars.insert(name.clone(), value);
            }
            StmtKind::Return(value) => return eval(value, &vars, exports),
            StmtKind::Expr(value) => {
                eval(value, &vars, exports)?;
            }
        }
    }

    // A script that never returns produces null.
    Ok(Value::Null)
}

fn eval(
    expr: &Expr,
    vars: &HashMap<String, Value>,
    exports: &HashMap<String, Value>,
) -> Result<Value, InvokeError> {
    match &expr.kind {
        ExprKind::Int(value) => Ok(Value::from(*value)),
        ExprKind::Str(value) => Ok(Value::String(value.clone())),
        ExprKind::Var(name) => vars
            .get(name)
            .cloned()
            .ok_or_else(|| InvokeError::Execution(format!("unknown variable '{name}'"))),
        ExprKind::Call(name) => exports
            .get(name)
            .cloned()
            .ok_or_else(|| InvokeError::Execution(format!("unresolved function '{name}'"))),
        ExprKind::Binary { op, lhs, rhs } => {
            let lhs = eval(lhs, vars, exports)?;
            let rhs = eval(rhs, vars, exports)?;
            apply(*op, &lhs, &rhs)
        }
    }
}

fn apply(op: BinOp, lhs: &Value, rhs: &Value) -> Result<Value, InvokeError> {
    if let (Some(a), Some(b)) = (lhs.as_i64(), rhs.as_i64()) {
        let result = match op {
            BinOp::Add => a.checked_add(b),
            BinOp::Sub => a.checked_sub(b),
            BinOp::Mul => a.checked_mul(b),
            BinOp::Div => {
                if b == 0 {
                    return Err(InvokeError::Execution("division by zero".to_string()));
                }
                a.checked_div(b)
            }
        };
        return result
            .map(Value::from)
            .ok_or_else(|| InvokeError::Execution("integer overflow".to_string()));
    }

    if let (Value::String(a), Value::String(b)) = (lhs, rhs) {
        if op == BinOp::Add {
            return Ok(Value::String(format!("{a}{b}")));
        }
    }

    Err(InvokeError::Execution(format!(
        "unsupported operand types for '{}'",
        op.symbol()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CompilationRequest, CompilerBackend, Optimize, SourceKind};
    use crate::calc::CalcBackend;

    fn build(source: &str) -> Vec<u8> {
        let request = CompilationRequest::new(
            source,
            Some("host_test".to_string()),
            Vec::new(),
            Optimize::Debug,
            SourceKind::Script,
        )
        .unwrap();
        CalcBackend::new().compile(&request).image.unwrap()
    }

    #[tokio::test]
    async fn loaded_script_runs_to_its_return_value() {
        let image = build("let x = 10;\nreturn x * 4;");
        let module = CalcHost::new().load(&image, "host_test").unwrap();
        let result = module.invoke("__script_main").await.unwrap();
        assert_eq!(result, Value::from(40));
    }

    #[tokio::test]
    async fn qualified_entry_name_also_resolves() {
        let image = build("return 1;");
        let module = CalcHost::new().load(&image, "host_test").unwrap();
        assert!(module.has_entry_point("host_test::__script_main"));
        let result = module.invoke("host_test::__script_main").await.unwrap();
        assert_eq!(result, Value::from(1));
    }

    #[tokio::test]
    async fn script_without_return_yields_null() {
        let image = build("let x = 1;");
        let module = CalcHost::new().load(&image, "host_test").unwrap();
        assert_eq!(module.invoke("__script_main").await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn division_by_zero_propagates_as_execution_error() {
        let image = build("let d = 0;\nreturn 1 / d;");
        let module = CalcHost::new().load(&image, "host_test").unwrap();
        let err = module.invoke("__script_main").await.unwrap_err();
        assert!(matches!(err, InvokeError::Execution(msg) if msg.contains("division by zero")));
    }

    #[test]
    fn garbage_bytes_fail_to_load() {
        let err = CalcHost::new().load(b"junk", "broken").unwrap_err();
        assert!(matches!(err, LoadError::Malformed { .. }));
    }

    #[tokio::test]
    async fn string_concatenation_evaluates() {
        let image = build("return \"a\" + \"b\";");
        let module = CalcHost::new().load(&image, "host_test").unwrap();
        assert_eq!(
            module.invoke("__script_main").await.unwrap(),
            Value::String("ab".to_string())
        );
    }
}
