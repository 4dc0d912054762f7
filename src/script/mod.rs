//! Purpose: Compile and evaluate jq handler expressions against the current event.
//! Exports: `ScriptHandler`, `ScriptValue`.
//! Role: Small adapter around `jaq-core` so plugin units can define handlers without native code.
//! Invariants: Parse/compile failures are plugin errors raised at load time, never per line.
//! Invariants: The first output decides the outcome; no output means `Outcome::None`.
//! Invariants: Runtime evaluation errors are handler errors (reported as a failed call).

mod value;

use std::fmt;

use jaq_core::load::{Arena, File, Loader};
use jaq_core::{Compiler, Ctx, Native, RcIter};
use serde_json::Value;

use crate::core::error::{Error, ErrorKind};
use crate::protocol::Outcome;

pub use value::ScriptValue;

#[derive(Clone)]
pub struct ScriptHandler {
    expr: String,
    filter: jaq_core::Filter<Native<ScriptValue>>,
}

impl fmt::Debug for ScriptHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptHandler")
            .field("expr", &self.expr)
            .finish()
    }
}

impl ScriptHandler {
    /// Compiles `expr`, with `prelude` definitions (if any) in scope.
    pub fn compile(prelude: Option<&str>, expr: &str) -> Result<Self, Error> {
        let code = match prelude {
            Some(prelude) => format!("{prelude}\n{expr}"),
            None => expr.to_string(),
        };

        let arena = Arena::default();
        let loader = Loader::new(std::iter::empty());
        let program = File {
            code: code.as_str(),
            path: (),
        };
        let modules = loader
            .load(&arena, program)
            .map_err(|errs| compile_error(expr, errs))?;

        let filter = Compiler::default()
            .with_funs(jaq_std::base_funs::<ScriptValue>())
            .compile(modules)
            .map_err(|errs| compile_error(expr, errs))?;

        Ok(Self {
            expr: expr.to_string(),
            filter,
        })
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    pub fn evaluate(&self, event: &Value) -> Result<Outcome, Error> {
        let input = ScriptValue::from_json(event);
        let inputs = RcIter::new(std::iter::empty::<Result<ScriptValue, String>>());
        let mut outputs = self.filter.run((Ctx::new([], &inputs), input));

        match outputs.next() {
            None => Ok(Outcome::None),
            Some(Ok(value)) => Ok(Outcome::from_truthy(value.is_truthy())),
            Some(Err(_)) => Err(Error::new(ErrorKind::Handler)
                .with_message(format!("expression `{}` failed at runtime", self.expr))),
        }
    }
}

fn compile_error<E: fmt::Debug>(expr: &str, err: E) -> Error {
    Error::new(ErrorKind::Plugin)
        .with_message("invalid handler expression")
        .with_hint(format!(
            "Failed to parse/compile `{expr}`.\nDetails: {err:?}\nExample: \".type == \\\"click\\\"\""
        ))
}
