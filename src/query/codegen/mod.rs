// Code Generation Module
//
// Compiled fast path for scan filters: conditions without computed members are
// flattened into postfix programs and evaluated by a stack machine.

pub mod program;
pub mod vm;

use log::debug;

use crate::query::condition::LogicalExpression;
use crate::query::executor::result::QueryResult;

pub use self::program::{Instruction, Program};
pub use self::vm::FilterVm;

/// True when no part of the condition runs application code
pub fn can_code_gen(condition: &LogicalExpression) -> bool {
    !condition.involves_code_execution()
}

/// Compile a condition, or `None` when it cannot be compiled
pub fn compile(condition: &LogicalExpression) -> QueryResult<Option<Program>> {
    if !can_code_gen(condition) {
        debug!("Condition {} involves code execution, using the interpreter", condition);
        return Ok(None);
    }
    let program = Program::compile(condition)?;
    debug!("Compiled filter {} into {} instructions", condition, program.len());
    Ok(Some(program))
}
