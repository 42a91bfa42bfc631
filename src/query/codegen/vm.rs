// Filter Virtual Machine
//
// Executes compiled filter programs against composite rows. The operand stack
// is kept between executions so evaluating a row does not allocate for it.

use crate::query::codegen::program::{Instruction, Program};
use crate::query::condition::TruthValue;
use crate::query::condition::comparison::apply as apply_comparison;
use crate::query::executor::result::{QueryError, QueryResult, Row};
use crate::query::expression::Value;
use crate::query::expression::operation::apply_operator;

#[derive(Debug, Clone)]
enum Slot {
    Value(Option<Value>),
    Truth(TruthValue),
}

/// Stack machine for filter programs
#[derive(Debug, Default)]
pub struct FilterVm {
    stack: Vec<Slot>,
}

impl FilterVm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `program` on `row` and return the resulting truth value
    pub fn execute(&mut self, program: &Program, row: &Row) -> QueryResult<TruthValue> {
        self.stack.clear();
        for instruction in program.instructions() {
            match instruction {
                Instruction::LoadLiteral(value) => self.stack.push(Slot::Value(value.clone())),
                Instruction::LoadVariable(variable) => self.stack.push(Slot::Value(variable.evaluate()?)),
                Instruction::LoadPath { extent, steps, column } => {
                    let value = load_path(row, *extent, steps, *column)?;
                    self.stack.push(Slot::Value(value));
                }
                Instruction::Arithmetic { operator, type_code } => {
                    let right = if operator.is_unary() { None } else { self.pop_value()? };
                    let left = self.pop_value()?;
                    let result = apply_operator(*operator, *type_code, left, right)?;
                    self.stack.push(Slot::Value(result));
                }
                Instruction::Compare { operator, like, .. } => {
                    let right = self.pop_value()?;
                    let left = self.pop_value()?;
                    let truth = apply_comparison(*operator, left.as_ref(), right.as_ref(), like.as_ref())?;
                    self.stack.push(Slot::Truth(truth));
                }
                Instruction::Truth(value) => self.stack.push(Slot::Truth(*value)),
                Instruction::Logical(operator) => {
                    let right = if operator.is_unary() { TruthValue::Unknown } else { self.pop_truth()? };
                    let left = self.pop_truth()?;
                    self.stack.push(Slot::Truth(operator.apply(left, right)));
                }
            }
        }
        let result = self.pop_truth()?;
        if !self.stack.is_empty() {
            return Err(QueryError::Internal(format!(
                "Filter program left {} values on the stack",
                self.stack.len()
            )));
        }
        Ok(result)
    }

    fn pop_value(&mut self) -> QueryResult<Option<Value>> {
        match self.stack.pop() {
            Some(Slot::Value(value)) => Ok(value),
            Some(Slot::Truth(_)) => Err(QueryError::Internal("Expected a value, found a truth value".into())),
            None => Err(QueryError::Internal("Filter program stack underflow".into())),
        }
    }

    fn pop_truth(&mut self) -> QueryResult<TruthValue> {
        match self.stack.pop() {
            Some(Slot::Truth(value)) => Ok(value),
            Some(Slot::Value(_)) => Err(QueryError::Internal("Expected a truth value, found a value".into())),
            None => Err(QueryError::Internal("Filter program stack underflow".into())),
        }
    }
}

fn load_path(row: &Row, extent: usize, steps: &[usize], column: Option<usize>) -> QueryResult<Option<Value>> {
    let Some(root) = row.object_at(extent)? else {
        return Ok(None);
    };
    let mut current = root.clone();
    for &step in steps {
        current = match current.field(step)? {
            Some(Value::Object(next)) => next.clone(),
            None => return Ok(None),
            Some(other) => {
                return Err(QueryError::Internal(format!(
                    "Path step {} yielded {}",
                    step,
                    other.type_code()
                )));
            }
        };
    }
    match column {
        Some(column) => Ok(current.field(column)?.cloned()),
        None => Ok(Some(Value::Object(current))),
    }
}
