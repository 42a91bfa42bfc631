// Filter Programs
//
// A compiled filter is a postfix instruction list. Compilation flattens a
// condition tree once so evaluation is a loop over a vector instead of a
// recursive walk over boxed nodes.

use std::fmt;

use crate::common::types::{DbTypeCode, ExtentNumber};
use crate::query::condition::{Comparison, LikePattern, LogicalExpression, TruthValue};
use crate::query::condition::{ComparisonOperator, LogicalOperator};
use crate::query::executor::result::{QueryError, QueryResult};
use crate::query::expression::{Member, Operator, Path, Value, ValueExpression, Variable};

/// One step of a filter program
#[derive(Debug, Clone)]
pub enum Instruction {
    /// Push a constant
    LoadLiteral(Option<Value>),
    /// Push the current value of a variable
    LoadVariable(Variable),
    /// Push a stored value reached from an extent through property indexes;
    /// `column: None` pushes the reached object itself
    LoadPath {
        extent: ExtentNumber,
        steps: Vec<usize>,
        column: Option<usize>,
    },
    /// Pop one or two operands, push the result
    Arithmetic { operator: Operator, type_code: DbTypeCode },
    /// Pop two operands, push a truth value
    Compare {
        operator: ComparisonOperator,
        type_code: DbTypeCode,
        like: Option<LikePattern>,
    },
    /// Push a truth constant
    Truth(TruthValue),
    /// Pop one or two truth values, push the result
    Logical(LogicalOperator),
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::LoadLiteral(Some(value)) => write!(f, "LOAD_LIT_{} {}", value.type_code().code_suffix(), value),
            Instruction::LoadLiteral(None) => write!(f, "LOAD_NULL"),
            Instruction::LoadVariable(variable) => {
                write!(f, "LOAD_VAR_{} ?{}", variable.type_code().code_suffix(), variable.number())
            }
            Instruction::LoadPath { extent, steps, column } => {
                write!(f, "LOAD_PATH {}", extent)?;
                for step in steps {
                    write!(f, ".{}", step)?;
                }
                match column {
                    Some(column) => write!(f, ".{}", column),
                    None => write!(f, ".this"),
                }
            }
            Instruction::Arithmetic { operator, type_code } => {
                write!(f, "{}_{}", operator.mnemonic(), type_code.code_suffix())
            }
            Instruction::Compare { operator, type_code, .. } => {
                write!(f, "{}_{}", operator.mnemonic(), type_code.code_suffix())
            }
            Instruction::Truth(value) => write!(f, "{}", value),
            Instruction::Logical(operator) => write!(f, "{}", operator.mnemonic()),
        }
    }
}

/// A compiled filter condition
#[derive(Debug, Clone, Default)]
pub struct Program {
    instructions: Vec<Instruction>,
}

impl Program {
    /// Flatten a condition. Fails when any path runs application code.
    pub fn compile(condition: &LogicalExpression) -> QueryResult<Program> {
        let mut program = Program::default();
        program.emit_logical(condition)?;
        Ok(program)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    fn emit_logical(&mut self, condition: &LogicalExpression) -> QueryResult<()> {
        match condition {
            LogicalExpression::Literal(value) => self.instructions.push(Instruction::Truth(*value)),
            LogicalExpression::Comparison(comparison) => self.emit_comparison(comparison)?,
            LogicalExpression::Operation(operation) => {
                self.emit_logical(operation.left())?;
                if let Some(right) = operation.right() {
                    self.emit_logical(right)?;
                }
                self.instructions.push(Instruction::Logical(operation.operator()));
            }
        }
        Ok(())
    }

    fn emit_comparison(&mut self, comparison: &Comparison) -> QueryResult<()> {
        self.emit_value(comparison.left())?;
        self.emit_value(comparison.right())?;
        self.instructions.push(Instruction::Compare {
            operator: comparison.operator(),
            type_code: comparison.type_code(),
            like: comparison.like_pattern().cloned(),
        });
        Ok(())
    }

    fn emit_value(&mut self, expression: &ValueExpression) -> QueryResult<()> {
        match expression {
            ValueExpression::Literal(literal) => {
                self.instructions.push(Instruction::LoadLiteral(literal.value().cloned()));
            }
            ValueExpression::Variable(variable) => {
                self.instructions.push(Instruction::LoadVariable(variable.clone()));
            }
            ValueExpression::Path(path) => self.emit_path(path)?,
            ValueExpression::Operation(operation) => {
                self.emit_value(operation.left())?;
                if let Some(right) = operation.right() {
                    self.emit_value(right)?;
                }
                self.instructions.push(Instruction::Arithmetic {
                    operator: operation.operator(),
                    type_code: operation.type_code(),
                });
            }
        }
        Ok(())
    }

    fn emit_path(&mut self, path: &Path) -> QueryResult<()> {
        let steps = path
            .steps()
            .iter()
            .map(property_index)
            .collect::<QueryResult<Vec<_>>>()?;
        let column = match path.member() {
            Member::This => None,
            member => Some(property_index(member)?),
        };
        self.instructions.push(Instruction::LoadPath {
            extent: path.extent_number(),
            steps,
            column,
        });
        Ok(())
    }
}

fn property_index(member: &Member) -> QueryResult<usize> {
    match member {
        Member::Property { index, .. } => Ok(*index),
        other => Err(QueryError::InvalidOperation(format!(
            "Member {} cannot be compiled into a filter program",
            other.name()
        ))),
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for instruction in &self.instructions {
            writeln!(f, "{}", instruction)?;
        }
        Ok(())
    }
}
