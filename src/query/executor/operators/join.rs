// Nested Loop Join
//
// For every row of the left input the right input is reset with that row as
// its context and enumerated. A left outer join emits one null placeholder
// row when the right input produces nothing for a left row. The optional
// post-join condition is evaluated on the combined rows, outside the loop.

use std::sync::Arc;

use log::debug;

use crate::common::types::{ExtentSet, NodeId, QueryFlags};
use crate::query::condition::LogicalExpression;
use crate::query::executor::enumerator::{EnumeratorBase, ExecutionEnumerator, indent, next_node_id};
use crate::query::executor::offset_key::{OffsetKeyReader, OffsetKeyWriter, PayloadWriter};
use crate::query::executor::operators::{EnumeratorNodeType, JoinType};
use crate::query::executor::result::{QueryError, QueryResult, Row, RowTypeBinding};
use crate::query::expression::VariableArray;

#[derive(Debug)]
pub struct Join {
    base: EnumeratorBase,
    left: Box<dyn ExecutionEnumerator>,
    right: Box<dyn ExecutionEnumerator>,
    join_type: JoinType,
    post_condition: Option<LogicalExpression>,
    /// The right input is enumerating for the current left row
    right_active: bool,
    /// An offset key was replayed and the first left row is still to come
    replaying: bool,
}

impl Join {
    /// Build a join and number the whole subtree from zero
    pub fn new(
        base: EnumeratorBase,
        left: Box<dyn ExecutionEnumerator>,
        right: Box<dyn ExecutionEnumerator>,
        join_type: JoinType,
        post_condition: Option<LogicalExpression>,
    ) -> QueryResult<Self> {
        let mut join = Join {
            base,
            left,
            right,
            join_type,
            post_condition,
            right_active: false,
            replaying: false,
        };
        join.assign_node_ids(0)?;
        Ok(join)
    }

    pub fn join_type(&self) -> JoinType {
        self.join_type
    }

    pub fn left(&self) -> &dyn ExecutionEnumerator {
        self.left.as_ref()
    }

    pub fn right(&self) -> &dyn ExecutionEnumerator {
        self.right.as_ref()
    }

    fn passes_post_condition(&self, row: &Row) -> QueryResult<bool> {
        match &self.post_condition {
            Some(condition) => condition.filtrate(row),
            None => Ok(true),
        }
    }
}

impl ExecutionEnumerator for Join {
    fn base(&self) -> &EnumeratorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EnumeratorBase {
        &mut self.base
    }

    fn node_type(&self) -> EnumeratorNodeType {
        EnumeratorNodeType::Join
    }

    fn advance(&mut self) -> QueryResult<Option<Row>> {
        loop {
            if self.right_active {
                let more = match self.join_type {
                    JoinType::Inner => self.right.move_next()?,
                    JoinType::LeftOuter => self.right.move_next_special(false)?,
                };
                if more {
                    let row = self
                        .right
                        .current_row()
                        .cloned()
                        .ok_or_else(|| QueryError::Internal("Right input advanced without a row".into()))?;
                    if self.passes_post_condition(&row)? {
                        return Ok(Some(row));
                    }
                    continue;
                }
                self.right_active = false;
            }
            if !self.left.move_next()? {
                return Ok(None);
            }
            if std::mem::take(&mut self.replaying) && !self.left.is_at_recreated_key() {
                debug!(
                    "{} left input moved past the offset key, restarting the right input",
                    self.get_unique_name(0)
                );
                self.right.discard_recreation();
            }
            let left_row = self.left.current_row().cloned();
            self.right.reset(left_row)?;
            self.right_active = true;
        }
    }

    fn reset_state(&mut self) -> QueryResult<()> {
        self.right_active = false;
        let context = self.base.context.clone();
        self.left.reset(context)
    }

    fn extents(&self, extents: &mut ExtentSet) {
        self.left.extents(extents);
        self.right.extents(extents);
    }

    fn assign_node_ids(&mut self, first: NodeId) -> QueryResult<NodeId> {
        let next = self.left.assign_node_ids(first)?;
        let next = self.right.assign_node_ids(next)?;
        self.base.node_id = next;
        next_node_id(next)
    }

    fn clone_enumerator(
        &self,
        row_type_binding: &Arc<RowTypeBinding>,
        variables: &VariableArray,
    ) -> QueryResult<Box<dyn ExecutionEnumerator>> {
        Ok(Box::new(Join {
            base: self.base.clone_for(row_type_binding, variables)?,
            left: self.left.clone_enumerator(row_type_binding, variables)?,
            right: self.right.clone_enumerator(row_type_binding, variables)?,
            join_type: self.join_type,
            post_condition: self
                .post_condition
                .as_ref()
                .map(|c| c.clone_with(variables))
                .transpose()?,
            right_active: false,
            replaying: false,
        }))
    }

    fn save_enumerator(&self, writer: &mut OffsetKeyWriter, expected: NodeId) -> QueryResult<NodeId> {
        let next = self.left.save_enumerator(writer, expected)?;
        let next = self.right.save_enumerator(writer, next)?;
        self.base.check_node_id(next)?;
        writer.add_section(self.base.node_id, EnumeratorNodeType::Join, PayloadWriter::new())?;
        next_node_id(next)
    }

    fn recreate(&mut self, reader: &mut OffsetKeyReader<'_>, pin: bool) -> QueryResult<()> {
        self.left.recreate(reader, true)?;
        self.right.recreate(reader, pin)?;
        reader.next_section(self.base.node_id, EnumeratorNodeType::Join)?.finish()?;
        self.replaying = true;
        Ok(())
    }

    fn discard_recreation(&mut self) {
        self.left.discard_recreation();
        self.right.discard_recreation();
        self.replaying = false;
        self.base.discard_recreation();
    }

    fn is_at_recreated_key(&self) -> bool {
        self.left.is_at_recreated_key() && self.right.is_at_recreated_key()
    }

    fn populate_query_flags(&self, flags: &mut QueryFlags) {
        self.left.populate_query_flags(flags);
        self.right.populate_query_flags(flags);
        if let Some(condition) = &self.post_condition {
            condition.populate_query_flags(flags);
        }
    }

    fn build_string(&self, out: &mut String, tabs: usize) {
        indent(out, tabs);
        let kind = match self.join_type {
            JoinType::Inner => "INNER",
            JoinType::LeftOuter => "LEFT OUTER",
        };
        out.push_str(&format!("Join(node {}, {})\n", self.base.node_id, kind));
        if let Some(condition) = &self.post_condition {
            indent(out, tabs + 1);
            out.push_str(&format!("POST {}\n", condition));
        }
        self.left.build_string(out, tabs + 1);
        self.right.build_string(out, tabs + 1);
    }

    fn depth(&self) -> usize {
        1 + self.left.depth().max(self.right.depth())
    }

    fn generate_compilable_code(&self, out: &mut String) -> QueryResult<()> {
        self.left.generate_compilable_code(out)?;
        self.right.generate_compilable_code(out)
    }

    fn has_code_generation(&self) -> bool {
        self.left.has_code_generation() || self.right.has_code_generation()
    }

    fn collect_layout(&self, layout: &mut Vec<(NodeId, EnumeratorNodeType)>) {
        self.left.collect_layout(layout);
        self.right.collect_layout(layout);
        layout.push((self.base.node_id, EnumeratorNodeType::Join));
    }
}
