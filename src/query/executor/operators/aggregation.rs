// Aggregation
//
// Groups an input sorted by the grouping comparers and folds the set
// functions over every group. Each group becomes a temporary object holding
// the group keys followed by the aggregate results, bound to the aggregation
// extent of the group's first row. Without GROUP BY an empty input still
// produces one row.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::common::types::{ExtentNumber, ExtentSet, NodeId, QueryFlags};
use crate::query::comparer::MultiComparer;
use crate::query::condition::LogicalExpression;
use crate::query::executor::enumerator::{EnumeratorBase, ExecutionEnumerator, indent, next_node_id};
use crate::query::executor::offset_key::{OffsetKeyReader, OffsetKeyWriter, PayloadWriter};
use crate::query::executor::operators::EnumeratorNodeType;
use crate::query::executor::operators::sort::PendingSkip;
use crate::query::executor::result::{QueryError, QueryResult, Row, RowTypeBinding};
use crate::query::expression::{Literal, VariableArray};
use crate::query::set_function::SetFunction;
use crate::storage::{DbObject, PropertyBinding, TypeBinding};

#[derive(Debug)]
pub struct Aggregation {
    base: EnumeratorBase,
    child: Box<dyn ExecutionEnumerator>,
    group_by: MultiComparer,
    functions: Vec<SetFunction>,
    temp_extent: ExtentNumber,
    temp_binding: Arc<TypeBinding>,
    having: Option<LogicalExpression>,
    /// First row of the next group
    lookahead: Option<Row>,
    child_exhausted: bool,
    groups: u64,
    emitted: u64,
    pending: Option<PendingSkip>,
    at_key: bool,
}

impl Aggregation {
    /// Type of the temporary group objects: `G{i}` keys then `A{i}` results
    pub fn temp_type_binding(group_by: &MultiComparer, functions: &[SetFunction]) -> TypeBinding {
        let keys = group_by
            .comparers()
            .iter()
            .enumerate()
            .map(|(i, comparer)| PropertyBinding::derived(&format!("G{}", i), comparer.type_code()));
        let results = functions
            .iter()
            .enumerate()
            .map(|(i, function)| PropertyBinding::derived(&format!("A{}", i), function.type_code()));
        TypeBinding::new("Aggregation", keys.chain(results).collect())
    }

    /// Build an aggregation and number the whole subtree from zero.
    ///
    /// `temp_extent` must be registered in the row type binding with a type
    /// laid out as `temp_type_binding` describes.
    pub fn new(
        base: EnumeratorBase,
        child: Box<dyn ExecutionEnumerator>,
        group_by: MultiComparer,
        functions: Vec<SetFunction>,
        temp_extent: ExtentNumber,
        having: Option<LogicalExpression>,
    ) -> QueryResult<Self> {
        let temp_binding = base.row_type_binding.extent(temp_extent)?.type_binding.clone();
        let expected = Self::temp_type_binding(&group_by, &functions);
        if expected.properties().len() != temp_binding.properties().len()
            || expected
                .properties()
                .iter()
                .zip(temp_binding.properties())
                .any(|(e, t)| e.type_code != t.type_code)
        {
            return Err(QueryError::TypeError(format!(
                "Extent {} does not hold the group keys and aggregate results",
                temp_extent
            )));
        }
        let mut aggregation = Aggregation {
            base,
            child,
            group_by,
            functions,
            temp_extent,
            temp_binding,
            having,
            lookahead: None,
            child_exhausted: false,
            groups: 0,
            emitted: 0,
            pending: None,
            at_key: false,
        };
        aggregation.assign_node_ids(0)?;
        Ok(aggregation)
    }

    pub fn temp_extent(&self) -> ExtentNumber {
        self.temp_extent
    }

    fn pull(&mut self) -> QueryResult<Option<Row>> {
        if self.child_exhausted || !self.child.move_next()? {
            self.child_exhausted = true;
            return Ok(None);
        }
        self.child
            .current_row()
            .cloned()
            .map(Some)
            .ok_or_else(|| QueryError::Internal("Aggregation input advanced without a row".into()))
    }

    /// Fold the next group, or the single empty group of an ungrouped empty input
    fn next_group(&mut self) -> QueryResult<Option<Row>> {
        let first = match self.lookahead.take() {
            Some(row) => row,
            None => match self.pull()? {
                Some(row) => row,
                None if self.group_by.is_empty() && self.groups == 0 => {
                    self.groups += 1;
                    for function in &mut self.functions {
                        function.reset_result();
                    }
                    let mut row = self.base.context_row();
                    let mut extents = ExtentSet::new();
                    self.child.extents(&mut extents);
                    for extent in extents {
                        row.attach_null(extent);
                    }
                    return self.group_row(row, Vec::new()).map(Some);
                }
                None => return Ok(None),
            },
        };

        let keys = self.group_by.evaluate_keys(&first)?;
        for function in &mut self.functions {
            function.reset_result();
            function.update_result(&first)?;
        }
        while let Some(row) = self.pull()? {
            let row_keys = self.group_by.evaluate_keys(&row)?;
            if self.group_by.compare_keys(&keys, &row_keys)? != Ordering::Equal {
                self.lookahead = Some(row);
                break;
            }
            for function in &mut self.functions {
                function.update_result(&row)?;
            }
        }
        self.groups += 1;
        self.group_row(first, keys).map(Some)
    }

    fn group_row(&self, mut row: Row, keys: Vec<Literal>) -> QueryResult<Row> {
        let mut fields = Vec::with_capacity(keys.len() + self.functions.len());
        for key in keys {
            let type_code = key.type_code();
            fields.push(key.into_value().map(|v| v.coerce_to(type_code)).transpose()?);
        }
        for function in &self.functions {
            fields.push(function.get_result()?.into_value());
        }
        let object = DbObject::new(0, self.temp_binding.clone(), fields)?;
        row.attach_object(self.temp_extent, Arc::new(object));
        Ok(row)
    }
}

impl ExecutionEnumerator for Aggregation {
    fn base(&self) -> &EnumeratorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EnumeratorBase {
        &mut self.base
    }

    fn node_type(&self) -> EnumeratorNodeType {
        EnumeratorNodeType::Aggregation
    }

    fn advance(&mut self) -> QueryResult<Option<Row>> {
        while let Some(row) = self.next_group()? {
            if let Some(having) = &self.having {
                if !having.filtrate(&row)? {
                    continue;
                }
            }
            self.emitted += 1;
            if let Some(pending) = &mut self.pending {
                if pending.count > 0 {
                    pending.count -= 1;
                    continue;
                }
                self.at_key = pending.pin;
                self.pending = None;
            }
            self.base.is_at_recreated_key = std::mem::take(&mut self.at_key);
            return Ok(Some(row));
        }
        self.pending = None;
        self.base.is_at_recreated_key = false;
        Ok(None)
    }

    fn reset_state(&mut self) -> QueryResult<()> {
        self.lookahead = None;
        self.child_exhausted = false;
        self.groups = 0;
        self.emitted = 0;
        let context = self.base.context.clone();
        self.child.reset(context)
    }

    fn extents(&self, extents: &mut ExtentSet) {
        self.child.extents(extents);
        extents.insert(self.temp_extent);
    }

    fn assign_node_ids(&mut self, first: NodeId) -> QueryResult<NodeId> {
        let next = self.child.assign_node_ids(first)?;
        self.base.node_id = next;
        next_node_id(next)
    }

    fn clone_enumerator(
        &self,
        row_type_binding: &Arc<RowTypeBinding>,
        variables: &VariableArray,
    ) -> QueryResult<Box<dyn ExecutionEnumerator>> {
        let functions = self
            .functions
            .iter()
            .map(|function| function.clone_with(variables))
            .collect::<QueryResult<Vec<_>>>()?;
        Ok(Box::new(Aggregation {
            base: self.base.clone_for(row_type_binding, variables)?,
            child: self.child.clone_enumerator(row_type_binding, variables)?,
            group_by: self.group_by.clone_with(variables)?,
            functions,
            temp_extent: self.temp_extent,
            temp_binding: self.temp_binding.clone(),
            having: self.having.as_ref().map(|h| h.clone_with(variables)).transpose()?,
            lookahead: None,
            child_exhausted: false,
            groups: 0,
            emitted: 0,
            pending: None,
            at_key: false,
        }))
    }

    fn save_enumerator(&self, writer: &mut OffsetKeyWriter, expected: NodeId) -> QueryResult<NodeId> {
        let next = self.child.save_enumerator(writer, expected)?;
        self.base.check_node_id(next)?;
        let mut payload = PayloadWriter::new();
        payload.put_u64(self.emitted)?;
        writer.add_section(self.base.node_id, EnumeratorNodeType::Aggregation, payload)?;
        next_node_id(next)
    }

    fn recreate(&mut self, reader: &mut OffsetKeyReader<'_>, pin: bool) -> QueryResult<()> {
        // Groups are rebuilt from the start of the input
        self.child.recreate(reader, false)?;
        self.child.discard_recreation();
        let pending = PendingSkip::read(reader, self.base.node_id, EnumeratorNodeType::Aggregation, pin)?;
        self.base.is_at_recreated_key = pending.pin;
        self.pending = Some(pending);
        Ok(())
    }

    fn discard_recreation(&mut self) {
        self.pending = None;
        self.at_key = false;
        self.base.discard_recreation();
    }

    fn populate_query_flags(&self, flags: &mut QueryFlags) {
        flags.insert(QueryFlags::INCLUDES_AGGREGATION);
        self.group_by.populate_query_flags(flags);
        for function in &self.functions {
            if let Some(expression) = function.expression() {
                expression.populate_query_flags(flags);
            }
        }
        if let Some(having) = &self.having {
            having.populate_query_flags(flags);
        }
        self.child.populate_query_flags(flags);
    }

    fn build_string(&self, out: &mut String, tabs: usize) {
        indent(out, tabs);
        let functions = self
            .functions
            .iter()
            .map(|function| function.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!(
            "Aggregation(node {}, extent {}, [{}] BY [{}])\n",
            self.base.node_id, self.temp_extent, functions, self.group_by
        ));
        if let Some(having) = &self.having {
            indent(out, tabs + 1);
            out.push_str(&format!("HAVING {}\n", having));
        }
        self.child.build_string(out, tabs + 1);
    }

    fn depth(&self) -> usize {
        1 + self.child.depth()
    }

    fn generate_compilable_code(&self, out: &mut String) -> QueryResult<()> {
        self.child.generate_compilable_code(out)
    }

    fn has_code_generation(&self) -> bool {
        self.child.has_code_generation()
    }

    fn collect_layout(&self, layout: &mut Vec<(NodeId, EnumeratorNodeType)>) {
        self.child.collect_layout(layout);
        layout.push((self.base.node_id, EnumeratorNodeType::Aggregation));
    }
}
