// Sort
//
// Materializes its input and emits it ordered by a multi-comparer. Sort keys
// are evaluated once per row; rows with equal keys keep their input order.

use std::cmp::Ordering;
use std::sync::Arc;

use log::trace;

use crate::common::types::{ExtentSet, NodeId, QueryFlags};
use crate::query::comparer::MultiComparer;
use crate::query::executor::enumerator::{EnumeratorBase, ExecutionEnumerator, indent, next_node_id};
use crate::query::executor::offset_key::{OffsetKeyReader, OffsetKeyWriter, PayloadWriter};
use crate::query::executor::operators::EnumeratorNodeType;
use crate::query::executor::result::{QueryError, QueryResult, Row, RowTypeBinding};
use crate::query::expression::VariableArray;

/// Rows to skip after an offset key replay
#[derive(Debug, Clone, Copy)]
pub(crate) struct PendingSkip {
    pub(crate) count: u64,
    pub(crate) pin: bool,
}

impl PendingSkip {
    pub(crate) fn read(reader: &mut OffsetKeyReader<'_>, node_id: NodeId, node_type: EnumeratorNodeType, pin: bool) -> QueryResult<Self> {
        let mut section = reader.next_section(node_id, node_type)?;
        let emitted = section.read_u64()?;
        section.finish()?;
        let count = if pin { emitted.saturating_sub(1) } else { emitted };
        Ok(PendingSkip {
            count,
            pin: pin && emitted > 0,
        })
    }
}

#[derive(Debug)]
pub struct Sort {
    base: EnumeratorBase,
    child: Box<dyn ExecutionEnumerator>,
    comparer: MultiComparer,
    rows: Vec<Row>,
    position: usize,
    loaded: bool,
    /// Rows emitted since the last reset, including rows skipped on replay
    emitted: u64,
    pending: Option<PendingSkip>,
    at_key: bool,
}

impl Sort {
    /// Build a sort and number the whole subtree from zero
    pub fn new(base: EnumeratorBase, child: Box<dyn ExecutionEnumerator>, comparer: MultiComparer) -> QueryResult<Self> {
        let mut sort = Sort {
            base,
            child,
            comparer,
            rows: Vec::new(),
            position: 0,
            loaded: false,
            emitted: 0,
            pending: None,
            at_key: false,
        };
        sort.assign_node_ids(0)?;
        Ok(sort)
    }

    pub fn comparer(&self) -> &MultiComparer {
        &self.comparer
    }

    fn load(&mut self) -> QueryResult<()> {
        self.loaded = true;
        let mut keyed = Vec::new();
        while self.child.move_next()? {
            let row = self
                .child
                .current_row()
                .cloned()
                .ok_or_else(|| QueryError::Internal("Sort input advanced without a row".into()))?;
            keyed.push((self.comparer.evaluate_keys(&row)?, row));
        }

        let mut error = None;
        keyed.sort_by(|a, b| match self.comparer.compare_keys(&a.0, &b.0) {
            Ok(ordering) => ordering,
            Err(e) => {
                error.get_or_insert(e);
                Ordering::Equal
            }
        });
        if let Some(e) = error {
            return Err(e);
        }
        self.rows = keyed.into_iter().map(|(_, row)| row).collect();
        trace!("{} sorted {} rows", self.get_unique_name(0), self.rows.len());

        self.position = 0;
        self.emitted = 0;
        if let Some(pending) = self.pending.take() {
            let skip = usize::try_from(pending.count).unwrap_or(usize::MAX).min(self.rows.len());
            self.position = skip;
            self.emitted = skip as u64;
            self.at_key = pending.pin;
        }
        Ok(())
    }
}

impl ExecutionEnumerator for Sort {
    fn base(&self) -> &EnumeratorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EnumeratorBase {
        &mut self.base
    }

    fn node_type(&self) -> EnumeratorNodeType {
        EnumeratorNodeType::Sort
    }

    fn advance(&mut self) -> QueryResult<Option<Row>> {
        if !self.loaded {
            self.load()?;
        }
        let at_key = std::mem::take(&mut self.at_key);
        let Some(row) = self.rows.get(self.position).cloned() else {
            self.base.is_at_recreated_key = false;
            return Ok(None);
        };
        self.position += 1;
        self.emitted += 1;
        self.base.is_at_recreated_key = at_key;
        Ok(Some(row))
    }

    fn reset_state(&mut self) -> QueryResult<()> {
        self.loaded = false;
        self.rows.clear();
        self.position = 0;
        self.emitted = 0;
        let context = self.base.context.clone();
        self.child.reset(context)
    }

    fn extents(&self, extents: &mut ExtentSet) {
        self.child.extents(extents);
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
        Ok(Box::new(Sort {
            base: self.base.clone_for(row_type_binding, variables)?,
            child: self.child.clone_enumerator(row_type_binding, variables)?,
            comparer: self.comparer.clone_with(variables)?,
            rows: Vec::new(),
            position: 0,
            loaded: false,
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
        writer.add_section(self.base.node_id, EnumeratorNodeType::Sort, payload)?;
        next_node_id(next)
    }

    fn recreate(&mut self, reader: &mut OffsetKeyReader<'_>, pin: bool) -> QueryResult<()> {
        // The input is re-read in full
        self.child.recreate(reader, false)?;
        self.child.discard_recreation();
        let pending = PendingSkip::read(reader, self.base.node_id, EnumeratorNodeType::Sort, pin)?;
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
        flags.insert(QueryFlags::INCLUDES_SORTING);
        self.comparer.populate_query_flags(flags);
        self.child.populate_query_flags(flags);
    }

    fn build_string(&self, out: &mut String, tabs: usize) {
        indent(out, tabs);
        out.push_str(&format!("Sort(node {}, {})\n", self.base.node_id, self.comparer));
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
        layout.push((self.base.node_id, EnumeratorNodeType::Sort));
    }
}
