// Index Scan
//
// Enumerates the objects of a secondary index inside a dynamic key range,
// ascending or descending, and post-filters them. The range is evaluated
// against the context row at every load, so it may depend on outer extents.

use std::sync::Arc;

use log::trace;

use crate::common::types::{ExtentNumber, ExtentSet, NodeId, QueryFlags};
use crate::query::condition::LogicalExpression;
use crate::query::executor::enumerator::{EnumeratorBase, ExecutionEnumerator, indent, next_node_id};
use crate::query::executor::offset_key::{OffsetKeyReader, OffsetKeyWriter, PayloadWriter};
use crate::query::executor::operators::scan::{PendingPosition, ScanFilter, lost_position};
use crate::query::executor::operators::{
    EnumeratorNodeType, SCAN_STATE_NONE, SCAN_STATE_PLACEHOLDER, SCAN_STATE_POSITIONED,
};
use crate::query::executor::result::{QueryError, QueryResult, Row, RowTypeBinding};
use crate::query::expression::VariableArray;
use crate::query::ranges::DynamicRange;
use crate::storage::{IndexEntry, IndexInfo, ObjectStore};

#[derive(Debug)]
pub struct IndexScan {
    base: EnumeratorBase,
    store: Arc<dyn ObjectStore>,
    index: IndexInfo,
    extent: ExtentNumber,
    range: DynamicRange,
    descending: bool,
    filter: ScanFilter,
    entries: Vec<IndexEntry>,
    position: usize,
    loaded: bool,
    /// Entry key of the last returned object
    last: Option<IndexEntry>,
    pending: Option<PendingPosition>,
}

impl IndexScan {
    pub fn new(
        base: EnumeratorBase,
        store: Arc<dyn ObjectStore>,
        index_name: &str,
        extent: ExtentNumber,
        range: DynamicRange,
        condition: Option<LogicalExpression>,
        descending: bool,
    ) -> QueryResult<Self> {
        let index = store.index(index_name)?;
        if index.type_code != range.type_code() {
            return Err(QueryError::TypeError(format!(
                "Index {} is over {} values, range is over {}",
                index.name,
                index.type_code,
                range.type_code()
            )));
        }
        Ok(IndexScan {
            base,
            store,
            index,
            extent,
            range,
            descending,
            filter: ScanFilter::new(condition),
            entries: Vec::new(),
            position: 0,
            loaded: false,
            last: None,
            pending: None,
        })
    }

    pub fn index(&self) -> &IndexInfo {
        &self.index
    }

    pub fn is_descending(&self) -> bool {
        self.descending
    }

    fn load(&mut self) -> QueryResult<()> {
        self.loaded = true;
        self.position = 0;
        self.entries.clear();
        let context = self.base.context_row();
        if !self.filter.prepare(&context)? {
            return Ok(());
        }
        let Some(mut range) = self.range.evaluate(&context)? else {
            trace!("{} has an empty range", self.get_unique_name(0));
            return Ok(());
        };
        if let Some(pending) = &self.pending {
            range = range.resume_at(&pending.key, self.descending);
        }
        self.entries = self.store.index_range(&self.index.name, &range)?;
        if self.descending {
            self.entries.reverse();
        }
        trace!(
            "{} loaded {} entries of {}",
            self.get_unique_name(0),
            self.entries.len(),
            self.index.name
        );
        Ok(())
    }
}

impl ExecutionEnumerator for IndexScan {
    fn base(&self) -> &EnumeratorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EnumeratorBase {
        &mut self.base
    }

    fn node_type(&self) -> EnumeratorNodeType {
        EnumeratorNodeType::IndexScan
    }

    fn advance(&mut self) -> QueryResult<Option<Row>> {
        if !self.loaded {
            self.load()?;
        }
        while let Some(entry) = self.entries.get(self.position).cloned() {
            self.position += 1;
            let mut at_key = false;
            if let Some(pending) = self.pending.take() {
                if entry.object.identity() == pending.identity && entry.key == pending.key {
                    if !pending.pin {
                        continue;
                    }
                    at_key = true;
                } else {
                    lost_position(&self.base, pending.identity);
                }
            }
            let mut row = self.base.context_row();
            row.attach_object(self.extent, entry.object.clone());
            if self.filter.accepts(&row, &self.base.config)? {
                self.last = Some(entry);
                self.base.is_at_recreated_key = at_key;
                return Ok(Some(row));
            }
        }
        if let Some(pending) = self.pending.take() {
            // Nothing loaded to compare against; filtered out is not lost
            if self.store.lookup(pending.identity)?.is_none() {
                lost_position(&self.base, pending.identity);
            }
        }
        self.base.is_at_recreated_key = false;
        Ok(None)
    }

    fn reset_state(&mut self) -> QueryResult<()> {
        self.loaded = false;
        self.entries.clear();
        self.position = 0;
        self.last = None;
        Ok(())
    }

    fn extents(&self, extents: &mut ExtentSet) {
        extents.insert(self.extent);
    }

    fn assign_node_ids(&mut self, first: NodeId) -> QueryResult<NodeId> {
        self.base.node_id = first;
        next_node_id(first)
    }

    fn clone_enumerator(
        &self,
        row_type_binding: &Arc<RowTypeBinding>,
        variables: &VariableArray,
    ) -> QueryResult<Box<dyn ExecutionEnumerator>> {
        Ok(Box::new(IndexScan {
            base: self.base.clone_for(row_type_binding, variables)?,
            store: self.store.clone(),
            index: self.index.clone(),
            extent: self.extent,
            range: self.range.clone_with(variables)?,
            descending: self.descending,
            filter: self.filter.clone_with(variables)?,
            entries: Vec::new(),
            position: 0,
            loaded: false,
            last: None,
            pending: None,
        }))
    }

    fn save_enumerator(&self, writer: &mut OffsetKeyWriter, expected: NodeId) -> QueryResult<NodeId> {
        self.base.check_node_id(expected)?;
        let mut payload = PayloadWriter::new();
        match (self.base.placeholder, &self.last) {
            (true, _) => payload.put_u8(SCAN_STATE_PLACEHOLDER)?,
            (false, Some(entry)) => {
                payload.put_u8(SCAN_STATE_POSITIONED)?;
                payload.put_u64(entry.object.identity())?;
                payload.put_bytes(&entry.key)?;
            }
            (false, None) => payload.put_u8(SCAN_STATE_NONE)?,
        }
        writer.add_section(self.base.node_id, EnumeratorNodeType::IndexScan, payload)?;
        next_node_id(expected)
    }

    fn recreate(&mut self, reader: &mut OffsetKeyReader<'_>, pin: bool) -> QueryResult<()> {
        let mut section = reader.next_section(self.base.node_id, EnumeratorNodeType::IndexScan)?;
        match section.read_u8()? {
            SCAN_STATE_NONE => {}
            SCAN_STATE_POSITIONED => {
                let identity = section.read_u64()?;
                let key = section.read_bytes()?;
                self.pending = Some(PendingPosition { identity, key, pin });
                self.base.is_at_recreated_key = true;
            }
            SCAN_STATE_PLACEHOLDER => self.base.recreate_placeholder(pin),
            other => {
                return Err(QueryError::InvalidOffsetKey(format!("unknown index scan state {}", other)));
            }
        }
        section.finish()
    }

    fn discard_recreation(&mut self) {
        self.pending = None;
        self.base.discard_recreation();
    }

    fn populate_query_flags(&self, flags: &mut QueryFlags) {
        self.range.populate_query_flags(flags);
        self.filter.populate_query_flags(flags);
    }

    fn build_string(&self, out: &mut String, tabs: usize) {
        indent(out, tabs);
        out.push_str(&format!(
            "IndexScan(node {}, {} ON {} AS extent {}{})\n",
            self.base.node_id,
            self.index.name,
            self.index.type_name,
            self.extent,
            if self.descending { ", DESC" } else { "" }
        ));
        for point in self.range.points() {
            indent(out, tabs + 1);
            out.push_str(&format!("RANGE {} {}\n", point.operator(), point.value()));
        }
        self.filter.build_string(out, tabs + 1);
    }

    fn depth(&self) -> usize {
        1
    }

    fn generate_compilable_code(&self, out: &mut String) -> QueryResult<()> {
        self.filter.generate_code(&self.get_unique_name(0), &self.base.config, out)
    }

    fn has_code_generation(&self) -> bool {
        self.filter.can_compile(&self.base.config)
    }

    fn collect_layout(&self, layout: &mut Vec<(NodeId, EnumeratorNodeType)>) {
        layout.push((self.base.node_id, EnumeratorNodeType::IndexScan));
    }
}
