// Full Table Scan
//
// Enumerates the objects of one type in identity order and filters them by
// an optional condition. The condition is either interpreted or compiled into
// a filter program on first use.

use std::sync::Arc;

use log::{trace, warn};
use once_cell::sync::OnceCell;

use crate::common::types::{ExtentNumber, ExtentSet, NodeId, ObjectId, QueryFlags};
use crate::query::codegen::{self, FilterVm, Program};
use crate::query::condition::LogicalExpression;
use crate::query::executor::config::ExecutionConfig;
use crate::query::executor::enumerator::{EnumeratorBase, ExecutionEnumerator, indent, next_node_id};
use crate::query::executor::offset_key::{OffsetKeyReader, OffsetKeyWriter, PayloadWriter};
use crate::query::executor::operators::{
    EnumeratorNodeType, SCAN_STATE_NONE, SCAN_STATE_PLACEHOLDER, SCAN_STATE_POSITIONED,
};
use crate::query::executor::result::{QueryError, QueryResult, Row, RowTypeBinding};
use crate::query::expression::VariableArray;
use crate::storage::{ObjectRef, ObjectStore};

/// Filter condition of a scan node
#[derive(Debug)]
pub(crate) struct ScanFilter {
    condition: Option<LogicalExpression>,
    /// Condition with the context row's extents folded in
    instantiated: Option<LogicalExpression>,
    program: OnceCell<Option<Program>>,
    vm: FilterVm,
}

impl ScanFilter {
    pub(crate) fn new(condition: Option<LogicalExpression>) -> Self {
        ScanFilter {
            condition,
            instantiated: None,
            program: OnceCell::new(),
            vm: FilterVm::new(),
        }
    }

    pub(crate) fn condition(&self) -> Option<&LogicalExpression> {
        self.condition.as_ref()
    }

    /// Compiled program, built on first use
    pub(crate) fn program(&self, config: &ExecutionConfig) -> QueryResult<Option<&Program>> {
        let Some(condition) = &self.condition else {
            return Ok(None);
        };
        if !config.enable_codegen {
            return Ok(None);
        }
        Ok(self.program.get_or_try_init(|| codegen::compile(condition))?.as_ref())
    }

    pub(crate) fn can_compile(&self, config: &ExecutionConfig) -> bool {
        config.enable_codegen && self.condition.as_ref().is_some_and(codegen::can_code_gen)
    }

    /// Bind the context row; false when no candidate can pass
    pub(crate) fn prepare(&mut self, context: &Row) -> QueryResult<bool> {
        self.instantiated = match &self.condition {
            Some(condition) => Some(condition.instantiate(context)?),
            None => None,
        };
        Ok(!matches!(&self.instantiated, Some(LogicalExpression::Literal(value)) if !value.is_true()))
    }

    pub(crate) fn accepts(&mut self, row: &Row, config: &ExecutionConfig) -> QueryResult<bool> {
        let Some(condition) = &self.condition else {
            return Ok(true);
        };
        if config.enable_codegen {
            if let Some(program) = self.program.get_or_try_init(|| codegen::compile(condition))? {
                return Ok(self.vm.execute(program, row)?.is_true());
            }
        }
        self.instantiated.as_ref().unwrap_or(condition).filtrate(row)
    }

    pub(crate) fn populate_query_flags(&self, flags: &mut QueryFlags) {
        if let Some(condition) = &self.condition {
            condition.populate_query_flags(flags);
        }
    }

    pub(crate) fn clone_with(&self, variables: &VariableArray) -> QueryResult<ScanFilter> {
        let condition = self.condition.as_ref().map(|c| c.clone_with(variables)).transpose()?;
        Ok(ScanFilter::new(condition))
    }

    pub(crate) fn build_string(&self, out: &mut String, tabs: usize) {
        if let Some(condition) = &self.condition {
            indent(out, tabs);
            out.push_str(&format!("WHERE {}\n", condition));
        }
    }

    pub(crate) fn generate_code(&self, name: &str, config: &ExecutionConfig, out: &mut String) -> QueryResult<()> {
        if let Some(program) = self.program(config)? {
            out.push_str(&format!("{}:\n{}", name, program));
        }
        Ok(())
    }
}

/// Position restored from an offset key, applied at the next load
#[derive(Debug, Clone)]
pub(crate) struct PendingPosition {
    pub(crate) identity: ObjectId,
    pub(crate) key: Vec<u8>,
    pub(crate) pin: bool,
}

/// The object an offset key points at no longer exists
pub(crate) fn lost_position(base: &EnumeratorBase, identity: ObjectId) {
    base.variables.set_failed_to_recreate_object(true);
    warn!(
        "Object {} of the offset key for query {} is gone, resuming at the next object",
        identity, base.unique_query_id
    );
}

#[derive(Debug)]
pub struct FullTableScan {
    base: EnumeratorBase,
    store: Arc<dyn ObjectStore>,
    type_name: String,
    extent: ExtentNumber,
    filter: ScanFilter,
    candidates: Vec<ObjectRef>,
    position: usize,
    loaded: bool,
    /// Identity of the last returned object
    last: Option<ObjectId>,
    pending: Option<PendingPosition>,
}

impl FullTableScan {
    pub fn new(
        base: EnumeratorBase,
        store: Arc<dyn ObjectStore>,
        type_name: &str,
        extent: ExtentNumber,
        condition: Option<LogicalExpression>,
    ) -> Self {
        FullTableScan {
            base,
            store,
            type_name: type_name.to_string(),
            extent,
            filter: ScanFilter::new(condition),
            candidates: Vec::new(),
            position: 0,
            loaded: false,
            last: None,
            pending: None,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn extent(&self) -> ExtentNumber {
        self.extent
    }

    pub fn condition(&self) -> Option<&LogicalExpression> {
        self.filter.condition()
    }

    fn load(&mut self) -> QueryResult<()> {
        self.loaded = true;
        self.position = 0;
        let context = self.base.context_row();
        self.candidates = if self.filter.prepare(&context)? {
            let from = self.pending.as_ref().map(|pending| pending.identity);
            self.store.scan(&self.type_name, from)?
        } else {
            Vec::new()
        };
        trace!(
            "{} loaded {} candidates of {}",
            self.get_unique_name(0),
            self.candidates.len(),
            self.type_name
        );
        Ok(())
    }
}

impl ExecutionEnumerator for FullTableScan {
    fn base(&self) -> &EnumeratorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EnumeratorBase {
        &mut self.base
    }

    fn node_type(&self) -> EnumeratorNodeType {
        EnumeratorNodeType::FullTableScan
    }

    fn advance(&mut self) -> QueryResult<Option<Row>> {
        if !self.loaded {
            self.load()?;
        }
        while let Some(object) = self.candidates.get(self.position).cloned() {
            self.position += 1;
            let mut at_key = false;
            if let Some(pending) = self.pending.take() {
                if object.identity() == pending.identity {
                    if !pending.pin {
                        continue;
                    }
                    at_key = true;
                } else {
                    lost_position(&self.base, pending.identity);
                }
            }
            let mut row = self.base.context_row();
            row.attach_object(self.extent, object.clone());
            if self.filter.accepts(&row, &self.base.config)? {
                self.last = Some(object.identity());
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
        self.candidates.clear();
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
        Ok(Box::new(FullTableScan {
            base: self.base.clone_for(row_type_binding, variables)?,
            store: self.store.clone(),
            type_name: self.type_name.clone(),
            extent: self.extent,
            filter: self.filter.clone_with(variables)?,
            candidates: Vec::new(),
            position: 0,
            loaded: false,
            last: None,
            pending: None,
        }))
    }

    fn save_enumerator(&self, writer: &mut OffsetKeyWriter, expected: NodeId) -> QueryResult<NodeId> {
        self.base.check_node_id(expected)?;
        let mut payload = PayloadWriter::new();
        match (self.base.placeholder, self.last) {
            (true, _) => payload.put_u8(SCAN_STATE_PLACEHOLDER)?,
            (false, Some(identity)) => {
                payload.put_u8(SCAN_STATE_POSITIONED)?;
                payload.put_u64(identity)?;
            }
            (false, None) => payload.put_u8(SCAN_STATE_NONE)?,
        }
        writer.add_section(self.base.node_id, EnumeratorNodeType::FullTableScan, payload)?;
        next_node_id(expected)
    }

    fn recreate(&mut self, reader: &mut OffsetKeyReader<'_>, pin: bool) -> QueryResult<()> {
        let mut section = reader.next_section(self.base.node_id, EnumeratorNodeType::FullTableScan)?;
        match section.read_u8()? {
            SCAN_STATE_NONE => {}
            SCAN_STATE_POSITIONED => {
                let identity = section.read_u64()?;
                self.pending = Some(PendingPosition {
                    identity,
                    key: Vec::new(),
                    pin,
                });
                self.base.is_at_recreated_key = true;
            }
            SCAN_STATE_PLACEHOLDER => self.base.recreate_placeholder(pin),
            other => {
                return Err(QueryError::InvalidOffsetKey(format!("unknown scan state {}", other)));
            }
        }
        section.finish()
    }

    fn discard_recreation(&mut self) {
        self.pending = None;
        self.base.discard_recreation();
    }

    fn populate_query_flags(&self, flags: &mut QueryFlags) {
        self.filter.populate_query_flags(flags);
    }

    fn build_string(&self, out: &mut String, tabs: usize) {
        indent(out, tabs);
        out.push_str(&format!(
            "FullTableScan(node {}, {} AS extent {})\n",
            self.base.node_id, self.type_name, self.extent
        ));
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
        layout.push((self.base.node_id, EnumeratorNodeType::FullTableScan));
    }
}
