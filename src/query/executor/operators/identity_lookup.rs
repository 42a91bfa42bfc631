// Object Identity Lookup
//
// Produces at most one object: the one whose identity the lookup expression
// evaluates to against the context row, if it has the expected type and
// passes the condition.

use std::sync::Arc;

use crate::common::types::{DbTypeCode, ExtentNumber, ExtentSet, NodeId, QueryFlags};
use crate::query::condition::LogicalExpression;
use crate::query::executor::enumerator::{EnumeratorBase, ExecutionEnumerator, indent, next_node_id};
use crate::query::executor::offset_key::{OffsetKeyReader, OffsetKeyWriter, PayloadWriter};
use crate::query::executor::operators::scan::{ScanFilter, lost_position};
use crate::query::executor::operators::{
    EnumeratorNodeType, SCAN_STATE_NONE, SCAN_STATE_PLACEHOLDER, SCAN_STATE_POSITIONED,
};
use crate::query::executor::result::{QueryError, QueryResult, Row, RowTypeBinding};
use crate::query::expression::{ValueExpression, VariableArray};
use crate::storage::ObjectStore;

#[derive(Debug)]
pub struct ObjectIdentityLookup {
    base: EnumeratorBase,
    store: Arc<dyn ObjectStore>,
    type_name: String,
    extent: ExtentNumber,
    identity: ValueExpression,
    filter: ScanFilter,
    done: bool,
    found: bool,
    /// Recreated position; the flag is the pin
    pending: Option<bool>,
}

impl ObjectIdentityLookup {
    pub fn new(
        base: EnumeratorBase,
        store: Arc<dyn ObjectStore>,
        type_name: &str,
        extent: ExtentNumber,
        identity: ValueExpression,
        condition: Option<LogicalExpression>,
    ) -> QueryResult<Self> {
        if !matches!(identity.type_code(), DbTypeCode::UInteger | DbTypeCode::Integer) {
            return Err(QueryError::TypeError(format!(
                "Object identity lookup by a {} expression",
                identity.type_code()
            )));
        }
        Ok(ObjectIdentityLookup {
            base,
            store,
            type_name: type_name.to_string(),
            extent,
            identity,
            filter: ScanFilter::new(condition),
            done: false,
            found: false,
            pending: None,
        })
    }

    fn lookup(&mut self) -> QueryResult<Option<Row>> {
        let context = self.base.context_row();
        if !self.filter.prepare(&context)? {
            return Ok(None);
        }
        let Some(identity) = self.identity.evaluate_to_uinteger(&context)? else {
            return Ok(None);
        };
        let Some(object) = self.store.lookup(identity)? else {
            return Ok(None);
        };
        if object.type_binding().name() != self.type_name {
            return Ok(None);
        }
        let mut row = context;
        row.attach_object(self.extent, object);
        if self.filter.accepts(&row, &self.base.config)? {
            Ok(Some(row))
        } else {
            Ok(None)
        }
    }
}

impl ExecutionEnumerator for ObjectIdentityLookup {
    fn base(&self) -> &EnumeratorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EnumeratorBase {
        &mut self.base
    }

    fn node_type(&self) -> EnumeratorNodeType {
        EnumeratorNodeType::ObjectIdentityLookup
    }

    fn advance(&mut self) -> QueryResult<Option<Row>> {
        self.base.is_at_recreated_key = false;
        if std::mem::replace(&mut self.done, true) {
            return Ok(None);
        }
        let row = self.lookup()?;
        match (self.pending.take(), &row) {
            (Some(false), Some(_)) => return Ok(None),
            (Some(true), Some(_)) => self.base.is_at_recreated_key = true,
            (Some(_), None) => {
                let identity = self.identity.evaluate_to_uinteger(&self.base.context_row())?.unwrap_or(0);
                lost_position(&self.base, identity);
            }
            (None, _) => {}
        }
        self.found = row.is_some();
        Ok(row)
    }

    fn reset_state(&mut self) -> QueryResult<()> {
        self.done = false;
        self.found = false;
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
        Ok(Box::new(ObjectIdentityLookup {
            base: self.base.clone_for(row_type_binding, variables)?,
            store: self.store.clone(),
            type_name: self.type_name.clone(),
            extent: self.extent,
            identity: self.identity.clone_with(variables)?,
            filter: self.filter.clone_with(variables)?,
            done: false,
            found: false,
            pending: None,
        }))
    }

    fn save_enumerator(&self, writer: &mut OffsetKeyWriter, expected: NodeId) -> QueryResult<NodeId> {
        self.base.check_node_id(expected)?;
        let state = if self.base.placeholder {
            SCAN_STATE_PLACEHOLDER
        } else if self.found {
            SCAN_STATE_POSITIONED
        } else {
            SCAN_STATE_NONE
        };
        let mut payload = PayloadWriter::new();
        payload.put_u8(state)?;
        writer.add_section(self.base.node_id, EnumeratorNodeType::ObjectIdentityLookup, payload)?;
        next_node_id(expected)
    }

    fn recreate(&mut self, reader: &mut OffsetKeyReader<'_>, pin: bool) -> QueryResult<()> {
        let mut section = reader.next_section(self.base.node_id, EnumeratorNodeType::ObjectIdentityLookup)?;
        match section.read_u8()? {
            SCAN_STATE_NONE => {}
            SCAN_STATE_POSITIONED => {
                self.pending = Some(pin);
                self.base.is_at_recreated_key = true;
            }
            SCAN_STATE_PLACEHOLDER => self.base.recreate_placeholder(pin),
            other => {
                return Err(QueryError::InvalidOffsetKey(format!("unknown lookup state {}", other)));
            }
        }
        section.finish()
    }

    fn discard_recreation(&mut self) {
        self.pending = None;
        self.base.discard_recreation();
    }

    fn populate_query_flags(&self, flags: &mut QueryFlags) {
        self.identity.populate_query_flags(flags);
        self.filter.populate_query_flags(flags);
    }

    fn build_string(&self, out: &mut String, tabs: usize) {
        indent(out, tabs);
        out.push_str(&format!(
            "ObjectIdentityLookup(node {}, {} AS extent {}, identity {})\n",
            self.base.node_id, self.type_name, self.extent, self.identity
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
        layout.push((self.base.node_id, EnumeratorNodeType::ObjectIdentityLookup));
    }
}
