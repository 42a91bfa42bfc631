// Execution Enumerator
//
// The cursor contract shared by every plan node. Nodes implement the node
// specific parts (advance, reset, save, recreate, clone); the fetch clause,
// null placeholders, variable binding, offset key replay and cache handling
// are provided on top of them.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, trace};

use crate::common::types::{ExtentSet, NodeId, QueryFlags, UniqueQueryId};
use crate::query::executor::cache::EnumeratorCache;
use crate::query::executor::config::ExecutionConfig;
use crate::query::executor::info::{self, InfoType};
use crate::query::executor::offset_key::{OffsetKeyReader, OffsetKeyWriter};
use crate::query::executor::operators::EnumeratorNodeType;
use crate::query::executor::result::{QueryError, QueryResult, Row, RowTypeBinding};
use crate::query::expression::{Rebind, Value, ValueExpression, VariableArray};

static NEXT_QUERY_ID: AtomicU64 = AtomicU64::new(1);

/// FETCH number, offset and offset key of the top enumerator
#[derive(Debug, Clone, Default)]
pub struct FetchClause {
    pub number: Option<ValueExpression>,
    pub offset: Option<ValueExpression>,
    pub offset_key: Option<ValueExpression>,
}

impl FetchClause {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_number(mut self, number: ValueExpression) -> Self {
        self.number = Some(number);
        self
    }

    pub fn with_offset(mut self, offset: ValueExpression) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_offset_key(mut self, offset_key: ValueExpression) -> Self {
        self.offset_key = Some(offset_key);
        self
    }

    /// Row limit; no number means unlimited, a null or negative number means zero
    pub fn limit(&self) -> QueryResult<u64> {
        Self::count(self.number.as_ref(), u64::MAX)
    }

    /// Rows to skip before counting
    pub fn skip(&self) -> QueryResult<u64> {
        Self::count(self.offset.as_ref(), 0)
    }

    fn count(expression: Option<&ValueExpression>, absent: u64) -> QueryResult<u64> {
        let Some(expression) = expression else {
            return Ok(absent);
        };
        match expression.evaluate_to_integer(&Row::empty())? {
            Some(n) => Ok(u64::try_from(n).unwrap_or(0)),
            None => Ok(0),
        }
    }

    /// Offset key bytes, `None` when absent, null or empty
    pub fn offset_key_bytes(&self) -> QueryResult<Option<Vec<u8>>> {
        let Some(expression) = &self.offset_key else {
            return Ok(None);
        };
        Ok(expression.evaluate_to_binary(&Row::empty())?.filter(|key| !key.is_empty()))
    }

    pub fn populate_query_flags(&self, flags: &mut QueryFlags) {
        for expression in [&self.number, &self.offset].into_iter().flatten() {
            match expression {
                ValueExpression::Variable(_) => flags.insert(QueryFlags::INCLUDES_FETCH_VARIABLE),
                _ => flags.insert(QueryFlags::INCLUDES_FETCH_LITERAL),
            }
        }
        match &self.offset_key {
            Some(ValueExpression::Variable(_)) => flags.insert(QueryFlags::INCLUDES_OFFSET_KEY_VARIABLE),
            Some(_) => flags.insert(QueryFlags::INCLUDES_OFFSET_KEY_LITERAL),
            None => {}
        }
    }

    pub fn clone_with(&self, variables: &VariableArray) -> QueryResult<FetchClause> {
        let rebind = |e: &Option<ValueExpression>| e.as_ref().map(|e| e.clone_with(variables)).transpose();
        Ok(FetchClause {
            number: rebind(&self.number)?,
            offset: rebind(&self.offset)?,
            offset_key: rebind(&self.offset_key)?,
        })
    }
}

/// State common to every enumerator node
#[derive(Debug)]
pub struct EnumeratorBase {
    pub(crate) node_id: NodeId,
    pub(crate) row_type_binding: Arc<RowTypeBinding>,
    pub(crate) variables: VariableArray,
    pub(crate) fetch: FetchClause,
    pub(crate) query: Arc<str>,
    pub(crate) unique_query_id: UniqueQueryId,
    pub(crate) config: Arc<ExecutionConfig>,
    pub(crate) cache: Option<Arc<EnumeratorCache>>,
    /// Rows emitted for the current context, placeholders included
    pub(crate) counter: u64,
    pub(crate) fetch_limit: u64,
    pub(crate) started: bool,
    pub(crate) current: Option<Row>,
    pub(crate) context: Option<Row>,
    pub(crate) first_only: bool,
    pub(crate) placeholder: bool,
    /// A recreated placeholder that must not be emitted again; survives reset
    pub(crate) skip_placeholder: bool,
    /// A recreated placeholder that is re-emitted at the key; survives reset
    pub(crate) placeholder_at_key: bool,
    pub(crate) stay_at_offset_key: bool,
    pub(crate) use_offset_key: bool,
    pub(crate) is_at_recreated_key: bool,
}

impl EnumeratorBase {
    pub fn new(row_type_binding: Arc<RowTypeBinding>, variables: &VariableArray) -> Self {
        let config = ExecutionConfig::shared_default();
        EnumeratorBase {
            node_id: 0,
            row_type_binding,
            variables: variables.clone(),
            fetch: FetchClause::default(),
            query: Arc::from(""),
            unique_query_id: NEXT_QUERY_ID.fetch_add(1, Ordering::Relaxed),
            stay_at_offset_key: config.stay_at_offset_key,
            use_offset_key: config.use_offset_key,
            config,
            cache: None,
            counter: 0,
            fetch_limit: u64::MAX,
            started: false,
            current: None,
            context: None,
            first_only: false,
            placeholder: false,
            skip_placeholder: false,
            placeholder_at_key: false,
            is_at_recreated_key: false,
        }
    }

    pub fn with_query(mut self, query: &str) -> Self {
        self.query = Arc::from(query);
        self
    }

    pub fn with_fetch(mut self, fetch: FetchClause) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn with_config(mut self, config: Arc<ExecutionConfig>) -> Self {
        self.stay_at_offset_key = config.stay_at_offset_key;
        self.use_offset_key = config.use_offset_key;
        self.config = config;
        self
    }

    pub fn with_cache(mut self, cache: Arc<EnumeratorCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Base of a clone: same identity, query and configuration, fresh cursor state
    pub fn clone_for(&self, row_type_binding: &Arc<RowTypeBinding>, variables: &VariableArray) -> QueryResult<Self> {
        Ok(EnumeratorBase {
            node_id: self.node_id,
            row_type_binding: row_type_binding.clone(),
            variables: variables.clone(),
            fetch: self.fetch.clone_with(variables)?,
            query: self.query.clone(),
            unique_query_id: self.unique_query_id,
            config: self.config.clone(),
            cache: self.cache.clone(),
            counter: 0,
            fetch_limit: u64::MAX,
            started: false,
            current: None,
            context: None,
            first_only: self.first_only,
            placeholder: false,
            skip_placeholder: false,
            placeholder_at_key: false,
            stay_at_offset_key: self.stay_at_offset_key,
            use_offset_key: self.use_offset_key,
            is_at_recreated_key: false,
        })
    }

    /// Row holding the context row's objects, sized for the row type
    pub(crate) fn context_row(&self) -> Row {
        Row::with_context(self.context.as_ref(), self.row_type_binding.extent_count())
    }

    /// Restore a saved null placeholder: re-emit it when pinned, suppress it otherwise
    pub(crate) fn recreate_placeholder(&mut self, pin: bool) {
        if pin {
            self.placeholder_at_key = true;
            self.is_at_recreated_key = true;
        } else {
            self.skip_placeholder = true;
        }
    }

    pub(crate) fn discard_recreation(&mut self) {
        self.skip_placeholder = false;
        self.placeholder_at_key = false;
        self.is_at_recreated_key = false;
    }

    /// Check the expected post-order id while saving. A mismatch here is a
    /// malformed tree, unlike a replay mismatch which is an invalid key.
    pub(crate) fn check_node_id(&self, expected: NodeId) -> QueryResult<()> {
        if self.node_id != expected {
            return Err(QueryError::Internal(format!(
                "Saving node {} where node {} was expected",
                self.node_id, expected
            )));
        }
        Ok(())
    }
}

/// Next post-order node id
pub(crate) fn next_node_id(id: NodeId) -> QueryResult<NodeId> {
    id.checked_add(1)
        .ok_or_else(|| QueryError::Internal("Enumerator tree has more than 255 nodes".into()))
}

/// A cursor over the rows of one plan node
pub trait ExecutionEnumerator: Send + fmt::Debug {
    fn base(&self) -> &EnumeratorBase;

    fn base_mut(&mut self) -> &mut EnumeratorBase;

    fn node_type(&self) -> EnumeratorNodeType;

    /// Next row of this node, ignoring the fetch clause
    fn advance(&mut self) -> QueryResult<Option<Row>>;

    /// Node specific part of `reset`; the new context is already in the base
    fn reset_state(&mut self) -> QueryResult<()>;

    /// Extents this node binds
    fn extents(&self, extents: &mut ExtentSet);

    /// Number the subtree in post-order starting at `first`; returns the next free id
    fn assign_node_ids(&mut self, first: NodeId) -> QueryResult<NodeId>;

    /// Independent copy bound to another row type binding and variable array
    fn clone_enumerator(
        &self,
        row_type_binding: &Arc<RowTypeBinding>,
        variables: &VariableArray,
    ) -> QueryResult<Box<dyn ExecutionEnumerator>>;

    /// Write the subtree's sections; returns the next expected node id
    fn save_enumerator(&self, writer: &mut OffsetKeyWriter, expected: NodeId) -> QueryResult<NodeId>;

    /// Restore the subtree from its sections. `pin` keeps the node at the saved row.
    fn recreate(&mut self, reader: &mut OffsetKeyReader<'_>, pin: bool) -> QueryResult<()>;

    /// Forget a recreated position that has not been used yet
    fn discard_recreation(&mut self);

    fn populate_query_flags(&self, flags: &mut QueryFlags);

    /// Indented plan rendering
    fn build_string(&self, out: &mut String, tabs: usize);

    fn depth(&self) -> usize;

    /// Append the compiled filter programs of the subtree
    fn generate_compilable_code(&self, out: &mut String) -> QueryResult<()>;

    /// True when some node of the subtree evaluates its filter through a compiled program
    fn has_code_generation(&self) -> bool;

    /// `(node_id, node_type)` of the subtree in post-order
    fn collect_layout(&self, layout: &mut Vec<(NodeId, EnumeratorNodeType)>);

    /// Advance to the next row, honoring fetch number, offset and offset key
    fn move_next(&mut self) -> QueryResult<bool> {
        if !self.base().started {
            self.base_mut().started = true;
            let limit = if self.base().first_only {
                1
            } else {
                self.base().fetch.limit()?
            };
            self.base_mut().fetch_limit = limit;
            let replayed = self.replay_offset_key()?;
            if !replayed {
                for _ in 0..self.base().fetch.skip()? {
                    if self.advance()?.is_none() {
                        break;
                    }
                }
            }
        }
        if self.base().counter >= self.base().fetch_limit {
            self.base_mut().current = None;
            return Ok(false);
        }
        let row = self.advance()?;
        let base = self.base_mut();
        base.placeholder = false;
        match row {
            Some(row) => {
                base.counter += 1;
                base.current = Some(row);
                Ok(true)
            }
            None => {
                base.current = None;
                Ok(false)
            }
        }
    }

    /// Like `move_next`, but emits one null placeholder row when the current
    /// context produced no rows (or always when `force` is set)
    fn move_next_special(&mut self, force: bool) -> QueryResult<bool> {
        if !force && self.move_next()? {
            return Ok(true);
        }
        if self.base().counter == 0 || force {
            if std::mem::take(&mut self.base_mut().skip_placeholder) {
                return Ok(false);
            }
            let mut extents = ExtentSet::new();
            self.extents(&mut extents);
            let mut row = self.base().context_row();
            for extent in extents {
                row.attach_null(extent);
            }
            let base = self.base_mut();
            base.counter += 1;
            base.current = Some(row);
            base.placeholder = true;
            base.is_at_recreated_key = std::mem::take(&mut base.placeholder_at_key);
            return Ok(true);
        }
        Ok(false)
    }

    /// Return to the start with a new context row
    fn reset(&mut self, context: Option<Row>) -> QueryResult<()> {
        let base = self.base_mut();
        base.counter = 0;
        base.started = false;
        base.current = None;
        base.placeholder = false;
        base.is_at_recreated_key = false;
        base.context = context;
        self.reset_state()
    }

    /// Replays the offset key when this enumerator starts; true when a key was used
    fn replay_offset_key(&mut self) -> QueryResult<bool> {
        if !self.base().use_offset_key {
            return Ok(false);
        }
        let Some(key) = self.base().fetch.offset_key_bytes()? else {
            return Ok(false);
        };
        debug!(
            "Replaying {} byte offset key for query {}",
            key.len(),
            self.base().unique_query_id
        );
        let mut reader = OffsetKeyReader::parse(&key)?;
        if reader.query_id() != self.base().unique_query_id {
            debug!(
                "Offset key of query {} replayed into query {}",
                reader.query_id(),
                self.base().unique_query_id
            );
        }
        let pin = self.base().stay_at_offset_key;
        self.recreate(&mut reader, pin)?;
        reader.finish()?;
        Ok(true)
    }

    fn current_row(&self) -> Option<&Row> {
        self.base().current.as_ref()
    }

    /// Projected values of the current row
    fn current_values(&self) -> QueryResult<Option<Vec<Option<Value>>>> {
        match &self.base().current {
            Some(row) => Ok(Some(self.base().row_type_binding.project(row)?)),
            None => Ok(None),
        }
    }

    /// The single projected value of a singleton projection
    fn current(&self) -> QueryResult<Option<Value>> {
        if !self.base().row_type_binding.is_singleton() {
            return Err(QueryError::InvalidOperation(
                "Current value requested from a multi-column projection".into(),
            ));
        }
        Ok(self.current_values()?.and_then(|values| values.into_iter().next().flatten()))
    }

    fn is_placeholder(&self) -> bool {
        self.base().placeholder
    }

    fn variables(&self) -> &VariableArray {
        &self.base().variables
    }

    fn set_variable<V: Into<Value>>(&self, index: usize, value: V) -> QueryResult<()>
    where
        Self: Sized,
    {
        self.base().variables.set(index, value)
    }

    fn set_variable_value(&self, index: usize, value: Value) -> QueryResult<()> {
        self.base().variables.set_value(index, value)
    }

    fn set_variable_to_null(&self, index: usize) -> QueryResult<()> {
        self.base().variables.set_null(index)
    }

    fn set_variables(&self, values: Vec<Option<Value>>) -> QueryResult<()> {
        self.base().variables.set_all(values)
    }

    fn variable_count(&self) -> usize {
        self.base().variables.len()
    }

    fn init_variables_from_buffer(&self, buffer: &[u8]) -> QueryResult<()> {
        self.base().variables.init_from_buffer(buffer)
    }

    /// Flags of the whole query
    fn query_flags(&self) -> QueryFlags {
        let mut flags = self.base().variables.query_flags();
        self.populate_query_flags(&mut flags);
        self.base().fetch.populate_query_flags(&mut flags);
        if self.base().row_type_binding.is_singleton() {
            flags.insert(QueryFlags::SINGLETON_PROJECTION);
        }
        flags
    }

    fn unique_query_id(&self) -> UniqueQueryId {
        self.base().unique_query_id
    }

    fn query_string(&self) -> &str {
        &self.base().query
    }

    fn transaction_id(&self) -> u64 {
        self.base().variables.transaction_id()
    }

    fn set_transaction_id(&self, transaction_id: u64) {
        self.base().variables.set_transaction_id(transaction_id)
    }

    fn row_type_binding(&self) -> &Arc<RowTypeBinding> {
        &self.base().row_type_binding
    }

    /// Limit the next execution to a single row
    fn set_first_only_flag(&mut self, first_only: bool) {
        self.base_mut().first_only = first_only;
    }

    fn node_id(&self) -> NodeId {
        self.base().node_id
    }

    fn stay_at_offset_key(&self) -> bool {
        self.base().stay_at_offset_key
    }

    fn set_stay_at_offset_key(&mut self, stay: bool) {
        self.base_mut().stay_at_offset_key = stay;
    }

    fn use_offset_key(&self) -> bool {
        self.base().use_offset_key
    }

    fn set_use_offset_key(&mut self, use_key: bool) {
        self.base_mut().use_offset_key = use_key;
    }

    fn is_at_recreated_key(&self) -> bool {
        self.base().is_at_recreated_key
    }

    /// Auxiliary metadata into a caller buffer; returns the bytes written
    fn get_info(&self, info_type: InfoType, param: u32, buffer: &mut [u8]) -> QueryResult<usize> {
        info::write_info(self, info_type, param, buffer)
    }

    /// Continuation token for the current position, `None` before the first row
    fn get_offset_key(&self) -> QueryResult<Option<Vec<u8>>> {
        if self.base().current.is_none() {
            return Ok(None);
        }
        let mut writer = OffsetKeyWriter::new(self.base().unique_query_id);
        self.save_enumerator(&mut writer, 0)?;
        let key = writer.finish()?;
        trace!("Offset key for query {}: {}", self.base().unique_query_id, hex::encode(&key));
        Ok(Some(key))
    }

    fn get_unique_name(&self, sequence: u64) -> String {
        format!("{}_{}_{}", self.node_type().name(), self.base().node_id, sequence)
    }

    /// Plan rendering of the whole subtree
    fn plan_string(&self) -> String {
        let mut out = String::new();
        self.build_string(&mut out, 0);
        out
    }

    /// Pooled instance of the same query shape, or a fresh clone with its own variables
    fn clone_cached(&self) -> QueryResult<Box<dyn ExecutionEnumerator>> {
        if let Some(cache) = &self.base().cache {
            if let Some(enumerator) = cache.checkout(self.base().unique_query_id) {
                return Ok(enumerator);
            }
        }
        let variables = self.base().variables.clone_empty();
        let row_type_binding = Arc::new(self.base().row_type_binding.transform(&Rebind::new(&variables))?);
        self.clone_enumerator(&row_type_binding, &variables)
    }
}

/// Reset an enumerator and return it to its query's cache pool
pub fn attach_to_cache(mut enumerator: Box<dyn ExecutionEnumerator>) -> QueryResult<()> {
    let Some(cache) = enumerator.base().cache.clone() else {
        return Ok(());
    };
    enumerator.reset(None)?;
    enumerator.base().variables.clear();
    enumerator.base_mut().is_at_recreated_key = false;
    cache.checkin(enumerator);
    Ok(())
}

/// Indentation used by `build_string`
pub(crate) fn indent(out: &mut String, tabs: usize) {
    for _ in 0..tabs {
        out.push('\t');
    }
}
