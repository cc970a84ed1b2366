//! Cursor: the bind/execute/fetch pipeline.
//!
//! A cursor weakly references its connection and owns its current statement
//! binding and variables. `arraysize` governs rows per fetch round trip and
//! `prefetchrows` the rows delivered with the execute itself; both are
//! sampled at execute time.

use crate::connection::ConnInner;
use crate::error::{BatchError, Error, Result};
use crate::protocol::constants::*;
use crate::protocol::messages::{ExecuteMessage, FetchMessage};
use crate::protocol::response::{OutBindSlot, ResponseParser};
use crate::protocol::types::{
    BindDirection, Column, ColumnMetadata, DescribeContext, FetchType, OracleType, OracleValue,
    OutputTypeHandler, Row, RowFactory, VarConfig, Variable,
};
use crate::statement::{Statement, StatementKey};
use log::debug;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};

/// Options for `executemany`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteManyOptions {
    /// Collect per-iteration errors instead of aborting; inspect them with
    /// `Cursor::getbatcherrors`. The transaction stays open even under
    /// autocommit so the caller can decide.
    pub batch_errors: bool,
    /// Collect per-iteration row counts; inspect them with
    /// `Cursor::getarraydmlrowcounts`.
    pub array_dml_row_counts: bool,
}

/// Scroll modes, accepted for interface parity. The thin path refuses them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollMode {
    Relative,
    Absolute,
    First,
    Last,
}

/// A cursor over one connection.
pub struct Cursor {
    conn: Weak<ConnInner>,
    statement: Option<Statement>,
    statement_key: Option<StatementKey>,
    cache_statement: bool,
    /// Rows fetched per fetch round trip.
    pub arraysize: u32,
    /// Rows delivered with the execute response.
    pub prefetchrows: u32,
    bind_vars: Vec<Variable>,
    input_sizes: Vec<Option<(OracleType, u32)>>,
    buffered_rows: VecDeque<Row>,
    more_rows: bool,
    row_count: u64,
    batch_errors: Vec<BatchError>,
    dml_row_counts: Vec<u64>,
    converters: Vec<Option<crate::protocol::types::Converter>>,
    output_type_handler: Option<OutputTypeHandler>,
    row_factory: Option<RowFactory>,
    fetch_decimals: bool,
    warning: Option<(u16, String)>,
    closed: bool,
}

impl Cursor {
    pub(crate) fn new(conn: Weak<ConnInner>, fetch_decimals: bool) -> Self {
        Self {
            conn,
            statement: None,
            statement_key: None,
            cache_statement: true,
            arraysize: DEFAULT_ARRAY_SIZE,
            prefetchrows: DEFAULT_PREFETCH_ROWS,
            bind_vars: Vec::new(),
            input_sizes: Vec::new(),
            buffered_rows: VecDeque::new(),
            more_rows: false,
            row_count: 0,
            batch_errors: Vec::new(),
            dml_row_counts: Vec::new(),
            converters: Vec::new(),
            output_type_handler: None,
            row_factory: None,
            fetch_decimals,
            warning: None,
            closed: false,
        }
    }

    fn conn(&self) -> Result<Arc<ConnInner>> {
        if self.closed {
            return Err(Error::interface("cursor is closed"));
        }
        self.conn.upgrade().ok_or(Error::ConnectionClosed)
    }

    /// Column descriptions of the current query, populated after a
    /// successful execute and before the first fetch.
    pub fn description(&self) -> Option<Vec<Column>> {
        let statement = self.statement.as_ref()?;
        if !statement.is_query() || statement.columns.is_empty() {
            return None;
        }
        statement
            .columns
            .iter()
            .map(Column::from_metadata)
            .collect::<Result<Vec<_>>>()
            .ok()
    }

    /// Rows affected by the last DML, or rows fetched so far for a query.
    pub fn rowcount(&self) -> u64 {
        self.row_count
    }

    /// Rowid of the last single-row DML.
    pub fn lastrowid(&self) -> Option<&str> {
        self.statement.as_ref()?.last_rowid.as_deref()
    }

    /// Warning raised by the last execute, such as PL/SQL compilation
    /// errors.
    pub fn warning(&self) -> Option<&(u16, String)> {
        self.warning.as_ref()
    }

    /// Per-iteration errors from the last batch-errors executemany.
    pub fn getbatcherrors(&self) -> &[BatchError] {
        &self.batch_errors
    }

    /// Per-iteration row counts from the last executemany with row counts.
    pub fn getarraydmlrowcounts(&self) -> &[u64] {
        &self.dml_row_counts
    }

    /// Bind variables of the last execute, with OUT values populated.
    pub fn bind_variables(&self) -> &[Variable] {
        &self.bind_vars
    }

    /// Install a cursor-level output type handler. Wins over the
    /// connection-level handler.
    pub fn set_output_type_handler(&mut self, handler: Option<OutputTypeHandler>) {
        self.output_type_handler = handler;
    }

    /// Install a row factory applied to every fetched row.
    pub fn set_row_factory(&mut self, factory: Option<RowFactory>) {
        self.row_factory = factory;
    }

    /// Create a bind variable explicitly.
    pub fn var(db_type: OracleType, size: u32, array_size: u32) -> Variable {
        Variable::new(db_type, size, array_size)
    }

    /// Declare bind types ahead of execute, position by position. `None`
    /// keeps inference for that position.
    pub fn setinputsizes(&mut self, sizes: Vec<Option<(OracleType, u32)>>) {
        self.input_sizes = sizes;
    }

    /// Prepare a statement without executing. `cache_statement = false`
    /// removes any cached entry and keeps this one out of the cache.
    pub fn prepare(&mut self, sql: &str, cache_statement: bool) -> Result<()> {
        let statement = Statement::prepare(sql)?;
        let key = self.key_for(&statement, false);
        if !cache_statement {
            if let Some(conn) = self.conn.upgrade() {
                if let Ok(mut cache) = conn.stmt_cache.lock() {
                    cache.remove(&key);
                }
            }
        }
        self.cache_statement = cache_statement;
        self.statement = Some(statement);
        self.statement_key = Some(key);
        Ok(())
    }

    fn key_for(&self, statement: &Statement, array_dml: bool) -> StatementKey {
        StatementKey {
            sql: statement.sql.clone(),
            is_returning: statement.is_returning,
            array_dml,
            fetch_decimals: self.fetch_decimals,
        }
    }

    /// Execute a statement with positional parameters.
    pub async fn execute(&mut self, sql: &str, params: &[OracleValue]) -> Result<u64> {
        let vars = self.build_vars(params)?;
        self.execute_common(sql, vars, 1, ExecuteManyOptions::default(), false)
            .await
    }

    /// Execute with explicit variables, including OUT binds for
    /// DML RETURNING and PL/SQL.
    pub async fn execute_vars(&mut self, sql: &str, vars: Vec<Variable>) -> Result<u64> {
        self.execute_common(sql, vars, 1, ExecuteManyOptions::default(), false)
            .await
    }

    /// Execute the statement once per row of parameters.
    pub async fn executemany(
        &mut self,
        sql: &str,
        rows: Vec<Vec<OracleValue>>,
        options: ExecuteManyOptions,
    ) -> Result<u64> {
        let num_iters = rows.len() as u32;
        if num_iters == 0 {
            return Ok(0);
        }
        let num_binds = rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut vars = Vec::with_capacity(num_binds);
        for pos in 0..num_binds {
            let column: Vec<OracleValue> = rows
                .iter()
                .map(|row| row.get(pos).cloned().unwrap_or(OracleValue::Null))
                .collect();
            let mut var = match self.input_sizes.get(pos).and_then(Clone::clone) {
                Some((db_type, size)) => {
                    let mut var = Variable::new(db_type, size, num_iters);
                    var.values = column;
                    var.widen_for_values()?;
                    var
                }
                None => Variable::infer(&column)?,
            };
            var.array_size = num_iters;
            vars.push(var);
        }
        self.execute_common(sql, vars, num_iters, options, true).await
    }

    /// Execute many iterations with explicit variables; OUT variables
    /// accumulate one value group per iteration.
    pub async fn executemany_vars(
        &mut self,
        sql: &str,
        vars: Vec<Variable>,
        num_iters: u32,
        options: ExecuteManyOptions,
    ) -> Result<u64> {
        self.execute_common(sql, vars, num_iters, options, true).await
    }

    fn build_vars(&mut self, params: &[OracleValue]) -> Result<Vec<Variable>> {
        let mut vars = Vec::with_capacity(params.len());
        for (pos, value) in params.iter().enumerate() {
            let mut var = match self.input_sizes.get(pos).and_then(Clone::clone) {
                Some((db_type, size)) => {
                    let mut var = Variable::new(db_type, size, 1);
                    var.check_value(value)?;
                    var.values = vec![value.clone()];
                    var.widen_for_values()?;
                    var
                }
                None => Variable::infer(std::slice::from_ref(value))?,
            };
            if var.values.is_empty() {
                var.values = vec![value.clone()];
            }
            vars.push(var);
        }
        Ok(vars)
    }

    async fn execute_common(
        &mut self,
        sql: &str,
        mut vars: Vec<Variable>,
        num_iters: u32,
        options: ExecuteManyOptions,
        array_dml: bool,
    ) -> Result<u64> {
        let conn = self.conn()?;

        self.buffered_rows.clear();
        self.more_rows = false;
        self.row_count = 0;
        self.batch_errors.clear();
        self.dml_row_counts.clear();
        self.warning = None;

        // Reuse the prepared statement when it matches this SQL; otherwise
        // prepare fresh, consulting the cache.
        let reuse_prepared = matches!(
            (&self.statement, &self.statement_key),
            (Some(s), Some(k)) if s.sql == sql && k.array_dml == array_dml
        );
        let (mut statement, key) = if reuse_prepared {
            (
                self.statement.take().unwrap_or(Statement::prepare(sql)?),
                self.statement_key.take().unwrap_or_else(|| StatementKey {
                    sql: sql.to_string(),
                    is_returning: false,
                    array_dml,
                    fetch_decimals: self.fetch_decimals,
                }),
            )
        } else {
            self.cache_statement = true;
            let prepared = Statement::prepare(sql)?;
            let key = self.key_for(&prepared, array_dml);
            let cached = conn
                .stmt_cache
                .lock()
                .ok()
                .and_then(|mut cache| cache.get(&key));
            (cached.unwrap_or(prepared), key)
        };

        // Sampled once; later mutation has no effect until re-execute.
        let arraysize = self.arraysize.max(1);
        let prefetch = if statement.is_query() {
            self.prefetchrows.max(arraysize)
        } else {
            0
        };

        let autocommit =
            conn.autocommit.load(std::sync::atomic::Ordering::Acquire);

        let mut retried = false;
        loop {
            let is_query = statement.is_query();
            // DDL invalidates any previously parsed cursor.
            if statement.is_ddl() {
                statement.cursor_id = 0;
            }

            let sql_bytes: &[u8] = if statement.cursor_id == 0 {
                statement.sql.as_bytes()
            } else {
                &[]
            };
            let mut msg = ExecuteMessage::new(
                sql_bytes,
                statement.cursor_id,
                is_query,
                statement.is_plsql(),
                prefetch,
                conn.caps.ttc_field_version,
            );
            msg.autocommit = autocommit;
            if !vars.is_empty() || num_iters > 1 {
                msg.set_binds(
                    &vars,
                    num_iters,
                    options.batch_errors,
                    options.array_dml_row_counts,
                )?;
            }

            let mut parser = self.make_parser(&conn, &statement, &vars);
            conn.process(&msg, &mut parser).await?;

            let state = &parser.state;
            if let Some(info) = &state.error_info {
                if info.is_error() {
                    let invalidated = state.retry && statement.cursor_id != 0;
                    if invalidated && !retried {
                        debug!(
                            "ORA-{:05}: repreparing statement and retrying once",
                            info.error_num
                        );
                        if let Ok(mut cache) = conn.stmt_cache.lock() {
                            cache.add_tombstone(statement.cursor_id);
                        }
                        statement.cursor_id = 0;
                        statement.columns.clear();
                        retried = true;
                        continue;
                    }
                    let batch_collected = options.batch_errors
                        && (info.error_num == TNS_ERR_ARRAY_DML_ERRORS
                            || !info.batch_errors.is_empty());
                    if !batch_collected {
                        return Err(info.to_error());
                    }
                    self.batch_errors = info.batch_errors.clone();
                }
            }

            self.finish_execute(&conn, &mut statement, key.clone(), parser, &mut vars)?;
            self.bind_vars = vars;
            self.statement_key = Some(key);
            let row_count = self.row_count;
            self.statement = Some(statement);
            return Ok(row_count);
        }
    }

    fn make_parser(
        &self,
        conn: &Arc<ConnInner>,
        statement: &Statement,
        vars: &[Variable],
    ) -> ResponseParser {
        let mut parser = conn.new_parser();

        if statement.cursor_id != 0 && statement.is_query() && !statement.columns.is_empty() {
            if let Ok(p) = parser.with_columns(statement.columns.clone()) {
                parser = p.with_fetch_types(statement.fetch_types.clone());
            } else {
                parser = conn.new_parser();
            }
        }

        let slots: Vec<OutBindSlot> = vars
            .iter()
            .map(|v| OutBindSlot {
                ora_type_num: v.db_type.type_num(),
                csfrm: v.db_type.csfrm(),
                is_out: !matches!(v.direction, BindDirection::Input),
            })
            .collect();
        if slots.iter().any(|s| s.is_out) {
            parser = parser.with_bind_slots(slots);
        }

        let cursor_handler = self.output_type_handler.clone();
        let conn_handler = conn
            .output_type_handler
            .lock()
            .ok()
            .and_then(|h| h.clone());
        let fetch_decimals = self.fetch_decimals;
        parser.with_describe_hook(Box::new(move |columns| {
            compute_var_configs(columns, &cursor_handler, &conn_handler, fetch_decimals)
                .into_iter()
                .map(|c| c.fetch_type)
                .collect()
        }))
    }

    fn finish_execute(
        &mut self,
        conn: &Arc<ConnInner>,
        statement: &mut Statement,
        key: StatementKey,
        parser: ResponseParser,
        vars: &mut Vec<Variable>,
    ) -> Result<()> {
        let fetch_types = parser.fetch_types().to_vec();
        let state = parser.state;

        if let Some(info) = &state.error_info {
            if info.cursor_id != 0 {
                statement.cursor_id = info.cursor_id as u32;
            }
            self.row_count = if statement.is_query() {
                state.rows.len() as u64
            } else {
                info.row_count
            };
            statement.last_rowid = info.rowid.clone();
        } else {
            self.row_count = state.rows.len() as u64;
        }
        statement.executions += 1;
        self.warning = state.warning.clone();
        self.dml_row_counts = state.dml_row_counts.clone();

        if !state.columns.is_empty() {
            statement.columns = state.columns.clone();
            statement.fetch_types = fetch_types;
            self.converters = compute_var_configs(
                &statement.columns,
                &self.output_type_handler,
                &conn.output_type_handler.lock().ok().and_then(|h| h.clone()),
                self.fetch_decimals,
            )
            .into_iter()
            .map(|c| c.converter)
            .collect();
        }

        // Seed the row buffer with the prefetched rows.
        self.more_rows = statement.is_query() && state.more_rows;
        for row in state.rows {
            let row = self.transform_row(row)?;
            self.buffered_rows.push_back(row);
        }

        // Distribute OUT bind values: one group per iteration, in order.
        if !state.out_bind_values.is_empty() {
            let out_indices: Vec<usize> = vars
                .iter()
                .enumerate()
                .filter(|(_, v)| !matches!(v.direction, BindDirection::Input))
                .map(|(i, _)| i)
                .collect();
            for iteration in state.out_bind_values {
                for (slot, values) in out_indices.iter().zip(iteration) {
                    vars[*slot].out_values.push(values);
                }
            }
        }

        if self.cache_statement {
            if let Ok(mut cache) = conn.stmt_cache.lock() {
                if cache.is_enabled() {
                    cache.put(key, statement.clone());
                }
            }
        }
        Ok(())
    }

    fn transform_row(&mut self, row: Row) -> Result<Row> {
        let needs_convert = self.converters.iter().any(Option::is_some);
        let mut row = row;
        if needs_convert {
            let info = row.shared_columns();
            let mut values = row.into_values();
            for (i, value) in values.iter_mut().enumerate() {
                if let Some(Some(converter)) = self.converters.get(i) {
                    let taken = std::mem::replace(value, OracleValue::Null);
                    *value = converter(taken)?;
                }
            }
            row = Row::new(values, info);
        }
        if let Some(factory) = &self.row_factory {
            let info = row.shared_columns();
            let values = factory(row.into_values())?;
            row = Row::new(values, info);
        }
        Ok(row)
    }

    /// Fetch the next row, issuing a server fetch when the buffer is empty
    /// and the server holds more rows.
    pub async fn fetchone(&mut self) -> Result<Option<Row>> {
        if let Some(row) = self.buffered_rows.pop_front() {
            return Ok(Some(row));
        }
        if !self.more_rows {
            return Ok(None);
        }
        self.fetch_from_server().await?;
        Ok(self.buffered_rows.pop_front())
    }

    /// Fetch up to `n` rows.
    pub async fn fetchmany(&mut self, n: usize) -> Result<Vec<Row>> {
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            match self.fetchone().await? {
                Some(row) => out.push(row),
                None => break,
            }
        }
        Ok(out)
    }

    /// Fetch all remaining rows.
    pub async fn fetchall(&mut self) -> Result<Vec<Row>> {
        let mut out = Vec::new();
        while let Some(row) = self.fetchone().await? {
            out.push(row);
        }
        Ok(out)
    }

    async fn fetch_from_server(&mut self) -> Result<()> {
        let conn = self.conn()?;
        let statement = self
            .statement
            .as_ref()
            .ok_or_else(|| Error::interface("fetch before execute"))?;
        if !statement.is_query() {
            return Err(Error::interface("statement returned no result set"));
        }
        if statement.cursor_id == 0 {
            self.more_rows = false;
            return Ok(());
        }

        let msg = FetchMessage::new(statement.cursor_id, self.arraysize.max(1));
        let mut parser = conn
            .new_parser()
            .with_columns(statement.columns.clone())?
            .with_fetch_types(statement.fetch_types.clone());
        conn.process(&msg, &mut parser).await?;

        if let Some(info) = &parser.state.error_info {
            if info.is_error() {
                return Err(info.to_error());
            }
        }

        self.more_rows = parser.state.more_rows;
        let rows = std::mem::take(&mut parser.state.rows);
        self.row_count += rows.len() as u64;
        for row in rows {
            let row = self.transform_row(row)?;
            self.buffered_rows.push_back(row);
        }
        Ok(())
    }

    /// Scrollable cursors need the thick path; the server-side negotiation
    /// flag is accepted but scrolling itself is refused.
    pub fn scroll(&mut self, _mode: ScrollMode, _offset: i32) -> Result<()> {
        Err(Error::NotSupported {
            feature: "scrollable cursors",
        })
    }

    /// Close the cursor. The server-side close rides on the next round trip.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.release_statement();
        self.buffered_rows.clear();
    }

    fn release_statement(&mut self) {
        let Some(statement) = self.statement.take() else {
            return;
        };
        let Some(conn) = self.conn.upgrade() else {
            return;
        };
        let cached = self
            .statement_key
            .as_ref()
            .and_then(|key| conn.stmt_cache.lock().ok().map(|c| c.contains(key)))
            .unwrap_or(false);
        if !cached && statement.cursor_id != 0 {
            if let Ok(mut cache) = conn.stmt_cache.lock() {
                cache.add_tombstone(statement.cursor_id);
            }
        }
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        self.close();
    }
}

/// Resolve the per-column configuration: the cursor handler wins over the
/// connection handler; no handler keeps the defaults.
fn compute_var_configs(
    columns: &[ColumnMetadata],
    cursor_handler: &Option<OutputTypeHandler>,
    conn_handler: &Option<OutputTypeHandler>,
    fetch_decimals: bool,
) -> Vec<VarConfig> {
    columns
        .iter()
        .map(|meta| {
            let default_type = if fetch_decimals
                && meta.oracle_type as u16 == ORA_TYPE_NUM_NUMBER
            {
                FetchType::DecimalString
            } else {
                FetchType::Default
            };
            let ctx = DescribeContext {
                metadata: meta,
                default_type,
            };
            let handled = cursor_handler
                .as_ref()
                .and_then(|h| h(&ctx))
                .or_else(|| conn_handler.as_ref().and_then(|h| h(&ctx)));
            handled.unwrap_or(VarConfig {
                fetch_type: default_type,
                converter: None,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_var_configs_defaults() {
        let mut number = ColumnMetadata::new("N".to_string(), ORA_TYPE_NUM_NUMBER as u8);
        number.precision = 5;
        number.scale = 3;
        let varchar = ColumnMetadata::new("S".to_string(), ORA_TYPE_NUM_VARCHAR as u8);

        let configs = compute_var_configs(&[number.clone(), varchar.clone()], &None, &None, false);
        assert_eq!(configs[0].fetch_type, FetchType::Default);
        assert_eq!(configs[1].fetch_type, FetchType::Default);

        let configs = compute_var_configs(&[number, varchar], &None, &None, true);
        assert_eq!(configs[0].fetch_type, FetchType::DecimalString);
        assert_eq!(configs[1].fetch_type, FetchType::Default);
    }

    #[test]
    fn test_cursor_handler_wins() {
        let number = ColumnMetadata::new("N".to_string(), ORA_TYPE_NUM_NUMBER as u8);

        let cursor_handler: OutputTypeHandler = Arc::new(|_ctx| {
            Some(VarConfig {
                fetch_type: FetchType::DecimalString,
                converter: None,
            })
        });
        let conn_handler: OutputTypeHandler = Arc::new(|_ctx| {
            Some(VarConfig {
                fetch_type: FetchType::Double,
                converter: None,
            })
        });

        let configs = compute_var_configs(
            std::slice::from_ref(&number),
            &Some(cursor_handler),
            &Some(conn_handler.clone()),
            false,
        );
        assert_eq!(configs[0].fetch_type, FetchType::DecimalString);

        let configs =
            compute_var_configs(std::slice::from_ref(&number), &None, &Some(conn_handler), false);
        assert_eq!(configs[0].fetch_type, FetchType::Double);
    }

    #[test]
    fn test_scroll_refused() {
        let mut cursor = Cursor::new(Weak::new(), false);
        assert!(matches!(
            cursor.scroll(ScrollMode::Absolute, 10),
            Err(Error::NotSupported { .. })
        ));
    }

    #[test]
    fn test_fetch_requires_execute() {
        let mut cursor = Cursor::new(Weak::new(), false);
        // No connection and no statement: connection error surfaces first.
        let err = tokio_test::block_on(cursor.fetchone());
        assert!(err.unwrap().is_none());
    }
}
