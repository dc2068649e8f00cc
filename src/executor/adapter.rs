use super::result::{reconstruct, RowSet, StatementResult};
use crate::backend::{Connection, ConnectionHandle, Outcome};
use crate::catalog::{catalog_table_ddl, decode_catalog_rows, latest_stamp_sql, select_entries_sql, Catalog};
use crate::config::AdapterConfig;
use crate::parser::parse_statement;
use crate::translator::{translate, AffectedCount, CatalogChange, Plan, PlanOutput, StepRole, TranslationContext};
use crate::types::{AdapterError, BackendError, Chronon, Clock, Result, SystemClock, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Lifecycle of the statement most recently given to the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementPhase {
    Received,
    Parsed,
    Planned,
    Executing,
    Committed,
    RolledBack,
    Reported,
}

fn execution_error(statement: &str, table: Option<&str>, source: BackendError) -> AdapterError {
    AdapterError::Execution {
        statement: statement.to_string(),
        table: table.map(str::to_string),
        source,
    }
}

/// Temporal SQL front end over one backend connection.
///
/// Every temporal statement becomes a plan of standard SQL that runs in a
/// single backend transaction: it either takes effect completely or not at
/// all. Statements that are not temporal are forwarded as they are.
#[derive(Debug)]
pub struct TemporalAdapter {
    connection: ConnectionHandle,
    catalog: Arc<Catalog>,
    config: AdapterConfig,
    clock: Arc<dyn Clock>,
    last_stamp: Option<Chronon>,
    last_phase: Option<StatementPhase>,
    closed: bool,
}

impl TemporalAdapter {
    pub fn open(connection: ConnectionHandle, config: AdapterConfig) -> Result<Self> {
        Self::open_with_clock(connection, config, Arc::new(SystemClock))
    }

    /// Opens the adapter with its own source of statement time.
    ///
    /// With a persisted catalog, the metadata table is created on first use
    /// and read back on later opens. Stamps then continue after the latest
    /// transaction time already stored, whatever the clock says.
    pub fn open_with_clock(connection: ConnectionHandle, config: AdapterConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let catalog = Arc::new(Catalog::new());
        let mut last_stamp = None;
        if let Some(table) = config.catalog_table() {
            last_stamp = load_catalog(&connection, table, &catalog)?;
        }
        info!(
            dialect = %config.dialect,
            time_type = config.time_type(),
            tables = catalog.len(),
            last_stamp = ?last_stamp,
            "temporal adapter opened"
        );
        Ok(Self {
            connection,
            catalog,
            config,
            clock,
            last_stamp,
            last_phase: None,
            closed: false,
        })
    }

    #[must_use]
    pub const fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    #[must_use]
    pub const fn config(&self) -> &AdapterConfig {
        &self.config
    }

    #[must_use]
    pub const fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    #[must_use]
    pub const fn last_phase(&self) -> Option<StatementPhase> {
        self.last_phase
    }

    /// Stamp given to the most recent statement.
    #[must_use]
    pub const fn last_stamp(&self) -> Option<Chronon> {
        self.last_stamp
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    // Strictly increasing, even when the clock stalls or steps back
    fn next_stamp(&mut self) -> Chronon {
        let now = self.clock.now();
        let stamp = match self.last_stamp {
            Some(last) if now <= last => Chronon::from_micros(last.as_micros().saturating_add(1)),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }

    /// Parses and translates a statement without running it.
    pub fn plan(&mut self, sql: &str) -> Result<Plan> {
        self.last_phase = Some(StatementPhase::Received);
        let stmt = parse_statement(sql)?;
        self.last_phase = Some(StatementPhase::Parsed);

        let stamp = self.next_stamp();
        let ctx = TranslationContext {
            stamp,
            time_type: self.config.time_type(),
            table_prefix: &self.config.table_prefix,
            catalog_table: self.config.catalog_table(),
        };
        let plan = translate(sql, &stmt, &self.catalog, &ctx)?;
        self.last_phase = Some(StatementPhase::Planned);
        debug!(table = ?plan.table, stamp = %plan.stamp, steps = plan.steps.len(), "statement planned");
        Ok(plan)
    }

    /// Runs one statement.
    pub fn execute(&mut self, sql: &str) -> Result<StatementResult> {
        if self.closed {
            return Err(execution_error(sql, None, BackendError::ConnectionClosed));
        }
        let plan = self.plan(sql)?;
        let handle = self.connection.clone();
        let mut conn = handle.lock().map_err(|e| execution_error(sql, plan.table.as_deref(), e))?;

        self.last_phase = Some(StatementPhase::Executing);
        if plan.is_pass_through() {
            let result = forward(conn.as_mut(), &plan)?;
            self.last_phase = Some(StatementPhase::Reported);
            return Ok(result);
        }

        conn.begin()
            .map_err(|e| execution_error("BEGIN", plan.table.as_deref(), e))?;
        let result = match run_steps(conn.as_mut(), &plan) {
            Ok(result) => result,
            Err(e) => {
                rollback(conn.as_mut(), &plan);
                self.last_phase = Some(StatementPhase::RolledBack);
                return Err(e);
            }
        };
        // The catalog update after COMMIT must not be able to fail
        let duplicate = match &plan.catalog_change {
            Some(CatalogChange::Register(table)) if self.catalog.contains(&table.name) => Some(table.name.clone()),
            _ => None,
        };
        if let Some(name) = duplicate {
            rollback(conn.as_mut(), &plan);
            self.last_phase = Some(StatementPhase::RolledBack);
            return Err(AdapterError::DuplicateTable(name));
        }
        if let Err(e) = conn.commit() {
            rollback(conn.as_mut(), &plan);
            self.last_phase = Some(StatementPhase::RolledBack);
            return Err(execution_error("COMMIT", plan.table.as_deref(), e));
        }
        drop(conn);
        self.last_phase = Some(StatementPhase::Committed);

        match plan.catalog_change {
            Some(CatalogChange::Register(table)) => {
                self.catalog.replace(table);
            }
            Some(CatalogChange::Unregister(name)) => {
                self.catalog.unregister(&name);
            }
            None => {}
        }

        info!(table = ?plan.table, stamp = %plan.stamp, "temporal statement committed");
        self.last_phase = Some(StatementPhase::Reported);
        Ok(result)
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if !self.config.close_connection_on_close {
            info!("temporal adapter closed, connection left open");
            return Ok(());
        }
        let mut conn = self
            .connection
            .lock()
            .map_err(|e| execution_error("CLOSE", None, e))?;
        conn.close().map_err(|e| execution_error("CLOSE", None, e))?;
        info!("temporal adapter and connection closed");
        Ok(())
    }

    /// Closes the adapter, and the connection when so configured.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }
}

impl Drop for TemporalAdapter {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "failed to close connection");
        }
    }
}

/// Loads catalog entries and returns the latest transaction time stored in
/// their tables.
fn load_catalog(connection: &ConnectionHandle, table: &str, catalog: &Catalog) -> Result<Option<Chronon>> {
    let mut conn = connection.lock().map_err(|e| execution_error("OPEN", None, e))?;
    let exists = conn
        .table_exists(table)
        .map_err(|e| execution_error(table, None, e))?;
    if !exists {
        let ddl = catalog_table_ddl(table);
        conn.execute(&ddl).map_err(|e| execution_error(&ddl, None, e))?;
        info!(table, "created catalog table");
        return Ok(None);
    }

    let query = select_entries_sql(table);
    let rows = match conn.execute(&query).map_err(|e| execution_error(&query, None, e))? {
        Outcome::Rows { rows, .. } => rows,
        Outcome::Count(_) => Vec::new(),
    };
    let mut latest: Option<Chronon> = None;
    for entry in decode_catalog_rows(&rows)? {
        if let Some(query) = latest_stamp_sql(&entry) {
            let outcome = conn
                .execute(&query)
                .map_err(|e| execution_error(&query, Some(entry.name.as_str()), e))?;
            if let Outcome::Rows { rows, .. } = outcome {
                let stamp = rows.first().and_then(|r| r.get(0)).and_then(Value::to_chronon);
                latest = latest.max(stamp);
            }
        }
        catalog.register(entry)?;
    }
    info!(table, entries = catalog.len(), "loaded catalog");
    Ok(latest)
}

fn forward(conn: &mut dyn Connection, plan: &Plan) -> Result<StatementResult> {
    let mut result = StatementResult::Count(0);
    for step in &plan.steps {
        debug!(sql = %step.sql, "forwarding statement");
        result = match conn
            .execute(&step.sql)
            .map_err(|e| execution_error(&step.sql, None, e))?
        {
            Outcome::Rows { columns, rows } => StatementResult::Rows(RowSet::new(columns, rows)),
            Outcome::Count(n) => StatementResult::Count(n),
        };
    }
    Ok(result)
}

fn rollback(conn: &mut dyn Connection, plan: &Plan) {
    match conn.rollback() {
        Ok(()) => warn!(table = ?plan.table, stamp = %plan.stamp, "temporal statement rolled back"),
        Err(e) => error!(table = ?plan.table, error = %e, "rollback failed"),
    }
}

fn run_steps(conn: &mut dyn Connection, plan: &Plan) -> Result<StatementResult> {
    let table = plan.table.as_deref();
    let mut probed = 0;
    let mut answer = None;

    for step in &plan.steps {
        debug!(sql = %step.sql, role = ?step.role, "executing plan step");
        let outcome = conn
            .execute(&step.sql)
            .map_err(|e| execution_error(&step.sql, table, e))?;
        match &step.role {
            StepRole::Probe => {
                probed = outcome.row_count();
                if probed == 0 {
                    debug!("no rows matched, skipping remaining steps");
                    break;
                }
            }
            StepRole::Guard { message } => {
                if outcome.row_count() > 0 {
                    return Err(execution_error(
                        &step.sql,
                        table,
                        BackendError::ConstraintViolation(message.clone()),
                    ));
                }
            }
            StepRole::Query => match outcome {
                Outcome::Rows { columns, rows } => answer = Some((step.sql.as_str(), columns, rows)),
                Outcome::Count(_) => {
                    return Err(execution_error(
                        &step.sql,
                        table,
                        BackendError::Sql("query returned no result set".to_string()),
                    ));
                }
            },
            StepRole::Write | StepRole::PassThrough => {}
        }
    }

    match plan.output {
        PlanOutput::Affected(AffectedCount::Probe) => Ok(StatementResult::Count(probed)),
        PlanOutput::Affected(AffectedCount::Fixed(n)) => Ok(StatementResult::Count(n)),
        PlanOutput::Rows(reconstruction) => {
            let (sql, columns, rows) = answer.ok_or_else(|| {
                execution_error("", table, BackendError::Sql("plan has no query step".to_string()))
            })?;
            let set = reconstruct(reconstruction, columns, rows).map_err(|e| execution_error(sql, table, e))?;
            Ok(StatementResult::Rows(set))
        }
        PlanOutput::Backend => Ok(StatementResult::Count(0)),
    }
}
