/// Executor module - runs translated plans and shapes their results
///
/// Structure:
/// - adapter: statement lifecycle, transactions, catalog updates
/// - result: row sets and decoding of time columns
/// - coalesce: merging of value-equivalent periods
mod adapter;
mod coalesce;
mod result;

pub use adapter::{StatementPhase, TemporalAdapter};
pub use coalesce::{coalesce, Coalesce};
pub use result::{reconstruct, RowSet, StatementResult};
