//! Graph store collaborator.
//!
//! The authorization engine never owns statements; it consults and writes
//! through a [`GraphStore`]:
//!
//! - pattern matching and existence checks, used for wildcard-removal
//!   expansion and backward edge discovery
//! - SPARQL `SELECT`/`ASK`, used by the policy oracle
//! - bulk add/remove, used when a batch flushes
//! - a begin/commit/rollback lifecycle that every flush of one batch joins
//!
//! [`OxGraphStore`] is the oxigraph-backed implementation.

pub mod ox;

use std::collections::HashMap;

use crate::model::{Context, Statement, StatementPattern, Value};

pub use crate::error::StoreResult;
pub use ox::OxGraphStore;

/// One row of a SPARQL `SELECT` result, keyed by variable name.
pub type Bindings = HashMap<String, Value>;

/// Storage and query facility consumed by the authorization engine.
///
/// An empty `contexts` slice addresses the default graph only.
pub trait GraphStore: Send + Sync {
    /// All concrete statements matching `pattern` in any of `contexts`.
    ///
    /// A statement present in several contexts is reported once.
    fn match_pattern(
        &self,
        pattern: &StatementPattern,
        contexts: &[Context],
    ) -> StoreResult<Vec<Statement>>;

    /// Whether at least one statement matches `pattern` in `contexts`.
    fn exists(&self, pattern: &StatementPattern, contexts: &[Context]) -> StoreResult<bool>;

    /// Evaluate a SPARQL `SELECT` query.
    fn select(&self, query: &str) -> StoreResult<Vec<Bindings>>;

    /// Evaluate a SPARQL `ASK` query.
    fn ask(&self, query: &str) -> StoreResult<bool>;

    /// Insert `statements` into every context in `contexts`.
    fn flush_add(&self, statements: &[Statement], contexts: &[Context]) -> StoreResult<()>;

    /// Remove everything matching any of `patterns` from `contexts`.
    fn flush_remove(&self, patterns: &[StatementPattern], contexts: &[Context])
    -> StoreResult<()>;

    /// All named contexts currently holding statements.
    fn contexts(&self) -> StoreResult<Vec<Context>>;

    fn begin(&self) -> StoreResult<()>;

    fn commit(&self) -> StoreResult<()>;

    fn rollback(&self) -> StoreResult<()>;

    fn is_active(&self) -> bool;
}
