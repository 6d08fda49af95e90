//! Oxigraph-backed graph store.
//!
//! Writes are applied to the store immediately so later reads in the same
//! transaction observe them. While a transaction is active every effective
//! insert and removal is journaled, and `rollback` replays the journal in
//! reverse.
//!
//! Sessions of one store share a single write slot: while one session's
//! transaction is open, `begin` and every write of the other sessions fail
//! with [`StoreError::TransactionConflict`]. Reads are not isolated, but no
//! write can land on top of another session's uncommitted state.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use oxigraph::model::{GraphName, Quad};
use oxigraph::sparql::QueryResults;
use oxigraph::store::Store;

use crate::error::StoreError;
use crate::model::{Context, Resource, Statement, StatementPattern, Value};

use super::{Bindings, GraphStore, StoreResult};

/// A journaled write, recorded only when it changed the store.
#[derive(Debug, Clone)]
enum JournalEntry {
    Inserted(Quad),
    Removed(Quad),
}

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Persistent or in-memory RDF store with a begin/commit/rollback lifecycle.
///
/// The transaction journal belongs to this handle. Use [`OxGraphStore::session`]
/// to obtain another handle on the same underlying data.
pub struct OxGraphStore {
    store: Store,
    session: u64,
    /// Session currently holding the write transaction, shared by all sessions.
    writer: Arc<Mutex<Option<u64>>>,
    journal: Mutex<Option<Vec<JournalEntry>>>,
}

impl OxGraphStore {
    /// Create a new in-memory store (no persistence).
    pub fn in_memory() -> StoreResult<Self> {
        let store = Store::new().map_err(|e| StoreError::Storage {
            message: format!("failed to create oxigraph store: {e}"),
        })?;
        Ok(Self::from_store(store, Arc::new(Mutex::new(None))))
    }

    /// Open or create a persistent store at the given path.
    pub fn open(path: &std::path::Path) -> StoreResult<Self> {
        std::fs::create_dir_all(path).map_err(|e| StoreError::Storage {
            message: format!("failed to create oxigraph directory: {e}"),
        })?;
        let store = Store::open(path).map_err(|e| StoreError::Storage {
            message: format!("failed to open oxigraph store at {}: {e}", path.display()),
        })?;
        Ok(Self::from_store(store, Arc::new(Mutex::new(None))))
    }

    fn from_store(store: Store, writer: Arc<Mutex<Option<u64>>>) -> Self {
        Self {
            store,
            session: NEXT_SESSION.fetch_add(1, Ordering::Relaxed),
            writer,
            journal: Mutex::new(None),
        }
    }

    /// A new handle on the same data with its own transaction journal.
    ///
    /// Writes of all sessions are serialized through one write slot.
    pub fn session(&self) -> Self {
        Self::from_store(self.store.clone(), self.writer.clone())
    }

    /// Number of quads across all graphs.
    pub fn len(&self) -> StoreResult<usize> {
        self.store.len().map_err(|e| StoreError::Storage {
            message: format!("len failed: {e}"),
        })
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        self.len().map(|n| n == 0)
    }

    /// Get internal store reference (for advanced oxigraph operations).
    pub fn store(&self) -> &Store {
        &self.store
    }

    fn graph_names(contexts: &[Context]) -> Vec<GraphName> {
        if contexts.is_empty() {
            vec![GraphName::DefaultGraph]
        } else {
            contexts.iter().cloned().map(GraphName::NamedNode).collect()
        }
    }

    fn quads_matching(
        &self,
        pattern: &StatementPattern,
        graph: &GraphName,
    ) -> StoreResult<Vec<Quad>> {
        let subject = pattern.subject.as_ref().map(Resource::to_ox);
        let object = pattern.object.as_ref().map(Value::to_ox);
        self.store
            .quads_for_pattern(
                subject.as_ref().map(|s| s.as_ref()),
                pattern.predicate.as_ref().map(|p| p.as_ref()),
                object.as_ref().map(|o| o.as_ref()),
                Some(graph.as_ref()),
            )
            .map(|q| {
                q.map_err(|e| StoreError::Storage {
                    message: format!("pattern match failed: {e}"),
                })
            })
            .collect()
    }

    fn record(&self, entry: JournalEntry) {
        let mut journal = self.journal.lock().expect("journal lock poisoned");
        if let Some(entries) = journal.as_mut() {
            entries.push(entry);
        }
    }

    /// Fails when another session holds the write transaction.
    fn check_writer(&self) -> StoreResult<()> {
        match *self.writer.lock().expect("writer lock poisoned") {
            Some(holder) if holder != self.session => Err(StoreError::TransactionConflict),
            _ => Ok(()),
        }
    }

    fn release_writer(&self) {
        let mut writer = self.writer.lock().expect("writer lock poisoned");
        if *writer == Some(self.session) {
            *writer = None;
        }
    }

    fn contains(&self, quad: &Quad) -> StoreResult<bool> {
        self.store.contains(quad).map_err(|e| StoreError::Storage {
            message: format!("lookup failed: {e}"),
        })
    }

    // Only effective writes are journaled, so rollback never touches quads
    // that existed before `begin`.
    fn insert_quad(&self, quad: Quad) -> StoreResult<()> {
        if self.contains(&quad)? {
            return Ok(());
        }
        self.store.insert(&quad).map_err(|e| StoreError::Storage {
            message: format!("insert failed: {e}"),
        })?;
        self.record(JournalEntry::Inserted(quad));
        Ok(())
    }

    fn remove_quad(&self, quad: Quad) -> StoreResult<()> {
        if !self.contains(&quad)? {
            return Ok(());
        }
        self.store.remove(&quad).map_err(|e| StoreError::Storage {
            message: format!("remove failed: {e}"),
        })?;
        self.record(JournalEntry::Removed(quad));
        Ok(())
    }
}

impl GraphStore for OxGraphStore {
    fn match_pattern(
        &self,
        pattern: &StatementPattern,
        contexts: &[Context],
    ) -> StoreResult<Vec<Statement>> {
        let mut seen = HashSet::new();
        let mut statements = Vec::new();
        for graph in Self::graph_names(contexts) {
            for quad in self.quads_matching(pattern, &graph)? {
                let stmt = Statement {
                    subject: Resource::from_ox(quad.subject)?,
                    predicate: quad.predicate,
                    object: Value::from_ox(quad.object)?,
                };
                if seen.insert(stmt.clone()) {
                    statements.push(stmt);
                }
            }
        }
        Ok(statements)
    }

    fn exists(&self, pattern: &StatementPattern, contexts: &[Context]) -> StoreResult<bool> {
        for graph in Self::graph_names(contexts) {
            let subject = pattern.subject.as_ref().map(Resource::to_ox);
            let object = pattern.object.as_ref().map(Value::to_ox);
            let first = self
                .store
                .quads_for_pattern(
                    subject.as_ref().map(|s| s.as_ref()),
                    pattern.predicate.as_ref().map(|p| p.as_ref()),
                    object.as_ref().map(|o| o.as_ref()),
                    Some(graph.as_ref()),
                )
                .next();
            match first {
                Some(Ok(_)) => return Ok(true),
                Some(Err(e)) => {
                    return Err(StoreError::Storage {
                        message: format!("existence check failed: {e}"),
                    });
                }
                None => {}
            }
        }
        Ok(false)
    }

    fn select(&self, query: &str) -> StoreResult<Vec<Bindings>> {
        let results = self.store.query(query).map_err(|e| StoreError::Sparql {
            message: format!("SPARQL query failed: {e}"),
        })?;

        match results {
            QueryResults::Solutions(solutions) => {
                let mut rows = Vec::new();
                for solution in solutions {
                    let solution = solution.map_err(|e| StoreError::Sparql {
                        message: format!("solution error: {e}"),
                    })?;
                    let mut row = Bindings::new();
                    for (var, term) in solution.iter() {
                        row.insert(var.as_str().to_string(), Value::from_ox(term.clone())?);
                    }
                    rows.push(row);
                }
                Ok(rows)
            }
            _ => Err(StoreError::Sparql {
                message: "expected solutions from SELECT query".into(),
            }),
        }
    }

    fn ask(&self, query: &str) -> StoreResult<bool> {
        let results = self.store.query(query).map_err(|e| StoreError::Sparql {
            message: format!("SPARQL query failed: {e}"),
        })?;
        match results {
            QueryResults::Boolean(b) => Ok(b),
            _ => Err(StoreError::Sparql {
                message: "expected boolean result from ASK query".into(),
            }),
        }
    }

    fn flush_add(&self, statements: &[Statement], contexts: &[Context]) -> StoreResult<()> {
        self.check_writer()?;
        for graph in Self::graph_names(contexts) {
            for stmt in statements {
                self.insert_quad(Quad::new(
                    stmt.subject.to_ox(),
                    stmt.predicate.clone(),
                    stmt.object.to_ox(),
                    graph.clone(),
                ))?;
            }
        }
        tracing::debug!(count = statements.len(), contexts = contexts.len(), "flushed additions");
        Ok(())
    }

    fn flush_remove(
        &self,
        patterns: &[StatementPattern],
        contexts: &[Context],
    ) -> StoreResult<()> {
        self.check_writer()?;
        let mut removed = 0usize;
        for graph in Self::graph_names(contexts) {
            for pattern in patterns {
                for quad in self.quads_matching(pattern, &graph)? {
                    self.remove_quad(quad)?;
                    removed += 1;
                }
            }
        }
        tracing::debug!(patterns = patterns.len(), removed, "flushed removals");
        Ok(())
    }

    fn contexts(&self) -> StoreResult<Vec<Context>> {
        let mut contexts = Vec::new();
        for graph in self.store.named_graphs() {
            let graph = graph.map_err(|e| StoreError::Storage {
                message: format!("listing named graphs failed: {e}"),
            })?;
            if let Resource::Named(n) = Resource::from_ox(graph)? {
                contexts.push(n);
            }
        }
        Ok(contexts)
    }

    fn begin(&self) -> StoreResult<()> {
        let mut journal = self.journal.lock().expect("journal lock poisoned");
        if journal.is_some() {
            return Err(StoreError::NestedTransaction);
        }
        let mut writer = self.writer.lock().expect("writer lock poisoned");
        if writer.is_some() {
            return Err(StoreError::TransactionConflict);
        }
        *writer = Some(self.session);
        *journal = Some(Vec::new());
        Ok(())
    }

    fn commit(&self) -> StoreResult<()> {
        let entries = self
            .journal
            .lock()
            .expect("journal lock poisoned")
            .take()
            .ok_or(StoreError::NoTransaction)?;
        self.release_writer();
        tracing::debug!(writes = entries.len(), "store transaction committed");
        Ok(())
    }

    fn rollback(&self) -> StoreResult<()> {
        let entries = self
            .journal
            .lock()
            .expect("journal lock poisoned")
            .take()
            .ok_or(StoreError::NoTransaction)?;
        let undone = entries.len();
        let replayed = entries.into_iter().rev().try_for_each(|entry| match entry {
            JournalEntry::Inserted(quad) => self.store.remove(&quad),
            JournalEntry::Removed(quad) => self.store.insert(&quad),
        });
        self.release_writer();
        replayed.map_err(|e| StoreError::Storage {
            message: format!("rollback failed: {e}"),
        })?;
        tracing::debug!(undone, "store transaction rolled back");
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.journal.lock().expect("journal lock poisoned").is_some()
    }
}

impl std::fmt::Debug for OxGraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OxGraphStore")
            .field("session", &self.session)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BlankId, named_node};

    fn ctx() -> Context {
        named_node("urn:ctx:one").unwrap()
    }

    fn stmt(s: &str, o: &str) -> Statement {
        Statement::new(
            named_node(s).unwrap(),
            named_node("urn:p:rel").unwrap(),
            named_node(o).unwrap(),
        )
    }

    #[test]
    fn add_then_match() {
        let store = OxGraphStore::in_memory().unwrap();
        store.flush_add(&[stmt("urn:x:a", "urn:x:b")], &[ctx()]).unwrap();

        let found = store
            .match_pattern(&StatementPattern::about(named_node("urn:x:a").unwrap()), &[ctx()])
            .unwrap();
        assert_eq!(found.len(), 1);
        // Not visible in the default graph.
        assert!(store.match_pattern(&StatementPattern::any(), &[]).unwrap().is_empty());
    }

    #[test]
    fn blank_nodes_round_trip_through_store() {
        let store = OxGraphStore::in_memory().unwrap();
        let b = BlankId::from_raw(7);
        let s = Statement::new(b, named_node("urn:p:rel").unwrap(), "x");
        store.flush_add(&[s.clone()], &[ctx()]).unwrap();

        let found = store.match_pattern(&StatementPattern::about(b), &[ctx()]).unwrap();
        assert_eq!(found, vec![s]);
    }

    #[test]
    fn rollback_undoes_inserts_and_removals() {
        let store = OxGraphStore::in_memory().unwrap();
        store.flush_add(&[stmt("urn:x:keep", "urn:x:b")], &[ctx()]).unwrap();

        store.begin().unwrap();
        store.flush_add(&[stmt("urn:x:new", "urn:x:b")], &[ctx()]).unwrap();
        store
            .flush_remove(&[StatementPattern::about(named_node("urn:x:keep").unwrap())], &[ctx()])
            .unwrap();
        assert!(store.is_active());
        store.rollback().unwrap();

        assert!(!store.is_active());
        let all = store.match_pattern(&StatementPattern::any(), &[ctx()]).unwrap();
        assert_eq!(all, vec![stmt("urn:x:keep", "urn:x:b")]);
    }

    #[test]
    fn rollback_keeps_quads_present_before_begin() {
        let store = OxGraphStore::in_memory().unwrap();
        let kept = stmt("urn:x:keep", "urn:x:b");
        store.flush_add(&[kept.clone()], &[ctx()]).unwrap();

        store.begin().unwrap();
        // Re-adding an existing statement is not an effective write.
        store.flush_add(&[kept.clone()], &[ctx()]).unwrap();
        store
            .flush_remove(&[StatementPattern::about(named_node("urn:x:gone").unwrap())], &[ctx()])
            .unwrap();
        store.rollback().unwrap();

        assert!(store.exists(&kept.into(), &[ctx()]).unwrap());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn sessions_share_one_write_slot() {
        let a = OxGraphStore::in_memory().unwrap();
        let b = a.session();
        let s = stmt("urn:x:a", "urn:x:b");

        a.begin().unwrap();
        assert!(matches!(b.begin(), Err(StoreError::TransactionConflict)));
        assert!(matches!(
            b.flush_add(&[s.clone()], &[ctx()]),
            Err(StoreError::TransactionConflict)
        ));
        // The holder still writes.
        a.flush_add(&[s.clone()], &[ctx()]).unwrap();
        a.rollback().unwrap();

        b.flush_add(&[s.clone()], &[ctx()]).unwrap();
        assert!(a.exists(&s.into(), &[ctx()]).unwrap());
        b.begin().unwrap();
        assert!(matches!(a.begin(), Err(StoreError::TransactionConflict)));
        b.commit().unwrap();
        a.begin().unwrap();
        a.commit().unwrap();
    }

    #[test]
    fn foreign_blank_labels_fail_pattern_matches() {
        let store = OxGraphStore::in_memory().unwrap();
        let quad = Quad::new(
            oxigraph::model::BlankNode::new_unchecked("wb1"),
            named_node("urn:p:rel").unwrap(),
            named_node("urn:x:b").unwrap(),
            GraphName::NamedNode(ctx()),
        );
        store.store().insert(&quad).unwrap();

        let err = store
            .match_pattern(&StatementPattern::any(), &[ctx()])
            .unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedTerm { .. }));
    }

    #[test]
    fn nested_begin_is_rejected() {
        let store = OxGraphStore::in_memory().unwrap();
        store.begin().unwrap();
        assert!(matches!(store.begin(), Err(StoreError::NestedTransaction)));
        store.commit().unwrap();
        assert!(matches!(store.commit(), Err(StoreError::NoTransaction)));
    }

    #[test]
    fn exists_checks_every_context() {
        let store = OxGraphStore::in_memory().unwrap();
        let other = named_node("urn:ctx:two").unwrap();
        store.flush_add(&[stmt("urn:x:a", "urn:x:b")], &[other.clone()]).unwrap();

        let pattern = StatementPattern::referencing(named_node("urn:x:b").unwrap());
        assert!(!store.exists(&pattern, &[ctx()]).unwrap());
        assert!(store.exists(&pattern, &[ctx(), other]).unwrap());
    }

    #[test]
    fn ask_query() {
        let store = OxGraphStore::in_memory().unwrap();
        store.flush_add(&[stmt("urn:x:a", "urn:x:b")], &[]).unwrap();
        assert!(store.ask("ASK { <urn:x:a> ?p ?o }").unwrap());
        assert!(!store.ask("ASK { <urn:x:zzz> ?p ?o }").unwrap());
    }
}
