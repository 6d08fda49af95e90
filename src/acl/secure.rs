//! Secure graph: the mutation API and its transaction coordinator.
//!
//! Every call names the acting agent explicitly. The context gate decides the
//! write path:
//!
//! - unrestricted: statements go straight to the store
//! - restricted, inside a transaction: operations join the batch for
//!   (agent, context set) and are resolved together at [`SecureGraph::commit`]
//! - restricted, outside a transaction: a one-shot batch is resolved at once
//!
//! A call outside a transaction runs inside its own store transaction, opened
//! before the gate reads any authorization.

use std::sync::{Arc, Mutex};

use crate::config::Settings;
use crate::error::AccessResult;
use crate::model::{Agent, BlankId, Context, Statement, StatementPattern};
use crate::store::GraphStore;
use crate::vocab::acl;

use super::batch::Batch;
use super::gate::{ContextGate, GateResult};
use super::mode::ModeSet;
use super::oracle::{PolicyOracle, StorePolicyOracle};

/// Access-controlled view of a [`GraphStore`].
///
/// One `SecureGraph` follows the transaction of the store handle it wraps;
/// give each session its own handle.
pub struct SecureGraph {
    store: Arc<dyn GraphStore>,
    oracle: Arc<dyn PolicyOracle>,
    gate: ContextGate,
    settings: Arc<Settings>,
    /// Batches of the active transaction, in creation order.
    batches: Mutex<Vec<Batch>>,
}

impl SecureGraph {
    /// Wrap `store`, evaluating authorizations with SPARQL over the same store.
    pub fn new(store: Arc<dyn GraphStore>, settings: Settings) -> Self {
        let settings = Arc::new(settings);
        let oracle = Arc::new(StorePolicyOracle::new(store.clone(), settings.clone()));
        Self::with_oracle(store, oracle, settings)
    }

    /// Wrap `store` with a caller-supplied policy oracle.
    pub fn with_oracle(
        store: Arc<dyn GraphStore>,
        oracle: Arc<dyn PolicyOracle>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            gate: ContextGate::new(oracle.clone(), settings.clone()),
            store,
            oracle,
            settings,
            batches: Mutex::new(Vec::new()),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn gate(&self) -> &ContextGate {
        &self.gate
    }

    pub fn oracle(&self) -> &Arc<dyn PolicyOracle> {
        &self.oracle
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Add `statements` to every context in `write_contexts` on behalf of
    /// `agent`. `read_contexts` must leave at least one readable context.
    pub fn request_add(
        &self,
        statements: &[Statement],
        read_contexts: &[Context],
        write_contexts: &[Context],
        agent: &Agent,
    ) -> AccessResult<()> {
        self.atomically(|| {
            let path = self.gate.authorize(
                agent,
                read_contexts,
                write_contexts,
                &ModeSet::for_additions(),
            )?;
            match path {
                GateResult::Unrestricted => {
                    self.store.flush_add(statements, write_contexts)?;
                }
                GateResult::Restricted => self.enqueue(agent, write_contexts, |batch| {
                    batch.submit_add(statements.iter().cloned())
                }),
            }
            Ok(())
        })
    }

    /// Remove everything matching `patterns` from `write_contexts` on behalf
    /// of `agent`.
    pub fn request_remove(
        &self,
        patterns: &[StatementPattern],
        write_contexts: &[Context],
        agent: &Agent,
    ) -> AccessResult<()> {
        self.atomically(|| {
            let path = self
                .gate
                .authorize(agent, &[], write_contexts, &ModeSet::for_removals())?;
            match path {
                GateResult::Unrestricted => {
                    self.store.flush_remove(patterns, write_contexts)?;
                }
                GateResult::Restricted => self.enqueue(agent, write_contexts, |batch| {
                    batch.submit_remove(patterns.iter().cloned())
                }),
            }
            Ok(())
        })
    }

    /// Add an authorization granting `modes` on `target` to `grantee`,
    /// stored in `context`. Returns the authorization node.
    pub fn grant(
        &self,
        target: &Context,
        grantee: &Agent,
        modes: &ModeSet,
        context: &Context,
        agent: &Agent,
    ) -> AccessResult<BlankId> {
        let auth = BlankId::fresh();
        let mut statements = vec![
            Statement::new(auth, acl::ACCESS_TO.into_owned(), target.clone()),
            Statement::new(auth, acl::AGENT.into_owned(), grantee.clone()),
        ];
        statements.extend(
            modes
                .iter()
                .map(|mode| Statement::new(auth, acl::MODE.into_owned(), mode.iri().into_owned())),
        );
        let contexts = std::slice::from_ref(context);
        self.request_add(&statements, contexts, contexts, agent)?;
        Ok(auth)
    }

    /// Run `f` in the active transaction, or in a one-shot transaction that
    /// resolves its batches and commits when `f` succeeds.
    fn atomically(&self, f: impl FnOnce() -> AccessResult<()>) -> AccessResult<()> {
        if self.store.is_active() {
            return f();
        }
        self.store.begin()?;
        match f() {
            Ok(()) => self.commit(),
            Err(e) => {
                self.abort();
                Err(e)
            }
        }
    }

    /// Join the batch serving (agent, contexts), opening it if needed.
    fn enqueue(&self, agent: &Agent, contexts: &[Context], submit: impl FnOnce(&mut Batch)) {
        let mut batches = self.batches.lock().expect("batch lock poisoned");
        let index = match batches.iter().position(|b| b.serves(agent, contexts)) {
            Some(index) => index,
            None => {
                tracing::debug!(agent = %agent, contexts = contexts.len(), "opened batch");
                batches.push(self.new_batch(agent, contexts));
                batches.len() - 1
            }
        };
        submit(&mut batches[index]);
    }

    fn new_batch(&self, agent: &Agent, contexts: &[Context]) -> Batch {
        Batch::new(
            agent.clone(),
            contexts,
            self.store.clone(),
            self.oracle.clone(),
            self.settings.clone(),
        )
    }

    // -----------------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------------

    pub fn begin(&self) -> AccessResult<()> {
        self.store.begin()?;
        tracing::debug!("transaction started");
        Ok(())
    }

    /// Resolve every batch of the transaction, then commit the store.
    ///
    /// The first failing batch rolls the whole transaction back.
    pub fn commit(&self) -> AccessResult<()> {
        let batches = std::mem::take(&mut *self.batches.lock().expect("batch lock poisoned"));
        let count = batches.len();
        for mut batch in batches {
            if let Err(e) = batch.execute() {
                tracing::warn!(
                    agent = %batch.agent(),
                    error = %e,
                    "batch rejected, rolling back"
                );
                self.abort();
                return Err(e);
            }
        }
        self.store.commit()?;
        tracing::info!(batches = count, "transaction committed");
        Ok(())
    }

    /// Discard every pending batch and undo the transaction's writes.
    pub fn rollback(&self) -> AccessResult<()> {
        let discarded = {
            let mut batches = self.batches.lock().expect("batch lock poisoned");
            std::mem::take(&mut *batches).len()
        };
        self.store.rollback()?;
        tracing::info!(discarded, "transaction rolled back");
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.store.is_active()
    }

    fn abort(&self) {
        self.batches.lock().expect("batch lock poisoned").clear();
        if let Err(e) = self.store.rollback() {
            tracing::warn!(error = %e, "rollback after rejected batch failed");
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn filter_readable(&self, contexts: &[Context], agent: &Agent) -> AccessResult<Vec<Context>> {
        self.gate.filter_readable(contexts, agent)
    }

    pub fn assert_readable(&self, contexts: &[Context], agent: &Agent) -> AccessResult<Vec<Context>> {
        self.gate.assert_readable(contexts, agent)
    }

    /// The contexts a read over `contexts` covers. An empty request means
    /// every readable context in the store.
    fn read_scope(&self, contexts: &[Context], agent: &Agent) -> AccessResult<Vec<Context>> {
        if contexts.is_empty() {
            let all = self.store.contexts()?;
            return self.gate.filter_readable(&all, agent);
        }
        self.gate.assert_readable(contexts, agent)
    }

    /// Statements matching `pattern` in the readable part of `contexts`.
    pub fn matching(
        &self,
        pattern: &StatementPattern,
        contexts: &[Context],
        agent: &Agent,
    ) -> AccessResult<Vec<Statement>> {
        let scope = self.read_scope(contexts, agent)?;
        if scope.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.store.match_pattern(pattern, &scope)?)
    }

    pub fn has_match(
        &self,
        pattern: &StatementPattern,
        contexts: &[Context],
        agent: &Agent,
    ) -> AccessResult<bool> {
        let scope = self.read_scope(contexts, agent)?;
        if scope.is_empty() {
            return Ok(false);
        }
        Ok(self.store.exists(pattern, &scope)?)
    }

    /// Record `agent` as owner of a newly created `context`.
    ///
    /// Returns `false` when the agent is anonymous or the system agent, or
    /// when the context already has an owner.
    pub fn register_context(&self, context: &Context, agent: &Agent) -> AccessResult<bool> {
        if self.settings.is_system(agent) || *agent == self.settings.anonymous_agent {
            return Ok(false);
        }
        let metadata = std::slice::from_ref(&self.settings.metadata_context);
        let owned = StatementPattern::about(context.clone()).with_predicate(acl::OWNER.into_owned());
        let mut registered = false;
        self.atomically(|| {
            if self.store.exists(&owned, metadata)? {
                return Ok(());
            }
            self.store.flush_add(
                &[Statement::new(context.clone(), acl::OWNER.into_owned(), agent.clone())],
                metadata,
            )?;
            registered = true;
            Ok(())
        })?;
        if registered {
            tracing::info!(context = %context, owner = %agent, "registered context");
        }
        Ok(registered)
    }
}

impl std::fmt::Debug for SecureGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let batches = self.batches.lock().expect("batch lock poisoned").len();
        f.debug_struct("SecureGraph")
            .field("metadata_context", &self.settings.metadata_context)
            .field("active", &self.store.is_active())
            .field("batches", &batches)
            .finish()
    }
}
