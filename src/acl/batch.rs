//! Batch resolver: deferred write authorization for one agent and context set.
//!
//! Operations are classified as they are pulled from the work list. An
//! operation whose subject already has a `Modify` decision is ready and gets
//! flushed to the store in runs of the same kind. An operation on an
//! undecided blank subject is parked in the blocked map until some other
//! operation, or a backward search through the store, decides that blank node.
//!
//! [`Batch::execute`] drains the work list, then repeatedly resolves the
//! blocked resources that no other blocked operation introduces ("roots"),
//! cascading each `Modify` decision down to the blank nodes it introduces.
//!
//! ```text
//!   named n ──p──▶ _:b1 ──q──▶ _:b2 ──r──▶ _:b3
//!   Modify(n) ⇒ Modify(b1) ⇒ Modify(b2) ⇒ Modify(b3)
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use crate::config::Settings;
use crate::error::{AccessError, AccessResult};
use crate::model::{Agent, BlankId, Context, Resource, Statement, StatementPattern, Value};
use crate::store::GraphStore;
use crate::vocab::acl;

use super::mode::{AccessMode, WriteDecision};
use super::oracle::PolicyOracle;

/// What an operation does to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Add(Statement),
    Remove(StatementPattern),
}

/// A pending mutation together with its resolved write decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    mutation: Mutation,
    decision: WriteDecision,
}

impl Operation {
    pub fn add(statement: Statement) -> Self {
        Self {
            mutation: Mutation::Add(statement),
            decision: WriteDecision::Undetermined,
        }
    }

    pub fn remove(pattern: StatementPattern) -> Self {
        Self {
            mutation: Mutation::Remove(pattern),
            decision: WriteDecision::Undetermined,
        }
    }

    pub fn is_add(&self) -> bool {
        matches!(self.mutation, Mutation::Add(_))
    }

    pub fn mutation(&self) -> &Mutation {
        &self.mutation
    }

    pub fn decision(&self) -> WriteDecision {
        self.decision
    }

    pub fn subject(&self) -> Option<&Resource> {
        match &self.mutation {
            Mutation::Add(stmt) => Some(&stmt.subject),
            Mutation::Remove(pattern) => pattern.subject.as_ref(),
        }
    }

    pub fn predicate(&self) -> Option<&oxigraph::model::NamedNode> {
        match &self.mutation {
            Mutation::Add(stmt) => Some(&stmt.predicate),
            Mutation::Remove(pattern) => pattern.predicate.as_ref(),
        }
    }

    pub fn object(&self) -> Option<&Value> {
        match &self.mutation {
            Mutation::Add(stmt) => Some(&stmt.object),
            Mutation::Remove(pattern) => pattern.object.as_ref(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.mutation {
            Mutation::Add(stmt) => write!(f, "add {stmt}"),
            Mutation::Remove(pattern) => write!(f, "remove {pattern}"),
        }
    }
}

/// Ready operations of one kind, waiting to be written.
#[derive(Debug, Default)]
enum Run {
    #[default]
    Empty,
    Adds(Vec<Statement>),
    Removes(Vec<StatementPattern>),
}

/// All pending mutations of one agent against one context set.
///
/// The agent is fixed at construction. Decisions are cached for the lifetime
/// of the batch, so every resource is resolved at most once.
pub struct Batch {
    agent: Agent,
    contexts: Vec<Context>,
    store: Arc<dyn GraphStore>,
    oracle: Arc<dyn PolicyOracle>,
    settings: Arc<Settings>,
    /// Submitted, not yet classified.
    pending: VecDeque<Operation>,
    /// Unlocked from the blocked map, already decided.
    checked: VecDeque<Operation>,
    blocked: HashMap<BlankId, Vec<Operation>>,
    decisions: HashMap<Resource, WriteDecision>,
    /// Whether the agent may manage authorizations targeting a resource.
    controls: HashMap<Resource, bool>,
    run: Run,
}

impl Batch {
    pub fn new(
        agent: Agent,
        contexts: &[Context],
        store: Arc<dyn GraphStore>,
        oracle: Arc<dyn PolicyOracle>,
        settings: Arc<Settings>,
    ) -> Self {
        let mut unique = Vec::with_capacity(contexts.len());
        for ctx in contexts {
            if !unique.contains(ctx) {
                unique.push(ctx.clone());
            }
        }
        Self {
            agent,
            contexts: unique,
            store,
            oracle,
            settings,
            pending: VecDeque::new(),
            checked: VecDeque::new(),
            blocked: HashMap::new(),
            decisions: HashMap::new(),
            controls: HashMap::new(),
            run: Run::Empty,
        }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn contexts(&self) -> &[Context] {
        &self.contexts
    }

    /// Whether this batch serves `agent` writing to exactly `contexts`,
    /// ignoring order and duplicates.
    pub fn serves(&self, agent: &Agent, contexts: &[Context]) -> bool {
        if self.agent != *agent {
            return false;
        }
        let ours: HashSet<&Context> = self.contexts.iter().collect();
        let theirs: HashSet<&Context> = contexts.iter().collect();
        ours == theirs
    }

    pub fn submit(&mut self, op: Operation) {
        self.pending.push_back(op);
    }

    pub fn submit_add(&mut self, statements: impl IntoIterator<Item = Statement>) {
        self.pending
            .extend(statements.into_iter().map(Operation::add));
    }

    pub fn submit_remove(&mut self, patterns: impl IntoIterator<Item = StatementPattern>) {
        self.pending
            .extend(patterns.into_iter().map(Operation::remove));
    }

    /// The cached decision for `resource`, if one has been reached.
    pub fn decision(&self, resource: &Resource) -> Option<WriteDecision> {
        self.decisions.get(resource).copied()
    }

    /// Number of operations waiting for a blank subject to be decided.
    pub fn blocked_len(&self) -> usize {
        self.blocked.values().map(Vec::len).sum()
    }

    /// Whether every submitted operation has been written or discarded.
    pub fn is_settled(&self) -> bool {
        self.pending.is_empty() && self.checked.is_empty() && self.blocked.is_empty()
    }

    /// Resolve and flush everything submitted so far.
    ///
    /// On error the batch is left partially flushed; the enclosing store
    /// transaction must be rolled back.
    pub fn execute(&mut self) -> AccessResult<()> {
        self.flush_ready()?;
        while !self.blocked.is_empty() {
            let before = self.blocked_len();
            for root in self.roots() {
                let resource = Resource::Blank(root);
                let mut decision = self.write_mode_of(&resource)?;
                if decision == WriteDecision::Undetermined {
                    decision = self.write_mode_from_chain(&resource)?;
                }
                if decision.is_modify() {
                    self.unlock(root);
                    continue;
                }

                let ops = self.blocked.remove(&root).unwrap_or_default();
                let only_removes = ops.iter().all(|op| !op.is_add());
                if only_removes
                    && !self
                        .store
                        .exists(&StatementPattern::about(root), &self.contexts)?
                {
                    tracing::debug!(
                        resource = %resource,
                        discarded = ops.len(),
                        "no statements about blank node, removals discarded"
                    );
                    continue;
                }
                tracing::warn!(
                    agent = %self.agent,
                    resource = %resource,
                    operations = ops.len(),
                    "write access denied"
                );
                return Err(AccessError::AuthorizationDenied {
                    resource: resource.to_string(),
                });
            }
            self.flush_ready()?;

            let after = self.blocked_len();
            if after > 0 && after >= before {
                return Err(AccessError::BatchIntegrity { remaining: after });
            }
        }
        Ok(())
    }

    /// Blocked blank nodes that no other blocked operation introduces.
    ///
    /// Falls back to every blocked node when they all introduce each other.
    fn roots(&self) -> Vec<BlankId> {
        let mut roots: HashSet<BlankId> = self.blocked.keys().copied().collect();
        for (subject, ops) in &self.blocked {
            for op in ops {
                match op.object().and_then(Value::as_blank) {
                    Some(object) if object != *subject => {
                        roots.remove(&object);
                    }
                    _ => {}
                }
            }
        }
        let mut roots: Vec<BlankId> = if roots.is_empty() {
            self.blocked.keys().copied().collect()
        } else {
            roots.into_iter().collect()
        };
        roots.sort_unstable();
        roots
    }

    // -----------------------------------------------------------------------
    // Work list
    // -----------------------------------------------------------------------

    fn flush_ready(&mut self) -> AccessResult<()> {
        while let Some(op) = self.next_ready()? {
            self.stage(op)?;
        }
        self.flush_run()
    }

    fn stage(&mut self, op: Operation) -> AccessResult<()> {
        match op.mutation {
            Mutation::Add(stmt) => {
                if !matches!(self.run, Run::Adds(_)) {
                    self.flush_run()?;
                    self.run = Run::Adds(Vec::new());
                }
                if let Run::Adds(stmts) = &mut self.run {
                    stmts.push(stmt);
                }
            }
            Mutation::Remove(pattern) => {
                if !matches!(self.run, Run::Removes(_)) {
                    self.flush_run()?;
                    self.run = Run::Removes(Vec::new());
                }
                if let Run::Removes(patterns) = &mut self.run {
                    patterns.push(pattern);
                }
            }
        }
        Ok(())
    }

    /// Write the staged run, so that later store reads observe it.
    fn flush_run(&mut self) -> AccessResult<()> {
        match std::mem::take(&mut self.run) {
            Run::Empty => {}
            Run::Adds(stmts) => {
                tracing::debug!(count = stmts.len(), "flushing additions");
                self.store.flush_add(&stmts, &self.contexts)?;
            }
            Run::Removes(patterns) => {
                tracing::debug!(count = patterns.len(), "flushing removals");
                self.store.flush_remove(&patterns, &self.contexts)?;
            }
        }
        Ok(())
    }

    /// The next operation that may be written, or `None` when only blocked
    /// operations are left.
    fn next_ready(&mut self) -> AccessResult<Option<Operation>> {
        loop {
            let op = match self.checked.pop_front() {
                Some(op) => op,
                None => {
                    let Some(mut op) = self.pending.pop_front() else {
                        return Ok(None);
                    };
                    if Self::needs_expansion(&op) {
                        self.expand(&op)?;
                        continue;
                    }
                    op.decision = self.classify(&op)?;
                    if !op.decision.is_modify() {
                        self.block(op)?;
                        continue;
                    }
                    op
                }
            };
            self.propagate(&op)?;
            return Ok(Some(op));
        }
    }

    /// Removals with an unbound subject, or an unbound target of an
    /// `acl:accessTo` entry, are authorized statement by statement.
    fn needs_expansion(op: &Operation) -> bool {
        let Mutation::Remove(pattern) = &op.mutation else {
            return false;
        };
        pattern.subject.is_none()
            || (pattern.object.is_none()
                && pattern.predicate.as_ref().is_some_and(|p| *p == acl::ACCESS_TO))
    }

    fn expand(&mut self, op: &Operation) -> AccessResult<()> {
        let Mutation::Remove(pattern) = &op.mutation else {
            return Ok(());
        };
        self.flush_run()?;
        let matches = self.store.match_pattern(pattern, &self.contexts)?;
        tracing::debug!(pattern = %pattern, matches = matches.len(), "expanded removal");
        for stmt in matches.into_iter().rev() {
            self.pending.push_front(Operation::remove(stmt.into()));
        }
        Ok(())
    }

    fn block(&mut self, op: Operation) -> AccessResult<()> {
        match op.subject() {
            Some(Resource::Blank(id)) => {
                let id = *id;
                tracing::debug!(subject = %id, op = %op, "operation blocked");
                self.blocked.entry(id).or_default().push(op);
                Ok(())
            }
            subject => {
                let resource = subject.map_or_else(|| "?".to_string(), ToString::to_string);
                tracing::warn!(
                    agent = %self.agent,
                    resource = %resource,
                    op = %op,
                    "modification denied"
                );
                Err(AccessError::AuthorizationDenied { resource })
            }
        }
    }

    /// A ready operation grants `Modify` to the blank nodes it introduces.
    fn propagate(&mut self, op: &Operation) -> AccessResult<()> {
        match op.object() {
            Some(object) => {
                if let Some(id) = object.as_blank() {
                    self.unlock(id);
                }
            }
            None => {
                let Mutation::Remove(pattern) = &op.mutation else {
                    return Ok(());
                };
                self.flush_run()?;
                for stmt in self.store.match_pattern(pattern, &self.contexts)? {
                    if let Some(id) = stmt.object.as_blank() {
                        self.unlock(id);
                    }
                }
            }
        }
        Ok(())
    }

    fn unlock(&mut self, id: BlankId) {
        self.decisions
            .insert(Resource::Blank(id), WriteDecision::Modify);
        if let Some(ops) = self.blocked.remove(&id) {
            tracing::debug!(subject = %id, count = ops.len(), "operations unlocked");
            for mut op in ops {
                op.decision = WriteDecision::Modify;
                self.checked.push_back(op);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Classification
    // -----------------------------------------------------------------------

    fn classify(&mut self, op: &Operation) -> AccessResult<WriteDecision> {
        if let Mutation::Add(stmt) = &op.mutation {
            self.check_introduced_blank(&stmt.object)?;
            if stmt.predicate == acl::ACCESS_TO_CLASS {
                return Err(self.acl_denied(
                    Some(&stmt.object),
                    "authorizations for classes of resources cannot be added",
                ));
            }
        }

        if op.predicate().is_some_and(|p| *p == acl::ACCESS_TO) {
            let permitted = match op.object() {
                Some(Value::Resource(target)) => self.controls(target)?,
                _ => false,
            };
            if !permitted {
                return Err(self.acl_denied(op.object(), "agent does not control the target"));
            }
            if let Some(Resource::Blank(id)) = op.subject() {
                let referenced = self
                    .store
                    .exists(&StatementPattern::referencing(*id), &self.contexts)?;
                if !referenced {
                    self.decisions
                        .insert(Resource::Blank(*id), WriteDecision::Modify);
                    return Ok(WriteDecision::Modify);
                }
            }
        }

        let Some(subject) = op.subject() else {
            return Ok(WriteDecision::Undetermined);
        };
        if let (true, Resource::Blank(id)) = (op.is_add(), subject) {
            if !self.decisions.contains_key(subject) && self.is_fresh(*id)? {
                tracing::debug!(subject = %id, "fresh blank subject");
                self.decisions.insert(subject.clone(), WriteDecision::Modify);
            }
        }
        let decision = self.write_mode_of(subject)?;
        tracing::debug!(op = %op, decision = %decision, "classified operation");
        Ok(decision)
    }

    /// An added blank object must either be unreferenced, or reachable from
    /// a resource the agent may modify.
    fn check_introduced_blank(&mut self, object: &Value) -> AccessResult<()> {
        let Some(id) = object.as_blank() else {
            return Ok(());
        };
        let resource = Resource::Blank(id);
        if self.decisions.contains_key(&resource) {
            return Ok(());
        }
        let referenced = self
            .store
            .exists(&StatementPattern::referencing(id), &self.contexts)?;
        if !referenced {
            tracing::debug!(object = %id, "unreferenced blank object");
            self.decisions.insert(resource, WriteDecision::Modify);
            return Ok(());
        }
        if self.write_mode_from_chain(&resource)?.is_modify() {
            return Ok(());
        }
        tracing::warn!(agent = %self.agent, resource = %resource, "blank node reference denied");
        Err(AccessError::AuthorizationDenied {
            resource: resource.to_string(),
        })
    }

    /// A blank node with no statements about it and none pointing at it.
    fn is_fresh(&self, id: BlankId) -> AccessResult<bool> {
        let about = self
            .store
            .exists(&StatementPattern::about(id), &self.contexts)?;
        if about {
            return Ok(false);
        }
        let referenced = self
            .store
            .exists(&StatementPattern::referencing(id), &self.contexts)?;
        Ok(!referenced)
    }

    /// The agent itself, or a resource it holds `Control` on.
    fn controls(&mut self, target: &Resource) -> AccessResult<bool> {
        if target.as_named() == Some(&self.agent) || self.settings.is_system(&self.agent) {
            return Ok(true);
        }
        if let Some(known) = self.controls.get(target) {
            return Ok(*known);
        }
        let control =
            self.oracle
                .has_mode(target, &self.agent, AccessMode::Control, &self.contexts)?;
        self.controls.insert(target.clone(), control);
        Ok(control)
    }

    fn acl_denied(&self, target: Option<&Value>, reason: &str) -> AccessError {
        let target = target.map_or_else(|| "?".to_string(), ToString::to_string);
        tracing::warn!(agent = %self.agent, target = %target, reason, "acl modification denied");
        AccessError::AclModificationDenied {
            target,
            reason: reason.to_string(),
        }
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    /// Decision for a single resource, without following any chain.
    ///
    /// Uncached blank nodes stay `Undetermined`.
    pub fn write_mode_of(&mut self, resource: &Resource) -> AccessResult<WriteDecision> {
        if let Some(decision) = self.decisions.get(resource) {
            return Ok(*decision);
        }
        let Resource::Named(iri) = resource else {
            return Ok(WriteDecision::Undetermined);
        };
        let decision = if self.settings.is_system(&self.agent) || *iri == self.agent {
            WriteDecision::Modify
        } else {
            self.oracle
                .modes_for(resource, &self.agent, &self.contexts)?
                .write_decision()
        };
        tracing::debug!(resource = %resource, decision = %decision, "resolved write mode");
        self.decisions.insert(resource.clone(), decision);
        Ok(decision)
    }

    /// Backward breadth-first search from `resource` along the statements
    /// pointing at it.
    ///
    /// The first decided referrer settles every node visited on the way. An
    /// exhausted search marks them all `Denied`.
    pub fn write_mode_from_chain(&mut self, resource: &Resource) -> AccessResult<WriteDecision> {
        let mut seen: HashSet<Resource> = HashSet::from([resource.clone()]);
        let mut visited = vec![resource.clone()];
        let mut queue = VecDeque::from([resource.clone()]);

        while let Some(current) = queue.pop_front() {
            let referrers = self
                .store
                .match_pattern(&StatementPattern::referencing(current), &self.contexts)?;
            for stmt in referrers {
                let subject = stmt.subject;
                let found = match &subject {
                    Resource::Named(_) => Some(self.write_mode_of(&subject)?),
                    Resource::Blank(_) => self.decision(&subject),
                };
                match found {
                    Some(decision) => {
                        tracing::debug!(
                            resource = %resource,
                            via = %subject,
                            decision = %decision,
                            visited = visited.len(),
                            "chain resolved"
                        );
                        for node in visited {
                            self.decisions.insert(node, decision);
                        }
                        return Ok(decision);
                    }
                    None => {
                        if seen.insert(subject.clone()) {
                            visited.push(subject.clone());
                            queue.push_back(subject);
                        }
                    }
                }
            }
        }

        tracing::debug!(resource = %resource, visited = visited.len(), "chain exhausted");
        for node in visited {
            self.decisions.insert(node, WriteDecision::Denied);
        }
        Ok(WriteDecision::Denied)
    }
}

impl fmt::Debug for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field("agent", &self.agent)
            .field("contexts", &self.contexts)
            .field("pending", &self.pending.len())
            .field("blocked", &self.blocked_len())
            .field("decisions", &self.decisions.len())
            .finish()
    }
}
