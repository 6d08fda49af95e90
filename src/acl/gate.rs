//! Context gate: per-call check of the target contexts.
//!
//! Writes are all-or-nothing over the context set: one refused context fails
//! the whole call. Reads are narrowed silently to the readable contexts.

use std::sync::Arc;

use crate::config::Settings;
use crate::error::{AccessError, AccessResult};
use crate::model::{Agent, Context, Resource};

use super::mode::{AccessMode, ModeSet};
use super::oracle::PolicyOracle;

/// Outcome of a successful gate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateResult {
    /// Every context grants full write access; write directly.
    Unrestricted,
    /// At least one context is write-restricted; route through a batch.
    Restricted,
}

/// Maps (agent, contexts) to a write path, and filters readable contexts.
pub struct ContextGate {
    oracle: Arc<dyn PolicyOracle>,
    settings: Arc<Settings>,
}

impl ContextGate {
    pub fn new(oracle: Arc<dyn PolicyOracle>, settings: Arc<Settings>) -> Self {
        Self { oracle, settings }
    }

    fn context_modes(&self, context: &Context, agent: &Agent) -> AccessResult<ModeSet> {
        self.oracle.modes_for(
            &Resource::Named(context.clone()),
            agent,
            std::slice::from_ref(&self.settings.metadata_context),
        )
    }

    /// The single effective write mode of `agent` on `context`.
    ///
    /// Precedence is `Control > Write > WriteRestricted > Append`. The
    /// metadata context is write-restricted for everyone but the system agent.
    pub fn write_mode_for(&self, context: &Context, agent: &Agent) -> AccessResult<Option<AccessMode>> {
        // Never plain Write for users, not even with an explicit grant: every
        // authorization added here passes the `acl:accessTo` Control check.
        if *context == self.settings.metadata_context {
            return Ok(Some(if self.settings.is_system(agent) {
                AccessMode::Control
            } else {
                AccessMode::WriteRestricted
            }));
        }
        let modes = self.context_modes(context, agent)?;
        let precedence = [
            AccessMode::Control,
            AccessMode::Write,
            AccessMode::WriteRestricted,
            AccessMode::Append,
        ];
        Ok(precedence.into_iter().find(|m| modes.contains(*m)))
    }

    /// Check `write_contexts` against `required` and pick the write path.
    ///
    /// `read_contexts`, when given, must leave at least one readable context.
    pub fn authorize(
        &self,
        agent: &Agent,
        read_contexts: &[Context],
        write_contexts: &[Context],
        required: &ModeSet,
    ) -> AccessResult<GateResult> {
        if write_contexts.is_empty() {
            return Err(AccessError::DefaultContextDenied);
        }
        self.assert_readable(read_contexts, agent)?;

        let mut restricted = false;
        for ctx in write_contexts {
            match self.write_mode_for(ctx, agent)? {
                Some(mode) if required.contains(mode) => {
                    restricted |= mode == AccessMode::WriteRestricted;
                }
                granted => {
                    tracing::warn!(
                        context = %ctx,
                        agent = %agent,
                        granted = ?granted,
                        "context access refused"
                    );
                    return Err(AccessError::ContextAccessDenied {
                        context: ctx.to_string(),
                    });
                }
            }
        }

        Ok(if restricted {
            GateResult::Restricted
        } else {
            GateResult::Unrestricted
        })
    }

    /// Whether `agent` may read `context`.
    pub fn is_readable(&self, context: &Context, agent: &Agent) -> AccessResult<bool> {
        if *context == self.settings.metadata_context {
            return Ok(true);
        }
        let modes = self.context_modes(context, agent)?;
        if [AccessMode::Read, AccessMode::WriteRestricted, AccessMode::Control]
            .into_iter()
            .any(|m| modes.contains(m))
        {
            return Ok(true);
        }
        match self.settings.audited_context(context) {
            Some(audited) => self.is_readable(&audited, agent),
            None => Ok(false),
        }
    }

    /// The readable subset of `contexts`, in input order.
    pub fn filter_readable(&self, contexts: &[Context], agent: &Agent) -> AccessResult<Vec<Context>> {
        let mut readable = Vec::with_capacity(contexts.len());
        for ctx in contexts {
            if self.is_readable(ctx, agent)? {
                readable.push(ctx.clone());
            }
        }
        Ok(readable)
    }

    /// Like [`filter_readable`](Self::filter_readable), but refuses a
    /// non-empty request that narrows to nothing.
    pub fn assert_readable(&self, contexts: &[Context], agent: &Agent) -> AccessResult<Vec<Context>> {
        let readable = self.filter_readable(contexts, agent)?;
        if readable.is_empty() && !contexts.is_empty() {
            return Err(AccessError::ReadDenied);
        }
        Ok(readable)
    }
}
