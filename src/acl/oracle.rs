//! Policy oracle: access modes an agent holds on a resource.
//!
//! Modes come from two sources, both read from the store:
//!
//! - ownership: `target acl:owner agent` grants `Control`
//! - authorization entries: `acl:accessTo target` or `acl:accessToClass` of
//!   one of the target's (transitive) classes, granted through `acl:agent`
//!   (directly or via `foaf:member*` group membership) or `acl:agentClass`
//!   (one of the agent's transitive classes)
//!
//! The system agent holds every mode without a query.

use std::sync::Arc;

use crate::config::Settings;
use crate::error::AccessResult;
use crate::model::{Agent, Context, Resource, Value};
use crate::store::GraphStore;
use crate::vocab::{acl, foaf};

use super::mode::{AccessMode, ModeSet};

/// Evaluates the access modes granted to an agent.
pub trait PolicyOracle: Send + Sync {
    /// All modes `agent` holds on `resource`, according to the entries in
    /// `contexts`. No matching entry yields the empty set.
    fn modes_for(
        &self,
        resource: &Resource,
        agent: &Agent,
        contexts: &[Context],
    ) -> AccessResult<ModeSet>;

    /// Whether `agent` holds `mode` on `resource`.
    fn has_mode(
        &self,
        resource: &Resource,
        agent: &Agent,
        mode: AccessMode,
        contexts: &[Context],
    ) -> AccessResult<bool> {
        Ok(self.modes_for(resource, agent, contexts)?.contains(mode))
    }

    /// Whether `agent` is `group` or a transitive `foaf:member` of it.
    fn is_member_of(&self, agent: &Agent, group: &Agent, contexts: &[Context])
    -> AccessResult<bool>;
}

/// SPARQL-backed oracle over a [`GraphStore`].
pub struct StorePolicyOracle {
    store: Arc<dyn GraphStore>,
    settings: Arc<Settings>,
}

impl StorePolicyOracle {
    pub fn new(store: Arc<dyn GraphStore>, settings: Arc<Settings>) -> Self {
        Self { store, settings }
    }

    fn dataset(contexts: &[Context]) -> String {
        contexts.iter().map(|c| format!("FROM {c}\n")).collect()
    }

    fn prefixes() -> String {
        format!(
            "PREFIX acl: <{}>\n\
             PREFIX foaf: <{}>\n\
             PREFIX rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#>\n\
             PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#>\n",
            acl::NAMESPACE,
            foaf::NAMESPACE,
        )
    }

    fn modes_query(target: &str, agent: &Agent, contexts: &[Context]) -> String {
        format!(
            "{prefixes}SELECT DISTINCT ?mode\n{dataset}WHERE {{\n  \
               {{ {target} acl:owner {agent} . BIND (acl:Control AS ?mode) }}\n  \
               UNION\n  {{\n    \
                 {{ ?acl acl:accessTo {target} }}\n    \
                 UNION\n    \
                 {{ {target} rdf:type/rdfs:subClassOf* ?class . ?acl acl:accessToClass ?class }}\n    \
                 {{ ?acl acl:agent ?grantee . ?grantee foaf:member* {agent} }}\n    \
                 UNION\n    \
                 {{ {agent} rdf:type/rdfs:subClassOf* ?agentClass . ?acl acl:agentClass ?agentClass }}\n    \
                 ?acl acl:mode ?mode .\n  \
               }}\n}}",
            prefixes = Self::prefixes(),
            dataset = Self::dataset(contexts),
        )
    }
}

impl PolicyOracle for StorePolicyOracle {
    fn modes_for(
        &self,
        resource: &Resource,
        agent: &Agent,
        contexts: &[Context],
    ) -> AccessResult<ModeSet> {
        if self.settings.is_system(agent) {
            return Ok(ModeSet::universal());
        }
        // Blank nodes cannot be named in a query; they carry no entries of
        // their own and are resolved through the chain of their referrers.
        let Resource::Named(target) = resource else {
            return Ok(ModeSet::new());
        };

        let query = Self::modes_query(&target.to_string(), agent, contexts);
        let rows = self.store.select(&query)?;
        let modes: ModeSet = rows
            .iter()
            .filter_map(|row| match row.get("mode") {
                Some(Value::Resource(Resource::Named(iri))) => AccessMode::from_iri(iri),
                _ => None,
            })
            .collect();

        tracing::debug!(
            resource = %target,
            agent = %agent,
            modes = %modes,
            "evaluated acl modes"
        );
        Ok(modes)
    }

    fn is_member_of(
        &self,
        agent: &Agent,
        group: &Agent,
        contexts: &[Context],
    ) -> AccessResult<bool> {
        let query = format!(
            "{prefixes}ASK\n{dataset}WHERE {{ {group} foaf:member* {agent} }}",
            prefixes = Self::prefixes(),
            dataset = Self::dataset(contexts),
        );
        Ok(self.store.ask(&query)?)
    }
}

impl std::fmt::Debug for StorePolicyOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorePolicyOracle")
            .field("system_agent", &self.settings.system_agent)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BlankId, Statement, named_node};
    use crate::store::OxGraphStore;
    use crate::vocab::rdf;

    struct Fixture {
        store: Arc<OxGraphStore>,
        oracle: StorePolicyOracle,
        ctx: Context,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(OxGraphStore::in_memory().unwrap());
        let oracle = StorePolicyOracle::new(store.clone(), Arc::new(Settings::default()));
        Fixture {
            store,
            oracle,
            ctx: named_node("urn:ctx:acl").unwrap(),
        }
    }

    fn n(iri: &str) -> oxigraph::model::NamedNode {
        named_node(iri).unwrap()
    }

    impl Fixture {
        fn add(&self, stmts: &[Statement]) {
            self.store.flush_add(stmts, &[self.ctx.clone()]).unwrap();
        }

        fn grant(&self, grantee: &str, target_pred: oxigraph::model::NamedNodeRef, target: &str, mode: AccessMode) {
            let auth = BlankId::fresh();
            self.add(&[
                Statement::new(auth, target_pred.into_owned(), n(target)),
                Statement::new(auth, acl::AGENT.into_owned(), n(grantee)),
                Statement::new(auth, acl::MODE.into_owned(), mode.iri().into_owned()),
            ]);
        }

        fn modes(&self, target: &str, agent: &str) -> ModeSet {
            self.oracle
                .modes_for(&Resource::Named(n(target)), &n(agent), &[self.ctx.clone()])
                .unwrap()
        }
    }

    #[test]
    fn no_entries_yield_empty_set() {
        let f = fixture();
        assert!(f.modes("urn:r:x", "urn:u:alice").is_empty());
    }

    #[test]
    fn owner_gets_control() {
        let f = fixture();
        f.add(&[Statement::new(n("urn:r:x"), acl::OWNER.into_owned(), n("urn:u:alice"))]);
        assert!(f.modes("urn:r:x", "urn:u:alice").contains(AccessMode::Control));
        assert!(f.modes("urn:r:x", "urn:u:bob").is_empty());
    }

    #[test]
    fn direct_grant_is_found() {
        let f = fixture();
        f.grant("urn:u:alice", acl::ACCESS_TO, "urn:r:x", AccessMode::Write);
        f.grant("urn:u:alice", acl::ACCESS_TO, "urn:r:x", AccessMode::Read);
        let modes = f.modes("urn:r:x", "urn:u:alice");
        assert_eq!(modes.len(), 2);
        assert!(modes.contains(AccessMode::Write));
    }

    #[test]
    fn group_membership_is_transitive() {
        let f = fixture();
        f.grant("urn:g:staff", acl::ACCESS_TO, "urn:r:x", AccessMode::Append);
        f.add(&[
            Statement::new(n("urn:g:staff"), foaf::MEMBER.into_owned(), n("urn:g:team")),
            Statement::new(n("urn:g:team"), foaf::MEMBER.into_owned(), n("urn:u:carl")),
        ]);
        assert!(f.modes("urn:r:x", "urn:u:carl").contains(AccessMode::Append));
        assert!(f
            .oracle
            .is_member_of(&n("urn:u:carl"), &n("urn:g:staff"), &[f.ctx.clone()])
            .unwrap());
    }

    #[test]
    fn class_grant_applies_to_instances() {
        let f = fixture();
        f.grant("urn:u:carl", acl::ACCESS_TO_CLASS, "urn:c:Restriction", AccessMode::Write);
        f.add(&[Statement::new(n("urn:r:restr"), rdf::TYPE.into_owned(), n("urn:c:Restriction"))]);
        assert!(f.modes("urn:r:restr", "urn:u:carl").contains(AccessMode::Write));
        assert!(f.modes("urn:r:other", "urn:u:carl").is_empty());
    }

    #[test]
    fn system_agent_holds_everything() {
        let f = fixture();
        let system = Settings::default().system_agent;
        let modes = f
            .oracle
            .modes_for(&Resource::Named(n("urn:r:x")), &system, &[f.ctx.clone()])
            .unwrap();
        assert_eq!(modes, ModeSet::universal());
    }

    #[test]
    fn has_mode_probes_single_mode() {
        let f = fixture();
        f.grant("urn:u:alice", acl::ACCESS_TO, "urn:r:x", AccessMode::Read);
        let target = Resource::Named(n("urn:r:x"));
        let alice = n("urn:u:alice");
        let ctx = [f.ctx.clone()];
        assert!(f.oracle.has_mode(&target, &alice, AccessMode::Read, &ctx).unwrap());
        assert!(!f.oracle.has_mode(&target, &alice, AccessMode::Control, &ctx).unwrap());
    }
}
