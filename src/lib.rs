// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # graph-warden
//!
//! ACL-aware mutation authorization for RDF graph stores.
//!
//! ## Architecture
//!
//! - **Policy oracle** (`acl::oracle`): access modes from ownership and WebACL
//!   authorizations, with class and group inheritance
//! - **Context gate** (`acl::gate`): per-call check of the target contexts
//! - **Batch resolver** (`acl::batch`): deferred authorization of blank-node
//!   subgraphs by backward chaining to a writable named resource
//! - **Secure graph** (`acl::secure`): the mutation API, bound to the store's
//!   begin/commit/rollback lifecycle
//! - **Graph store** (`store`): oxigraph-backed storage with an undo journal
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use graph_warden::acl::SecureGraph;
//! use graph_warden::config::Settings;
//! use graph_warden::model::{Resource, Statement, named_node};
//! use graph_warden::store::OxGraphStore;
//!
//! let store = Arc::new(OxGraphStore::in_memory().unwrap());
//! let graph = SecureGraph::new(store, Settings::default());
//! let alice = named_node("urn:user:alice").unwrap();
//! let model = named_node("urn:model:notes").unwrap();
//! graph.register_context(&model, &alice).unwrap();
//!
//! let note = Statement::new(
//!     Resource::fresh_blank(),
//!     named_node("http://www.w3.org/2000/01/rdf-schema#label").unwrap(),
//!     "first note",
//! );
//! graph.begin().unwrap();
//! graph.request_add(&[note], &[], &[model], &alice).unwrap();
//! graph.commit().unwrap();
//! ```

pub mod acl;
pub mod config;
pub mod error;
pub mod model;
pub mod store;
pub mod vocab;
