//! Persistence tests for graph-warden.
//!
//! These tests verify that ownership, authorizations and blank-node ids
//! written through the secure API survive closing and reopening an on-disk
//! oxigraph store.

use std::sync::Arc;

use graph_warden::acl::{AccessMode, ModeSet, SecureGraph};
use graph_warden::config::{SecurityConfig, Settings};
use graph_warden::error::AccessError;
use graph_warden::model::{BlankId, Statement, StatementPattern, named_node};
use graph_warden::store::{GraphStore, OxGraphStore};
use oxigraph::model::NamedNode;

fn n(iri: &str) -> NamedNode {
    named_node(iri).unwrap()
}

fn open(dir: &std::path::Path) -> (Arc<OxGraphStore>, SecureGraph) {
    let store = Arc::new(OxGraphStore::open(dir).unwrap());
    let graph = SecureGraph::new(store.clone(), Settings::default());
    (store, graph)
}

#[test]
fn ownership_and_grants_survive_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let ctx = n("urn:model:notes");
    let owner = n("urn:user:olga");
    let editor = n("urn:user:pat");

    // First session: register and grant.
    {
        let (_store, graph) = open(dir.path());
        assert!(graph.register_context(&ctx, &owner).unwrap());
        let modes: ModeSet = [AccessMode::WriteRestricted].into_iter().collect();
        let meta = graph.settings().metadata_context.clone();
        graph.grant(&ctx, &editor, &modes, &meta, &owner).unwrap();
    }

    // Second session: the same decisions come back.
    {
        let (_store, graph) = open(dir.path());
        assert_eq!(
            graph.gate().write_mode_for(&ctx, &owner).unwrap(),
            Some(AccessMode::Control)
        );
        assert_eq!(
            graph.gate().write_mode_for(&ctx, &editor).unwrap(),
            Some(AccessMode::WriteRestricted)
        );
        assert!(!graph.register_context(&ctx, &editor).unwrap());
    }
}

#[test]
fn blank_nodes_keep_their_identity_across_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let ctx = n("urn:model:notes");
    let owner = n("urn:user:olga");
    let editor = n("urn:user:pat");
    let anchor = n("urn:res:agenda");
    let item = BlankId::fresh();

    {
        let (_store, graph) = open(dir.path());
        graph.register_context(&ctx, &owner).unwrap();
        let meta = graph.settings().metadata_context.clone();
        let restricted: ModeSet = [AccessMode::WriteRestricted].into_iter().collect();
        graph.grant(&ctx, &editor, &restricted, &meta, &owner).unwrap();
        let write: ModeSet = [AccessMode::Write].into_iter().collect();
        graph
            .grant(&anchor, &editor, &write, &ctx, &owner)
            .unwrap();

        graph.begin().unwrap();
        graph
            .request_add(
                &[
                    Statement::new(anchor.clone(), n("urn:p:item"), item),
                    Statement::new(item, n("urn:p:title"), "kickoff"),
                ],
                &[],
                &[ctx.clone()],
                &editor,
            )
            .unwrap();
        graph.commit().unwrap();
    }

    {
        let (store, graph) = open(dir.path());
        assert!(store
            .exists(&StatementPattern::about(item), &[ctx.clone()])
            .unwrap());

        // Editing the reopened blank node still resolves through its anchor.
        let edit = Statement::new(item, n("urn:p:title"), "kick-off");
        graph
            .request_add(&[edit.clone()], &[], &[ctx.clone()], &editor)
            .unwrap();
        assert!(store.exists(&edit.into(), &[ctx.clone()]).unwrap());

        // Nobody else may touch it.
        graph
            .grant(
                &ctx,
                &n("urn:user:mallory"),
                &[AccessMode::WriteRestricted].into_iter().collect(),
                &graph.settings().metadata_context.clone(),
                &owner,
            )
            .unwrap();
        let err = graph
            .request_remove(
                &[StatementPattern::about(item)],
                &[ctx.clone()],
                &n("urn:user:mallory"),
            )
            .unwrap_err();
        assert!(matches!(err, AccessError::AuthorizationDenied { .. }));
    }
}

#[test]
fn rolled_back_transaction_is_not_persisted() {
    let dir = tempfile::TempDir::new().unwrap();
    let ctx = n("urn:model:notes");
    let owner = n("urn:user:olga");
    let stmt = Statement::new(n("urn:res:draft"), n("urn:p:title"), "draft");

    {
        let (_store, graph) = open(dir.path());
        graph.register_context(&ctx, &owner).unwrap();
        graph.begin().unwrap();
        graph
            .request_add(&[stmt.clone()], &[], &[ctx.clone()], &owner)
            .unwrap();
        graph.rollback().unwrap();
    }

    {
        let (store, _graph) = open(dir.path());
        assert!(!store.exists(&stmt.into(), &[ctx]).unwrap());
    }
}

#[test]
fn custom_config_is_honoured_after_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let config_path = dir.path().join("security.toml");
    std::fs::write(
        &config_path,
        r#"
        metadata_context = "http://example.org/meta"
        system_agent = "http://example.org/users/root"
        "#,
    )
    .unwrap();
    let settings = SecurityConfig::load(&config_path).unwrap().validate().unwrap();
    let store_dir = dir.path().join("store");
    let ctx = n("http://example.org/models/m1");

    {
        let store = Arc::new(OxGraphStore::open(&store_dir).unwrap());
        let graph = SecureGraph::new(store, settings.clone());
        let read: ModeSet = [AccessMode::Read].into_iter().collect();
        graph
            .grant(
                &ctx,
                &n("http://example.org/users/ann"),
                &read,
                &settings.metadata_context,
                &settings.system_agent,
            )
            .unwrap();
    }

    {
        let store = Arc::new(OxGraphStore::open(&store_dir).unwrap());
        let graph = SecureGraph::new(store.clone(), settings.clone());
        assert!(graph
            .gate()
            .is_readable(&ctx, &n("http://example.org/users/ann"))
            .unwrap());
        // Under the default settings the grant lives in an unrelated context.
        let defaults = SecureGraph::new(Arc::new(store.session()), Settings::default());
        assert!(!defaults
            .gate()
            .is_readable(&ctx, &n("http://example.org/users/ann"))
            .unwrap());
    }
}
