//! Rich diagnostic error types for graph-warden.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so callers know exactly
//! why a mutation was refused.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for graph-warden.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum WardenError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("oxigraph storage error: {message}")]
    #[diagnostic(
        code(warden::store::storage),
        help(
            "The underlying oxigraph store failed. Check that the data directory \
             exists, is writable, and is not opened by another process."
        )
    )]
    Storage { message: String },

    #[error("SPARQL query error: {message}")]
    #[diagnostic(
        code(warden::store::sparql),
        help(
            "The authorization query could not be evaluated. \
             This usually indicates a malformed IRI in an agent or context name."
        )
    )]
    Sparql { message: String },

    #[error("unsupported term in store: {term}")]
    #[diagnostic(
        code(warden::store::unsupported_term),
        help(
            "Only named nodes, literals and blank nodes minted by graph-warden \
             can be authorized. Reload the data through the secure mutation API."
        )
    )]
    UnsupportedTerm { term: String },

    #[error("invalid IRI: {iri}")]
    #[diagnostic(
        code(warden::store::invalid_iri),
        help("IRIs must be absolute, e.g. `http://example.org/r` or `urn:x:y`.")
    )]
    InvalidIri { iri: String },

    #[error("no active transaction")]
    #[diagnostic(
        code(warden::store::no_transaction),
        help("Call `begin()` before `commit()` or `rollback()`.")
    )]
    NoTransaction,

    #[error("a transaction is already active")]
    #[diagnostic(
        code(warden::store::nested_transaction),
        help("Nested transactions are not supported. Commit or roll back the active one first.")
    )]
    NestedTransaction,

    #[error("another session holds the write transaction")]
    #[diagnostic(
        code(warden::store::transaction_conflict),
        help(
            "Only one session of a store may write at a time. Retry once the \
             other session has committed or rolled back."
        )
    )]
    TransactionConflict,
}

// ---------------------------------------------------------------------------
// Access errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum AccessError {
    #[error("accessing the context {context} has been denied")]
    #[diagnostic(
        code(warden::access::context_denied),
        help(
            "The agent holds no sufficient access mode on this context. \
             Removals need Write, Control or WriteRestricted; additions also accept Append."
        )
    )]
    ContextAccessDenied { context: String },

    #[error("writing to the default context has been denied")]
    #[diagnostic(
        code(warden::access::default_context),
        help("Name at least one target context for every mutation.")
    )]
    DefaultContextDenied,

    #[error("reading without a readable dataset has been denied")]
    #[diagnostic(
        code(warden::access::read_denied),
        help("None of the requested contexts is readable by this agent.")
    )]
    ReadDenied,

    #[error("modifying access constraints of {target} has been denied: {reason}")]
    #[diagnostic(
        code(warden::access::acl_modification),
        help(
            "Authorizations may only target a single resource the agent controls \
             (or the agent itself). Class-wide authorizations cannot be added here."
        )
    )]
    AclModificationDenied { target: String, reason: String },

    #[error("changing the resource {resource} is not allowed")]
    #[diagnostic(
        code(warden::access::denied),
        help(
            "Neither the resource itself nor any resource linking to it \
             grants this agent Write, Append or Control."
        )
    )]
    AuthorizationDenied { resource: String },

    #[error("batch integrity violated: {remaining} operation(s) could not be resolved")]
    #[diagnostic(
        code(warden::access::batch_integrity),
        help(
            "Root finding made no progress. This is a bug in the batch resolver; \
             roll back the transaction and report the offending mutations."
        )
    )]
    BatchIntegrity { remaining: usize },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read security config: {path}")]
    #[diagnostic(
        code(warden::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse security config: {message}")]
    #[diagnostic(
        code(warden::config::parse),
        help("Check the TOML syntax of the security config.")
    )]
    Parse { message: String },

    #[error("invalid IRI for `{field}`: {value}")]
    #[diagnostic(
        code(warden::config::invalid_iri),
        help("Every agent and context setting must be an absolute IRI.")
    )]
    InvalidIri { field: String, value: String },
}

/// Result type for graph store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type for authorization decisions.
pub type AccessResult<T> = std::result::Result<T, AccessError>;

/// Result type for configuration loading.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Convenience alias for functions returning graph-warden results.
pub type WardenResult<T> = std::result::Result<T, WardenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_converts_to_access_error() {
        let access: AccessError = StoreError::NoTransaction.into();
        assert!(matches!(access, AccessError::Store(StoreError::NoTransaction)));
    }

    #[test]
    fn access_error_converts_to_warden_error() {
        let err = AccessError::AuthorizationDenied {
            resource: "urn:x:r".into(),
        };
        let warden: WardenError = err.into();
        assert!(matches!(
            warden,
            WardenError::Access(AccessError::AuthorizationDenied { .. })
        ));
    }

    #[test]
    fn denial_names_the_resource() {
        let err = AccessError::AuthorizationDenied {
            resource: "<urn:x:secret>".into(),
        };
        assert!(err.to_string().contains("urn:x:secret"));
    }
}
