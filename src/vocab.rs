//! The fixed authorization vocabulary.
//!
//! Authorization entries use the W3C WebACL terms; the restricted write mode
//! lives in the graph-warden namespace.

use oxigraph::model::NamedNodeRef;

pub mod acl {
    use super::NamedNodeRef;

    pub const NAMESPACE: &str = "http://www.w3.org/ns/auth/acl#";

    pub const ACCESS_TO: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/auth/acl#accessTo");
    pub const ACCESS_TO_CLASS: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/auth/acl#accessToClass");
    pub const AGENT: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/auth/acl#agent");
    pub const AGENT_CLASS: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/auth/acl#agentClass");
    pub const MODE: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/auth/acl#mode");
    pub const OWNER: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/auth/acl#owner");
    pub const AUTHORIZATION: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/auth/acl#Authorization");

    pub const READ: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/auth/acl#Read");
    pub const WRITE: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/auth/acl#Write");
    pub const APPEND: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/auth/acl#Append");
    pub const CONTROL: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/auth/acl#Control");
}

pub mod warden {
    use super::NamedNodeRef;

    pub const NAMESPACE: &str = "https://graph-warden.dev/acl#";

    /// Reading is allowed, writing is resolved per resource.
    pub const WRITE_RESTRICTED: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("https://graph-warden.dev/acl#WriteRestricted");
}

pub mod foaf {
    use super::NamedNodeRef;

    pub const NAMESPACE: &str = "http://xmlns.com/foaf/0.1/";

    pub const MEMBER: NamedNodeRef<'static> =
        NamedNodeRef::new_unchecked("http://xmlns.com/foaf/0.1/member");
}

pub use oxigraph::model::vocab::{rdf, rdfs};
