//! Maps every collaborator's error type onto `dg_api::Error` (§7). Plain
//! functions rather than `From` impls: both the source and target types are
//! foreign to this crate, so the orphan rule rules out a trait impl here.

use dg_api::{Error, ErrorCode};

pub fn repostore_err(e: dg_repostore::RepoStoreError) -> Error {
    use dg_repostore::RepoStoreError::*;
    match e {
        NotFound(msg) => Error::new(ErrorCode::NotFound, msg),
        Vcs(ve) => vcs_err(ve),
        Kv(ke) => Error::new(ErrorCode::Structural, ke.to_string()),
        Encoding(msg) => Error::new(ErrorCode::Structural, msg),
    }
}

pub fn graph_err(e: dg_graph::GraphError) -> Error {
    use dg_graph::GraphError::*;
    match e {
        NotFound(path) => Error::new(ErrorCode::NotFound, format!("package row not found: {path}")),
        Kv(ke) => Error::new(ErrorCode::Structural, ke.to_string()),
        Encoding(msg) => Error::new(ErrorCode::Structural, msg),
    }
}

pub fn vcs_err(e: dg_vcs::VcsError) -> Error {
    use dg_vcs::VcsError::*;
    match e {
        AuthRequired => Error::new(ErrorCode::AuthRequired, e.to_string()),
        Spawn(_) | CommandFailed { .. } | NoMatchingHeads => Error::new(ErrorCode::VcsError, e.to_string()),
    }
}

pub fn resolve_err(e: dg_resolve::ResolveError) -> Error {
    use dg_resolve::ResolveError::*;
    match e {
        Malformed(_) => Error::new(ErrorCode::InvalidRequest, e.to_string()),
        NotFound(_) => Error::new(ErrorCode::NotFound, e.to_string()),
        Http(_) | NoMetaTag(_) => Error::new(ErrorCode::VcsError, e.to_string()),
        Vcs(ve) => vcs_err(ve),
    }
}
