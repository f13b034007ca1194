//! Typed request/response/event DTOs for the depgraph RPC contract.
//!
//! Every crate boundary in this workspace — the RPC front-end, the CLI, and
//! the engine's own test fixtures — speaks these types rather than raw JSON
//! or ad hoc structs, so the wire contract has exactly one definition.

pub mod bounds;
pub mod error;
pub mod event;
pub mod paging;
pub mod request;
pub mod response;
pub mod version;

pub use bounds::{Concurrency, Cursor, Damping, Iterations, PageSize, SampleRate};
pub use error::{Error, ErrorCode};
pub use event::Event;
pub use paging::Paging;
pub use request::{Request, RequestPayload};
pub use response::{Response, ResponsePayload};
pub use version::ApiVersion;

#[cfg(test)]
mod tests {
    use super::*;
    use request::{RepoStatusParams, RequestPayload};

    #[test]
    fn deterministic_serialization() {
        let make = || Request {
            version: ApiVersion::V0,
            id: "test-123".to_string(),
            token: None,
            payload: RequestPayload::RepoStatus(RepoStatusParams {
                repository: "github.com/u/repo".to_string(),
            }),
        };

        let json1 = serde_json::to_string(&make()).unwrap();
        let json2 = serde_json::to_string(&make()).unwrap();
        assert_eq!(json1, json2);

        let deserialized: Request = serde_json::from_str(&json1).unwrap();
        assert_eq!(deserialized.id, "test-123");
        assert!(!deserialized.payload.mutates());
    }

    #[test]
    fn mutating_methods_require_token_check() {
        use request::UpdateParams;

        let payload = RequestPayload::Update(UpdateParams {
            repository: "github.com/u/repo".to_string(),
            reference: None,
            check_only: false,
            reset: false,
            force: false,
            prefix: None,
            loader_options: Default::default(),
        });
        assert!(payload.mutates());
        assert_eq!(payload.method_name(), "Update");
        assert_eq!(payload.subject(), "github.com/u/repo");
    }
}
