//! Same-origin policy enforcement for script-initiated requests.

pub mod origin;
pub mod policy;

pub use origin::Origin;
pub use policy::{
    has_enforceable_document_origin, is_cors_eligible_request_url, CorsConfig, CorsDecision, CorsPolicy,
};
