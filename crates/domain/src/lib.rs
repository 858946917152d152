//! Domain types for just-in-time role elevation: sentinel IAM conditions,
//! entitlements, activation requests, and justification policy.

#![forbid(unsafe_code)]

mod activation;
mod condition;
mod entitlement;
mod iam;
mod justification;

pub use activation::{
    Activation, ActivationRequest, ActivationRequestId, JitActivationRequest,
    MpaActivationRequest, MIN_ACTIVATION_DURATION,
};
pub use condition::{
    evaluate_temporary_condition, is_activated, is_approval_marker, is_jit_marker, is_mpa_marker,
    temporary_condition, IamCondition, ACTIVATED_CONDITION_TITLE, JIT_MARKER_EXPRESSION,
    MPA_MARKER_EXPRESSION,
};
pub use entitlement::{ActivationType, Entitlement, EntitlementSet, EntitlementStatus};
pub use iam::{bindings_equal, IamBinding, IamPolicy, REQUESTED_POLICY_VERSION};
pub use justification::RegexJustificationPolicy;
