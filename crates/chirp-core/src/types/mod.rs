//! Validated value types.
//!
//! These types enforce API invariants at construction time,
//! ensuring invalid states are unrepresentable.

mod api_url;
mod id;
mod user_ref;

pub use api_url::ApiUrl;
pub use id::Id;
pub use user_ref::UserRef;
