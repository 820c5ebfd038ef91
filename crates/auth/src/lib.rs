//! `warden-auth`: token verification, claims validation and entitlement membership.
//!
//! No HTTP or storage here: this crate turns a raw bearer token into validated
//! [`Claims`] and answers membership questions over an [`EntitlementSet`] that
//! somebody else fetched.

pub mod claims;
pub mod entitlement;
pub mod token;

pub use claims::{Claims, ClaimsError, ClaimsPolicy, FieldError, Resource};
pub use entitlement::{Entitlement, EntitlementSet, RequiredEntitlements};
pub use token::{RsaTokenVerifier, TokenError, TokenVerifier};
