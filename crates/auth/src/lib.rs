//! `despacho-auth` — authentication boundary (zero-trust).
//!
//! This crate validates credentials; it never issues them. Token issuance is
//! owned by the remote authorization service.

pub mod api_key;
pub mod claims;
pub mod jwt;

pub use api_key::ServiceApiKey;
pub use claims::{JwtClaims, Role, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator};
