//! `despacho-crypto` — message signing and field-level encryption.
//!
//! Two independent trust domains live here and must not be confused:
//!
//! - [`InternalSigningKey`] is shared only between the task dispatcher and its
//!   workers. It authenticates that a task invocation genuinely originated
//!   from the dispatcher.
//! - [`AuthorityKey`] is the per-service secret shared with the remote
//!   authorization authority. It binds a human-originated delivery signature
//!   across service boundaries.
//!
//! The key's trust domain is part of the type, so the two secrets cannot be
//! accidentally interchanged.

pub mod cipher;
pub mod signing;

pub use cipher::{CipherError, FieldCipher};
pub use signing::{AuthorityKey, InternalSigningKey, Signature, canonical_json};
