//! Keyed message signing over a canonical JSON serialization.
//!
//! Signatures are HMAC-SHA-512 hex digests over a canonical rendering of the
//! payload (recursively sorted object keys). Validation recomputes the digest
//! and compares in constant time.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha512;
use subtle::ConstantTimeEq;

type HmacSha512 = Hmac<Sha512>;

/// Hex-encoded HMAC-SHA-512 digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl core::fmt::Display for Signature {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Signature {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Render a JSON value with recursively sorted object keys.
///
/// Both signing and validation must go through this function or digests will
/// never match across processes.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Key serialization cannot fail: a String is always valid JSON.
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn hmac_hex(secret: &[u8], data: &Value) -> String {
    let mut mac =
        <HmacSha512 as Mac>::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(canonical_json(data).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

macro_rules! signing_key {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone)]
        pub struct $name(Vec<u8>);

        impl $name {
            pub fn new(secret: impl AsRef<[u8]>) -> Self {
                Self(secret.as_ref().to_vec())
            }

            /// Sign `data` over its canonical serialization.
            pub fn sign(&self, data: &Value) -> Signature {
                Signature(hmac_hex(&self.0, data))
            }

            /// Recompute and compare in constant time.
            pub fn verify(&self, data: &Value, signature: &str) -> bool {
                let expected = hmac_hex(&self.0, data);
                constant_time_eq(expected.as_bytes(), signature.as_bytes())
            }
        }

        // Never print key material.
        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(concat!(stringify!($name), "(..)"))
            }
        }
    };
}

signing_key!(
    /// Secret shared between the task dispatcher and its workers.
    ///
    /// A worker accepts an envelope only if its signature recomputes under
    /// this key; a producer that can reach the broker but does not hold the
    /// key cannot cause task execution.
    InternalSigningKey
);

signing_key!(
    /// Per-service secret shared with the remote authorization authority.
    AuthorityKey
);

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn sign_verify_round_trip() {
        let key = InternalSigningKey::new("celery-signing-key");
        let data = json!({"task_name": "logistica.procesar_entrega", "args": [1, "ENTREGADA"]});

        let sig = key.sign(&data);
        assert!(key.verify(&data, sig.as_str()));
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let key = InternalSigningKey::new("celery-signing-key");
        let data = json!({"task_name": "logistica.procesar_entrega", "args": [1, "ENTREGADA"]});
        let sig = key.sign(&data);

        let tampered = json!({"task_name": "logistica.procesar_entrega", "args": [2, "ENTREGADA"]});
        assert!(!key.verify(&tampered, sig.as_str()));
    }

    #[test]
    fn different_keys_produce_different_signatures() {
        let data = json!({"x": 1});
        let a = InternalSigningKey::new("a").sign(&data);
        let b = InternalSigningKey::new("b").sign(&data);
        assert_ne!(a, b);
    }

    #[test]
    fn canonical_json_sorts_keys_recursively() {
        let a = json!({"b": {"z": 1, "a": 2}, "a": [{"y": 1, "x": 2}]});
        assert_eq!(
            canonical_json(&a),
            r#"{"a":[{"x":2,"y":1}],"b":{"a":2,"z":1}}"#
        );
    }

    #[test]
    fn insertion_order_does_not_change_signature() {
        let key = AuthorityKey::new("authority");

        let mut first = serde_json::Map::new();
        first.insert("direccion".to_string(), json!("Calle 1"));
        first.insert("pedido_id".to_string(), json!(9));

        let mut second = serde_json::Map::new();
        second.insert("pedido_id".to_string(), json!(9));
        second.insert("direccion".to_string(), json!("Calle 1"));

        assert_eq!(
            key.sign(&Value::Object(first)),
            key.sign(&Value::Object(second))
        );
    }

    #[test]
    fn signature_is_hex_sha512() {
        let sig = InternalSigningKey::new("k").sign(&json!({}));
        // SHA-512 = 64 bytes = 128 hex chars.
        assert_eq!(sig.as_str().len(), 128);
        assert!(sig.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    proptest! {
        #[test]
        fn any_string_payload_round_trips(
            secret in ".*",
            field in "[a-z_]{1,16}",
            value in ".*",
        ) {
            let key = InternalSigningKey::new(secret.as_bytes());
            let data = json!({ field: value });
            let sig = key.sign(&data);
            prop_assert!(key.verify(&data, sig.as_str()));
        }

        #[test]
        fn mutating_a_field_breaks_the_signature(
            value in 0i64..1_000_000,
            delta in 1i64..1000,
        ) {
            let key = InternalSigningKey::new("k");
            let data = json!({"entrega_id": value});
            let sig = key.sign(&data);
            let mutated = json!({"entrega_id": value + delta});
            prop_assert!(!key.verify(&mutated, sig.as_str()));
        }
    }
}
