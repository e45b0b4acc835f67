//! Secret values that never reach logs or state in plaintext.
//!
//! A [`Secret`] serializes as [`REDACTED`] and prints as [`REDACTED`], so
//! any state record or diagnostic built through `serde` or `Debug` is
//! redacted structurally. Handlers read the plaintext with [`unwrap`] at the
//! point where it is handed to a provider.
//!
//! Secrets read back from persisted state carry no plaintext; see
//! [`Secret::is_available`]. To notice a rotated secret anyway, a record
//! keeps a [`SecretDigest`]: a keyed hash per field, salted per record.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use zeroize::Zeroizing;

/// Placeholder written wherever a secret would appear.
pub const REDACTED: &str = "[REDACTED]";

const MARKER: &str = "\u{0}secret#";
const DIGEST_CONTEXT: &str = "declarative 2026-10 secret field digest";

thread_local! {
    static COLLECTED: RefCell<Option<Vec<Zeroizing<String>>>> = const { RefCell::new(None) };
}

/// A sensitive string.
///
/// Clones share the same underlying allocation, which is zeroed when the
/// last clone is dropped. Equality compares identity: two clones of one
/// wrapped value are equal, two separate wraps of the same text are not.
#[derive(Clone)]
pub struct Secret {
    inner: Option<Arc<Zeroizing<String>>>,
}

impl Secret {
    /// Wrap a plaintext value.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            inner: Some(Arc::new(Zeroizing::new(value.into()))),
        }
    }

    /// A secret restored from a redacted record.
    pub fn redacted() -> Self {
        Self { inner: None }
    }

    /// Whether the plaintext is held in memory.
    ///
    /// `false` for secrets restored from persisted state.
    pub fn is_available(&self) -> bool {
        self.inner.is_some()
    }

    /// The plaintext, or [`REDACTED`] when it is not available.
    pub fn expose(&self) -> &str {
        match &self.inner {
            Some(value) => value.as_str(),
            None => REDACTED,
        }
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        match (&self.inner, &other.inner) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({REDACTED})")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if let Some(value) = &self.inner {
            let index = COLLECTED.with(|cell| {
                cell.borrow_mut().as_mut().map(|found| {
                    found.push(Zeroizing::new(value.as_str().to_owned()));
                    found.len() - 1
                })
            });
            if let Some(index) = index {
                return serializer.serialize_str(&format!("{MARKER}{index}"));
            }
        }
        serializer.serialize_str(REDACTED)
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(SecretVisitor)
    }
}

struct SecretVisitor;

impl Visitor<'_> for SecretVisitor {
    type Value = Secret;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a secret string")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Secret, E> {
        if value == REDACTED {
            Ok(Secret::redacted())
        } else {
            Ok(Secret::new(value))
        }
    }
}

/// A field that may or may not be sensitive.
///
/// Lets a handler treat optionally-secret props uniformly through [`unwrap`].
#[derive(Debug, Clone, PartialEq)]
pub enum MaybeSecret {
    /// Plain text, persisted as-is
    Plain(String),
    /// Sensitive text, persisted as [`REDACTED`]
    Secret(Secret),
}

impl From<&str> for MaybeSecret {
    fn from(value: &str) -> Self {
        Self::Plain(value.to_string())
    }
}

impl From<String> for MaybeSecret {
    fn from(value: String) -> Self {
        Self::Plain(value)
    }
}

impl From<Secret> for MaybeSecret {
    fn from(value: Secret) -> Self {
        Self::Secret(value)
    }
}

impl Serialize for MaybeSecret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MaybeSecret::Plain(value) => serializer.serialize_str(value),
            MaybeSecret::Secret(secret) => secret.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for MaybeSecret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        if value == REDACTED {
            Ok(MaybeSecret::Secret(Secret::redacted()))
        } else {
            Ok(MaybeSecret::Plain(value))
        }
    }
}

/// Anything [`unwrap`] can read plaintext from.
pub trait Reveal {
    /// The plaintext value.
    fn reveal(&self) -> &str;
}

impl Reveal for Secret {
    fn reveal(&self) -> &str {
        self.expose()
    }
}

impl Reveal for MaybeSecret {
    fn reveal(&self) -> &str {
        match self {
            MaybeSecret::Plain(value) => value,
            MaybeSecret::Secret(secret) => secret.expose(),
        }
    }
}

impl Reveal for String {
    fn reveal(&self) -> &str {
        self
    }
}

impl Reveal for str {
    fn reveal(&self) -> &str {
        self
    }
}

/// Wrap a value as a secret.
pub fn wrap(value: impl Into<String>) -> Secret {
    Secret::new(value)
}

/// Read the plaintext of a secret or a plain string.
pub fn unwrap<V: Reveal + ?Sized>(value: &V) -> &str {
    value.reveal()
}

/// Serialize a value for diagnostics, with every secret replaced.
pub fn redacted_json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<serde_json::Value> {
    serde_json::to_value(value)
}

/// Keyed hashes of the secret-bearing fields of a set of inputs.
///
/// Lets an update tell a rotated secret from an unchanged one without
/// keeping the plaintext. The salt is random per record, so equal secrets
/// in two records do not hash alike.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretDigest {
    pub salt: String,
    /// Hash per top-level field that holds an available secret
    pub fields: BTreeMap<String, String>,
}

impl SecretDigest {
    /// Hash of one field, if it holds a secret
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Collects secret plaintext while a value is being serialized.
///
/// Dropping the guard stops collection, even on a serialization error.
struct Collecting;

impl Collecting {
    fn start() -> Self {
        COLLECTED.with(|cell| *cell.borrow_mut() = Some(Vec::new()));
        Collecting
    }

    fn finish(self) -> Vec<Zeroizing<String>> {
        COLLECTED.with(|cell| cell.borrow_mut().take()).unwrap_or_default()
    }
}

impl Drop for Collecting {
    fn drop(&mut self) {
        COLLECTED.with(|cell| cell.borrow_mut().take());
    }
}

/// Digest the secrets held by `value`.
///
/// `None` when `value` holds no available secret. Pass the salt of the
/// record being compared against; without one a fresh salt is drawn.
pub(crate) fn digest<T: Serialize + ?Sized>(
    value: &T,
    salt: Option<&str>,
) -> serde_json::Result<Option<SecretDigest>> {
    let collecting = Collecting::start();
    let marked = serde_json::to_value(value);
    let plaintext = collecting.finish();
    let marked = marked?;
    if plaintext.is_empty() {
        return Ok(None);
    }

    let salt = salt.map_or_else(fresh_salt, str::to_string);
    let key = blake3::derive_key(DIGEST_CONTEXT, salt.as_bytes());
    let mut fields = BTreeMap::new();
    match marked {
        Value::Object(map) => {
            for (name, field) in map {
                if let Some(hash) = hash_field(&key, field, &plaintext)? {
                    fields.insert(name, hash);
                }
            }
        }
        other => {
            if let Some(hash) = hash_field(&key, other, &plaintext)? {
                fields.insert(String::new(), hash);
            }
        }
    }
    Ok(Some(SecretDigest { salt, fields }))
}

fn fresh_salt() -> String {
    rand::random::<[u8; 16]>()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn hash_field(
    key: &[u8; 32],
    mut field: Value,
    plaintext: &[Zeroizing<String>],
) -> serde_json::Result<Option<String>> {
    let mut found = Vec::new();
    unmark(&mut field, &mut found);
    if found.is_empty() {
        return Ok(None);
    }

    let mut hasher = blake3::Hasher::new_keyed(key);
    hasher.update(&serde_json::to_vec(&field)?);
    for text in found.into_iter().filter_map(|i| plaintext.get(i)) {
        hasher.update(&(text.len() as u64).to_le_bytes());
        hasher.update(text.as_bytes());
    }
    Ok(Some(hasher.finalize().to_hex().to_string()))
}

/// Swap markers back to [`REDACTED`], noting which secrets they stood for.
fn unmark(value: &mut Value, found: &mut Vec<usize>) {
    match value {
        Value::String(text) => {
            if let Some(index) = text.strip_prefix(MARKER).and_then(|i| i.parse().ok()) {
                found.push(index);
                *text = REDACTED.to_string();
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|item| unmark(item, found)),
        Value::Object(map) => map.values_mut().for_each(|item| unmark(item, found)),
        _ => {}
    }
}
