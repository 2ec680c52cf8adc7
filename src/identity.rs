//! Per-particle identity keys shared by the tabular and binary representations.
//!
//! RELION references a particle image as `<index>@<path>` with a one-based
//! index, cryoSPARC as a `(blob/path, blob/idx)` pair with a zero-based index.
//! Upstream stages may also prepend a numeric UID (`123456_`) to the stack
//! basename. Both sides are normalized into the same `"<index>@<basename>"`
//! key so records can be correlated; the normalization is controlled by an
//! explicit [`IdentityRule`] at every call site.

use std::borrow::Borrow;
use std::fmt;

use crate::error::{Error, Result};

/// Normalization applied when deriving an identity key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(default)]
pub struct IdentityRule {
    /// Remove a leading `^[0-9]+_` UID prefix from the basename
    pub strip_uid: bool,
    /// Remove the final dot-extension from the basename
    pub strip_ext: bool,
}

impl IdentityRule {
    /// Keep the basename as-is
    pub const EXACT: Self = Self {
        strip_uid: false,
        strip_ext: false,
    };

    /// Remove the UID prefix only
    pub const STRIP_UID: Self = Self {
        strip_uid: true,
        strip_ext: false,
    };

    /// Remove both the UID prefix and the extension
    pub const BASENAME: Self = Self {
        strip_uid: true,
        strip_ext: true,
    };

    /// Create a rule from explicit flags
    pub fn new(strip_uid: bool, strip_ext: bool) -> Self {
        Self {
            strip_uid,
            strip_ext,
        }
    }
}

/// Canonical `"<one-based-index>@<normalized-basename>"` key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// View the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the key, returning the inner string
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for IdentityKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Derive the identity of a tabular image reference such as `000005@Extract/001_mic.mrcs`
///
/// Leading zeros of the index are always removed, since some writers pad it
/// and others do not.
pub fn derive_identity(raw_name: &str, rule: IdentityRule) -> Result<IdentityKey> {
    let (index, path) = raw_name.split_once('@').ok_or_else(|| Error::MalformedIdentity {
        raw: raw_name.to_string(),
        reason: "missing '@' separator",
    })?;

    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::MalformedIdentity {
            raw: raw_name.to_string(),
            reason: "index is not a decimal number",
        });
    }

    let basename = normalize_basename(path, rule).ok_or_else(|| Error::MalformedIdentity {
        raw: raw_name.to_string(),
        reason: "empty path",
    })?;

    Ok(IdentityKey(format!(
        "{}@{}",
        index.trim_start_matches('0'),
        basename
    )))
}

/// Derive the identity of a binary blob reference
///
/// `blob_index` is zero-based and is converted to the one-based convention of
/// the tabular side.
pub fn derive_blob_identity(
    blob_path: &str,
    blob_index: u64,
    rule: IdentityRule,
) -> Result<IdentityKey> {
    let basename = normalize_basename(blob_path, rule).ok_or_else(|| Error::MalformedIdentity {
        raw: format!("{}@{}", blob_index, blob_path),
        reason: "empty path",
    })?;

    let index = blob_index.checked_add(1).ok_or_else(|| Error::MalformedIdentity {
        raw: format!("{}@{}", blob_index, blob_path),
        reason: "index out of range",
    })?;
    Ok(IdentityKey(format!("{}@{}", index, basename)))
}

/// Final path component of `path`, normalized by `rule`; `None` when empty
pub fn normalize_basename(path: &str, rule: IdentityRule) -> Option<&str> {
    let mut name = path.rsplit('/').next().unwrap_or_default();
    if name.is_empty() {
        return None;
    }

    if rule.strip_uid {
        name = strip_uid_prefix(name);
    }

    if rule.strip_ext {
        // A leading dot marks a hidden file, not an extension
        if let Some(dot) = name.rfind('.') {
            if dot > 0 {
                name = &name[..dot];
            }
        }
    }

    Some(name)
}

/// Remove a prefix matching `^[0-9]+_`, leaving anything else untouched
pub fn strip_uid_prefix(name: &str) -> &str {
    let digits = name.bytes().take_while(|b| b.is_ascii_digit()).count();
    if digits > 0 && name.as_bytes().get(digits) == Some(&b'_') {
        &name[digits + 1..]
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tabular_identity_exact() {
        let key = derive_identity("000012@Extract/job007/001_mic.mrcs", IdentityRule::EXACT).unwrap();
        assert_eq!(key.as_str(), "12@001_mic.mrcs");
    }

    #[test]
    fn test_tabular_identity_strip_uid_and_ext() {
        let key = derive_identity("5@J3/imported/001_mic.mrcs", IdentityRule::BASENAME).unwrap();
        assert_eq!(key.as_str(), "5@mic");

        let key = derive_identity("5@J3/imported/001_mic.mrcs", IdentityRule::STRIP_UID).unwrap();
        assert_eq!(key.as_str(), "5@mic.mrcs");
    }

    #[test]
    fn test_blob_identity_is_one_based() {
        let key = derive_blob_identity(
            "J3/imported/0123456789_stack_0001.mrc",
            0,
            IdentityRule::BASENAME,
        )
        .unwrap();
        assert_eq!(key.as_str(), "1@stack_0001");
    }

    #[test]
    fn test_both_sides_agree() {
        let tabular = derive_identity("00042@Extract/stack.mrcs", IdentityRule::BASENAME).unwrap();
        let blob = derive_blob_identity("J9/8812_stack.mrcs", 41, IdentityRule::BASENAME).unwrap();
        assert_eq!(tabular, blob);
    }

    #[test]
    fn test_uid_prefix_only_matches_digits_then_underscore() {
        assert_eq!(strip_uid_prefix("001_mic.mrcs"), "mic.mrcs");
        assert_eq!(strip_uid_prefix("mic_001.mrcs"), "mic_001.mrcs");
        assert_eq!(strip_uid_prefix("12a_mic.mrcs"), "12a_mic.mrcs");
        assert_eq!(strip_uid_prefix("_mic.mrcs"), "_mic.mrcs");
        assert_eq!(strip_uid_prefix("123"), "123");
        // Only one prefix is removed
        assert_eq!(strip_uid_prefix("1_2_mic"), "2_mic");
    }

    #[test]
    fn test_extension_strip_keeps_hidden_names() {
        assert_eq!(normalize_basename("a/.mrcs", IdentityRule::BASENAME), Some(".mrcs"));
        assert_eq!(normalize_basename("a/b.tar.gz", IdentityRule::BASENAME), Some("b.tar"));
        assert_eq!(normalize_basename("a/noext", IdentityRule::BASENAME), Some("noext"));
    }

    #[test]
    fn test_malformed_identities() {
        assert!(matches!(
            derive_identity("mic.mrcs", IdentityRule::EXACT),
            Err(Error::MalformedIdentity { .. })
        ));
        assert!(matches!(
            derive_identity("5@", IdentityRule::EXACT),
            Err(Error::MalformedIdentity { .. })
        ));
        assert!(matches!(
            derive_identity("5@dir/", IdentityRule::EXACT),
            Err(Error::MalformedIdentity { .. })
        ));
        assert!(matches!(
            derive_identity("x5@mic.mrcs", IdentityRule::EXACT),
            Err(Error::MalformedIdentity { .. })
        ));
        assert!(matches!(
            derive_blob_identity("", 0, IdentityRule::EXACT),
            Err(Error::MalformedIdentity { .. })
        ));
    }

    #[test]
    fn test_blob_index_at_limit() {
        assert!(matches!(
            derive_blob_identity("stack.mrcs", u64::MAX, IdentityRule::EXACT),
            Err(Error::MalformedIdentity { reason: "index out of range", .. })
        ));
        let key = derive_blob_identity("stack.mrcs", u64::MAX - 1, IdentityRule::EXACT).unwrap();
        assert_eq!(key.as_str(), format!("{}@stack.mrcs", u64::MAX));
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let a = derive_identity("7@x/99_y.mrcs", IdentityRule::STRIP_UID).unwrap();
        let b = derive_identity("7@x/99_y.mrcs", IdentityRule::STRIP_UID).unwrap();
        assert_eq!(a, b);
    }
}
