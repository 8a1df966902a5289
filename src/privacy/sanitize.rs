use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::monitor::types::SessionContext;

/// Context keys that name personal data. Matched case-insensitively after stripping `_`/`-`.
pub const PII_KEYS: &[&str] = &[
    "name",
    "firstname",
    "lastname",
    "fullname",
    "email",
    "emailaddress",
    "phone",
    "phonenumber",
    "mobile",
    "address",
    "streetaddress",
    "postcode",
    "zipcode",
    "birthdate",
    "dateofbirth",
    "dob",
    "ssn",
    "passport",
    "userid",
    "password",
    "location",
    "latitude",
    "longitude",
    "ipaddress",
];

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").unwrap());

static PHONE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?[0-9][0-9 ().\-]{5,}[0-9]$").unwrap());

const MIN_PHONE_DIGITS: usize = 7;

pub fn is_pii_key(key: &str) -> bool {
    let normalized: String = key
        .chars()
        .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    PII_KEYS.contains(&normalized.as_str())
}

pub fn looks_like_email(value: &str) -> bool {
    EMAIL.is_match(value.trim())
}

pub fn looks_like_phone(value: &str) -> bool {
    let trimmed = value.trim();
    PHONE.is_match(trimmed) && trimmed.chars().filter(char::is_ascii_digit).count() >= MIN_PHONE_DIGITS
}

/// One-way identifier digest, truncated to keep records small.
pub fn hash_identifier(value: &str) -> String {
    let digest = Sha256::digest(value.trim().as_bytes());
    format!("sha256:{}", &hex::encode(digest)[..16])
}

/// Drops PII-named keys and replaces email- or phone-shaped strings with their digest.
/// Nested objects are sanitized recursively.
pub fn sanitize_context(context: &SessionContext) -> SessionContext {
    context
        .iter()
        .filter(|(key, _)| !is_pii_key(key))
        .map(|(key, value)| (key.clone(), sanitize_value(value)))
        .collect()
}

fn sanitize_value(value: &Value) -> Value {
    match value {
        Value::String(s) if looks_like_email(s) || looks_like_phone(s) => {
            Value::String(hash_identifier(s))
        }
        Value::Array(items) => Value::Array(items.iter().map(sanitize_value).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| !is_pii_key(key))
                .map(|(key, v)| (key.clone(), sanitize_value(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_pii_keys_and_hashes_contact_values() {
        let mut ctx = SessionContext::new();
        ctx.insert("user_Email".into(), json!("a@b.com"));
        ctx.insert("Email".into(), json!("a@b.com"));
        ctx.insert("screen".into(), json!("morning_nudge"));
        ctx.insert("contact".into(), json!("+1 (555) 010-2030"));
        ctx.insert("volume".into(), json!(0.7));

        let clean = sanitize_context(&ctx);

        assert!(!clean.contains_key("Email"));
        assert_eq!(clean["screen"], json!("morning_nudge"));
        assert_eq!(clean["volume"], json!(0.7));
        let hashed = clean["contact"].as_str().unwrap_or_default();
        assert!(hashed.starts_with("sha256:"));
        // "user_Email" is not a known PII key, but its value is an email.
        assert!(clean["user_Email"].as_str().unwrap_or_default().starts_with("sha256:"));
    }

    #[test]
    fn short_numbers_are_not_phones() {
        assert!(!looks_like_phone("2024"));
        assert!(!looks_like_phone("12-34"));
        assert!(looks_like_phone("0612345678"));
    }

    #[test]
    fn pii_key_matching_ignores_case_and_separators() {
        assert!(is_pii_key("Phone_Number"));
        assert!(is_pii_key("date-of-birth"));
        assert!(!is_pii_key("nudge_kind"));
    }
}
