use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

/// Verifies that the request's query parameters were signed by the trusted
/// storefront front-end.
///
/// The canonical message is built by dropping every `signature` pair,
/// grouping the rest by key (multi-valued keys are comma-joined, in
/// arrival order), sorting keys lexicographically and concatenating
/// `key=value` pairs with no separator. The claimed signature must equal
/// the lowercase hex HMAC-SHA256 of that message under the shared secret.
pub fn verify(pairs: &[(String, String)], secret: &str) -> Result<(), AppError> {
    let claimed = pairs
        .iter()
        .find(|(key, _)| key == "signature")
        .map(|(_, value)| value.as_str())
        .ok_or_else(|| AppError::unauthorized("Missing signature"))?;

    let expected = compute(pairs, secret);
    let claimed = claimed.as_bytes();
    let expected = expected.as_bytes();
    // Uniform rejection: length mismatch and content mismatch are the
    // same error, and content comparison never short-circuits.
    if claimed.len() != expected.len() || !bool::from(expected.ct_eq(claimed)) {
        return Err(AppError::unauthorized("Invalid signature"));
    }
    Ok(())
}

/// Computes the lowercase hex signature for a set of query pairs. Pure.
pub fn compute(pairs: &[(String, String)], secret: &str) -> String {
    let message = canonical_message(pairs);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn canonical_message(pairs: &[(String, String)]) -> String {
    let mut grouped: Vec<(&str, String)> = Vec::new();
    for (key, value) in pairs {
        if key == "signature" {
            continue;
        }
        match grouped.iter_mut().find(|(existing, _)| *existing == key.as_str()) {
            Some((_, joined)) => {
                joined.push(',');
                joined.push_str(value);
            }
            None => grouped.push((key.as_str(), value.clone())),
        }
    }
    grouped.sort_by(|(a, _), (b, _)| a.cmp(b));
    grouped
        .into_iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{compute, verify};

    const SECRET: &str = "test-secret";

    fn pairs(entries: &[(&str, &str)]) -> Vec<(String, String)> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn signed(entries: &[(&str, &str)]) -> Vec<(String, String)> {
        let mut out = pairs(entries);
        let sig = compute(&out, SECRET);
        out.push(("signature".to_string(), sig));
        out
    }

    #[test]
    fn computes_deterministic_signatures() {
        let query = pairs(&[("customer_id", "42"), ("action", "list")]);
        assert_eq!(compute(&query, SECRET), compute(&query, SECRET));
    }

    #[test]
    fn key_order_does_not_matter() {
        let a = pairs(&[("b", "2"), ("a", "1")]);
        let b = pairs(&[("a", "1"), ("b", "2")]);
        assert_eq!(compute(&a, SECRET), compute(&b, SECRET));
    }

    #[test]
    fn multi_valued_keys_are_comma_joined() {
        let split = pairs(&[("ids", "1"), ("ids", "2"), ("action", "list")]);
        let joined = pairs(&[("ids", "1,2"), ("action", "list")]);
        assert_eq!(compute(&split, SECRET), compute(&joined, SECRET));
    }

    #[test]
    fn accepts_a_correctly_signed_query() {
        let query = signed(&[("action", "get"), ("customer_id", "42"), ("list_id", "abc")]);
        assert!(verify(&query, SECRET).is_ok());
    }

    #[test]
    fn rejects_when_signature_is_missing() {
        let query = pairs(&[("action", "get"), ("customer_id", "42")]);
        let err = verify(&query, SECRET).unwrap_err();
        assert_eq!(err.to_string(), "Missing signature");
    }

    #[test]
    fn rejects_a_wrong_signature_of_correct_length() {
        let mut query = signed(&[("action", "get"), ("customer_id", "42")]);
        let sig = &mut query.last_mut().unwrap().1;
        let flipped = if sig.ends_with('0') { '1' } else { '0' };
        sig.pop();
        sig.push(flipped);
        assert!(verify(&query, SECRET).is_err());
    }

    #[test]
    fn rejects_a_wrong_length_signature() {
        let mut query = pairs(&[("action", "get"), ("customer_id", "42")]);
        query.push(("signature".to_string(), "deadbeef".to_string()));
        assert!(verify(&query, SECRET).is_err());
    }

    #[test]
    fn signature_pair_is_excluded_from_the_message() {
        let unsigned = pairs(&[("action", "list"), ("customer_id", "7")]);
        let expected = compute(&unsigned, SECRET);
        let mut with_sig = unsigned.clone();
        with_sig.push(("signature".to_string(), expected.clone()));
        assert_eq!(compute(&with_sig, SECRET), expected);
    }
}
