//! Queue message envelope.

use rand::Rng;
use serde_json::{Map, Value};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use super::RelayError;

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_LEN: usize = 9;

/// `msg_<epoch-millis>_<9 base36 chars>`. Unique in practice, not guaranteed.
pub fn generate_message_id() -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("msg_{millis}_{suffix}")
}

/// The caller's fields plus `timestamp` and `messageId`. Envelope fields win on collision.
pub fn envelope(message: Value, message_id: &str) -> Result<Map<String, Value>, RelayError> {
    let Value::Object(mut fields) = message else {
        return Err(RelayError::NotAnObject);
    };
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|err| RelayError::Encode(err.to_string()))?;
    fields.insert("timestamp".to_string(), Value::String(timestamp));
    fields.insert("messageId".to_string(), Value::String(message_id.to_string()));
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn message_ids_have_expected_shape() {
        let id = generate_message_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "msg");
        assert!(parts[1].parse::<u64>().is_ok());
        assert_eq!(parts[2].len(), ID_SUFFIX_LEN);
        assert!(parts[2].bytes().all(|b| ID_ALPHABET.contains(&b)));
        assert_ne!(generate_message_id(), id);
    }

    #[test]
    fn envelope_adds_metadata_fields() {
        let fields = envelope(json!({"event": "service_created", "serviceId": 3}), "msg_1_abc")
            .expect("envelope");
        assert_eq!(fields["event"], json!("service_created"));
        assert_eq!(fields["messageId"], json!("msg_1_abc"));
        assert!(fields["timestamp"].as_str().is_some_and(|ts| ts.ends_with('Z')));
    }

    #[test]
    fn envelope_rejects_non_objects() {
        assert!(matches!(envelope(json!([1]), "id"), Err(RelayError::NotAnObject)));
    }
}
