//! NYM records as returned by a ledger `GET_NYM` read.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::{ResultExt, Snafu};

use crate::did::is_self_certified_did;

/// Error parsing the `result` of a `GET_NYM` reply.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum NymParseError {
    /// `result.data` is neither null, a string nor an object.
    #[snafu(display("unexpected nym data: {found}"))]
    UnexpectedData {
        /// JSON type that was found.
        found: String,
    },

    /// `result.data` could not be decoded into a nym.
    #[snafu(display("invalid nym data: {source}"))]
    InvalidData {
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

/// A DID as written to a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NymRecord {
    /// Unqualified DID (`dest` on the ledger).
    #[serde(alias = "dest")]
    pub did: String,
    /// Verkey, full or abbreviated. Absent when the ledger stores none.
    #[serde(default)]
    pub verkey: Option<String>,
    /// Ledger role, e.g. `"0"` for trustee or `"101"` for endorser.
    #[serde(default)]
    pub role: Option<String>,
}

impl NymRecord {
    /// Whether the recorded verkey self-certifies the DID.
    #[must_use]
    pub fn is_self_certified(&self) -> bool {
        self.verkey.as_deref().is_some_and(|verkey| is_self_certified_did(&self.did, verkey))
    }

    /// Parses the `result` object of a `GET_NYM` reply.
    ///
    /// `result.data` carries the nym either as a JSON-encoded string or as an
    /// object. A null or absent `data` means the DID is not on this ledger and
    /// yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`NymParseError`] if `data` holds something other than a nym.
    pub fn from_reply(result: &Value) -> Result<Option<Self>, NymParseError> {
        match result.get("data") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(encoded)) => {
                let data: Value = serde_json::from_str(encoded).context(InvalidDataSnafu)?;
                if data.is_null() {
                    return Ok(None);
                }
                serde_json::from_value(data).map(Some).context(InvalidDataSnafu)
            },
            Some(data @ Value::Object(_)) => {
                serde_json::from_value(data.clone()).map(Some).context(InvalidDataSnafu)
            },
            Some(other) => UnexpectedDataSnafu { found: json_type(other) }.fail(),
        }
    }
}

fn json_type(value: &Value) -> String {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
    .to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn null_data_is_not_found() {
        let result = json!({ "type": "105", "dest": "q7ATwTYbQDgiigVijUAej", "data": null });
        assert_eq!(NymRecord::from_reply(&result).unwrap(), None);
        assert_eq!(NymRecord::from_reply(&json!({ "type": "105" })).unwrap(), None);
    }

    #[test]
    fn parses_string_encoded_data() {
        let data = json!({
            "dest": "q7ATwTYbQDgiigVijUAej",
            "identifier": "V4SGRU86Z58d6TV7PBUe6f",
            "role": "101",
            "verkey": "~M9kv2Ez61cur7X39DXWh8W",
        });
        let result = json!({ "type": "105", "data": data.to_string() });

        let nym = NymRecord::from_reply(&result).unwrap().unwrap();
        assert_eq!(nym.did, "q7ATwTYbQDgiigVijUAej");
        assert_eq!(nym.role.as_deref(), Some("101"));
        assert!(nym.is_self_certified());
    }

    #[test]
    fn parses_object_data_with_null_fields() {
        let result = json!({
            "data": { "dest": "q7ATwTYbQDgiigVijUAej", "role": null, "verkey": null }
        });
        let nym = NymRecord::from_reply(&result).unwrap().unwrap();
        assert_eq!(nym.verkey, None);
        assert_eq!(nym.role, None);
        assert!(!nym.is_self_certified());
    }

    #[test]
    fn rejects_unexpected_data() {
        let err = NymRecord::from_reply(&json!({ "data": 42 })).unwrap_err();
        assert!(matches!(err, NymParseError::UnexpectedData { .. }));

        let err = NymRecord::from_reply(&json!({ "data": "{not json" })).unwrap_err();
        assert!(matches!(err, NymParseError::InvalidData { .. }));

        let err = NymRecord::from_reply(&json!({ "data": { "verkey": "abc" } })).unwrap_err();
        assert!(matches!(err, NymParseError::InvalidData { .. }));
    }

    #[test]
    fn round_trips_through_cache_form() {
        let nym = NymRecord {
            did: "q7ATwTYbQDgiigVijUAej".to_string(),
            verkey: Some("~M9kv2Ez61cur7X39DXWh8W".to_string()),
            role: None,
        };
        let value = serde_json::to_value(&nym).unwrap();
        assert_eq!(value["did"], "q7ATwTYbQDgiigVijUAej");
        assert_eq!(serde_json::from_value::<NymRecord>(value).unwrap(), nym);
    }
}
