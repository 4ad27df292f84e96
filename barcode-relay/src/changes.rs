//! Change feed types
//!
//! Mirrors the `_changes` response of a CouchDB style document store.
//! Only `results[0].doc` is consumed; everything else is carried for
//! diagnostics and otherwise ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RelayError, RelayResult};

/// Top-level response of a long-poll `_changes` query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeEnvelope {
    #[serde(default)]
    pub results: Vec<ChangeRecord>,
    #[serde(default)]
    pub last_seq: Option<Value>,
}

/// A single entry in `results`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub seq: Option<Value>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub doc: Option<Value>,
}

impl ChangeEnvelope {
    /// Take the document of the first change record.
    ///
    /// An empty batch or a record without a document is a contract violation
    /// of the upstream and is reported as such instead of yielding `null`.
    pub fn into_first_doc(self) -> RelayResult<Value> {
        let first = self
            .results
            .into_iter()
            .next()
            .ok_or_else(|| RelayError::malformed("change feed returned no results"))?;

        match first.doc {
            Some(Value::Null) | None => Err(RelayError::malformed(format!(
                "change {} carries no document",
                first.id.as_deref().unwrap_or("<unknown>")
            ))),
            Some(doc) => Ok(doc),
        }
    }
}

/// Query parameters sent with every `_changes` request.
///
/// Fixed on purpose: each wait starts from "now" and never resumes from a
/// previous call's position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeQuery;

impl ChangeQuery {
    pub const FEED: &'static str = "longpoll";
    pub const SINCE: &'static str = "now";
    pub const INCLUDE_DOCS: &'static str = "true";

    #[must_use]
    pub const fn params(self) -> [(&'static str, &'static str); 3] {
        [
            ("feed", Self::FEED),
            ("since", Self::SINCE),
            ("include_docs", Self::INCLUDE_DOCS),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_doc_is_returned_verbatim() {
        let doc = json!({
            "_id": "B-001",
            "_rev": "1-abc",
            "status": "scanned",
            "meta": { "station": 3, "tags": ["a", null, true] }
        });
        let envelope: ChangeEnvelope = serde_json::from_value(json!({
            "results": [
                { "seq": "1-g1", "id": "B-001", "changes": [{ "rev": "1-abc" }], "doc": doc },
                { "seq": "2-g1", "id": "B-002", "doc": { "_id": "B-002" } }
            ],
            "last_seq": "2-g1",
            "pending": 0
        }))
        .unwrap();

        assert_eq!(envelope.into_first_doc().unwrap(), doc);
    }

    #[test]
    fn test_empty_results_is_malformed() {
        let envelope: ChangeEnvelope =
            serde_json::from_value(json!({ "results": [], "last_seq": "5-x" })).unwrap();

        let err = envelope.into_first_doc().unwrap_err();
        assert!(matches!(err, RelayError::MalformedUpstreamResponse(_)));
    }

    #[test]
    fn test_missing_results_is_malformed() {
        let envelope: ChangeEnvelope = serde_json::from_value(json!({ "last_seq": 0 })).unwrap();

        assert!(envelope.results.is_empty());
        assert!(matches!(
            envelope.into_first_doc(),
            Err(RelayError::MalformedUpstreamResponse(_))
        ));
    }

    #[test]
    fn test_null_or_absent_doc_is_malformed() {
        for record in [json!({ "id": "B-003", "doc": null }), json!({ "id": "B-003" })] {
            let envelope: ChangeEnvelope =
                serde_json::from_value(json!({ "results": [record] })).unwrap();

            let err = envelope.into_first_doc().unwrap_err();
            assert!(err.to_string().contains("B-003"));
        }
    }

    #[test]
    fn test_query_params() {
        assert_eq!(
            ChangeQuery.params(),
            [("feed", "longpoll"), ("since", "now"), ("include_docs", "true")]
        );
    }
}
