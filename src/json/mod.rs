//! JSON codec for the archive protocol, backed by `serde_json::Value`.
//!
//! Used for human-readable dumps and for authoring test fixtures. Documents
//! are built and walked in memory; use the MessagePack codec for streaming.

mod reader;
mod writer;

pub use reader::*;
pub use writer::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::transcode;
    use serde_json::json;

    #[test]
    fn test_json_transcode_identity() {
        let doc = json!({
            "id": 3,
            "tags": ["x", "y"],
            "nested": {"ok": true, "ratio": -0.25, "none": null}
        });
        let mut r = JsonReader::new(doc.clone());
        let mut w = JsonWriter::new();
        transcode(&mut r, &mut w).unwrap();
        assert_eq!(w.into_value().unwrap(), doc);
    }
}
