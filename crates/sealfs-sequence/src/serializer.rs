//! On-disk format of the sequence store

use serde::{Deserialize, Serialize};
use sealfs_core::{NonceSequence, SealError, SealResult};

use crate::table::SequenceTable;

/// Converts a table to and from the text stored by `FileSequencer`.
pub trait SequenceSerializer: Send + Sync {
    fn serialize(&self, table: &SequenceTable) -> SealResult<String>;
    fn deserialize(&self, contents: &str) -> SealResult<SequenceTable>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SequenceDocument {
    #[serde(default)]
    sequences: Vec<NonceSequence>,
}

/// Pretty-printed JSON: `{ "sequences": [ ... ] }`
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSequenceSerializer;

impl SequenceSerializer for JsonSequenceSerializer {
    fn serialize(&self, table: &SequenceTable) -> SealResult<String> {
        let doc = SequenceDocument {
            sequences: table.sequences().cloned().collect(),
        };
        serde_json::to_string_pretty(&doc)
            .map_err(|e| SealError::Sequence(format!("serializing sequences: {e}")))
    }

    fn deserialize(&self, contents: &str) -> SealResult<SequenceTable> {
        if contents.trim().is_empty() {
            return Ok(SequenceTable::default());
        }
        let doc: SequenceDocument = serde_json::from_str(contents)
            .map_err(|e| SealError::Sequence(format!("parsing sequences: {e}")))?;
        Ok(SequenceTable::from_sequences(doc.sequences))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_roundtrip() {
        let mut table = SequenceTable::default();
        table.create("d1", "a1").unwrap();
        table.initialize("d1", "a1", 3, 9).unwrap();
        table.create("d2", "a2").unwrap();

        let serializer = JsonSequenceSerializer;
        let text = serializer.serialize(&table).unwrap();
        assert!(text.contains("\"sequences\""));
        assert_eq!(serializer.deserialize(&text).unwrap(), table);
    }

    #[test]
    fn test_empty_contents_is_empty_table() {
        assert!(JsonSequenceSerializer.deserialize("  \n").unwrap().is_empty());
    }

    #[test]
    fn test_garbage_is_sequence_error() {
        assert!(matches!(
            JsonSequenceSerializer.deserialize("{not json"),
            Err(SealError::Sequence(_))
        ));
    }
}
