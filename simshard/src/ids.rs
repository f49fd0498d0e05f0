//! Compound vector identifiers.
//!
//! A vector id packs a document id and a sentence ordinal into one `i64`:
//! `vector_id = doc_id * DOC_ID_STRIDE + sent_id`. Ids `<= 0` are sentinels
//! (empty scanner slots) and never reach callers.

/// Sentence ordinals per document. Changing this requires a full rebuild of
/// every shard in a deployment.
pub const DOC_ID_STRIDE: i64 = 10_000;

/// Split a vector id into `(doc_id, sent_id)`.
pub fn split_vector_id(vector_id: i64) -> (i64, i64) {
    (vector_id / DOC_ID_STRIDE, vector_id % DOC_ID_STRIDE)
}

/// Compose a vector id from a document id and a sentence ordinal.
pub fn make_vector_id(doc_id: i64, sent_id: i64) -> i64 {
    doc_id * DOC_ID_STRIDE + sent_id
}
