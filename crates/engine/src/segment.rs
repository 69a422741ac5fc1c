//! Immutable index segments
//!
//! A segment holds a fixed set of documents: their stored entry keys, their
//! key terms (for delete/update-by-term), per-field token counts and the
//! per-(field, term) posting lists. Deletes are not recorded here; the writer
//! tracks them as per-segment tombstone sets.
//!
//! ## File Format (`seg_<id>.tseg`)
//!
//! ```text
//!   magic "TSEG"           4B
//!   version                 u32 LE
//!   payload                 MessagePack (named fields)
//!   crc32(payload)          u32 LE
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tessera_core::{EntryKey, Error, Result};

/// Magic bytes for segment files
const SEGMENT_MAGIC: &[u8; 4] = b"TSEG";
/// Current format version
const SEGMENT_VERSION: u32 = 1;
/// Per-posting overhead used for size estimates
const POSTING_BYTES: u64 = 8;

/// Entry in a posting list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    /// Segment-local document number
    pub doc: u32,
    /// Term frequency in this document's field
    pub tf: u32,
}

/// A document after analysis, ready to be buffered by the writer
#[derive(Debug, Clone)]
pub struct AnalyzedDocument {
    /// Stored entry key
    pub key: EntryKey,
    /// Untokenized key term
    pub key_term: String,
    /// (field, terms) pairs
    pub fields: Vec<(String, Vec<String>)>,
}

impl AnalyzedDocument {
    /// Rough heap footprint, used for RAM-buffer accounting
    pub fn estimated_bytes(&self) -> usize {
        let terms: usize = self
            .fields
            .iter()
            .map(|(f, ts)| f.len() + ts.iter().map(|t| t.len() + 16).sum::<usize>())
            .sum();
        self.key.len() + self.key_term.len() + terms + 64
    }
}

/// Serialized body of a segment
#[derive(Serialize, Deserialize)]
struct SegmentData {
    segment_id: u64,
    keys: Vec<EntryKey>,
    key_terms: Vec<String>,
    /// field -> token count per doc
    field_lengths: BTreeMap<String, Vec<u32>>,
    /// field -> term -> postings (ascending doc)
    postings: BTreeMap<String, BTreeMap<String, Vec<Posting>>>,
}

/// An immutable, searchable segment
pub struct Segment {
    data: SegmentData,
    /// key term -> docs carrying it
    key_index: HashMap<String, Vec<u32>>,
    size_bytes: u64,
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("segment_id", &self.data.segment_id)
            .field("doc_count", &self.doc_count())
            .field("size_bytes", &self.size_bytes)
            .finish()
    }
}

impl Segment {
    fn from_data(data: SegmentData) -> Self {
        let mut key_index: HashMap<String, Vec<u32>> = HashMap::new();
        for (doc, term) in data.key_terms.iter().enumerate() {
            key_index.entry(term.clone()).or_default().push(doc as u32);
        }

        let mut size_bytes: u64 = 0;
        for (key, term) in data.keys.iter().zip(&data.key_terms) {
            size_bytes += (key.len() + term.len()) as u64;
        }
        for lengths in data.field_lengths.values() {
            size_bytes += lengths.len() as u64 * 4;
        }
        for terms in data.postings.values() {
            for (term, postings) in terms {
                size_bytes += term.len() as u64 + postings.len() as u64 * POSTING_BYTES;
            }
        }

        Segment {
            data,
            key_index,
            size_bytes,
        }
    }

    /// Build a segment from buffered documents (doc numbers follow buffer order)
    pub fn build(segment_id: u64, docs: Vec<AnalyzedDocument>) -> Self {
        let doc_count = docs.len();
        let mut keys = Vec::with_capacity(doc_count);
        let mut key_terms = Vec::with_capacity(doc_count);
        let mut field_lengths: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        let mut postings: BTreeMap<String, BTreeMap<String, Vec<Posting>>> = BTreeMap::new();

        for (doc_idx, doc) in docs.into_iter().enumerate() {
            // Group term frequencies per field so repeated fields fold together
            let mut per_field: BTreeMap<String, HashMap<String, u32>> = BTreeMap::new();
            for (field, tokens) in doc.fields {
                let lengths = field_lengths
                    .entry(field.clone())
                    .or_insert_with(|| vec![0; doc_count]);
                lengths[doc_idx] += tokens.len() as u32;
                let tf_map = per_field.entry(field).or_default();
                for token in tokens {
                    *tf_map.entry(token).or_insert(0) += 1;
                }
            }
            for (field, tf_map) in per_field {
                let field_postings = postings.entry(field).or_default();
                for (term, tf) in tf_map {
                    field_postings.entry(term).or_default().push(Posting {
                        doc: doc_idx as u32,
                        tf,
                    });
                }
            }
            keys.push(doc.key);
            key_terms.push(doc.key_term);
        }

        Self::from_data(SegmentData {
            segment_id,
            keys,
            key_terms,
            field_lengths,
            postings,
        })
    }

    /// Merge the live documents of `sources` into one new segment.
    ///
    /// Documents keep their relative order: all live docs of the first source,
    /// then the second, and so on.
    pub fn merge(segment_id: u64, sources: &[(&Segment, &HashSet<u32>)]) -> Self {
        let mut remap: Vec<Vec<Option<u32>>> = Vec::with_capacity(sources.len());
        let mut keys = Vec::new();
        let mut key_terms = Vec::new();
        let mut next: u32 = 0;
        for (seg, deletes) in sources {
            let mut map = Vec::with_capacity(seg.doc_count());
            for doc in 0..seg.doc_count() as u32 {
                if deletes.contains(&doc) {
                    map.push(None);
                } else {
                    map.push(Some(next));
                    keys.push(seg.data.keys[doc as usize].clone());
                    key_terms.push(seg.data.key_terms[doc as usize].clone());
                    next += 1;
                }
            }
            remap.push(map);
        }
        let total = next as usize;

        let mut field_lengths: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        let mut postings: BTreeMap<String, BTreeMap<String, Vec<Posting>>> = BTreeMap::new();
        for ((seg, _), map) in sources.iter().zip(&remap) {
            for (field, lengths) in &seg.data.field_lengths {
                let merged = field_lengths
                    .entry(field.clone())
                    .or_insert_with(|| vec![0; total]);
                for (old, len) in lengths.iter().enumerate() {
                    if let Some(new) = map[old] {
                        merged[new as usize] = *len;
                    }
                }
            }
            for (field, terms) in &seg.data.postings {
                let field_postings = postings.entry(field.clone()).or_default();
                for (term, list) in terms {
                    let live: Vec<Posting> = list
                        .iter()
                        .filter_map(|p| {
                            map[p.doc as usize].map(|doc| Posting { doc, tf: p.tf })
                        })
                        .collect();
                    if !live.is_empty() {
                        field_postings
                            .entry(term.clone())
                            .or_default()
                            .extend(live);
                    }
                }
            }
        }
        postings.retain(|_, terms| !terms.is_empty());

        Self::from_data(SegmentData {
            segment_id,
            keys,
            key_terms,
            field_lengths,
            postings,
        })
    }

    /// Segment identifier
    pub fn id(&self) -> u64 {
        self.data.segment_id
    }

    /// Number of documents (live or deleted)
    pub fn doc_count(&self) -> usize {
        self.data.keys.len()
    }

    /// Estimated encoded size, used by the merge policy
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Stored key of a document
    pub fn key(&self, doc: u32) -> Option<&EntryKey> {
        self.data.keys.get(doc as usize)
    }

    /// Documents carrying a key term
    pub fn docs_for_key_term(&self, key_term: &str) -> &[u32] {
        self.key_index
            .get(key_term)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Posting list of a term in a field
    pub fn postings(&self, field: &str, term: &str) -> Option<&[Posting]> {
        self.data
            .postings
            .get(field)
            .and_then(|terms| terms.get(term))
            .map(|v| v.as_slice())
    }

    /// Token count of a document's field (0 when absent)
    pub fn field_length(&self, field: &str, doc: u32) -> u32 {
        self.data
            .field_lengths
            .get(field)
            .and_then(|lengths| lengths.get(doc as usize))
            .copied()
            .unwrap_or(0)
    }

    /// Sum of field lengths over live documents
    pub fn live_field_length(&self, field: &str, deletes: &HashSet<u32>) -> u64 {
        match self.data.field_lengths.get(field) {
            Some(lengths) => lengths
                .iter()
                .enumerate()
                .filter(|(doc, _)| !deletes.contains(&(*doc as u32)))
                .map(|(_, len)| *len as u64)
                .sum(),
            None => 0,
        }
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    /// File name of a segment on the backend
    pub fn file_name(segment_id: u64) -> String {
        format!("seg_{}.tseg", segment_id)
    }

    /// Parse a segment id out of a backend file name
    pub fn parse_file_name(name: &str) -> Option<u64> {
        name.strip_prefix("seg_")?.strip_suffix(".tseg")?.parse().ok()
    }

    /// Encode to the on-backend format
    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload = rmp_serde::to_vec_named(&self.data)?;
        let mut buf = Vec::with_capacity(12 + payload.len());
        buf.extend_from_slice(SEGMENT_MAGIC);
        buf.extend_from_slice(&SEGMENT_VERSION.to_le_bytes());
        buf.extend_from_slice(&payload);
        buf.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        Ok(buf)
    }

    /// Decode from the on-backend format
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < 12 {
            return Err(Error::corruption("segment too small"));
        }
        if &buf[0..4] != SEGMENT_MAGIC {
            return Err(Error::corruption("bad segment magic"));
        }
        let version = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        if version != SEGMENT_VERSION {
            return Err(Error::corruption(format!(
                "unsupported segment version {}",
                version
            )));
        }
        let (payload, trailer) = buf[8..].split_at(buf.len() - 12);
        let expected = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        if crc32fast::hash(payload) != expected {
            return Err(Error::corruption("segment checksum mismatch"));
        }
        let data: SegmentData = rmp_serde::from_slice(payload)?;
        Ok(Self::from_data(data))
    }
}
