// Offset Keys
//
// An offset key is a continuation token describing the position of every node
// of an enumerator tree. Layout, all integers big endian:
//
//   header:  version u8 | unique_query_id u64 | section_count u8 | total_len u32
//   section: node_id u8 | node_type u8 | payload_len u16 | payload
//
// Sections are written in post-order, so node ids are strictly increasing.
// The query id only identifies the producer; a key replays into any tree of
// the same shape, which node ids and node types guard.

use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::common::types::{NodeId, UniqueQueryId};
use crate::query::executor::operators::EnumeratorNodeType;
use crate::query::executor::result::{QueryError, QueryResult};

pub const OFFSET_KEY_VERSION: u8 = 1;
pub const HEADER_LEN: usize = 14;
const SECTION_HEADER_LEN: usize = 4;

fn invalid(reason: impl Into<String>) -> QueryError {
    QueryError::InvalidOffsetKey(reason.into())
}

/// Builder for one node's payload
#[derive(Debug, Default)]
pub struct PayloadWriter {
    buffer: Vec<u8>,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u8(&mut self, value: u8) -> QueryResult<()> {
        self.buffer
            .write_u8(value)
            .map_err(|e| QueryError::Internal(format!("Offset key write failed: {}", e)))
    }

    pub fn put_u64(&mut self, value: u64) -> QueryResult<()> {
        self.buffer
            .write_u64::<BigEndian>(value)
            .map_err(|e| QueryError::Internal(format!("Offset key write failed: {}", e)))
    }

    /// Length-prefixed byte string
    pub fn put_bytes(&mut self, bytes: &[u8]) -> QueryResult<()> {
        let len = u16::try_from(bytes.len())
            .map_err(|_| QueryError::Internal(format!("Offset key field of {} bytes", bytes.len())))?;
        self.buffer
            .write_u16::<BigEndian>(len)
            .map_err(|e| QueryError::Internal(format!("Offset key write failed: {}", e)))?;
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

#[derive(Debug)]
struct Section {
    node_id: NodeId,
    node_type: EnumeratorNodeType,
    payload: Vec<u8>,
}

/// Collects node sections and serializes the key
#[derive(Debug)]
pub struct OffsetKeyWriter {
    unique_query_id: UniqueQueryId,
    sections: Vec<Section>,
}

impl OffsetKeyWriter {
    pub fn new(unique_query_id: UniqueQueryId) -> Self {
        OffsetKeyWriter {
            unique_query_id,
            sections: Vec::new(),
        }
    }

    /// Append the section of one node; node ids must be strictly increasing
    pub fn add_section(&mut self, node_id: NodeId, node_type: EnumeratorNodeType, payload: PayloadWriter) -> QueryResult<()> {
        if let Some(last) = self.sections.last() {
            if last.node_id >= node_id {
                return Err(QueryError::Internal(format!(
                    "Offset key section {} written after section {}",
                    node_id, last.node_id
                )));
            }
        }
        self.sections.push(Section {
            node_id,
            node_type,
            payload: payload.into_bytes(),
        });
        Ok(())
    }

    pub fn finish(self) -> QueryResult<Vec<u8>> {
        let count = u8::try_from(self.sections.len())
            .map_err(|_| QueryError::Internal(format!("{} offset key sections", self.sections.len())))?;
        let total = HEADER_LEN
            + self
                .sections
                .iter()
                .map(|section| SECTION_HEADER_LEN + section.payload.len())
                .sum::<usize>();
        let total_len = u32::try_from(total).map_err(|_| QueryError::Internal(format!("Offset key of {} bytes", total)))?;

        let io = |e: std::io::Error| QueryError::Internal(format!("Offset key write failed: {}", e));
        let mut out = Vec::with_capacity(total);
        out.write_u8(OFFSET_KEY_VERSION).map_err(io)?;
        out.write_u64::<BigEndian>(self.unique_query_id).map_err(io)?;
        out.write_u8(count).map_err(io)?;
        out.write_u32::<BigEndian>(total_len).map_err(io)?;
        for section in self.sections {
            let payload_len = u16::try_from(section.payload.len())
                .map_err(|_| QueryError::Internal(format!("Offset key payload of {} bytes", section.payload.len())))?;
            out.write_u8(section.node_id).map_err(io)?;
            out.write_u8(section.node_type as u8).map_err(io)?;
            out.write_u16::<BigEndian>(payload_len).map_err(io)?;
            out.extend_from_slice(&section.payload);
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy)]
struct SectionView<'a> {
    node_id: NodeId,
    node_type: EnumeratorNodeType,
    payload: &'a [u8],
}

/// Validated view over an offset key, consumed section by section
#[derive(Debug)]
pub struct OffsetKeyReader<'a> {
    query_id: UniqueQueryId,
    sections: Vec<SectionView<'a>>,
    position: usize,
}

impl<'a> OffsetKeyReader<'a> {
    /// Check the header and split the key into sections
    pub fn parse(bytes: &'a [u8]) -> QueryResult<Self> {
        let truncated = |_| invalid("truncated header");
        let mut cursor = Cursor::new(bytes);
        let version = cursor.read_u8().map_err(truncated)?;
        if version != OFFSET_KEY_VERSION {
            return Err(invalid(format!("unsupported version {}", version)));
        }
        let query_id = cursor.read_u64::<BigEndian>().map_err(truncated)?;
        let count = cursor.read_u8().map_err(truncated)?;
        let total_len = cursor.read_u32::<BigEndian>().map_err(truncated)?;
        if total_len as usize != bytes.len() {
            return Err(invalid(format!("length {} but header says {}", bytes.len(), total_len)));
        }

        let mut sections = Vec::with_capacity(count as usize);
        let mut offset = HEADER_LEN;
        for _ in 0..count {
            let header = bytes
                .get(offset..offset + SECTION_HEADER_LEN)
                .ok_or_else(|| invalid("truncated section header"))?;
            let node_id = header[0];
            let node_type = EnumeratorNodeType::from_u8(header[1]).ok_or_else(|| invalid(format!("unknown node type {}", header[1])))?;
            let payload_len = u16::from_be_bytes([header[2], header[3]]) as usize;
            offset += SECTION_HEADER_LEN;
            let payload = bytes
                .get(offset..offset + payload_len)
                .ok_or_else(|| invalid(format!("truncated payload of node {}", node_id)))?;
            offset += payload_len;
            if let Some(previous) = sections.last().map(|s: &SectionView<'_>| s.node_id) {
                if node_id <= previous {
                    return Err(invalid(format!("node {} follows node {}", node_id, previous)));
                }
            }
            sections.push(SectionView {
                node_id,
                node_type,
                payload,
            });
        }
        if offset != bytes.len() {
            return Err(invalid(format!("{} trailing bytes", bytes.len() - offset)));
        }
        Ok(OffsetKeyReader {
            query_id,
            sections,
            position: 0,
        })
    }

    /// Id of the query that produced the key
    pub fn query_id(&self) -> UniqueQueryId {
        self.query_id
    }

    /// Next section, which must belong to the given node
    pub fn next_section(&mut self, node_id: NodeId, node_type: EnumeratorNodeType) -> QueryResult<SectionReader<'a>> {
        let section = self
            .sections
            .get(self.position)
            .copied()
            .ok_or_else(|| invalid(format!("no section for node {}", node_id)))?;
        if section.node_id != node_id {
            return Err(invalid(format!("expected node {}, found node {}", node_id, section.node_id)));
        }
        if section.node_type != node_type {
            return Err(invalid(format!(
                "node {} is a {:?}, key describes a {:?}",
                node_id, node_type, section.node_type
            )));
        }
        self.position += 1;
        Ok(SectionReader {
            node_id,
            cursor: Cursor::new(section.payload),
        })
    }

    /// Fails when sections remain unread
    pub fn finish(&self) -> QueryResult<()> {
        if self.position != self.sections.len() {
            return Err(invalid(format!(
                "{} of {} sections were not used",
                self.sections.len() - self.position,
                self.sections.len()
            )));
        }
        Ok(())
    }

    /// `(node_id, node_type)` of every section in key order
    pub fn layout(&self) -> Vec<(NodeId, EnumeratorNodeType)> {
        self.sections.iter().map(|s| (s.node_id, s.node_type)).collect()
    }
}

/// Reader over one node's payload
#[derive(Debug)]
pub struct SectionReader<'a> {
    node_id: NodeId,
    cursor: Cursor<&'a [u8]>,
}

impl SectionReader<'_> {
    fn truncated(&self) -> QueryError {
        invalid(format!("truncated payload of node {}", self.node_id))
    }

    pub fn read_u8(&mut self) -> QueryResult<u8> {
        self.cursor.read_u8().map_err(|_| self.truncated())
    }

    pub fn read_u64(&mut self) -> QueryResult<u64> {
        self.cursor.read_u64::<BigEndian>().map_err(|_| self.truncated())
    }

    pub fn read_bytes(&mut self) -> QueryResult<Vec<u8>> {
        let len = self.cursor.read_u16::<BigEndian>().map_err(|_| self.truncated())? as usize;
        let mut bytes = vec![0; len];
        self.cursor.read_exact(&mut bytes).map_err(|_| self.truncated())?;
        Ok(bytes)
    }

    /// Fails when payload bytes remain unread
    pub fn finish(self) -> QueryResult<()> {
        let remaining = self.cursor.get_ref().len() as u64 - self.cursor.position();
        if remaining != 0 {
            return Err(invalid(format!("{} extra payload bytes for node {}", remaining, self.node_id)));
        }
        Ok(())
    }
}
