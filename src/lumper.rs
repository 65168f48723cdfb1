//! The lump codec: a compact, versioned, compressed AST serialization used
//! as a load cache.
//!
//! File layout:
//!
//! ```text
//! 0..3   magic "LUMP"
//! 4      version (5)
//! ..     varint uncompressed payload size
//! ..     varint compressed payload size
//! ..     zstd-compressed payload
//! ```
//!
//! The payload is a varint top-level child count followed by the encoded
//! children of the `Program` root. Every node starts with one header byte:
//! bits 7..3 hold the node kind, bits 2..0 a small child count where 7 means
//! the true count follows as a varint.

use std::fs;
use std::path::Path;

use crate::ast::{BinOp, Node, NodeKind, Primitive};
use crate::error::{LumError, LumResult};

pub const LUMP_MAGIC: &[u8; 4] = b"LUMP";
pub const LUMP_VERSION: u8 = 5;

const MAX_PAYLOAD: u64 = 1 << 30;
const MAX_CHILDREN: u64 = 10_000_000;
const MAX_STRING: u64 = 100 * 1024 * 1024;
const MAX_DEPTH: usize = 2000;

/// Serialize a `Program` into lump file bytes.
pub fn lump(program: &Node) -> LumResult<Vec<u8>> {
    if program.kind != NodeKind::Program {
        return Err(LumError::codec("Can only lump a program root"));
    }

    let mut payload = Vec::new();
    write_varint(&mut payload, program.children.len() as u64);
    for child in &program.children {
        encode_node(child, &mut payload)?;
    }
    if payload.len() as u64 > MAX_PAYLOAD {
        return Err(LumError::codec("Payload exceeds the 1 GiB lump limit"));
    }

    let compressed = zstd::bulk::compress(&payload, zstd::DEFAULT_COMPRESSION_LEVEL)
        .map_err(|e| LumError::codec(format!("Compression failed: {e}")))?;

    let mut out = Vec::with_capacity(compressed.len() + 16);
    out.extend_from_slice(LUMP_MAGIC);
    out.push(LUMP_VERSION);
    write_varint(&mut out, payload.len() as u64);
    write_varint(&mut out, compressed.len() as u64);
    out.extend_from_slice(&compressed);
    Ok(out)
}

pub fn lump_to_file(program: &Node, path: impl AsRef<Path>) -> LumResult<()> {
    let bytes = lump(program)?;
    fs::write(path, bytes)?;
    Ok(())
}

/// Decode lump file bytes back into a `Program` node.
pub fn unlump(bytes: &[u8]) -> LumResult<Node> {
    let mut reader = Reader::new(bytes);

    let magic = reader.take(4)?;
    if magic != LUMP_MAGIC {
        return Err(LumError::codec("Invalid LUMP file magic"));
    }
    let version = reader.byte()?;
    if version != LUMP_VERSION {
        return Err(LumError::codec(format!(
            "Unsupported LUMP version: {version} (expected {LUMP_VERSION})"
        )));
    }

    let uncompressed_size = reader.varint()?;
    if uncompressed_size == 0 || uncompressed_size > MAX_PAYLOAD {
        return Err(LumError::codec("Declared payload size out of bounds"));
    }
    let compressed_size = reader.varint()?;
    if compressed_size == 0 || compressed_size > MAX_PAYLOAD {
        return Err(LumError::codec("Declared compressed size out of bounds"));
    }
    let compressed = reader.take(compressed_size as usize)?;
    if !reader.at_end() {
        return Err(LumError::codec("Trailing garbage after compressed payload"));
    }

    let payload = zstd::bulk::decompress(compressed, uncompressed_size as usize)
        .map_err(|e| LumError::codec(format!("Decompression failed: {e}")))?;
    if payload.len() as u64 != uncompressed_size {
        return Err(LumError::codec("Payload size does not match declaration"));
    }

    let mut reader = Reader::new(&payload);
    let top_count = reader.varint()?;
    if top_count > MAX_CHILDREN {
        return Err(LumError::codec("Top-level child count out of bounds"));
    }

    let mut program = Node::new(NodeKind::Program);
    for _ in 0..top_count {
        program.push(decode_node(&mut reader, 0)?);
    }
    if !reader.at_end() {
        return Err(LumError::codec("Trailing garbage after encoded nodes"));
    }
    Ok(program)
}

pub fn unlump_file(path: impl AsRef<Path>) -> LumResult<Node> {
    let bytes = fs::read(path)?;
    unlump(&bytes)
}

/// Kinds that carry a one-byte operator payload.
fn has_op_byte(kind: NodeKind) -> bool {
    matches!(kind, NodeKind::BinaryOp | NodeKind::UnaryOp)
}

/// Kinds that carry a one-byte primitive-type payload.
fn has_primitive_byte(kind: NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::Number
            | NodeKind::Bool
            | NodeKind::String
            | NodeKind::SizedArrayDeclare
            | NodeKind::Function
            | NodeKind::PrimitiveAssign
    )
}

/// Kinds that serialize their string value.
fn has_str_value(kind: NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::Number
            | NodeKind::String
            | NodeKind::Identifier
            | NodeKind::PrimitiveAssign
            | NodeKind::ArrayAssign
            | NodeKind::NdArrayAssign
            | NodeKind::StructDeclare
            | NodeKind::StructAssign
            | NodeKind::Pragma
            | NodeKind::Bool
            | NodeKind::For
    )
}

fn encode_node(node: &Node, out: &mut Vec<u8>) -> LumResult<()> {
    let child_count = node.children.len();
    let small = if child_count < 7 { child_count as u8 } else { 7 };
    out.push((node.kind as u8) << 3 | small);

    if has_op_byte(node.kind) {
        let op = node
            .op
            .ok_or_else(|| LumError::codec("Operator node without an operator code"))?;
        out.push(op as u8);
    } else if has_primitive_byte(node.kind) {
        out.push(node.primitive as u8);
    }

    if node.kind == NodeKind::Function {
        write_string(out, &node.ret_type);
        write_string(out, &node.value);
    } else if has_str_value(node.kind) {
        write_string(out, &node.value);
    }

    if small == 7 {
        write_varint(out, child_count as u64);
    }
    for child in &node.children {
        encode_node(child, out)?;
    }
    Ok(())
}

fn decode_node(reader: &mut Reader, depth: usize) -> LumResult<Node> {
    if depth > MAX_DEPTH {
        return Err(LumError::codec("AST recursion depth limit exceeded"));
    }

    let header = reader.byte()?;
    let kind = NodeKind::from_u8(header >> 3)
        .ok_or_else(|| LumError::codec(format!("Invalid node kind: {}", header >> 3)))?;
    let small = header & 0b111;

    let mut node = Node::new(kind);

    if has_op_byte(kind) {
        let byte = reader.byte()?;
        node.op = Some(
            BinOp::from_u8(byte)
                .ok_or_else(|| LumError::codec(format!("Invalid operator code: {byte}")))?,
        );
    } else if has_primitive_byte(kind) {
        let byte = reader.byte()?;
        node.primitive = Primitive::from_u8(byte)
            .ok_or_else(|| LumError::codec(format!("Invalid primitive code: {byte}")))?;
    }

    if kind == NodeKind::Function {
        node.ret_type = read_string(reader)?;
        node.value = read_string(reader)?;
    } else if has_str_value(kind) {
        node.value = read_string(reader)?;
    }

    let child_count = if small == 7 {
        reader.varint()?
    } else {
        u64::from(small)
    };
    if child_count > MAX_CHILDREN {
        return Err(LumError::codec("Node child count out of bounds"));
    }

    for _ in 0..child_count {
        node.push(decode_node(reader, depth + 1)?);
    }
    Ok(node)
}

fn write_varint(out: &mut Vec<u8>, mut v: u64) {
    while v > 0x7F {
        out.push((v & 0x7F) as u8 | 0x80);
        v >>= 7;
    }
    out.push(v as u8);
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    write_varint(out, s.len() as u64);
    out.extend_from_slice(s.as_bytes());
}

fn read_string(reader: &mut Reader) -> LumResult<String> {
    let len = reader.varint()?;
    if len > MAX_STRING {
        return Err(LumError::codec("String length out of bounds"));
    }
    let bytes = reader.take(len as usize)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| LumError::codec("String is not valid UTF-8"))
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos == self.buf.len()
    }

    fn byte(&mut self) -> LumResult<u8> {
        let b = self
            .buf
            .get(self.pos)
            .copied()
            .ok_or_else(|| LumError::codec("Unexpected end of lump data"))?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> LumResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&e| e <= self.buf.len())
            .ok_or_else(|| LumError::codec("Unexpected end of lump data"))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn varint(&mut self) -> LumResult<u64> {
        let mut result: u64 = 0;
        let mut shift = 0;
        loop {
            let b = self.byte()?;
            if shift >= 63 && (b & 0x7F) > 1 {
                return Err(LumError::codec("Varint overflow"));
            }
            result |= u64::from(b & 0x7F) << shift;
            if b & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    fn roundtrip(source: &str) {
        let program = parse_program(source, "test.lum").unwrap();
        let bytes = lump(&program).unwrap();
        let decoded = unlump(&bytes).unwrap();
        assert_eq!(program, decoded, "round-trip mismatch for source: {source}");
    }

    #[test]
    fn roundtrip_preserves_structure() {
        roundtrip("int x = 2 + 3 * 4;");
        roundtrip("fin int main() { return -1; }");
        roundtrip("struct P { int x; int y; }; P p = {1, y: 2}; p.x = p.x + p.y;");
        roundtrip("int a[5] = [@, @+1, @+2, @+3, @+4]; a[0..2] = [10, 20, 30];");
        roundtrip("m{3,3}!! = @[0] * @[1];");
        roundtrip("import \"outstream\"; fin main() { print(\"hi\", true, nil); }");
        roundtrip("fin int sum(int xs...) { int s = 0; for (int x : xs) s = s + x; return s; }");
        roundtrip("native fin print(string content); link \"plugin.so\";");
        roundtrip("while (true) { if (1 < 2) x = @ - 1; else x = ~x; }");
    }

    #[test]
    fn roundtrip_handles_many_children() {
        // More than six top-level statements in a block forces the varint
        // child-count escape.
        let stmts: String = (0..40).map(|i| format!("int x{i} = {i};")).collect();
        roundtrip(&format!("fin main() {{ {stmts} }}"));
    }

    #[test]
    fn header_checks() {
        let program = parse_program("int x = 1;", "test.lum").unwrap();
        let good = lump(&program).unwrap();

        let mut bad_magic = good.clone();
        bad_magic[0] = b'X';
        assert!(matches!(unlump(&bad_magic), Err(LumError::Codec { .. })));

        let mut bad_version = good.clone();
        bad_version[4] = 4;
        assert!(matches!(unlump(&bad_version), Err(LumError::Codec { .. })));

        let mut trailing = good.clone();
        trailing.push(0);
        assert!(matches!(unlump(&trailing), Err(LumError::Codec { .. })));

        assert!(unlump(&good[..good.len() - 1]).is_err());
        assert!(unlump(b"LUM").is_err());
    }

    #[test]
    fn corrupt_payload_is_rejected() {
        let program = parse_program("int x = 1;", "test.lum").unwrap();
        let mut bytes = lump(&program).unwrap();
        let len = bytes.len();
        bytes[len - 1] ^= 0xFF;
        assert!(unlump(&bytes).is_err());
    }

    #[test]
    fn version_constant_matches_format() {
        let program = parse_program("int x = 1;", "test.lum").unwrap();
        let bytes = lump(&program).unwrap();
        assert_eq!(&bytes[0..4], b"LUMP");
        assert_eq!(bytes[4], 5);
    }
}
