// ─── NBT ───
// Uncompressed big-endian NBT, as used by `servers.dat`. Decoding keeps
// everything needed to re-encode the exact input bytes: compound key order,
// list element types (even for empty lists), float bit patterns, and strings
// as raw modified-UTF-8.

use std::fmt;

use crate::core::error::{LauncherError, LauncherResult};

const MAX_DEPTH: usize = 512;

/// Raw modified-UTF-8 string bytes.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct MString(Vec<u8>);

impl MString {
    pub fn from_raw(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_string_lossy(&self) -> String {
        decode_mutf8(&self.0)
    }
}

impl From<&str> for MString {
    fn from(value: &str) -> Self {
        Self(encode_mutf8(value))
    }
}

impl fmt::Debug for MString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_string_lossy())
    }
}

/// Java's encoding: NUL as `C0 80`, supplementary characters as two
/// three-byte surrogates.
fn encode_mutf8(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for ch in value.chars() {
        match ch as u32 {
            0 => out.extend_from_slice(&[0xC0, 0x80]),
            0x10000.. => {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    let u = *unit as u32;
                    out.push((0xE0 | (u >> 12)) as u8);
                    out.push((0x80 | ((u >> 6) & 0x3F)) as u8);
                    out.push((0x80 | (u & 0x3F)) as u8);
                }
            }
            _ => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    out
}

fn decode_mutf8(bytes: &[u8]) -> String {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let (unit, width) = if b < 0x80 {
            (b as u16, 1)
        } else if b & 0xE0 == 0xC0 && i + 1 < bytes.len() {
            ((((b & 0x1F) as u16) << 6) | (bytes[i + 1] & 0x3F) as u16, 2)
        } else if b & 0xF0 == 0xE0 && i + 2 < bytes.len() {
            (
                (((b & 0x0F) as u16) << 12)
                    | (((bytes[i + 1] & 0x3F) as u16) << 6)
                    | (bytes[i + 2] & 0x3F) as u16,
                3,
            )
        } else {
            (0xFFFD, 1)
        };
        units.push(unit);
        i += width;
    }
    String::from_utf16_lossy(&units)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    ByteArray(Vec<i8>),
    String(MString),
    /// Element type id plus items; the id survives for empty lists.
    List(u8, Vec<Tag>),
    Compound(Compound),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
}

impl Tag {
    pub fn string(value: &str) -> Self {
        Tag::String(MString::from(value))
    }

    pub fn id(&self) -> u8 {
        match self {
            Tag::Byte(_) => 1,
            Tag::Short(_) => 2,
            Tag::Int(_) => 3,
            Tag::Long(_) => 4,
            Tag::Float(_) => 5,
            Tag::Double(_) => 6,
            Tag::ByteArray(_) => 7,
            Tag::String(_) => 8,
            Tag::List(..) => 9,
            Tag::Compound(_) => 10,
            Tag::IntArray(_) => 11,
            Tag::LongArray(_) => 12,
        }
    }

    pub fn as_str(&self) -> Option<String> {
        match self {
            Tag::String(s) => Some(s.to_string_lossy()),
            _ => None,
        }
    }

    pub fn as_compound(&self) -> Option<&Compound> {
        match self {
            Tag::Compound(c) => Some(c),
            _ => None,
        }
    }
}

/// Ordered name/tag pairs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Compound(pub Vec<(MString, Tag)>);

impl Compound {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Tag> {
        let key = MString::from(name);
        self.0.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Tag> {
        let key = MString::from(name);
        self.0.iter_mut().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// Replace in place, or append. Returns whether anything changed.
    pub fn set(&mut self, name: &str, tag: Tag) -> bool {
        match self.get_mut(name) {
            Some(existing) if *existing == tag => false,
            Some(existing) => {
                *existing = tag;
                true
            }
            None => {
                self.0.push((MString::from(name), tag));
                true
            }
        }
    }
}

/// A root named tag.
#[derive(Debug, Clone, PartialEq)]
pub struct NbtDocument {
    pub name: MString,
    pub root: Tag,
}

impl NbtDocument {
    pub fn empty_compound() -> Self {
        Self {
            name: MString::default(),
            root: Tag::Compound(Compound::new()),
        }
    }

    pub fn decode(bytes: &[u8]) -> LauncherResult<Self> {
        if bytes.starts_with(&[0x1f, 0x8b]) {
            return Err(nbt_error("compressed NBT is not supported"));
        }
        let mut reader = Reader { bytes, pos: 0 };
        let id = reader.u8()?;
        if id == 0 {
            return Err(nbt_error("root tag is TAG_End"));
        }
        let name = reader.string()?;
        let root = reader.payload(id, 0)?;
        if reader.pos != bytes.len() {
            return Err(nbt_error(format!(
                "{} trailing bytes",
                bytes.len() - reader.pos
            )));
        }
        Ok(Self { name, root })
    }

    pub fn encode(&self) -> LauncherResult<Vec<u8>> {
        let mut out = vec![self.root.id()];
        write_string(&mut out, &self.name)?;
        write_payload(&mut out, &self.root)?;
        Ok(out)
    }
}

fn nbt_error(message: impl Into<String>) -> LauncherError {
    LauncherError::Nbt(message.into())
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> LauncherResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| nbt_error(format!("unexpected end of data at byte {}", self.pos)))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> LauncherResult<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    fn u8(&mut self) -> LauncherResult<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn len(&mut self) -> LauncherResult<usize> {
        let n = i32::from_be_bytes(self.array()?);
        usize::try_from(n).map_err(|_| nbt_error(format!("negative length {}", n)))
    }

    fn string(&mut self) -> LauncherResult<MString> {
        let len = u16::from_be_bytes(self.array()?) as usize;
        Ok(MString::from_raw(self.take(len)?.to_vec()))
    }

    fn payload(&mut self, id: u8, depth: usize) -> LauncherResult<Tag> {
        if depth > MAX_DEPTH {
            return Err(nbt_error("nesting too deep"));
        }
        Ok(match id {
            1 => Tag::Byte(i8::from_be_bytes(self.array()?)),
            2 => Tag::Short(i16::from_be_bytes(self.array()?)),
            3 => Tag::Int(i32::from_be_bytes(self.array()?)),
            4 => Tag::Long(i64::from_be_bytes(self.array()?)),
            5 => Tag::Float(f32::from_bits(u32::from_be_bytes(self.array()?))),
            6 => Tag::Double(f64::from_bits(u64::from_be_bytes(self.array()?))),
            7 => {
                let len = self.len()?;
                Tag::ByteArray(self.take(len)?.iter().map(|b| *b as i8).collect())
            }
            8 => Tag::String(self.string()?),
            9 => {
                let element = self.u8()?;
                let len = self.len()?;
                if element == 0 && len > 0 {
                    return Err(nbt_error("non-empty list of TAG_End"));
                }
                let mut items = Vec::with_capacity(len.min(4096));
                for _ in 0..len {
                    items.push(self.payload(element, depth + 1)?);
                }
                Tag::List(element, items)
            }
            10 => {
                let mut compound = Compound::new();
                loop {
                    let child = self.u8()?;
                    if child == 0 {
                        break;
                    }
                    let name = self.string()?;
                    let value = self.payload(child, depth + 1)?;
                    compound.0.push((name, value));
                }
                Tag::Compound(compound)
            }
            11 => {
                let len = self.len()?;
                let mut values = Vec::with_capacity(len.min(4096));
                for _ in 0..len {
                    values.push(i32::from_be_bytes(self.array()?));
                }
                Tag::IntArray(values)
            }
            12 => {
                let len = self.len()?;
                let mut values = Vec::with_capacity(len.min(4096));
                for _ in 0..len {
                    values.push(i64::from_be_bytes(self.array()?));
                }
                Tag::LongArray(values)
            }
            other => return Err(nbt_error(format!("unknown tag id {}", other))),
        })
    }
}

fn write_len(out: &mut Vec<u8>, len: usize) -> LauncherResult<()> {
    let len = i32::try_from(len).map_err(|_| nbt_error("array too long"))?;
    out.extend_from_slice(&len.to_be_bytes());
    Ok(())
}

fn write_string(out: &mut Vec<u8>, value: &MString) -> LauncherResult<()> {
    let len = u16::try_from(value.as_bytes().len()).map_err(|_| nbt_error("string too long"))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

fn write_payload(out: &mut Vec<u8>, tag: &Tag) -> LauncherResult<()> {
    match tag {
        Tag::Byte(v) => out.extend_from_slice(&v.to_be_bytes()),
        Tag::Short(v) => out.extend_from_slice(&v.to_be_bytes()),
        Tag::Int(v) => out.extend_from_slice(&v.to_be_bytes()),
        Tag::Long(v) => out.extend_from_slice(&v.to_be_bytes()),
        Tag::Float(v) => out.extend_from_slice(&v.to_bits().to_be_bytes()),
        Tag::Double(v) => out.extend_from_slice(&v.to_bits().to_be_bytes()),
        Tag::ByteArray(values) => {
            write_len(out, values.len())?;
            out.extend(values.iter().map(|b| *b as u8));
        }
        Tag::String(s) => write_string(out, s)?,
        Tag::List(element, items) => {
            if let Some(bad) = items.iter().find(|t| t.id() != *element) {
                return Err(nbt_error(format!(
                    "list of type {} holds a tag of type {}",
                    element,
                    bad.id()
                )));
            }
            out.push(*element);
            write_len(out, items.len())?;
            for item in items {
                write_payload(out, item)?;
            }
        }
        Tag::Compound(compound) => {
            for (name, value) in &compound.0 {
                out.push(value.id());
                write_string(out, name)?;
                write_payload(out, value)?;
            }
            out.push(0);
        }
        Tag::IntArray(values) => {
            write_len(out, values.len())?;
            for v in values {
                out.extend_from_slice(&v.to_be_bytes());
            }
        }
        Tag::LongArray(values) => {
            write_len(out, values.len())?;
            for v in values {
                out.extend_from_slice(&v.to_be_bytes());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NbtDocument {
        let mut server = Compound::new();
        server.set("icon", Tag::string("iVBORw0KGgo="));
        server.set("ip", Tag::string("play.example.net"));
        server.set("name", Tag::string("Example \u{1F600}"));
        server.set("acceptTextures", Tag::Byte(1));

        let mut root = Compound::new();
        root.set("servers", Tag::List(10, vec![Tag::Compound(server)]));
        root.set("empty", Tag::List(0, Vec::new()));
        root.set("nan", Tag::Float(f32::from_bits(0x7fc0_0001)));
        root.set("ints", Tag::IntArray(vec![1, -2, 3]));
        root.set("longs", Tag::LongArray(vec![i64::MIN]));
        root.set("bytes", Tag::ByteArray(vec![-1, 0, 1]));
        NbtDocument {
            name: MString::default(),
            root: Tag::Compound(root),
        }
    }

    #[test]
    fn decoding_then_encoding_reproduces_the_input() {
        let bytes = sample().encode().unwrap();
        let decoded = NbtDocument::decode(&bytes).unwrap();
        assert_eq!(decoded.encode().unwrap(), bytes);

        let servers = decoded.root.as_compound().unwrap().get("servers").unwrap();
        let Tag::List(10, items) = servers else {
            panic!("servers is not a compound list");
        };
        let name = items[0].as_compound().unwrap().get("name").unwrap();
        assert_eq!(name.as_str().unwrap(), "Example \u{1F600}");
    }

    #[test]
    fn supplementary_characters_use_surrogate_pairs() {
        let encoded = MString::from("\u{1F600}\0");
        assert_eq!(
            encoded.as_bytes(),
            &[0xED, 0xA0, 0xBD, 0xED, 0xB8, 0x80, 0xC0, 0x80]
        );
        assert_eq!(encoded.to_string_lossy(), "\u{1F600}\0");
    }

    #[test]
    fn truncated_and_malformed_input_is_rejected() {
        let bytes = sample().encode().unwrap();
        for cut in [1, 5, bytes.len() - 1] {
            assert!(matches!(
                NbtDocument::decode(&bytes[..cut]),
                Err(LauncherError::Nbt(_))
            ));
        }
        assert!(NbtDocument::decode(&[0x1f, 0x8b, 0x08]).is_err());
        assert!(NbtDocument::decode(&[10, 0, 0, 99]).is_err());
    }
}
