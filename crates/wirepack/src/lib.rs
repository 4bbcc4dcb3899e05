//! # Wirepack
//!
//! A small, bounded binary encoding for tree-shaped payloads.
//!
//! ## Philosophy
//!
//! - **Explicit State**: Encoders track open containers on a stack. Nothing is buffered behind your back.
//! - **TLV Architecture**: `[Tag][Length?][Value]` structure enables safe skipping of unknown entries.
//! - **Bounded**: Decoders are zero-copy, bounds-checked views that never panic on hostile input.
//!
//! ## Format
//!
//! - **Scalars**: `[Tag: 1b][Data: 0 or 8]`
//! - **Blobs**: `[Tag: 1b][Len: 4b][Data: Len]`
//! - **Containers**: `[Tag: 1b][Len: 4b][Body: Len]`
//! - **Map Entries**: `[Tag::Entry][Len: 4b][Key: String][Value: 1 item]`
//!
//! All integers are Little-Endian.

#[cfg(test)]
mod tests;

/// Wirepack serialization and deserialization errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Byte does not correspond to a valid wirepack `Tag`.
    InvalidTag(u8),
    /// String data is not valid UTF-8.
    InvalidUtf8,
    /// Closing a scope that does not match the active scope stack.
    ScopeMismatch { expected: Scope, actual: Scope },
    /// Attempted to close a scope when only the Root remains.
    ScopeUnderflow,
    /// Attempted to finalize the buffer with open scopes.
    ScopeStillOpen,
    /// Buffer exhausted while reading.
    UnexpectedEnd,
    /// Blob or container length exceeds `u32::MAX`.
    BlobTooLarge(usize),
    /// Attempted to write more than one value into a map entry.
    TooManyItems,
    /// Attempted to close a map entry without a value.
    EmptyEntry,
    /// Attempted to write a non-entry item directly into a Map.
    InvalidMapEntry,
    /// A complete document was read but bytes remain after it.
    TrailingBytes(usize),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidTag(b) => write!(f, "invalid tag byte: {:#04x}", b),
            Error::InvalidUtf8 => write!(f, "string data is not valid utf-8"),
            Error::ScopeMismatch { expected, actual } => {
                write!(f, "scope mismatch: expected {:?}, found {:?}", expected, actual)
            }
            Error::ScopeUnderflow => write!(f, "no open scope to close"),
            Error::ScopeStillOpen => write!(f, "cannot finish with open scopes"),
            Error::UnexpectedEnd => write!(f, "unexpected end of input"),
            Error::BlobTooLarge(len) => write!(f, "blob of {} bytes exceeds the u32 length limit", len),
            Error::TooManyItems => write!(f, "map entry already holds a value"),
            Error::EmptyEntry => write!(f, "map entry closed without a value"),
            Error::InvalidMapEntry => write!(f, "maps may only contain entries"),
            Error::TrailingBytes(n) => write!(f, "{} trailing bytes after document", n),
        }
    }
}

impl std::error::Error for Error {}

/// Specialized `Result` for wirepack operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Identifies the type of the encoded value.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Null = 0x01,
    True = 0x02,
    False = 0x03,

    // Fixed-width numbers (8 bytes)
    Int = 0x04,
    UInt = 0x05,
    Float = 0x06,

    // Blobs (Tag + u32 Len + Bytes)
    String = 0x10,
    Bytes = 0x11,

    // Containers (Tag + u32 Len + Body)
    List = 0x20,
    Map = 0x21,
    Entry = 0x22,
}

impl Tag {
    /// Returns the Tag variant for a given byte, or `None` if invalid.
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Tag::Null),
            0x02 => Some(Tag::True),
            0x03 => Some(Tag::False),
            0x04 => Some(Tag::Int),
            0x05 => Some(Tag::UInt),
            0x06 => Some(Tag::Float),
            0x10 => Some(Tag::String),
            0x11 => Some(Tag::Bytes),
            0x20 => Some(Tag::List),
            0x21 => Some(Tag::Map),
            0x22 => Some(Tag::Entry),
            _ => None,
        }
    }
}

/// Internal state tracking for the `Encoder` stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// The virtual root; allows any item.
    Root,
    /// Ordered sequence; allows any number of items.
    List,
    /// Keyed container; strictly allows only `Tag::Entry` items.
    Map,
    /// A single map entry; allows exactly one value after the key.
    Entry,
}

/// An active container scope on the `Encoder` stack.
struct Frame {
    start: usize,
    scope: Scope,
    count: usize,
}

/// A bounded, state-machine driven encoder.
///
/// The Encoder maintains a stack of open scopes to enforce structural strictness
/// and back-patches length headers when a scope closes.
///
/// # Structural Invariants
///
/// 1.  **Map Scopes**: Only entries (`entry_begin`) may be written.
/// 2.  **Entry Scopes**: Exactly one value must be written after the key.
/// 3.  **Root Scope**: The encoder must end in the Root scope to finalize bytes.
pub struct Encoder {
    buf: Vec<u8>,
    /// Bottom is always `Scope::Root`.
    stack: Vec<Frame>,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder {
    /// Creates a new encoder with default capacity.
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(256),
            stack: vec![Frame { start: 0, scope: Scope::Root, count: 0 }],
        }
    }

    /// Consumes the encoder and returns the final byte vector.
    ///
    /// # Errors
    /// Returns `Error::ScopeStillOpen` if any container is still open.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        if self.stack.len() > 1 {
            return Err(Error::ScopeStillOpen);
        }
        Ok(self.buf)
    }

    fn current_scope(&self) -> (Scope, usize) {
        self.stack.last().map_or((Scope::Root, 0), |frame| (frame.scope, frame.count))
    }

    fn check_write(&self, tag: Tag) -> Result<()> {
        match self.current_scope() {
            (Scope::Root | Scope::List, _) => Ok(()),
            (Scope::Map, _) if tag == Tag::Entry => Ok(()),
            (Scope::Map, _) => Err(Error::InvalidMapEntry),
            (Scope::Entry, count) if count >= 1 => Err(Error::TooManyItems),
            (Scope::Entry, _) => Ok(()),
        }
    }

    fn on_item_written(&mut self) {
        if let Some(frame) = self.stack.last_mut() {
            frame.count += 1;
        }
    }

    fn write_tag(&mut self, tag: Tag) -> Result<()> {
        self.check_write(tag)?;
        self.buf.push(tag as u8);
        Ok(())
    }

    fn write_len(&mut self, len: usize) -> Result<()> {
        let len = u32::try_from(len).map_err(|_| Error::BlobTooLarge(len))?;
        self.buf.extend_from_slice(&len.to_le_bytes());
        Ok(())
    }

    fn begin_scope(&mut self, tag: Tag, scope: Scope) -> Result<()> {
        self.check_write(tag)?;
        self.buf.push(tag as u8);
        self.buf.extend_from_slice(&[0, 0, 0, 0]); // length placeholder
        self.stack.push(Frame { start: self.buf.len(), scope, count: 0 });
        Ok(())
    }

    fn end_scope(&mut self, expected: Scope) -> Result<()> {
        if self.stack.len() <= 1 {
            return Err(Error::ScopeUnderflow);
        }

        let (actual, count) = self.current_scope();
        if actual != expected {
            return Err(Error::ScopeMismatch { expected, actual });
        }
        if actual == Scope::Entry && count == 0 {
            return Err(Error::EmptyEntry);
        }

        let Some(frame) = self.stack.pop() else {
            return Err(Error::ScopeUnderflow);
        };
        let body_len = self.buf.len() - frame.start;
        let len = u32::try_from(body_len).map_err(|_| Error::BlobTooLarge(body_len))?;
        self.buf[frame.start - 4..frame.start].copy_from_slice(&len.to_le_bytes());

        self.on_item_written();
        Ok(())
    }

    /// Encodes `null`.
    pub fn null(&mut self) -> Result<()> {
        self.write_tag(Tag::Null)?;
        self.on_item_written();
        Ok(())
    }

    /// Encodes a boolean value.
    pub fn bool(&mut self, v: bool) -> Result<()> {
        self.write_tag(if v { Tag::True } else { Tag::False })?;
        self.on_item_written();
        Ok(())
    }

    /// Encodes a signed 64-bit integer (LE).
    pub fn int(&mut self, v: i64) -> Result<()> {
        self.write_tag(Tag::Int)?;
        self.buf.extend_from_slice(&v.to_le_bytes());
        self.on_item_written();
        Ok(())
    }

    /// Encodes an unsigned 64-bit integer (LE).
    pub fn uint(&mut self, v: u64) -> Result<()> {
        self.write_tag(Tag::UInt)?;
        self.buf.extend_from_slice(&v.to_le_bytes());
        self.on_item_written();
        Ok(())
    }

    /// Encodes a 64-bit float (LE).
    pub fn float(&mut self, v: f64) -> Result<()> {
        self.write_tag(Tag::Float)?;
        self.buf.extend_from_slice(&v.to_le_bytes());
        self.on_item_written();
        Ok(())
    }

    /// Encodes a UTF-8 string blob.
    pub fn str(&mut self, v: &str) -> Result<()> {
        self.blob(Tag::String, v.as_bytes())
    }

    /// Encodes a raw byte blob.
    pub fn bytes(&mut self, v: &[u8]) -> Result<()> {
        self.blob(Tag::Bytes, v)
    }

    fn blob(&mut self, tag: Tag, v: &[u8]) -> Result<()> {
        if u32::try_from(v.len()).is_err() {
            return Err(Error::BlobTooLarge(v.len()));
        }
        self.write_tag(tag)?;
        self.write_len(v.len())?;
        self.buf.extend_from_slice(v);
        self.on_item_written();
        Ok(())
    }

    /// Begins a List container. Must be closed via `list_end()`.
    pub fn list_begin(&mut self) -> Result<()> { self.begin_scope(Tag::List, Scope::List) }
    /// Ends a List container.
    pub fn list_end(&mut self) -> Result<()> { self.end_scope(Scope::List) }

    /// Begins a Map container.
    ///
    /// # Invariants
    /// - Must be closed via `map_end()`.
    /// - **Strict:** Only `entry_begin()` is allowed as a direct child.
    pub fn map_begin(&mut self) -> Result<()> { self.begin_scope(Tag::Map, Scope::Map) }
    /// Ends a Map container.
    pub fn map_end(&mut self) -> Result<()> { self.end_scope(Scope::Map) }

    /// Begins a keyed map entry and writes its key.
    ///
    /// # Invariants
    /// - Must be closed via `entry_end()`.
    /// - **Strict:** Exactly one value must be written before closing.
    pub fn entry_begin(&mut self, key: &str) -> Result<()> {
        self.begin_scope(Tag::Entry, Scope::Entry)?;
        self.str(key)?;
        // the key is metadata; the value count starts now
        if let Some(frame) = self.stack.last_mut() {
            frame.count = 0;
        }
        Ok(())
    }
    /// Ends a map entry.
    pub fn entry_end(&mut self) -> Result<()> { self.end_scope(Scope::Entry) }
}

/// A zero-copy, bounds-checked cursor over a byte slice.
///
/// Reading advances the internal cursor. Container reads return new
/// `Decoder` instances restricted to the container's body.
///
/// # Errors
/// All read operations return `Error::UnexpectedEnd` if the buffer is exhausted.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    buf: &'a [u8],
}

impl<'a> Decoder<'a> {
    /// Creates a decoder over the slice.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Returns the remaining bytes in the view.
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    /// Fails with `Error::TrailingBytes` unless the view is exhausted.
    pub fn finish(&self) -> Result<()> {
        match self.buf.len() {
            0 => Ok(()),
            n => Err(Error::TrailingBytes(n)),
        }
    }

    /// Peeks the next Tag without advancing.
    pub fn peek_tag(&self) -> Result<Tag> {
        let first = *self.buf.first().ok_or(Error::UnexpectedEnd)?;
        Tag::from_u8(first).ok_or(Error::InvalidTag(first))
    }

    fn consume(&mut self, n: usize) -> Result<()> {
        self.read_bytes(n).map(|_| ())
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.buf.len() {
            return Err(Error::UnexpectedEnd);
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn read_len(&mut self) -> Result<usize> {
        Ok(u32::from_le_bytes(self.read_array::<4>()?) as usize)
    }

    fn check_tag(&mut self, expected: Tag) -> Result<()> {
        let tag = self.peek_tag()?;
        if tag != expected {
            return Err(Error::InvalidTag(tag as u8));
        }
        self.consume(1)
    }

    /// Skips the next item and its nested children.
    pub fn skip(&mut self) -> Result<()> {
        let tag = self.peek_tag()?;
        self.consume(1)?;

        match tag {
            Tag::Null | Tag::True | Tag::False => {},
            Tag::Int | Tag::UInt | Tag::Float => self.consume(8)?,
            Tag::String | Tag::Bytes | Tag::List | Tag::Map | Tag::Entry => {
                let len = self.read_len()?;
                self.consume(len)?;
            }
        }
        Ok(())
    }

    /// Decodes `null`.
    pub fn null(&mut self) -> Result<()> { self.check_tag(Tag::Null) }

    /// Decodes a bool.
    pub fn bool(&mut self) -> Result<bool> {
        match self.peek_tag()? {
            Tag::True => { self.consume(1)?; Ok(true) },
            Tag::False => { self.consume(1)?; Ok(false) },
            tag => Err(Error::InvalidTag(tag as u8)),
        }
    }

    /// Decodes a signed 64-bit integer (LE).
    pub fn int(&mut self) -> Result<i64> {
        self.check_tag(Tag::Int)?;
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    /// Decodes an unsigned 64-bit integer (LE).
    pub fn uint(&mut self) -> Result<u64> {
        self.check_tag(Tag::UInt)?;
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    /// Decodes a 64-bit float (LE).
    pub fn float(&mut self) -> Result<f64> {
        self.check_tag(Tag::Float)?;
        Ok(f64::from_le_bytes(self.read_array()?))
    }

    /// Decodes a string slice (UTF-8).
    pub fn str(&mut self) -> Result<&'a str> {
        self.check_tag(Tag::String)?;
        let len = self.read_len()?;
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
    }

    /// Decodes a byte slice.
    pub fn bytes(&mut self) -> Result<&'a [u8]> {
        self.check_tag(Tag::Bytes)?;
        let len = self.read_len()?;
        self.read_bytes(len)
    }

    fn enter_container(&mut self, expected: Tag) -> Result<Decoder<'a>> {
        self.check_tag(expected)?;
        let len = self.read_len()?;
        Ok(Decoder::new(self.read_bytes(len)?))
    }

    /// Decodes a List into an iterator.
    pub fn list(&mut self) -> Result<ListIter<'a>> {
        Ok(ListIter { dec: self.enter_container(Tag::List)? })
    }

    /// Decodes a Map into an iterator.
    pub fn map(&mut self) -> Result<MapIter<'a>> {
        Ok(MapIter { dec: self.enter_container(Tag::Map)? })
    }

    /// Decodes a map entry, returning `(Key, ValueDecoder)`.
    pub fn entry(&mut self) -> Result<(&'a str, Decoder<'a>)> {
        let mut inner = self.enter_container(Tag::Entry)?;
        let key = inner.str()?;
        Ok((key, inner))
    }
}

/// Iterator for items within a List.
#[derive(Debug)]
pub struct ListIter<'a> {
    dec: Decoder<'a>,
}

impl<'a> ListIter<'a> {
    /// Returns a Decoder scoped to the next item, or `None` at the end.
    ///
    /// # Errors
    /// Returns an error if the next item is truncated or carries an invalid tag.
    pub fn next(&mut self) -> Result<Option<Decoder<'a>>> {
        if self.dec.remaining() == 0 {
            return Ok(None);
        }
        let mut probe = self.dec.clone();
        probe.skip()?;
        let len = self.dec.remaining() - probe.remaining();
        Ok(Some(Decoder::new(self.dec.read_bytes(len)?)))
    }
}

/// Iterator for keyed entries within a Map.
#[derive(Debug)]
pub struct MapIter<'a> {
    dec: Decoder<'a>,
}

impl<'a> MapIter<'a> {
    /// Returns `(Key, ValueDecoder)` for the next entry, or `None`.
    pub fn next(&mut self) -> Result<Option<(&'a str, Decoder<'a>)>> {
        if self.dec.remaining() == 0 {
            return Ok(None);
        }
        self.dec.entry().map(Some)
    }
}
