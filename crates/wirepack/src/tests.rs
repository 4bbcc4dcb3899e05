use crate::*;
use std::f64::consts::PI;

// ============================================================================
//  SCALAR TESTS (Happy Path)
// ============================================================================

#[test]
fn test_null_and_bools() -> Result<()> {
    let mut enc = Encoder::new();
    enc.null()?;
    enc.bool(true)?;
    enc.bool(false)?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);

    dec.null()?;
    assert!(dec.bool()?);
    assert!(!dec.bool()?);
    dec.finish()?;
    Ok(())
}

#[test]
fn test_numbers_keep_their_tags() -> Result<()> {
    let mut enc = Encoder::new();
    enc.int(i64::MIN)?;
    enc.uint(u64::MAX)?;
    enc.float(PI)?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);

    assert_eq!(dec.peek_tag()?, Tag::Int);
    assert_eq!(dec.int()?, i64::MIN);
    assert_eq!(dec.peek_tag()?, Tag::UInt);
    assert_eq!(dec.uint()?, u64::MAX);
    assert_eq!(dec.float()?, PI);
    Ok(())
}

#[test]
fn test_strings_and_bytes() -> Result<()> {
    let mut enc = Encoder::new();
    enc.str("hello")?;
    enc.str("")?;
    enc.bytes(&[0xde, 0xad])?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);

    assert_eq!(dec.str()?, "hello");
    assert_eq!(dec.str()?, "");
    assert_eq!(dec.bytes()?, &[0xde, 0xad]);
    Ok(())
}

// ============================================================================
//  CONTAINER TESTS
// ============================================================================

#[test]
fn test_map_with_nested_list() -> Result<()> {
    let mut enc = Encoder::new();
    enc.map_begin()?;
    enc.entry_begin("id")?;
    enc.str("red")?;
    enc.entry_end()?;
    enc.entry_begin("sizes")?;
    enc.list_begin()?;
    enc.int(1)?;
    enc.int(2)?;
    enc.list_end()?;
    enc.entry_end()?;
    enc.map_end()?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);
    let mut map = dec.map()?;

    let (key, mut val) = map.next()?.expect("id entry");
    assert_eq!(key, "id");
    assert_eq!(val.str()?, "red");

    let (key, mut val) = map.next()?.expect("sizes entry");
    assert_eq!(key, "sizes");
    let mut list = val.list()?;
    assert_eq!(list.next()?.expect("first").int()?, 1);
    assert_eq!(list.next()?.expect("second").int()?, 2);
    assert!(list.next()?.is_none());

    assert!(map.next()?.is_none());
    Ok(())
}

#[test]
fn test_skip_over_container() -> Result<()> {
    let mut enc = Encoder::new();
    enc.list_begin()?;
    enc.str("ignored")?;
    enc.list_end()?;
    enc.int(7)?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);
    dec.skip()?;
    assert_eq!(dec.int()?, 7);
    Ok(())
}

// ============================================================================
//  STRUCTURAL VIOLATIONS
// ============================================================================

#[test]
fn test_map_rejects_bare_values() {
    let mut enc = Encoder::new();
    enc.map_begin().unwrap();
    assert_eq!(enc.int(1), Err(Error::InvalidMapEntry));
}

#[test]
fn test_entry_requires_exactly_one_value() {
    let mut enc = Encoder::new();
    enc.map_begin().unwrap();
    enc.entry_begin("k").unwrap();
    assert_eq!(enc.entry_end(), Err(Error::EmptyEntry));

    enc.null().unwrap();
    assert_eq!(enc.null(), Err(Error::TooManyItems));
}

#[test]
fn test_scope_mismatch_and_underflow() {
    let mut enc = Encoder::new();
    assert_eq!(enc.list_end(), Err(Error::ScopeUnderflow));
    enc.list_begin().unwrap();
    assert_eq!(
        enc.map_end(),
        Err(Error::ScopeMismatch { expected: Scope::Map, actual: Scope::List })
    );
}

#[test]
fn test_unclosed_scope_cannot_finish() {
    let mut enc = Encoder::new();
    enc.list_begin().unwrap();
    assert!(matches!(enc.into_bytes(), Err(Error::ScopeStillOpen)));
}

// ============================================================================
//  HOSTILE INPUT
// ============================================================================

#[test]
fn test_truncated_input() {
    let mut enc = Encoder::new();
    enc.str("truncate me").unwrap();
    let bytes = enc.into_bytes().unwrap();

    let mut dec = Decoder::new(&bytes[..bytes.len() - 3]);
    assert_eq!(dec.str(), Err(Error::UnexpectedEnd));
}

#[test]
fn test_invalid_tag_and_utf8() {
    let mut dec = Decoder::new(&[0xff]);
    assert_eq!(dec.peek_tag(), Err(Error::InvalidTag(0xff)));

    let bad = [Tag::String as u8, 2, 0, 0, 0, 0xc3, 0x28];
    let mut dec = Decoder::new(&bad);
    assert_eq!(dec.str(), Err(Error::InvalidUtf8));
}

#[test]
fn test_trailing_bytes_detected() {
    let mut enc = Encoder::new();
    enc.null().unwrap();
    enc.null().unwrap();
    let bytes = enc.into_bytes().unwrap();

    let mut dec = Decoder::new(&bytes);
    dec.null().unwrap();
    assert_eq!(dec.finish(), Err(Error::TrailingBytes(1)));
}

#[test]
fn test_list_iter_reports_corrupt_items() {
    // list header claims one Int but only carries 2 bytes of it
    let bad = [Tag::List as u8, 3, 0, 0, 0, Tag::Int as u8, 1, 2];
    let mut dec = Decoder::new(&bad);
    let mut list = dec.list().unwrap();
    assert_eq!(list.next().err(), Some(Error::UnexpectedEnd));
}
