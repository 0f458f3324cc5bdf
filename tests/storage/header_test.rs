use interstellar::{
    storage::{
        cursor::BinaryCursor,
        header::{InterstellarHeader, now_millis},
        writer::BinaryWriter,
    },
    types::{HEADER_SIZE, MAGIC, MAX_TIMESTAMP, error::DatabaseError},
};

fn raw_header(magic: i32, version: i32, wide: bool, created: i64, updated: i64) -> Vec<u8> {
    let mut writer = BinaryWriter::new();
    writer.write_integer(magic);
    writer.write_integer(version);
    writer.write_bool(wide);
    writer.write_long(created);
    writer.write_long(updated);
    writer.into_bytes()
}

#[test]
fn test_header_roundtrip() {
    let before = now_millis();
    let mut writer = BinaryWriter::new();
    let updated = InterstellarHeader::serialize(&mut writer, true, 1_000).unwrap();
    let bytes = writer.into_bytes();
    assert_eq!(bytes.len(), HEADER_SIZE);
    assert!(updated >= before);

    let mut cursor = BinaryCursor::new(&bytes);
    let header = InterstellarHeader::parse(&mut cursor).unwrap();
    assert_eq!(header.format_version, 1);
    assert!(header.wide_offsets);
    assert_eq!(header.created_at, 1_000);
    assert_eq!(header.updated_at, updated);
    assert_eq!(cursor.position(), HEADER_SIZE);
}

#[test]
fn test_header_starts_with_magic() {
    let mut writer = BinaryWriter::new();
    InterstellarHeader::serialize(&mut writer, false, 0).unwrap();
    let bytes = writer.into_bytes();

    assert_eq!(&bytes[0..4], &MAGIC.to_be_bytes());
    assert_eq!(&bytes[4..8], &1i32.to_be_bytes());
    assert_eq!(bytes[8], 0);
}

#[test]
fn test_bad_magic() {
    let bytes = raw_header(12345, 1, false, 0, 0);
    let mut cursor = BinaryCursor::new(&bytes);

    let err = InterstellarHeader::parse(&mut cursor).unwrap_err();
    assert!(matches!(err, DatabaseError::InvalidFormat { .. }));
    assert_eq!(cursor.position(), 0);
}

#[test]
fn test_unsupported_version() {
    for version in [0, 2, -1] {
        let bytes = raw_header(MAGIC, version, false, 0, 0);
        let mut cursor = BinaryCursor::new(&bytes);

        let err = InterstellarHeader::parse(&mut cursor).unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidFormat { .. }));
        assert_eq!(cursor.position(), 0);
    }
}

#[test]
fn test_timestamp_out_of_range() {
    let negative = raw_header(MAGIC, 1, false, -1, 0);
    let err = InterstellarHeader::parse(&mut BinaryCursor::new(&negative)).unwrap_err();
    assert!(matches!(
        err,
        DatabaseError::InvalidTimestamp { field: "creation", value: -1 }
    ));

    let too_large = raw_header(MAGIC, 1, false, 0, MAX_TIMESTAMP);
    let mut cursor = BinaryCursor::new(&too_large);
    let err = InterstellarHeader::parse(&mut cursor).unwrap_err();
    assert!(matches!(err, DatabaseError::InvalidTimestamp { field: "last update", .. }));
    assert_eq!(cursor.position(), 0);

    let largest = raw_header(MAGIC, 1, false, MAX_TIMESTAMP - 1, MAX_TIMESTAMP - 1);
    assert!(InterstellarHeader::parse(&mut BinaryCursor::new(&largest)).is_ok());
}

#[test]
fn test_serialize_rejects_invalid_creation_time() {
    let mut writer = BinaryWriter::new();
    let err = InterstellarHeader::serialize(&mut writer, false, -5).unwrap_err();
    assert!(matches!(err, DatabaseError::InvalidTimestamp { .. }));
    assert_eq!(writer.position(), 0);
}

#[test]
fn test_truncated_header() {
    let bytes = raw_header(MAGIC, 1, false, 0, 0);
    let mut cursor = BinaryCursor::new(&bytes[..HEADER_SIZE - 1]);

    let err = InterstellarHeader::parse(&mut cursor).unwrap_err();
    assert!(matches!(err, DatabaseError::UnexpectedEndOfBuffer { .. }));
    assert_eq!(cursor.position(), 0);
}

#[test]
fn test_new_header_timestamps() {
    let header = InterstellarHeader::new(false);
    assert_eq!(header.created_at, header.updated_at);
    assert!(header.created_at().is_some());
    assert!(!header.wide_offsets);
}
