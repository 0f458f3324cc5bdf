use interstellar::{
    storage::{
        cursor::BinaryCursor,
        schema::{AlternativeShape, FieldOverload, Schema},
        writer::BinaryWriter,
    },
    types::{error::DatabaseError, wire::{TypeSet, WireType}},
    utils::mock::user_schema,
};

fn parse(bytes: &[u8]) -> Result<Schema, DatabaseError> {
    let mut cursor = BinaryCursor::new(bytes);
    let schema = Schema::parse(&mut cursor)?;
    assert!(cursor.has_ended());
    Ok(schema)
}

#[test]
fn test_flat_schema_roundtrip() {
    let schema = user_schema();
    let bytes = schema.to_bytes().unwrap();

    let parsed = parse(&bytes).unwrap();
    assert_eq!(parsed, schema);
    assert_eq!(
        parsed.field_names().collect::<Vec<_>>(),
        vec!["ID", "name", "name_history"]
    );
}

#[test]
fn test_field_order_is_preserved() {
    let schema = Schema::new()
        .field("z", FieldOverload::basic(WireType::Bool))
        .field("a", FieldOverload::basic(WireType::Bool))
        .field("m", FieldOverload::basic(WireType::Bool));

    let parsed = parse(&schema.to_bytes().unwrap()).unwrap();
    assert_eq!(parsed.field_names().collect::<Vec<_>>(), vec!["z", "a", "m"]);
}

#[test]
fn test_allowed_types_written_as_bitmask() {
    let schema = Schema::new().field("v", FieldOverload::basic(WireType::Bool | WireType::Null));
    let bytes = schema.to_bytes().unwrap();

    // STRUCTURE, count, STRING "v", mask
    let mut expected = vec![0x00, 0x02, 0, 0, 0, 1, 0x00, 0x08, 0, 0, 0, 1, b'v'];
    expected.extend_from_slice(&0x0021u16.to_be_bytes());
    assert_eq!(bytes, expected);
}

#[test]
fn test_nested_schema_and_array_alternatives() {
    let address = Schema::new()
        .field("street", FieldOverload::basic(WireType::String))
        .field("number", FieldOverload::basic(WireType::Short | WireType::Integer));
    let schema = Schema::new()
        .field("address", FieldOverload::basic(WireType::Null).or_structure(address.clone()))
        .field(
            "tags",
            FieldOverload::array_of(FieldOverload::basic(WireType::String)),
        )
        .field("id", FieldOverload::basic(WireType::Long));

    let parsed = parse(&schema.to_bytes().unwrap()).unwrap();
    assert_eq!(parsed, schema);

    let address_field = parsed.get("address").unwrap();
    assert!(address_field.allowed.contains(WireType::Null));
    assert_eq!(
        address_field.alternatives,
        vec![AlternativeShape::Structure(address)]
    );
}

#[test]
fn test_structure_only_field() {
    let inner = Schema::new().field("x", FieldOverload::basic(WireType::Double));
    let schema = Schema::new()
        .field("point", FieldOverload::structure(inner))
        .field("label", FieldOverload::basic(WireType::String));

    let parsed = parse(&schema.to_bytes().unwrap()).unwrap();
    assert!(parsed.get("point").unwrap().allowed.is_empty());
    assert_eq!(parsed, schema);
}

#[test]
fn test_array_of_arrays() {
    let matrix = FieldOverload::array_of(FieldOverload::array_of(FieldOverload::basic(
        WireType::Float,
    )));
    let schema = Schema::new().field("matrix", matrix);

    assert_eq!(parse(&schema.to_bytes().unwrap()).unwrap(), schema);
}

#[test]
fn test_empty_overload_cannot_be_serialized() {
    let schema = Schema::new().field("nothing", FieldOverload::default());
    let err = schema.to_bytes().unwrap_err();
    assert!(matches!(err, DatabaseError::StructureMismatch { .. }));
}

#[test]
fn test_alternative_after_nested_structure_is_absorbed() {
    let numeric = Schema::new().field("x", FieldOverload::basic(WireType::Integer));
    let textual = Schema::new().field("s", FieldOverload::basic(WireType::String));
    let schema = Schema::new().field(
        "v",
        FieldOverload::structure(numeric).or_structure(textual.clone()),
    );

    // The last field of the first alternative takes the second one.
    let parsed = parse(&schema.to_bytes().unwrap()).unwrap();
    assert_ne!(parsed, schema);
    assert_eq!(parsed.get("v").unwrap().alternatives.len(), 1);
    assert_eq!(
        parsed.get("v").unwrap().alternatives[0],
        AlternativeShape::Structure(Schema::new().field(
            "x",
            FieldOverload::basic(WireType::Integer).or_structure(textual),
        ))
    );

    let err = schema.check_round_trip().unwrap_err();
    assert!(matches!(err, DatabaseError::InvalidFormat { .. }));
}

#[test]
fn test_alternative_after_array_is_absorbed() {
    let element = FieldOverload::basic(WireType::String);
    let nested = Schema::new().field("n", FieldOverload::basic(WireType::Bool));
    let schema = Schema::new().field(
        "v",
        FieldOverload::array_of(element).or_structure(nested),
    );

    assert_ne!(parse(&schema.to_bytes().unwrap()).unwrap(), schema);
    let err = schema.check_round_trip().unwrap_err();
    assert!(matches!(err, DatabaseError::InvalidFormat { .. }));
}

#[test]
fn test_round_trip_check_accepts_unambiguous_schemas() {
    user_schema().check_round_trip().unwrap();

    let empty = Schema::new();
    let last = Schema::new().field("x", FieldOverload::basic(WireType::Double));
    let schema = Schema::new()
        .field(
            "v",
            FieldOverload::basic(WireType::Null)
                .or_structure(empty)
                .or_structure(last),
        )
        .field("tail", FieldOverload::basic(WireType::Bool));
    schema.check_round_trip().unwrap();
}

#[test]
fn test_invalid_overload_tag_rolls_back() {
    let mut writer = BinaryWriter::new();
    writer.write_tag(WireType::Structure);
    writer.write_integer(1);
    writer.write_tagged_string("broken").unwrap();
    // A tag outside the basic set and not a container.
    writer.write_raw(&0x4000u16.to_be_bytes());
    let bytes = writer.into_bytes();

    let mut cursor = BinaryCursor::new(&bytes);
    let err = Schema::parse(&mut cursor).unwrap_err();
    assert!(matches!(err, DatabaseError::TypeMismatch { .. }));
    assert_eq!(cursor.position(), 0);
    assert_eq!(cursor.checkpoint_depth(), 0);
}

#[test]
fn test_duplicate_field_name() {
    let mut writer = BinaryWriter::new();
    writer.write_tag(WireType::Structure);
    writer.write_integer(2);
    for _ in 0..2 {
        writer.write_tagged_string("twice").unwrap();
        writer.write_tag(WireType::Bool);
    }
    let bytes = writer.into_bytes();

    let err = parse(&bytes).unwrap_err();
    assert!(matches!(err, DatabaseError::InvalidFormat { .. }));
}

#[test]
fn test_wstring_field_names() {
    let mut writer = BinaryWriter::new();
    writer.write_tag(WireType::Structure);
    writer.write_integer(1);
    writer.write_tagged_wstring("größe").unwrap();
    writer.write_tag(WireType::Double);
    let bytes = writer.into_bytes();

    let parsed = parse(&bytes).unwrap();
    assert!(parsed.get("größe").is_some());
}

#[test]
fn test_truncated_schema() {
    let bytes = user_schema().to_bytes().unwrap();
    let mut cursor = BinaryCursor::new(&bytes[..bytes.len() - 1]);

    assert!(Schema::parse(&mut cursor).is_err());
    assert_eq!(cursor.position(), 0);
}

#[test]
fn test_type_set_from_bits() {
    assert_eq!(TypeSet::from_bits(0x0021), Some(WireType::Bool | WireType::Null));
    assert_eq!(TypeSet::from_bits(0x1FF9), Some(TypeSet::ALL_BASIC));
    assert_eq!(TypeSet::from_bits(0), None);
    assert_eq!(TypeSet::from_bits(WireType::Structure.as_u16()), None);
    assert_eq!(TypeSet::from_bits(0x2000), None);
}

#[test]
fn test_schema_insert_replaces_in_place() {
    let mut schema = Schema::new()
        .field("a", FieldOverload::basic(WireType::Bool))
        .field("b", FieldOverload::basic(WireType::Bool));
    schema.insert("a", FieldOverload::basic(WireType::Integer));

    assert_eq!(schema.len(), 2);
    assert_eq!(schema.field_names().next(), Some("a"));
    assert!(schema.get("a").unwrap().allowed.contains(WireType::Integer));
}
