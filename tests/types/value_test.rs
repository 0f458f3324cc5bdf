use std::collections::BTreeSet;

use interstellar::types::{
    entry::Entry,
    value::{IndexKey, Value, ValueKind},
    wire::{TypeSet, WireType},
};

#[test]
fn test_value_creation_and_kinds() {
    assert_eq!(Value::Null.kind(), ValueKind::Null);
    assert_eq!(Value::from(true).kind(), ValueKind::Boolean);
    assert_eq!(Value::from(42).kind(), ValueKind::Integer);
    assert_eq!(Value::from(42_i64).kind(), ValueKind::Integer);
    assert_eq!(Value::from(2.75).kind(), ValueKind::Real);
    assert_eq!(Value::from("hello").kind(), ValueKind::Text);
    assert_eq!(Value::from(Entry::new()).kind(), ValueKind::Entry);
    assert_eq!(Value::from(vec![1, 2]).kind(), ValueKind::Array);

    assert!(Value::from(None::<i32>).is_null());
    assert_eq!(Value::from(Some("x")), Value::Text("x".to_string()));
    assert!(Value::from(vec!["a"]).is_container());
    assert!(!Value::from(1).is_container());
}

#[test]
fn test_value_accessors() {
    assert_eq!(Value::from(7).as_i64(), Some(7));
    assert_eq!(Value::from(7).as_f64(), Some(7.0));
    assert_eq!(Value::from(2.5).as_f64(), Some(2.5));
    assert_eq!(Value::from(2.5).as_i64(), None);
    assert_eq!(Value::from("text").as_str(), Some("text"));
    assert_eq!(Value::from(false).as_bool(), Some(false));
    assert_eq!(Value::Null.as_str(), None);

    let nested = Value::from(vec![Value::from(1), Value::Null]);
    assert_eq!(nested.as_array().map(|items| items.len()), Some(2));

    let entry = Value::from(Entry::new().with("k", 1));
    assert_eq!(entry.as_entry().and_then(|e| e.get("k")), Some(&Value::Integer(1)));
}

#[test]
fn test_entry_keeps_field_order() {
    let mut entry = Entry::new().with("b", 1).with("a", 2).with("c", 3);
    assert_eq!(entry.field_names().collect::<Vec<_>>(), vec!["b", "a", "c"]);

    let previous = entry.insert("a", "replaced");
    assert_eq!(previous, Some(Value::Integer(2)));
    assert_eq!(entry.field_names().collect::<Vec<_>>(), vec!["b", "a", "c"]);
    assert_eq!(entry.get("a"), Some(&Value::from("replaced")));
    assert_eq!(entry.len(), 3);
    assert!(entry.contains("c"));
    assert!(!entry.contains("d"));
}

#[test]
fn test_entry_from_iterator() {
    let entry: Entry = vec![("x", 1), ("y", 2), ("x", 3)].into_iter().collect();

    assert_eq!(entry.len(), 2);
    assert_eq!(entry.get("x"), Some(&Value::Integer(3)));
    assert_eq!(
        entry.iter().map(|(name, _)| name).collect::<Vec<_>>(),
        vec!["x", "y"]
    );
}

#[test]
fn test_entry_serializes_as_json_object() {
    let entry = Entry::new()
        .with("ID", 3)
        .with("name", "Silvia")
        .with("score", 9.5)
        .with("active", true)
        .with("missing", Value::Null)
        .with("name_history", vec!["Sjoerd"])
        .with("nested", Entry::new().with("depth", 1));

    let json = serde_json::to_string(&entry).unwrap();
    assert_eq!(
        json,
        r#"{"ID":3,"name":"Silvia","score":9.5,"active":true,"missing":null,"name_history":["Sjoerd"],"nested":{"depth":1}}"#
    );
}

#[test]
fn test_index_keys() {
    assert_eq!(IndexKey::from("users"), IndexKey::Text("users".to_string()));
    assert_eq!(IndexKey::from(String::from("users")), IndexKey::from("users"));
    assert_eq!(IndexKey::from(5), IndexKey::Integer(5));
    assert_eq!(IndexKey::from("users").as_str(), Some("users"));
    assert_eq!(IndexKey::Integer(5).as_str(), None);

    assert_eq!(IndexKey::from("users").to_string(), "users");
    assert_eq!(IndexKey::Integer(-12).to_string(), "-12");

    let keys: BTreeSet<IndexKey> = [IndexKey::from("b"), IndexKey::from(2), IndexKey::from("a")]
        .into_iter()
        .collect();
    assert_eq!(keys.len(), 3);
}

#[test]
fn test_index_keys_json() {
    let keys = vec![IndexKey::from("entry01"), IndexKey::Integer(7)];
    let json = serde_json::to_string(&keys).unwrap();
    assert_eq!(json, r#"["entry01",7]"#);

    let parsed: Vec<IndexKey> = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, keys);
}

#[test]
fn test_wire_types() {
    assert_eq!(WireType::from_u16(0x0200), Some(WireType::Integer));
    assert_eq!(WireType::from_u16(0x0003), None);
    assert_eq!(WireType::Double.as_u16(), 0x1000);
    assert!(WireType::Null.is_basic());
    assert!(!WireType::Structure.is_basic());
    assert!(!WireType::IndexBlock.is_basic());
    assert!(WireType::Array.is_container());
    assert_eq!(WireType::WString.to_string(), "WSTRING");
}

#[test]
fn test_type_sets() {
    let set = WireType::String | WireType::WString;
    assert!(set.contains(WireType::String));
    assert!(set.contains(WireType::WString));
    assert!(!set.contains(WireType::Char));
    assert!(!set.contains(WireType::IndexBlock));
    assert_eq!(set.bits(), 0x0018);
    assert_eq!(set.to_string(), "STRING | WSTRING");

    assert_eq!(TypeSet::ALL_BASIC.iter().count(), WireType::BASIC.len());
    assert_eq!(TypeSet::of(&WireType::BASIC), TypeSet::ALL_BASIC);
    assert!(TypeSet::EMPTY.is_empty());
    assert_eq!((set | WireType::Null).bits(), 0x0019);
}
