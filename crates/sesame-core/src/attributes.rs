//! Typed attribute sets and the wire codec.
//!
//! At the API surface attributes are typed ([`AttributeValue`]); on the wire
//! they are a plain string-to-string map ([`WireAttributes`]). This module is
//! the only place where one is turned into the other.
//!
//! Encoding is deterministic: the wire map is ordered by attribute name, so
//! identical logical input always produces an identical request.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::ValidationError;
use crate::schema::{AttributeType, Schema, LEGACY_ATTRIBUTE_PREFIX, SCHEMA_ATTRIBUTE};

/// Attribute map as sent to and received from the service.
pub type WireAttributes = BTreeMap<String, String>;

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttributeValue {
    String(String),
    Integer(i64),
    Boolean(bool),
}

impl AttributeValue {
    /// Runtime type of this value.
    pub fn attribute_type(&self) -> AttributeType {
        match self {
            Self::String(_) => AttributeType::String,
            Self::Integer(_) => AttributeType::Integer,
            Self::Boolean(_) => AttributeType::Boolean,
        }
    }

    /// Wire representation of this value.
    pub fn to_wire(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
            Self::Boolean(true) => "true".to_string(),
            Self::Boolean(false) => "false".to_string(),
        }
    }

    /// Parse a wire value as the given type.
    ///
    /// Integers must be in canonical base-10 form (no `+`, no leading zeros)
    /// so that re-encoding reproduces the exact wire text.
    pub fn from_wire(name: &str, value: &str, ty: AttributeType) -> Result<Self, ValidationError> {
        let malformed = || ValidationError::MalformedWireValue {
            name: name.to_string(),
            value: value.to_string(),
            expected: ty.as_str(),
        };

        match ty {
            AttributeType::String => Ok(Self::String(value.to_string())),
            AttributeType::Boolean => match value {
                "true" => Ok(Self::Boolean(true)),
                "false" => Ok(Self::Boolean(false)),
                _ => Err(malformed()),
            },
            AttributeType::Integer => {
                let parsed: i64 = value.parse().map_err(|_| malformed())?;
                if parsed.to_string() != value {
                    return Err(malformed());
                }
                Ok(Self::Integer(parsed))
            }
        }
    }

    /// String contents, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer contents, if this is an integer value.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Boolean contents, if this is a boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<i32> for AttributeValue {
    fn from(i: i32) -> Self {
        Self::Integer(i64::from(i))
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

/// A typed attribute set used to address items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeSet {
    values: BTreeMap<String, AttributeValue>,
}

impl AttributeSet {
    /// Create an empty attribute set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute, builder style.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace an attribute.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.values.insert(name.into(), value.into());
    }

    /// Get an attribute value.
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.values.get(name)
    }

    /// Remove an attribute.
    pub fn remove(&mut self, name: &str) -> Option<AttributeValue> {
        self.values.remove(name)
    }

    /// Iterate over attributes, ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<N, V> FromIterator<(N, V)> for AttributeSet
where
    N: Into<String>,
    V: Into<AttributeValue>,
{
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        let mut set = Self::new();
        for (name, value) in iter {
            set.insert(name, value);
        }
        set
    }
}

/// Check an attribute set against a schema.
pub fn validate(schema: &Schema, attributes: &AttributeSet) -> Result<(), ValidationError> {
    for (name, value) in attributes.iter() {
        match schema.attribute_type(name) {
            Some(expected) if expected != value.attribute_type() => {
                return Err(ValidationError::TypeMismatch {
                    name: name.to_string(),
                    expected: expected.as_str(),
                    found: value.attribute_type().as_str(),
                });
            }
            Some(_) => {}
            // Undeclared attributes only ever decode as strings.
            None if schema.allows_undefined() => {
                if value.attribute_type() != AttributeType::String {
                    return Err(ValidationError::TypeMismatch {
                        name: name.to_string(),
                        expected: AttributeType::String.as_str(),
                        found: value.attribute_type().as_str(),
                    });
                }
            }
            None => {
                return Err(ValidationError::UndefinedAttribute {
                    schema: schema.name().to_string(),
                    name: name.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Encode an attribute set for storing an item.
///
/// Adds the `xdg:schema` meta attribute unless the schema opts out.
pub fn encode(schema: &Schema, attributes: &AttributeSet) -> Result<WireAttributes, ValidationError> {
    validate(schema, attributes)?;

    let mut wire: WireAttributes = attributes
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_wire()))
        .collect();
    if schema.matches_name() {
        wire.insert(SCHEMA_ATTRIBUTE.to_string(), schema.name().to_string());
    }
    Ok(wire)
}

/// Encode an attribute set used to match existing items.
///
/// Same as [`encode`], but refuses an empty selector on schemas that do not
/// match by name, since that would select every item in the service.
pub fn encode_for_matching(
    schema: &Schema,
    attributes: &AttributeSet,
) -> Result<WireAttributes, ValidationError> {
    if attributes.is_empty() && !schema.matches_name() {
        return Err(ValidationError::EmptyTable(schema.name().to_string()));
    }
    encode(schema, attributes)
}

/// Decode a wire attribute map into typed values.
///
/// The `xdg:schema` meta attribute must name this schema and is dropped, as
/// are legacy `gkr:` attributes. Undeclared attributes decode as strings when
/// the schema allows them.
pub fn decode(schema: &Schema, wire: &WireAttributes) -> Result<AttributeSet, ValidationError> {
    let mut attributes = AttributeSet::new();
    for (name, value) in wire {
        if name == SCHEMA_ATTRIBUTE {
            if value != schema.name() {
                return Err(ValidationError::MismatchedSchema {
                    expected: schema.name().to_string(),
                    found: value.clone(),
                });
            }
            continue;
        }
        if name.starts_with(LEGACY_ATTRIBUTE_PREFIX) {
            continue;
        }

        let ty = match schema.attribute_type(name) {
            Some(ty) => ty,
            None if schema.allows_undefined() => AttributeType::String,
            None => {
                return Err(ValidationError::UndefinedAttribute {
                    schema: schema.name().to_string(),
                    name: name.clone(),
                });
            }
        };
        attributes.insert(name.clone(), AttributeValue::from_wire(name, value, ty)?);
    }
    Ok(attributes)
}

/// Check a raw wire map against a schema without keeping the decoded values.
pub fn validate_wire(schema: &Schema, wire: &WireAttributes) -> Result<(), ValidationError> {
    decode(schema, wire).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaFlags;
    use proptest::prelude::*;

    fn mock_schema() -> Schema {
        Schema::new(
            "org.mock.Schema",
            SchemaFlags::NONE,
            [
                ("number", AttributeType::Integer),
                ("string", AttributeType::String),
                ("even", AttributeType::Boolean),
            ],
        )
        .unwrap()
    }

    fn two() -> AttributeSet {
        AttributeSet::new()
            .with("number", 2)
            .with("string", "two")
            .with("even", true)
    }

    #[test]
    fn test_encode_typed_values() {
        let wire = encode(&mock_schema(), &two()).unwrap();
        assert_eq!(wire.get("number").map(String::as_str), Some("2"));
        assert_eq!(wire.get("string").map(String::as_str), Some("two"));
        assert_eq!(wire.get("even").map(String::as_str), Some("true"));
        assert_eq!(wire.get(SCHEMA_ATTRIBUTE).map(String::as_str), Some("org.mock.Schema"));
    }

    #[test]
    fn test_encode_is_deterministic() {
        let a = AttributeSet::new().with("string", "two").with("even", true).with("number", 2);
        let first = serde_json::to_string(&encode(&mock_schema(), &a).unwrap()).unwrap();
        let second = serde_json::to_string(&encode(&mock_schema(), &two()).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_encode_undefined_attribute() {
        let attrs = two().with("colour", "blue");
        let err = encode(&mock_schema(), &attrs).unwrap_err();
        assert!(matches!(err, ValidationError::UndefinedAttribute { ref name, .. } if name == "colour"));
    }

    #[test]
    fn test_encode_allow_undefined() {
        let schema = Schema::builder("org.mock.Loose")
            .flags(SchemaFlags::ALLOW_UNDEFINED)
            .attribute("number", AttributeType::Integer)
            .build()
            .unwrap();
        let attrs = AttributeSet::new().with("colour", "blue");
        let wire = encode(&schema, &attrs).unwrap();
        assert_eq!(wire.get("colour").map(String::as_str), Some("blue"));
        assert_eq!(decode(&schema, &wire).unwrap(), attrs);
    }

    #[test]
    fn test_allow_undefined_rejects_typed_values() {
        let schema = Schema::builder("org.mock.Loose")
            .flags(SchemaFlags::ALLOW_UNDEFINED)
            .build()
            .unwrap();
        for attrs in [
            AttributeSet::new().with("extra", 5),
            AttributeSet::new().with("flag", true),
        ] {
            let err = validate(&schema, &attrs).unwrap_err();
            assert!(
                matches!(err, ValidationError::TypeMismatch { expected: "string", .. }),
                "{err:?}"
            );
        }
    }

    #[test]
    fn test_encode_type_mismatch() {
        let attrs = AttributeSet::new().with("number", "two");
        let err = encode(&mock_schema(), &attrs).unwrap_err();
        assert_eq!(
            err,
            ValidationError::TypeMismatch {
                name: "number".to_string(),
                expected: "integer",
                found: "string",
            }
        );
    }

    #[test]
    fn test_dont_match_name_skips_schema_attribute() {
        let schema = Schema::builder("org.mock.Anonymous")
            .flags(SchemaFlags::DONT_MATCH_NAME)
            .attribute("number", AttributeType::Integer)
            .build()
            .unwrap();
        let wire = encode(&schema, &AttributeSet::new().with("number", 7)).unwrap();
        assert!(!wire.contains_key(SCHEMA_ATTRIBUTE));

        let err = encode_for_matching(&schema, &AttributeSet::new()).unwrap_err();
        assert!(matches!(err, ValidationError::EmptyTable(_)));
    }

    #[test]
    fn test_empty_selector_matches_by_name() {
        let wire = encode_for_matching(&mock_schema(), &AttributeSet::new()).unwrap();
        assert_eq!(wire.len(), 1);
        assert!(wire.contains_key(SCHEMA_ATTRIBUTE));
    }

    #[test]
    fn test_decode_rejects_malformed_values() {
        let schema = mock_schema();
        for (name, value) in [
            ("number", "two"),
            ("number", "+2"),
            ("number", "02"),
            ("number", ""),
            ("even", "yes"),
            ("even", "TRUE"),
        ] {
            let wire: WireAttributes = [(name.to_string(), value.to_string())].into();
            let err = decode(&schema, &wire).unwrap_err();
            assert!(
                matches!(err, ValidationError::MalformedWireValue { .. }),
                "{name}={value} should be malformed, got {err:?}"
            );
        }
    }

    #[test]
    fn test_decode_schema_attribute() {
        let schema = mock_schema();
        let mut wire = encode(&schema, &two()).unwrap();
        wire.insert("gkr:legacy".to_string(), "ignored".to_string());
        assert_eq!(decode(&schema, &wire).unwrap(), two());

        wire.insert(SCHEMA_ATTRIBUTE.to_string(), "org.other.Schema".to_string());
        assert!(matches!(
            validate_wire(&schema, &wire),
            Err(ValidationError::MismatchedSchema { .. })
        ));
    }

    #[test]
    fn test_attribute_set_from_iter() {
        let set: AttributeSet = [("string", "one"), ("other", "two")].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("string").and_then(AttributeValue::as_str), Some("one"));
    }

    fn arb_value(ty: AttributeType) -> BoxedStrategy<AttributeValue> {
        match ty {
            AttributeType::String => ".*".prop_map(AttributeValue::String).boxed(),
            AttributeType::Integer => any::<i64>().prop_map(AttributeValue::Integer).boxed(),
            AttributeType::Boolean => any::<bool>().prop_map(AttributeValue::Boolean).boxed(),
        }
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(
            number in proptest::option::of(arb_value(AttributeType::Integer)),
            string in proptest::option::of(arb_value(AttributeType::String)),
            even in proptest::option::of(arb_value(AttributeType::Boolean)),
        ) {
            let schema = mock_schema();
            let mut attrs = AttributeSet::new();
            for (name, value) in [("number", number), ("string", string), ("even", even)] {
                if let Some(value) = value {
                    attrs.insert(name, value);
                }
            }

            let wire = encode(&schema, &attrs).unwrap();
            let decoded = decode(&schema, &wire).unwrap();
            prop_assert_eq!(&decoded, &attrs);
            prop_assert_eq!(encode(&schema, &decoded).unwrap(), wire);
        }
    }
}
