//! Attribute schemas.
//!
//! A [`Schema`] names the attributes an item may carry and fixes the type of
//! each one. Schemas are immutable once built and cheap to clone, so every
//! in-flight operation can hold its own handle.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Meta attribute carrying the schema name on the wire.
pub const SCHEMA_ATTRIBUTE: &str = "xdg:schema";

/// Prefix of legacy keyring attributes which are passed through untouched.
pub const LEGACY_ATTRIBUTE_PREFIX: &str = "gkr:";

/// Maximum number of attributes a schema may declare.
pub const MAX_ATTRIBUTES: usize = 32;

/// Type of a schema attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    String,
    Integer,
    Boolean,
}

impl AttributeType {
    /// Human-readable type name, used in error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behaviour flags for a schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SchemaFlags(u32);

impl SchemaFlags {
    /// No flags.
    pub const NONE: Self = Self(0);

    /// Attributes not declared by the schema are accepted as strings.
    pub const ALLOW_UNDEFINED: Self = Self(1 << 0);

    /// Do not add or match the `xdg:schema` meta attribute.
    pub const DONT_MATCH_NAME: Self = Self(1 << 1);

    /// Check whether all flags in `other` are set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Raw bit representation.
    pub fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for SchemaFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, PartialEq, Eq)]
struct SchemaInner {
    name: String,
    flags: SchemaFlags,
    attributes: BTreeMap<String, AttributeType>,
}

/// A named, typed attribute schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    inner: Arc<SchemaInner>,
}

impl Schema {
    /// Build a schema from a name, flags and attribute declarations.
    pub fn new<I, N>(
        name: impl Into<String>,
        flags: SchemaFlags,
        attributes: I,
    ) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (N, AttributeType)>,
        N: Into<String>,
    {
        let mut builder = SchemaBuilder::new(name).flags(flags);
        for (attr, ty) in attributes {
            builder = builder.attribute(attr, ty);
        }
        builder.build()
    }

    /// Start building a schema.
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name)
    }

    /// Schema identifier, e.g. `org.example.Password`.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Schema flags.
    pub fn flags(&self) -> SchemaFlags {
        self.inner.flags
    }

    /// Declared type of an attribute.
    pub fn attribute_type(&self, name: &str) -> Option<AttributeType> {
        self.inner.attributes.get(name).copied()
    }

    /// Declared attributes, ordered by name.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, AttributeType)> {
        self.inner.attributes.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Whether undeclared attributes are accepted.
    pub fn allows_undefined(&self) -> bool {
        self.inner.flags.contains(SchemaFlags::ALLOW_UNDEFINED)
    }

    /// Whether the schema name is stored and matched as `xdg:schema`.
    pub fn matches_name(&self) -> bool {
        !self.inner.flags.contains(SchemaFlags::DONT_MATCH_NAME)
    }
}

/// Builder for [`Schema`].
#[derive(Debug)]
pub struct SchemaBuilder {
    name: String,
    flags: SchemaFlags,
    attributes: Vec<(String, AttributeType)>,
}

impl SchemaBuilder {
    /// Create a builder for a schema with the given identifier.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: SchemaFlags::NONE,
            attributes: Vec::new(),
        }
    }

    /// Set the schema flags.
    pub fn flags(mut self, flags: SchemaFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Declare an attribute.
    pub fn attribute(mut self, name: impl Into<String>, ty: AttributeType) -> Self {
        self.attributes.push((name.into(), ty));
        self
    }

    /// Validate the declarations and build the schema.
    pub fn build(self) -> Result<Schema, ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::InvalidSchema(
                "schema name must not be empty".to_string(),
            ));
        }
        if self.attributes.len() > MAX_ATTRIBUTES {
            return Err(ValidationError::InvalidSchema(format!(
                "schema '{}' declares {} attributes, maximum is {MAX_ATTRIBUTES}",
                self.name,
                self.attributes.len()
            )));
        }

        let mut attributes = BTreeMap::new();
        for (attr, ty) in self.attributes {
            if attr.is_empty() || attr == SCHEMA_ATTRIBUTE {
                return Err(ValidationError::InvalidSchema(format!(
                    "schema '{}' declares reserved attribute name '{attr}'",
                    self.name
                )));
            }
            if let Some(previous) = attributes.insert(attr.clone(), ty) {
                if previous != ty {
                    return Err(ValidationError::InvalidSchema(format!(
                        "attribute '{attr}' declared as both {previous} and {ty}"
                    )));
                }
            }
        }

        Ok(Schema {
            inner: Arc::new(SchemaInner {
                name: self.name,
                flags: self.flags,
                attributes,
            }),
        })
    }
}

/// Schema for personal notes stored without any attributes.
pub fn note() -> Schema {
    Schema {
        inner: Arc::new(SchemaInner {
            name: "org.gnome.keyring.Note".to_string(),
            flags: SchemaFlags::NONE,
            attributes: BTreeMap::new(),
        }),
    }
}

/// Schema for network passwords written by older keyring clients.
pub fn compat_network() -> Schema {
    let attributes = [
        ("user", AttributeType::String),
        ("domain", AttributeType::String),
        ("object", AttributeType::String),
        ("protocol", AttributeType::String),
        ("port", AttributeType::Integer),
        ("server", AttributeType::String),
        ("authtype", AttributeType::String),
    ];
    Schema {
        inner: Arc::new(SchemaInner {
            name: "org.gnome.keyring.NetworkPassword".to_string(),
            flags: SchemaFlags::NONE,
            attributes: attributes
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }),
    }
}
