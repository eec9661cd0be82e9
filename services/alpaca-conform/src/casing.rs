//! Exact wire spellings of Alpaca envelope and response fields
//!
//! Both the case generator (when it deliberately mis-cases a name) and the
//! response validator (when it checks that a name is spelled exactly) read
//! spellings from this table.

use std::fmt;

/// A field or parameter whose wire spelling is fixed by the Alpaca protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    ClientId,
    ClientTransactionId,
    ServerTransactionId,
    ErrorNumber,
    ErrorMessage,
    Value,
    Minimum,
    Maximum,
    Name,
    Type,
    Rank,
    Dimension0Length,
    Dimension1Length,
    Dimension2Length,
}

impl Field {
    /// The exact, case-sensitive spelling used on the wire
    pub const fn wire_name(self) -> &'static str {
        match self {
            Field::ClientId => "ClientID",
            Field::ClientTransactionId => "ClientTransactionID",
            Field::ServerTransactionId => "ServerTransactionID",
            Field::ErrorNumber => "ErrorNumber",
            Field::ErrorMessage => "ErrorMessage",
            Field::Value => "Value",
            Field::Minimum => "Minimum",
            Field::Maximum => "Maximum",
            Field::Name => "Name",
            Field::Type => "Type",
            Field::Rank => "Rank",
            Field::Dimension0Length => "Dimension0Length",
            Field::Dimension1Length => "Dimension1Length",
            Field::Dimension2Length => "Dimension2Length",
        }
    }

    /// Fields every JSON response envelope must carry
    pub const ENVELOPE: [Field; 4] = [
        Field::ClientTransactionId,
        Field::ServerTransactionId,
        Field::ErrorNumber,
        Field::ErrorMessage,
    ];

    /// Fields required instead of `Value` in a Base64 hand-off response
    pub const BASE64_HANDOFF: [Field; 5] = [
        Field::Type,
        Field::Rank,
        Field::Dimension0Length,
        Field::Dimension1Length,
        Field::Dimension2Length,
    ];
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Swap upper and lower case character by character: `ClientID` becomes `cLIENTid`
pub fn invert_case(name: &str) -> String {
    name.chars()
        .flat_map(|c| {
            if c.is_uppercase() {
                c.to_lowercase().collect::<Vec<_>>()
            } else if c.is_lowercase() {
                c.to_uppercase().collect::<Vec<_>>()
            } else {
                vec![c]
            }
        })
        .collect()
}

/// Result of looking up a field in a JSON object
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<'a> {
    /// Present with the exact expected spelling
    Exact(&'a serde_json::Value),
    /// Present, but spelled with different casing
    Miscased {
        actual: &'a str,
        value: &'a serde_json::Value,
    },
    Missing,
}

impl<'a> Lookup<'a> {
    /// The value regardless of casing
    pub fn value(&self) -> Option<&'a serde_json::Value> {
        match self {
            Lookup::Exact(v) => Some(v),
            Lookup::Miscased { value, .. } => Some(value),
            Lookup::Missing => None,
        }
    }
}

/// Look up `field` in `object`, first exactly and then case-insensitively
pub fn lookup<'a>(
    object: &'a serde_json::Map<String, serde_json::Value>,
    field: Field,
) -> Lookup<'a> {
    let wire = field.wire_name();
    if let Some(value) = object.get(wire) {
        return Lookup::Exact(value);
    }
    object
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(wire))
        .map(|(key, value)| Lookup::Miscased {
            actual: key.as_str(),
            value,
        })
        .unwrap_or(Lookup::Missing)
}
