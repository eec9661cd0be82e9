//! Request parameter value type

use std::fmt;

/// One `name=value` pair carried by a request, either in the query string
/// or in a form-encoded body.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Parameter {
    name: String,
    value: String,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Return a copy of this parameter with a different name and the same value
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self::new(name, self.value.clone())
    }

    /// Return a copy of this parameter with the same name and a different value
    pub fn with_value(&self, value: impl Into<String>) -> Self {
        Self::new(self.name.clone(), value)
    }

    pub fn as_pair(&self) -> (&str, &str) {
        (&self.name, &self.value)
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Join parameters as a raw query string without any percent-encoding.
///
/// Malformed and whitespace values are sent as-is so that the server's
/// tolerance of them can be observed.
pub fn raw_query(params: &[Parameter]) -> String {
    params
        .iter()
        .map(Parameter::to_string)
        .collect::<Vec<_>>()
        .join("&")
}
