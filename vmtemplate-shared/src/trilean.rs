//! Three-valued configuration flag.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A flag that distinguishes "not set" from an explicit `true` or `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Trilean {
    #[default]
    Unset,
    True,
    False,
}

impl Trilean {
    pub fn is_true(self) -> bool {
        self == Trilean::True
    }
}

impl From<bool> for Trilean {
    fn from(value: bool) -> Self {
        if value { Trilean::True } else { Trilean::False }
    }
}

impl From<Option<bool>> for Trilean {
    fn from(value: Option<bool>) -> Self {
        value.map(Trilean::from).unwrap_or_default()
    }
}

impl From<Trilean> for Option<bool> {
    fn from(value: Trilean) -> Self {
        match value {
            Trilean::Unset => None,
            Trilean::True => Some(true),
            Trilean::False => Some(false),
        }
    }
}

impl Serialize for Trilean {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Option::<bool>::from(*self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Trilean {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Option::<bool>::deserialize(deserializer)?.into())
    }
}
