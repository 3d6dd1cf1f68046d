use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use super::error::{GatewayError, GatewayResult, InvalidIdSnafu};

// Macro keeps all ID wrappers structurally identical, so gateway backends stay predictable.
macro_rules! define_entity_id {
    ($name:ident, $id_type:literal) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            Serialize,
            Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn new(raw: i64) -> Self {
                Self(raw)
            }

            pub fn parse(raw: &str) -> GatewayResult<Self> {
                let parsed = raw.trim().parse::<i64>().context(InvalidIdSnafu {
                    stage: "parse-entity-id",
                    id_type: $id_type,
                    raw: raw.to_string(),
                })?;
                Ok(Self(parsed))
            }

            pub fn value(&self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self::new(value)
            }
        }

        impl From<$name> for i64 {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl FromStr for $name {
            type Err = GatewayError;

            fn from_str(raw: &str) -> GatewayResult<Self> {
                Self::parse(raw)
            }
        }
    };
}

define_entity_id!(UserId, "user-id");
define_entity_id!(ChatId, "chat-id");
define_entity_id!(MessageId, "message-id");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_round_trips_numeric_ids() {
        let id = ChatId::parse("42").unwrap();
        assert_eq!(id, ChatId::new(42));
        assert_eq!(id.to_string(), "42");
        assert_eq!(i64::from(id), 42);
    }

    #[test]
    fn rejects_non_numeric_ids() {
        let error = UserId::parse("temp_7").unwrap_err();
        assert!(matches!(error, GatewayError::InvalidId { .. }));
    }
}
