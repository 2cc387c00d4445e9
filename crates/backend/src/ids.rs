use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use uuid::Uuid;

use super::error::{BackendError, BackendResult, InvalidIdSnafu};

// Every Hasura primary key in this schema is a `uuid`, so the wrappers share one shape.
macro_rules! define_backend_id {
    ($name:ident, $id_type:literal) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new(raw: Uuid) -> Self {
                Self(raw)
            }

            pub fn new_v4() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn parse(raw: &str) -> BackendResult<Self> {
                let parsed = Uuid::parse_str(raw).context(InvalidIdSnafu {
                    stage: "parse-backend-id",
                    id_type: $id_type,
                    raw: raw.to_string(),
                })?;
                Ok(Self(parsed))
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self::new(value)
            }
        }

        impl From<$name> for Uuid {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl FromStr for $name {
            type Err = BackendError;

            fn from_str(raw: &str) -> BackendResult<Self> {
                Self::parse(raw)
            }
        }
    };
}

define_backend_id!(ChatId, "chat-id");
define_backend_id!(MessageId, "message-id");
define_backend_id!(UserId, "user-id");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_non_uuid_input() {
        let error = ChatId::parse("c1").unwrap_err();
        assert!(matches!(
            error,
            BackendError::InvalidId {
                id_type: "chat-id",
                ..
            }
        ));
    }

    #[test]
    fn ids_serialize_as_bare_uuid_strings() {
        let raw = "3f0d1d7e-51a4-4cb5-9d0e-0a4f5e0b7c11";
        let id: MessageId = raw.parse().unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), format!("\"{raw}\""));
        assert_eq!(id.to_string(), raw);
    }
}
