//! Opaque identifier newtypes.
//!
//! Every entity is keyed by a 16-byte UUID (spec.md §6.4: "Primary keys are
//! 16-byte UUIDs, for opacity and to resist IDOR"). Wrapping `Uuid` per
//! entity instead of passing bare `Uuid` around keeps `place_bid(auction_id,
//! user_id, ...)` from compiling with the arguments swapped.

use async_graphql::{InputValueError, InputValueResult, Scalar, ScalarType, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
        )]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn nil() -> Self {
                Self(Uuid::nil())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $name {
            fn from(u: Uuid) -> Self {
                Self(u)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        #[Scalar(name = stringify!($name))]
        impl ScalarType for $name {
            fn parse(value: Value) -> InputValueResult<Self> {
                match &value {
                    Value::String(s) => Uuid::parse_str(s)
                        .map(Self)
                        .map_err(|e| InputValueError::custom(e.to_string())),
                    _ => Err(InputValueError::expected_type(value)),
                }
            }

            fn to_value(&self) -> Value {
                Value::String(self.0.to_string())
            }
        }
    };
}

uuid_id!(UserId);
uuid_id!(ProductId);
uuid_id!(AuctionId);
uuid_id!(BidId);
uuid_id!(WalletId);
uuid_id!(WalletTransactionId);
uuid_id!(WithdrawalRequestId);
