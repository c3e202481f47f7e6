//! Newtype IDs for type-safe entity references.
//!
//! Use the `define_id!` macro for rows owned by the local store (UUID keys) and
//! `define_external_id!` for references to records owned by the payment gateway
//! (opaque string keys such as `pi_...` or `cus_...`). Distinct types prevent
//! accidentally mixing, say, a seller ID with a buyer's user ID.

pub use uuid::Uuid;

/// Macro to define a type-safe UUID wrapper for a locally stored entity.
///
/// Creates a newtype wrapper around [`Uuid`] with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_uuid()`
/// - `From<Uuid>`, `Into<Uuid>`, `Display` and `FromStr` implementations
/// - `sqlx` `Type`, `Encode`, and `Decode` implementations (with `postgres` feature)
///
/// # Example
///
/// ```rust
/// # use localmart_core::{define_id, Uuid};
/// define_id!(WarehouseId);
/// define_id!(ShipmentId);
///
/// let warehouse_id = WarehouseId::new(Uuid::nil());
/// let shipment_id = ShipmentId::new(Uuid::nil());
///
/// // These are different types, so this won't compile:
/// // let _: WarehouseId = shipment_id;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name($crate::Uuid);

        impl $name {
            /// Create a new ID from a UUID value.
            #[must_use]
            pub const fn new(id: $crate::Uuid) -> Self {
                Self(id)
            }

            /// Generate a fresh random (v4) ID.
            #[must_use]
            pub fn random() -> Self {
                Self($crate::Uuid::new_v4())
            }

            /// Get the underlying UUID value.
            #[must_use]
            pub const fn as_uuid(&self) -> $crate::Uuid {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = $crate::types::id::IdParseError;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                $crate::Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|_| $crate::types::id::IdParseError(s.to_owned()))
            }
        }

        impl From<$crate::Uuid> for $name {
            fn from(id: $crate::Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for $crate::Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Type<::sqlx::Postgres> for $name {
            fn type_info() -> ::sqlx::postgres::PgTypeInfo {
                <$crate::Uuid as ::sqlx::Type<::sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &::sqlx::postgres::PgTypeInfo) -> bool {
                <$crate::Uuid as ::sqlx::Type<::sqlx::Postgres>>::compatible(ty)
            }
        }

        #[cfg(feature = "postgres")]
        impl<'r> ::sqlx::Decode<'r, ::sqlx::Postgres> for $name {
            fn decode(
                value: ::sqlx::postgres::PgValueRef<'r>,
            ) -> ::core::result::Result<Self, ::sqlx::error::BoxDynError> {
                let id = <$crate::Uuid as ::sqlx::Decode<::sqlx::Postgres>>::decode(value)?;
                Ok(Self(id))
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Encode<'_, ::sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut ::sqlx::postgres::PgArgumentBuffer,
            ) -> ::std::result::Result<::sqlx::encode::IsNull, ::sqlx::error::BoxDynError> {
                <$crate::Uuid as ::sqlx::Encode<::sqlx::Postgres>>::encode_by_ref(&self.0, buf)
            }
        }
    };
}

/// Macro to define a wrapper for an identifier owned by the payment gateway.
///
/// Gateway identifiers are opaque strings of ASCII letters, digits and
/// underscores (see [`is_gateway_id`]). Values are interpolated into gateway
/// request paths, so anything else is rejected at construction, including on
/// deserialization. Stored locally as `TEXT` (with the `postgres` feature).
#[macro_export]
macro_rules! define_external_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Create a new ID, returning `None` when the trimmed value is not a
            /// well-formed gateway identifier.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Option<Self> {
                let id = id.into();
                let trimmed = id.trim();
                if !$crate::types::id::is_gateway_id(trimmed) {
                    return None;
                }
                if trimmed.len() == id.len() {
                    Some(Self(id))
                } else {
                    Some(Self(trimmed.to_owned()))
                }
            }

            /// Get the underlying string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = $crate::types::id::IdParseError;

            fn try_from(id: String) -> ::core::result::Result<Self, Self::Error> {
                Self::new(id.as_str()).ok_or($crate::types::id::IdParseError(id))
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = $crate::types::id::IdParseError;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                Self::new(s).ok_or_else(|| $crate::types::id::IdParseError(s.to_owned()))
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Type<::sqlx::Postgres> for $name {
            fn type_info() -> ::sqlx::postgres::PgTypeInfo {
                <String as ::sqlx::Type<::sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &::sqlx::postgres::PgTypeInfo) -> bool {
                <String as ::sqlx::Type<::sqlx::Postgres>>::compatible(ty)
            }
        }

        #[cfg(feature = "postgres")]
        impl<'r> ::sqlx::Decode<'r, ::sqlx::Postgres> for $name {
            fn decode(
                value: ::sqlx::postgres::PgValueRef<'r>,
            ) -> ::core::result::Result<Self, ::sqlx::error::BoxDynError> {
                let id = <String as ::sqlx::Decode<::sqlx::Postgres>>::decode(value)?;
                Self::new(id).ok_or_else(|| "malformed gateway identifier".into())
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Encode<'_, ::sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut ::sqlx::postgres::PgArgumentBuffer,
            ) -> ::std::result::Result<::sqlx::encode::IsNull, ::sqlx::error::BoxDynError> {
                <String as ::sqlx::Encode<::sqlx::Postgres>>::encode_by_ref(&self.0, buf)
            }
        }
    };
}

/// Longest gateway identifier accepted.
pub const MAX_GATEWAY_ID_LEN: usize = 255;

/// Whether `id` is a well-formed gateway identifier: non-empty, at most
/// [`MAX_GATEWAY_ID_LEN`] bytes, and only ASCII letters, digits or `_`.
#[must_use]
pub fn is_gateway_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_GATEWAY_ID_LEN
        && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Error returned when a string cannot be parsed into an ID.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid identifier: {0:?}")]
pub struct IdParseError(pub String);

// Locally stored entities
define_id!(UserId);
define_id!(SellerId);
define_id!(ProductId);
define_id!(OrderId);
define_id!(OrderItemId);

// Gateway-owned records
define_external_id!(PaymentIntentId);
define_external_id!(CustomerId);
define_external_id!(PaymentMethodId);
define_external_id!(AccountId);
