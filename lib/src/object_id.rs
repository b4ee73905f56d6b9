// Copyright 2024 The Muse Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Defines newtype wrappers for the content-addressed ids used throughout
//! the crate (object ids, snapshot ids, commit ids). Each is a lower-case
//! 64-character hex SHA-256 digest; the wrapper exists so the compiler
//! keeps us from passing an object id where a commit id is expected.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid hex id {value:?}: expected 64 lower-case hex characters")]
pub struct InvalidHexId {
    pub value: String,
}

/// Defines a `$name` newtype around a hex SHA-256 digest string, with
/// parsing, hex accessors, and prefix matching (used for short-id
/// resolution in `CommitsByPrefix`).
macro_rules! hex_id_type {
    ($(#[$attr:meta])* $vis:vis $name:ident) => {
        $(#[$attr])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        $vis struct $name(String);

        impl $name {
            /// Wraps an already-validated lower-case hex digest. Used by
            /// code that just computed the digest itself.
            pub fn from_hex_unchecked(hex: impl Into<String>) -> Self {
                let hex = hex.into();
                debug_assert!(is_lower_hex_sha256(&hex), "not a valid hex digest: {hex}");
                Self(hex)
            }

            /// Parses and validates a hex string, e.g. one read from disk
            /// or received over the network.
            pub fn parse(hex: &str) -> Result<Self, $crate::object_id::InvalidHexId> {
                if is_lower_hex_sha256(hex) {
                    Ok(Self(hex.to_string()))
                } else {
                    Err($crate::object_id::InvalidHexId { value: hex.to_string() })
                }
            }

            pub fn as_hex(&self) -> &str {
                &self.0
            }

            pub fn into_hex(self) -> String {
                self.0
            }

            /// Whether `self` starts with `prefix` (case-insensitive is not
            /// needed: both sides are already lower-case hex).
            pub fn starts_with(&self, prefix: &str) -> bool {
                self.0.starts_with(prefix)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                $name::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

fn is_lower_hex_sha256(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

pub(crate) use hex_id_type;

hex_id_type!(
    /// Id of a single immutable blob in the object store.
    pub ObjectId
);
