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

//! Canonical content hashing.
//!
//! Every content-addressed id in this crate (object ids, snapshot ids,
//! commit ids) is the SHA-256 digest of a canonical byte serialization,
//! hex-encoded. Keeping the serialization in one place guarantees that two
//! equal logical values always hash identically, which is what gives
//! `put`, commit creation, and snapshot construction their idempotence.

use sha2::Digest as _;
use sha2::Sha256;

/// Running hasher used to build up a canonical serialization incrementally
/// without materializing it as a single `Vec<u8>` first.
#[derive(Default)]
pub struct CanonicalHasher(Sha256);

impl CanonicalHasher {
    pub fn new() -> Self {
        Self(Sha256::new())
    }

    pub fn update(&mut self, bytes: &[u8]) -> &mut Self {
        self.0.update(bytes);
        self
    }

    /// Writes `s` followed by a NUL separator. Used between fields of a
    /// canonical record so that e.g. `("a", "bc")` and `("ab", "c")` never
    /// collide.
    pub fn update_field(&mut self, s: &str) -> &mut Self {
        self.0.update(s.as_bytes());
        self.0.update([0u8]);
        self
    }

    pub fn finalize_hex(self) -> String {
        hex::encode(self.0.finalize())
    }
}

/// Hashes `bytes` and returns the lower-case hex digest, unprefixed.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_is_deterministic() {
        assert_eq!(sha256_hex(b"hello"), sha256_hex(b"hello"));
        assert_ne!(sha256_hex(b"hello"), sha256_hex(b"hellp"));
    }

    #[test]
    fn canonical_hasher_field_separator_avoids_collision() {
        let mut a = CanonicalHasher::new();
        a.update_field("a").update_field("bc");
        let mut b = CanonicalHasher::new();
        b.update_field("ab").update_field("c");
        assert_ne!(a.finalize_hex(), b.finalize_hex());
    }
}
