//
// session_identity.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;

use crate::error::BKError;

/// The identity every endpoint of one embedded kernel signs messages with.
///
/// Created once at startup and never regenerated; shared by reference
/// (`Arc<SessionIdentity>`) between the endpoints.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    /// The ID of the session
    pub session_id: String,

    /// The username recorded in message headers
    pub username: String,

    /// The signing key, as it appears in the connection file
    key: String,

    /// The HMAC key used to sign messages; None when the key is empty
    hmac_key: Option<Hmac<Sha256>>,
}

impl SessionIdentity {
    /// Create an identity with a fresh random key.
    pub fn generate(username: &str) -> Result<Self, BKError> {
        let key_bytes = rand::thread_rng().gen::<[u8; 16]>();
        Self::with_key(username, hex::encode(key_bytes))
    }

    /// Create an identity around an existing key. An empty key disables
    /// signing.
    pub fn with_key(username: &str, key: String) -> Result<Self, BKError> {
        let hmac_key = if key.is_empty() {
            None
        } else {
            Some(
                Hmac::<Sha256>::new_from_slice(key.as_bytes())
                    .map_err(|e| BKError::InvalidKey(e.to_string()))?,
            )
        };

        Ok(Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
            key,
            hmac_key,
        })
    }

    /// The key as written to the connection file.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Compute the hex signature over the given message parts. Returns an
    /// empty string for an unauthenticated session.
    pub fn sign(&self, parts: &[&[u8]]) -> String {
        match self.hmac_key {
            Some(ref key) => {
                let mut signature = key.clone();
                for part in parts {
                    signature.update(part);
                }
                hex::encode(signature.finalize().into_bytes())
            }
            None => String::new(),
        }
    }

    /// Check a signature received from a peer.
    pub fn verify(&self, parts: &[&[u8]], signature: &str) -> bool {
        match self.hmac_key {
            Some(ref key) => {
                let expected = match hex::decode(signature) {
                    Ok(bytes) => bytes,
                    Err(_) => return false,
                };
                let mut mac = key.clone();
                for part in parts {
                    mac.update(part);
                }
                mac.verify_slice(&expected).is_ok()
            }
            None => true,
        }
    }
}
