//! Dialog tokens
//!
//! When the service attaches itself to a call dialog it leaves a token with
//! the host's dialog tracking so that later in-dialog requests (the BYE) can
//! be filed under the same call. The token has the form
//!
//! ```text
//! <storage timestamp>_<id>_<base64 owner identity>
//! ```
//!
//! Standard base64 never contains `_`, so the token splits unambiguously.

use std::fmt;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::errors::{CallHistoryError, Result};

const SEPARATOR: char = '_';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogToken {
    /// Storage timestamp of the call start
    pub timestamp: String,
    /// Random component of the call's unique id
    pub id: String,
    pub owner_identity: String,
}

impl DialogToken {
    pub fn new(
        timestamp: impl Into<String>,
        id: impl Into<String>,
        owner_identity: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: timestamp.into(),
            id: id.into(),
            owner_identity: owner_identity.into(),
        }
    }

    pub fn encode(&self) -> String {
        format!(
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            self.timestamp,
            self.id,
            STANDARD.encode(self.owner_identity.as_bytes())
        )
    }

    pub fn decode(token: &str) -> Result<Self> {
        let invalid = || CallHistoryError::InvalidDialogToken(token.to_string());

        let mut parts = token.splitn(3, SEPARATOR);
        let (timestamp, id, encoded_owner) = match (parts.next(), parts.next(), parts.next()) {
            (Some(timestamp), Some(id), Some(owner))
                if !timestamp.is_empty() && !id.is_empty() && !owner.is_empty() =>
            {
                (timestamp, id, owner)
            }
            _ => return Err(invalid()),
        };

        let owner_bytes = STANDARD.decode(encoded_owner).map_err(|_| invalid())?;
        let owner_identity = String::from_utf8(owner_bytes).map_err(|_| invalid())?;

        Ok(Self::new(timestamp, id, owner_identity))
    }

    pub fn unique_id(&self) -> String {
        format!("{}{SEPARATOR}{}", self.timestamp, self.id)
    }
}

impl fmt::Display for DialogToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
