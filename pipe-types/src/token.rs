//! Rendezvous identity: session tokens and connection roles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

/// Number of random bytes in a [`Token`] (128 bits).
pub const TOKEN_BYTES: usize = 16;

/// A public rendezvous identifier.
///
/// 16 bytes of OS randomness, displayed as 32 lowercase hex characters.
/// Secrecy is not required, only unpredictability: the relay pairs the two
/// connections that present the same token.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Token([u8; TOKEN_BYTES]);

impl Token {
    /// Generate a fresh random token.
    pub fn generate() -> Result<Self, TypesError> {
        let mut bytes = [0u8; TOKEN_BYTES];
        getrandom::getrandom(&mut bytes).map_err(|e| TypesError::Entropy(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Create a token from raw bytes.
    pub fn from_bytes(bytes: [u8; TOKEN_BYTES]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes of this token.
    pub fn as_bytes(&self) -> &[u8; TOKEN_BYTES] {
        &self.0
    }
}

impl FromStr for Token {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != TOKEN_BYTES * 2 {
            return Err(TypesError::InvalidToken(format!(
                "expected {} hex characters, got {}",
                TOKEN_BYTES * 2,
                s.len()
            )));
        }
        let mut bytes = [0u8; TOKEN_BYTES];
        hex::decode_to_slice(s, &mut bytes).map_err(|e| TypesError::InvalidToken(e.to_string()))?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for Token {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Token> for String {
    fn from(token: Token) -> Self {
        token.to_string()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({})", &self.to_string()[..8])
    }
}

/// Which side of a pairing a connection takes.
///
/// The relay pairs exactly one `Offer` and one `Accept` connection per token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Offers a file (`/d/{token}` links: the peer downloads).
    Offer,
    /// Solicits a file (`/u/{token}` links: the peer uploads).
    Accept,
}

impl Role {
    /// Path segment used in pairing links.
    pub fn path_segment(self) -> &'static str {
        match self {
            Role::Offer => "d",
            Role::Accept => "u",
        }
    }

    /// Parse a pairing link path segment.
    pub fn from_path_segment(segment: &str) -> Result<Self, TypesError> {
        match segment {
            "d" => Ok(Role::Offer),
            "u" => Ok(Role::Accept),
            other => Err(TypesError::InvalidRole(other.to_string())),
        }
    }

    /// The role a partner connection must take.
    pub fn peer(self) -> Self {
        match self {
            Role::Offer => Role::Accept,
            Role::Accept => Role::Offer,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Offer => write!(f, "offer"),
            Role::Accept => write!(f, "accept"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_32_lowercase_hex_chars() {
        let token = Token::generate().unwrap();
        let text = token.to_string();
        assert_eq!(text.len(), 32);
        assert!(text
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn tokens_are_unique() {
        let a = Token::generate().unwrap();
        let b = Token::generate().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn token_parses_its_display_form() {
        let token = Token::generate().unwrap();
        let parsed: Token = token.to_string().parse().unwrap();
        assert_eq!(parsed, token);
    }

    #[test]
    fn token_rejects_wrong_length() {
        assert!(matches!(
            "abcd".parse::<Token>(),
            Err(TypesError::InvalidToken(_))
        ));
    }

    #[test]
    fn token_rejects_non_hex() {
        let text = "zz".repeat(16);
        assert!(matches!(
            text.parse::<Token>(),
            Err(TypesError::InvalidToken(_))
        ));
    }

    #[test]
    fn token_serializes_as_hex_string() {
        let token = Token::from_bytes([0xAB; TOKEN_BYTES]);
        let json = serde_json::to_string(&token).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(16)));
    }

    #[test]
    fn token_debug_is_truncated() {
        let token = Token::from_bytes([0x01; TOKEN_BYTES]);
        assert_eq!(format!("{:?}", token), "Token(01010101)");
    }

    #[test]
    fn role_path_segments() {
        assert_eq!(Role::Offer.path_segment(), "d");
        assert_eq!(Role::Accept.path_segment(), "u");
        assert_eq!(Role::from_path_segment("d").unwrap(), Role::Offer);
        assert_eq!(Role::from_path_segment("u").unwrap(), Role::Accept);
        assert!(Role::from_path_segment("x").is_err());
    }

    #[test]
    fn role_peer_is_opposite() {
        assert_eq!(Role::Offer.peer(), Role::Accept);
        assert_eq!(Role::Accept.peer(), Role::Offer);
    }
}
