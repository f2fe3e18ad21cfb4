//! Pairing links for AirPipe.
//!
//! A pairing link tells the other party where to meet and how to decrypt:
//!
//! ```text
//! https://relay.example.com/d/<token>#<base64-key>
//!         \_ relay host _/  \_/ \___/  \_ key _/
//!                          role token   (fragment, never sent to the relay)
//! ```
//!
//! `d` marks a sender offering a file, `u` a receiver soliciting one. The
//! relay itself is addressed with `ws://`/`wss://`; links use the matching
//! `http://`/`https://` scheme so browsers can open them.

use pipe_types::{Role, Token};
use url::Url;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Error type for pairing link operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingError {
    /// The relay address or link is not a valid URL.
    InvalidUrl(String),
    /// The URL scheme is not ws, wss, http or https.
    UnsupportedScheme(String),
    /// The link path does not end in `/<d|u>/<token>`.
    InvalidPath(String),
    /// The link has no key fragment.
    MissingKey,
}

impl std::fmt::Display for PairingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PairingError::InvalidUrl(msg) => write!(f, "invalid url: {}", msg),
            PairingError::UnsupportedScheme(s) => write!(f, "unsupported url scheme: {}", s),
            PairingError::InvalidPath(msg) => write!(f, "invalid pairing path: {}", msg),
            PairingError::MissingKey => write!(f, "pairing link has no key fragment"),
        }
    }
}

impl std::error::Error for PairingError {}

impl From<url::ParseError> for PairingError {
    fn from(e: url::ParseError) -> Self {
        PairingError::InvalidUrl(e.to_string())
    }
}

/// A parsed pairing link.
///
/// The key fragment is held as text; pipe-client turns it into a session key.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct PairingLink {
    /// Relay WebSocket base address (`ws://` or `wss://`), no trailing slash.
    #[zeroize(skip)]
    relay: String,
    #[zeroize(skip)]
    role: Role,
    #[zeroize(skip)]
    token: Token,
    key_text: String,
}

impl PairingLink {
    /// Create a link for a relay address (`ws://`, `wss://`, `http://` or `https://`).
    pub fn new(relay: &str, role: Role, token: Token, key_text: &str) -> Result<Self, PairingError> {
        let relay = with_scheme_family(Url::parse(relay)?, Family::WebSocket)?;
        Ok(Self {
            relay: trim_base(&relay),
            role,
            token,
            key_text: key_text.to_string(),
        })
    }

    /// Parse a link produced by [`PairingLink::to_url`] (or a browser peer).
    pub fn parse(link: &str) -> Result<Self, PairingError> {
        let mut url = Url::parse(link.trim())?;

        let key_text = match url.fragment() {
            Some(fragment) if !fragment.is_empty() => fragment.to_string(),
            _ => return Err(PairingError::MissingKey),
        };
        url.set_fragment(None);
        url.set_query(None);

        let segments: Vec<String> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).map(str::to_string).collect())
            .unwrap_or_default();
        if segments.len() < 2 {
            return Err(PairingError::InvalidPath(url.path().to_string()));
        }
        let (prefix, tail) = segments.split_at(segments.len() - 2);
        let role = Role::from_path_segment(&tail[0])
            .map_err(|e| PairingError::InvalidPath(e.to_string()))?;
        let token: Token = tail[1]
            .parse()
            .map_err(|e: pipe_types::TypesError| PairingError::InvalidPath(e.to_string()))?;

        let mut base = url.clone();
        base.set_path(&prefix.join("/"));
        let relay = with_scheme_family(base, Family::WebSocket)?;

        Ok(Self {
            relay: trim_base(&relay),
            role,
            token,
            key_text,
        })
    }

    /// Render the shareable `http(s)://host/<d|u>/<token>#<key>` URL.
    pub fn to_url(&self) -> Result<String, PairingError> {
        let http = with_scheme_family(Url::parse(&self.relay)?, Family::Http)?;
        Ok(format!(
            "{}/{}/{}#{}",
            trim_base(&http),
            self.role.path_segment(),
            self.token,
            self.key_text
        ))
    }

    /// Relay WebSocket base address.
    pub fn relay(&self) -> &str {
        &self.relay
    }

    /// Role of the party that created the link.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Rendezvous token.
    pub fn token(&self) -> Token {
        self.token
    }

    /// Key fragment text.
    pub fn key_text(&self) -> &str {
        &self.key_text
    }
}

// Intentionally opaque debug to avoid logging the key
impl std::fmt::Debug for PairingLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingLink")
            .field("relay", &self.relay)
            .field("role", &self.role)
            .field("token", &self.token)
            .field("key_text", &"[REDACTED]")
            .finish()
    }
}

#[derive(Clone, Copy)]
enum Family {
    WebSocket,
    Http,
}

fn with_scheme_family(mut url: Url, family: Family) -> Result<Url, PairingError> {
    let target = match (url.scheme(), family) {
        ("ws", Family::WebSocket) | ("http", Family::WebSocket) => "ws",
        ("wss", Family::WebSocket) | ("https", Family::WebSocket) => "wss",
        ("ws", Family::Http) | ("http", Family::Http) => "http",
        ("wss", Family::Http) | ("https", Family::Http) => "https",
        (other, _) => return Err(PairingError::UnsupportedScheme(other.to_string())),
    };
    if url.scheme() != target {
        url.set_scheme(target)
            .map_err(|_| PairingError::UnsupportedScheme(target.to_string()))?;
    }
    Ok(url)
}

fn trim_base(url: &Url) -> String {
    url.as_str().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> Token {
        Token::from_bytes([0x5A; 16])
    }

    #[test]
    fn wss_relay_renders_https_link() {
        let link = PairingLink::new("wss://airpipe.example.com", Role::Offer, token(), "KEY").unwrap();
        assert_eq!(
            link.to_url().unwrap(),
            format!("https://airpipe.example.com/d/{}#KEY", "5a".repeat(16))
        );
    }

    #[test]
    fn ws_relay_renders_http_link_with_port() {
        let link = PairingLink::new("ws://127.0.0.1:9000/", Role::Accept, token(), "k").unwrap();
        assert_eq!(
            link.to_url().unwrap(),
            format!("http://127.0.0.1:9000/u/{}#k", "5a".repeat(16))
        );
        assert_eq!(link.relay(), "ws://127.0.0.1:9000");
    }

    #[test]
    fn parse_reverses_to_url() {
        let link = PairingLink::new("wss://relay.example.com/pipe", Role::Offer, token(), "abc-_").unwrap();
        let parsed = PairingLink::parse(&link.to_url().unwrap()).unwrap();

        assert_eq!(parsed, link);
        assert_eq!(parsed.relay(), "wss://relay.example.com/pipe");
        assert_eq!(parsed.role(), Role::Offer);
        assert_eq!(parsed.token(), token());
        assert_eq!(parsed.key_text(), "abc-_");
    }

    #[test]
    fn parse_requires_fragment() {
        let url = format!("https://relay.example.com/d/{}", "5a".repeat(16));
        assert_eq!(PairingLink::parse(&url), Err(PairingError::MissingKey));
    }

    #[test]
    fn parse_rejects_unknown_role() {
        let url = format!("https://relay.example.com/x/{}#k", "5a".repeat(16));
        assert!(matches!(
            PairingLink::parse(&url),
            Err(PairingError::InvalidPath(_))
        ));
    }

    #[test]
    fn parse_rejects_bad_token() {
        assert!(matches!(
            PairingLink::parse("https://relay.example.com/u/short#k"),
            Err(PairingError::InvalidPath(_))
        ));
    }

    #[test]
    fn rejects_unsupported_scheme() {
        assert!(matches!(
            PairingLink::new("ftp://relay.example.com", Role::Offer, token(), "k"),
            Err(PairingError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            PairingLink::parse("not a url"),
            Err(PairingError::InvalidUrl(_))
        ));
    }

    #[test]
    fn debug_is_redacted() {
        let link = PairingLink::new("wss://r.example.com", Role::Offer, token(), "SECRETKEY").unwrap();
        let debug = format!("{:?}", link);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("SECRETKEY"));
    }
}
