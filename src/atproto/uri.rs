// SPDX-License-Identifier: MPL-2.0

//! Conversions between the three ways a post gets referenced.
//!
//! - web URL: `https://bsky.app/profile/{actor}/post/{rkey}`
//! - protocol URI: `at://{did}/app.bsky.feed.post/{rkey}`
//! - [`PostReference`]: a resolved `(did, rkey)` pair
//!
//! Everything here is pure parsing and formatting. Handle lookups live in
//! [`crate::atproto::resolver`].

use crate::config::{POST_COLLECTION, WEB_PROFILE_PREFIX};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use url::Url;

/// Whether an actor token from a URL is already a DID or still needs lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorKind {
    Did,
    Handle,
}

/// Cheap DID/handle split.
///
/// Only the three-character `did` prefix is checked; this is not DID syntax
/// validation. Callers that need the stronger `did:` guarantee get it from
/// [`PostReference::new`].
pub fn classify(token: &str) -> ActorKind {
    if token.starts_with("did") {
        ActorKind::Did
    } else {
        ActorKind::Handle
    }
}

/// `at://{did}/app.bsky.feed.post/{rkey}`, or `None` when either part is empty.
pub fn to_protocol_uri(did: &str, record_key: &str) -> Option<String> {
    if did.is_empty() || record_key.is_empty() {
        return None;
    }
    Some(format!("at://{did}/{POST_COLLECTION}/{record_key}"))
}

/// Rewrite an `at://` URI into a bsky.app link.
///
/// This is a textual substitution, not a parse. URIs for other collections
/// (likes, reposts) get the same two replacements and will not point at a
/// real page.
pub fn protocol_uri_to_url(at_uri: &str) -> String {
    at_uri
        .replace("at://", WEB_PROFILE_PREFIX)
        .replace(POST_COLLECTION, "post")
}

/// Link to an actor's profile page. Works for both DIDs and handles.
pub fn profile_url(actor: &str) -> String {
    format!("{WEB_PROFILE_PREFIX}{actor}")
}

/// A record address, `at://{repo}/{collection}/{rkey}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtUri {
    pub repo: String,
    pub collection: String,
    pub rkey: String,
}

// Repo must already be a DID; handle-based at:// URIs are not resolved here
static RECORD_URI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^at://(?P<repo>did:[^/]+)/(?P<collection>[a-zA-Z0-9.-]+)/(?P<rkey>[^/]+)$")
        .unwrap()
});

impl FromStr for AtUri {
    type Err = InvalidReference;

    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let caps = RECORD_URI_RE
            .captures(uri)
            .ok_or(InvalidReference::AtUri)?;
        Ok(Self {
            repo: caps["repo"].to_string(),
            collection: caps["collection"].to_string(),
            rkey: caps["rkey"].to_string(),
        })
    }
}

/// Actor and record key pulled out of a post URL, before any lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PostUrlParts {
    pub actor: String,
    pub record_key: String,
}

const POST_PATH_SHAPE: &str = "expected /profile/{actor}/post/{rkey}";

/// Positional parse of `{scheme}://{host}/profile/{actor}/post/{rkey}[/...]`.
///
/// Surrounding whitespace and scheme case are normalized by the URL parser;
/// query and fragment are ignored. Returns the reason on failure so the
/// caller can build a `MalformedUrl`.
pub(crate) fn split_post_url(input: &str) -> Result<PostUrlParts, String> {
    let url = Url::parse(input).map_err(|e| e.to_string())?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme {:?}", url.scheme()));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err("missing host".to_string());
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|segments| segments.collect())
        .unwrap_or_default();

    match segments.as_slice() {
        ["profile", actor, "post", rkey, ..] => {
            if actor.is_empty() {
                return Err("empty actor".to_string());
            }
            if rkey.is_empty() {
                return Err("empty record key".to_string());
            }
            Ok(PostUrlParts {
                actor: actor.to_string(),
                record_key: rkey.to_string(),
            })
        }
        _ => Err(POST_PATH_SHAPE.to_string()),
    }
}

/// Why a [`PostReference`] could not be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReference {
    Did,
    RecordKey,
    AtUri,
}

impl fmt::Display for InvalidReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidReference::Did => write!(f, "DID must start with \"did:\""),
            InvalidReference::RecordKey => write!(f, "record key must be non-empty without '/'"),
            InvalidReference::AtUri => write!(f, "expected at://{{did}}/{{collection}}/{{rkey}}"),
        }
    }
}

impl std::error::Error for InvalidReference {}

/// A post resolved down to repository and record key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PostReference {
    did: String,
    record_key: String,
    source_url: Option<String>,
}

impl PostReference {
    pub fn new(
        did: impl Into<String>,
        record_key: impl Into<String>,
        source_url: Option<String>,
    ) -> Result<Self, InvalidReference> {
        let did = did.into();
        let record_key = record_key.into();

        if !did.starts_with("did:") {
            return Err(InvalidReference::Did);
        }
        if record_key.is_empty() || record_key.contains('/') {
            return Err(InvalidReference::RecordKey);
        }

        Ok(Self {
            did,
            record_key,
            source_url,
        })
    }

    /// Build from a post's `at://` URI. Other collections are rejected.
    pub fn from_at_uri(uri: &str) -> Result<Self, InvalidReference> {
        let parsed: AtUri = uri.parse()?;
        if parsed.collection != POST_COLLECTION {
            return Err(InvalidReference::AtUri);
        }
        Self::new(parsed.repo, parsed.rkey, None)
    }

    pub fn did(&self) -> &str {
        &self.did
    }

    pub fn record_key(&self) -> &str {
        &self.record_key
    }

    /// The URL this reference was resolved from, if any.
    pub fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref()
    }

    pub fn at_uri(&self) -> String {
        format!("at://{}/{POST_COLLECTION}/{}", self.did, self.record_key)
    }

    /// Canonical DID-based link, independent of how the post was first named.
    pub fn web_url(&self) -> String {
        protocol_uri_to_url(&self.at_uri())
    }
}

impl fmt::Display for PostReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.at_uri())
    }
}
