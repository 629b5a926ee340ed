// SPDX-License-Identifier: MPL-2.0

use crate::atproto::uri::{self, ActorKind, InvalidReference, PostReference};
use std::future::Future;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("malformed post URL {url:?}: {reason}")]
    MalformedUrl { url: String, reason: String },
    #[error("could not resolve handle {handle:?}: {source}")]
    HandleResolution {
        handle: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("invalid post reference for {actor:?}: {reason}")]
    InvalidReference {
        actor: String,
        reason: InvalidReference,
    },
}

/// Turns a handle into a DID. Implemented by the network client; tests
/// swap in an in-memory table.
pub trait HandleLookup {
    type Error: std::error::Error + Send + Sync + 'static;

    fn lookup(&self, handle: &str) -> impl Future<Output = Result<String, Self::Error>> + Send;
}

/// Normalizes post links into [`PostReference`]s.
///
/// Holds nothing but the lookup capability, so one resolver can serve any
/// number of concurrent callers.
pub struct PostResolver<L> {
    lookup: L,
}

impl<L: HandleLookup + Sync> PostResolver<L> {
    pub fn new(lookup: L) -> Self {
        Self { lookup }
    }

    pub fn lookup(&self) -> &L {
        &self.lookup
    }

    /// One lookup round trip. The answer must look like a DID; anything else
    /// is treated as a failed resolution rather than used downstream.
    pub async fn resolve_handle(&self, handle: &str) -> Result<String, ResolveError> {
        debug!(handle, "resolving handle");

        let did = self
            .lookup
            .lookup(handle)
            .await
            .map_err(|e| ResolveError::HandleResolution {
                handle: handle.to_string(),
                source: Box::new(e),
            })?;

        if !did.starts_with("did:") {
            return Err(ResolveError::HandleResolution {
                handle: handle.to_string(),
                source: format!("lookup returned {did:?}, not a DID").into(),
            });
        }

        debug!(handle, %did, "resolved handle");
        Ok(did)
    }

    /// DID for an actor token that may be either a DID or a handle.
    ///
    /// A token that passes the weak `did` check but lacks the `did:` prefix
    /// is rejected rather than looked up.
    pub async fn resolve_actor(&self, actor: &str) -> Result<String, ResolveError> {
        match uri::classify(actor) {
            ActorKind::Did if actor.starts_with("did:") => Ok(actor.to_string()),
            ActorKind::Did => Err(ResolveError::InvalidReference {
                actor: actor.to_string(),
                reason: InvalidReference::Did,
            }),
            ActorKind::Handle => self.resolve_handle(actor).await,
        }
    }

    /// Address a post by actor (DID or handle) and record key.
    pub async fn resolve_post(
        &self,
        actor: &str,
        record_key: &str,
    ) -> Result<PostReference, ResolveError> {
        let did = self.resolve_actor(actor).await?;
        PostReference::new(did, record_key, None).map_err(|reason| {
            ResolveError::InvalidReference {
                actor: actor.to_string(),
                reason,
            }
        })
    }

    /// Resolve `https://bsky.app/profile/{actor}/post/{rkey}`.
    ///
    /// DID actors are used as-is; handles cost exactly one lookup.
    pub async fn resolve_post_url(&self, url: &str) -> Result<PostReference, ResolveError> {
        let malformed = |reason: String| ResolveError::MalformedUrl {
            url: url.to_string(),
            reason,
        };

        let parts = uri::split_post_url(url).map_err(malformed)?;

        let did = match uri::classify(&parts.actor) {
            ActorKind::Did => parts.actor,
            ActorKind::Handle => self.resolve_handle(&parts.actor).await?,
        };

        let reference = PostReference::new(did, parts.record_key, Some(url.trim().to_string()))
            .map_err(|e| malformed(e.to_string()))?;

        debug!(%reference, "resolved post URL");
        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Error, Debug)]
    #[error("handle not found: {0}")]
    struct NotFound(String);

    #[derive(Default)]
    struct TableLookup {
        table: HashMap<String, String>,
        calls: AtomicUsize,
        seen: Mutex<Vec<String>>,
    }

    impl TableLookup {
        fn with(handle: &str, did: &str) -> Self {
            let mut lookup = Self::default();
            lookup.table.insert(handle.to_string(), did.to_string());
            lookup
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl HandleLookup for TableLookup {
        type Error = NotFound;

        async fn lookup(&self, handle: &str) -> Result<String, NotFound> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(handle.to_string());
            self.table
                .get(handle)
                .cloned()
                .ok_or_else(|| NotFound(handle.to_string()))
        }
    }

    #[tokio::test]
    async fn test_did_url_skips_lookup() {
        let resolver = PostResolver::new(TableLookup::default());
        let url = "https://bsky.app/profile/did:plc:jfda6xfy4ncaf72omkvrbkko/post/3k2abc";

        let reference = resolver.resolve_post_url(url).await.unwrap();

        assert_eq!(reference.did(), "did:plc:jfda6xfy4ncaf72omkvrbkko");
        assert_eq!(reference.record_key(), "3k2abc");
        assert_eq!(reference.source_url(), Some(url));
        assert_eq!(resolver.lookup().calls(), 0);
    }

    #[tokio::test]
    async fn test_handle_url_looks_up_once() {
        let resolver =
            PostResolver::new(TableLookup::with("alice.bsky.social", "did:plc:alice"));

        let reference = resolver
            .resolve_post_url("https://bsky.app/profile/alice.bsky.social/post/3k2abc")
            .await
            .unwrap();

        assert_eq!(reference.did(), "did:plc:alice");
        assert_eq!(reference.record_key(), "3k2abc");
        assert_eq!(resolver.lookup().calls(), 1);
        assert_eq!(
            *resolver.lookup().seen.lock().unwrap(),
            vec!["alice.bsky.social".to_string()]
        );
    }

    #[tokio::test]
    async fn test_profile_only_url_is_malformed() {
        let resolver = PostResolver::new(TableLookup::default());
        let err = resolver
            .resolve_post_url("https://bsky.app/profile/did:plc:abc")
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::MalformedUrl { .. }));
        assert_eq!(resolver.lookup().calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_handle_propagates() {
        let resolver = PostResolver::new(TableLookup::default());
        let err = resolver
            .resolve_post_url("https://bsky.app/profile/nobody.bsky.social/post/3k2abc")
            .await
            .unwrap_err();

        match err {
            ResolveError::HandleResolution { handle, source } => {
                assert_eq!(handle, "nobody.bsky.social");
                assert_eq!(source.to_string(), "handle not found: nobody.bsky.social");
            }
            other => panic!("expected HandleResolution, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_lookup_returning_non_did_is_rejected() {
        let resolver = PostResolver::new(TableLookup::with("bob.test", "bob.test"));
        let err = resolver.resolve_handle("bob.test").await.unwrap_err();
        assert!(matches!(err, ResolveError::HandleResolution { .. }));
    }

    #[tokio::test]
    async fn test_did_prefixed_non_did_actor_is_malformed() {
        let resolver = PostResolver::new(TableLookup::default());
        let err = resolver
            .resolve_post_url("https://bsky.app/profile/didier.bsky.social/post/3k2abc")
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::MalformedUrl { .. }));
        assert_eq!(resolver.lookup().calls(), 0);
    }

    #[tokio::test]
    async fn test_padded_uppercase_url_resolves() {
        let resolver = PostResolver::new(TableLookup::default());
        let reference = resolver
            .resolve_post_url(" HTTPS://bsky.app/profile/did:plc:abc/post/3k2abc\n")
            .await
            .unwrap();
        assert_eq!(reference.did(), "did:plc:abc");
        assert_eq!(reference.record_key(), "3k2abc");
        assert_eq!(
            reference.source_url(),
            Some("HTTPS://bsky.app/profile/did:plc:abc/post/3k2abc")
        );
    }

    #[tokio::test]
    async fn test_resolve_actor_rejects_did_prefixed_handle() {
        let resolver = PostResolver::new(TableLookup::default());
        let err = resolver
            .resolve_actor("didier.bsky.social")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::InvalidReference {
                reason: InvalidReference::Did,
                ..
            }
        ));
        assert_eq!(resolver.lookup().calls(), 0);
    }

    #[tokio::test]
    async fn test_resolve_post_by_handle_and_rkey() {
        let resolver = PostResolver::new(TableLookup::with("alice.bsky.social", "did:plc:alice"));
        let reference = resolver
            .resolve_post("alice.bsky.social", "3k2abc")
            .await
            .unwrap();
        assert_eq!(reference.at_uri(), "at://did:plc:alice/app.bsky.feed.post/3k2abc");
        assert_eq!(reference.source_url(), None);
        assert_eq!(resolver.lookup().calls(), 1);
    }

    #[tokio::test]
    async fn test_resolve_post_rejects_bad_rkey() {
        let resolver = PostResolver::new(TableLookup::default());
        let err = resolver.resolve_post("did:plc:abc", "a/b").await.unwrap_err();
        assert!(matches!(
            err,
            ResolveError::InvalidReference {
                reason: InvalidReference::RecordKey,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_resolve_actor() {
        let resolver = PostResolver::new(TableLookup::with("alice.bsky.social", "did:plc:alice"));
        assert_eq!(
            resolver.resolve_actor("did:plc:bob").await.unwrap(),
            "did:plc:bob"
        );
        assert_eq!(
            resolver.resolve_actor("alice.bsky.social").await.unwrap(),
            "did:plc:alice"
        );
        assert_eq!(resolver.lookup().calls(), 1);
    }

    #[test]
    fn test_malformed_url_display() {
        let err = ResolveError::MalformedUrl {
            url: "https://bsky.app".to_string(),
            reason: "expected /profile/{actor}/post/{rkey}".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "malformed post URL \"https://bsky.app\": expected /profile/{actor}/post/{rkey}"
        );
    }
}
