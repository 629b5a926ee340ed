// SPDX-License-Identifier: MPL-2.0

use crate::atproto::resolver::HandleLookup;
use crate::atproto::types::{
    FeedItem, ImageEmbed, Media, Post, Profile, Session, StrongRef, VideoEmbed,
};
use crate::atproto::uri::PostReference;
use crate::config::{Credentials, POST_COLLECTION, USER_AGENT};
use crate::state::Settings;
use atrium_api::agent::atp_agent::AtpAgent;
use atrium_api::agent::atp_agent::store::MemorySessionStore;
use atrium_api::app::bsky::feed::defs::{
    FeedViewPost, FeedViewPostReasonRefs, PostView, PostViewEmbedRefs, ThreadViewPost,
    ThreadViewPostParentRefs, ThreadViewPostRepliesItem,
};
use atrium_api::app::bsky::feed::get_post_thread::OutputThreadRefs;
use atrium_api::app::bsky::feed::post::Record;
use atrium_api::com::atproto::repo::create_record;
use atrium_api::types::string::Nsid;
use atrium_api::types::{TryFromUnknown, Union, Unknown};
use chrono::{SecondsFormat, Utc};
use atrium_xrpc_client::reqwest::{ReqwestClient, ReqwestClientBuilder};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("not authenticated")]
    NotAuthenticated,
}

type Agent = AtpAgent<MemorySessionStore, ReqwestClient>;

const THREAD_DEPTH: u16 = 6;
const THREAD_PARENT_HEIGHT: u16 = 80;

/// Wraps atrium so the rest of the crate only sees our own types.
///
/// Reads go to the public AppView until [`SkyClient::login`] succeeds, then
/// through the logged-in PDS agent. The session belongs to this value; there
/// is no process-wide login state.
pub struct SkyClient {
    public: Agent,
    agent: RwLock<Option<Arc<Agent>>>,
    settings: Settings,
}

impl SkyClient {
    pub fn new(settings: Settings) -> Result<Self, ClientError> {
        let public = AtpAgent::new(
            Self::xrpc_client(&settings.appview_url, &settings)?,
            MemorySessionStore::default(),
        );

        Ok(Self {
            public,
            agent: RwLock::new(None),
            settings,
        })
    }

    fn xrpc_client(base_uri: &str, settings: &Settings) -> Result<ReqwestClient, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;

        Ok(ReqwestClientBuilder::new(base_uri).client(http).build())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<Session, ClientError> {
        let agent = AtpAgent::new(
            Self::xrpc_client(&self.settings.service_url, &self.settings)?,
            MemorySessionStore::default(),
        );

        let result = agent
            .login(&credentials.identifier, &credentials.password)
            .await
            .map_err(|e| ClientError::Auth(e.to_string()))?;

        let session = Session {
            did: result.data.did.to_string(),
            handle: result.data.handle.to_string(),
            access_jwt: result.data.access_jwt.clone(),
            refresh_jwt: result.data.refresh_jwt.clone(),
        };
        info!(handle = %session.handle, did = %session.did, "logged in");

        *self.agent.write().await = Some(Arc::new(agent));

        Ok(session)
    }

    pub async fn session(&self) -> Option<Session> {
        let agent = self.agent.read().await.clone()?;
        let atrium_session = agent.get_session().await?;

        Some(Session {
            did: atrium_session.data.did.to_string(),
            handle: atrium_session.data.handle.to_string(),
            access_jwt: atrium_session.data.access_jwt.clone(),
            refresh_jwt: atrium_session.data.refresh_jwt.clone(),
        })
    }

    async fn authed(&self) -> Option<Arc<Agent>> {
        self.agent.read().await.clone()
    }

    /// Resolve an AT Protocol handle to a DID.
    pub async fn resolve_handle(&self, handle: &str) -> Result<String, ClientError> {
        let params = atrium_api::com::atproto::identity::resolve_handle::ParametersData {
            handle: handle
                .parse()
                .map_err(|_| ClientError::InvalidRequest(format!("invalid handle: {handle}")))?,
        };

        let output = self
            .public
            .api
            .com
            .atproto
            .identity
            .resolve_handle(params.into())
            .await
            .map_err(|e| {
                warn!(handle, "resolveHandle failed: {e}");
                ClientError::Network(e.to_string())
            })?;

        Ok(output.data.did.to_string())
    }

    /// Fetch a single post by reference.
    pub async fn get_post(&self, reference: &PostReference) -> Result<Post, ClientError> {
        let uri = reference.at_uri();
        let params = atrium_api::app::bsky::feed::get_posts::ParametersData {
            uris: vec![
                uri.parse()
                    .map_err(|e| ClientError::InvalidRequest(format!("invalid URI: {e}")))?,
            ],
        };

        let authed = self.authed().await;
        let agent = authed.as_deref().unwrap_or(&self.public);

        let output = agent
            .api
            .app
            .bsky
            .feed
            .get_posts(params.into())
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        let post_view = output
            .data
            .posts
            .first()
            .ok_or_else(|| ClientError::NotFound(uri.clone()))?;

        debug!(%uri, "fetched post");
        Ok(convert_post_view(post_view))
    }

    /// Get a post thread: ancestors oldest first, the post, then replies
    /// depth-first.
    pub async fn get_thread(&self, reference: &PostReference) -> Result<Vec<Post>, ClientError> {
        let uri = reference.at_uri();
        let params = atrium_api::app::bsky::feed::get_post_thread::ParametersData {
            uri: uri
                .parse()
                .map_err(|e| ClientError::InvalidRequest(format!("invalid URI: {e}")))?,
            depth: atrium_api::types::LimitedU16::try_from(THREAD_DEPTH).ok(),
            parent_height: atrium_api::types::LimitedU16::try_from(THREAD_PARENT_HEIGHT).ok(),
        };

        let authed = self.authed().await;
        let agent = authed.as_deref().unwrap_or(&self.public);

        let output = agent
            .api
            .app
            .bsky
            .feed
            .get_post_thread(params.into())
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        // NotFoundPost / BlockedPost at the top means there is nothing to show
        let Union::Refs(OutputThreadRefs::AppBskyFeedDefsThreadViewPost(focused)) =
            &output.data.thread
        else {
            return Err(ClientError::NotFound(uri));
        };

        Ok(flatten_thread(&focused))
    }

    pub async fn get_profile(&self, actor: &str) -> Result<Profile, ClientError> {
        let params = atrium_api::app::bsky::actor::get_profile::ParametersData {
            actor: actor
                .parse()
                .map_err(|e| ClientError::InvalidRequest(format!("invalid actor: {e}")))?,
        };

        let authed = self.authed().await;
        let agent = authed.as_deref().unwrap_or(&self.public);

        let output = agent
            .api
            .app
            .bsky
            .actor
            .get_profile(params.into())
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        Ok(Profile {
            did: output.data.did.to_string(),
            handle: output.data.handle.to_string(),
            display_name: output.data.display_name.clone(),
            avatar: output.data.avatar.clone(),
            description: output.data.description.clone(),
            followers_count: output.data.followers_count.map(|c| c as u32),
            following_count: output.data.follows_count.map(|c| c as u32),
            posts_count: output.data.posts_count.map(|c| c as u32),
        })
    }

    /// One page of the logged-in user's home timeline, newest first.
    pub async fn get_timeline(
        &self,
        limit: u8,
        cursor: Option<&str>,
    ) -> Result<(Vec<FeedItem>, Option<String>), ClientError> {
        let agent = self.authed().await.ok_or(ClientError::NotAuthenticated)?;

        let params = atrium_api::app::bsky::feed::get_timeline::ParametersData {
            algorithm: Some("reverse-chronological".to_string()),
            cursor: cursor.map(String::from),
            limit: Some(
                atrium_api::types::LimitedNonZeroU8::<100>::try_from(limit)
                    .map_err(|e| ClientError::InvalidRequest(format!("invalid limit: {e}")))?,
            ),
        };

        let output = agent
            .api
            .app
            .bsky
            .feed
            .get_timeline(params.into())
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        let items: Vec<FeedItem> = output
            .data
            .feed
            .into_iter()
            .map(convert_feed_view_post)
            .collect();

        debug!(count = items.len(), "fetched timeline page");
        Ok((items, output.data.cursor))
    }

    /// Post `text` as a reply to `parent` from the logged-in account.
    ///
    /// The reply joins the parent's thread: its root is the parent's root, or
    /// the parent itself when that is a top-level post.
    pub async fn reply(
        &self,
        parent: &PostReference,
        text: &str,
    ) -> Result<PostReference, ClientError> {
        let agent = self.authed().await.ok_or(ClientError::NotAuthenticated)?;
        let session = agent
            .get_session()
            .await
            .ok_or(ClientError::NotAuthenticated)?;

        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::InvalidRequest("reply text is empty".to_string()));
        }

        let parent_post = self.get_post(parent).await?;
        let record_json = reply_record(
            text,
            &parent_post.strong_ref(),
            &parent_post.thread_root(),
            &Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        );

        let record: Unknown = serde_json::from_value(record_json)
            .map_err(|e| ClientError::InvalidRequest(format!("failed to build record: {e}")))?;
        let collection = Nsid::new(POST_COLLECTION.to_string())
            .map_err(|e| ClientError::InvalidRequest(format!("invalid collection: {e}")))?;

        let input = create_record::InputData {
            collection,
            record,
            repo: session.data.did.clone().into(),
            rkey: None,
            swap_commit: None,
            validate: None,
        };

        let output = agent
            .api
            .com
            .atproto
            .repo
            .create_record(input.into())
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        info!(uri = %output.data.uri, parent = %parent, "reply created");
        PostReference::from_at_uri(&output.data.uri).map_err(|e| {
            ClientError::InvalidRequest(format!("unexpected record URI {}: {e}", output.data.uri))
        })
    }
}

fn convert_feed_view_post(feed_view: FeedViewPost) -> FeedItem {
    FeedItem {
        post: convert_post_view(&feed_view.data.post),
        reposted_by: reposted_by(&feed_view.data.reason),
    }
}

fn convert_post_view(post_view: &PostView) -> Post {
    let author = &post_view.data.author;

    let (text, created_at, reply_root) =
        match Record::try_from_unknown(post_view.data.record.clone()) {
            Ok(record) => (
                record.data.text,
                record.data.created_at.as_str().to_string(),
                record.data.reply.map(|reply| StrongRef {
                    uri: reply.data.root.data.uri.clone(),
                    cid: reply.data.root.data.cid.as_ref().to_string(),
                }),
            ),
            Err(e) => {
                warn!(uri = %post_view.data.uri, "undecodable post record: {e}");
                (String::new(), String::new(), None)
            }
        };

    Post {
        uri: post_view.data.uri.clone(),
        cid: post_view.data.cid.as_ref().to_string(),
        author: Profile::minimal(
            author.data.did.to_string(),
            author.data.handle.to_string(),
            author.data.display_name.clone(),
            author.data.avatar.clone(),
        ),
        text,
        created_at,
        indexed_at: post_view.data.indexed_at.as_str().to_string(),
        like_count: post_view.data.like_count.map(|c| c as u32),
        repost_count: post_view.data.repost_count.map(|c| c as u32),
        reply_count: post_view.data.reply_count.map(|c| c as u32),
        media: extract_media(&post_view.data.embed),
        reply_root,
    }
}

fn extract_media(embed: &Option<Union<PostViewEmbedRefs>>) -> Media {
    use atrium_api::app::bsky::embed::record_with_media::ViewMediaRefs;

    let Some(Union::Refs(embed_ref)) = embed else {
        return Media::None;
    };

    match embed_ref {
        PostViewEmbedRefs::AppBskyEmbedImagesView(view) => Media::Images(images(&view.data.images)),
        PostViewEmbedRefs::AppBskyEmbedVideoView(view) => Media::Video(video(view)),
        // Quoted record is dropped, its media kept
        PostViewEmbedRefs::AppBskyEmbedRecordWithMediaView(view) => match &view.data.media {
            Union::Refs(ViewMediaRefs::AppBskyEmbedImagesView(media)) => {
                Media::Images(images(&media.data.images))
            }
            Union::Refs(ViewMediaRefs::AppBskyEmbedVideoView(media)) => Media::Video(video(media)),
            _ => Media::None,
        },
        _ => Media::None,
    }
}

fn images(views: &[atrium_api::app::bsky::embed::images::ViewImage]) -> Vec<ImageEmbed> {
    views
        .iter()
        .map(|img| ImageEmbed {
            thumb: img.thumb.as_str().to_string(),
            fullsize: img.fullsize.as_str().to_string(),
            alt: img.alt.clone(),
            aspect_ratio: img
                .aspect_ratio
                .as_ref()
                .map(|ar| (ar.data.width.get() as u32, ar.data.height.get() as u32)),
        })
        .collect()
}

fn video(view: &atrium_api::app::bsky::embed::video::View) -> VideoEmbed {
    VideoEmbed {
        playlist: view.data.playlist.clone(),
        thumbnail: view.data.thumbnail.clone(),
        alt: view.data.alt.clone(),
        aspect_ratio: view
            .data
            .aspect_ratio
            .as_ref()
            .map(|ar| (ar.data.width.get() as u32, ar.data.height.get() as u32)),
    }
}

fn reposted_by(reason: &Option<Union<FeedViewPostReasonRefs>>) -> Option<Profile> {
    let Union::Refs(FeedViewPostReasonRefs::ReasonRepost(repost)) = reason.as_ref()? else {
        return None;
    };
    let by = &repost.data.by.data;

    Some(Profile::minimal(
        by.did.to_string(),
        by.handle.to_string(),
        by.display_name.clone(),
        by.avatar.clone(),
    ))
}

/// Ancestors oldest first, then the focused post, then replies depth-first
/// in the order the AppView returned them. Missing and blocked posts are
/// skipped along with everything beneath them.
fn flatten_thread(focused: &ThreadViewPost) -> Vec<Post> {
    let mut posts = Vec::new();

    let mut parent = focused.data.parent.as_ref();
    while let Some(Union::Refs(ThreadViewPostParentRefs::ThreadViewPost(view))) = parent {
        posts.push(convert_post_view(&view.data.post));
        parent = view.data.parent.as_ref();
    }
    posts.reverse();

    let mut pending = vec![focused];
    while let Some(view) = pending.pop() {
        posts.push(convert_post_view(&view.data.post));
        pending.extend(replies(view).rev());
    }

    posts
}

fn replies(view: &ThreadViewPost) -> impl DoubleEndedIterator<Item = &ThreadViewPost> {
    view.data
        .replies
        .iter()
        .flatten()
        .filter_map(|reply| match reply {
            Union::Refs(ThreadViewPostRepliesItem::ThreadViewPost(child)) => Some(&**child),
            _ => None,
        })
}

/// `app.bsky.feed.post` record answering `parent` inside the thread rooted
/// at `root`.
fn reply_record(
    text: &str,
    parent: &StrongRef,
    root: &StrongRef,
    created_at: &str,
) -> serde_json::Value {
    serde_json::json!({
        "$type": POST_COLLECTION,
        "text": text,
        "createdAt": created_at,
        "reply": {
            "root": { "uri": root.uri, "cid": root.cid },
            "parent": { "uri": parent.uri, "cid": parent.cid },
        },
    })
}

impl HandleLookup for SkyClient {
    type Error = ClientError;

    async fn lookup(&self, handle: &str) -> Result<String, ClientError> {
        self.resolve_handle(handle).await
    }
}
