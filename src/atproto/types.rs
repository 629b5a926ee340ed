// SPDX-License-Identifier: MPL-2.0

use crate::atproto::uri;

/// Decoupled from atrium's internal representation so we own the API boundary.
#[derive(Debug, Clone)]
pub struct Session {
    pub did: String,
    pub handle: String,
    pub access_jwt: String,
    pub refresh_jwt: String,
}

#[derive(Debug, Clone)]
pub struct Post {
    pub uri: String,
    pub cid: String,
    pub author: Profile,
    pub text: String,
    pub created_at: String,
    pub indexed_at: String,
    pub like_count: Option<u32>,
    pub repost_count: Option<u32>,
    pub reply_count: Option<u32>,
    pub media: Media,
    /// Thread root named by the record's reply ref; `None` for top-level posts
    pub reply_root: Option<StrongRef>,
}

/// A record pinned to one version: its at:// URI plus content CID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrongRef {
    pub uri: String,
    pub cid: String,
}

impl Post {
    pub fn strong_ref(&self) -> StrongRef {
        StrongRef {
            uri: self.uri.clone(),
            cid: self.cid.clone(),
        }
    }

    /// Root to use when replying to this post.
    pub fn thread_root(&self) -> StrongRef {
        self.reply_root.clone().unwrap_or_else(|| self.strong_ref())
    }

    pub fn web_url(&self) -> String {
        uri::protocol_uri_to_url(&self.uri)
    }
}

/// Media attached to a post. Quote and link-card embeds carry no media of
/// their own; a quote with media contributes only its media part.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Media {
    #[default]
    None,
    Images(Vec<ImageEmbed>),
    Video(VideoEmbed),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageEmbed {
    pub thumb: String,
    pub fullsize: String,
    pub alt: String,
    /// (width, height)
    pub aspect_ratio: Option<(u32, u32)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoEmbed {
    /// HLS playlist URL
    pub playlist: String,
    pub thumbnail: Option<String>,
    pub alt: Option<String>,
    pub aspect_ratio: Option<(u32, u32)>,
}

#[derive(Debug, Clone)]
pub struct Profile {
    pub did: String,
    pub handle: String,
    pub display_name: Option<String>,
    pub avatar: Option<String>,
    pub description: Option<String>,
    pub followers_count: Option<u32>,
    pub following_count: Option<u32>,
    pub posts_count: Option<u32>,
}

impl Profile {
    /// Author info as embedded in post views, without counts or bio.
    pub fn minimal(
        did: String,
        handle: String,
        display_name: Option<String>,
        avatar: Option<String>,
    ) -> Self {
        Self {
            did,
            handle,
            display_name,
            avatar,
            description: None,
            followers_count: None,
            following_count: None,
            posts_count: None,
        }
    }

    /// Display name if set and non-blank, else the handle.
    pub fn name(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.handle,
        }
    }

    pub fn web_url(&self) -> String {
        uri::profile_url(&self.did)
    }
}

/// One entry of a home timeline.
#[derive(Debug, Clone)]
pub struct FeedItem {
    pub post: Post,
    /// Set when the post appears because someone reposted it
    pub reposted_by: Option<Profile>,
}

impl FeedItem {
    pub fn action(&self) -> String {
        match &self.reposted_by {
            Some(by) => format!("Reposted by @{}", by.handle),
            None => "New Post".to_string(),
        }
    }

    /// `[action] name: text`
    pub fn summary(&self) -> String {
        format!(
            "[{}] {}: {}",
            self.action(),
            self.post.author.name(),
            self.post.text
        )
    }
}
