// SPDX-License-Identifier: MPL-2.0

mod client;
pub mod resolver;
mod types;
pub mod uri;

pub use client::{ClientError, SkyClient};
pub use resolver::{HandleLookup, PostResolver, ResolveError};
pub use types::{FeedItem, ImageEmbed, Media, Post, Profile, Session, StrongRef, VideoEmbed};
pub use uri::{ActorKind, AtUri, PostReference};
