// SPDX-License-Identifier: MPL-2.0

//! Resolve Bluesky post links to AT Protocol identifiers and back.
//!
//! [`atproto::PostResolver`] turns `https://bsky.app/profile/{actor}/post/{rkey}`
//! into a [`atproto::PostReference`], looking up handles through any
//! [`atproto::HandleLookup`]. [`atproto::SkyClient`] is the atrium-backed
//! lookup; it also fetches posts, threads, profiles and the home timeline,
//! and posts replies.

pub mod atproto;
pub mod config;
pub mod logging;
pub mod state;
