// SPDX-License-Identifier: MPL-2.0

use crate::config::{APP_ID, DEFAULT_APPVIEW, DEFAULT_PDS};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};
use url::Url;

const DEFAULT_TIMELINE_LIMIT: u8 = 8;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Persistent client settings. Every field falls back independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// PDS used for login and the home timeline
    pub service_url: String,
    /// Unauthenticated AppView for handle lookups, posts and profiles
    pub appview_url: String,
    pub timeline_limit: u8,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_PDS.to_string(),
            appview_url: DEFAULT_APPVIEW.to_string(),
            timeline_limit: DEFAULT_TIMELINE_LIMIT,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Settings {
    /// Get the settings file path (~/.config/skyref/settings.json)
    pub fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push(APP_ID);
            p.push("settings.json");
            p
        })
    }

    /// Load settings from disk, or return defaults if not found
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else {
            return Self::default();
        };

        match std::fs::read_to_string(&path) {
            Ok(contents) => Self::from_json(&contents),
            Err(_) => {
                debug!(path = %path.display(), "no settings file, using defaults");
                Self::default()
            }
        }
    }

    fn from_json(contents: &str) -> Self {
        let settings: Self = serde_json::from_str(contents).unwrap_or_else(|e| {
            warn!("ignoring unreadable settings: {e}");
            Self::default()
        });
        settings.validated()
    }

    fn validated(mut self) -> Self {
        if Url::parse(&self.service_url).is_err() {
            warn!(url = %self.service_url, "invalid service_url, using {DEFAULT_PDS}");
            self.service_url = DEFAULT_PDS.to_string();
        }
        if Url::parse(&self.appview_url).is_err() {
            warn!(url = %self.appview_url, "invalid appview_url, using {DEFAULT_APPVIEW}");
            self.appview_url = DEFAULT_APPVIEW.to_string();
        }
        if self.timeline_limit == 0 || self.timeline_limit > 100 {
            warn!(limit = self.timeline_limit, "timeline_limit out of range");
            self.timeline_limit = DEFAULT_TIMELINE_LIMIT;
        }
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = DEFAULT_TIMEOUT_SECS;
        }
        self
    }
}
