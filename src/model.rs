use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    pub title: String,
    pub thumbnail: String,
    pub members: String,
    #[serde(default)]
    pub published_at: String,
    /// Length in whole seconds.
    pub duration: u32,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TransportState {
    #[default]
    Empty,
    Paused,
    Playing,
}

impl TransportState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Paused => "paused",
            Self::Playing => "playing",
        }
    }
}

/// How an out-of-range start index handed to a list load is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum StartIndexPolicy {
    #[default]
    Clamp,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerConfig {
    #[serde(default = "default_scrub_seconds")]
    pub scrub_seconds: u16,
    #[serde(default)]
    pub start_index_policy: StartIndexPolicy,
    #[serde(default)]
    pub start_looping: bool,
    #[serde(default)]
    pub start_shuffling: bool,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_scrub_seconds() -> u16 {
    15
}

fn default_log_filter() -> String {
    String::from("podcastr=info")
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            scrub_seconds: default_scrub_seconds(),
            start_index_policy: StartIndexPolicy::default(),
            start_looping: false,
            start_shuffling: false,
            log_filter: default_log_filter(),
        }
    }
}
