//! Static configuration: the identity table, cache slot keys and remote collection paths.

use mirror::remote::CollectionPath;

use crate::profile::{CELIA_ID, PABLO_ID};

pub const PABLO_UID_VAR: &str = "TRACK_ANIME_UID_PABLO";
pub const CELIA_UID_VAR: &str = "TRACK_ANIME_UID_CELIA";

pub const PROFILES_CACHE_KEY: &str = "track-anime:profiles:v1";
pub const TRACKED_ITEMS_CACHE_KEY: &str = "track-anime:tracked-items:v1";
pub const RECOMMENDATIONS_CACHE_KEY: &str = "track-anime:recommendations:v1";
pub const PREMIERES_CACHE_KEY: &str = "track-anime:premieres:v1";

const REMOTE_ROOT: [&str; 2] = ["pairs", "anime-tracker"];

/// Path of one of the tracker's collections under the shared root.
pub fn remote_collection(name: &str) -> CollectionPath {
    CollectionPath::new(REMOTE_ROOT.iter().copied().chain([name]))
}

/// Which signed-in identity owns which profile.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProfileBindings {
    pub pablo_uid: Option<String>,
    pub celia_uid: Option<String>,
}

impl ProfileBindings {
    pub fn new(pablo_uid: Option<String>, celia_uid: Option<String>) -> Self {
        Self {
            pablo_uid: non_empty(pablo_uid),
            celia_uid: non_empty(celia_uid),
        }
    }

    /// Bindings baked in at compile time. This is what browser builds use.
    pub fn from_build_env() -> Self {
        Self::new(
            option_env!("TRACK_ANIME_UID_PABLO").map(str::to_string),
            option_env!("TRACK_ANIME_UID_CELIA").map(str::to_string),
        )
    }

    pub fn from_env() -> Self {
        Self::new(
            std::env::var(PABLO_UID_VAR).ok(),
            std::env::var(CELIA_UID_VAR).ok(),
        )
    }

    /// The fixed profile id bound to `uid`, if any.
    pub fn profile_for(&self, uid: &str) -> Option<&'static str> {
        if self.pablo_uid.as_deref() == Some(uid) {
            Some(PABLO_ID)
        } else if self.celia_uid.as_deref() == Some(uid) {
            Some(CELIA_ID)
        } else {
            None
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}
