//! The anime tracker's state layer: two fixed profiles, their tracked items, the recommendations they send each
//! other and the premieres they are waiting for, mirrored between a local cache and a shared remote database.
//!
//! [`Tracker`] owns every store. A UI subscribes to the stores it renders and calls their mutators; everything
//! else (caching, remote writes, live updates while signed in) happens behind those calls.

pub mod avatars;
pub mod config;
pub mod domain;
pub mod images;
pub mod notifications;
pub mod premieres;
pub mod profile;
pub mod recommendations;
pub mod session;
pub mod sync;
pub mod tracked;
mod utils;

use std::{cell::RefCell, rc::Rc, sync::LazyLock};

use mirror::{LiveBinding, Services};
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

use crate::{
    config::ProfileBindings,
    domain::{ContentType, Premiere, Recommendation, TrackedItem},
    notifications::Toasts,
    premieres::Premieres,
    profile::{Profile, ProfileRegistry},
    recommendations::Recommendations,
    session::Session,
    sync::SyncDriver,
    tracked::TrackedItems,
};

pub use utils::UNTITLED;

// a static, so the logger is installed at most once per process
static LOGGER: LazyLock<()> = LazyLock::new(|| {
    utils::set_panic_hook();
    install_logger();
    log::info!("Logging initialized");
});

#[cfg(target_arch = "wasm32")]
fn install_logger() {
    wasm_logger::init(wasm_logger::Config::default());
}

#[cfg(not(target_arch = "wasm32"))]
fn install_logger() {
    if env_logger::try_init().is_err() {
        log::debug!("A logger was already installed");
    }
}

pub fn init_logging() {
    LazyLock::force(&LOGGER);
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
pub fn get_app_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Square, compact data URI of an uploaded picture, for use as a custom avatar.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn square_avatar_data_url(bytes: &[u8]) -> Result<String, JsError> {
    images::square_avatar_data_url(bytes).map_err(|e| JsError::new(&e.to_string()))
}

pub struct Tracker {
    services: Services,
    profiles: ProfileRegistry,
    session: Session,
    tracked: TrackedItems,
    recommendations: Recommendations,
    premieres: Premieres,
    toasts: Toasts,
    sync: RefCell<Option<SyncDriver>>,
}

impl Tracker {
    /// Load every store from the cache. Nothing talks to the remote side until [`Tracker::start`].
    pub fn new(services: Services, bindings: ProfileBindings) -> Self {
        Self {
            profiles: ProfileRegistry::new(services.clone()),
            session: Session::new(bindings),
            tracked: TrackedItems::new(services.clone()),
            recommendations: Recommendations::new(services.clone()),
            premieres: Premieres::new(services.clone()),
            toasts: Toasts::new(),
            sync: RefCell::new(None),
            services,
        }
    }

    /// Follow the auth provider: bind the session, and keep every live binding connected while signed in.
    pub fn start(&self) {
        init_logging();
        self.session.start(&*self.services.auth);
        let driver = SyncDriver::start(&*self.services.auth, self.live_bindings());
        // replacing an earlier driver drops its auth subscription
        let previous = self.sync.replace(Some(driver));
        drop(previous);
    }

    /// Stop following the auth provider and drop every live query. Local state stays as it is.
    pub fn stop(&self) {
        let previous = self.sync.take();
        drop(previous);
        for binding in self.live_bindings() {
            binding.disconnect();
        }
    }

    fn live_bindings(&self) -> Vec<Rc<dyn LiveBinding>> {
        let profiles: Rc<dyn LiveBinding> = Rc::new(self.profiles.clone());
        let tracked: Rc<dyn LiveBinding> = Rc::new(self.tracked.store().clone());
        let recommendations: Rc<dyn LiveBinding> = Rc::new(self.recommendations.store().clone());
        let premieres: Rc<dyn LiveBinding> = Rc::new(self.premieres.store().clone());
        vec![profiles, tracked, recommendations, premieres]
    }

    pub fn profiles(&self) -> &ProfileRegistry {
        &self.profiles
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn tracked(&self) -> &TrackedItems {
        &self.tracked
    }

    pub fn recommendations(&self) -> &Recommendations {
        &self.recommendations
    }

    pub fn premieres(&self) -> &Premieres {
        &self.premieres
    }

    /// Toasts carry deadlines, not timers. The host calls [`Tracker::expire_toasts`] after pushing one and again
    /// at every deadline it returns.
    pub fn toasts(&self) -> &Toasts {
        &self.toasts
    }

    /// Drop expired toasts. Returns when the next one is due, if any are left.
    pub fn expire_toasts(&self) -> Option<i64> {
        self.expire_toasts_at(mirror::now_millis())
    }

    pub fn expire_toasts_at(&self, now: i64) -> Option<i64> {
        let expired = self.toasts.expire_due(now);
        if !expired.is_empty() {
            log::debug!("Expired {} toasts", expired.len());
        }
        self.toasts.next_deadline()
    }

    // =======
    // Views of the active profile

    pub fn active_profile(&self) -> Option<Profile> {
        self.profiles.active_profile()
    }

    pub fn active_tracked_items(&self) -> Vec<TrackedItem> {
        self.tracked.items_for(&self.profiles.active_profile_id())
    }

    pub fn active_tracked_items_of_type(&self, content_type: ContentType) -> Vec<TrackedItem> {
        self.tracked
            .items_of_type(&self.profiles.active_profile_id(), content_type)
    }

    pub fn active_inbox(&self) -> Vec<Recommendation> {
        self.recommendations
            .inbox_for(&self.profiles.active_profile_id())
    }

    pub fn active_pending_count(&self) -> usize {
        self.recommendations
            .pending_count(&self.profiles.active_profile_id())
    }

    pub fn active_premieres(&self) -> Vec<Premiere> {
        self.premieres
            .premieres_for(&self.profiles.active_profile_id())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        notifications::ToastKind, profile::CELIA_ID, testing::Harness, tracked::NewTrackedItem,
    };

    #[test]
    fn test_app_version_matches_manifest() {
        assert_eq!(get_app_version(), env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_active_views_follow_selected_profile() {
        let harness = Harness::new();
        let tracker = Tracker::new(harness.services(), ProfileBindings::default());

        tracker
            .tracked()
            .create("pablo", NewTrackedItem::new(ContentType::Anime, "Bocchi"));
        tracker
            .tracked()
            .create(CELIA_ID, NewTrackedItem::new(ContentType::Manga, "Witch Hat Atelier"));

        assert_eq!(tracker.active_tracked_items()[0].title, "Bocchi");
        tracker.profiles().select_profile(CELIA_ID);
        assert_eq!(tracker.active_tracked_items()[0].title, "Witch Hat Atelier");
        assert!(tracker.active_tracked_items_of_type(ContentType::Anime).is_empty());
        assert_eq!(tracker.active_profile().unwrap().name, "Celia");
    }

    #[test]
    fn test_expire_toasts_reports_next_deadline() {
        let harness = Harness::new();
        let tracker = Tracker::new(harness.services(), ProfileBindings::default());
        assert_eq!(tracker.expire_toasts_at(0), None);

        tracker.toasts().push_at(1_000, "Saved", ToastKind::Success, Some(500));
        tracker.toasts().push_at(1_000, "Offline", ToastKind::Warning, Some(2_000));
        assert_eq!(tracker.expire_toasts_at(1_200), Some(1_500));
        assert_eq!(tracker.toasts().len(), 2);

        assert_eq!(tracker.expire_toasts_at(1_500), Some(3_000));
        assert_eq!(tracker.toasts().len(), 1);

        assert_eq!(tracker.expire_toasts_at(3_000), None);
        assert!(tracker.toasts().is_empty());
    }

    #[test]
    fn test_start_and_stop_manage_live_queries() {
        let harness = Harness::new();
        let tracker = Tracker::new(harness.services(), ProfileBindings::default());

        tracker.start();
        assert_eq!(harness.remote.active_subscriptions(), 4);

        tracker.stop();
        assert_eq!(harness.remote.active_subscriptions(), 0);
    }
}
