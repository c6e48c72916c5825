//! # Profiles
//! The two people using the tracker. Their ids are fixed: records in every collection point at them, so they must
//! be the same on every device.
//!
//! Caches written before the ids were fixed hold profiles with random ids. Those are rewritten once on load,
//! matching the old profiles to the fixed ones by name.

use std::{
    cell::RefCell,
    collections::HashMap,
    rc::{Rc, Weak},
};

use futures::task::LocalSpawnExt as _;
use mirror::{
    Connection, ConnectionState, Field, ListenerKey, Listeners, LiveBinding, Services, cache,
    listeners::notify_all,
    remote::{CollectionPath, Query, RemoteError, Snapshot, server_timestamp, to_document_data},
};

use crate::{
    avatars::{AvatarId, resolve_avatar},
    config::{PROFILES_CACHE_KEY, remote_collection},
};

pub const PABLO_ID: &str = "pablo";
pub const CELIA_ID: &str = "celia";
pub const FIXED_PROFILE_IDS: [&str; 2] = [PABLO_ID, CELIA_ID];

const LOG_PREFIX: &str = "[profiles]";

pub fn is_fixed_profile_id(id: &str) -> bool {
    FIXED_PROFILE_IDS.contains(&id)
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub avatar_id: AvatarId,
    /// A data URI replacing the built-in avatar.
    #[serde(default)]
    pub custom_avatar: Option<String>,
}

impl Profile {
    /// The profile a fixed id starts out as.
    pub fn fixed(id: &str) -> Self {
        let (name, avatar_id) = if id == CELIA_ID {
            ("Celia", AvatarId::Ghibli1)
        } else {
            ("Pablo", AvatarId::Ghibli2)
        };
        Self {
            id: id.to_string(),
            name: name.to_string(),
            avatar_id,
            custom_avatar: None,
        }
    }

    pub fn avatar_url(&self) -> String {
        resolve_avatar(self.avatar_id, self.custom_avatar.as_deref())
    }
}

/// Everything the registry persists.
#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProfilesState {
    #[serde(default)]
    pub profiles: Vec<Profile>,
    #[serde(default)]
    pub active_profile_id: String,
}

fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

impl ProfilesState {
    pub fn seed() -> Self {
        Self {
            profiles: FIXED_PROFILE_IDS.into_iter().map(Profile::fixed).collect(),
            active_profile_id: PABLO_ID.to_string(),
        }
    }

    pub fn has_fixed_ids(&self) -> bool {
        FIXED_PROFILE_IDS
            .iter()
            .all(|id| self.profiles.iter().any(|profile| profile.id == *id))
    }

    /// Rewrite a legacy state into the fixed-id form.
    ///
    /// Avatars of legacy profiles named like a fixed profile carry over. The previously active profile stays active
    /// if it was Celia; anything else makes Pablo active.
    pub fn migrate(&self) -> Self {
        let by_name: HashMap<String, &Profile> = self
            .profiles
            .iter()
            .map(|profile| (name_key(&profile.name), profile))
            .collect();

        let profiles = FIXED_PROFILE_IDS
            .into_iter()
            .map(|id| {
                let mut profile = Profile::fixed(id);
                if let Some(legacy) = by_name.get(&name_key(&profile.name)) {
                    profile.avatar_id = legacy.avatar_id;
                    profile.custom_avatar = legacy.custom_avatar.clone();
                }
                profile
            })
            .collect();

        let previous_active = self
            .profiles
            .iter()
            .find(|profile| profile.id == self.active_profile_id)
            .map(|profile| name_key(&profile.name));
        let active_profile_id = match previous_active.as_deref() {
            Some("celia") => CELIA_ID,
            Some("pablo") => PABLO_ID,
            other => {
                log::warn!(
                    "{LOG_PREFIX} active profile {other:?} has no fixed counterpart, selecting {PABLO_ID}"
                );
                PABLO_ID
            }
        };

        Self {
            profiles,
            active_profile_id: active_profile_id.to_string(),
        }
    }
}

/// A profile document as another device wrote it. Fields may be missing.
#[derive(serde::Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct RemoteProfile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    avatar_id: Option<AvatarId>,
    #[serde(default)]
    custom_avatar: Field<String>,
}

impl RemoteProfile {
    fn merge_into(self, profile: &mut Profile) {
        if let Some(name) = self.name {
            profile.name = name;
        }
        if let Some(avatar_id) = self.avatar_id {
            profile.avatar_id = avatar_id;
        }
        self.custom_avatar.apply_to(&mut profile.custom_avatar);
    }

    fn into_profile(self, id: String) -> Profile {
        let mut profile = Profile {
            name: id.clone(),
            id,
            avatar_id: AvatarId::default(),
            custom_avatar: None,
        };
        self.merge_into(&mut profile);
        profile
    }
}

struct RegistryState {
    profiles: ProfilesState,
    connection: Connection,
    listeners: Listeners,
    dirty: bool,
}

struct RegistryShared {
    services: Services,
    collection: CollectionPath,
    state: RefCell<RegistryState>,
}

#[derive(Clone)]
pub struct ProfileRegistry {
    shared: Rc<RegistryShared>,
}

struct FlushLater<'a> {
    registry: &'a ProfileRegistry,
}

impl<'a> FlushLater<'a> {
    fn new(registry: &'a ProfileRegistry) -> Self {
        Self { registry }
    }
}

impl Drop for FlushLater<'_> {
    fn drop(&mut self) {
        self.registry.flush_notifications();
    }
}

impl ProfileRegistry {
    pub fn new(services: Services) -> Self {
        let loaded = cache::load(&*services.cache, PROFILES_CACHE_KEY, ProfilesState::seed());
        let migrated = !loaded.has_fixed_ids();
        let profiles = if migrated {
            log::info!("{LOG_PREFIX} migrating legacy profiles to fixed ids");
            loaded.migrate()
        } else {
            loaded
        };
        if migrated {
            cache::save(&*services.cache, PROFILES_CACHE_KEY, &profiles);
        }

        Self {
            shared: Rc::new(RegistryShared {
                services,
                collection: remote_collection("profiles"),
                state: RefCell::new(RegistryState {
                    profiles,
                    connection: Connection::Disconnected,
                    listeners: Listeners::new(),
                    dirty: false,
                }),
            }),
        }
    }

    pub fn subscribe(&self, listener: impl Fn() + 'static) -> ListenerKey {
        self.shared.state.borrow_mut().listeners.insert(listener)
    }

    pub fn unsubscribe(&self, key: ListenerKey) {
        self.shared.state.borrow_mut().listeners.remove(key);
    }

    pub fn state(&self) -> ProfilesState {
        self.shared.state.borrow().profiles.clone()
    }

    pub fn profiles(&self) -> Vec<Profile> {
        self.shared.state.borrow().profiles.profiles.clone()
    }

    pub fn profile(&self, id: &str) -> Option<Profile> {
        self.shared
            .state
            .borrow()
            .profiles
            .profiles
            .iter()
            .find(|profile| profile.id == id)
            .cloned()
    }

    pub fn active_profile_id(&self) -> String {
        self.shared.state.borrow().profiles.active_profile_id.clone()
    }

    pub fn active_profile(&self) -> Option<Profile> {
        self.profile(&self.active_profile_id())
    }

    /// Make `id` the active profile. Ids other than the two fixed ones are ignored.
    pub fn select_profile(&self, id: &str) {
        if !is_fixed_profile_id(id) {
            log::warn!("{LOG_PREFIX} ignoring selection of unknown profile {id:?}");
            return;
        }
        let _flusher = FlushLater::new(self);
        let mut state = self.shared.state.borrow_mut();
        if state.profiles.active_profile_id != id {
            state.profiles.active_profile_id = id.to_string();
            state.dirty = true;
        }
    }

    /// Advance the profile's avatar to the next built-in one. Returns the new avatar.
    pub fn cycle_avatar(&self, id: &str) -> Option<AvatarId> {
        self.edit_profile(id, |profile| {
            profile.avatar_id = profile.avatar_id.next();
            true
        })
        .map(|profile| profile.avatar_id)
    }

    pub fn set_custom_avatar(&self, id: &str, data_url: impl Into<String>) -> bool {
        let data_url = data_url.into();
        self.edit_profile(id, move |profile| {
            profile.custom_avatar = Some(data_url);
            true
        })
        .is_some()
    }

    pub fn clear_custom_avatar(&self, id: &str) -> bool {
        self.edit_profile(id, |profile| profile.custom_avatar.take().is_some())
            .is_some()
    }

    /// Image URI of the profile, custom picture first.
    pub fn avatar_url(&self, id: &str) -> Option<String> {
        self.profile(id).map(|profile| profile.avatar_url())
    }

    /// Merge a remote snapshot of the profiles collection into the local profiles.
    ///
    /// Known profiles are updated field by field, unknown ones are appended. Nothing is ever removed.
    pub fn apply_remote_snapshot(&self, snapshot: Snapshot) {
        let _flusher = FlushLater::new(self);
        let mut state = self.shared.state.borrow_mut();
        for document in snapshot.documents {
            let remote: RemoteProfile =
                match serde_json::from_value(serde_json::Value::Object(document.data)) {
                    Ok(remote) => remote,
                    Err(e) => {
                        log::warn!(
                            "{LOG_PREFIX} skipping undecodable profile {}: {e}",
                            document.id
                        );
                        continue;
                    }
                };

            let profiles = &mut state.profiles.profiles;
            match profiles.iter_mut().find(|profile| profile.id == document.id) {
                Some(profile) => remote.merge_into(profile),
                None => profiles.push(remote.into_profile(document.id)),
            }
        }
        state.dirty = true;
    }

    fn edit_profile(&self, id: &str, edit: impl FnOnce(&mut Profile) -> bool) -> Option<Profile> {
        let _flusher = FlushLater::new(self);
        let updated = {
            let mut state = self.shared.state.borrow_mut();
            let profile = state
                .profiles
                .profiles
                .iter_mut()
                .find(|profile| profile.id == id)?;
            if !edit(profile) {
                return Some(profile.clone());
            }
            let updated = profile.clone();
            state.dirty = true;
            updated
        };
        self.push_upstream(&updated);
        Some(updated)
    }

    /// Write the whole profile remotely, stamped with the server's clock.
    fn push_upstream(&self, profile: &Profile) {
        let mut data = match to_document_data(profile) {
            Ok(data) => data,
            Err(e) => {
                log::error!("{LOG_PREFIX} could not encode profile {}: {e}", profile.id);
                return;
            }
        };
        data.insert("updatedAt".to_string(), server_timestamp());

        let write = self
            .shared
            .services
            .remote
            .set_document(&self.shared.collection, &profile.id, data);
        let id = profile.id.clone();
        let task = async move {
            if let Err(e) = write.await {
                log::error!("{LOG_PREFIX} saving profile {id} failed: {e}");
            }
        };
        if let Err(e) = self.shared.services.spawner.spawn_local(task) {
            log::error!("{LOG_PREFIX} could not spawn profile save: {e}");
        }
    }

    fn on_remote_error(&self, error: RemoteError) {
        if error.is_permission_denied() {
            log::warn!("{LOG_PREFIX} live query denied, disconnecting: {error}");
            self.disconnect();
        } else {
            log::error!("{LOG_PREFIX} live query error: {error}");
        }
    }

    fn flush_notifications(&self) {
        let listeners = {
            let mut state = self.shared.state.borrow_mut();
            if !std::mem::take(&mut state.dirty) {
                return;
            }
            cache::save(
                &*self.shared.services.cache,
                PROFILES_CACHE_KEY,
                &state.profiles,
            );
            state.listeners.pending_calls()
        };
        notify_all(listeners);
    }

    fn downgrade(&self) -> Weak<RegistryShared> {
        Rc::downgrade(&self.shared)
    }
}

impl LiveBinding for ProfileRegistry {
    fn connect(&self) {
        {
            let mut state = self.shared.state.borrow_mut();
            if !matches!(state.connection, Connection::Disconnected) {
                return;
            }
            if self.shared.services.auth.current_user().is_none() {
                return;
            }
            state.connection = Connection::Connecting;
        }

        let weak = self.downgrade();
        let subscription = self.shared.services.remote.subscribe(
            Query {
                collection: self.shared.collection.clone(),
                order: None,
            },
            Box::new(move |result| {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                let registry = ProfileRegistry { shared };
                match result {
                    Ok(snapshot) => registry.apply_remote_snapshot(snapshot),
                    Err(error) => registry.on_remote_error(error),
                }
            }),
        );

        let mut state = self.shared.state.borrow_mut();
        if matches!(state.connection, Connection::Connecting) {
            state.connection = Connection::Connected(subscription);
            log::info!("{LOG_PREFIX} connected");
        } else {
            drop(state);
            subscription.cancel();
        }
    }

    fn disconnect(&self) {
        let previous = std::mem::take(&mut self.shared.state.borrow_mut().connection);
        if let Connection::Connected(subscription) = previous {
            subscription.cancel();
            log::info!("{LOG_PREFIX} disconnected");
        }
    }

    fn connection_state(&self) -> ConnectionState {
        self.shared.state.borrow().connection.state()
    }
}
