//! Two devices sharing one remote database, each with its own cache and sign-in.

use std::rc::Rc;

use futures::executor::LocalPool;
use mirror::{
    Services,
    auth::{AuthUser, ManualAuth},
    cache::MemorySlots,
    memory::MemoryRemote,
};
use tracker_frontend_rs::{
    Tracker,
    avatars::AvatarId,
    config::ProfileBindings,
    domain::{ContentType, RecommendationStatus},
    profile::{CELIA_ID, PABLO_ID},
    recommendations::NewRecommendation,
    tracked::NewTrackedItem,
};

struct World {
    pool: LocalPool,
    remote: MemoryRemote,
}

struct Device {
    auth: ManualAuth,
    cache: Rc<MemorySlots>,
    tracker: Tracker,
}

fn bindings() -> ProfileBindings {
    ProfileBindings::new(Some("uid-pablo".to_string()), Some("uid-celia".to_string()))
}

impl World {
    fn new() -> Self {
        Self {
            pool: LocalPool::new(),
            remote: MemoryRemote::new(),
        }
    }

    fn device(&self, cache: Rc<MemorySlots>) -> Device {
        let auth = ManualAuth::new();
        let services = Services {
            remote: Rc::new(self.remote.clone()),
            cache: cache.clone(),
            auth: Rc::new(auth.clone()),
            spawner: Rc::new(self.pool.spawner()),
        };
        Device {
            auth,
            cache,
            tracker: Tracker::new(services, bindings()),
        }
    }

    fn settle(&mut self) {
        self.pool.run_until_stalled();
        self.remote.flush();
    }
}

#[test]
fn test_two_devices_exchange_a_recommendation() {
    let mut world = World::new();
    let pablo = world.device(Rc::new(MemorySlots::new()));
    let celia = world.device(Rc::new(MemorySlots::new()));

    pablo.tracker.start();
    celia.tracker.start();
    assert!(!pablo.tracker.session().state().loading);
    assert_eq!(world.remote.active_subscriptions(), 0, "nobody signed in yet");

    pablo.auth.sign_in(AuthUser::new("uid-pablo", Some("p@example.com".to_string())));
    celia.auth.sign_in(AuthUser::new("uid-celia", None));
    assert_eq!(world.remote.active_subscriptions(), 8);
    assert_eq!(pablo.tracker.session().display_name(), "Pablo");
    assert_eq!(celia.tracker.session().own_profile_id().as_deref(), Some(CELIA_ID));

    let item = pablo.tracker.tracked().create(
        PABLO_ID,
        NewTrackedItem {
            total_progress: Some(12),
            ..NewTrackedItem::new(ContentType::Anime, "Mushishi")
        },
    );
    let recommendation = pablo.tracker.recommendations().send(NewRecommendation {
        from_profile_id: PABLO_ID.to_string(),
        to_profile_id: CELIA_ID.to_string(),
        content_type: ContentType::Anime,
        title: "Mushishi".to_string(),
        image_url: None,
        message: Some("quiet and lovely".to_string()),
        origin_tracked_item_id: Some(item.clone()),
    });
    world.settle();

    celia.tracker.profiles().select_profile(CELIA_ID);
    assert_eq!(celia.tracker.active_pending_count(), 1);
    assert_eq!(celia.tracker.active_inbox()[0].id, recommendation);
    assert_eq!(
        celia.tracker.tracked().items_for(PABLO_ID)[0].title,
        "Mushishi",
        "the other device sees the tracked item too"
    );

    assert!(celia.tracker.recommendations().mark_status(
        CELIA_ID,
        &recommendation,
        RecommendationStatus::Accepted
    ));
    world.settle();

    let seen_by_pablo = pablo
        .tracker
        .recommendations()
        .find(CELIA_ID, &recommendation)
        .unwrap();
    assert_eq!(seen_by_pablo.status, RecommendationStatus::Accepted);
    assert_eq!(pablo.tracker.recommendations().pending_count(CELIA_ID), 0);
}

#[test]
fn test_profile_changes_reach_the_other_device() {
    let mut world = World::new();
    let pablo = world.device(Rc::new(MemorySlots::new()));
    let celia = world.device(Rc::new(MemorySlots::new()));
    pablo.auth.sign_in(AuthUser::new("uid-pablo", None));
    celia.auth.sign_in(AuthUser::new("uid-celia", None));
    pablo.tracker.start();
    celia.tracker.start();
    world.settle();

    assert_eq!(pablo.tracker.profiles().cycle_avatar(PABLO_ID), Some(AvatarId::Ghibli3));
    world.settle();

    assert_eq!(
        celia.tracker.profiles().profile(PABLO_ID).unwrap().avatar_id,
        AvatarId::Ghibli3
    );
    assert_eq!(celia.tracker.profiles().profiles().len(), 2);
}

#[test]
fn test_signed_out_device_keeps_working_offline() {
    let mut world = World::new();
    let cache = Rc::new(MemorySlots::new());
    let device = world.device(cache.clone());
    device.tracker.start();

    let id = device.tracker.tracked().create(
        PABLO_ID,
        NewTrackedItem {
            current_progress: 3,
            total_progress: Some(10),
            ..NewTrackedItem::new(ContentType::Series, "Mob Psycho 100")
        },
    );
    device.tracker.tracked().adjust_progress(PABLO_ID, &id, 20);
    world.settle();
    assert_eq!(world.remote.active_subscriptions(), 0);

    // a fresh start on the same device reads everything back from the cache
    let restarted = world.device(device.cache.clone());
    let items = restarted.tracker.active_tracked_items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].current_progress, 10);
    assert!(!cache.is_empty());
}

#[test]
fn test_sign_out_drops_live_queries() {
    let mut world = World::new();
    let device = world.device(Rc::new(MemorySlots::new()));
    device.tracker.start();

    device.auth.sign_in(AuthUser::new("uid-celia", None));
    world.settle();
    assert_eq!(world.remote.active_subscriptions(), 4);

    device.auth.sign_out();
    assert_eq!(world.remote.active_subscriptions(), 0);
    assert_eq!(device.tracker.session().display_name(), "—");

    device.tracker.toasts().info("Signed out");
    assert_eq!(device.tracker.toasts().len(), 1);
}
