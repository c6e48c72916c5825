//! Tracked items, per profile, most recently touched first.

use mirror::{
    CollectionSpec, CollectionStore, Field, ListenerKey, Services, new_id, now_millis,
    remote::OrderBy,
};

use crate::{
    config::{TRACKED_ITEMS_CACHE_KEY, remote_collection},
    domain::{ContentType, TrackedItem, TrackingStatus},
    utils::{clamp_rating, normalize_optional, normalize_tags, normalize_title},
};

pub fn tracked_items_spec() -> CollectionSpec {
    CollectionSpec {
        name: "tracked-items",
        collection: remote_collection("tracked-items"),
        order: OrderBy::descending("updatedAt"),
        cache_key: TRACKED_ITEMS_CACHE_KEY,
    }
}

/// What the user fills in when they start tracking something.
#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewTrackedItem {
    pub content_type: ContentType,
    pub title: String,
    #[serde(default)]
    pub status: TrackingStatus,
    #[serde(default)]
    pub current_progress: u32,
    #[serde(default)]
    pub total_progress: Option<u32>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewTrackedItem {
    pub fn new(content_type: ContentType, title: impl Into<String>) -> Self {
        Self {
            content_type,
            title: title.into(),
            status: TrackingStatus::default(),
            current_progress: 0,
            total_progress: None,
            rating: None,
            comment: None,
            image_url: None,
            tags: Vec::new(),
        }
    }
}

/// A partial edit. Unset fields are left alone; `Field::Null` clears an optional field.
#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackedItemPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TrackingStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_progress: Option<u32>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub total_progress: Field<u32>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub rating: Field<f64>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub comment: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub image_url: Field<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl TrackedItemPatch {
    /// Merge into `item`, returning the document fields that changed.
    fn apply(self, item: &mut TrackedItem) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if let Some(content_type) = self.content_type {
            item.content_type = content_type;
            changed.push("contentType");
        }
        if let Some(title) = self.title {
            item.title = normalize_title(&title);
            changed.push("title");
        }
        if let Some(status) = self.status {
            item.status = status;
            changed.push("status");
        }
        if let Some(current_progress) = self.current_progress {
            item.current_progress = current_progress;
            changed.push("currentProgress");
        }
        if self.total_progress.apply_to(&mut item.total_progress) {
            changed.push("totalProgress");
        }
        if self.rating.map(clamp_rating).apply_to(&mut item.rating) {
            changed.push("rating");
        }
        if let Some(comment) = self.comment.into_change() {
            item.comment = normalize_optional(comment);
            changed.push("comment");
        }
        if let Some(image_url) = self.image_url.into_change() {
            item.image_url = normalize_optional(image_url);
            changed.push("imageUrl");
        }
        if let Some(tags) = self.tags {
            item.tags = normalize_tags(tags);
            changed.push("tags");
        }

        if let Some(limit) = item.progress_limit() {
            if item.current_progress > limit {
                item.current_progress = limit;
                if !changed.contains(&"currentProgress") {
                    changed.push("currentProgress");
                }
            }
        }
        changed
    }
}

/// `current + delta`, never below zero and never past a positive `limit`.
pub fn clamp_progress(current: u32, delta: i64, limit: Option<u32>) -> u32 {
    let next = (i64::from(current) + delta).max(0);
    let next = match limit {
        Some(limit) => next.min(i64::from(limit)),
        None => next,
    };
    u32::try_from(next).unwrap_or(u32::MAX)
}

#[derive(Clone)]
pub struct TrackedItems {
    store: CollectionStore<TrackedItem>,
}

impl TrackedItems {
    pub fn new(services: Services) -> Self {
        Self {
            store: CollectionStore::new(tracked_items_spec(), services),
        }
    }

    pub fn store(&self) -> &CollectionStore<TrackedItem> {
        &self.store
    }

    pub fn subscribe(&self, listener: impl Fn() + 'static) -> ListenerKey {
        self.store.subscribe(listener)
    }

    pub fn unsubscribe(&self, key: ListenerKey) {
        self.store.unsubscribe(key)
    }

    pub fn items_for(&self, profile_id: &str) -> Vec<TrackedItem> {
        self.store.list(profile_id)
    }

    pub fn items_of_type(&self, profile_id: &str, content_type: ContentType) -> Vec<TrackedItem> {
        self.store
            .list(profile_id)
            .into_iter()
            .filter(|item| item.content_type == content_type)
            .collect()
    }

    pub fn find(&self, profile_id: &str, id: &str) -> Option<TrackedItem> {
        self.store.find(profile_id, id)
    }

    /// Start tracking something. Returns the new item's id.
    pub fn create(&self, profile_id: &str, fields: NewTrackedItem) -> String {
        self.store.ensure_key(profile_id);
        let now = now_millis();
        let total_progress = fields.total_progress;
        let current_progress = match total_progress.filter(|total| *total > 0) {
            Some(limit) => fields.current_progress.min(limit),
            None => fields.current_progress,
        };
        self.store.insert(TrackedItem {
            id: new_id(),
            profile_id: profile_id.to_string(),
            content_type: fields.content_type,
            title: normalize_title(&fields.title),
            status: fields.status,
            current_progress,
            total_progress,
            rating: fields.rating.map(clamp_rating),
            comment: normalize_optional(fields.comment),
            image_url: normalize_optional(fields.image_url),
            tags: normalize_tags(fields.tags),
            created_at: now,
            updated_at: now,
        })
    }

    /// Merge `patch` into the item. Returns false when there is no such item.
    pub fn update(&self, profile_id: &str, id: &str, patch: TrackedItemPatch) -> bool {
        self.store.ensure_key(profile_id);
        self.store.modify(profile_id, id, |item| {
            let mut changed = patch.apply(item);
            item.updated_at = now_millis();
            changed.push("updatedAt");
            Some(changed)
        })
    }

    /// Move progress by `delta` episodes or chapters. Movies are left alone.
    pub fn adjust_progress(&self, profile_id: &str, id: &str, delta: i64) -> bool {
        self.store.modify(profile_id, id, |item| {
            if !item.content_type.tracks_progress() {
                return None;
            }
            item.current_progress =
                clamp_progress(item.current_progress, delta, item.progress_limit());
            item.updated_at = now_millis();
            Some(vec!["currentProgress", "updatedAt"])
        })
    }

    pub fn remove(&self, profile_id: &str, id: &str) {
        self.store.remove(profile_id, id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use mirror::LiveBinding as _;
    use serde_json::json;

    fn series(title: &str, current: u32, total: Option<u32>) -> NewTrackedItem {
        NewTrackedItem {
            current_progress: current,
            total_progress: total,
            ..NewTrackedItem::new(ContentType::Series, title)
        }
    }

    #[test]
    fn test_clamp_progress_examples() {
        assert_eq!(clamp_progress(5, 8, Some(10)), 10);
        assert_eq!(clamp_progress(5, -100, Some(10)), 0);
        assert_eq!(clamp_progress(5, 8, None), 13);
        assert_eq!(clamp_progress(0, -1, None), 0);
    }

    #[test]
    fn test_create_prepends_newest_first() {
        let harness = Harness::new();
        let tracked = TrackedItems::new(harness.services());

        let first = tracked.create("pablo", series("Mushishi", 0, Some(26)));
        assert_eq!(tracked.items_for("pablo").len(), 1);

        let second = tracked.create("pablo", series("Natsume", 0, None));
        let ids: Vec<_> = tracked.items_for("pablo").into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![second, first]);
        assert!(tracked.items_for("celia").is_empty());
    }

    #[test]
    fn test_create_normalizes_fields() {
        let harness = Harness::new();
        let tracked = TrackedItems::new(harness.services());

        let id = tracked.create(
            "celia",
            NewTrackedItem {
                rating: Some(14.0),
                comment: Some("   ".to_string()),
                tags: vec![" cozy ".to_string(), " ".to_string()],
                ..series("  ", 30, Some(12))
            },
        );

        let item = tracked.find("celia", &id).unwrap();
        assert_eq!(item.title, "Untitled");
        assert_eq!(item.rating, Some(10.0));
        assert_eq!(item.comment, None);
        assert_eq!(item.tags, vec!["cozy"]);
        assert_eq!(item.current_progress, 12);
        assert_eq!(item.created_at, item.updated_at);
    }

    #[test]
    fn test_create_writes_full_record_remotely() {
        let mut harness = Harness::new();
        let tracked = TrackedItems::new(harness.services());
        let id = tracked.create("pablo", series("Haikyu", 3, Some(25)));
        harness.settle();

        let stored = harness
            .remote
            .document(&remote_collection("tracked-items"), &id)
            .unwrap();
        assert_eq!(stored["title"], json!("Haikyu"));
        assert_eq!(stored["currentProgress"], json!(3));
        assert_eq!(stored["rating"], json!(null));
        assert_eq!(stored["status"], json!("pending"));
    }

    #[test]
    fn test_adjust_progress_clamps() {
        let harness = Harness::new();
        let tracked = TrackedItems::new(harness.services());
        let id = tracked.create("pablo", series("Frieren", 5, Some(10)));

        assert!(tracked.adjust_progress("pablo", &id, 8));
        assert_eq!(tracked.find("pablo", &id).unwrap().current_progress, 10);

        assert!(tracked.adjust_progress("pablo", &id, -100));
        assert_eq!(tracked.find("pablo", &id).unwrap().current_progress, 0);

        assert!(!tracked.adjust_progress("pablo", "missing", 1));
    }

    #[test]
    fn test_adjust_progress_ignores_movies() {
        let mut harness = Harness::new();
        let tracked = TrackedItems::new(harness.services());
        let id = tracked.create("celia", NewTrackedItem::new(ContentType::Movie, "Porco Rosso"));
        harness.settle();
        let writes = harness.remote.writes_applied();

        assert!(!tracked.adjust_progress("celia", &id, 3));
        harness.settle();
        assert_eq!(tracked.find("celia", &id).unwrap().current_progress, 0);
        assert_eq!(harness.remote.writes_applied(), writes, "nothing sent for a movie");
    }

    #[test]
    fn test_update_patches_only_changed_fields() {
        let mut harness = Harness::new();
        let tracked = TrackedItems::new(harness.services());
        let id = tracked.create(
            "pablo",
            NewTrackedItem {
                comment: Some("slow start".to_string()),
                ..series("Mononoke", 4, Some(12))
            },
        );
        harness.settle();

        let updated = tracked.update(
            "pablo",
            &id,
            TrackedItemPatch {
                status: Some(TrackingStatus::InProgress),
                total_progress: Field::Value(2),
                comment: Field::Null,
                ..TrackedItemPatch::default()
            },
        );
        assert!(updated);
        harness.settle();

        let item = tracked.find("pablo", &id).unwrap();
        assert_eq!(item.status, TrackingStatus::InProgress);
        assert_eq!(item.comment, None);
        assert_eq!(item.current_progress, 2, "shrinking the total clamps progress");

        let stored = harness
            .remote
            .document(&remote_collection("tracked-items"), &id)
            .unwrap();
        assert_eq!(stored["status"], json!("in-progress"));
        assert_eq!(stored["comment"], json!(null));
        assert_eq!(stored["currentProgress"], json!(2));
        assert_eq!(stored["title"], json!("Mononoke"));
    }

    #[test]
    fn test_update_missing_item_is_noop() {
        let harness = Harness::new();
        let tracked = TrackedItems::new(harness.services());
        assert!(!tracked.update("pablo", "nope", TrackedItemPatch::default()));
        assert!(tracked.items_for("pablo").is_empty());
    }

    #[test]
    fn test_patch_deserializes_three_way() {
        let patch: TrackedItemPatch =
            serde_json::from_value(json!({ "rating": null, "title": "Ping Pong" })).unwrap();
        assert_eq!(patch.rating, Field::Null);
        assert_eq!(patch.comment, Field::Absent);
        assert_eq!(patch.title.as_deref(), Some("Ping Pong"));
    }

    #[test]
    fn test_patch_normalizes_optional_text() {
        let harness = Harness::new();
        let tracked = TrackedItems::new(harness.services());
        let id = tracked.create(
            "celia",
            NewTrackedItem {
                comment: Some("rewatch".to_string()),
                ..NewTrackedItem::new(ContentType::Movie, "Paprika")
            },
        );

        tracked.update(
            "celia",
            &id,
            TrackedItemPatch {
                comment: Field::Value("   ".to_string()),
                image_url: Field::Value(" https://img/paprika.jpg ".to_string()),
                ..TrackedItemPatch::default()
            },
        );

        let item = tracked.find("celia", &id).unwrap();
        assert_eq!(item.comment, None, "blank text clears the field");
        assert_eq!(item.image_url.as_deref(), Some("https://img/paprika.jpg"));
    }

    #[test]
    fn test_filters_by_content_type() {
        let harness = Harness::new();
        let tracked = TrackedItems::new(harness.services());
        tracked.create("pablo", NewTrackedItem::new(ContentType::Manga, "Vagabond"));
        tracked.create("pablo", NewTrackedItem::new(ContentType::Anime, "Mob Psycho"));

        let manga = tracked.items_of_type("pablo", ContentType::Manga);
        assert_eq!(manga.len(), 1);
        assert_eq!(manga[0].title, "Vagabond");
    }

    #[test]
    fn test_remove_drops_item_locally_and_remotely() {
        let mut harness = Harness::new();
        let tracked = TrackedItems::new(harness.services());
        let id = tracked.create("pablo", series("Dorohedoro", 0, None));
        harness.settle();

        tracked.remove("pablo", &id);
        harness.settle();
        assert!(tracked.items_for("pablo").is_empty());
        assert_eq!(harness.remote.document_count(&remote_collection("tracked-items")), 0);
    }

    #[test]
    fn test_snapshot_replaces_every_profile() {
        let harness = Harness::new();
        let tracked = TrackedItems::new(harness.services());
        tracked.create("pablo", series("Local only", 0, None));
        tracked.store().connect();

        let collection = remote_collection("tracked-items");
        let document = |id: &str, profile: &str, updated_at: i64| mirror::remote::Document {
            id: id.to_string(),
            data: json!({
                "profileId": profile, "contentType": "anime", "title": id,
                "status": "done", "createdAt": 1, "updatedAt": updated_at,
            })
            .as_object()
            .cloned()
            .unwrap(),
        };
        harness.remote.replace_collection(
            &collection,
            vec![
                document("a", "pablo", 10),
                document("b", "pablo", 30),
                document("c", "celia", 20),
            ],
        );

        let pablo: Vec<_> = tracked.items_for("pablo").into_iter().map(|i| i.id).collect();
        assert_eq!(pablo, vec!["b", "a"], "newest update first");
        assert_eq!(tracked.items_for("celia").len(), 1);
    }

    #[test]
    fn test_snapshot_keeps_fractional_ratings() {
        let harness = Harness::new();
        let tracked = TrackedItems::new(harness.services());
        tracked.store().connect();

        let document = |id: &str, rating: serde_json::Value| mirror::remote::Document {
            id: id.to_string(),
            data: json!({
                "profileId": "pablo", "contentType": "movie", "title": id,
                "status": "done", "rating": rating, "createdAt": 1, "updatedAt": 1,
            })
            .as_object()
            .cloned()
            .unwrap(),
        };
        harness.remote.replace_collection(
            &remote_collection("tracked-items"),
            vec![document("whole", json!(8)), document("half", json!(8.5))],
        );

        assert_eq!(tracked.items_for("pablo").len(), 2);
        assert_eq!(tracked.find("pablo", "half").unwrap().rating, Some(8.5));
        assert_eq!(tracked.find("pablo", "whole").unwrap().rating, Some(8.0));
    }
}
