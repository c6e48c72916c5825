//! Recommendations between the two profiles, filed under the recipient's inbox.

use mirror::{
    CollectionSpec, CollectionStore, ListenerKey, Services, new_id, now_millis, remote::OrderBy,
};

use crate::{
    config::{RECOMMENDATIONS_CACHE_KEY, remote_collection},
    domain::{ContentType, Recommendation, RecommendationStatus},
    utils::{normalize_optional, normalize_title},
};

pub fn recommendations_spec() -> CollectionSpec {
    CollectionSpec {
        name: "recommendations",
        collection: remote_collection("recommendations"),
        order: OrderBy::descending("createdAt"),
        cache_key: RECOMMENDATIONS_CACHE_KEY,
    }
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewRecommendation {
    pub from_profile_id: String,
    pub to_profile_id: String,
    pub content_type: ContentType,
    pub title: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    /// The sender's tracked item this recommendation was made from.
    #[serde(default)]
    pub origin_tracked_item_id: Option<String>,
}

#[derive(Clone)]
pub struct Recommendations {
    store: CollectionStore<Recommendation>,
}

impl Recommendations {
    pub fn new(services: Services) -> Self {
        Self {
            store: CollectionStore::new(recommendations_spec(), services),
        }
    }

    pub fn store(&self) -> &CollectionStore<Recommendation> {
        &self.store
    }

    pub fn subscribe(&self, listener: impl Fn() + 'static) -> ListenerKey {
        self.store.subscribe(listener)
    }

    pub fn unsubscribe(&self, key: ListenerKey) {
        self.store.unsubscribe(key)
    }

    /// Everything sent to `profile_id`, newest first.
    pub fn inbox_for(&self, profile_id: &str) -> Vec<Recommendation> {
        self.store.list(profile_id)
    }

    pub fn pending_for(&self, profile_id: &str) -> Vec<Recommendation> {
        self.store
            .list(profile_id)
            .into_iter()
            .filter(|recommendation| recommendation.status == RecommendationStatus::Pending)
            .collect()
    }

    pub fn pending_count(&self, profile_id: &str) -> usize {
        self.pending_for(profile_id).len()
    }

    pub fn find(&self, to_profile_id: &str, id: &str) -> Option<Recommendation> {
        self.store.find(to_profile_id, id)
    }

    /// File a new pending recommendation in the recipient's inbox. Returns its id.
    pub fn send(&self, fields: NewRecommendation) -> String {
        self.store.ensure_key(&fields.to_profile_id);
        self.store.insert(Recommendation {
            id: new_id(),
            from_profile_id: fields.from_profile_id,
            to_profile_id: fields.to_profile_id,
            content_type: fields.content_type,
            title: normalize_title(&fields.title),
            image_url: normalize_optional(fields.image_url),
            message: normalize_optional(fields.message),
            origin_tracked_item_id: normalize_optional(fields.origin_tracked_item_id),
            status: RecommendationStatus::Pending,
            created_at: now_millis(),
        })
    }

    /// Accept or reject (or reopen) a recommendation. Returns false when there is no such recommendation.
    pub fn mark_status(&self, to_profile_id: &str, id: &str, status: RecommendationStatus) -> bool {
        self.store.ensure_key(to_profile_id);
        self.store.modify(to_profile_id, id, |recommendation| {
            recommendation.status = status;
            Some(vec!["status"])
        })
    }

    pub fn remove(&self, to_profile_id: &str, id: &str) {
        self.store.remove(to_profile_id, id);
    }
}
