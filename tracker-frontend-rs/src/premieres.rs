//! Upcoming releases each profile is waiting for.
//!
//! New premieres are prepended locally; the remote view orders them by release date.

use chrono::NaiveDate;
use mirror::{
    CollectionSpec, CollectionStore, Field, ListenerKey, Services, new_id, now_millis,
    remote::OrderBy,
};

use crate::{
    config::{PREMIERES_CACHE_KEY, remote_collection},
    domain::{ContentType, Premiere},
    utils::{normalize_optional, normalize_tags, normalize_title},
};

pub fn premieres_spec() -> CollectionSpec {
    CollectionSpec {
        name: "premieres",
        collection: remote_collection("premieres"),
        order: OrderBy::ascending("releaseDate"),
        cache_key: PREMIERES_CACHE_KEY,
    }
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewPremiere {
    pub content_type: ContentType,
    pub title: String,
    pub release_date: NaiveDate,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PremierePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub comment: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub image_url: Field<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl PremierePatch {
    fn apply(self, premiere: &mut Premiere) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if let Some(content_type) = self.content_type {
            premiere.content_type = content_type;
            changed.push("contentType");
        }
        if let Some(title) = self.title {
            premiere.title = normalize_title(&title);
            changed.push("title");
        }
        if let Some(release_date) = self.release_date {
            premiere.release_date = release_date;
            changed.push("releaseDate");
        }
        if let Some(comment) = self.comment.into_change() {
            premiere.comment = normalize_optional(comment);
            changed.push("comment");
        }
        if let Some(image_url) = self.image_url.into_change() {
            premiere.image_url = normalize_optional(image_url);
            changed.push("imageUrl");
        }
        if let Some(tags) = self.tags {
            premiere.tags = normalize_tags(tags);
            changed.push("tags");
        }
        changed
    }
}

#[derive(Clone)]
pub struct Premieres {
    store: CollectionStore<Premiere>,
}

impl Premieres {
    pub fn new(services: Services) -> Self {
        Self {
            store: CollectionStore::new(premieres_spec(), services),
        }
    }

    pub fn store(&self) -> &CollectionStore<Premiere> {
        &self.store
    }

    pub fn subscribe(&self, listener: impl Fn() + 'static) -> ListenerKey {
        self.store.subscribe(listener)
    }

    pub fn unsubscribe(&self, key: ListenerKey) {
        self.store.unsubscribe(key)
    }

    pub fn premieres_for(&self, profile_id: &str) -> Vec<Premiere> {
        self.store.list(profile_id)
    }

    pub fn find(&self, profile_id: &str, id: &str) -> Option<Premiere> {
        self.store.find(profile_id, id)
    }

    pub fn create(&self, profile_id: &str, fields: NewPremiere) -> String {
        self.store.ensure_key(profile_id);
        let now = now_millis();
        self.store.insert(Premiere {
            id: new_id(),
            profile_id: profile_id.to_string(),
            content_type: fields.content_type,
            title: normalize_title(&fields.title),
            release_date: fields.release_date,
            comment: normalize_optional(fields.comment),
            image_url: normalize_optional(fields.image_url),
            tags: normalize_tags(fields.tags),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn update(&self, profile_id: &str, id: &str, patch: PremierePatch) -> bool {
        self.store.ensure_key(profile_id);
        self.store.modify(profile_id, id, |premiere| {
            let mut changed = patch.apply(premiere);
            premiere.updated_at = now_millis();
            changed.push("updatedAt");
            Some(changed)
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

    fn premiere(title: &str, date: (i32, u32, u32)) -> NewPremiere {
        NewPremiere {
            content_type: ContentType::Anime,
            title: title.to_string(),
            release_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            comment: None,
            image_url: Some(" ".to_string()),
            tags: vec![],
        }
    }

    fn titles(premieres: &[Premiere]) -> Vec<&str> {
        premieres.iter().map(|p| p.title.as_str()).collect()
    }

    #[test]
    fn test_create_is_newest_first_locally() {
        let harness = Harness::new();
        let premieres = Premieres::new(harness.services());
        premieres.create("pablo", premiere("Late", (2027, 4, 1)));
        premieres.create("pablo", premiere("Early", (2026, 12, 1)));

        let listed = premieres.premieres_for("pablo");
        assert_eq!(titles(&listed), vec!["Early", "Late"]);
        assert_eq!(listed[0].image_url, None, "blank url dropped");
    }

    #[test]
    fn test_remote_view_orders_by_release_date() {
        let mut harness = Harness::new();
        let premieres = Premieres::new(harness.services());
        premieres.store().connect();

        premieres.create("celia", premiere("Spring", (2027, 4, 1)));
        premieres.create("celia", premiere("Winter", (2027, 1, 10)));
        premieres.create("celia", premiere("Autumn", (2026, 10, 20)));
        harness.settle();

        assert_eq!(
            titles(&premieres.premieres_for("celia")),
            vec!["Autumn", "Winter", "Spring"]
        );
    }

    #[test]
    fn test_update_moves_release_date() {
        let mut harness = Harness::new();
        let premieres = Premieres::new(harness.services());
        let id = premieres.create("pablo", premiere("Delayed", (2026, 11, 1)));
        harness.settle();

        assert!(premieres.update(
            "pablo",
            &id,
            PremierePatch {
                release_date: NaiveDate::from_ymd_opt(2027, 2, 14),
                comment: Field::Value("pushed back".to_string()),
                ..PremierePatch::default()
            }
        ));
        harness.settle();

        let stored = harness
            .remote
            .document(&remote_collection("premieres"), &id)
            .unwrap();
        assert_eq!(stored["releaseDate"], json!("2027-02-14"));
        assert_eq!(stored["comment"], json!("pushed back"));
        assert!(!premieres.update("pablo", "missing", PremierePatch::default()));
    }

    #[test]
    fn test_remove() {
        let harness = Harness::new();
        let premieres = Premieres::new(harness.services());
        let id = premieres.create("pablo", premiere("Gone", (2026, 11, 1)));
        premieres.remove("pablo", &id);
        assert!(premieres.premieres_for("pablo").is_empty());
        assert!(premieres.find("pablo", &id).is_none());
    }
}
