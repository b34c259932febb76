//! Tag sets attached to items.
//!
//! An item has at most one tag record. The record is created the first time the item's tags
//! are read or changed, and removed again once its last tag is deleted.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;

use crate::db::{CollectionRegistry, DocCollection, Filter, Order, Stored};
use crate::errors::{AppError, ConceptError};

pub const TAG_COLLECTION: &str = "tags";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagDoc {
    pub item: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// How [`Tagging::delete_tags`] treats tags the item does not carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TagDeletePolicy {
    /// Absent tags are ignored
    #[default]
    Idempotent,
    /// Absent tags fail with DoesNotExist and nothing is removed
    Strict,
}

impl FromStr for TagDeletePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "idempotent" => Ok(TagDeletePolicy::Idempotent),
            "strict" => Ok(TagDeletePolicy::Strict),
            other => Err(format!("unknown tag delete policy {:?}", other)),
        }
    }
}

/// A tag with how many of the queried items carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
}

pub struct Tagging {
    records: DocCollection<TagDoc>,
    policy: TagDeletePolicy,
}

impl Tagging {
    pub async fn new(
        registry: &CollectionRegistry,
        pool: SqlitePool,
        policy: TagDeletePolicy,
    ) -> Result<Self, AppError> {
        Ok(Self {
            records: DocCollection::new(registry, pool, TAG_COLLECTION).await?,
            policy,
        })
    }

    /// Trim, reject empty tags, and drop duplicates while keeping order.
    pub fn normalize(tags: &[String]) -> Result<Vec<String>, ConceptError> {
        let mut out: Vec<String> = Vec::with_capacity(tags.len());
        for tag in tags {
            let tag = tag.trim();
            if tag.is_empty() {
                return Err(ConceptError::bad_values("Tags must be non-empty!"));
            }
            if !out.iter().any(|existing| existing == tag) {
                out.push(tag.to_string());
            }
        }
        Ok(out)
    }

    /// The item's record, created empty if it does not exist yet.
    async fn record(&self, item: &str) -> Result<Stored<TagDoc>, AppError> {
        let filter = Filter::eq("item", item);
        if let Some(record) = self.records.read_one(&filter).await? {
            return Ok(record);
        }

        let empty = TagDoc {
            item: item.to_string(),
            tags: Vec::new(),
        };
        self.records.create_one_unless(&empty, &filter).await?;
        self.records
            .read_one(&filter)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Tag record for {} vanished", item)))
    }

    pub async fn get_tags(&self, item: &str) -> Result<Vec<String>, AppError> {
        Ok(self.record(item).await?.fields.tags)
    }

    /// Add tags to an item. Tags already present are skipped. Returns the resulting set.
    pub async fn add_tags(&self, item: &str, tags: &[String]) -> Result<Vec<String>, AppError> {
        let tags = Self::normalize(tags)?;
        self.record(item).await?;

        let values: Vec<Value> = tags.into_iter().map(Value::from).collect();
        self.records
            .add_to_set(&Filter::eq("item", item), "tags", &values)
            .await?;
        self.get_tags(item).await
    }

    /// Remove tags from an item. Returns the remaining set; the record is dropped when it
    /// becomes empty.
    pub async fn delete_tags(&self, item: &str, tags: &[String]) -> Result<Vec<String>, AppError> {
        let tags = Self::normalize(tags)?;
        let record = self.record(item).await?;

        if self.policy == TagDeletePolicy::Strict {
            if let Some(absent) = tags.iter().find(|tag| !record.fields.tags.contains(tag)) {
                return Err(ConceptError::does_not_exist("Tag {0} does not exist on item {1}!")
                    .arg(absent.as_str())
                    .arg(item)
                    .into());
            }
        }

        let filter = Filter::eq("item", item);
        let values: Vec<Value> = tags.into_iter().map(Value::from).collect();
        self.records.pull_all(&filter, "tags", &values).await?;

        let remaining = self
            .records
            .read_one(&filter)
            .await?
            .map(|record| record.fields.tags)
            .unwrap_or_default();
        if remaining.is_empty() {
            self.records.delete_one(&filter).await?;
        }
        Ok(remaining)
    }

    /// Drop the item's record entirely.
    pub async fn delete_item(&self, item: &str) -> Result<(), AppError> {
        self.records.delete_many(&Filter::eq("item", item)).await?;
        Ok(())
    }

    pub async fn get_items_with_tag(&self, tag: &str) -> Result<Vec<String>, AppError> {
        let records = self
            .records
            .read_many(&Filter::contains("tags", tag), Order::Inserted)
            .await?;
        Ok(records.into_iter().map(|record| record.fields.item).collect())
    }

    /// The members of `others` that share at least one tag with `item`, in `others` order.
    /// `item` itself is never included.
    pub async fn get_matching_items(
        &self,
        item: &str,
        others: &[String],
    ) -> Result<Vec<String>, AppError> {
        let tags = self.get_tags(item).await?;
        if tags.is_empty() {
            return Ok(Vec::new());
        }

        let filter = Filter::one_of("item", others.iter().cloned()).and(Filter::ne("item", item));
        let records = self.records.read_many(&filter, Order::Inserted).await?;

        let mut matching = Vec::new();
        for other in others {
            if matching.contains(other) {
                continue;
            }
            let shares_tag = records
                .iter()
                .filter(|record| &record.fields.item == other)
                .any(|record| record.fields.tags.iter().any(|tag| tags.contains(tag)));
            if shares_tag {
                matching.push(other.clone());
            }
        }
        Ok(matching)
    }

    /// Most frequent tags across `items`, highest count first.
    ///
    /// Equal counts keep the order in which the tags were first seen, walking `items` in
    /// order and each item's tags in stored order.
    pub async fn top_tags_for_items(
        &self,
        items: &[String],
        limit: usize,
    ) -> Result<Vec<TagCount>, AppError> {
        let records = self
            .records
            .read_many(&Filter::one_of("item", items.iter().cloned()), Order::Inserted)
            .await?;
        let by_item: HashMap<&str, &[String]> = records
            .iter()
            .map(|record| (record.fields.item.as_str(), record.fields.tags.as_slice()))
            .collect();

        let mut counts: Vec<TagCount> = Vec::new();
        for item in items {
            let Some(tags) = by_item.get(item.as_str()) else {
                continue;
            };
            for tag in tags.iter() {
                match counts.iter_mut().find(|entry| &entry.tag == tag) {
                    Some(entry) => entry.count += 1,
                    None => counts.push(TagCount {
                        tag: tag.clone(),
                        count: 1,
                    }),
                }
            }
        }

        // Stable sort keeps first-seen order among ties.
        counts.sort_by(|a, b| b.count.cmp(&a.count));
        counts.truncate(limit);
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::temp_pool;
    use crate::errors::ErrorKind;

    async fn concept(policy: TagDeletePolicy) -> (Tagging, tempfile::TempDir) {
        let (pool, dir) = temp_pool().await;
        let concept = Tagging::new(&CollectionRegistry::new(), pool, policy)
            .await
            .unwrap();
        (concept, dir)
    }

    fn tags(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let (tagging, _dir) = concept(TagDeletePolicy::Idempotent).await;
        tagging.add_tags("w1", &tags(&["x"])).await.unwrap();
        let result = tagging.add_tags("w1", &tags(&["x", " x "])).await.unwrap();
        assert_eq!(result, vec!["x"]);
    }

    #[tokio::test]
    async fn test_delete_absent_tag_is_not_an_error() {
        let (tagging, _dir) = concept(TagDeletePolicy::Idempotent).await;
        let remaining = tagging.delete_tags("w1", &tags(&["x"])).await.unwrap();
        assert!(remaining.is_empty());
        assert!(tagging.get_tags("w1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_strict_policy_rejects_absent_tag() {
        let (tagging, _dir) = concept(TagDeletePolicy::Strict).await;
        tagging.add_tags("w1", &tags(&["a", "b"])).await.unwrap();

        let err = tagging
            .delete_tags("w1", &tags(&["a", "zzz"]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::DoesNotExist));
        assert_eq!(tagging.get_tags("w1").await.unwrap(), vec!["a", "b"]);

        let remaining = tagging.delete_tags("w1", &tags(&["a"])).await.unwrap();
        assert_eq!(remaining, vec!["b"]);
    }

    #[tokio::test]
    async fn test_one_record_per_item() {
        let (tagging, _dir) = concept(TagDeletePolicy::Idempotent).await;
        tagging.get_tags("w1").await.unwrap();
        tagging.add_tags("w1", &tags(&["a"])).await.unwrap();
        tagging.add_tags("w1", &tags(&["b"])).await.unwrap();
        assert_eq!(
            tagging
                .records
                .count(&Filter::eq("item", "w1"))
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_emptied_record_is_removed() {
        let (tagging, _dir) = concept(TagDeletePolicy::Idempotent).await;
        tagging.add_tags("w1", &tags(&["a"])).await.unwrap();
        tagging.delete_tags("w1", &tags(&["a"])).await.unwrap();
        assert_eq!(tagging.records.count(&Filter::All).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_tag_rejected() {
        let (tagging, _dir) = concept(TagDeletePolicy::Idempotent).await;
        let err = tagging.add_tags("w1", &tags(&["ok", "  "])).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::BadValues));
        assert!(tagging.get_tags("w1").await.unwrap().is_empty());
    }

    #[test]
    fn test_normalize_without_a_store() {
        assert_eq!(
            Tagging::normalize(&tags(&[" a", "b", "a "])).unwrap(),
            vec!["a", "b"]
        );
        let err = Tagging::normalize(&tags(&["a", "\t"])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadValues);
        assert!(Tagging::normalize(&[]).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_matching_items() {
        let (tagging, _dir) = concept(TagDeletePolicy::Idempotent).await;
        tagging.add_tags("w1", &tags(&["news", "tech"])).await.unwrap();
        tagging.add_tags("w2", &tags(&["tech"])).await.unwrap();
        tagging.add_tags("w3", &tags(&["cooking"])).await.unwrap();

        let others = tags(&["w3", "w2", "w1", "w4"]);
        let matching = tagging.get_matching_items("w1", &others).await.unwrap();
        assert_eq!(matching, vec!["w2"]);

        assert!(tagging
            .get_matching_items("untagged", &others)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_top_tags() {
        let (tagging, _dir) = concept(TagDeletePolicy::Idempotent).await;
        tagging.add_tags("i1", &tags(&["a", "b"])).await.unwrap();
        tagging.add_tags("i2", &tags(&["b", "c"])).await.unwrap();
        tagging.add_tags("i3", &tags(&["b"])).await.unwrap();

        let top = tagging
            .top_tags_for_items(&tags(&["i1", "i2", "i3"]), 2)
            .await
            .unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(
            top[0],
            TagCount {
                tag: "b".into(),
                count: 3
            }
        );
        assert_eq!(top[1].count, 1);
        assert_eq!(top[1].tag, "a");
    }

    #[tokio::test]
    async fn test_items_with_tag_and_delete_item() {
        let (tagging, _dir) = concept(TagDeletePolicy::Idempotent).await;
        tagging.add_tags("w1", &tags(&["rust"])).await.unwrap();
        tagging.add_tags("w2", &tags(&["rust", "web"])).await.unwrap();

        assert_eq!(
            tagging.get_items_with_tag("rust").await.unwrap(),
            vec!["w1", "w2"]
        );
        tagging.delete_item("w1").await.unwrap();
        assert_eq!(tagging.get_items_with_tag("rust").await.unwrap(), vec!["w2"]);
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!(
            "STRICT".parse::<TagDeletePolicy>().unwrap(),
            TagDeletePolicy::Strict
        );
        assert!("sometimes".parse::<TagDeletePolicy>().is_err());
    }
}
