use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use uuid::Uuid;

use crate::config::*;
use crate::core::errors::ApiError;
use crate::core::store::KvStore;
use crate::models::models::Group;

fn slug_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[-a-zA-Z0-9_]+$").expect("Regex should compile"))
}

/// Groups have no public create endpoint; they come from seeding and tests.
pub fn create_group<S: KvStore>(store: &S, title: &str, slug: &str, description: &str) -> anyhow::Result<Group> {
    if title.trim().is_empty() {
        return Err(ApiError::BadRequest("Group title is required".to_string()).into());
    }
    if !slug_regex().is_match(slug) {
        return Err(ApiError::BadRequest(format!("Invalid group slug {}", slug)).into());
    }

    let group = Group {
        id: Uuid::new_v4().to_string(),
        title: title.trim().to_string(),
        slug: slug.to_string(),
        description: description.to_string(),
    };
    store.set_json(&group_key(&group.id), &group)?;

    let claimed = store.update_json(GROUP_SLUGS_KEY, |slugs: &mut BTreeMap<String, String>| {
        if slugs.contains_key(&group.slug) {
            return false;
        }
        slugs.insert(group.slug.clone(), group.id.clone());
        true
    })?;
    if !claimed {
        store.delete(&group_key(&group.id))?;
        return Err(ApiError::Conflict(format!("Group {} exists", slug)).into());
    }
    store.update_json(GROUPS_LIST_KEY, |ids: &mut Vec<String>| ids.push(group.id.clone()))?;

    tracing::info!(slug = %group.slug, "group created");
    Ok(group)
}

pub fn get_group<S: KvStore>(store: &S, id: &str) -> anyhow::Result<Option<Group>> {
    store.get_json(&group_key(id))
}

pub fn get_group_by_slug<S: KvStore>(store: &S, slug: &str) -> anyhow::Result<Option<Group>> {
    let slugs: BTreeMap<String, String> = store.get_json(GROUP_SLUGS_KEY)?.unwrap_or_default();
    match slugs.get(slug) {
        Some(id) => get_group(store, id),
        None => Ok(None),
    }
}

/// Groups in creation order.
pub fn list_groups<S: KvStore>(store: &S) -> anyhow::Result<Vec<Group>> {
    let ids: Vec<String> = store.get_json(GROUPS_LIST_KEY)?.unwrap_or_default();
    let mut groups = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(group) = get_group(store, &id)? {
            groups.push(group);
        }
    }
    Ok(groups)
}
