//! Worklist loading: a JSON array of content items, in fetch order.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tubepool_store::{is_valid_id, ContentItem};

pub fn load(path: &Path) -> Result<Vec<ContentItem>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read worklist {}", path.display()))?;
    parse(&contents).with_context(|| format!("Invalid worklist {}", path.display()))
}

/// Parse and check ids. Duplicate ids keep their first occurrence.
pub fn parse(contents: &str) -> Result<Vec<ContentItem>> {
    let items: Vec<ContentItem> = serde_json::from_str(contents)?;

    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        if !is_valid_id(&item.id) {
            bail!("item {} has an unusable id {:?}", index, item.id);
        }
        if seen.insert(item.id.clone()) {
            unique.push(item);
        }
    }
    Ok(unique)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keeps_order_and_dedups() {
        let items = parse(
            r#"[
                {"id": "b", "title": "Second", "channel": "UC_y"},
                {"id": "a", "title": "First", "channel": "UC_x", "published": "2024-06-01"},
                {"id": "b", "title": "Second again", "channel": "UC_y"}
            ]"#,
        )
        .unwrap();

        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(items[0].title, "Second");
        assert!(items[1].published.is_some());
    }

    #[test]
    fn test_rejects_bad_ids() {
        assert!(parse(r#"[{"id": "", "title": "t", "channel": "c"}]"#).is_err());
        assert!(parse(r#"[{"id": "a\nb", "title": "t", "channel": "c"}]"#).is_err());
        assert!(parse(r#"[{"id": " vid ", "title": "t", "channel": "c"}]"#).is_err());
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(parse(r#"{"id": "a"}"#).is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn test_empty_worklist() {
        assert!(parse("[]").unwrap().is_empty());
    }
}
