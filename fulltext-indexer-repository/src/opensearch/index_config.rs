//! OpenSearch index configuration and mappings.

use serde_json::{json, Value};

use fulltext_indexer_shared::{TenantKey, SUMMARY_FIELD, TITLE_FIELD};

/// Name of the index holding `tenant`'s documents.
///
/// OpenSearch index names must be lowercase and may not contain
/// `\ / * ? " < > | , # :` or spaces; those characters become `_`.
pub fn index_name(prefix: &str, tenant: &TenantKey) -> String {
    format!("{}_{}", prefix, tenant)
        .to_lowercase()
        .chars()
        .map(|c| match c {
            '\\' | '/' | '*' | '?' | '"' | '<' | '>' | '|' | ',' | '#' | ':' | ' ' => '_',
            other => other,
        })
        .collect()
}

/// Get the index settings and mappings for a tenant index.
///
/// The configuration includes:
/// - **Keyword fields**: identifiers, classes and ownership, for filtering
/// - **Text fields**: the full-text summary and display title
/// - **Dynamic keyword template**: composite keys (`class%attribute`) of
///   indexed attributes are stored as exact-match keywords
pub fn get_index_settings() -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 1
        },
        "mappings": {
            "dynamic_templates": [
                {
                    "composite_keys": {
                        "match": "*%*",
                        "match_mapping_type": "string",
                        "mapping": { "type": "keyword" }
                    }
                }
            ],
            "properties": {
                "id": { "type": "keyword" },
                "_class": { "type": "keyword" },
                "space": { "type": "keyword" },
                "attachedTo": { "type": "keyword" },
                "attachedToClass": { "type": "keyword" },
                "modifiedBy": { "type": "keyword" },
                "modifiedOn": { "type": "date", "format": "epoch_millis" },
                SUMMARY_FIELD: { "type": "text" },
                TITLE_FIELD: {
                    "type": "text",
                    "fields": {
                        "raw": { "type": "keyword" }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_settings_structure() {
        let settings = get_index_settings();

        assert!(settings["settings"]["number_of_shards"].is_number());
        assert_eq!(settings["mappings"]["properties"]["_class"]["type"], "keyword");
        assert_eq!(settings["mappings"]["properties"][SUMMARY_FIELD]["type"], "text");
        assert_eq!(
            settings["mappings"]["dynamic_templates"][0]["composite_keys"]["match"],
            "*%*"
        );
    }

    #[test]
    fn test_index_name_is_sanitized() {
        assert_eq!(index_name("fulltext", &TenantKey::new("Acme Corp")), "fulltext_acme_corp");
        assert_eq!(index_name("ft", &TenantKey::new("w:1/2")), "ft_w_1_2");
    }
}
