//! Stable tenant-to-endpoint routing.

use fulltext_indexer_shared::TenantKey;

/// Split a `;`-separated endpoint list, trimming whitespace.
pub fn split_endpoints(list: &str) -> Vec<String> {
    list.split(';').map(|it| it.trim().to_string()).collect()
}

/// `hash = hash * 31 + unit` over the UTF-16 code units of the key, with
/// 32-bit wrapping arithmetic.
pub fn hash_tenant(tenant: &TenantKey) -> i32 {
    tenant
        .as_str()
        .encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

/// Pick the endpoint for `tenant`: `|hash mod n|`. `None` for an empty list.
pub fn select_endpoint<'a>(tenant: &TenantKey, endpoints: &'a [String]) -> Option<&'a str> {
    if endpoints.is_empty() {
        return None;
    }
    let n = endpoints.len() as i64;
    let index = (i64::from(hash_tenant(tenant)) % n).unsigned_abs() as usize;
    endpoints.get(index).map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_matches_reference_values() {
        assert_eq!(hash_tenant(&TenantKey::new("")), 0);
        assert_eq!(hash_tenant(&TenantKey::new("a")), 97);
        assert_eq!(hash_tenant(&TenantKey::new("ab")), 97 * 31 + 98);
        // Overflow wraps like 32-bit integer arithmetic.
        assert_eq!(
            hash_tenant(&TenantKey::new("workspace-with-a-long-name")),
            "workspace-with-a-long-name"
                .encode_utf16()
                .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(c as i32))
        );
    }

    #[test]
    fn test_selection_is_stable() {
        let endpoints = split_endpoints("http://a:4700; http://b:4700 ;http://c:4700");
        assert_eq!(endpoints[1], "http://b:4700");

        let tenant = TenantKey::new("tenant-42");
        let first = select_endpoint(&tenant, &endpoints);
        for _ in 0..10 {
            assert_eq!(select_endpoint(&tenant, &endpoints), first);
        }
        assert!(first.is_some());
    }

    #[test]
    fn test_negative_hash_selects_valid_index() {
        let endpoints = split_endpoints("a;b;c");
        let tenant = (0..1000)
            .map(|i| TenantKey::new(format!("tenant-{}-with-a-long-suffix", i)))
            .find(|t| hash_tenant(t) < 0)
            .unwrap();
        let hash = hash_tenant(&tenant);
        let expected = (hash % 3).unsigned_abs() as usize;
        assert_eq!(select_endpoint(&tenant, &endpoints), Some(endpoints[expected].as_str()));
    }

    #[test]
    fn test_empty_list() {
        assert_eq!(select_endpoint(&TenantKey::new("t"), &[]), None);
        assert_eq!(split_endpoints("only"), vec!["only".to_string()]);
    }
}
