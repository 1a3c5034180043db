//! Deterministic cache keys.
//!
//! A key is a resource name plus a sorted set of parameters, rendered as
//! `resource?k1=v1&k2=v2`. Every component is percent-encoded, so separator
//! characters inside a value cannot make two different parameter sets render
//! to the same string.

use std::collections::BTreeMap;
use std::fmt;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Characters escaped in key components; unreserved URL characters stay as-is
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    resource: String,
    params: BTreeMap<String, String>,
}

impl CacheKey {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(name.into(), value.to_string());
        self
    }

    /// Add `name` only when a value is present
    pub fn param_opt<T: ToString>(self, name: impl Into<String>, value: Option<T>) -> Self {
        match value {
            Some(value) => self.param(name, value),
            None => self,
        }
    }

    /// Add `name`, substituting `default` for an absent value
    pub fn param_or<T: ToString>(
        self,
        name: impl Into<String>,
        value: Option<T>,
        default: impl ToString,
    ) -> Self {
        match value {
            Some(value) => self.param(name, value),
            None => self.param(name, default),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Prefix shared by every key of `resource`, for bulk invalidation
    pub fn resource_prefix(resource: &str) -> String {
        format!("{}?", encode(resource))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}?", encode(&self.resource))?;
        for (i, (name, value)) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str("&")?;
            }
            write!(f, "{}={}", encode(name), encode(value))?;
        }
        Ok(())
    }
}

fn encode(component: &str) -> percent_encoding::PercentEncode<'_> {
    utf8_percent_encode(component, COMPONENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_order_does_not_matter() {
        let a = CacheKey::new("cases")
            .param("specialty", "cardiology")
            .param("page", 2);
        let b = CacheKey::new("cases")
            .param("page", 2)
            .param("specialty", "cardiology");

        assert_eq!(a.to_string(), b.to_string());
        assert_eq!(a.to_string(), "cases?page=2&specialty=cardiology");
    }

    #[test]
    fn test_defaults_match_explicit_values() {
        let implicit = CacheKey::new("cases").param_or("page", None::<u32>, 1);
        let explicit = CacheKey::new("cases").param("page", 1);
        assert_eq!(implicit.to_string(), explicit.to_string());
    }

    #[test]
    fn test_absent_and_empty_filters_differ() {
        let absent = CacheKey::new("cases").param_opt("specialty", None::<&str>);
        let empty = CacheKey::new("cases").param_opt("specialty", Some(""));

        assert_eq!(absent.to_string(), "cases?");
        assert_eq!(empty.to_string(), "cases?specialty=");
    }

    #[test]
    fn test_separators_in_values_do_not_collide() {
        let injected = CacheKey::new("cases").param("specialty", "a&page=2");
        let split = CacheKey::new("cases")
            .param("specialty", "a")
            .param("page", 2);

        assert_ne!(injected.to_string(), split.to_string());
        assert_eq!(injected.to_string(), "cases?specialty=a%26page%3D2");
    }

    #[test]
    fn test_resource_prefix_covers_all_keys() {
        let prefix = CacheKey::resource_prefix("cases");
        assert!(
            CacheKey::new("cases")
                .param("page", 1)
                .to_string()
                .starts_with(&prefix)
        );
        assert!(CacheKey::new("cases").to_string().starts_with(&prefix));
        assert!(!CacheKey::new("cases-archive").to_string().starts_with(&prefix));
    }
}
