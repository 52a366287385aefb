//! Default resolution: picking the one network, ssh key or firewall a server is created with.

use std::collections::BTreeMap;

use crate::{
    errors::{Error, Result},
    provider::NamedResource,
    types::ResourceId,
};

/// Pick one resource of `category` from `available`.
///
/// - nothing available: [`Error::NoResource`]
/// - a single resource: that resource, whatever the override says
/// - several: the override if it names one of them, otherwise [`Error::AmbiguousResource`]
///   listing every candidate sorted by name
pub fn resolve_default<'a, T: NamedResource>(
    category: &str,
    available: &'a BTreeMap<ResourceId, T>,
    override_id: Option<ResourceId>,
) -> Result<&'a T> {
    let mut resources = available.values();
    match (resources.next(), resources.next()) {
        (None, _) => Err(Error::NoResource {
            category: category.to_string(),
        }),
        (Some(only), None) => Ok(only),
        _ => {
            if let Some(chosen) = override_id.and_then(|id| available.get(&id)) {
                return Ok(chosen);
            }
            Err(Error::AmbiguousResource {
                category: category.to_string(),
                candidates: candidate_lines(available),
            })
        }
    }
}

/// `"- name (id N)"` lines sorted by name, then id
pub fn candidate_lines<T: NamedResource>(available: &BTreeMap<ResourceId, T>) -> Vec<String> {
    let mut sorted: Vec<&T> = available.values().collect();
    sorted.sort_by(|a, b| a.name().cmp(b.name()).then(a.id().cmp(&b.id())));
    sorted.into_iter().map(NamedResource::listing_line).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Network;

    fn networks(entries: &[(ResourceId, &str)]) -> BTreeMap<ResourceId, Network> {
        entries
            .iter()
            .map(|(id, name)| {
                (
                    *id,
                    Network {
                        id: *id,
                        name: name.to_string(),
                        ip_range: None,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_empty_category_fails() {
        let err = resolve_default("network", &networks(&[]), Some(1)).unwrap_err();
        assert!(matches!(err, Error::NoResource { ref category } if category == "network"));
    }

    #[test]
    fn test_single_entry_ignores_override() {
        let available = networks(&[(5, "only")]);
        for override_id in [None, Some(5), Some(99)] {
            assert_eq!(resolve_default("network", &available, override_id).unwrap().id, 5);
        }
    }

    #[test]
    fn test_valid_override_is_used() {
        let available = networks(&[(1, "a"), (2, "b"), (3, "c")]);
        for id in [1, 2, 3] {
            assert_eq!(resolve_default("network", &available, Some(id)).unwrap().id, id);
        }
    }

    #[test]
    fn test_ambiguity_lists_candidates_sorted_by_name() {
        let available = networks(&[(1, "zeta"), (2, "alpha"), (3, "mid")]);

        for override_id in [None, Some(42)] {
            let err = resolve_default("network", &available, override_id).unwrap_err();
            match &err {
                Error::AmbiguousResource { category, candidates } => {
                    assert_eq!(category, "network");
                    assert_eq!(candidates, &vec!["- alpha (id 2)", "- mid (id 3)", "- zeta (id 1)"]);
                }
                other => panic!("unexpected error: {other:?}"),
            }
            let message = err.to_string();
            assert!(message.starts_with("Multiple networks exist, and no default is set."));
            assert!(message.contains("set-defaults"));
        }
    }
}
