// Request fingerprints: the key under which interchangeable requests share one result

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::algorithm::PathQuery;
use crate::config::CachePolicy;
use crate::graph::{CollisionCategory, NodeIndex};

/// Projection of a query onto the fields that decide its result.
///
/// `start` is `None` when the comparer treats every start as equivalent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub start: Option<NodeIndex>,
    pub end: NodeIndex,
    pub agent_size: u8,
    pub collision_category: CollisionCategory,
}

/// Decides which requests are interchangeable.
///
/// Equality and hashing both go through [`fingerprint`](Self::fingerprint), so equal keys
/// always hash equally. Implement this to widen or narrow the key without touching the cache.
pub trait RequestComparer: Send + Sync + 'static {
    fn fingerprint(&self, query: &PathQuery) -> Fingerprint;

    fn equals(&self, a: &PathQuery, b: &PathQuery) -> bool {
        self.fingerprint(a) == self.fingerprint(b)
    }

    fn hash_of(&self, query: &PathQuery) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.fingerprint(query).hash(&mut hasher);
        hasher.finish()
    }
}

/// `(end, agent size, collision category)`: for algorithms whose result does not depend on
/// the start, like flow fields
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleSourceComparer;

impl RequestComparer for SingleSourceComparer {
    fn fingerprint(&self, query: &PathQuery) -> Fingerprint {
        Fingerprint {
            start: None,
            end: query.end,
            agent_size: query.agent_size,
            collision_category: query.collision_category,
        }
    }
}

/// Single-source key plus the start node
#[derive(Debug, Clone, Copy, Default)]
pub struct PointToPointComparer;

impl RequestComparer for PointToPointComparer {
    fn fingerprint(&self, query: &PathQuery) -> Fingerprint {
        Fingerprint {
            start: Some(query.start),
            ..SingleSourceComparer.fingerprint(query)
        }
    }
}

impl CachePolicy {
    pub fn comparer(self) -> Arc<dyn RequestComparer> {
        match self {
            CachePolicy::SingleSource => Arc::new(SingleSourceComparer),
            CachePolicy::PointToPoint => Arc::new(PointToPointComparer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(start: NodeIndex, end: NodeIndex) -> PathQuery {
        PathQuery::new(start, end).with_collision_category(CollisionCategory::CAT1)
    }

    #[test]
    fn test_single_source_ignores_start() {
        let comparer = SingleSourceComparer;
        assert!(comparer.equals(&query(0, 9), &query(4, 9)));
        assert_eq!(comparer.hash_of(&query(0, 9)), comparer.hash_of(&query(4, 9)));
        assert!(!comparer.equals(&query(0, 9), &query(0, 8)));
    }

    #[test]
    fn test_constraints_are_part_of_key() {
        let comparer = SingleSourceComparer;
        let base = query(0, 9);
        assert!(!comparer.equals(&base, &base.with_agent_size(2)));
        assert!(!comparer.equals(
            &base,
            &base.with_collision_category(CollisionCategory::CAT2)
        ));
    }

    #[test]
    fn test_point_to_point_includes_start() {
        let comparer = PointToPointComparer;
        assert!(!comparer.equals(&query(0, 9), &query(4, 9)));
        assert!(comparer.equals(&query(4, 9), &query(4, 9)));
        assert_eq!(comparer.fingerprint(&query(4, 9)).start, Some(4));
    }

    #[test]
    fn test_policy_selects_comparer() {
        let a = query(0, 9);
        let b = query(1, 9);
        assert!(CachePolicy::SingleSource.comparer().equals(&a, &b));
        assert!(!CachePolicy::PointToPoint.comparer().equals(&a, &b));
    }
}
