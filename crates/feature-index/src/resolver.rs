//! Collapsing of index hits that refer to the same physical platform.

use chrono::{DateTime, Utc};
use feature_common::Feature;
use std::collections::{BTreeMap, HashMap};
use storage::FeatureId;

/// Keep one feature per platform name: the one nearest in time to `target`.
///
/// This is a stable reduction. Each platform keeps the slot of its first
/// occurrence, so the relative order of distinct platforms is unchanged.
/// When two features are equally near, the earlier one wins.
pub fn deduplicate_nearest(features: Vec<Feature>, target: DateTime<Utc>) -> Vec<Feature> {
    let mut kept: Vec<(i64, Feature)> = Vec::with_capacity(features.len());
    let mut slots: HashMap<String, usize> = HashMap::new();

    for feature in features {
        let offset = feature.time_offset_millis(target);
        match slots.get(&feature.name) {
            Some(&slot) => {
                if offset < kept[slot].0 {
                    kept[slot] = (offset, feature);
                }
            }
            None => {
                slots.insert(feature.name.clone(), kept.len());
                kept.push((offset, feature));
            }
        }
    }

    kept.into_iter().map(|(_, f)| f).collect()
}

/// Group feature ids by the file they live in, remembering each id's
/// position in the input.
pub(crate) fn group_by_file(ids: &[FeatureId]) -> BTreeMap<u32, Vec<(usize, FeatureId)>> {
    let mut groups: BTreeMap<u32, Vec<(usize, FeatureId)>> = BTreeMap::new();
    for (pos, id) in ids.iter().enumerate() {
        groups.entry(id.file_id).or_default().push((pos, *id));
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use feature_common::{FeatureDomain, HorizontalPosition};
    use std::collections::BTreeMap;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 5, 1, 0, 0, 0).unwrap()
    }

    fn profile(id: &str, name: &str, minutes: i64) -> Feature {
        Feature {
            id: id.to_string(),
            name: name.to_string(),
            position: HorizontalPosition::new(0.0, 0.0),
            domain: FeatureDomain::Profile {
                time: t0() + Duration::minutes(minutes),
                depths: vec![1.0],
            },
            values: BTreeMap::new(),
        }
    }

    fn ids(features: &[Feature]) -> Vec<&str> {
        features.iter().map(|f| f.id.as_str()).collect()
    }

    #[test]
    fn test_nearest_replaces_in_place() {
        let features = vec![
            profile("0:0", "float-42", 60),
            profile("0:1", "float-7", 0),
            profile("0:2", "float-42", -10),
            profile("1:0", "float-9", 5),
        ];
        let result = deduplicate_nearest(features, t0());
        assert_eq!(ids(&result), vec!["0:2", "0:1", "1:0"]);
    }

    #[test]
    fn test_ties_keep_first() {
        let features = vec![
            profile("0:0", "float-42", 30),
            profile("0:1", "float-42", -30),
        ];
        let result = deduplicate_nearest(features, t0());
        assert_eq!(ids(&result), vec!["0:0"]);
    }

    #[test]
    fn test_distinct_platforms_untouched() {
        let features = vec![profile("0:0", "a", 5), profile("0:1", "b", 0)];
        let result = deduplicate_nearest(features.clone(), t0());
        assert_eq!(result, features);
    }

    #[test]
    fn test_group_by_file() {
        let ids = [
            FeatureId::new(2, 0),
            FeatureId::new(0, 4),
            FeatureId::new(2, 1),
        ];
        let groups = group_by_file(&ids);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&0], vec![(1, FeatureId::new(0, 4))]);
        assert_eq!(
            groups[&2],
            vec![(0, FeatureId::new(2, 0)), (2, FeatureId::new(2, 1))]
        );
    }
}
