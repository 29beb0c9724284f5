//! Grouping and summing of filtered responses

use crate::{
    cipher::CipherVector,
    det_tag::GroupingKey,
    responses::{FilteredResponse, FilteredResponseDet},
    zkp::aggregation::PublishedAggregationListProof,
    Result,
};
use std::collections::{btree_map::Entry, BTreeMap};

/// Filtered responses summed per group
pub type GroupedResponses = BTreeMap<GroupingKey, FilteredResponse>;

/// Adds a response to its group, or starts the group
pub fn add_in_map(
    map: &mut GroupedResponses,
    key: GroupingKey,
    added: FilteredResponse,
) -> Result<()> {
    match map.entry(key) {
        Entry::Vacant(e) => {
            e.insert(added);
        }
        Entry::Occupied(mut e) => e.get_mut().add(&added)?,
    }
    Ok(())
}

/// Merges two sets of groups, summing the groups they share
pub fn merge_groups(mut into: GroupedResponses, other: GroupedResponses) -> Result<GroupedResponses> {
    for (k, v) in other.into_iter() {
        add_in_map(&mut into, k, v)?;
    }
    Ok(into)
}

/// Groups tagged responses by key and sums them
pub fn aggregate(responses: &[FilteredResponseDet]) -> Result<GroupedResponses> {
    let mut map = GroupedResponses::new();
    for r in responses.iter() {
        add_in_map(&mut map, r.det_tag_group_by.clone(), r.fr.clone())?;
    }
    Ok(map)
}

/// Proves the sums of [`aggregate`] column by column
///
/// Every aggregated attribute of every group gets one proof over the values
/// that went into it.
pub fn aggregation_proofs(
    responses: &[FilteredResponseDet],
    groups: &GroupedResponses,
) -> PublishedAggregationListProof {
    let mut columns: BTreeMap<(&str, usize), CipherVector> = BTreeMap::new();
    for r in responses.iter() {
        for (j, ct) in r.fr.aggregating_attributes.iter().enumerate() {
            columns
                .entry((r.det_tag_group_by.as_str(), j))
                .or_default()
                .push(*ct);
        }
    }
    let (data, results) = columns
        .into_iter()
        .filter_map(|((k, j), data)| {
            let result = groups.get(k)?.aggregating_attributes.get(j)?;
            Some((data, *result))
        })
        .unzip();
    PublishedAggregationListProof::create(data, results)
}

/// Proves that merged groups are the sums of their parts
pub fn merge_proofs(parts: &[&GroupedResponses], merged: &GroupedResponses) -> PublishedAggregationListProof {
    let mut data = Vec::new();
    let mut results = Vec::new();
    for (k, total) in merged.iter() {
        for (j, result) in total.aggregating_attributes.iter().enumerate() {
            let column: CipherVector = parts
                .iter()
                .filter_map(|p| p.get(k)?.aggregating_attributes.get(j).copied())
                .collect();
            data.push(column);
            results.push(*result);
        }
    }
    PublishedAggregationListProof::create(data, results)
}

/// Whether a merge proof publishes exactly the aggregated attributes of `groups`
///
/// The proof must list one column per attribute of every group, in the order
/// [`merge_proofs`] produces them.
pub fn proof_covers(proof: &PublishedAggregationListProof, groups: &GroupedResponses) -> bool {
    let results: Vec<_> = groups
        .values()
        .flat_map(|g| g.aggregating_attributes.iter())
        .collect();
    results.len() == proof.list.len()
        && proof
            .list
            .iter()
            .zip(results)
            .all(|(p, r)| p.aggregation_result == *r)
}
