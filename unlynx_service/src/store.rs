//! Per-survey state kept by a server between protocol phases

use std::collections::{btree_map::Entry, BTreeMap};
use tracing::debug;
use unlynx_curve::{
    aggregation::{add_in_map, aggregate, aggregation_proofs, GroupedResponses},
    cipher::{add_assign_vector, CipherText},
    det_tag::GroupingKey,
    responses::{
        data_to_map, map_to_data, DpClearResponse, DpResponse, FilteredResponse,
        FilteredResponseDet, GroupingKeyTuple, ProcessResponse,
    },
    zkp::aggregation::PublishedAggregationListProof,
    Result,
};

/// Data of one survey on one server
#[derive(Clone, Debug, Default)]
pub struct Store {
    dp_responses: Vec<ProcessResponse>,
    dp_responses_aggr: BTreeMap<GroupingKeyTuple, ProcessResponse>,
    shuffled_process_responses: Vec<ProcessResponse>,
    loc_aggregated_process_response: GroupedResponses,
    grouped_deterministic_filtered_responses: GroupedResponses,
    deliverable_results: Vec<FilteredResponse>,
}

impl Store {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a response of a data provider
    ///
    /// Records with only clear where and grouping attributes are summed at
    /// once with the records that have the same clear values.
    pub fn insert_dp_response(&mut self, response: DpResponse) -> Result<()> {
        if !response.is_clear() {
            self.dp_responses.push(response.into_process_response());
            return Ok(());
        }
        match self.dp_responses_aggr.entry(response.clear_key()) {
            Entry::Occupied(mut e) => add_assign_vector(
                &mut e.get_mut().aggregating_attributes,
                &response.aggregating_attributes,
            )?,
            Entry::Vacant(e) => {
                e.insert(response.into_process_response());
            }
        }
        Ok(())
    }

    /// Whether any response is waiting to be shuffled
    pub fn has_dp_responses(&self) -> bool {
        !self.dp_responses.is_empty() || !self.dp_responses_aggr.is_empty()
    }

    /// Takes the stored responses, followed by the pre-aggregated clear ones
    pub fn pull_dp_responses(&mut self) -> Vec<ProcessResponse> {
        let mut result = std::mem::take(&mut self.dp_responses);
        result.extend(std::mem::take(&mut self.dp_responses_aggr).into_iter().map(|(_, v)| v));
        result
    }

    /// Stores shuffled responses
    pub fn push_shuffled_process_responses(&mut self, responses: Vec<ProcessResponse>) {
        self.shuffled_process_responses.extend(responses);
    }

    /// Takes the shuffled responses
    pub fn pull_shuffled_process_responses(&mut self) -> Vec<ProcessResponse> {
        std::mem::take(&mut self.shuffled_process_responses)
    }

    /// Aggregates filtered tagged responses locally, with proofs if asked
    pub fn push_deterministic_filtered_responses(
        &mut self,
        responses: &[FilteredResponseDet],
        proofs: bool,
    ) -> Result<Option<PublishedAggregationListProof>> {
        let groups = aggregate(responses)?;
        debug!(responses = responses.len(), groups = groups.len(), "local aggregation");
        let proof = if proofs {
            Some(aggregation_proofs(responses, &groups))
        } else {
            None
        };
        for (k, v) in groups.into_iter() {
            add_in_map(&mut self.loc_aggregated_process_response, k, v)?;
        }
        Ok(proof)
    }

    /// Takes the locally aggregated groups
    pub fn pull_locally_aggregated_responses(&mut self) -> GroupedResponses {
        std::mem::take(&mut self.loc_aggregated_process_response)
    }

    /// Adds collectively aggregated groups
    pub fn push_cothority_aggregated_filtered_responses(&mut self, groups: GroupedResponses) -> Result<()> {
        for (k, v) in groups.into_iter() {
            add_in_map(&mut self.grouped_deterministic_filtered_responses, k, v)?;
        }
        Ok(())
    }

    /// Takes the collectively aggregated groups, adding `noise` to every
    /// aggregated value
    pub fn pull_cothority_aggregated_filtered_responses(
        &mut self,
        noise: Option<&CipherText>,
    ) -> Vec<(GroupingKey, FilteredResponse)> {
        let groups = std::mem::take(&mut self.grouped_deterministic_filtered_responses);
        groups
            .into_iter()
            .map(|(k, mut fr)| {
                if let Some(noise) = noise {
                    for v in fr.aggregating_attributes.iter_mut() {
                        *v += noise;
                    }
                }
                (k, fr)
            })
            .collect()
    }

    /// Stores results switched to the querier's key
    pub fn push_querier_key_encrypted_responses(&mut self, results: Vec<FilteredResponse>) {
        self.deliverable_results = results;
    }

    /// Takes the results switched to the querier's key
    pub fn pull_deliverable_results(&mut self) -> Vec<FilteredResponse> {
        std::mem::take(&mut self.deliverable_results)
    }
}

/// Sums clear responses with the same grouping and where values
///
/// Responses whose last where value is 0 do not match the query and are
/// dropped.
pub fn add_in_clear(responses: &[DpClearResponse]) -> Vec<DpClearResponse> {
    let first = match responses.first() {
        Some(r) => r,
        None => return Vec::new(),
    };
    let group_clear = first.group_by_clear.len();
    let group_enc = first.group_by_enc.len();
    let where_clear = first.where_clear.len();
    let aggr_clear = first.aggregating_attributes_clear.len();

    let mut sums: BTreeMap<Vec<i64>, Vec<i64>> = BTreeMap::new();
    for r in responses.iter() {
        let mut k = map_to_data(&r.group_by_clear, "g", 0);
        k.extend(map_to_data(&r.group_by_enc, "g", r.group_by_clear.len()));
        let wheres = map_to_data(&r.where_clear, "w", 0)
            .into_iter()
            .chain(map_to_data(&r.where_enc, "w", r.where_clear.len()))
            .collect::<Vec<_>>();
        if wheres.last() == Some(&0) {
            continue;
        }
        k.extend(wheres);

        let mut values = map_to_data(&r.aggregating_attributes_clear, "s", 0);
        values.extend(map_to_data(
            &r.aggregating_attributes_enc,
            "s",
            r.aggregating_attributes_clear.len(),
        ));

        match sums.entry(k) {
            Entry::Vacant(e) => {
                e.insert(values);
            }
            Entry::Occupied(mut e) => {
                for (s, v) in e.get_mut().iter_mut().zip(values.into_iter()) {
                    *s += v;
                }
            }
        }
    }

    sums.into_iter()
        .map(|(k, v)| {
            let (g, w) = k.split_at((group_clear + group_enc).min(k.len()));
            let (gc, ge) = g.split_at(group_clear.min(g.len()));
            let (wc, we) = w.split_at(where_clear.min(w.len()));
            let (ac, ae) = v.split_at(aggr_clear.min(v.len()));
            DpClearResponse {
                group_by_clear: data_to_map(gc, "g", 0),
                group_by_enc: data_to_map(ge, "g", group_clear),
                where_clear: data_to_map(wc, "w", 0),
                where_enc: data_to_map(we, "w", where_clear),
                aggregating_attributes_clear: data_to_map(ac, "s", 0),
                aggregating_attributes_enc: data_to_map(ae, "s", aggr_clear),
            }
        })
        .collect()
}
