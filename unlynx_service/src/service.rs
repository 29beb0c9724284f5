//! One server of the cothority and the survey data it holds

use crate::{
    config::ServiceConfig,
    messages::{
        DDTfinished, QueryBroadcastFinished, ServiceMessage, SurveyCreationQuery, SurveyId,
        SurveyResponseQuery,
    },
    predicate::{tag_variables, PredicateEvaluator},
    survey::Survey,
    Error, Result,
};
use curve25519_dalek::scalar::Scalar;
use dashmap::DashMap;
use rand::thread_rng;
use std::{path::PathBuf, sync::Arc};
use tracing::{debug, info, warn};
use unlynx_curve::{
    cipher::{encrypt_int, CipherText, CipherVector},
    det_tag::{tags_to_grouping_key, GroupingKey},
    keys::{PrivateKey, PublicKey},
    responses::{
        DpResponse, FilteredResponse, FilteredResponseDet, ProcessResponse, ProcessResponseDet,
    },
    shuffle::precomputation_writing_for_shuffling,
};
use unlynx_protocols::tree::ServerIdentity;

/// A server: its identity, its key share and the surveys it takes part in
pub struct Service {
    identity: ServerIdentity,
    private_key: PrivateKey,
    config: ServiceConfig,
    evaluator: Arc<dyn PredicateEvaluator>,
    surveys: DashMap<SurveyId, Arc<Survey>>,
}

impl Service {
    /// Creates a server
    pub fn new(
        name: &str,
        private_key: PrivateKey,
        config: ServiceConfig,
        evaluator: Arc<dyn PredicateEvaluator>,
    ) -> Self {
        Self {
            identity: ServerIdentity {
                name: name.to_string(),
                public: private_key.public_key(),
            },
            private_key,
            config,
            evaluator,
            surveys: DashMap::new(),
        }
    }

    /// Name and public key of the server
    pub fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    /// The server's share of the collective key
    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    /// The server's settings
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// The predicate evaluator used to filter responses
    pub fn evaluator(&self) -> &dyn PredicateEvaluator {
        self.evaluator.as_ref()
    }

    /// Looks a survey up
    pub fn survey(&self, id: &SurveyId) -> Result<Arc<Survey>> {
        self.surveys
            .get(id)
            .map(|s| s.value().clone())
            .ok_or_else(|| Error::UnknownSurvey(id.clone()))
    }

    /// Number of surveys held
    pub fn survey_count(&self) -> usize {
        self.surveys.len()
    }

    /// Forgets a survey and its data
    pub fn remove_survey(&self, id: &SurveyId) -> Option<Arc<Survey>> {
        self.surveys.remove(id).map(|(_, s)| s)
    }

    fn precompute_path(&self) -> PathBuf {
        let file = self
            .config
            .precompute_file
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.config
            .precompute_file
            .with_file_name(format!("{}_{}", self.identity.name, file))
    }

    /// Instantiates a survey with a fresh secret
    pub fn create_survey(&self, query: SurveyCreationQuery) -> Result<QueryBroadcastFinished> {
        if query.survey_id.is_empty() {
            return Err(Error::InvalidQuery("survey without identifier"));
        }
        if query.roster.index_of(&self.identity.name).is_none() {
            return Err(Error::NotInRoster(self.identity.name.clone()));
        }
        let secret = Scalar::random(&mut thread_rng());
        let collective = query.roster.aggregate();
        let pool = precomputation_writing_for_shuffling(
            query.app_flag,
            &self.precompute_path(),
            &secret,
            collective.point(),
            query.line_size(),
            &self.config.protocol.parallelism,
        )?;
        let survey_id = query.survey_id.clone();
        self.surveys
            .insert(survey_id.clone(), Arc::new(Survey::new(query, secret, Some(pool))));
        info!(server = %self.identity.name, survey = %survey_id, surveys = self.surveys.len(), "created survey");
        Ok(QueryBroadcastFinished {
            survey_id,
            from: self.identity.name.clone(),
        })
    }

    /// Stores the responses of a data provider
    ///
    /// When the survey keeps data providers apart, every record gets a
    /// grouping value naming its provider.
    pub fn push_data(&self, query: &SurveyResponseQuery) -> Result<()> {
        let survey = self.survey(&query.survey_id)?;
        let q = &survey.query;
        let where_names = q.where_names();
        let collective = q.roster.aggregate();
        let server = q.roster.index_of(&self.identity.name).unwrap_or_default() as i64;
        survey.update(|s| {
            let provider = (server << 32) | s.dps_received as i64;
            for r in query.responses.iter() {
                let mut laid_out = r.lay_out(&q.group_by, &q.sum, &where_names);
                if q.query_mode.keeps_providers_apart() {
                    mark_provider(&mut laid_out, provider, &collective);
                }
                s.store.insert_dp_response(laid_out)?;
            }
            s.dps_received += 1;
            Ok::<_, Error>(())
        })?;
        info!(server = %self.identity.name, survey = %query.survey_id, responses = query.responses.len(), "uploaded response data");
        Ok(())
    }

    /// Counts a server that finished shuffling and tagging
    pub fn handle_ddt_finished(&self, msg: &DDTfinished) -> Result<()> {
        let survey = self.survey(&msg.survey_id)?;
        survey.update(|s| s.ddt_finished += 1);
        Ok(())
    }

    /// Handles an encoded message broadcast by another server
    pub fn process(&self, bytes: &[u8]) -> Result<Option<QueryBroadcastFinished>> {
        let msg: ServiceMessage = unlynx_serde::deserialize(bytes)?;
        debug!(server = %self.identity.name, "processing broadcast message");
        match msg {
            ServiceMessage::SurveyCreation(query) => self.create_survey(query).map(Some),
            ServiceMessage::SurveyResults(query) => {
                let survey = self.survey(&query.survey_id)?;
                survey.update(|s| s.client_pub = Some(query.client_public));
                Ok(None)
            }
            ServiceMessage::DDTfinished(msg) => self.handle_ddt_finished(&msg).map(|_| None),
        }
    }
}

/// Appends a grouping value naming the data provider of a record
///
/// Clear records get it in clear, the others encrypted under `collective`.
pub fn mark_provider(response: &mut DpResponse, provider: i64, collective: &PublicKey) {
    if response.is_clear() {
        response.group_by_clear.push(provider);
    } else {
        response.group_by_enc.push(encrypt_int(collective, provider));
    }
}

/// Drops the grouping value added by [`mark_provider`] from every result
pub fn unmark_providers(results: &mut [FilteredResponse]) {
    for r in results.iter_mut() {
        r.group_by_enc.pop();
    }
}

/// Ciphertexts to tag for a survey: the query's where values, then the
/// grouping and where values of every response
pub fn tagging_target(query_where: &[CipherText], responses: &[ProcessResponse]) -> CipherVector {
    let mut target: CipherVector = query_where.to_vec();
    for r in responses.iter() {
        target.extend_from_slice(&r.group_by_enc);
        target.extend_from_slice(&r.where_enc);
    }
    target
}

/// Splits tags made from [`tagging_target`] into the query's where tags and
/// the tagged responses
pub fn split_tags(
    tagged: &[CipherText],
    query_where: usize,
    responses: Vec<ProcessResponse>,
) -> Result<(Vec<GroupingKey>, Vec<ProcessResponseDet>)> {
    let expected = query_where
        + responses
            .iter()
            .map(|r| r.group_by_enc.len() + r.where_enc.len())
            .sum::<usize>();
    if tagged.len() != expected {
        return Err(Error::Curve(unlynx_curve::Error::LengthMismatch(
            tagged.len(),
            expected,
        )));
    }
    let single = |ct: &CipherText| tags_to_grouping_key(std::slice::from_ref(ct));
    let (query, mut rest) = tagged.split_at(query_where);
    let query_tags = query.iter().map(single).collect();
    let dets = responses
        .into_iter()
        .map(|pr| {
            let (group, tail) = rest.split_at(pr.group_by_enc.len());
            let (wh, tail) = tail.split_at(pr.where_enc.len());
            rest = tail;
            ProcessResponseDet {
                det_tag_group_by: tags_to_grouping_key(group),
                det_tag_where: wh.iter().map(single).collect(),
                pr,
            }
        })
        .collect();
    Ok((query_tags, dets))
}

/// Keeps the responses whose where tags satisfy the predicate
///
/// Responses the predicate cannot be evaluated for are dropped.
pub fn filter_responses(
    evaluator: &dyn PredicateEvaluator,
    predicate: &str,
    query_tags: &[GroupingKey],
    responses: Vec<ProcessResponseDet>,
) -> Vec<FilteredResponseDet> {
    responses
        .into_iter()
        .filter(|r| {
            let vars = tag_variables(query_tags, &r.det_tag_where);
            match evaluator.evaluate(predicate, &vars) {
                Ok(keep) => keep,
                Err(e) => {
                    warn!(error = %e, "dropping response");
                    false
                }
            }
        })
        .map(|r| FilteredResponseDet {
            det_tag_group_by: r.det_tag_group_by,
            fr: FilteredResponse {
                group_by_enc: r.pr.group_by_enc,
                aggregating_attributes: r.pr.aggregating_attributes,
            },
        })
        .collect()
}

/// Lays results out as rows for key switching: grouping values, then
/// aggregated values
pub fn results_to_rows(results: &[FilteredResponse]) -> (CipherVector, Vec<(usize, usize)>) {
    let mut flat = CipherVector::new();
    let mut widths = Vec::with_capacity(results.len());
    for fr in results.iter() {
        flat.extend_from_slice(&fr.group_by_enc);
        flat.extend_from_slice(&fr.aggregating_attributes);
        widths.push((fr.group_by_enc.len(), fr.aggregating_attributes.len()));
    }
    (flat, widths)
}

/// Inverse of [`results_to_rows`]
pub fn rows_to_results(flat: &[CipherText], widths: &[(usize, usize)]) -> Result<Vec<FilteredResponse>> {
    let total: usize = widths.iter().map(|(g, a)| g + a).sum();
    if flat.len() != total {
        return Err(Error::Curve(unlynx_curve::Error::LengthMismatch(flat.len(), total)));
    }
    let mut rest = flat;
    Ok(widths
        .iter()
        .map(|&(g, a)| {
            let (group, tail) = rest.split_at(g);
            let (aggr, tail) = tail.split_at(a);
            rest = tail;
            FilteredResponse {
                group_by_enc: group.to_vec(),
                aggregating_attributes: aggr.to_vec(),
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::TagPredicateEvaluator;
    use unlynx_curve::cipher::int_array_to_cipher_vector;

    fn det(wheres: &[&str]) -> ProcessResponseDet {
        ProcessResponseDet {
            pr: ProcessResponse::default(),
            det_tag_group_by: String::new(),
            det_tag_where: wheres.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn tags(values: &[&str]) -> Vec<GroupingKey> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn filtering_keeps_matching_responses() {
        let eval = TagPredicateEvaluator;
        let query = tags(&["1"]);
        let kept = filter_responses(&eval, "v0 == v1", &query, vec![det(&["1"]), det(&["0"])]);
        assert_eq!(kept.len(), 1);
        let kept = filter_responses(
            &eval,
            "v0 == v1",
            &query,
            vec![det(&["1"]), det(&["0"]), det(&["1"])],
        );
        assert_eq!(kept.len(), 2);

        let query = tags(&["27", "0", "99"]);
        let kept = filter_responses(
            &eval,
            "v0 != v1 || (v2 == v3 && v4 == v5)",
            &query,
            vec![det(&["21", "6", "0"]), det(&["27", "0", "99"]), det(&["27", "6", "0"])],
        );
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn malformed_predicates_filter_everything_out() {
        let kept = filter_responses(&TagPredicateEvaluator, "v0 ==", &tags(&["1"]), vec![det(&["1"])]);
        assert!(kept.is_empty());
    }

    #[test]
    fn tags_split_back_into_responses() {
        let pr = |g: &[i64], w: &[i64]| ProcessResponse {
            where_enc: int_array_to_cipher_vector(w),
            group_by_enc: int_array_to_cipher_vector(g),
            aggregating_attributes: int_array_to_cipher_vector(&[5]),
        };
        let responses = vec![pr(&[1, 2], &[3]), pr(&[1, 2], &[4])];
        let query_where = int_array_to_cipher_vector(&[3]);
        let target = tagging_target(&query_where, &responses);
        assert_eq!(target.len(), 7);

        let (query_tags, dets) = split_tags(&target, 1, responses.clone()).unwrap();
        assert_eq!(query_tags.len(), 1);
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].det_tag_group_by, dets[1].det_tag_group_by);
        assert_eq!(dets[0].det_tag_where[0], query_tags[0]);
        assert_ne!(dets[1].det_tag_where[0], query_tags[0]);
        assert_eq!(dets[1].pr, responses[1]);

        assert!(split_tags(&target[1..], 1, responses).is_err());
    }

    #[test]
    fn provider_marks_follow_the_record_kind() {
        let sk = PrivateKey::random(&mut thread_rng());
        let pk = sk.public_key();
        let mut clear = DpResponse {
            group_by_clear: vec![4],
            ..DpResponse::default()
        };
        mark_provider(&mut clear, 7, &pk);
        assert_eq!(clear.group_by_clear, vec![4, 7]);
        assert!(clear.is_clear());

        let mut enc = DpResponse {
            group_by_enc: int_array_to_cipher_vector(&[4]),
            ..DpResponse::default()
        };
        mark_provider(&mut enc, 7, &pk);
        assert_eq!(enc.group_by_enc.len(), 2);
        assert_eq!(unlynx_curve::cipher::decrypt_int(&sk, &enc.group_by_enc[1]).unwrap(), 7);

        let mut results = vec![FilteredResponse {
            group_by_enc: enc.group_by_enc,
            aggregating_attributes: int_array_to_cipher_vector(&[1]),
        }];
        unmark_providers(&mut results);
        assert_eq!(results[0].group_by_enc.len(), 1);
    }

    #[test]
    fn results_round_trip_through_rows() {
        let results = vec![
            FilteredResponse {
                group_by_enc: int_array_to_cipher_vector(&[1]),
                aggregating_attributes: int_array_to_cipher_vector(&[2, 3]),
            },
            FilteredResponse {
                group_by_enc: int_array_to_cipher_vector(&[4]),
                aggregating_attributes: int_array_to_cipher_vector(&[5, 6]),
            },
        ];
        let (flat, widths) = results_to_rows(&results);
        assert_eq!(flat.len(), 6);
        assert_eq!(rows_to_results(&flat, &widths).unwrap(), results);
        assert!(rows_to_results(&flat[1..], &widths).is_err());
    }
}
