//! Client side of the service: queriers and data providers

use crate::{
    cothority::Cothority,
    messages::{
        QueryMode, SurveyCreationQuery, SurveyId, SurveyResponseQuery, SurveyResultsQuery,
        WhereQueryAttribute,
    },
    Result,
};
use rand::thread_rng;
use std::{
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
};
use tracing::info;
use unlynx_curve::{
    cipher::decrypt_int_vector,
    keys::{PrivateKey, PublicKey},
    parallel::Parallelism,
    responses::DpClearResponse,
};
use unlynx_protocols::tree::Roster;

/// Name of the aggregated attribute that counts records
pub const COUNT_ATTRIBUTE: &str = "count";

/// A client talking to one server of a cothority, with its own key pair
pub struct Api<'a> {
    cothority: &'a Cothority,
    entry_point: usize,
    client_id: String,
    private: PrivateKey,
    public: PublicKey,
}

impl<'a> Api<'a> {
    /// Creates a client with a fresh key pair
    pub fn new(cothority: &'a Cothority, entry_point: usize, client_id: &str) -> Self {
        let private = PrivateKey::random(&mut thread_rng());
        let public = private.public_key();
        Self {
            cothority,
            entry_point,
            client_id: client_id.to_string(),
            private,
            public,
        }
    }

    /// The key results are delivered under
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Creates a survey
    ///
    /// An empty `survey_id` gets a fresh identifier. With `count` set, a
    /// count of records is aggregated after the `sum` attributes.
    /// `query_mode` decides whether data providers get one result each.
    #[allow(clippy::too_many_arguments)]
    pub fn send_survey_creation_query(
        &self,
        roster: &Roster,
        survey_id: SurveyId,
        client_pub: Option<PublicKey>,
        nbr_dps: BTreeMap<String, u64>,
        proofs: bool,
        app_flag: bool,
        mut sum: Vec<String>,
        count: bool,
        where_attrs: Vec<WhereQueryAttribute>,
        predicate: &str,
        group_by: Vec<String>,
        query_mode: QueryMode,
    ) -> Result<SurveyId> {
        info!(client = %self, survey = %survey_id, "creating a survey");
        if count && !sum.iter().any(|s| s == COUNT_ATTRIBUTE) {
            sum.push(COUNT_ATTRIBUTE.to_string());
        }
        let query = SurveyCreationQuery {
            survey_id,
            roster: roster.clone(),
            client_pub,
            map_dps: nbr_dps,
            proofs,
            app_flag,
            sum,
            count,
            where_attrs,
            predicate: predicate.to_string(),
            group_by,
            query_mode,
        };
        let id = self
            .cothority
            .handle_survey_creation_query(self.entry_point, query)?;
        info!(client = %self, survey = %id, "created the survey");
        Ok(id)
    }

    /// Encrypts and sends the responses of a data provider
    pub fn send_survey_response_query(
        &self,
        survey_id: &SurveyId,
        responses: &[DpClearResponse],
        group_key: &PublicKey,
        repetitions: usize,
        count: bool,
    ) -> Result<()> {
        info!(client = %self, survey = %survey_id, "sending responses");
        let query = encrypt_data_to_survey(
            &self.to_string(),
            survey_id,
            responses,
            group_key,
            repetitions,
            count,
            &Parallelism::default(),
        );
        self.cothority
            .handle_survey_response_query(self.entry_point, &query)
    }

    /// Gets the results of a survey and decrypts them
    ///
    /// Returns the grouping values and the aggregated values of every group.
    pub fn send_survey_results_query(
        &self,
        survey_id: &SurveyId,
    ) -> Result<(Vec<Vec<i64>>, Vec<Vec<i64>>)> {
        info!(client = %self, survey = %survey_id, "asking for the results");
        let results = self.cothority.handle_survey_results_query(
            self.entry_point,
            SurveyResultsQuery {
                intra_message: false,
                survey_id: survey_id.clone(),
                client_public: self.public,
            },
        )?;
        let mut groups = Vec::with_capacity(results.len());
        let mut aggregates = Vec::with_capacity(results.len());
        for r in results.iter() {
            groups.push(decrypt_int_vector(&self.private, &r.group_by_enc)?);
            aggregates.push(decrypt_int_vector(&self.private, &r.aggregating_attributes)?);
        }
        Ok((groups, aggregates))
    }
}

impl<'a> Display for Api<'a> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "[Client-{}]", self.client_id)
    }
}

/// Encrypts responses under the collective key
///
/// Every response is sent `repetitions` times. With `count` set each one
/// carries an extra aggregated attribute worth 1.
pub fn encrypt_data_to_survey(
    name: &str,
    survey_id: &SurveyId,
    responses: &[DpClearResponse],
    group_key: &PublicKey,
    repetitions: usize,
    count: bool,
    par: &Parallelism,
) -> SurveyResponseQuery {
    info!(client = name, responses = responses.len(), "encrypting responses");
    let encrypted = par.map(responses, |r| {
        if count {
            let mut r = r.clone();
            r.aggregating_attributes_enc
                .insert(COUNT_ATTRIBUTE.to_string(), 1);
            r.encrypt(group_key)
        } else {
            r.encrypt(group_key)
        }
    });
    let responses = encrypted
        .into_iter()
        .flat_map(|r| std::iter::repeat(r).take(repetitions))
        .collect();
    SurveyResponseQuery {
        survey_id: survey_id.clone(),
        responses,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unlynx_curve::{cipher::decrypt_int, responses::data_to_map};

    #[test]
    fn encryption_repeats_and_counts() {
        let sk = PrivateKey::random(&mut thread_rng());
        let pk = sk.public_key();
        let response = DpClearResponse {
            group_by_clear: data_to_map(&[1], "g", 0),
            aggregating_attributes_enc: data_to_map(&[7], "s", 0),
            ..DpClearResponse::default()
        };
        let id = SurveyId("survey".to_string());
        let query = encrypt_data_to_survey(
            "test",
            &id,
            &[response.clone(), response],
            &pk,
            3,
            true,
            &Parallelism::sequential(),
        );
        assert_eq!(query.survey_id, id);
        assert_eq!(query.responses.len(), 6);
        for r in query.responses.iter() {
            assert_eq!(r.group_by_clear, data_to_map(&[1], "g", 0));
            assert_eq!(decrypt_int(&sk, &r.aggregating_attributes_enc["s0"]).unwrap(), 7);
            assert_eq!(decrypt_int(&sk, &r.aggregating_attributes_enc[COUNT_ATTRIBUTE]).unwrap(), 1);
        }

        let query = encrypt_data_to_survey("test", &id, &[], &pk, 1, false, &Parallelism::default());
        assert!(query.responses.is_empty());
    }
}
