//! An in-process cothority and the survey pipeline its servers run
//!
//! Every server shuffles and tags its own data with itself at the root of the
//! protocol tree. The server the querier asked then aggregates the groups of
//! all servers, optionally adds noise, and switches the results to the
//! querier's key. When data providers are kept apart, each provider's records
//! form groups of their own, and in shuffled mode those results are shuffled
//! before the switch.

use crate::{
    config::ServiceConfig,
    messages::{
        DDTfinished, QueryBroadcastFinished, QueryMode, ServiceMessage, SurveyCreationQuery,
        SurveyId, SurveyResponseQuery, SurveyResultsQuery,
    },
    predicate::{PredicateEvaluator, TagPredicateEvaluator},
    service::{
        filter_responses, results_to_rows, rows_to_results, split_tags, tagging_target,
        unmark_providers, Service,
    },
    survey::Survey,
    Error, Result,
};
use rand::thread_rng;
use serde::{de::DeserializeOwned, Serialize};
use std::{sync::Arc, thread};
use tracing::{info, instrument, warn};
use unlynx_curve::{
    cipher::CipherVector,
    diff_privacy::generate_noise_values,
    keys::PrivateKey,
    responses::{FilteredResponse, ProcessResponse},
};
use unlynx_protocols::{
    collective_aggregation::CollectiveAggregationProtocol,
    deterministic_tagging::{DeterministicTaggingOutput, DeterministicTaggingProtocol},
    dro::DroProtocol,
    key_switching::KeySwitchingProtocol,
    shuffling::ShufflingProtocol,
    transport::{launch, CancellationToken, TreeNodeInstance},
    tree::{Roster, Tree},
};

/// Servers sharing a collective key
pub struct Cothority {
    servers: Vec<Arc<Service>>,
    roster: Roster,
    cancel: CancellationToken,
}

impl Cothority {
    /// Creates `n` servers with fresh keys and the same settings
    pub fn new(n: usize, config: ServiceConfig) -> Self {
        let evaluator: Arc<dyn PredicateEvaluator> = Arc::new(TagPredicateEvaluator);
        let servers = (0..n)
            .map(|i| {
                let sk = PrivateKey::random(&mut thread_rng());
                Service::new(&format!("server{}", i), sk, config.clone(), evaluator.clone())
            })
            .collect();
        Self::from_services(servers)
    }

    /// Gathers existing servers, in roster order
    pub fn from_services(servers: Vec<Service>) -> Self {
        let roster = Roster::new(servers.iter().map(|s| s.identity().clone()).collect());
        Self {
            servers: servers.into_iter().map(Arc::new).collect(),
            roster,
            cancel: CancellationToken::new(),
        }
    }

    /// The servers' identities
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// A server by roster position
    pub fn server(&self, i: usize) -> Result<&Arc<Service>> {
        self.servers
            .get(i)
            .ok_or_else(|| Error::NotInRoster(format!("#{}", i)))
    }

    /// Aborts every protocol run in progress, and all later ones
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    fn broadcast(&self, from: usize, msg: &ServiceMessage) -> Result<Vec<QueryBroadcastFinished>> {
        let bytes = unlynx_serde::serialize(msg)?;
        let mut acks = Vec::new();
        for (i, s) in self.servers.iter().enumerate() {
            if i != from {
                acks.extend(s.process(&bytes)?);
            }
        }
        Ok(acks)
    }

    fn surveys(&self, id: &SurveyId) -> Result<Vec<Arc<Survey>>> {
        self.servers.iter().map(|s| s.survey(id)).collect()
    }

    /// Runs a protocol with server `root` at the root of the tree
    ///
    /// `f` gets the roster position of the server a node stands for and the
    /// roster reordered to match the tree. Outputs come in node order, with
    /// the server position of each node.
    fn run<M, T, F>(&self, root: usize, f: F) -> Result<Vec<(usize, T)>>
    where
        M: Serialize + DeserializeOwned + Send,
        T: Send,
        F: Fn(usize, &Arc<Roster>, &mut TreeNodeInstance<M>) -> unlynx_protocols::Result<T> + Sync,
    {
        let (roster, order) = self.roster.rooted_at(root)?;
        let roster = Arc::new(roster);
        let config = self.server(root)?.config();
        let tree = Tree::new(order.len(), config.branching)?;
        let outputs = launch(&tree, &config.protocol, &self.cancel, |node| {
            f(order[node.index()], &roster, node)
        })?;
        Ok(order.into_iter().zip(outputs).collect())
    }

    /// Creates a survey on every server, assigning it an identifier if it has
    /// none
    pub fn handle_survey_creation_query(
        &self,
        entry: usize,
        mut query: SurveyCreationQuery,
    ) -> Result<SurveyId> {
        let server = self.server(entry)?;
        if query.roster != self.roster {
            return Err(Error::InvalidQuery("roster differs from the cothority"));
        }
        info!(server = %server.identity().name, "received a survey creation query");
        if query.survey_id.is_empty() {
            query.survey_id = SurveyId::random();
        }
        let id = query.survey_id.clone();
        let acks = self.broadcast(entry, &ServiceMessage::SurveyCreation(query.clone()))?;
        if acks.len() + 1 != self.servers.len() || acks.iter().any(|a| a.survey_id != id) {
            return Err(Error::MissingResult("survey creation broadcast"));
        }
        server.create_survey(query)?;
        info!(server = %server.identity().name, survey = %id, "initiated the survey");
        Ok(id)
    }

    /// Stores responses sent by a data provider to server `entry`
    pub fn handle_survey_response_query(&self, entry: usize, query: &SurveyResponseQuery) -> Result<()> {
        self.server(entry)?.push_data(query)
    }

    /// Runs the survey on every server and returns the results, switched to
    /// the querier's key
    pub fn handle_survey_results_query(
        &self,
        entry: usize,
        query: SurveyResultsQuery,
    ) -> Result<Vec<FilteredResponse>> {
        let server = self.server(entry)?;
        info!(server = %server.identity().name, survey = %query.survey_id, "received a survey results query");
        let id = &query.survey_id;
        let surveys = self.surveys(id)?;
        surveys[entry].update(|s| s.client_pub = Some(query.client_public));
        self.broadcast(
            entry,
            &ServiceMessage::SurveyResults(SurveyResultsQuery {
                intra_message: true,
                ..query.clone()
            }),
        )?;

        let run = |i: usize, root: bool| {
            let r = self.start_service(i, id, root);
            if let Err(e) = &r {
                warn!(server = i, error = %e, "survey round failed");
                for s in surveys.iter() {
                    s.update(|st| st.aborted = true);
                }
            }
            r
        };
        let outcomes: Vec<Result<()>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..self.servers.len())
                .filter(|&i| i != entry)
                .map(|i| scope.spawn(move || run(i, false)))
                .collect();
            let mut outcomes = vec![run(entry, true)];
            outcomes.extend(
                handles
                    .into_iter()
                    .map(|h| h.join().unwrap_or(Err(Error::Protocol(unlynx_protocols::Error::Panicked)))),
            );
            outcomes
        });

        let mut failure = None;
        for r in outcomes {
            if let Err(e) = r {
                if matches!(failure, None | Some(Error::Aborted)) {
                    failure = Some(e);
                }
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }

        info!(server = %server.identity().name, "completed the query processing");
        Ok(surveys[entry].update(|s| s.store.pull_deliverable_results()))
    }

    /// Runs the phases of a survey on server `server`
    ///
    /// Every server shuffles and tags its own data. Only the root goes on to
    /// aggregate, add noise and switch keys.
    pub fn start_service(&self, server: usize, id: &SurveyId, root: bool) -> Result<()> {
        let me = self.server(server)?;
        let survey = me.survey(id)?;
        let expected = survey
            .query
            .map_dps
            .get(&me.identity().name)
            .copied()
            .unwrap_or(0);
        info!(server = %me.identity().name, expected, "waiting for data providers");
        survey.wait_for_data_providers(expected, me.config().protocol.timeout())?;
        info!(server = %me.identity().name, survey = %id, "starting the survey protocols");

        self.shuffling_phase(server, id)?;
        self.tagging_phase(server, id)?;

        let done = DDTfinished {
            survey_id: id.clone(),
        };
        me.handle_ddt_finished(&done)?;
        self.broadcast(server, &ServiceMessage::DDTfinished(done))?;

        if root {
            self.aggregation_phase(server, id)?;
            if me.config().diff_privacy.enabled {
                self.dro_phase(server, id)?;
            }
            self.key_switching_phase(server, id)?;
        }
        Ok(())
    }

    /// Shuffles the responses held by `server`
    #[instrument(skip(self, id), fields(survey = %id))]
    pub fn shuffling_phase(&self, server: usize, id: &SurveyId) -> Result<()> {
        let surveys = self.surveys(id)?;
        let survey = &surveys[server];
        let responses = survey.update(|s| s.store.pull_dp_responses());
        if responses.is_empty() {
            info!("no data to shuffle");
            return Ok(());
        }
        let aggr_len = survey.query.sum.len();
        let group_len = survey.query.group_width();
        let rows: Vec<CipherVector> = responses.iter().map(ProcessResponse::to_row).collect();
        let collective_key = self.roster.aggregate();
        let proofs = survey.query.proofs;

        let outputs = self.run(server, |i, _, node| {
            ShufflingProtocol {
                collective_key,
                precomputed: surveys[i].precomputed(),
                proofs,
                target: if node.is_root() { Some(rows.clone()) } else { None },
            }
            .dispatch(node)
        })?;

        let mut shuffled = None;
        for (i, out) in outputs {
            if let Some(p) = out.proof {
                surveys[i].update(|s| s.proofs.shuffling.list.push(p));
            }
            if out.result.is_some() {
                shuffled = out.result;
            }
        }
        let shuffled = shuffled.ok_or(Error::MissingResult("shuffling"))?;
        let responses = shuffled
            .iter()
            .map(|row| ProcessResponse::from_row(row, aggr_len, group_len))
            .collect();
        survey.update(|s| s.store.push_shuffled_process_responses(responses));
        Ok(())
    }

    /// Tags, filters and locally aggregates the shuffled responses of `server`
    #[instrument(skip(self, id), fields(survey = %id))]
    pub fn tagging_phase(&self, server: usize, id: &SurveyId) -> Result<()> {
        let surveys = self.surveys(id)?;
        let survey = &surveys[server];
        let responses = survey.update(|s| s.store.pull_shuffled_process_responses());
        if responses.is_empty() {
            info!("no data to tag");
            return Ok(());
        }
        let query_where: CipherVector = survey.query.where_attrs.iter().map(|w| w.value).collect();
        let target = tagging_target(&query_where, &responses);
        let proofs = survey.query.proofs;

        let outputs = self.run(server, |i, roster, node| {
            DeterministicTaggingProtocol {
                secret: *surveys[i].secret(),
                private_key: self.servers[i].private_key().clone(),
                proofs,
                roster: roster.clone(),
                target: if node.is_root() { Some(target.clone()) } else { None },
            }
            .dispatch(node)
        })?;

        let mut tagged = None;
        for (i, out) in outputs {
            let DeterministicTaggingOutput {
                result,
                addition_proof,
                creation_proof,
            } = out;
            surveys[i].update(|s| {
                s.proofs.det_tag_addition.extend(addition_proof);
                s.proofs.det_tag_creation.extend(creation_proof);
            });
            if result.is_some() {
                tagged = result;
            }
        }
        let tagged = tagged.ok_or(Error::MissingResult("tagging"))?;
        let (query_tags, dets) = split_tags(&tagged, query_where.len(), responses)?;
        let me = self.server(server)?;
        let filtered = filter_responses(me.evaluator(), &survey.query.predicate, &query_tags, dets);
        info!(kept = filtered.len(), "filtered responses");
        survey.update(|s| {
            let proof = s.store.push_deterministic_filtered_responses(&filtered, proofs)?;
            s.proofs.aggregation.extend(proof);
            Ok::<_, Error>(())
        })
    }

    /// Sums the groups of every server at `root`
    #[instrument(skip(self, id), fields(survey = %id))]
    pub fn aggregation_phase(&self, root: usize, id: &SurveyId) -> Result<()> {
        let surveys = self.surveys(id)?;
        let timeout = self.server(root)?.config().protocol.timeout();
        for s in surveys.iter() {
            s.wait_for_tagging(self.servers.len(), timeout)?;
        }
        let proofs = surveys[root].query.proofs;

        let outputs = self.run(root, |i, _, node| {
            CollectiveAggregationProtocol {
                groups: surveys[i].update(|s| s.store.pull_locally_aggregated_responses()),
                simple: None,
                proofs,
            }
            .dispatch(node)
        })?;

        let mut groups = None;
        for (i, out) in outputs {
            if let Some(p) = out.proof {
                surveys[i].update(|s| s.proofs.aggregation.push(p));
            }
            if out.result.is_some() {
                groups = out.result;
            }
        }
        let groups = groups.ok_or(Error::MissingResult("aggregation"))?;
        surveys[root].update(|s| s.store.push_cothority_aggregated_filtered_responses(groups))?;
        Ok(())
    }

    /// Picks the noise for the results through a shuffle of a noise table
    #[instrument(skip(self, id), fields(survey = %id))]
    pub fn dro_phase(&self, root: usize, id: &SurveyId) -> Result<()> {
        let surveys = self.surveys(id)?;
        let dp = &self.server(root)?.config().diff_privacy;
        let table = generate_noise_values(dp.count, 0.0, dp.scale(), dp.quanta, dp.limit)?;
        let collective_key = self.roster.aggregate();

        let outputs = self.run(root, |_, _, node| {
            DroProtocol {
                collective_key,
                proofs: true,
                noise: if node.is_root() { Some(table.clone()) } else { None },
            }
            .dispatch(node)
        })?;

        let mut noise = None;
        for (i, out) in outputs {
            if let Some(p) = out.proof {
                surveys[i].update(|s| s.proofs.shuffling.list.push(p));
            }
            if out.noise.is_some() {
                noise = out.noise;
            }
        }
        let noise = noise.ok_or(Error::MissingResult("noise shuffling"))?;
        surveys[root].update(|s| s.noise = Some(noise));
        Ok(())
    }

    /// Shuffles per-provider results so that no server can tell which
    /// provider a result belongs to
    fn shuffle_results(
        &self,
        root: usize,
        id: &SurveyId,
        results: Vec<FilteredResponse>,
    ) -> Result<Vec<FilteredResponse>> {
        let surveys = self.surveys(id)?;
        let (group_len, aggr_len) = results
            .first()
            .map(|r| (r.group_by_enc.len(), r.aggregating_attributes.len()))
            .unwrap_or_default();
        let rows: Vec<CipherVector> = results
            .iter()
            .map(|r| {
                let mut row = r.group_by_enc.clone();
                row.extend_from_slice(&r.aggregating_attributes);
                row
            })
            .collect();
        let collective_key = self.roster.aggregate();
        let proofs = surveys[root].query.proofs;

        let outputs = self.run(root, |_, _, node| {
            ShufflingProtocol {
                collective_key,
                precomputed: None,
                proofs,
                target: if node.is_root() { Some(rows.clone()) } else { None },
            }
            .dispatch(node)
        })?;

        let mut shuffled = None;
        for (i, out) in outputs {
            if let Some(p) = out.proof {
                surveys[i].update(|s| s.proofs.shuffling.list.push(p));
            }
            if out.result.is_some() {
                shuffled = out.result;
            }
        }
        let shuffled = shuffled.ok_or(Error::MissingResult("result shuffling"))?;
        info!(results = shuffled.len(), "shuffled per-provider results");
        let widths = vec![(group_len, aggr_len); shuffled.len()];
        let flat: CipherVector = shuffled.into_iter().flatten().collect();
        rows_to_results(&flat, &widths)
    }

    /// Switches the aggregated results at `root` to the querier's key
    #[instrument(skip(self, id), fields(survey = %id))]
    pub fn key_switching_phase(&self, root: usize, id: &SurveyId) -> Result<()> {
        let surveys = self.surveys(id)?;
        let survey = &surveys[root];
        let (groups, client) = survey.update(|s| {
            let groups = s.store.pull_cothority_aggregated_filtered_responses(s.noise.as_ref());
            (groups, s.client_pub)
        });
        let client = client.ok_or(Error::InvalidQuery("no key to switch the results to"))?;
        let mut results: Vec<_> = groups.into_iter().map(|(_, fr)| fr).collect();
        if results.is_empty() {
            info!("no results to switch");
            return Ok(());
        }
        let mode = survey.query.query_mode;
        if mode.keeps_providers_apart() {
            unmark_providers(&mut results);
        }
        if mode == QueryMode::Shuffled {
            results = self.shuffle_results(root, id, results)?;
        }
        let (flat, widths) = results_to_rows(&results);
        let proofs = survey.query.proofs;

        let outputs = self.run(root, |i, roster, node| {
            KeySwitchingProtocol {
                private_key: self.servers[i].private_key().clone(),
                proofs,
                roster: roster.clone(),
                target: if node.is_root() {
                    Some((flat.clone(), client))
                } else {
                    None
                },
            }
            .dispatch(node)
        })?;

        let mut switched = None;
        for (i, out) in outputs {
            if let Some(p) = out.proof {
                surveys[i].update(|s| s.proofs.key_switching.push(p));
            }
            if out.result.is_some() {
                switched = out.result;
            }
        }
        let switched = switched.ok_or(Error::MissingResult("key switching"))?;
        let results = rows_to_results(&switched, &widths)?;
        survey.update(|s| s.store.push_querier_key_encrypted_responses(results));
        Ok(())
    }
}
