//! A survey as held by one server

use crate::{messages::SurveyCreationQuery, store::Store, Error, Result};
use curve25519_dalek::scalar::Scalar;
use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use unlynx_curve::{cipher::CipherText, keys::PublicKey, shuffle::CipherVectorScalar};
use unlynx_protocols::proofs_verification::ProofsToVerify;

/// Mutable part of a survey
#[derive(Debug, Default)]
pub struct SurveyState {
    /// Data between phases
    pub store: Store,
    /// Number of data providers that sent their responses
    pub dps_received: u64,
    /// Number of servers that finished shuffling and tagging
    pub ddt_finished: usize,
    /// Key the results are switched to
    pub client_pub: Option<PublicKey>,
    /// Noise added to the results
    pub noise: Option<CipherText>,
    /// Proofs published by this server
    pub proofs: ProofsToVerify,
    /// Set when another server's part of the round failed
    pub aborted: bool,
}

/// A survey with its query, secret and state
#[derive(Debug)]
pub struct Survey {
    /// The query that created the survey
    pub query: SurveyCreationQuery,
    secret: Scalar,
    precomputed: Option<Arc<Vec<CipherVectorScalar>>>,
    state: Mutex<SurveyState>,
    changed: Condvar,
}

impl Survey {
    /// Creates a survey with an ephemeral secret
    pub fn new(
        query: SurveyCreationQuery,
        secret: Scalar,
        precomputed: Option<Vec<CipherVectorScalar>>,
    ) -> Self {
        let client_pub = query.client_pub;
        Self {
            query,
            secret,
            precomputed: precomputed.map(Arc::new),
            state: Mutex::new(SurveyState {
                client_pub,
                ..SurveyState::default()
            }),
            changed: Condvar::new(),
        }
    }

    /// This server's tagging secret for the survey
    pub fn secret(&self) -> &Scalar {
        &self.secret
    }

    /// Shuffle precomputation for the survey
    pub fn precomputed(&self) -> Option<Arc<Vec<CipherVectorScalar>>> {
        self.precomputed.clone()
    }

    /// Locks the state
    pub fn lock(&self) -> MutexGuard<'_, SurveyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Changes the state and wakes up waiting phases
    pub fn update<T, F>(&self, f: F) -> T
    where
        F: FnOnce(&mut SurveyState) -> T,
    {
        let mut guard = self.lock();
        let r = f(&mut *guard);
        drop(guard);
        self.changed.notify_all();
        r
    }

    fn wait_until<F>(&self, what: &'static str, timeout: Duration, mut done: F) -> Result<()>
    where
        F: FnMut(&SurveyState) -> bool,
    {
        let guard = self.lock();
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |s| !s.aborted && !done(s))
            .unwrap_or_else(PoisonError::into_inner);
        if guard.aborted {
            Err(Error::Aborted)
        } else if done(&guard) {
            Ok(())
        } else {
            Err(Error::Timeout(what))
        }
    }

    /// Waits until `expected` data providers have sent their responses
    pub fn wait_for_data_providers(&self, expected: u64, timeout: Duration) -> Result<()> {
        self.wait_until("data providers", timeout, |s| s.dps_received >= expected)
    }

    /// Waits until `servers` servers finished shuffling and tagging
    pub fn wait_for_tagging(&self, servers: usize, timeout: Duration) -> Result<()> {
        self.wait_until("tagging", timeout, |s| s.ddt_finished >= servers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::QueryMode;
    use std::thread;
    use unlynx_protocols::tree::Roster;

    fn survey() -> Survey {
        let query = SurveyCreationQuery {
            survey_id: Default::default(),
            roster: Roster::default(),
            client_pub: None,
            map_dps: Default::default(),
            proofs: false,
            app_flag: false,
            sum: vec![],
            count: false,
            where_attrs: vec![],
            predicate: String::new(),
            group_by: vec![],
            query_mode: QueryMode::default(),
        };
        Survey::new(query, Scalar::one(), None)
    }

    #[test]
    fn waits_end_when_the_count_is_reached() {
        let survey = Arc::new(survey());
        let handle = {
            let survey = survey.clone();
            thread::spawn(move || survey.wait_for_data_providers(3, Duration::from_secs(10)))
        };
        for _ in 0..3 {
            survey.update(|s| s.dps_received += 1);
        }
        assert!(handle.join().unwrap().is_ok());
    }

    #[test]
    fn waits_time_out() {
        let survey = survey();
        survey.update(|s| s.ddt_finished += 1);
        let r = survey.wait_for_tagging(2, Duration::from_millis(30));
        assert!(matches!(r, Err(Error::Timeout("tagging"))));
        assert!(survey.wait_for_tagging(1, Duration::from_millis(30)).is_ok());
    }

    #[test]
    fn aborting_wakes_waiting_phases() {
        let survey = Arc::new(survey());
        let handle = {
            let survey = survey.clone();
            thread::spawn(move || survey.wait_for_tagging(3, Duration::from_secs(10)))
        };
        survey.update(|s| s.aborted = true);
        assert!(matches!(handle.join().unwrap(), Err(Error::Aborted)));
    }
}
