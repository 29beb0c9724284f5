//! Messages exchanged between clients and servers, and among servers

use std::{
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
};
use unlynx_curve::{cipher::CipherText, keys::PublicKey, responses::DpResponseToSend};
use unlynx_protocols::tree::Roster;
use uuid::Uuid;

/// Unique identifier of a survey
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SurveyId(pub String);

impl SurveyId {
    /// A fresh random identifier
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Whether the identifier is still to be assigned
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for SurveyId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A where attribute of a query with the value it is compared against
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhereQueryAttribute {
    /// Attribute name
    pub name: String,
    /// Encrypted value
    pub value: CipherText,
}

/// How the results of the data providers reach the querier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryMode {
    /// One result per data provider
    PerProvider,
    /// One result for all data providers together
    Aggregated,
    /// One result per data provider, in an order no server knows
    Shuffled,
}

impl Default for QueryMode {
    fn default() -> Self {
        QueryMode::Aggregated
    }
}

impl QueryMode {
    /// The mode with a numeric code: 0, 1 or 2
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(QueryMode::PerProvider),
            1 => Some(QueryMode::Aggregated),
            2 => Some(QueryMode::Shuffled),
            _ => None,
        }
    }

    /// Whether the records of different data providers are never summed
    pub fn keeps_providers_apart(self) -> bool {
        self != QueryMode::Aggregated
    }
}

/// Creates a survey on every server of the roster
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyCreationQuery {
    /// Empty when sent by a client, assigned by the server that receives it
    pub survey_id: SurveyId,
    /// Servers running the survey
    pub roster: Roster,
    /// Key the results are delivered under
    pub client_pub: Option<PublicKey>,
    /// Number of data providers behind each server, by server name
    pub map_dps: BTreeMap<String, u64>,
    /// Whether protocol steps are proven
    pub proofs: bool,
    /// Whether the shuffle precomputation is kept in a file
    pub app_flag: bool,
    /// Aggregated attributes
    pub sum: Vec<String>,
    /// Whether records are also counted
    pub count: bool,
    /// Where attributes and their values
    pub where_attrs: Vec<WhereQueryAttribute>,
    /// Predicate over the where tags
    pub predicate: String,
    /// Grouping attributes
    pub group_by: Vec<String>,
    /// How results are delivered
    #[serde(default)]
    pub query_mode: QueryMode,
}

impl SurveyCreationQuery {
    /// Names of the where attributes in query order
    pub fn where_names(&self) -> Vec<String> {
        self.where_attrs.iter().map(|w| w.name.clone()).collect()
    }

    /// Number of grouping values of a stored record
    ///
    /// Records carry an extra one naming their data provider when providers
    /// are kept apart.
    pub fn group_width(&self) -> usize {
        self.group_by.len() + self.query_mode.keeps_providers_apart() as usize
    }

    /// Width of the shuffled rows, plus one for a count
    pub fn line_size(&self) -> usize {
        self.sum.len() + self.where_attrs.len() + self.group_width() + 1
    }
}

/// Responses of data providers to a survey
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyResponseQuery {
    /// Survey answered
    pub survey_id: SurveyId,
    /// One entry per record
    pub responses: Vec<DpResponseToSend>,
}

/// Asks for the results of a survey
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyResultsQuery {
    /// Whether this is the broadcast from the server the querier asked
    pub intra_message: bool,
    /// Survey queried
    pub survey_id: SurveyId,
    /// Key the results are switched to
    pub client_public: PublicKey,
}

/// Acknowledges that a server received a broadcast query
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryBroadcastFinished {
    /// Survey concerned
    pub survey_id: SurveyId,
    /// Server that received the query
    pub from: String,
}

/// Tells the other servers that this one finished shuffling and tagging
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DDTfinished {
    /// Survey concerned
    pub survey_id: SurveyId,
}

/// Messages servers broadcast to each other
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceMessage {
    /// Survey creation
    SurveyCreation(SurveyCreationQuery),
    /// Result request
    SurveyResults(SurveyResultsQuery),
    /// End of shuffling and tagging on one server
    DDTfinished(DDTfinished),
}

/// Sum of the data provider counts of every server
pub fn count_dps(map: &BTreeMap<String, u64>) -> u64 {
    map.values().sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_providers_add_up() {
        let map: BTreeMap<_, _> = (0..7).map(|i| (format!("server{}", i), 3)).collect();
        assert_eq!(count_dps(&map), 21);
        assert_eq!(count_dps(&BTreeMap::new()), 0);
    }

    #[test]
    fn query_modes_have_codes() {
        assert_eq!(QueryMode::from_code(0), Some(QueryMode::PerProvider));
        assert_eq!(QueryMode::from_code(1), Some(QueryMode::Aggregated));
        assert_eq!(QueryMode::from_code(2), Some(QueryMode::Shuffled));
        assert_eq!(QueryMode::from_code(3), None);
        assert_eq!(QueryMode::default(), QueryMode::Aggregated);
        assert!(QueryMode::Shuffled.keeps_providers_apart());
        assert!(!QueryMode::Aggregated.keeps_providers_apart());
    }

    #[test]
    fn random_ids_differ() {
        let a = SurveyId::random();
        let b = SurveyId::random();
        assert!(!a.is_empty());
        assert_ne!(a, b);
    }
}
