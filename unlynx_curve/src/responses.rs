//! Records flowing through a survey

use crate::{
    cipher::{
        add_assign_vector, encrypt_int, int_array_to_cipher_vector, int_to_cipher_text,
        CipherText, CipherVector,
    },
    det_tag::GroupingKey,
    keys::PublicKey,
    Result,
};
use std::collections::BTreeMap;

/// A data provider's record in clear, with attributes named `g0, g1, ...`
/// (group by), `w0, w1, ...` (where) and `s0, s1, ...` (aggregated)
///
/// Values in the `_enc` maps are encrypted before the record leaves the data
/// provider.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpClearResponse {
    /// Where attributes kept in clear
    pub where_clear: BTreeMap<String, i64>,
    /// Where attributes to encrypt
    pub where_enc: BTreeMap<String, i64>,
    /// Grouping attributes kept in clear
    pub group_by_clear: BTreeMap<String, i64>,
    /// Grouping attributes to encrypt
    pub group_by_enc: BTreeMap<String, i64>,
    /// Aggregated attributes kept in clear
    pub aggregating_attributes_clear: BTreeMap<String, i64>,
    /// Aggregated attributes to encrypt
    pub aggregating_attributes_enc: BTreeMap<String, i64>,
}

/// A data provider's record as sent to the cothority
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpResponseToSend {
    /// Where attributes kept in clear
    pub where_clear: BTreeMap<String, i64>,
    /// Encrypted where attributes
    pub where_enc: BTreeMap<String, CipherText>,
    /// Grouping attributes kept in clear
    pub group_by_clear: BTreeMap<String, i64>,
    /// Encrypted grouping attributes
    pub group_by_enc: BTreeMap<String, CipherText>,
    /// Aggregated attributes kept in clear
    pub aggregating_attributes_clear: BTreeMap<String, i64>,
    /// Encrypted aggregated attributes
    pub aggregating_attributes_enc: BTreeMap<String, CipherText>,
}

/// A data provider's record laid out in query order
///
/// A record without any encrypted where or grouping attribute is a clear
/// record: its `_enc` vectors are empty and the `_clear` vectors hold the
/// values. Otherwise every value, clear or not, is in the `_enc` vectors.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpResponse {
    /// Where values of a clear record
    pub where_clear: Vec<i64>,
    /// Where values
    pub where_enc: CipherVector,
    /// Grouping values of a clear record
    pub group_by_clear: Vec<i64>,
    /// Grouping values
    pub group_by_enc: CipherVector,
    /// Aggregated values
    pub aggregating_attributes: CipherVector,
}

/// A record being processed by the cothority
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResponse {
    /// Where values
    pub where_enc: CipherVector,
    /// Grouping values
    pub group_by_enc: CipherVector,
    /// Aggregated values
    pub aggregating_attributes: CipherVector,
}

/// A record with its tags
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResponseDet {
    /// The record
    pub pr: ProcessResponse,
    /// Key of its grouping values
    pub det_tag_group_by: GroupingKey,
    /// Key of each of its where values
    pub det_tag_where: Vec<GroupingKey>,
}

/// A record that passed the query predicate
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilteredResponse {
    /// Grouping values
    pub group_by_enc: CipherVector,
    /// Aggregated values
    pub aggregating_attributes: CipherVector,
}

/// A filtered record with the key of its group
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilteredResponseDet {
    /// Key of its grouping values
    pub det_tag_group_by: GroupingKey,
    /// The record
    pub fr: FilteredResponse,
}

/// Key of a clear record: its grouping values and its where values
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupingKeyTuple(pub GroupingKey, pub GroupingKey);

/// Clear-text key of a sequence of values, `"1,2,3,"`
pub fn key(values: &[i64]) -> GroupingKey {
    values.iter().map(|v| format!("{},", v)).collect()
}

/// Values of the attributes `prefix{start}, prefix{start+1}, ...`, one per
/// entry of the map
pub fn map_to_data(map: &BTreeMap<String, i64>, prefix: &str, start: usize) -> Vec<i64> {
    (start..start + map.len())
        .map(|i| {
            map.get(&format!("{}{}", prefix, i))
                .copied()
                .unwrap_or_default()
        })
        .collect()
}

/// Names values `prefix{start}, prefix{start+1}, ...`
pub fn data_to_map(data: &[i64], prefix: &str, start: usize) -> BTreeMap<String, i64> {
    data.iter()
        .enumerate()
        .map(|(i, v)| (format!("{}{}", prefix, start + i), *v))
        .collect()
}

fn encrypt_map(pk: &PublicKey, map: &BTreeMap<String, i64>) -> BTreeMap<String, CipherText> {
    map.iter()
        .map(|(k, v)| (k.clone(), encrypt_int(pk, *v)))
        .collect()
}

impl DpClearResponse {
    /// Encrypts the `_enc` attributes under the collective key
    pub fn encrypt(&self, pk: &PublicKey) -> DpResponseToSend {
        DpResponseToSend {
            where_clear: self.where_clear.clone(),
            where_enc: encrypt_map(pk, &self.where_enc),
            group_by_clear: self.group_by_clear.clone(),
            group_by_enc: encrypt_map(pk, &self.group_by_enc),
            aggregating_attributes_clear: self.aggregating_attributes_clear.clone(),
            aggregating_attributes_enc: encrypt_map(pk, &self.aggregating_attributes_enc),
        }
    }
}

fn lay_out(
    names: &[String],
    clear: &BTreeMap<String, i64>,
    enc: &BTreeMap<String, CipherText>,
    clear_only: bool,
) -> (Vec<i64>, CipherVector) {
    let mut values = Vec::new();
    let mut cv = CipherVector::new();
    for name in names.iter() {
        let v = clear.get(name).copied().unwrap_or_default();
        if clear_only {
            values.push(v);
        } else {
            cv.push(enc.get(name).copied().unwrap_or_else(|| int_to_cipher_text(v)));
        }
    }
    (values, cv)
}

impl DpResponseToSend {
    /// Whether no where or grouping attribute is encrypted
    pub fn is_clear(&self) -> bool {
        self.where_enc.is_empty() && self.group_by_enc.is_empty()
    }

    /// Lays the attributes out in the order of the query
    ///
    /// Clear values of a non-clear record become trivial encryptions.
    pub fn lay_out(&self, group_by: &[String], sum: &[String], where_names: &[String]) -> DpResponse {
        let clear = self.is_clear();
        let (group_by_clear, group_by_enc) =
            lay_out(group_by, &self.group_by_clear, &self.group_by_enc, clear);
        let (where_clear, where_enc) =
            lay_out(where_names, &self.where_clear, &self.where_enc, clear);
        let (_, aggregating_attributes) = lay_out(
            sum,
            &self.aggregating_attributes_clear,
            &self.aggregating_attributes_enc,
            false,
        );
        DpResponse {
            where_clear,
            where_enc,
            group_by_clear,
            group_by_enc,
            aggregating_attributes,
        }
    }
}

impl DpResponse {
    /// Whether this is a clear record
    pub fn is_clear(&self) -> bool {
        self.where_enc.is_empty() && self.group_by_enc.is_empty()
    }

    /// Key of a clear record
    pub fn clear_key(&self) -> GroupingKeyTuple {
        GroupingKeyTuple(key(&self.group_by_clear), key(&self.where_clear))
    }

    /// Turns the record into one the cothority processes
    pub fn into_process_response(self) -> ProcessResponse {
        if self.is_clear() {
            ProcessResponse {
                where_enc: int_array_to_cipher_vector(&self.where_clear),
                group_by_enc: int_array_to_cipher_vector(&self.group_by_clear),
                aggregating_attributes: self.aggregating_attributes,
            }
        } else {
            ProcessResponse {
                where_enc: self.where_enc,
                group_by_enc: self.group_by_enc,
                aggregating_attributes: self.aggregating_attributes,
            }
        }
    }
}

impl ProcessResponse {
    /// All ciphertexts of the record in one row: aggregated, grouping, where
    pub fn to_row(&self) -> CipherVector {
        let mut row = self.aggregating_attributes.clone();
        row.extend_from_slice(&self.group_by_enc);
        row.extend_from_slice(&self.where_enc);
        row
    }

    /// Splits a row made by [`to_row`](Self::to_row) with the same widths
    pub fn from_row(row: &[CipherText], aggr_len: usize, group_len: usize) -> Self {
        let (aggr, rest) = row.split_at(aggr_len.min(row.len()));
        let (group, wh) = rest.split_at(group_len.min(rest.len()));
        Self {
            where_enc: wh.to_vec(),
            group_by_enc: group.to_vec(),
            aggregating_attributes: aggr.to_vec(),
        }
    }
}

impl FilteredResponse {
    /// Adds the aggregated values of another response of the same group
    pub fn add(&mut self, other: &FilteredResponse) -> Result<()> {
        add_assign_vector(&mut self.aggregating_attributes, &other.aggregating_attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::{decrypt_int_vector, encrypt_int_vector};
    use crate::keys::PrivateKey;
    use rand::thread_rng;

    fn names(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{}{}", prefix, i)).collect()
    }

    #[test]
    fn clear_keys_separate_values() {
        assert_eq!(key(&[1, 20, -3]), "1,20,-3,");
        assert_eq!(key(&[]), "");
        assert_ne!(key(&[1, 23]), key(&[12, 3]));
    }

    #[test]
    fn map_and_data_agree() {
        let data = [4, 5, 6];
        let map = data_to_map(&data, "g", 2);
        assert_eq!(map.get("g2"), Some(&4));
        assert_eq!(map_to_data(&map, "g", 2), data);
    }

    #[test]
    fn records_are_laid_out_in_query_order() {
        let mut rng = thread_rng();
        let sk = PrivateKey::random(&mut rng);
        let pk = sk.public_key();

        let clear = DpClearResponse {
            group_by_clear: data_to_map(&[1], "g", 0),
            group_by_enc: data_to_map(&[2], "g", 1),
            aggregating_attributes_enc: data_to_map(&[10, 20], "s", 0),
            ..DpClearResponse::default()
        };
        let sent = clear.encrypt(&pk);
        assert!(!sent.is_clear());
        let dp = sent.lay_out(&names("g", 2), &names("s", 2), &[]);
        assert!(!dp.is_clear());
        assert_eq!(decrypt_int_vector(&sk, &dp.group_by_enc).unwrap(), [1, 2]);
        let pr = dp.into_process_response();
        assert_eq!(decrypt_int_vector(&sk, &pr.aggregating_attributes).unwrap(), [10, 20]);
        assert!(pr.where_enc.is_empty());
    }

    #[test]
    fn clear_records_keep_clear_values() {
        let mut rng = thread_rng();
        let sk = PrivateKey::random(&mut rng);
        let pk = sk.public_key();

        let clear = DpClearResponse {
            where_clear: data_to_map(&[1], "w", 0),
            group_by_clear: data_to_map(&[3, 4], "g", 0),
            aggregating_attributes_clear: data_to_map(&[7], "s", 0),
            ..DpClearResponse::default()
        };
        let dp = clear
            .encrypt(&pk)
            .lay_out(&names("g", 2), &names("s", 1), &names("w", 1));
        assert!(dp.is_clear());
        assert_eq!(dp.clear_key(), GroupingKeyTuple("3,4,".into(), "1,".into()));
        let pr = dp.into_process_response();
        assert_eq!(decrypt_int_vector(&sk, &pr.group_by_enc).unwrap(), [3, 4]);
        assert_eq!(decrypt_int_vector(&sk, &pr.aggregating_attributes).unwrap(), [7]);
    }

    #[test]
    fn rows_split_back_into_records() {
        let mut rng = thread_rng();
        let sk = PrivateKey::random(&mut rng);
        let pk = sk.public_key();
        let pr = ProcessResponse {
            where_enc: encrypt_int_vector(&pk, &[1]),
            group_by_enc: encrypt_int_vector(&pk, &[2, 3]),
            aggregating_attributes: encrypt_int_vector(&pk, &[4, 5, 6]),
        };
        let row = pr.to_row();
        assert_eq!(row.len(), 6);
        assert_eq!(ProcessResponse::from_row(&row, 3, 2), pr);
    }

    #[test]
    fn filtered_responses_add_up() {
        let mut rng = thread_rng();
        let sk = PrivateKey::random(&mut rng);
        let pk = sk.public_key();
        let mut a = FilteredResponse {
            group_by_enc: encrypt_int_vector(&pk, &[1]),
            aggregating_attributes: encrypt_int_vector(&pk, &[10, 1]),
        };
        let b = FilteredResponse {
            group_by_enc: encrypt_int_vector(&pk, &[1]),
            aggregating_attributes: encrypt_int_vector(&pk, &[5, 1]),
        };
        a.add(&b).unwrap();
        assert_eq!(decrypt_int_vector(&sk, &a.aggregating_attributes).unwrap(), [15, 2]);
        assert!(a.add(&FilteredResponse::default()).is_err());
    }
}
