//! Editable parameter table of a sequence.
use std::fmt;

use indexmap::IndexMap;
use itertools::Itertools as _;
use serde::{Deserialize, Serialize};

use super::{Error, Result};
use crate::{
    pulse::Parameters,
    quant::{GroupId, PulseId},
};

/// Sorted, deduplicated set of group names touched by one pulse command.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "Vec<GroupId>")]
pub struct GroupKey(Vec<GroupId>);

impl GroupKey {
    pub fn new<I, G>(groups: I) -> Self
    where
        I: IntoIterator<Item = G>,
        G: Into<GroupId>,
    {
        Self(
            groups
                .into_iter()
                .map(Into::into)
                .sorted()
                .dedup()
                .collect(),
        )
    }

    #[must_use]
    pub fn groups(&self) -> &[GroupId] {
        &self.0
    }
}

impl From<Vec<GroupId>> for GroupKey {
    fn from(groups: Vec<GroupId>) -> Self {
        Self::new(groups)
    }
}

impl<G: Into<GroupId>> FromIterator<G> for GroupKey {
    fn from_iter<I: IntoIterator<Item = G>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.0.iter().join(", "))
    }
}

/// Parameters of every pulse invoked on one group key.
pub type GroupParameters = IndexMap<PulseId, Parameters>;

/// Tunable values of a sequence, keyed by [`GroupKey`] then pulse name then
/// variable name.
///
/// Serialized as a list of `{"group": [...], "parameter": {...}}` entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<ConfigEntry>", into = "Vec<ConfigEntry>")]
pub struct SequenceConfig {
    entries: IndexMap<GroupKey, GroupParameters>,
}

#[derive(Serialize, Deserialize)]
struct ConfigEntry {
    group: GroupKey,
    parameter: GroupParameters,
}

impl From<Vec<ConfigEntry>> for SequenceConfig {
    fn from(entries: Vec<ConfigEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.group, e.parameter)).collect(),
        }
    }
}

impl From<SequenceConfig> for Vec<ConfigEntry> {
    fn from(config: SequenceConfig) -> Self {
        config
            .entries
            .into_iter()
            .map(|(group, parameter)| ConfigEntry { group, parameter })
            .collect()
    }
}

impl SequenceConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group_keys(&self) -> impl Iterator<Item = &GroupKey> {
        self.entries.keys()
    }

    /// Merges `parameters` of `pulse` into the block of `key`, replacing any
    /// previous parameters of the same pulse.
    pub fn insert(&mut self, key: GroupKey, pulse: PulseId, parameters: Parameters) {
        self.entries.entry(key).or_default().insert(pulse, parameters);
    }

    /// # Errors
    ///
    /// Fails if no parameters are registered for `key`.
    pub fn parameters(&self, key: &GroupKey) -> Result<&GroupParameters> {
        self.entries
            .get(key)
            .ok_or_else(|| Error::ConfigNotFound(key.clone()))
    }

    /// # Errors
    ///
    /// Fails if `pulse` has no parameters under `key`.
    pub fn pulse_parameters(&self, key: &GroupKey, pulse: &str) -> Result<&Parameters> {
        self.parameters(key)?
            .get(pulse)
            .ok_or_else(|| Error::PulseConfigNotFound {
                group: key.clone(),
                pulse: pulse.into(),
            })
    }

    /// Overwrites one existing value and returns the previous one.
    ///
    /// # Errors
    ///
    /// Fails if the group key, pulse or parameter is not present.
    pub fn set(
        &mut self,
        key: &GroupKey,
        pulse: &str,
        parameter: &str,
        value: f64,
    ) -> Result<f64> {
        let block = self
            .entries
            .get_mut(key)
            .ok_or_else(|| Error::ConfigNotFound(key.clone()))?;
        let parameters = block
            .get_mut(pulse)
            .ok_or_else(|| Error::PulseConfigNotFound {
                group: key.clone(),
                pulse: pulse.into(),
            })?;
        let slot = parameters
            .get_mut(parameter)
            .ok_or_else(|| Error::UnknownParameter {
                group: key.clone(),
                pulse: pulse.into(),
                parameter: parameter.to_string(),
            })?;
        Ok(std::mem::replace(slot, value))
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::*;

    fn config() -> SequenceConfig {
        let mut config = SequenceConfig::new();
        let mut params = Parameters::new();
        params.insert("w".into(), 10.0);
        config.insert(GroupKey::new(["Q1", "Q0"]), "CR".into(), params);
        config
    }

    #[test]
    fn key_is_sorted_set() {
        assert_eq!(GroupKey::new(["b", "a", "b"]), GroupKey::new(["a", "b"]));
        assert_eq!(GroupKey::new(["b", "a"]).to_string(), "(a, b)");
    }

    #[test]
    fn lookup_ignores_order() {
        let config = config();
        let key = GroupKey::new(["Q0", "Q1"]);
        assert_approx_eq!(f64, config.pulse_parameters(&key, "CR").unwrap()["w"], 10.0);
        assert!(matches!(
            config.parameters(&GroupKey::new(["Q0"])),
            Err(Error::ConfigNotFound(_))
        ));
    }

    #[test]
    fn set_existing_only() {
        let mut config = config();
        let key = GroupKey::new(["Q0", "Q1"]);
        assert_eq!(config.set(&key, "CR", "w", 20.0), Ok(10.0));
        assert_approx_eq!(f64, config.pulse_parameters(&key, "CR").unwrap()["w"], 20.0);
        assert!(matches!(
            config.set(&key, "CR", "x", 1.0),
            Err(Error::UnknownParameter { .. })
        ));
        assert!(matches!(
            config.set(&key, "HPI", "w", 1.0),
            Err(Error::PulseConfigNotFound { .. })
        ));
    }

    #[test]
    fn serde_layout() {
        let json = serde_json::to_value(config()).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{"group": ["Q0", "Q1"], "parameter": {"CR": {"w": 10.0}}}])
        );
        let back: SequenceConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config());
    }
}
