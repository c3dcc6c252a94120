use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cvr::VotingMethod;
use crate::ids::*;

/// Declarative filter over stored CVRs. Each present field is an
/// OR-of-values; present fields are ANDed together.
///
/// An absent field (`None`) matches everything; a present-but-empty set
/// matches nothing. The asymmetry is deliberate and load-bearing: callers
/// that computed "the ids the user picked" and got zero of them must see
/// zero records, not all of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CvrFilter {
    pub precinct_ids: Option<BTreeSet<PrecinctId>>,
    pub party_ids: Option<BTreeSet<PartyId>>,
    pub ballot_style_ids: Option<BTreeSet<BallotStyleId>>,
    pub voting_methods: Option<BTreeSet<VotingMethod>>,
    pub batch_ids: Option<BTreeSet<BatchId>>,
    pub scanner_ids: Option<BTreeSet<ScannerId>>,
}

fn field_matches<T: Ord>(field: &Option<BTreeSet<T>>, value: &T) -> bool {
    match field {
        None => true,
        Some(values) => values.contains(value),
    }
}

impl CvrFilter {
    /// Whether the filter touches dimensions that only exist for scanned
    /// ballots. Manual tallies carry no batch or scanner.
    pub fn has_scan_only_dimensions(&self) -> bool {
        self.batch_ids.is_some() || self.scanner_ids.is_some()
    }

    pub fn matches_precinct(&self, precinct_id: &PrecinctId) -> bool {
        field_matches(&self.precinct_ids, precinct_id)
    }

    pub fn matches_party(&self, party_id: Option<&PartyId>) -> bool {
        match (&self.party_ids, party_id) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(values), Some(id)) => values.contains(id),
        }
    }

    pub fn matches_ballot_style(&self, ballot_style_id: &BallotStyleId) -> bool {
        field_matches(&self.ballot_style_ids, ballot_style_id)
    }

    pub fn matches_voting_method(&self, voting_method: VotingMethod) -> bool {
        field_matches(&self.voting_methods, &voting_method)
    }
}

/// Dimensions a tabulation should split its results by. Precinct, party,
/// ballot style, and voting method can be pre-enumerated from the election
/// definition; batch and scanner groups only exist where CVRs do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupBy {
    pub precinct: bool,
    pub party: bool,
    pub ballot_style: bool,
    pub voting_method: bool,
    pub batch: bool,
    pub scanner: bool,
}

impl GroupBy {
    pub fn has_scan_only_dimensions(&self) -> bool {
        self.batch || self.scanner
    }

    /// Whether every requested dimension can be enumerated from the ballot
    /// styles defined for the election.
    pub fn is_enumerable(&self) -> bool {
        !self.has_scan_only_dimensions()
    }

    /// Same grouping with party forced on, used for party-split tabulation
    /// of primary elections.
    pub fn with_party(mut self) -> Self {
        self.party = true;
        self
    }
}

/// The coordinates of one result group: exactly the dimensions requested by
/// the `GroupBy` are `Some`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupSpecifier {
    pub precinct_id: Option<PrecinctId>,
    pub party_id: Option<PartyId>,
    pub ballot_style_id: Option<BallotStyleId>,
    pub voting_method: Option<VotingMethod>,
    pub batch_id: Option<BatchId>,
    pub scanner_id: Option<ScannerId>,
}

impl GroupSpecifier {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn key(&self) -> GroupKey {
        GroupKey::from_specifier(self)
    }

    /// Drop the party dimension, keeping everything else. Used when
    /// re-coalescing party-split groups into report units.
    pub fn without_party(&self) -> Self {
        Self {
            party_id: None,
            ..self.clone()
        }
    }

    /// Deterministic report order: precinct ascending, then voting method
    /// with absentee last, then the remaining dimensions ascending.
    pub fn report_sort_key(&self) -> impl Ord + use<> {
        (
            self.precinct_id.clone(),
            self.voting_method.map(|m| m.report_rank()),
            self.ballot_style_id.clone(),
            self.party_id.clone(),
            self.batch_id.clone(),
            self.scanner_id.clone(),
        )
    }
}

/// Canonical string form of a `GroupSpecifier`, used as a map key. The root
/// group (no dimensions) is `"root"`; otherwise segments are appended in a
/// fixed field order so equal specifiers always produce equal keys.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupKey(String);

impl GroupKey {
    pub fn from_specifier(spec: &GroupSpecifier) -> Self {
        let mut key = String::from("root");
        let mut push = |name: &str, value: &str| {
            key.push('&');
            key.push_str(name);
            key.push('=');
            key.push_str(value);
        };
        if let Some(precinct_id) = &spec.precinct_id {
            push("precinctId", precinct_id.as_str());
        }
        if let Some(party_id) = &spec.party_id {
            push("partyId", party_id.as_str());
        }
        if let Some(ballot_style_id) = &spec.ballot_style_id {
            push("ballotStyleId", ballot_style_id.as_str());
        }
        if let Some(voting_method) = spec.voting_method {
            push("votingMethod", voting_method.as_str());
        }
        if let Some(batch_id) = &spec.batch_id {
            push("batchId", batch_id.as_str());
        }
        if let Some(scanner_id) = &spec.scanner_id {
            push("scannerId", scanner_id.as_str());
        }
        GroupKey(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupKey({})", self.0)
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
