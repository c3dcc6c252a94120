use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::*;

/// Vote option id prefix a scanner uses for unresolved write-in marks
/// (`write-in`, `write-in-0`, `write-in-1`, ...).
pub const GENERIC_WRITE_IN_ID: &str = "write-in";

pub fn is_write_in_option(option_id: &OptionId) -> bool {
    option_id.as_str().starts_with(GENERIC_WRITE_IN_ID)
}

/// Per-contest selections as exported by the scanner. `BTreeMap` keeps the
/// serialized form canonical so byte equality means semantic equality.
pub type VotesMap = BTreeMap<ContestId, Vec<OptionId>>;

pub fn votes_to_msgpack(votes: &VotesMap) -> Result<Vec<u8>, CoreError> {
    rmp_serde::to_vec(votes).map_err(|e| CoreError::Serialization(e.to_string()))
}

pub fn votes_from_msgpack(bytes: &[u8]) -> Result<VotesMap, CoreError> {
    rmp_serde::from_slice(bytes).map_err(|e| CoreError::Serialization(e.to_string()))
}

/// True when no contest on the card received any selection.
pub fn votes_are_blank(votes: &VotesMap) -> bool {
    votes.values().all(|options| options.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VotingMethod {
    Precinct,
    Absentee,
    Provisional,
}

impl VotingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            VotingMethod::Precinct => "precinct",
            VotingMethod::Absentee => "absentee",
            VotingMethod::Provisional => "provisional",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "precinct" => Ok(VotingMethod::Precinct),
            "absentee" => Ok(VotingMethod::Absentee),
            "provisional" => Ok(VotingMethod::Provisional),
            other => Err(CoreError::InvalidData(format!(
                "unknown voting method: {other}"
            ))),
        }
    }

    pub const ALL: [VotingMethod; 3] = [
        VotingMethod::Precinct,
        VotingMethod::Absentee,
        VotingMethod::Provisional,
    ];

    /// Report ordering puts absentee last.
    pub fn report_rank(&self) -> u8 {
        match self {
            VotingMethod::Precinct => 0,
            VotingMethod::Provisional => 1,
            VotingMethod::Absentee => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BallotSide {
    Front,
    Back,
}

impl BallotSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            BallotSide::Front => "front",
            BallotSide::Back => "back",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "front" => Ok(BallotSide::Front),
            "back" => Ok(BallotSide::Back),
            other => Err(CoreError::InvalidData(format!(
                "unknown ballot side: {other}"
            ))),
        }
    }
}

/// One card's interpreted votes as handed to ingestion. The `(election_id,
/// ballot_id)` pair is the card's identity; everything else is payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CvrInsert {
    pub ballot_id: BallotId,
    pub ballot_style_id: BallotStyleId,
    pub precinct_id: PrecinctId,
    pub voting_method: VotingMethod,
    pub batch_id: BatchId,
    pub scanner_id: ScannerId,
    /// `None` for machine-marked ballots, `Some(1..)` for each sheet of a
    /// hand-marked multi-sheet ballot.
    pub sheet_number: Option<u32>,
    /// Side the card's write-in marks were scanned from, when the producer
    /// knows it.
    pub side: Option<BallotSide>,
    pub votes: VotesMap,
}

/// A stored CVR's attributes as streamed back out for tabulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CvrTuple {
    pub cvr_id: CvrId,
    pub ballot_id: BallotId,
    pub ballot_style_id: BallotStyleId,
    /// Party of the ballot style, for primary elections.
    pub party_id: Option<PartyId>,
    pub precinct_id: PrecinctId,
    pub voting_method: VotingMethod,
    pub batch_id: BatchId,
    pub scanner_id: ScannerId,
    pub sheet_number: Option<u32>,
    pub votes: VotesMap,
    pub is_blank: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_in_option_detection() {
        assert!(is_write_in_option(&OptionId::from("write-in")));
        assert!(is_write_in_option(&OptionId::from("write-in-0")));
        assert!(!is_write_in_option(&OptionId::from("lion")));
    }

    #[test]
    fn blank_derivation() {
        let mut votes = VotesMap::new();
        votes.insert(ContestId::from("mayor"), vec![]);
        votes.insert(ContestId::from("fishing"), vec![]);
        assert!(votes_are_blank(&votes));

        votes.insert(ContestId::from("fishing"), vec![OptionId::from("yes")]);
        assert!(!votes_are_blank(&votes));
    }

    #[test]
    fn votes_msgpack_is_canonical() {
        let mut a = VotesMap::new();
        a.insert(ContestId::from("b"), vec![OptionId::from("x")]);
        a.insert(ContestId::from("a"), vec![]);
        let mut b = VotesMap::new();
        b.insert(ContestId::from("a"), vec![]);
        b.insert(ContestId::from("b"), vec![OptionId::from("x")]);

        assert_eq!(votes_to_msgpack(&a).unwrap(), votes_to_msgpack(&b).unwrap());
    }
}
