use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElectionType {
    General,
    Primary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub id: PartyId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Precinct {
    pub id: PrecinctId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct District {
    pub id: DistrictId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub name: String,
    pub party_id: Option<PartyId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateContest {
    pub id: ContestId,
    pub district_id: DistrictId,
    /// Set for contests that only appear on one party's primary ballots.
    pub party_id: Option<PartyId>,
    pub title: String,
    pub seats: u32,
    pub allow_write_ins: bool,
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YesNoContest {
    pub id: ContestId,
    pub district_id: DistrictId,
    pub title: String,
    pub yes_option: OptionId,
    pub no_option: OptionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Contest {
    Candidate(CandidateContest),
    YesNo(YesNoContest),
}

impl Contest {
    pub fn id(&self) -> &ContestId {
        match self {
            Contest::Candidate(c) => &c.id,
            Contest::YesNo(c) => &c.id,
        }
    }

    pub fn district_id(&self) -> &DistrictId {
        match self {
            Contest::Candidate(c) => &c.district_id,
            Contest::YesNo(c) => &c.district_id,
        }
    }

    pub fn party_id(&self) -> Option<&PartyId> {
        match self {
            Contest::Candidate(c) => c.party_id.as_ref(),
            Contest::YesNo(_) => None,
        }
    }

    /// Number of selections a voter may make before the contest overvotes.
    pub fn votes_allowed(&self) -> u32 {
        match self {
            Contest::Candidate(c) => c.seats,
            Contest::YesNo(_) => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotStyle {
    pub id: BallotStyleId,
    /// Party-specific ballot styles exist only in primary elections.
    pub party_id: Option<PartyId>,
    pub precinct_ids: Vec<PrecinctId>,
    pub district_ids: Vec<DistrictId>,
}

/// The immutable structural definition of one election. Parsing and
/// validation happen upstream; this type assumes internally consistent data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionDefinition {
    pub title: String,
    pub election_type: ElectionType,
    pub parties: Vec<Party>,
    pub districts: Vec<District>,
    pub precincts: Vec<Precinct>,
    pub contests: Vec<Contest>,
    pub ballot_styles: Vec<BallotStyle>,
}

impl ElectionDefinition {
    pub fn to_msgpack(&self) -> Result<Vec<u8>, CoreError> {
        rmp_serde::to_vec(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, CoreError> {
        rmp_serde::from_slice(bytes).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    pub fn contest(&self, contest_id: &ContestId) -> Option<&Contest> {
        self.contests.iter().find(|c| c.id() == contest_id)
    }

    pub fn ballot_style(&self, ballot_style_id: &BallotStyleId) -> Option<&BallotStyle> {
        self.ballot_styles.iter().find(|bs| &bs.id == ballot_style_id)
    }

    pub fn party_name(&self, party_id: &PartyId) -> Option<&str> {
        self.parties
            .iter()
            .find(|p| &p.id == party_id)
            .map(|p| p.name.as_str())
    }

    /// Contests that appear on a given ballot style: the style must cover the
    /// contest's district, and a party-restricted contest only appears on
    /// that party's ballot styles.
    pub fn contests_for_ballot_style<'a>(
        &'a self,
        ballot_style: &'a BallotStyle,
    ) -> impl Iterator<Item = &'a Contest> {
        self.contests.iter().filter(move |contest| {
            ballot_style.district_ids.contains(contest.district_id())
                && match contest.party_id() {
                    Some(party_id) => ballot_style.party_id.as_ref() == Some(party_id),
                    None => true,
                }
        })
    }
}

/// Stored wrapper around a definition: identity plus the mutable flags that
/// live outside the immutable definition blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionRecord {
    pub id: ElectionId,
    pub definition: ElectionDefinition,
    pub is_official_results: bool,
    pub created_at: i64,
}
