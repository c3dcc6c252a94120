use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::cvr::is_write_in_option;
use crate::election::Contest;
use crate::error::CoreError;
use crate::ids::*;

/// Physical card counts for one result group. Machine-marked ballots are one
/// card; hand-marked ballots contribute one card per sheet, counted per
/// sheet number. Manual tallies are always reported as their own count, never
/// folded into the scanned counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardCounts {
    pub bmd: u32,
    pub manual: u32,
    /// Index 0 holds sheet number 1.
    pub hmpb: Vec<u32>,
}

impl CardCounts {
    pub fn increment_scanned(&mut self, sheet_number: Option<u32>) {
        match sheet_number {
            None => self.bmd += 1,
            Some(sheet) => self.add_hmpb(sheet, 1),
        }
    }

    pub fn add_hmpb(&mut self, sheet_number: u32, count: u32) {
        let index = sheet_number.saturating_sub(1) as usize;
        if self.hmpb.len() <= index {
            self.hmpb.resize(index + 1, 0);
        }
        self.hmpb[index] += count;
    }

    pub fn accumulate(&mut self, other: &CardCounts) {
        self.bmd += other.bmd;
        self.manual += other.manual;
        for (sheet_index, count) in other.hmpb.iter().enumerate() {
            self.add_hmpb(sheet_index as u32 + 1, *count);
        }
    }

    /// Total ballots in this group. Each hand-marked ballot is counted once
    /// via its first sheet.
    pub fn total(&self) -> u32 {
        self.bmd + self.manual + self.hmpb.first().copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteInCandidateTally {
    pub name: String,
    pub tally: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateContestResults {
    pub ballots: u32,
    pub overvotes: u32,
    pub undervotes: u32,
    pub tallies: BTreeMap<CandidateId, u32>,
    /// Write-in marks not (yet) adjudicated to a specific candidate.
    pub write_in: u32,
    /// Per-candidate tallies for adjudicated or manually entered write-in
    /// candidates.
    pub write_in_option_tallies: BTreeMap<WriteInCandidateId, WriteInCandidateTally>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YesNoContestResults {
    pub ballots: u32,
    pub overvotes: u32,
    pub undervotes: u32,
    pub yes_option: OptionId,
    pub no_option: OptionId,
    pub yes_tally: u32,
    pub no_tally: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContestResults {
    Candidate(CandidateContestResults),
    YesNo(YesNoContestResults),
}

impl ContestResults {
    /// Zeroed results for a contest, with every official candidate seeded so
    /// reports show 0 rather than omitting a row.
    pub fn empty_for(contest: &Contest) -> Self {
        match contest {
            Contest::Candidate(c) => ContestResults::Candidate(CandidateContestResults {
                ballots: 0,
                overvotes: 0,
                undervotes: 0,
                tallies: c
                    .candidates
                    .iter()
                    .map(|candidate| (candidate.id.clone(), 0))
                    .collect(),
                write_in: 0,
                write_in_option_tallies: BTreeMap::new(),
            }),
            Contest::YesNo(c) => ContestResults::YesNo(YesNoContestResults {
                ballots: 0,
                overvotes: 0,
                undervotes: 0,
                yes_option: c.yes_option.clone(),
                no_option: c.no_option.clone(),
                yes_tally: 0,
                no_tally: 0,
            }),
        }
    }

    /// Fold one card's selections for this contest into the running tally.
    /// An overvoted contest contributes only overvotes; nothing else from the
    /// card is counted for it.
    pub fn tally_card(&mut self, contest: &Contest, options: &[OptionId]) {
        let allowed = contest.votes_allowed();
        let cast = options.len() as u32;
        match (self, contest) {
            (ContestResults::Candidate(results), Contest::Candidate(_)) => {
                results.ballots += 1;
                if cast > allowed {
                    results.overvotes += allowed;
                    return;
                }
                results.undervotes += allowed - cast;
                for option in options {
                    if is_write_in_option(option) {
                        results.write_in += 1;
                    } else {
                        let candidate_id = CandidateId::from(option.as_str());
                        *results.tallies.entry(candidate_id).or_insert(0) += 1;
                    }
                }
            }
            (ContestResults::YesNo(results), Contest::YesNo(_)) => {
                results.ballots += 1;
                if cast > allowed {
                    results.overvotes += allowed;
                    return;
                }
                results.undervotes += allowed - cast;
                for option in options {
                    if *option == results.yes_option {
                        results.yes_tally += 1;
                    } else if *option == results.no_option {
                        results.no_tally += 1;
                    }
                }
            }
            // Contest type mismatch means the definition changed under us.
            _ => {}
        }
    }

    /// Add another result set for the same contest. Used to fold manual
    /// tallies into scanned ones and to combine party-split groups.
    pub fn accumulate(&mut self, other: &ContestResults) {
        match (self, other) {
            (ContestResults::Candidate(a), ContestResults::Candidate(b)) => {
                a.ballots += b.ballots;
                a.overvotes += b.overvotes;
                a.undervotes += b.undervotes;
                a.write_in += b.write_in;
                for (candidate_id, tally) in &b.tallies {
                    *a.tallies.entry(candidate_id.clone()).or_insert(0) += tally;
                }
                for (candidate_id, tally) in &b.write_in_option_tallies {
                    a.write_in_option_tallies
                        .entry(candidate_id.clone())
                        .and_modify(|existing| existing.tally += tally.tally)
                        .or_insert_with(|| tally.clone());
                }
            }
            (ContestResults::YesNo(a), ContestResults::YesNo(b)) => {
                a.ballots += b.ballots;
                a.overvotes += b.overvotes;
                a.undervotes += b.undervotes;
                a.yes_tally += b.yes_tally;
                a.no_tally += b.no_tally;
            }
            _ => {}
        }
    }
}

/// One group's complete computed results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElectionResults {
    pub card_counts: CardCounts,
    pub contest_results: BTreeMap<ContestId, ContestResults>,
}

impl ElectionResults {
    /// Zeroed results covering the given contests.
    pub fn empty_for(contests: &[&Contest]) -> Self {
        Self {
            card_counts: CardCounts::default(),
            contest_results: contests
                .iter()
                .map(|contest| (contest.id().clone(), ContestResults::empty_for(contest)))
                .collect(),
        }
    }
}

/// Hand-entered tallies for one `(precinct, ballot style, voting method)`
/// triple. Reuses the scanned contest-results shape; the generic write-in
/// bucket is normally zero since manual write-ins name their candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualResults {
    pub ballot_count: u32,
    pub contest_results: BTreeMap<ContestId, ContestResults>,
}

impl ManualResults {
    pub fn to_msgpack(&self) -> Result<Vec<u8>, CoreError> {
        rmp_serde::to_vec(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, CoreError> {
        rmp_serde::from_slice(bytes).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    /// Write-in candidates this record keeps alive for reference counting.
    pub fn referenced_write_in_candidates(&self) -> BTreeSet<WriteInCandidateId> {
        self.contest_results
            .values()
            .filter_map(|results| match results {
                ContestResults::Candidate(c) => Some(c.write_in_option_tallies.keys()),
                ContestResults::YesNo(_) => None,
            })
            .flatten()
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::election::{Candidate, CandidateContest};

    fn zoo_council() -> Contest {
        Contest::Candidate(CandidateContest {
            id: ContestId::from("zoo-council"),
            district_id: DistrictId::from("district-1"),
            party_id: None,
            title: "Zoo Council".to_string(),
            seats: 2,
            allow_write_ins: true,
            candidates: vec![
                Candidate {
                    id: CandidateId::from("lion"),
                    name: "Lion".to_string(),
                    party_id: None,
                },
                Candidate {
                    id: CandidateId::from("otter"),
                    name: "Otter".to_string(),
                    party_id: None,
                },
            ],
        })
    }

    #[test]
    fn overvote_counts_only_overvotes() {
        let contest = zoo_council();
        let mut results = ContestResults::empty_for(&contest);
        results.tally_card(
            &contest,
            &[
                OptionId::from("lion"),
                OptionId::from("otter"),
                OptionId::from("write-in-0"),
            ],
        );
        let ContestResults::Candidate(results) = results else {
            panic!("expected candidate results");
        };
        assert_eq!(results.ballots, 1);
        assert_eq!(results.overvotes, 2);
        assert_eq!(results.undervotes, 0);
        assert_eq!(results.tallies[&CandidateId::from("lion")], 0);
        assert_eq!(results.write_in, 0);
    }

    #[test]
    fn undervotes_fill_unused_seats() {
        let contest = zoo_council();
        let mut results = ContestResults::empty_for(&contest);
        results.tally_card(&contest, &[OptionId::from("lion")]);
        results.tally_card(&contest, &[]);
        let ContestResults::Candidate(results) = results else {
            panic!("expected candidate results");
        };
        assert_eq!(results.ballots, 2);
        assert_eq!(results.undervotes, 1 + 2);
        assert_eq!(results.tallies[&CandidateId::from("lion")], 1);
    }

    #[test]
    fn card_counts_total_counts_hmpb_ballots_once() {
        let mut counts = CardCounts::default();
        counts.increment_scanned(None);
        counts.increment_scanned(Some(1));
        counts.increment_scanned(Some(2));
        assert_eq!(counts.bmd, 1);
        assert_eq!(counts.hmpb, vec![1, 1]);
        assert_eq!(counts.total(), 2);
    }
}
