use tallyvault_core::cvr::{CvrInsert, VotesMap, VotingMethod};
use tallyvault_core::election::{
    BallotStyle, Candidate, CandidateContest, Contest, District, ElectionDefinition, ElectionType,
    Party, Precinct, YesNoContest,
};
use tallyvault_core::ids::*;
use tallyvault_storage::{CvrFileInsert, CvrFileOutcome, Store, StorageError, sha256_hex};

/// An in-memory store plus helpers for loading fixture data.
pub struct TestStore {
    pub store: Store,
}

impl TestStore {
    pub fn new() -> Result<Self, StorageError> {
        // Honor RUST_LOG under `cargo test`; later stores reuse the first
        // test's logger.
        let _ = env_logger::builder().is_test(true).try_init();
        Ok(Self {
            store: Store::open_in_memory()?,
        })
    }

    /// Configure the two-party primary fixture and register one import file,
    /// returning both ids.
    pub fn with_primary_election() -> Result<(Self, ElectionId, CvrFileId), StorageError> {
        let mut harness = Self::new()?;
        let election_id = harness.store.add_election(&primary_election())?;
        let CvrFileOutcome { id: file_id, .. } = harness
            .store
            .add_cvr_file(election_id, &test_cvr_file("import-1"))?;
        Ok((harness, election_id, file_id))
    }
}

/// A two-party primary: one partisan best-animal contest per party plus a
/// nonpartisan fishing ban measure, two precincts, one ballot style per
/// party covering both precincts.
pub fn primary_election() -> ElectionDefinition {
    ElectionDefinition {
        title: "Example Primary Election".to_string(),
        election_type: ElectionType::Primary,
        parties: vec![
            Party {
                id: PartyId::from("mammal"),
                name: "Mammal Party".to_string(),
            },
            Party {
                id: PartyId::from("fish"),
                name: "Fish Party".to_string(),
            },
        ],
        districts: vec![District {
            id: DistrictId::from("district-1"),
            name: "Example County".to_string(),
        }],
        precincts: vec![
            Precinct {
                id: PrecinctId::from("precinct-1"),
                name: "Precinct 1".to_string(),
            },
            Precinct {
                id: PrecinctId::from("precinct-2"),
                name: "Precinct 2".to_string(),
            },
        ],
        contests: vec![
            Contest::Candidate(CandidateContest {
                id: ContestId::from("best-animal-mammal"),
                district_id: DistrictId::from("district-1"),
                party_id: Some(PartyId::from("mammal")),
                title: "Best Animal".to_string(),
                seats: 1,
                allow_write_ins: true,
                candidates: vec![
                    Candidate {
                        id: CandidateId::from("horse"),
                        name: "Horse".to_string(),
                        party_id: Some(PartyId::from("mammal")),
                    },
                    Candidate {
                        id: CandidateId::from("otter"),
                        name: "Otter".to_string(),
                        party_id: Some(PartyId::from("mammal")),
                    },
                ],
            }),
            Contest::Candidate(CandidateContest {
                id: ContestId::from("best-animal-fish"),
                district_id: DistrictId::from("district-1"),
                party_id: Some(PartyId::from("fish")),
                title: "Best Animal".to_string(),
                seats: 1,
                allow_write_ins: true,
                candidates: vec![
                    Candidate {
                        id: CandidateId::from("seahorse"),
                        name: "Seahorse".to_string(),
                        party_id: Some(PartyId::from("fish")),
                    },
                    Candidate {
                        id: CandidateId::from("salmon"),
                        name: "Salmon".to_string(),
                        party_id: Some(PartyId::from("fish")),
                    },
                ],
            }),
            Contest::YesNo(YesNoContest {
                id: ContestId::from("fishing"),
                district_id: DistrictId::from("district-1"),
                title: "Ballot Measure 3: Ban Fishing".to_string(),
                yes_option: OptionId::from("ban-fishing"),
                no_option: OptionId::from("allow-fishing"),
            }),
        ],
        ballot_styles: vec![
            BallotStyle {
                id: BallotStyleId::from("1M"),
                party_id: Some(PartyId::from("mammal")),
                precinct_ids: vec![PrecinctId::from("precinct-1"), PrecinctId::from("precinct-2")],
                district_ids: vec![DistrictId::from("district-1")],
            },
            BallotStyle {
                id: BallotStyleId::from("2F"),
                party_id: Some(PartyId::from("fish")),
                precinct_ids: vec![PrecinctId::from("precinct-1"), PrecinctId::from("precinct-2")],
                district_ids: vec![DistrictId::from("district-1")],
            },
        ],
    }
}

/// A minimal general election, used to exercise non-primary code paths.
pub fn general_election() -> ElectionDefinition {
    ElectionDefinition {
        title: "Example General Election".to_string(),
        election_type: ElectionType::General,
        parties: vec![],
        districts: vec![District {
            id: DistrictId::from("district-1"),
            name: "Example County".to_string(),
        }],
        precincts: vec![Precinct {
            id: PrecinctId::from("precinct-1"),
            name: "Precinct 1".to_string(),
        }],
        contests: vec![Contest::Candidate(CandidateContest {
            id: ContestId::from("mayor"),
            district_id: DistrictId::from("district-1"),
            party_id: None,
            title: "Mayor".to_string(),
            seats: 1,
            allow_write_ins: true,
            candidates: vec![Candidate {
                id: CandidateId::from("sherlock"),
                name: "Sherlock Holmes".to_string(),
                party_id: None,
            }],
        })],
        ballot_styles: vec![BallotStyle {
            id: BallotStyleId::from("1"),
            party_id: None,
            precinct_ids: vec![PrecinctId::from("precinct-1")],
            district_ids: vec![DistrictId::from("district-1")],
        }],
    }
}

/// Import-file metadata whose content hash is derived from the given label,
/// so distinct labels behave as distinct files.
pub fn test_cvr_file(label: &str) -> CvrFileInsert {
    CvrFileInsert {
        filename: format!("{label}.jsonl"),
        sha256: sha256_hex(label.as_bytes()),
        exported_at: 1_700_000_000_000,
        is_test_mode: true,
        precinct_ids: vec![PrecinctId::from("precinct-1"), PrecinctId::from("precinct-2")],
        scanner_ids: vec![ScannerId::from("scanner-1")],
    }
}

/// One row of the standard CVR grid. `multiplier` identical ballots are
/// ingested per row, with distinct ballot ids.
pub struct FixtureRow {
    pub multiplier: u32,
    pub ballot_style: &'static str,
    pub batch: &'static str,
    pub scanner: &'static str,
    pub precinct: &'static str,
    pub voting_method: VotingMethod,
    pub sheet_number: Option<u32>,
}

/// The standard six-row grid: 83 ballots across 2 ballot styles, 3 batches,
/// 3 scanners, 2 precincts, and 2 voting methods, every ballot voting yes on
/// the fishing measure. Yes-tallies by precinct are 28 and 55; scanner-2
/// carries 21.
pub fn standard_fixture_rows() -> Vec<FixtureRow> {
    vec![
        FixtureRow {
            multiplier: 5,
            ballot_style: "1M",
            batch: "batch-1-1",
            scanner: "scanner-1",
            precinct: "precinct-1",
            voting_method: VotingMethod::Precinct,
            sheet_number: None,
        },
        FixtureRow {
            multiplier: 6,
            ballot_style: "2F",
            batch: "batch-1-1",
            scanner: "scanner-1",
            precinct: "precinct-1",
            voting_method: VotingMethod::Absentee,
            sheet_number: None,
        },
        FixtureRow {
            multiplier: 17,
            ballot_style: "1M",
            batch: "batch-1-2",
            scanner: "scanner-1",
            precinct: "precinct-1",
            voting_method: VotingMethod::Precinct,
            sheet_number: Some(1),
        },
        FixtureRow {
            multiplier: 9,
            ballot_style: "1M",
            batch: "batch-2-1",
            scanner: "scanner-2",
            precinct: "precinct-2",
            voting_method: VotingMethod::Precinct,
            sheet_number: None,
        },
        FixtureRow {
            multiplier: 12,
            ballot_style: "2F",
            batch: "batch-2-1",
            scanner: "scanner-2",
            precinct: "precinct-2",
            voting_method: VotingMethod::Absentee,
            sheet_number: None,
        },
        FixtureRow {
            multiplier: 34,
            ballot_style: "2F",
            batch: "batch-3-1",
            scanner: "scanner-3",
            precinct: "precinct-2",
            voting_method: VotingMethod::Precinct,
            sheet_number: None,
        },
    ]
}

/// Votes for one fixture ballot: the party's best-animal favorite plus a yes
/// on the fishing measure.
pub fn fixture_votes(ballot_style: &str) -> VotesMap {
    let mut votes = VotesMap::new();
    match ballot_style {
        "1M" => {
            votes.insert(
                ContestId::from("best-animal-mammal"),
                vec![OptionId::from("horse")],
            );
        }
        "2F" => {
            votes.insert(
                ContestId::from("best-animal-fish"),
                vec![OptionId::from("seahorse")],
            );
        }
        other => panic!("unknown fixture ballot style {other}"),
    }
    votes.insert(ContestId::from("fishing"), vec![OptionId::from("ban-fishing")]);
    votes
}

pub fn fixture_cvr(row: &FixtureRow, copy: u32, votes: VotesMap) -> CvrInsert {
    CvrInsert {
        ballot_id: BallotId::from(format!(
            "{}-{}-{copy}",
            row.batch,
            row.voting_method.as_str()
        )),
        ballot_style_id: BallotStyleId::from(row.ballot_style),
        precinct_id: PrecinctId::from(row.precinct),
        voting_method: row.voting_method,
        batch_id: BatchId::from(row.batch),
        scanner_id: ScannerId::from(row.scanner),
        sheet_number: row.sheet_number,
        side: None,
        votes,
    }
}

/// Ingest the full standard grid; returns the number of ballots ingested.
pub fn ingest_standard_fixture(
    store: &mut Store,
    election_id: ElectionId,
    cvr_file_id: CvrFileId,
) -> Result<u32, StorageError> {
    let mut total = 0;
    for row in standard_fixture_rows() {
        for copy in 0..row.multiplier {
            let cvr = fixture_cvr(&row, copy, fixture_votes(row.ballot_style));
            store.add_cvr(election_id, cvr_file_id, &cvr)?;
            total += 1;
        }
    }
    Ok(total)
}
