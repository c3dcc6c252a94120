use std::collections::{BTreeMap, BTreeSet};

use tallyvault_core::adjudication::WriteInAdjudication;
use tallyvault_core::cvr::{CvrInsert, VotesMap, VotingMethod};
use tallyvault_core::filter::{CvrFilter, GroupBy, GroupKey, GroupSpecifier};
use tallyvault_core::ids::*;
use tallyvault_core::results::{
    CandidateContestResults, ContestResults, ElectionResults, ManualResults, WriteInCandidateTally,
    YesNoContestResults,
};
use tallyvault_engine::{EngineError, TabulateParams, tabulate, tabulate_party_split};
use tallyvault_harness::{TestStore, general_election, ingest_standard_fixture};
use tallyvault_storage::ManualResultsKey;

fn params(election_id: ElectionId) -> TabulateParams {
    TabulateParams {
        election_id,
        filter: CvrFilter::default(),
        group_by: GroupBy::default(),
        include_manual: false,
        include_write_in_adjudication: false,
    }
}

fn root_key() -> GroupKey {
    GroupSpecifier::root().key()
}

fn precinct_key(precinct: &str) -> GroupKey {
    GroupSpecifier {
        precinct_id: Some(PrecinctId::from(precinct)),
        ..GroupSpecifier::default()
    }
    .key()
}

fn yes_no<'r>(results: &'r ElectionResults, contest: &str) -> &'r YesNoContestResults {
    match results.contest_results.get(&ContestId::from(contest)) {
        Some(ContestResults::YesNo(r)) => r,
        other => panic!("expected yes/no results for {contest}, got {other:?}"),
    }
}

fn candidate<'r>(results: &'r ElectionResults, contest: &str) -> &'r CandidateContestResults {
    match results.contest_results.get(&ContestId::from(contest)) {
        Some(ContestResults::Candidate(r)) => r,
        other => panic!("expected candidate results for {contest}, got {other:?}"),
    }
}

#[test]
fn ungrouped_tabulation_over_the_standard_grid() {
    let (mut harness, election_id, file_id) = TestStore::with_primary_election().unwrap();
    ingest_standard_fixture(&mut harness.store, election_id, file_id).unwrap();

    let results = tabulate(&harness.store, &params(election_id)).unwrap();
    assert_eq!(results.len(), 1);
    let root = &results[&root_key()];

    assert_eq!(root.card_counts.bmd, 66);
    assert_eq!(root.card_counts.hmpb, vec![17]);
    assert_eq!(root.card_counts.total(), 83);

    let fishing = yes_no(root, "fishing");
    assert_eq!(fishing.ballots, 83);
    assert_eq!(fishing.yes_tally, 83);
    assert_eq!(fishing.no_tally, 0);
    assert_eq!(fishing.undervotes, 0);

    assert_eq!(candidate(root, "best-animal-mammal").tallies[&CandidateId::from("horse")], 31);
    assert_eq!(
        candidate(root, "best-animal-fish").tallies[&CandidateId::from("seahorse")],
        52
    );
}

#[test]
fn grouping_by_precinct_splits_the_grid() {
    let (mut harness, election_id, file_id) = TestStore::with_primary_election().unwrap();
    ingest_standard_fixture(&mut harness.store, election_id, file_id).unwrap();

    let results = tabulate(
        &harness.store,
        &TabulateParams {
            group_by: GroupBy {
                precinct: true,
                ..GroupBy::default()
            },
            ..params(election_id)
        },
    )
    .unwrap();
    assert_eq!(results.len(), 2);

    let precinct_1 = &results[&precinct_key("precinct-1")];
    assert_eq!(yes_no(precinct_1, "fishing").yes_tally, 28);
    assert_eq!(precinct_1.card_counts.bmd, 11);
    assert_eq!(precinct_1.card_counts.hmpb, vec![17]);
    assert_eq!(
        candidate(precinct_1, "best-animal-mammal").tallies[&CandidateId::from("horse")],
        22
    );

    let precinct_2 = &results[&precinct_key("precinct-2")];
    assert_eq!(yes_no(precinct_2, "fishing").yes_tally, 55);
    assert_eq!(precinct_2.card_counts.total(), 55);
    assert_eq!(
        candidate(precinct_2, "best-animal-fish").tallies[&CandidateId::from("seahorse")],
        46
    );
}

#[test]
fn scanner_filter_narrows_without_regrouping() {
    let (mut harness, election_id, file_id) = TestStore::with_primary_election().unwrap();
    ingest_standard_fixture(&mut harness.store, election_id, file_id).unwrap();

    let results = tabulate(
        &harness.store,
        &TabulateParams {
            filter: CvrFilter {
                scanner_ids: Some(BTreeSet::from([ScannerId::from("scanner-2")])),
                ..CvrFilter::default()
            },
            ..params(election_id)
        },
    )
    .unwrap();
    let root = &results[&root_key()];

    assert_eq!(root.card_counts.total(), 21);
    assert_eq!(yes_no(root, "fishing").yes_tally, 21);
    assert_eq!(candidate(root, "best-animal-mammal").ballots, 9);
    assert_eq!(candidate(root, "best-animal-fish").ballots, 12);
}

#[test]
fn voting_method_filters_partition_without_double_counting() {
    let (mut harness, election_id, file_id) = TestStore::with_primary_election().unwrap();
    ingest_standard_fixture(&mut harness.store, election_id, file_id).unwrap();

    let mut total = 0;
    for method in VotingMethod::ALL {
        let results = tabulate(
            &harness.store,
            &TabulateParams {
                filter: CvrFilter {
                    voting_methods: Some(BTreeSet::from([method])),
                    ..CvrFilter::default()
                },
                ..params(election_id)
            },
        )
        .unwrap();
        total += yes_no(&results[&root_key()], "fishing").yes_tally;
    }
    let all = tabulate(&harness.store, &params(election_id)).unwrap();
    assert_eq!(total, yes_no(&all[&root_key()], "fishing").yes_tally);
    assert_eq!(total, 83);
}

#[test]
fn zero_cvr_groups_are_reported_not_omitted() {
    let (harness, election_id, _) = TestStore::with_primary_election().unwrap();

    // No CVRs at all: every precinct/method combination named by the filter
    // still gets a row of zeroes.
    let results = tabulate(
        &harness.store,
        &TabulateParams {
            filter: CvrFilter {
                voting_methods: Some(BTreeSet::from([
                    VotingMethod::Precinct,
                    VotingMethod::Absentee,
                ])),
                ..CvrFilter::default()
            },
            group_by: GroupBy {
                precinct: true,
                voting_method: true,
                ..GroupBy::default()
            },
            ..params(election_id)
        },
    )
    .unwrap();

    assert_eq!(results.len(), 4);
    for (precinct, method) in [
        ("precinct-1", VotingMethod::Precinct),
        ("precinct-1", VotingMethod::Absentee),
        ("precinct-2", VotingMethod::Precinct),
        ("precinct-2", VotingMethod::Absentee),
    ] {
        let key = GroupSpecifier {
            precinct_id: Some(PrecinctId::from(precinct)),
            voting_method: Some(method),
            ..GroupSpecifier::default()
        }
        .key();
        let group = &results[&key];
        assert_eq!(group.card_counts.total(), 0);
        // Candidate rows are seeded so reports show explicit zeroes.
        assert_eq!(
            candidate(group, "best-animal-mammal").tallies[&CandidateId::from("horse")],
            0
        );
    }
}

#[test]
fn empty_id_list_filter_yields_no_groups() {
    let (mut harness, election_id, file_id) = TestStore::with_primary_election().unwrap();
    ingest_standard_fixture(&mut harness.store, election_id, file_id).unwrap();

    let results = tabulate(
        &harness.store,
        &TabulateParams {
            filter: CvrFilter {
                party_ids: Some(BTreeSet::new()),
                ..CvrFilter::default()
            },
            ..params(election_id)
        },
    )
    .unwrap();
    assert!(results.is_empty());
}

fn write_in_ballot(ballot_id: &str) -> CvrInsert {
    let mut votes = VotesMap::new();
    votes.insert(
        ContestId::from("best-animal-mammal"),
        vec![OptionId::from("write-in-0")],
    );
    CvrInsert {
        ballot_id: BallotId::from(ballot_id),
        ballot_style_id: BallotStyleId::from("1M"),
        precinct_id: PrecinctId::from("precinct-1"),
        voting_method: VotingMethod::Precinct,
        batch_id: BatchId::from("batch-1-1"),
        scanner_id: ScannerId::from("scanner-1"),
        sheet_number: None,
        side: None,
        votes,
    }
}

#[test]
fn write_in_adjudication_reclassifies_without_changing_totals() {
    let (mut harness, election_id, file_id) = TestStore::with_primary_election().unwrap();
    let contest_id = ContestId::from("best-animal-mammal");
    for i in 0..5 {
        harness
            .store
            .add_cvr(election_id, file_id, &write_in_ballot(&format!("wi-{i}")))
            .unwrap();
    }

    let queue: Vec<WriteInId> = harness
        .store
        .list_write_ins(election_id, Some(&contest_id))
        .unwrap()
        .iter()
        .map(|record| record.id)
        .collect();
    let lemur = harness
        .store
        .add_write_in_candidate(election_id, &contest_id, "Lemur")
        .unwrap();
    let otter = WriteInAdjudication::OfficialCandidate(CandidateId::from("otter"));
    harness.store.adjudicate_write_in(queue[0], &otter).unwrap();
    harness.store.adjudicate_write_in(queue[1], &otter).unwrap();
    harness
        .store
        .adjudicate_write_in(queue[2], &WriteInAdjudication::WriteInCandidate(lemur.id))
        .unwrap();
    harness
        .store
        .adjudicate_write_in(queue[3], &WriteInAdjudication::Invalid)
        .unwrap();
    // queue[4] stays pending.

    // Without the overlay every mark sits in the generic bucket.
    let raw = tabulate(&harness.store, &params(election_id)).unwrap();
    assert_eq!(candidate(&raw[&root_key()], "best-animal-mammal").write_in, 5);

    let adjudicated = tabulate(
        &harness.store,
        &TabulateParams {
            include_write_in_adjudication: true,
            ..params(election_id)
        },
    )
    .unwrap();
    let contest = candidate(&adjudicated[&root_key()], "best-animal-mammal");

    assert_eq!(contest.ballots, 5);
    assert_eq!(contest.tallies[&CandidateId::from("otter")], 2);
    assert_eq!(
        contest.write_in_option_tallies[&lemur.id],
        WriteInCandidateTally {
            name: "Lemur".to_string(),
            tally: 1,
        }
    );
    assert_eq!(contest.undervotes, 1);
    assert_eq!(contest.write_in, 1);

    // Reclassification conserves votes: decided outcomes plus the remaining
    // generic bucket equal the original write-in count.
    let reclassified: u32 = contest.tallies[&CandidateId::from("otter")]
        + contest.write_in_option_tallies[&lemur.id].tally
        + contest.undervotes
        + contest.write_in;
    assert_eq!(reclassified, 5);
}

#[test]
fn overvoted_write_in_marks_never_reach_the_queue_or_the_bucket() {
    let (mut harness, election_id, file_id) = TestStore::with_primary_election().unwrap();
    let contest_id = ContestId::from("best-animal-mammal");

    // One seat, two marks: the contest is overvoted, so its write-in mark is
    // never counted and must not be adjudicable.
    let mut overvoted = write_in_ballot("overvote-1");
    overvoted.votes.insert(
        contest_id.clone(),
        vec![OptionId::from("horse"), OptionId::from("write-in-0")],
    );
    harness
        .store
        .add_cvr(election_id, file_id, &overvoted)
        .unwrap();
    harness
        .store
        .add_cvr(election_id, file_id, &write_in_ballot("clean-1"))
        .unwrap();

    // Only the clean ballot's mark is queued.
    let queue = harness.store.list_write_ins(election_id, None).unwrap();
    assert_eq!(queue.len(), 1);
    harness
        .store
        .adjudicate_write_in(queue[0].id, &WriteInAdjudication::Invalid)
        .unwrap();

    let results = tabulate(
        &harness.store,
        &TabulateParams {
            include_write_in_adjudication: true,
            ..params(election_id)
        },
    )
    .unwrap();
    let contest = candidate(&results[&root_key()], "best-animal-mammal");
    assert_eq!(contest.ballots, 2);
    assert_eq!(contest.overvotes, 1);
    assert_eq!(contest.undervotes, 1);
    assert_eq!(contest.tallies[&CandidateId::from("horse")], 0);
    assert_eq!(contest.write_in, 0);
}

fn manual_fixture() -> ManualResults {
    let mut contest_results = BTreeMap::new();
    contest_results.insert(
        ContestId::from("fishing"),
        ContestResults::YesNo(YesNoContestResults {
            ballots: 10,
            overvotes: 0,
            undervotes: 1,
            yes_option: OptionId::from("ban-fishing"),
            no_option: OptionId::from("allow-fishing"),
            yes_tally: 7,
            no_tally: 2,
        }),
    );
    contest_results.insert(
        ContestId::from("best-animal-mammal"),
        ContestResults::Candidate(CandidateContestResults {
            ballots: 10,
            overvotes: 0,
            undervotes: 1,
            tallies: BTreeMap::from([
                (CandidateId::from("horse"), 6),
                (CandidateId::from("otter"), 3),
            ]),
            write_in: 0,
            write_in_option_tallies: BTreeMap::new(),
        }),
    );
    ManualResults {
        ballot_count: 10,
        contest_results,
    }
}

#[test]
fn manual_results_are_folded_under_their_own_card_count() {
    let (mut harness, election_id, file_id) = TestStore::with_primary_election().unwrap();
    ingest_standard_fixture(&mut harness.store, election_id, file_id).unwrap();

    let key = ManualResultsKey {
        precinct_id: PrecinctId::from("precinct-1"),
        ballot_style_id: BallotStyleId::from("1M"),
        voting_method: VotingMethod::Precinct,
    };
    harness
        .store
        .set_manual_results(election_id, &key, &manual_fixture())
        .unwrap();

    let results = tabulate(
        &harness.store,
        &TabulateParams {
            include_manual: true,
            group_by: GroupBy {
                precinct: true,
                ..GroupBy::default()
            },
            ..params(election_id)
        },
    )
    .unwrap();

    let precinct_1 = &results[&precinct_key("precinct-1")];
    assert_eq!(precinct_1.card_counts.manual, 10);
    assert_eq!(precinct_1.card_counts.total(), 38);
    let fishing = yes_no(precinct_1, "fishing");
    assert_eq!(fishing.yes_tally, 35);
    assert_eq!(fishing.no_tally, 2);
    assert_eq!(
        candidate(precinct_1, "best-animal-mammal").tallies[&CandidateId::from("horse")],
        28
    );

    // The other precinct is untouched.
    assert_eq!(results[&precinct_key("precinct-2")].card_counts.manual, 0);
}

#[test]
fn manual_results_are_skipped_under_scan_only_dimensions() {
    let (mut harness, election_id, file_id) = TestStore::with_primary_election().unwrap();
    ingest_standard_fixture(&mut harness.store, election_id, file_id).unwrap();
    let key = ManualResultsKey {
        precinct_id: PrecinctId::from("precinct-1"),
        ballot_style_id: BallotStyleId::from("1M"),
        voting_method: VotingMethod::Precinct,
    };
    harness
        .store
        .set_manual_results(election_id, &key, &manual_fixture())
        .unwrap();

    // Hand-entered tallies have no scanner, so a scanner-filtered report
    // cannot meaningfully include them.
    let results = tabulate(
        &harness.store,
        &TabulateParams {
            include_manual: true,
            filter: CvrFilter {
                scanner_ids: Some(BTreeSet::from([ScannerId::from("scanner-1")])),
                ..CvrFilter::default()
            },
            ..params(election_id)
        },
    )
    .unwrap();
    let root = &results[&root_key()];
    assert_eq!(root.card_counts.manual, 0);
    assert_eq!(yes_no(root, "fishing").yes_tally, 28);
}

#[test]
fn party_split_reports_per_party_ballot_counts() {
    let (mut harness, election_id, file_id) = TestStore::with_primary_election().unwrap();
    ingest_standard_fixture(&mut harness.store, election_id, file_id).unwrap();

    let split = tabulate_party_split(&harness.store, &params(election_id)).unwrap();
    assert_eq!(split.len(), 1);
    let unit = &split[&root_key()];

    let mammal = &unit.card_counts_by_party[&PartyId::from("mammal")];
    assert_eq!((mammal.bmd, mammal.hmpb.clone()), (14, vec![17]));
    assert_eq!(mammal.total(), 31);
    assert_eq!(unit.card_counts_by_party[&PartyId::from("fish")].total(), 52);

    // The nonpartisan measure combines both parties' ballots.
    assert_eq!(yes_no(&unit.results, "fishing").yes_tally, 83);
    assert_eq!(
        candidate(&unit.results, "best-animal-mammal").tallies[&CandidateId::from("horse")],
        31
    );
}

#[test]
fn party_split_rejects_non_primaries() {
    let mut harness = TestStore::new().unwrap();
    let election_id = harness.store.add_election(&general_election()).unwrap();

    assert!(matches!(
        tabulate_party_split(&harness.store, &params(election_id)),
        Err(EngineError::NotAPrimary(_))
    ));
}

#[test]
fn tabulating_a_missing_election_fails() {
    let harness = TestStore::new().unwrap();
    assert!(matches!(
        tabulate(&harness.store, &params(ElectionId::new())),
        Err(EngineError::ElectionNotFound(_))
    ));
}
