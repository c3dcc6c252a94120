use std::collections::BTreeMap;

use tallyvault_core::adjudication::WriteInAdjudication;
use tallyvault_core::cvr::{CvrInsert, VotesMap, VotingMethod};
use tallyvault_core::ids::*;
use tallyvault_core::results::{
    CandidateContestResults, ContestResults, ManualResults, WriteInCandidateTally,
};
use tallyvault_harness::TestStore;
use tallyvault_storage::{ManualResultsKey, Store, StorageError};

fn mammal_contest() -> ContestId {
    ContestId::from("best-animal-mammal")
}

fn fish_contest() -> ContestId {
    ContestId::from("best-animal-fish")
}

/// A mammal-ballot CVR whose only vote is a write-in mark in the given
/// contest.
fn write_in_ballot(ballot_id: &str, contest_id: &ContestId) -> CvrInsert {
    let ballot_style = if *contest_id == fish_contest() { "2F" } else { "1M" };
    let mut votes = VotesMap::new();
    votes.insert(contest_id.clone(), vec![OptionId::from("write-in-0")]);
    CvrInsert {
        ballot_id: BallotId::from(ballot_id),
        ballot_style_id: BallotStyleId::from(ballot_style),
        precinct_id: PrecinctId::from("precinct-1"),
        voting_method: VotingMethod::Precinct,
        batch_id: BatchId::from("batch-1-1"),
        scanner_id: ScannerId::from("scanner-1"),
        sheet_number: None,
        side: None,
        votes,
    }
}

fn ingest_write_ins(
    store: &mut Store,
    election_id: ElectionId,
    file_id: CvrFileId,
    contest_id: &ContestId,
    count: u32,
) {
    for i in 0..count {
        let ballot_id = format!("{}-write-in-{i}", contest_id.as_str());
        store
            .add_cvr(election_id, file_id, &write_in_ballot(&ballot_id, contest_id))
            .unwrap();
    }
}

#[test]
fn queue_is_fifo_in_ingestion_order() {
    let (mut harness, election_id, file_id) = TestStore::with_primary_election().unwrap();
    ingest_write_ins(&mut harness.store, election_id, file_id, &mammal_contest(), 3);

    let queue = harness
        .store
        .list_write_ins(election_id, Some(&mammal_contest()))
        .unwrap();
    assert_eq!(queue.len(), 3);
    let stored = harness
        .store
        .stream_cvrs(election_id, &Default::default())
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    for (i, record) in queue.iter().enumerate() {
        assert_eq!(record.contest_id, mammal_contest());
        assert!(record.adjudication.is_pending());
        assert_eq!(record.adjudicated_at, None);
        // Ingestion order is preserved, observable through the CVR each
        // record points at.
        let cvr = stored
            .iter()
            .find(|cvr| cvr.cvr_id == record.cvr_id)
            .unwrap();
        assert_eq!(
            cvr.ballot_id.as_str(),
            format!("best-animal-mammal-write-in-{i}")
        );
    }

    let first = harness
        .store
        .first_pending_write_in(election_id, &mammal_contest())
        .unwrap();
    assert_eq!(first, Some(queue[0].id));
}

#[test]
fn queue_metadata_counts_pending_per_contest() {
    let (mut harness, election_id, file_id) = TestStore::with_primary_election().unwrap();
    ingest_write_ins(&mut harness.store, election_id, file_id, &mammal_contest(), 3);
    ingest_write_ins(&mut harness.store, election_id, file_id, &fish_contest(), 2);

    let first = harness
        .store
        .first_pending_write_in(election_id, &mammal_contest())
        .unwrap()
        .unwrap();
    harness
        .store
        .adjudicate_write_in(first, &WriteInAdjudication::Invalid)
        .unwrap();

    let metadata = harness.store.write_in_queue_metadata(election_id).unwrap();
    assert_eq!(metadata.len(), 2);
    assert_eq!(metadata[0].contest_id, fish_contest());
    assert_eq!((metadata[0].total, metadata[0].pending), (2, 2));
    assert_eq!(metadata[1].contest_id, mammal_contest());
    assert_eq!((metadata[1].total, metadata[1].pending), (3, 2));

    // The queue head advances past the adjudicated record.
    let next = harness
        .store
        .first_pending_write_in(election_id, &mammal_contest())
        .unwrap()
        .unwrap();
    assert_ne!(next, first);
}

#[test]
fn decisions_round_trip_and_readjudication_replaces() {
    let (mut harness, election_id, file_id) = TestStore::with_primary_election().unwrap();
    ingest_write_ins(&mut harness.store, election_id, file_id, &mammal_contest(), 1);
    let write_in_id = harness
        .store
        .first_pending_write_in(election_id, &mammal_contest())
        .unwrap()
        .unwrap();

    let official = WriteInAdjudication::OfficialCandidate(CandidateId::from("horse"));
    harness.store.adjudicate_write_in(write_in_id, &official).unwrap();
    let record = &harness.store.list_write_ins(election_id, None).unwrap()[0];
    assert_eq!(record.adjudication, official);
    assert!(record.adjudicated_at.is_some());

    // A later reviewer can change the call outright.
    harness
        .store
        .adjudicate_write_in(write_in_id, &WriteInAdjudication::Invalid)
        .unwrap();
    let record = &harness.store.list_write_ins(election_id, None).unwrap()[0];
    assert_eq!(record.adjudication, WriteInAdjudication::Invalid);

    // Or reset it to pending, which clears the decision timestamp.
    harness
        .store
        .adjudicate_write_in(write_in_id, &WriteInAdjudication::Pending)
        .unwrap();
    let record = &harness.store.list_write_ins(election_id, None).unwrap()[0];
    assert_eq!(record.adjudication, WriteInAdjudication::Pending);
    assert_eq!(record.adjudicated_at, None);
    assert_eq!(
        harness
            .store
            .first_pending_write_in(election_id, &mammal_contest())
            .unwrap(),
        Some(write_in_id)
    );
}

#[test]
fn add_write_in_candidate_is_idempotent_by_name() {
    let (mut harness, election_id, _) = TestStore::with_primary_election().unwrap();

    let first = harness
        .store
        .add_write_in_candidate(election_id, &mammal_contest(), "Lemur")
        .unwrap();
    let again = harness
        .store
        .add_write_in_candidate(election_id, &mammal_contest(), "Lemur")
        .unwrap();
    assert_eq!(again.id, first.id);

    // The same name in another contest is a different candidate.
    let other = harness
        .store
        .add_write_in_candidate(election_id, &fish_contest(), "Lemur")
        .unwrap();
    assert_ne!(other.id, first.id);

    assert_eq!(
        harness
            .store
            .list_write_in_candidates(election_id, Some(&mammal_contest()))
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn reassignment_deletes_the_orphaned_candidate() {
    let (mut harness, election_id, file_id) = TestStore::with_primary_election().unwrap();
    ingest_write_ins(&mut harness.store, election_id, file_id, &mammal_contest(), 1);
    let write_in_id = harness
        .store
        .first_pending_write_in(election_id, &mammal_contest())
        .unwrap()
        .unwrap();

    let candidate = harness
        .store
        .add_write_in_candidate(election_id, &mammal_contest(), "Lemur")
        .unwrap();
    harness
        .store
        .adjudicate_write_in(
            write_in_id,
            &WriteInAdjudication::WriteInCandidate(candidate.id),
        )
        .unwrap();
    assert_eq!(
        harness
            .store
            .list_write_in_candidates(election_id, None)
            .unwrap()
            .len(),
        1
    );

    // Moving the only referencing write-in off the candidate removes it in
    // the same transaction.
    harness
        .store
        .adjudicate_write_in(
            write_in_id,
            &WriteInAdjudication::OfficialCandidate(CandidateId::from("otter")),
        )
        .unwrap();
    assert!(
        harness
            .store
            .list_write_in_candidates(election_id, None)
            .unwrap()
            .is_empty()
    );
}

#[test]
fn manual_reference_keeps_candidate_alive() {
    let (mut harness, election_id, file_id) = TestStore::with_primary_election().unwrap();
    ingest_write_ins(&mut harness.store, election_id, file_id, &mammal_contest(), 1);
    let write_in_id = harness
        .store
        .first_pending_write_in(election_id, &mammal_contest())
        .unwrap()
        .unwrap();

    let candidate = harness
        .store
        .add_write_in_candidate(election_id, &mammal_contest(), "Lemur")
        .unwrap();
    harness
        .store
        .adjudicate_write_in(
            write_in_id,
            &WriteInAdjudication::WriteInCandidate(candidate.id),
        )
        .unwrap();

    // Hand-entered tallies also credit the candidate.
    let key = ManualResultsKey {
        precinct_id: PrecinctId::from("precinct-1"),
        ballot_style_id: BallotStyleId::from("1M"),
        voting_method: VotingMethod::Precinct,
    };
    let mut contest_results = BTreeMap::new();
    contest_results.insert(
        mammal_contest(),
        ContestResults::Candidate(CandidateContestResults {
            ballots: 2,
            overvotes: 0,
            undervotes: 0,
            tallies: BTreeMap::new(),
            write_in: 0,
            write_in_option_tallies: BTreeMap::from([(
                candidate.id,
                WriteInCandidateTally {
                    name: candidate.name.clone(),
                    tally: 2,
                },
            )]),
        }),
    );
    let manual = ManualResults {
        ballot_count: 2,
        contest_results,
    };
    harness.store.set_manual_results(election_id, &key, &manual).unwrap();
    let stored = harness
        .store
        .get_manual_results(election_id, &key)
        .unwrap()
        .unwrap();
    assert_eq!(stored.results, manual);

    // Invalidating the scanned write-in leaves the manual reference, so the
    // candidate survives.
    harness
        .store
        .adjudicate_write_in(write_in_id, &WriteInAdjudication::Invalid)
        .unwrap();
    assert_eq!(
        harness
            .store
            .list_write_in_candidates(election_id, None)
            .unwrap()
            .len(),
        1
    );

    // Removing the manual tallies drops the last reference.
    harness.store.delete_manual_results(election_id, &key).unwrap();
    assert!(
        harness
            .store
            .list_write_in_candidates(election_id, None)
            .unwrap()
            .is_empty()
    );
}

#[test]
fn adjudicating_unknown_targets_fails() {
    let (mut harness, election_id, file_id) = TestStore::with_primary_election().unwrap();

    assert!(matches!(
        harness
            .store
            .adjudicate_write_in(WriteInId::new(), &WriteInAdjudication::Invalid),
        Err(StorageError::NotFound(_))
    ));

    ingest_write_ins(&mut harness.store, election_id, file_id, &mammal_contest(), 1);
    let write_in_id = harness
        .store
        .first_pending_write_in(election_id, &mammal_contest())
        .unwrap()
        .unwrap();
    assert!(matches!(
        harness.store.adjudicate_write_in(
            write_in_id,
            &WriteInAdjudication::WriteInCandidate(WriteInCandidateId::new()),
        ),
        Err(StorageError::NotFound(_))
    ));

    // The failed decision left the record pending.
    assert_eq!(
        harness
            .store
            .first_pending_write_in(election_id, &mammal_contest())
            .unwrap(),
        Some(write_in_id)
    );
}
