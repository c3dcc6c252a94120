use std::collections::BTreeMap;

use tallyvault_core::adjudication::WriteInTallyOutcome;
use tallyvault_core::cvr::CvrTuple;
use tallyvault_core::election::{Contest, ElectionDefinition, ElectionType};
use tallyvault_core::filter::{CvrFilter, GroupBy, GroupKey, GroupSpecifier};
use tallyvault_core::ids::*;
use tallyvault_core::results::{
    CardCounts, ContestResults, ElectionResults, WriteInCandidateTally,
};
use tallyvault_storage::Store;

use crate::error::EngineError;
use crate::groups::{enumerate_groups, filtered_contests};

#[derive(Debug, Clone)]
pub struct TabulateParams {
    pub election_id: ElectionId,
    pub filter: CvrFilter,
    pub group_by: GroupBy,
    /// Fold hand-entered tallies into the results. Skipped when the filter
    /// or grouping touches batch/scanner, which manual tallies do not have.
    pub include_manual: bool,
    /// Reclassify the generic write-in bucket using current adjudication
    /// state.
    pub include_write_in_adjudication: bool,
}

/// One result group plus the coordinates that produced it.
#[derive(Debug, Clone)]
pub struct GroupResults {
    pub spec: GroupSpecifier,
    pub results: ElectionResults,
}

/// Compute complete election results for every group implied by the params.
pub fn tabulate(
    store: &Store,
    params: &TabulateParams,
) -> Result<BTreeMap<GroupKey, ElectionResults>, EngineError> {
    Ok(tabulate_groups(store, params)?
        .into_iter()
        .map(|(key, group)| (key, group.results))
        .collect())
}

fn tabulate_groups(
    store: &Store,
    params: &TabulateParams,
) -> Result<BTreeMap<GroupKey, GroupResults>, EngineError> {
    let election = store
        .get_election(params.election_id)?
        .ok_or_else(|| EngineError::ElectionNotFound(params.election_id.to_string()))?;
    let definition = &election.definition;

    let contest_ids = filtered_contests(definition, &params.filter);
    let contests: Vec<&Contest> = contest_ids
        .iter()
        .filter_map(|id| definition.contest(id))
        .collect();
    let contests_by_id: BTreeMap<&ContestId, &Contest> =
        contests.iter().map(|c| (c.id(), *c)).collect();

    log::debug!(
        "tabulating election {} over {} contests",
        params.election_id,
        contests.len()
    );

    let mut groups: BTreeMap<GroupKey, GroupResults> = BTreeMap::new();

    // Groups derivable from the definition are seeded up front so zero-CVR
    // combinations still appear in the output. Batch/scanner groups only
    // materialize from the data below.
    if params.group_by.is_enumerable() {
        for spec in enumerate_groups(definition, &params.group_by, &params.filter) {
            seed_group(&mut groups, spec, &contests);
        }
    }

    for (spec, card_counts) in
        store.card_counts(params.election_id, &params.group_by, &params.filter)?
    {
        let group = seed_group(&mut groups, spec, &contests);
        group.results.card_counts.bmd = card_counts.bmd;
        group.results.card_counts.hmpb = card_counts.hmpb;
    }

    // One pass over the matching CVRs; the stream is finite and single-use.
    for tuple in store.stream_cvrs(params.election_id, &params.filter) {
        let tuple = tuple?;
        let spec = specifier_for_cvr(&tuple, &params.group_by);
        let group = seed_group(&mut groups, spec, &contests);
        for (contest_id, options) in &tuple.votes {
            // Votes for contests outside the filtered set (e.g. the other
            // party's contests under a party filter) are not part of this
            // report.
            let Some(contest) = contests_by_id.get(contest_id) else {
                continue;
            };
            let bucket = group
                .results
                .contest_results
                .get_mut(contest_id)
                .ok_or_else(|| EngineError::MissingContestResults(contest_id.to_string()))?;
            bucket.tally_card(contest, options);
        }
    }

    if params.include_write_in_adjudication {
        overlay_write_in_adjudication(store, params, &contests_by_id, &mut groups)?;
    }

    if params.include_manual
        && !params.filter.has_scan_only_dimensions()
        && !params.group_by.has_scan_only_dimensions()
    {
        overlay_manual_results(store, params, definition, &contests, &mut groups)?;
    }

    Ok(groups)
}

fn seed_group<'m>(
    groups: &'m mut BTreeMap<GroupKey, GroupResults>,
    spec: GroupSpecifier,
    contests: &[&Contest],
) -> &'m mut GroupResults {
    groups.entry(spec.key()).or_insert_with(|| GroupResults {
        spec,
        results: ElectionResults::empty_for(contests),
    })
}

/// Reclassify each group's generic write-in bucket from adjudication state:
/// official-candidate decisions move to that candidate's tally,
/// write-in-candidate decisions to the candidate's own bucket, invalid
/// decisions become undervotes, pending marks stay where they are. No vote
/// is created or destroyed, only reclassified.
fn overlay_write_in_adjudication(
    store: &Store,
    params: &TabulateParams,
    contests_by_id: &BTreeMap<&ContestId, &Contest>,
    groups: &mut BTreeMap<GroupKey, GroupResults>,
) -> Result<(), EngineError> {
    let tallies = store.write_in_tallies(params.election_id, &params.group_by, &params.filter)?;
    for tally in tallies {
        if !contests_by_id.contains_key(&tally.contest_id) {
            continue;
        }
        let group = groups
            .get_mut(&tally.group.key())
            .ok_or_else(|| EngineError::MissingContestResults(tally.contest_id.to_string()))?;
        let bucket = group
            .results
            .contest_results
            .get_mut(&tally.contest_id)
            .ok_or_else(|| EngineError::MissingContestResults(tally.contest_id.to_string()))?;
        let ContestResults::Candidate(results) = bucket else {
            continue;
        };

        if matches!(tally.outcome, WriteInTallyOutcome::Pending) {
            continue;
        }
        if results.write_in < tally.count {
            return Err(EngineError::WriteInBucketUnderflow(
                tally.contest_id.to_string(),
            ));
        }
        results.write_in -= tally.count;
        match tally.outcome {
            WriteInTallyOutcome::Pending => {}
            WriteInTallyOutcome::Invalid => {
                results.undervotes += tally.count;
            }
            WriteInTallyOutcome::OfficialCandidate { candidate_id } => {
                *results.tallies.entry(candidate_id).or_insert(0) += tally.count;
            }
            WriteInTallyOutcome::WriteInCandidate { candidate_id, name } => {
                results
                    .write_in_option_tallies
                    .entry(candidate_id)
                    .and_modify(|entry| entry.tally += tally.count)
                    .or_insert(WriteInCandidateTally {
                        name,
                        tally: tally.count,
                    });
            }
        }
    }
    Ok(())
}

/// Fold each matching manual record into its group: ballot counts go under
/// the distinct `manual` card count, contest tallies are summed with the
/// scanned ones.
fn overlay_manual_results(
    store: &Store,
    params: &TabulateParams,
    definition: &ElectionDefinition,
    contests: &[&Contest],
    groups: &mut BTreeMap<GroupKey, GroupResults>,
) -> Result<(), EngineError> {
    for record in store.list_manual_results(params.election_id)? {
        let party_id = definition
            .ballot_style(&record.key.ballot_style_id)
            .and_then(|ballot_style| ballot_style.party_id.clone());
        if !params.filter.matches_precinct(&record.key.precinct_id)
            || !params.filter.matches_party(party_id.as_ref())
            || !params
                .filter
                .matches_ballot_style(&record.key.ballot_style_id)
            || !params.filter.matches_voting_method(record.key.voting_method)
        {
            continue;
        }

        let spec = GroupSpecifier {
            precinct_id: params
                .group_by
                .precinct
                .then(|| record.key.precinct_id.clone()),
            party_id: if params.group_by.party { party_id } else { None },
            ballot_style_id: params
                .group_by
                .ballot_style
                .then(|| record.key.ballot_style_id.clone()),
            voting_method: params
                .group_by
                .voting_method
                .then_some(record.key.voting_method),
            batch_id: None,
            scanner_id: None,
        };
        let group = seed_group(groups, spec, contests);
        group.results.card_counts.manual += record.results.ballot_count;

        for (contest_id, manual_bucket) in &record.results.contest_results {
            let Some(bucket) = group.results.contest_results.get_mut(contest_id) else {
                // Manual entries for contests outside the filtered set are
                // not part of this report.
                continue;
            };
            bucket.accumulate(manual_bucket);
        }
    }
    Ok(())
}

fn specifier_for_cvr(tuple: &CvrTuple, group_by: &GroupBy) -> GroupSpecifier {
    GroupSpecifier {
        precinct_id: group_by.precinct.then(|| tuple.precinct_id.clone()),
        party_id: if group_by.party {
            tuple.party_id.clone()
        } else {
            None
        },
        ballot_style_id: group_by.ballot_style.then(|| tuple.ballot_style_id.clone()),
        voting_method: group_by.voting_method.then_some(tuple.voting_method),
        batch_id: group_by.batch.then(|| tuple.batch_id.clone()),
        scanner_id: group_by.scanner.then(|| tuple.scanner_id.clone()),
    }
}

/// Results for one report unit of a party-split (primary) tabulation:
/// per-party ballot counts alongside contest results combined across
/// parties, so one precinct report can show a nonpartisan section fed by all
/// parties' ballots while still reporting each party's ballot count.
#[derive(Debug, Clone, Default)]
pub struct PartySplitResults {
    pub card_counts_by_party: BTreeMap<PartyId, CardCounts>,
    pub results: ElectionResults,
}

/// Tabulate a primary with party forced into the grouping, then re-coalesce
/// the party-specific groups that share the caller's requested dimensions.
pub fn tabulate_party_split(
    store: &Store,
    params: &TabulateParams,
) -> Result<BTreeMap<GroupKey, PartySplitResults>, EngineError> {
    let election = store
        .get_election(params.election_id)?
        .ok_or_else(|| EngineError::ElectionNotFound(params.election_id.to_string()))?;
    if election.definition.election_type != ElectionType::Primary {
        return Err(EngineError::NotAPrimary(params.election_id.to_string()));
    }

    let split_params = TabulateParams {
        group_by: params.group_by.with_party(),
        ..params.clone()
    };
    let split = tabulate_groups(store, &split_params)?;

    let mut combined: BTreeMap<GroupKey, PartySplitResults> = BTreeMap::new();
    for group in split.into_values() {
        let report_key = group.spec.without_party().key();
        let unit = combined.entry(report_key).or_default();
        if let Some(party_id) = &group.spec.party_id {
            unit.card_counts_by_party
                .entry(party_id.clone())
                .or_default()
                .accumulate(&group.results.card_counts);
        }
        unit.results.card_counts.accumulate(&group.results.card_counts);
        for (contest_id, bucket) in &group.results.contest_results {
            unit.results
                .contest_results
                .entry(contest_id.clone())
                .and_modify(|existing| existing.accumulate(bucket))
                .or_insert_with(|| bucket.clone());
        }
    }
    Ok(combined)
}
