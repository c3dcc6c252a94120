use std::collections::BTreeSet;

use tallyvault_core::cvr::VotingMethod;
use tallyvault_core::election::ElectionDefinition;
use tallyvault_core::filter::{CvrFilter, GroupBy, GroupSpecifier};
use tallyvault_core::ids::*;

/// Enumerate every result group implied by the election definition, the
/// grouping dimensions, and the filter — including groups with zero matching
/// CVRs. A report must show "0 ballots" for a valid combination rather than
/// omit it; omission reads as "not tabulated" to an auditor.
///
/// Only precinct, party, ballot style, and voting method participate: those
/// are derivable from the ballot styles defined for the election. Batch and
/// scanner groups exist only where CVRs do and are never pre-enumerated.
///
/// Order: precinct ascending, then voting method with absentee last, then
/// ballot style and party ascending.
pub fn enumerate_groups(
    definition: &ElectionDefinition,
    group_by: &GroupBy,
    filter: &CvrFilter,
) -> Vec<GroupSpecifier> {
    let mut combinations: Vec<(
        &PrecinctId,
        Option<&PartyId>,
        &BallotStyleId,
        VotingMethod,
    )> = Vec::new();
    for ballot_style in &definition.ballot_styles {
        if !filter.matches_ballot_style(&ballot_style.id)
            || !filter.matches_party(ballot_style.party_id.as_ref())
        {
            continue;
        }
        for precinct_id in &ballot_style.precinct_ids {
            if !filter.matches_precinct(precinct_id) {
                continue;
            }
            for voting_method in VotingMethod::ALL {
                if !filter.matches_voting_method(voting_method) {
                    continue;
                }
                combinations.push((
                    precinct_id,
                    ballot_style.party_id.as_ref(),
                    &ballot_style.id,
                    voting_method,
                ));
            }
        }
    }
    combinations.sort_by_key(|(precinct_id, party_id, ballot_style_id, voting_method)| {
        (
            (*precinct_id).clone(),
            voting_method.report_rank(),
            (*ballot_style_id).clone(),
            party_id.cloned(),
        )
    });

    let mut groups = Vec::new();
    let mut seen = BTreeSet::new();
    for (precinct_id, party_id, ballot_style_id, voting_method) in combinations {
        let spec = GroupSpecifier {
            precinct_id: group_by.precinct.then(|| precinct_id.clone()),
            party_id: if group_by.party {
                party_id.cloned()
            } else {
                None
            },
            ballot_style_id: group_by.ballot_style.then(|| ballot_style_id.clone()),
            voting_method: group_by.voting_method.then_some(voting_method),
            batch_id: None,
            scanner_id: None,
        };
        if seen.insert(spec.clone()) {
            groups.push(spec);
        }
    }
    groups
}

/// Contest ids that could appear on any ballot matching the filter, computed
/// through the ballot-style → district/party joins, in definition order. A
/// party-restricted contest only shows up when an implied ballot style
/// shares its party. Voting method, batch, and scanner never restrict which
/// ballot styles exist.
pub fn filtered_contests(definition: &ElectionDefinition, filter: &CvrFilter) -> Vec<ContestId> {
    let matching_styles: Vec<_> = definition
        .ballot_styles
        .iter()
        .filter(|ballot_style| {
            filter.matches_ballot_style(&ballot_style.id)
                && filter.matches_party(ballot_style.party_id.as_ref())
                && ballot_style
                    .precinct_ids
                    .iter()
                    .any(|precinct_id| filter.matches_precinct(precinct_id))
        })
        .collect();

    definition
        .contests
        .iter()
        .filter(|contest| {
            matching_styles.iter().any(|ballot_style| {
                ballot_style.district_ids.contains(contest.district_id())
                    && match contest.party_id() {
                        Some(party_id) => ballot_style.party_id.as_ref() == Some(party_id),
                        None => true,
                    }
            })
        })
        .map(|contest| contest.id().clone())
        .collect()
}
