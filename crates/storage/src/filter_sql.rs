use rusqlite::types::Value;

use tallyvault_core::filter::{CvrFilter, GroupBy, GroupSpecifier};
use tallyvault_core::cvr::VotingMethod;
use tallyvault_core::ids::*;

use crate::error::StorageError;

/// Join clause shared by every CVR-shaped query: ballot styles supply the
/// party dimension and scanner batches supply the scanner dimension.
pub(crate) const CVR_JOINS: &str = "
    INNER JOIN ballot_styles bs
        ON bs.election_id = c.election_id AND bs.ballot_style_id = c.ballot_style_id
    INNER JOIN scanner_batches sb
        ON sb.election_id = c.election_id AND sb.batch_id = c.batch_id";

/// Rendered WHERE fragment plus its positional parameters. Conditions are
/// ANDed onto the caller's election predicate.
pub(crate) struct FilterClause {
    pub sql: String,
    pub params: Vec<Value>,
}

fn in_list(sql: &mut String, params: &mut Vec<Value>, column: &str, values: Vec<String>) {
    // A present-but-empty value set matches nothing. This is not the same as
    // an absent field, which adds no condition at all.
    if values.is_empty() {
        sql.push_str(" AND 0");
        return;
    }
    sql.push_str(" AND ");
    sql.push_str(column);
    sql.push_str(" IN (");
    for (i, value) in values.into_iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push('?');
        params.push(Value::Text(value));
    }
    sql.push(')');
}

pub(crate) fn cvr_filter_clause(filter: &CvrFilter) -> FilterClause {
    let mut sql = String::new();
    let mut params = Vec::new();

    if let Some(precinct_ids) = &filter.precinct_ids {
        in_list(
            &mut sql,
            &mut params,
            "c.precinct_id",
            precinct_ids.iter().map(|id| id.as_str().to_string()).collect(),
        );
    }
    if let Some(party_ids) = &filter.party_ids {
        in_list(
            &mut sql,
            &mut params,
            "bs.party_id",
            party_ids.iter().map(|id| id.as_str().to_string()).collect(),
        );
    }
    if let Some(ballot_style_ids) = &filter.ballot_style_ids {
        in_list(
            &mut sql,
            &mut params,
            "c.ballot_style_id",
            ballot_style_ids.iter().map(|id| id.as_str().to_string()).collect(),
        );
    }
    if let Some(voting_methods) = &filter.voting_methods {
        in_list(
            &mut sql,
            &mut params,
            "c.voting_method",
            voting_methods.iter().map(|m| m.as_str().to_string()).collect(),
        );
    }
    if let Some(batch_ids) = &filter.batch_ids {
        in_list(
            &mut sql,
            &mut params,
            "c.batch_id",
            batch_ids.iter().map(|id| id.as_str().to_string()).collect(),
        );
    }
    if let Some(scanner_ids) = &filter.scanner_ids {
        in_list(
            &mut sql,
            &mut params,
            "sb.scanner_id",
            scanner_ids.iter().map(|id| id.as_str().to_string()).collect(),
        );
    }

    FilterClause { sql, params }
}

/// Grouping dimensions in a fixed order, as SQL select expressions. The same
/// column list is used by card tallies and write-in tallies so their group
/// keys line up exactly when the combination engine joins them.
pub(crate) fn group_columns(group_by: &GroupBy) -> Vec<(&'static str, GroupDimension)> {
    let mut columns = Vec::new();
    if group_by.precinct {
        columns.push(("c.precinct_id", GroupDimension::Precinct));
    }
    if group_by.party {
        columns.push(("bs.party_id", GroupDimension::Party));
    }
    if group_by.ballot_style {
        columns.push(("c.ballot_style_id", GroupDimension::BallotStyle));
    }
    if group_by.voting_method {
        columns.push(("c.voting_method", GroupDimension::VotingMethod));
    }
    if group_by.batch {
        columns.push(("c.batch_id", GroupDimension::Batch));
    }
    if group_by.scanner {
        columns.push(("sb.scanner_id", GroupDimension::Scanner));
    }
    columns
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum GroupDimension {
    Precinct,
    Party,
    BallotStyle,
    VotingMethod,
    Batch,
    Scanner,
}

/// Decode one row's leading group columns into a `GroupSpecifier`.
pub(crate) fn read_group(
    row: &rusqlite::Row,
    columns: &[(&'static str, GroupDimension)],
) -> Result<GroupSpecifier, StorageError> {
    let mut spec = GroupSpecifier::default();
    for (index, (_, dimension)) in columns.iter().enumerate() {
        let value: Option<String> = row.get(index)?;
        match dimension {
            GroupDimension::Precinct => spec.precinct_id = value.map(PrecinctId::from),
            GroupDimension::Party => spec.party_id = value.map(PartyId::from),
            GroupDimension::BallotStyle => spec.ballot_style_id = value.map(BallotStyleId::from),
            GroupDimension::VotingMethod => {
                spec.voting_method = match value {
                    Some(s) => Some(VotingMethod::from_str(&s)?),
                    None => None,
                }
            }
            GroupDimension::Batch => spec.batch_id = value.map(BatchId::from),
            GroupDimension::Scanner => spec.scanner_id = value.map(ScannerId::from),
        }
    }
    Ok(spec)
}
