use std::collections::BTreeMap;

use rusqlite::types::Value;

use tallyvault_core::adjudication::{GroupedWriteInTally, WriteInTallyOutcome};
use tallyvault_core::filter::{CvrFilter, GroupBy, GroupSpecifier};
use tallyvault_core::ids::*;
use tallyvault_core::results::CardCounts;

use crate::error::StorageError;
use crate::filter_sql::{CVR_JOINS, cvr_filter_clause, group_columns, read_group};
use crate::store::{Store, read_uuid};

impl Store {
    /// Physical card counts per group: machine-marked cards under `bmd`,
    /// hand-marked cards per sheet number under `hmpb`. Grouping keys are
    /// identical to `write_in_tallies` so the two can be joined.
    pub fn card_counts(
        &self,
        election_id: ElectionId,
        group_by: &GroupBy,
        filter: &CvrFilter,
    ) -> Result<Vec<(GroupSpecifier, CardCounts)>, StorageError> {
        let columns = group_columns(group_by);
        let clause = cvr_filter_clause(filter);

        let mut select = String::new();
        let mut group_clause = String::new();
        for (expr, _) in &columns {
            select.push_str(expr);
            select.push_str(", ");
            if !group_clause.is_empty() {
                group_clause.push_str(", ");
            }
            group_clause.push_str(expr);
        }
        let sql = format!(
            "SELECT {select}c.sheet_number, COUNT(*)
             FROM cvrs c{CVR_JOINS}
             WHERE c.election_id = ?1{}
             GROUP BY {}c.sheet_number",
            clause.sql,
            if group_clause.is_empty() {
                String::new()
            } else {
                format!("{group_clause}, ")
            },
        );

        let mut params = Vec::with_capacity(clause.params.len() + 1);
        params.push(Value::Blob(election_id.as_uuid().as_bytes().to_vec()));
        params.extend(clause.params);

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(params))?;

        let mut counts: BTreeMap<GroupSpecifier, CardCounts> = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let group = read_group(row, &columns)?;
            let sheet_number: Option<u32> = row.get(columns.len())?;
            let count: u32 = row.get(columns.len() + 1)?;
            let entry = counts.entry(group).or_default();
            match sheet_number {
                None => entry.bmd += count,
                Some(sheet) => entry.add_hmpb(sheet, count),
            }
        }
        Ok(counts.into_iter().collect())
    }

    /// Write-in counts per group and contest, classified by adjudication
    /// outcome. A pure read over current adjudication state; the write-in
    /// rows remain the source of truth.
    pub fn write_in_tallies(
        &self,
        election_id: ElectionId,
        group_by: &GroupBy,
        filter: &CvrFilter,
    ) -> Result<Vec<GroupedWriteInTally>, StorageError> {
        let columns = group_columns(group_by);
        let clause = cvr_filter_clause(filter);

        let mut select = String::new();
        let mut group_clause = String::new();
        for (expr, _) in &columns {
            select.push_str(expr);
            select.push_str(", ");
            group_clause.push_str(expr);
            group_clause.push_str(", ");
        }
        let sql = format!(
            "SELECT {select}w.contest_id, w.is_invalid, w.official_candidate_id,
                    w.write_in_candidate_id, wc.name, COUNT(*)
             FROM write_ins w
             INNER JOIN cvrs c ON c.cvr_id = w.cvr_id{CVR_JOINS}
             LEFT JOIN write_in_candidates wc
                 ON wc.write_in_candidate_id = w.write_in_candidate_id
             WHERE c.election_id = ?1{}
             GROUP BY {group_clause}w.contest_id, w.is_invalid, w.official_candidate_id,
                      w.write_in_candidate_id",
            clause.sql,
        );

        let mut params = Vec::with_capacity(clause.params.len() + 1);
        params.push(Value::Blob(election_id.as_uuid().as_bytes().to_vec()));
        params.extend(clause.params);

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(params))?;

        let mut tallies = Vec::new();
        while let Some(row) = rows.next()? {
            let group = read_group(row, &columns)?;
            let base = columns.len();
            let contest_id: String = row.get(base)?;
            let is_invalid: bool = row.get(base + 1)?;
            let official_candidate_id: Option<String> = row.get(base + 2)?;
            let write_in_candidate_id: Option<Vec<u8>> = row.get(base + 3)?;
            let candidate_name: Option<String> = row.get(base + 4)?;
            let count: u32 = row.get(base + 5)?;

            let outcome = if is_invalid {
                WriteInTallyOutcome::Invalid
            } else if let Some(candidate_id) = official_candidate_id {
                WriteInTallyOutcome::OfficialCandidate {
                    candidate_id: CandidateId::from(candidate_id),
                }
            } else if let Some(bytes) = write_in_candidate_id {
                WriteInTallyOutcome::WriteInCandidate {
                    candidate_id: WriteInCandidateId::from_uuid(read_uuid(
                        bytes,
                        "write_in_candidate_id",
                    )?),
                    name: candidate_name.unwrap_or_default(),
                }
            } else {
                WriteInTallyOutcome::Pending
            };

            tallies.push(GroupedWriteInTally {
                group,
                contest_id: ContestId::from(contest_id),
                outcome,
                count,
            });
        }
        Ok(tallies)
    }
}
