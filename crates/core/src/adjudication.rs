use serde::{Deserialize, Serialize};

use crate::cvr::BallotSide;
use crate::filter::GroupSpecifier;
use crate::ids::*;

/// Adjudication state of one write-in mark. The three decided outcomes are
/// mutually exclusive by construction; re-adjudication replaces the whole
/// value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteInAdjudication {
    Pending,
    /// A mark that is not a valid vote for anyone (stray ink, a repeated
    /// official candidate, an illegible name).
    Invalid,
    /// The voter wrote in a candidate who is already on the ballot.
    OfficialCandidate(CandidateId),
    /// The voter wrote in an ad hoc candidate created during adjudication.
    WriteInCandidate(WriteInCandidateId),
}

impl WriteInAdjudication {
    pub fn is_pending(&self) -> bool {
        matches!(self, WriteInAdjudication::Pending)
    }
}

/// One write-in mark as stored, in ingestion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteInRecord {
    pub id: WriteInId,
    pub cvr_id: CvrId,
    pub contest_id: ContestId,
    pub option_id: OptionId,
    pub side: Option<BallotSide>,
    pub adjudication: WriteInAdjudication,
    /// Unix millis of the most recent decision, `None` while pending.
    pub adjudicated_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteInCandidateRecord {
    pub id: WriteInCandidateId,
    pub contest_id: ContestId,
    pub name: String,
}

/// Per-contest queue counts for the review workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteInQueueMetadata {
    pub contest_id: ContestId,
    pub total: u32,
    pub pending: u32,
}

/// One grouped, classified write-in count. Rows with equal `group` and
/// `contest_id` partition that group's write-ins by adjudication outcome,
/// which is exactly the shape the combination engine needs to reclassify the
/// generic write-in bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupedWriteInTally {
    pub group: GroupSpecifier,
    pub contest_id: ContestId,
    pub outcome: WriteInTallyOutcome,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteInTallyOutcome {
    Pending,
    Invalid,
    OfficialCandidate {
        candidate_id: CandidateId,
    },
    WriteInCandidate {
        candidate_id: WriteInCandidateId,
        name: String,
    },
}
