use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::db::election::{Candidate, Election, ElectionCore, ElectionStatus, NewElection};
use crate::model::mongodb::Id;

/// An election specification, as submitted by an admin.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionSpec {
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub candidates: Vec<CandidateSpec>,
}

impl ElectionSpec {
    /// Convert this spec into a storable election with generated candidate
    /// IDs. The result still needs [`ElectionCore::validate`].
    pub fn into_election(self) -> NewElection {
        NewElection {
            title: self.title.trim().to_string(),
            status: ElectionStatus::Upcoming,
            start_time: self.start_time,
            end_time: self.end_time,
            candidates: self
                .candidates
                .into_iter()
                .map(CandidateSpec::into_candidate)
                .collect(),
            created_at: Utc::now(),
        }
    }
}

/// A candidate specification within an election spec.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSpec {
    pub name: String,
    pub onchain_index: Option<u32>,
}

impl CandidateSpec {
    fn into_candidate(self) -> Candidate {
        Candidate {
            id: Id::new(),
            name: self.name.trim().to_string(),
            onchain_index: self.onchain_index,
        }
    }
}

/// A partial update to an election. Absent fields are left unchanged; the
/// patched record is re-validated as a whole before being committed.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionPatch {
    pub title: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: Option<ElectionStatus>,
    pub candidates: Option<Vec<CandidateSpec>>,
}

impl ElectionPatch {
    /// Apply this patch to an existing election record.
    pub fn apply(self, election: &mut ElectionCore) {
        if let Some(title) = self.title {
            election.title = title.trim().to_string();
        }
        if let Some(start_time) = self.start_time {
            election.start_time = start_time;
        }
        if let Some(end_time) = self.end_time {
            election.end_time = end_time;
        }
        if let Some(status) = self.status {
            election.status = status;
        }
        if let Some(candidates) = self.candidates {
            election.candidates = candidates
                .into_iter()
                .map(CandidateSpec::into_candidate)
                .collect();
        }
    }
}

/// An election as presented to API callers.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionDescription {
    pub id: String,
    pub title: String,
    pub status: ElectionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub candidates: Vec<CandidateDescription>,
    pub created_at: DateTime<Utc>,
}

impl From<Election> for ElectionDescription {
    fn from(election: Election) -> Self {
        Self {
            id: election.id.to_string(),
            title: election.election.title,
            status: election.election.status,
            start_time: election.election.start_time,
            end_time: election.election.end_time,
            candidates: election
                .election
                .candidates
                .into_iter()
                .map(Into::into)
                .collect(),
            created_at: election.election.created_at,
        }
    }
}

/// A candidate as presented to API callers.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateDescription {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onchain_index: Option<u32>,
}

impl From<Candidate> for CandidateDescription {
    fn from(candidate: Candidate) -> Self {
        Self {
            id: candidate.id.to_string(),
            name: candidate.name,
            onchain_index: candidate.onchain_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn spec() -> ElectionSpec {
        let start_time = Utc::now() + Duration::days(1);
        ElectionSpec {
            title: "  Board Election 2026  ".to_string(),
            start_time,
            end_time: start_time + Duration::days(2),
            candidates: vec![
                CandidateSpec {
                    name: "Alice".to_string(),
                    onchain_index: Some(0),
                },
                CandidateSpec {
                    name: "Bob".to_string(),
                    onchain_index: None,
                },
            ],
        }
    }

    #[test]
    fn spec_into_election() {
        let election = spec().into_election();

        assert_eq!(election.title, "Board Election 2026");
        assert_eq!(election.status, ElectionStatus::Upcoming);
        assert_eq!(election.candidates.len(), 2);
        assert_eq!(election.candidates[0].onchain_index, Some(0));
        assert!(election.validate().is_ok());
    }

    #[test]
    fn candidate_ids_are_unique() {
        let election = spec().into_election();
        assert_ne!(election.candidates[0].id, election.candidates[1].id);
    }

    #[test]
    fn patch_applies_only_present_fields() {
        let mut election = spec().into_election();
        let original_start = election.start_time;

        let patch = ElectionPatch {
            title: Some("Renamed".to_string()),
            status: Some(ElectionStatus::Active),
            ..Default::default()
        };
        patch.apply(&mut election);

        assert_eq!(election.title, "Renamed");
        assert_eq!(election.status, ElectionStatus::Active);
        assert_eq!(election.start_time, original_start);
        assert_eq!(election.candidates.len(), 2);
    }

    #[test]
    fn patch_cannot_bypass_validation() {
        let mut election = spec().into_election();

        let patch = ElectionPatch {
            end_time: Some(election.start_time - Duration::hours(1)),
            ..Default::default()
        };
        patch.apply(&mut election);

        // The route validates the patched record and must reject this.
        assert!(election.validate().is_err());
    }
}
