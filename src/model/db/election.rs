use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::mongodb::Id;

/// Administrative election status.
///
/// This field is informational: an admin may set it, and reads surface it
/// verbatim, but vote eligibility is always decided by the time window (see
/// [`ElectionCore::derived_status`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ElectionStatus {
    Upcoming,
    Active,
    Closed,
}

/// A candidate standing in an election.
///
/// Candidates are embedded in the election document and live and die with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: Id,
    pub name: String,
    /// Position in the external ledger contract's candidate array, when the
    /// deployment mirrors this election on-chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onchain_index: Option<u32>,
}

/// Core election data, as stored in the database.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionCore {
    /// Unique (case-insensitively) across all elections.
    pub title: String,
    pub status: ElectionStatus,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub end_time: DateTime<Utc>,
    pub candidates: Vec<Candidate>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl ElectionCore {
    /// Find a candidate of this election by ID.
    pub fn candidate(&self, id: Id) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.id == id)
    }

    /// The status implied by the time window at `now`.
    ///
    /// The boundaries are eligible: a vote at exactly `start_time` or
    /// exactly `end_time` counts as in-window.
    pub fn derived_status(&self, now: DateTime<Utc>) -> ElectionStatus {
        if now < self.start_time {
            ElectionStatus::Upcoming
        } else if now > self.end_time {
            ElectionStatus::Closed
        } else {
            ElectionStatus::Active
        }
    }

    /// Validate the record's invariants.
    ///
    /// Called on the fully-assembled record, both at creation and after a
    /// partial update has been applied, so a patch can never leave an
    /// election in a state creation would have rejected.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::bad_request("Election title must not be empty"));
        }
        if self.end_time <= self.start_time {
            return Err(Error::bad_request("Election must end after it starts"));
        }
        for (i, candidate) in self.candidates.iter().enumerate() {
            if candidate.name.trim().is_empty() {
                return Err(Error::bad_request("Candidate names must not be empty"));
            }
            let duplicate = self.candidates[..i]
                .iter()
                .any(|other| other.name.eq_ignore_ascii_case(&candidate.name));
            if duplicate {
                return Err(Error::bad_request(format!(
                    "Duplicate candidate name: {}",
                    candidate.name
                )));
            }
        }
        Ok(())
    }
}

/// An election without an ID.
pub type NewElection = ElectionCore;

/// An election from the database, with its unique ID.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub election: ElectionCore,
}

impl Deref for Election {
    type Target = ElectionCore;

    fn deref(&self) -> &Self::Target {
        &self.election
    }
}

impl DerefMut for Election {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.election
    }
}

/// Example data for tests.
#[cfg(test)]
pub mod examples {
    use chrono::Duration;

    use super::*;

    impl ElectionCore {
        /// An election whose window contains `Utc::now()`.
        pub fn running_example() -> Self {
            let start_time = Utc::now() - Duration::hours(1);
            Self {
                title: "Student Union President".to_string(),
                status: ElectionStatus::Upcoming,
                start_time,
                end_time: start_time + Duration::hours(2),
                candidates: vec![
                    Candidate {
                        id: Id::new(),
                        name: "Alice".to_string(),
                        onchain_index: Some(0),
                    },
                    Candidate {
                        id: Id::new(),
                        name: "Bob".to_string(),
                        onchain_index: Some(1),
                    },
                ],
                created_at: Utc::now(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn window_is_authoritative_for_eligibility() {
        let election = ElectionCore::running_example();
        let now = Utc::now();

        // The stored status says UPCOMING, but the window says otherwise.
        assert_eq!(election.status, ElectionStatus::Upcoming);
        assert_eq!(election.derived_status(now), ElectionStatus::Active);
    }

    #[test]
    fn window_boundaries_are_inclusive() {
        let election = ElectionCore::running_example();

        assert_eq!(
            election.derived_status(election.start_time),
            ElectionStatus::Active
        );
        assert_eq!(
            election.derived_status(election.end_time),
            ElectionStatus::Active
        );
        assert_eq!(
            election.derived_status(election.start_time - Duration::seconds(1)),
            ElectionStatus::Upcoming
        );
        assert_eq!(
            election.derived_status(election.end_time + Duration::seconds(1)),
            ElectionStatus::Closed
        );
    }

    #[test]
    fn validate_accepts_well_formed() {
        assert!(ElectionCore::running_example().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_title() {
        let mut election = ElectionCore::running_example();
        election.title = "   ".to_string();
        assert!(election.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_window() {
        let mut election = ElectionCore::running_example();
        election.end_time = election.start_time;
        assert!(election.validate().is_err());

        election.end_time = election.start_time - Duration::hours(1);
        assert!(election.validate().is_err());
    }

    #[test]
    fn validate_rejects_duplicate_candidates() {
        let mut election = ElectionCore::running_example();
        election.candidates[1].name = "ALICE".to_string();
        assert!(election.validate().is_err());
    }

    #[test]
    fn validate_rejects_unnamed_candidate() {
        let mut election = ElectionCore::running_example();
        election.candidates[0].name = "".to_string();
        assert!(election.validate().is_err());
    }

    #[test]
    fn candidate_lookup() {
        let election = ElectionCore::running_example();
        let alice = election.candidates[0].id;

        assert_eq!(election.candidate(alice).unwrap().name, "Alice");
        assert!(election.candidate(Id::new()).is_none());
    }
}
