use serde::{Deserialize, Serialize};

use crate::ledger::MirrorOutcome;
use crate::model::db::{election::Candidate, vote::Vote};

/// Body of `POST /votes/<election_id>`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallotSpec {
    pub candidate_id: String,
}

/// Payload of a successful vote cast. The `onchain` sub-result reports the
/// best-effort mirror write; it is absent when mirroring is disabled or the
/// candidate has no on-chain index.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteReceipt {
    pub vote_id: String,
    pub candidate_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onchain: Option<MirrorOutcome>,
}

/// One row of an election tally.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateTally {
    pub candidate_id: String,
    pub name: String,
    pub vote_count: u64,
    pub vote_percent: f64,
}

/// The caller's own vote, if any.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MyVote {
    pub candidate_id: String,
    pub name: String,
}

/// Tally the given votes against the election's candidate list.
///
/// Every candidate appears, zero-vote candidates at count 0. Percentages are
/// taken over the counted votes (0 when there are none, never a division by
/// zero). Rows are ordered by count descending; the sort is stable, so ties
/// keep the candidates' insertion order.
pub fn tally(candidates: &[Candidate], votes: &[Vote]) -> Vec<CandidateTally> {
    let mut tallies: Vec<CandidateTally> = candidates
        .iter()
        .map(|candidate| {
            let vote_count = votes
                .iter()
                .filter(|vote| vote.candidate_id == candidate.id)
                .count() as u64;
            CandidateTally {
                candidate_id: candidate.id.to_string(),
                name: candidate.name.clone(),
                vote_count,
                vote_percent: 0.0,
            }
        })
        .collect();

    let total: u64 = tallies.iter().map(|t| t.vote_count).sum();
    if total > 0 {
        for t in &mut tallies {
            t.vote_percent = t.vote_count as f64 * 100.0 / total as f64;
        }
    }

    tallies.sort_by(|a, b| b.vote_count.cmp(&a.vote_count));
    tallies
}

#[cfg(test)]
mod tests {
    use crate::model::db::{election::ElectionCore, vote::VoteCore};
    use crate::model::mongodb::Id;

    use super::*;

    fn vote_for(election_id: Id, candidate_id: Id) -> Vote {
        Vote {
            id: Id::new(),
            vote: VoteCore::new(election_id, candidate_id, Id::new()),
        }
    }

    #[test]
    fn empty_election_tallies_to_zero() {
        let election = ElectionCore::running_example();
        let tallies = tally(&election.candidates, &[]);

        assert_eq!(tallies.len(), 2);
        for t in &tallies {
            assert_eq!(t.vote_count, 0);
            assert_eq!(t.vote_percent, 0.0);
        }
    }

    #[test]
    fn no_candidates_tallies_to_empty() {
        // The shape an unknown election's results take: no candidate list,
        // so an empty tally regardless of any stray votes.
        assert!(tally(&[], &[]).is_empty());
        assert!(tally(&[], &[vote_for(Id::new(), Id::new())]).is_empty());
    }

    #[test]
    fn zero_vote_candidates_still_appear() {
        let election = ElectionCore::running_example();
        let election_id = Id::new();
        let alice = election.candidates[0].id;

        let votes = vec![vote_for(election_id, alice)];
        let tallies = tally(&election.candidates, &votes);

        assert_eq!(tallies.len(), 2);
        assert_eq!(tallies[0].name, "Alice");
        assert_eq!(tallies[0].vote_count, 1);
        assert_eq!(tallies[1].name, "Bob");
        assert_eq!(tallies[1].vote_count, 0);
    }

    #[test]
    fn counts_sum_and_percentages_total_100() {
        let election = ElectionCore::running_example();
        let election_id = Id::new();
        let alice = election.candidates[0].id;
        let bob = election.candidates[1].id;

        let mut votes = Vec::new();
        for _ in 0..3 {
            votes.push(vote_for(election_id, alice));
        }
        votes.push(vote_for(election_id, bob));

        let tallies = tally(&election.candidates, &votes);

        let total: u64 = tallies.iter().map(|t| t.vote_count).sum();
        assert_eq!(total, 4);
        assert_eq!(tallies[0].vote_count, 3);
        assert_eq!(tallies[0].vote_percent, 75.0);
        assert_eq!(tallies[1].vote_percent, 25.0);

        let percent_sum: f64 = tallies.iter().map(|t| t.vote_percent).sum();
        assert!((percent_sum - 100.0).abs() < 1e-9);
    }

    #[test]
    fn ordered_by_count_descending() {
        let election = ElectionCore::running_example();
        let election_id = Id::new();
        let bob = election.candidates[1].id;

        let votes = vec![vote_for(election_id, bob)];
        let tallies = tally(&election.candidates, &votes);

        assert_eq!(tallies[0].name, "Bob");
        assert_eq!(tallies[1].name, "Alice");
    }

    #[test]
    fn ties_keep_candidate_order() {
        let election = ElectionCore::running_example();
        let election_id = Id::new();
        let alice = election.candidates[0].id;
        let bob = election.candidates[1].id;

        let votes = vec![vote_for(election_id, alice), vote_for(election_id, bob)];
        let tallies = tally(&election.candidates, &votes);

        assert_eq!(tallies[0].name, "Alice");
        assert_eq!(tallies[0].vote_count, 1);
        assert_eq!(tallies[0].vote_percent, 50.0);
        assert_eq!(tallies[1].name, "Bob");
        assert_eq!(tallies[1].vote_count, 1);
        assert_eq!(tallies[1].vote_percent, 50.0);
    }

    #[test]
    fn votes_for_removed_candidates_are_not_counted() {
        let election = ElectionCore::running_example();
        let election_id = Id::new();
        let alice = election.candidates[0].id;

        let votes = vec![
            vote_for(election_id, alice),
            // Candidate no longer in the election (removed by a patch).
            vote_for(election_id, Id::new()),
        ];
        let tallies = tally(&election.candidates, &votes);

        let total: u64 = tallies.iter().map(|t| t.vote_count).sum();
        assert_eq!(total, 1);
        assert_eq!(tallies[0].vote_percent, 100.0);
    }
}
