use chrono::Utc;
use mongodb::bson::doc;
use rocket::{futures::TryStreamExt, serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    ledger::Mirror,
    model::{
        api::vote::{tally, BallotSpec, CandidateTally, MyVote, VoteReceipt},
        auth::AccessToken,
        db::{
            election::{Election, ElectionStatus},
            vote::{NewVote, Vote},
        },
        mongodb::{is_duplicate_key_error, Coll, Id},
    },
};

use super::{parse_id, response::ApiResponse};

pub fn routes() -> Vec<Route> {
    routes![cast_vote, get_results, my_vote]
}

#[post("/votes/<election_id>", data = "<ballot>", format = "json")]
async fn cast_vote(
    token: AccessToken,
    election_id: &str,
    ballot: Json<BallotSpec>,
    elections: Coll<Election>,
    votes: Coll<Vote>,
    new_votes: Coll<NewVote>,
    mirror: &State<Mirror>,
) -> Result<ApiResponse<VoteReceipt>> {
    let election_id = parse_id(election_id, "election")?;
    let candidate_id = parse_id(&ballot.candidate_id, "candidate")?;

    let election = elections
        .find_one(election_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found("Election not found"))?;

    // The time window, not the stored status, decides eligibility.
    match election.derived_status(Utc::now()) {
        ElectionStatus::Upcoming => {
            return Err(Error::bad_request("Election has not started yet"));
        }
        ElectionStatus::Closed => return Err(Error::bad_request("Election has ended")),
        ElectionStatus::Active => {}
    }

    let candidate = election
        .candidate(candidate_id)
        .ok_or_else(|| Error::not_found("Candidate not found in this election"))?;

    // Fast, friendly duplicate check. Two concurrent casts can both pass it,
    // which is why the insert below relies on the unique index instead.
    let already_cast = doc! { "election_id": *election_id, "user_id": *token.user_id };
    if votes.find_one(already_cast, None).await?.is_some() {
        return Err(Error::conflict("You have already voted in this election"));
    }

    let vote = NewVote::new(election_id, candidate_id, token.user_id);
    let vote_id: Id = match new_votes.insert_one(&vote, None).await {
        Ok(result) => result
            .inserted_id
            .as_object_id()
            .unwrap() // Safe because the ID comes directly from the database.
            .into(),
        Err(err) if is_duplicate_key_error(&err) => {
            return Err(Error::conflict("You have already voted in this election"));
        }
        Err(err) => return Err(err.into()),
    };

    // The local vote is committed; everything from here is best-effort and
    // must not affect the 201.
    let onchain = mirror.mirror_vote(candidate).await;

    Ok(ApiResponse::created(
        VoteReceipt {
            vote_id: vote_id.to_string(),
            candidate_id: candidate_id.to_string(),
            onchain,
        },
        "Vote cast successfully",
    ))
}

#[get("/votes/<election_id>/results")]
async fn get_results(
    _token: AccessToken,
    election_id: &str,
    elections: Coll<Election>,
    votes: Coll<Vote>,
) -> Result<ApiResponse<Vec<CandidateTally>>> {
    let election_id = parse_id(election_id, "election")?;
    // Reads never 404: an unknown election answers with an empty tally, the
    // same as one with no candidates.
    let candidates = elections
        .find_one(election_id.as_doc(), None)
        .await?
        .map(|election| election.election.candidates)
        .unwrap_or_default();

    let votes: Vec<Vote> = votes
        .find(doc! { "election_id": *election_id }, None)
        .await?
        .try_collect()
        .await?;

    Ok(ApiResponse::ok(
        tally(&candidates, &votes),
        "Election results fetched successfully",
    ))
}

#[get("/votes/<election_id>/my-vote")]
async fn my_vote(
    token: AccessToken,
    election_id: &str,
    elections: Coll<Election>,
    votes: Coll<Vote>,
) -> Result<ApiResponse<Option<MyVote>>> {
    let election_id = parse_id(election_id, "election")?;
    // Reads never 404: no vote in an unknown election is just no vote.
    let election = elections.find_one(election_id.as_doc(), None).await?;

    let vote = votes
        .find_one(
            doc! { "election_id": *election_id, "user_id": *token.user_id },
            None,
        )
        .await?;

    let my_vote = vote.map(|vote| MyVote {
        candidate_id: vote.candidate_id.to_string(),
        name: election
            .as_ref()
            .and_then(|election| election.candidate(vote.candidate_id))
            .map(|candidate| candidate.name.clone())
            .unwrap_or_default(),
    });

    Ok(ApiResponse::ok(my_vote, "Vote fetched successfully"))
}
