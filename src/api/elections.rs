use mongodb::{
    bson::doc,
    options::{FindOneOptions, FindOptions},
    Client,
};
use rocket::{futures::TryStreamExt, serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    model::{
        api::election::{ElectionDescription, ElectionPatch, ElectionSpec},
        auth::{AccessToken, AdminToken},
        db::{
            election::{Election, NewElection},
            vote::Vote,
        },
        mongodb::{is_duplicate_key_error, title_collation, Coll, Id},
    },
};

use super::{parse_id, response::ApiResponse};

pub fn routes() -> Vec<Route> {
    routes![
        create_election,
        list_elections,
        get_election,
        update_election,
        delete_election,
    ]
}

#[post("/elections", data = "<spec>", format = "json")]
async fn create_election(
    _token: AdminToken,
    spec: Json<ElectionSpec>,
    elections: Coll<Election>,
    new_elections: Coll<NewElection>,
) -> Result<ApiResponse<ElectionDescription>> {
    let election = spec.into_inner().into_election();
    election.validate()?;

    // Friendly pre-check; the unique title index is the actual guarantee.
    if find_by_title(&elections, &election.title, None)
        .await?
        .is_some()
    {
        return Err(Error::conflict("An election with this title already exists"));
    }

    let id: Id = match new_elections.insert_one(&election, None).await {
        Ok(result) => result
            .inserted_id
            .as_object_id()
            .unwrap() // Safe because the ID comes directly from the database.
            .into(),
        Err(err) if is_duplicate_key_error(&err) => {
            return Err(Error::conflict("An election with this title already exists"));
        }
        Err(err) => return Err(err.into()),
    };

    let election = Election { id, election };
    Ok(ApiResponse::created(
        election.into(),
        "Election created successfully",
    ))
}

#[get("/elections")]
async fn list_elections(
    _token: AccessToken,
    elections: Coll<Election>,
) -> Result<ApiResponse<Vec<ElectionDescription>>> {
    let newest_first = FindOptions::builder()
        .sort(doc! { "created_at": -1 })
        .build();
    let elections: Vec<Election> = elections
        .find(None, newest_first)
        .await?
        .try_collect()
        .await?;

    Ok(ApiResponse::ok(
        elections.into_iter().map(Into::into).collect(),
        "Elections fetched successfully",
    ))
}

#[get("/elections/<election_id>")]
async fn get_election(
    _token: AccessToken,
    election_id: &str,
    elections: Coll<Election>,
) -> Result<ApiResponse<ElectionDescription>> {
    let id = parse_id(election_id, "election")?;
    let election = elections
        .find_one(id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found("Election not found"))?;

    Ok(ApiResponse::ok(
        election.into(),
        "Election fetched successfully",
    ))
}

#[patch("/elections/<election_id>", data = "<patch>", format = "json")]
async fn update_election(
    _token: AdminToken,
    election_id: &str,
    patch: Json<ElectionPatch>,
    elections: Coll<Election>,
    new_elections: Coll<NewElection>,
) -> Result<ApiResponse<ElectionDescription>> {
    let id = parse_id(election_id, "election")?;
    let mut election = elections
        .find_one(id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found("Election not found"))?;

    // Apply the patch, then re-validate the resulting record as a whole: a
    // partial update must satisfy the same invariants as a creation.
    patch.into_inner().apply(&mut election.election);
    election.validate()?;

    if find_by_title(&elections, &election.title, Some(id))
        .await?
        .is_some()
    {
        return Err(Error::conflict("An election with this title already exists"));
    }

    let result = match new_elections
        .replace_one(id.as_doc(), &election.election, None)
        .await
    {
        Ok(result) => result,
        Err(err) if is_duplicate_key_error(&err) => {
            return Err(Error::conflict("An election with this title already exists"));
        }
        Err(err) => return Err(err.into()),
    };
    replaced(result.matched_count)?;

    Ok(ApiResponse::ok(
        election.into(),
        "Election updated successfully",
    ))
}

#[delete("/elections/<election_id>")]
async fn delete_election(
    _token: AdminToken,
    election_id: &str,
    elections: Coll<Election>,
    votes: Coll<Vote>,
    db_client: &State<Client>,
) -> Result<ApiResponse<()>> {
    let id = parse_id(election_id, "election")?;
    elections
        .find_one(id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found("Election not found"))?;

    // Candidates are embedded in the election document; votes are cascaded
    // explicitly. The transaction makes the two deletes atomic; a cast
    // committing outside the session can still land after the snapshot, so
    // sweep once more afterwards.
    let mut session = db_client.start_session(None).await?;
    session.start_transaction(None).await?;
    elections
        .delete_one_with_session(id.as_doc(), None, &mut session)
        .await?;
    votes
        .delete_many_with_session(doc! { "election_id": *id }, None, &mut session)
        .await?;
    session.commit_transaction().await?;
    votes
        .delete_many(doc! { "election_id": *id }, None)
        .await?;

    Ok(ApiResponse::ok((), "Election deleted successfully"))
}

/// Interpret a replace's matched count: zero means the record vanished
/// between the initial fetch and the write.
fn replaced(matched_count: u64) -> Result<()> {
    if matched_count == 1 {
        Ok(())
    } else {
        Err(Error::not_found("Election not found"))
    }
}

/// Find an election by title under the case-insensitive collation,
/// optionally excluding one ID (for update-in-place checks).
async fn find_by_title(
    elections: &Coll<Election>,
    title: &str,
    exclude: Option<Id>,
) -> Result<Option<Election>> {
    let mut filter = doc! { "title": title };
    if let Some(id) = exclude {
        filter.insert("_id", doc! { "$ne": *id });
    }
    let options = FindOneOptions::builder()
        .collation(title_collation())
        .build();
    Ok(elections.find_one(filter, options).await?)
}

#[cfg(test)]
mod tests {
    use rocket::http::Status;

    use super::*;

    #[test]
    fn update_of_vanished_election_is_not_found() {
        assert!(replaced(1).is_ok());
        assert_eq!(replaced(0).unwrap_err().status(), Status::NotFound);
    }
}
