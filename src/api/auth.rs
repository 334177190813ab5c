use mongodb::bson::doc;
use rocket::{
    http::{Cookie, CookieJar},
    serde::json::Json,
    Route, State,
};

use crate::{
    error::{Error, Result},
    model::{
        api::auth::{
            AccessTokenResponse, LoginRequest, LoginResponse, RefreshRequest, RegisterRequest,
            UserResponse,
        },
        auth::{AccessToken, RefreshToken, REFRESH_TOKEN_COOKIE},
        db::user::{normalize_email, NewUser, User},
        mongodb::{is_duplicate_key_error, Coll, Id},
    },
    Config,
};

use super::response::ApiResponse;

/// Login failures are deliberately indistinguishable: an unknown email and a
/// wrong password yield the same message, so callers cannot enumerate users.
const INVALID_CREDENTIALS: &str = "Invalid email or password";

pub fn routes() -> Vec<Route> {
    routes![register, login, refresh_token, logout, me]
}

#[post("/auth/register", data = "<request>", format = "json")]
async fn register(
    request: Json<RegisterRequest>,
    users: Coll<User>,
    new_users: Coll<NewUser>,
) -> Result<ApiResponse<UserResponse>> {
    let request = request.into_inner();
    request.validate()?;

    let email = normalize_email(&request.email);

    // Friendly pre-check; the unique email index is the actual guarantee.
    if users.find_one(doc! { "email": &email }, None).await?.is_some() {
        return Err(Error::conflict("User already exists"));
    }

    let user = NewUser::new(request.name.trim().to_string(), email, &request.password)?;
    let id: Id = match new_users.insert_one(&user, None).await {
        Ok(result) => result
            .inserted_id
            .as_object_id()
            .unwrap() // Safe because the ID comes directly from the database.
            .into(),
        Err(err) if is_duplicate_key_error(&err) => {
            return Err(Error::conflict("User already exists"));
        }
        Err(err) => return Err(err.into()),
    };

    let user = User { id, user };
    Ok(ApiResponse::created(
        user.into(),
        "User registered successfully",
    ))
}

#[post("/auth/login", data = "<request>", format = "json")]
async fn login(
    request: Json<LoginRequest>,
    cookies: &CookieJar<'_>,
    users: Coll<User>,
    config: &State<Config>,
) -> Result<ApiResponse<LoginResponse>> {
    let request = request.into_inner();
    if request.email.trim().is_empty() || request.password.is_empty() {
        return Err(Error::bad_request("Email and password are required"));
    }

    let email = normalize_email(&request.email);
    let user = users
        .find_one(doc! { "email": &email }, None)
        .await?
        .filter(|user| user.verify_password(&request.password))
        .ok_or_else(|| Error::unauthorized(INVALID_CREDENTIALS))?;

    let access_token = AccessToken::issue(&user, config)?;
    let refresh = RefreshToken::issue(user.id, config)?;
    cookies.add(RefreshToken::into_cookie(refresh, config));

    Ok(ApiResponse::ok(
        LoginResponse {
            user: user.into(),
            access_token,
        },
        "Login successful",
    ))
}

#[post("/auth/refresh-token", data = "<request>")]
async fn refresh_token(
    request: Option<Json<RefreshRequest>>,
    cookies: &CookieJar<'_>,
    users: Coll<User>,
    config: &State<Config>,
) -> Result<ApiResponse<AccessTokenResponse>> {
    let token = cookies
        .get(REFRESH_TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .or_else(|| request.and_then(|body| body.into_inner().refresh_token))
        .ok_or_else(|| Error::unauthorized("Missing refresh token"))?;

    let user_id = RefreshToken::verify(&token, config)?;

    // Re-fetch the user: a deleted account or a changed role must not ride
    // on a stale claim.
    let user = users
        .find_one(user_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::unauthorized("Invalid refresh token"))?;

    let access_token = AccessToken::issue(&user, config)?;
    let refresh = RefreshToken::issue(user.id, config)?;
    cookies.add(RefreshToken::into_cookie(refresh, config));

    Ok(ApiResponse::ok(
        AccessTokenResponse { access_token },
        "Access token refreshed",
    ))
}

#[post("/auth/logout")]
fn logout(_token: AccessToken, cookies: &CookieJar<'_>) -> ApiResponse<()> {
    cookies.remove(Cookie::named(REFRESH_TOKEN_COOKIE));
    ApiResponse::ok((), "Logged out successfully")
}

#[get("/auth/me")]
async fn me(token: AccessToken, users: Coll<User>) -> Result<ApiResponse<UserResponse>> {
    let user = users
        .find_one(token.user_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::unauthorized("Invalid access token"))?;

    Ok(ApiResponse::ok(
        user.into(),
        "Current user fetched successfully",
    ))
}
