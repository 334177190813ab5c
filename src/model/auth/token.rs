use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rocket::{
    http::{Cookie, SameSite, Status},
    outcome::try_outcome,
    request::{self, FromRequest},
    Request, State,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::db::user::{Role, User};
use crate::model::mongodb::Id;
use crate::Config;

/// Name of the refresh-token cookie.
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// A verified access token: proof of identity and role for the lifetime of
/// one request. Obtained as a request guard from the `Authorization: Bearer`
/// header; any route that takes one requires a logged-in caller.
#[derive(Debug, Clone, Copy)]
pub struct AccessToken {
    pub user_id: Id,
    pub role: Role,
}

/// The signed claims of an access token.
#[derive(Debug, Serialize, Deserialize)]
struct AccessClaims {
    sub: String,
    role: Role,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

impl AccessToken {
    /// Issue a short-lived signed access token for the given user.
    pub fn issue(user: &User, config: &Config) -> Result<String> {
        let claims = AccessClaims {
            sub: user.id.to_string(),
            role: user.role,
            expire_at: Utc::now() + config.access_ttl(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.access_secret()),
        )?;
        Ok(token)
    }

    /// Verify a token's signature and expiry and extract the identity.
    ///
    /// Deliberately collapses every failure mode into the same generic
    /// `Unauthorized`.
    pub fn verify(token: &str, config: &Config) -> Result<Self> {
        let claims = decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(config.access_secret()),
            &Validation::default(),
        )
        .map_err(|_| Error::unauthorized("Invalid access token"))?
        .claims;
        let user_id = claims
            .sub
            .parse()
            .map_err(|_| Error::unauthorized("Invalid access token"))?;
        Ok(Self {
            user_id,
            role: claims.role,
        })
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AccessToken {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        // Valid as `Config` is always managed.
        let config = req.guard::<&State<Config>>().await.unwrap();

        let bearer = req
            .headers()
            .get_one("Authorization")
            .and_then(|header| header.strip_prefix("Bearer "));
        let bearer = match bearer {
            Some(token) => token,
            None => return request::Outcome::Failure((Status::Unauthorized, ())),
        };

        match Self::verify(bearer, config) {
            Ok(token) => request::Outcome::Success(token),
            Err(_) => request::Outcome::Failure((Status::Unauthorized, ())),
        }
    }
}

/// An access token whose bearer holds the ADMIN role.
///
/// Guarding a route with this type is the role check: a valid token without
/// sufficient privileges fails with 403 before the handler runs.
#[derive(Debug, Clone, Copy)]
pub struct AdminToken(pub AccessToken);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminToken {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let token = try_outcome!(req.guard::<AccessToken>().await);
        if token.role.permits(Role::Admin) {
            request::Outcome::Success(Self(token))
        } else {
            request::Outcome::Failure((Status::Forbidden, ()))
        }
    }
}

/// Issuing and verifying of long-lived refresh tokens.
///
/// Refresh tokens carry identity only (no role): the role is re-fetched from
/// the user record at rotation time, so a stale claim can never restore
/// revoked privileges.
pub struct RefreshToken;

/// The signed claims of a refresh token.
#[derive(Debug, Serialize, Deserialize)]
struct RefreshClaims {
    sub: String,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

impl RefreshToken {
    /// Issue a long-lived signed refresh token for the given user ID.
    pub fn issue(user_id: Id, config: &Config) -> Result<String> {
        let claims = RefreshClaims {
            sub: user_id.to_string(),
            expire_at: Utc::now() + config.refresh_ttl(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.refresh_secret()),
        )?;
        Ok(token)
    }

    /// Verify a refresh token and extract the user ID.
    pub fn verify(token: &str, config: &Config) -> Result<Id> {
        let claims = decode::<RefreshClaims>(
            token,
            &DecodingKey::from_secret(config.refresh_secret()),
            &Validation::default(),
        )
        .map_err(|_| Error::unauthorized("Invalid refresh token"))?
        .claims;
        claims
            .sub
            .parse()
            .map_err(|_| Error::unauthorized("Invalid refresh token"))
    }

    /// Wrap a refresh token in its httpOnly, strict-same-site cookie.
    pub fn into_cookie(token: String, config: &Config) -> Cookie<'static> {
        Cookie::build(REFRESH_TOKEN_COOKIE, token)
            .http_only(true)
            .same_site(SameSite::Strict)
            .path("/")
            .max_age(time::Duration::seconds(config.refresh_ttl().num_seconds()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use crate::model::db::user::UserCore;

    use super::*;

    fn example_user() -> User {
        User {
            id: Id::new(),
            user: UserCore::new(
                "Alice".to_string(),
                "alice@example.com".to_string(),
                "hunter22",
            )
            .unwrap(),
        }
    }

    #[test]
    fn access_token_round_trip() {
        let config = Config::example();
        let user = example_user();

        let token = AccessToken::issue(&user, &config).unwrap();
        let verified = AccessToken::verify(&token, &config).unwrap();

        assert_eq!(verified.user_id, user.id);
        assert_eq!(verified.role, Role::Voter);
    }

    #[test]
    fn refresh_token_round_trip() {
        let config = Config::example();
        let user_id = Id::new();

        let token = RefreshToken::issue(user_id, &config).unwrap();
        assert_eq!(RefreshToken::verify(&token, &config).unwrap(), user_id);
    }

    #[test]
    fn token_classes_are_not_interchangeable() {
        let config = Config::example();
        let user = example_user();

        // Signed with independent secrets, so neither verifies as the other.
        let access = AccessToken::issue(&user, &config).unwrap();
        assert!(RefreshToken::verify(&access, &config).is_err());

        let refresh = RefreshToken::issue(user.id, &config).unwrap();
        assert!(AccessToken::verify(&refresh, &config).is_err());
    }

    #[test]
    fn expired_access_token_is_rejected() {
        let config = Config::example();
        let claims = AccessClaims {
            sub: Id::new().to_string(),
            role: Role::Voter,
            // Well past the default validation leeway.
            expire_at: Utc::now() - Duration::hours(1),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.access_secret()),
        )
        .unwrap();

        assert!(AccessToken::verify(&token, &config).is_err());
    }

    #[test]
    fn tampered_token_is_rejected() {
        let config = Config::example();
        let user = example_user();

        let mut token = AccessToken::issue(&user, &config).unwrap();
        // Flip a character in the signature segment.
        let flipped = if token.ends_with('A') { 'B' } else { 'A' };
        token.pop();
        token.push(flipped);

        assert!(AccessToken::verify(&token, &config).is_err());
    }

    #[test]
    fn refresh_cookie_attributes() {
        let config = Config::example();
        let token = RefreshToken::issue(Id::new(), &config).unwrap();
        let cookie = RefreshToken::into_cookie(token, &config);

        assert_eq!(cookie.name(), REFRESH_TOKEN_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(
            cookie.max_age(),
            Some(time::Duration::seconds(604800))
        );
    }
}
