//! Best-effort bridge to the external immutable ledger.
//!
//! A cast vote is mirrored onto the ledger contract after the local record
//! has committed. The mirror write is strictly subordinate: it runs in its
//! own task with its own timeout, holds no database session, and its failure
//! can never fail or roll back the vote it mirrors.

use std::sync::Arc;
use std::time::Duration;

use rocket::{
    fairing::{Fairing, Info, Kind},
    tokio::{self, sync::oneshot, time::timeout},
    Build, Rocket,
};
use serde::{Deserialize, Serialize};

use crate::model::db::election::Candidate;

/// Default timeout for a single ledger HTTP call, in seconds.
const DEFAULT_SUBMIT_TIMEOUT: u64 = 10;

/// How long a cast-vote response waits for the mirror task before reporting
/// the write as pending.
const REPORT_WAIT: Duration = Duration::from_secs(2);

/// A handle to a submitted ledger transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxHandle {
    pub tx_id: String,
}

/// Confirmation state of a submitted transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub confirmed: bool,
    pub block_ref: Option<String>,
}

/// Client for the ledger gateway.
///
/// Process-scoped: constructed once at ignition by [`MirrorFairing`] and
/// injected via managed state, never accessed as an ambient global.
pub struct LedgerClient {
    http: reqwest::Client,
    rpc_url: String,
    contract_address: String,
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    contract: &'a str,
    method: &'a str,
    args: &'a [u64],
}

impl LedgerClient {
    pub fn new(
        rpc_url: String,
        contract_address: String,
        submit_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(submit_timeout).build()?;
        Ok(Self {
            http,
            rpc_url,
            contract_address,
        })
    }

    /// Submit a contract method call, returning the transaction handle.
    pub async fn submit(&self, method: &str, args: &[u64]) -> Result<TxHandle, reqwest::Error> {
        let request = SubmitRequest {
            contract: &self.contract_address,
            method,
            args,
        };
        self.http
            .post(format!("{}/transactions", self.rpc_url))
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    /// Query the confirmation state of a previously submitted transaction.
    pub async fn confirm(&self, handle: &TxHandle) -> Result<Confirmation, reqwest::Error> {
        self.http
            .get(format!("{}/transactions/{}", self.rpc_url, handle.tx_id))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

/// The outcome of a mirror attempt, as reported in the vote receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum MirrorOutcome {
    /// The mirror task had not finished when the response was sent.
    Pending,
    /// The transaction was accepted by the ledger.
    #[serde(rename_all = "camelCase")]
    Submitted { tx_id: String, confirmed: bool },
    /// The submission failed; the local vote stands regardless.
    Failed { error: String },
}

/// The mirror feature: either disabled by configuration, or an active client.
pub enum Mirror {
    Disabled,
    Enabled(Arc<LedgerClient>),
}

impl Mirror {
    /// Mirror a cast vote for the given candidate onto the ledger.
    ///
    /// Fire-and-forget: the submission runs in a spawned task that outlives
    /// this call. We wait a short, bounded interval for its outcome so the
    /// receipt can report it opportunistically; past that the receipt says
    /// `pending` and the task finishes in the background, logging its result.
    ///
    /// Returns `None` when mirroring is disabled or the candidate has no
    /// on-chain index.
    pub async fn mirror_vote(&self, candidate: &Candidate) -> Option<MirrorOutcome> {
        let client = match self {
            Self::Disabled => return None,
            Self::Enabled(client) => Arc::clone(client),
        };
        let index = candidate.onchain_index?;

        let (sender, receiver) = oneshot::channel();
        tokio::spawn(async move {
            let outcome = match client.submit("vote", &[u64::from(index)]).await {
                Ok(handle) => {
                    let confirmed = match client.confirm(&handle).await {
                        Ok(confirmation) => confirmation.confirmed,
                        Err(err) => {
                            warn!("Ledger confirmation check failed for {}: {err}", handle.tx_id);
                            false
                        }
                    };
                    MirrorOutcome::Submitted {
                        tx_id: handle.tx_id,
                        confirmed,
                    }
                }
                Err(err) => {
                    warn!("Ledger submission failed: {err}");
                    MirrorOutcome::Failed {
                        error: "Ledger submission failed".to_string(),
                    }
                }
            };
            info!("Vote mirror finished: {outcome:?}");
            // The receiver is gone once the response has reported `pending`.
            let _ = sender.send(outcome);
        });

        match timeout(REPORT_WAIT, receiver).await {
            Ok(Ok(outcome)) => Some(outcome),
            _ => Some(MirrorOutcome::Pending),
        }
    }
}

/// Configuration for the external ledger mirror.
#[derive(Deserialize)]
struct LedgerConfig {
    // non-secrets
    ledger_enabled: bool,
    ledger_rpc_url: Option<String>,
    ledger_contract_address: Option<String>,
    ledger_timeout: Option<u64>,
}

/// A fairing that loads the ledger config and places a [`Mirror`] into
/// managed state.
pub struct MirrorFairing;

#[rocket::async_trait]
impl Fairing for MirrorFairing {
    fn info(&self) -> Info {
        Info {
            name: "Ledger mirror",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<LedgerConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load ledger config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        let mirror = if config.ledger_enabled {
            let rpc_url = match config.ledger_rpc_url {
                Some(url) => url,
                None => {
                    error!("`ledger_rpc_url` must be set when the ledger mirror is enabled");
                    return Err(rocket);
                }
            };
            let contract_address = match config.ledger_contract_address {
                Some(address) => address,
                None => {
                    error!(
                        "`ledger_contract_address` must be set when the ledger mirror is enabled"
                    );
                    return Err(rocket);
                }
            };
            let submit_timeout =
                Duration::from_secs(config.ledger_timeout.unwrap_or(DEFAULT_SUBMIT_TIMEOUT));
            let client = match LedgerClient::new(rpc_url, contract_address, submit_timeout) {
                Ok(client) => client,
                Err(e) => {
                    error!("Failed to construct ledger client: {e}");
                    return Err(rocket);
                }
            };
            info!("Ledger mirroring enabled");
            Mirror::Enabled(Arc::new(client))
        } else {
            info!("Ledger mirroring disabled");
            Mirror::Disabled
        };

        // Manage the state.
        rocket = rocket.manage(mirror);
        Ok(rocket)
    }
}

#[cfg(test)]
mod tests {
    use rocket::serde::json::serde_json;

    use crate::model::mongodb::Id;

    use super::*;

    fn candidate(onchain_index: Option<u32>) -> Candidate {
        Candidate {
            id: Id::new(),
            name: "Alice".to_string(),
            onchain_index,
        }
    }

    #[rocket::async_test]
    async fn disabled_mirror_never_fires() {
        let outcome = Mirror::Disabled.mirror_vote(&candidate(Some(0))).await;
        assert!(outcome.is_none());
    }

    #[rocket::async_test]
    async fn unindexed_candidate_is_skipped() {
        // No HTTP server behind this client; skipping must happen before any
        // request is attempted.
        let client =
            LedgerClient::new("http://127.0.0.1:1".to_string(), "0x0".to_string(), REPORT_WAIT)
                .unwrap();
        let mirror = Mirror::Enabled(Arc::new(client));

        let outcome = mirror.mirror_vote(&candidate(None)).await;
        assert!(outcome.is_none());
    }

    #[rocket::async_test]
    async fn submission_failure_is_reported_not_raised() {
        // Nothing listens on this port, so the submission fails fast; the
        // outcome must be an embedded failure, never an error.
        let client = LedgerClient::new(
            "http://127.0.0.1:1".to_string(),
            "0x0".to_string(),
            Duration::from_millis(200),
        )
        .unwrap();
        let mirror = Mirror::Enabled(Arc::new(client));

        let outcome = mirror.mirror_vote(&candidate(Some(3))).await;
        match outcome {
            Some(MirrorOutcome::Failed { .. }) | Some(MirrorOutcome::Pending) => {}
            other => panic!("Unexpected mirror outcome: {other:?}"),
        }
    }

    #[test]
    fn outcome_serialization() {
        let submitted = MirrorOutcome::Submitted {
            tx_id: "0xabc".to_string(),
            confirmed: true,
        };
        let json = serde_json::to_value(&submitted).unwrap();
        assert_eq!(json["status"], "submitted");
        assert_eq!(json["txId"], "0xabc");
        assert_eq!(json["confirmed"], true);

        let pending = serde_json::to_value(&MirrorOutcome::Pending).unwrap();
        assert_eq!(pending["status"], "pending");
    }
}
