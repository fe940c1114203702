//! Transaction author agreements.
//!
//! A ledger may publish an agreement that every write must accept. The
//! agreement and the acceptance mechanisms it allows are read from the ledger
//! once per pool; each write request then carries an
//! [`AuthorAgreementAcceptance`] built from the pool's configured
//! [`TransactionAuthorAgreement`].

use std::{
    collections::BTreeMap,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use vdr_types::TransactionAuthorAgreement;

use crate::error::{AuthorAgreementMismatchSnafu, AuthorAgreementRequiredSnafu, Result};

const SECONDS_PER_DAY: u64 = 86_400;

/// Error interpreting the agreement replies of a ledger.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum AgreementParseError {
    /// The reply `data` is not a valid agreement or mechanism list.
    #[snafu(display("Malformed {what} reply: {source}"))]
    Decode {
        /// Which reply failed to decode.
        what: &'static str,
        /// JSON error.
        source: serde_json::Error,
    },

    /// The ledger publishes an agreement but no acceptance mechanisms.
    #[snafu(display("Ledger publishes an author agreement without acceptance mechanisms"))]
    MissingMechanisms,
}

/// Acceptance mechanisms a ledger allows for its agreement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceMechanisms {
    /// Mechanism labels and their descriptions.
    pub aml: BTreeMap<String, String>,
    /// Version of the mechanism list.
    pub version: String,
    /// Where the mechanisms are described.
    #[serde(rename = "amlContext", default, skip_serializing_if = "Option::is_none")]
    pub aml_context: Option<String>,
}

/// The agreement a ledger currently requires writes to accept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorAgreement {
    /// Agreement text.
    #[serde(default)]
    pub text: String,
    /// Agreement version.
    pub version: String,
    /// Ledger digest of the agreement.
    pub digest: String,
    /// When the agreement was ratified, in seconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratification_ts: Option<u64>,
    /// Mechanisms accepted for this agreement.
    #[serde(rename = "acceptanceMechanisms")]
    pub acceptance_mechanisms: AcceptanceMechanisms,
}

#[derive(Deserialize)]
struct AgreementData {
    #[serde(default)]
    text: String,
    version: String,
    digest: String,
    #[serde(default)]
    ratification_ts: Option<u64>,
}

impl AuthorAgreement {
    /// Builds the agreement from `GET_TXN_AUTHR_AGRMT` and
    /// `GET_TXN_AUTHR_AGRMT_AML` reply results.
    ///
    /// Returns `None` when the ledger publishes no agreement.
    ///
    /// # Errors
    ///
    /// Returns [`AgreementParseError`] if either reply is malformed.
    pub fn from_replies(
        agreement: &Value,
        mechanisms: &Value,
    ) -> Result<Option<Self>, AgreementParseError> {
        let Some(data) = reply_data(agreement).context(DecodeSnafu { what: "agreement" })? else {
            return Ok(None);
        };
        let data: AgreementData =
            serde_json::from_value(data).context(DecodeSnafu { what: "agreement" })?;

        let mechanisms = reply_data(mechanisms)
            .context(DecodeSnafu { what: "acceptance mechanisms" })?
            .context(MissingMechanismsSnafu)?;
        let acceptance_mechanisms: AcceptanceMechanisms = serde_json::from_value(mechanisms)
            .context(DecodeSnafu { what: "acceptance mechanisms" })?;

        Ok(Some(Self {
            text: data.text,
            version: data.version,
            digest: data.digest,
            ratification_ts: data.ratification_ts,
            acceptance_mechanisms,
        }))
    }

    /// Checks `accepted` against this agreement and returns the acceptance to
    /// attach to a write on `pool_id`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::AuthorAgreementRequired`](crate::LedgerError::AuthorAgreementRequired)
    ///   if the pool has no agreement configured.
    /// - [`LedgerError::AuthorAgreementMismatch`](crate::LedgerError::AuthorAgreementMismatch)
    ///   if the configured version differs or the mechanism is not offered.
    pub fn accept(
        &self,
        pool_id: &str,
        accepted: Option<&TransactionAuthorAgreement>,
    ) -> Result<AuthorAgreementAcceptance> {
        let mechanisms = self.mechanism_names();
        let accepted = accepted.context(AuthorAgreementRequiredSnafu {
            pool_id,
            version: &self.version,
            mechanisms: mechanisms.clone(),
        })?;

        ensure!(
            accepted.version == self.version
                && self.acceptance_mechanisms.aml.contains_key(&accepted.acceptance_mechanism),
            AuthorAgreementMismatchSnafu {
                pool_id,
                mechanism: &accepted.acceptance_mechanism,
                version: &accepted.version,
                ledger_mechanisms: mechanisms,
                ledger_version: &self.version,
            }
        );

        Ok(AuthorAgreementAcceptance {
            digest: self.digest.clone(),
            mechanism: accepted.acceptance_mechanism.clone(),
            time: accepted_at(),
        })
    }

    fn mechanism_names(&self) -> String {
        let names: Vec<&String> = self.acceptance_mechanisms.aml.keys().collect();
        format!("{names:?}")
    }
}

/// Acceptance of an agreement, attached to a write request as `taaAcceptance`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorAgreementAcceptance {
    /// Digest of the accepted agreement.
    #[serde(rename = "taaDigest")]
    pub digest: String,
    /// Mechanism the agreement was accepted with.
    pub mechanism: String,
    /// Acceptance time in seconds since the epoch, rounded down to the day.
    pub time: u64,
}

/// Extracts reply `data`, which ledgers send as an object, a JSON string or
/// null.
fn reply_data(result: &Value) -> Result<Option<Value>, serde_json::Error> {
    match result.get("data") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => serde_json::from_str(raw),
        Some(data) => Ok(Some(data.clone())),
    }
}

/// Ledgers only accept acceptance times at day granularity.
fn accepted_at() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default();
    now / SECONDS_PER_DAY * SECONDS_PER_DAY
}
