//! Indy DID helpers.
//!
//! Covers the pieces of DID handling the resolver needs without talking to a
//! ledger:
//!
//! - Unqualifying `did:sov:` and `did:indy:<namespace>:` identifiers.
//! - Parsing fully qualified `did:indy` identifiers into namespace and id.
//! - Deciding whether a verkey self-certifies a DID. An unqualified Indy DID is
//!   the base58 encoding of the first 16 bytes of its 32-byte verkey. An
//!   abbreviated verkey (`~` followed by the remaining bytes) is only ever
//!   written for a self-certified DID.

const SOV_PREFIX: &str = "did:sov:";
const INDY_PREFIX: &str = "did:indy:";

/// Length in bytes of a full Ed25519 verkey.
const VERKEY_LEN: usize = 32;

/// Number of verkey bytes that make up an unqualified DID.
const DID_LEN: usize = 16;

/// Bitcoin base58 alphabet, as used by Indy.
const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// A parsed `did:indy:<namespace>:<id>` identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndyDid<'a> {
    /// Ledger namespace, e.g. `sovrin` or `sovrin:staging`.
    pub namespace: &'a str,
    /// Unqualified identifier.
    pub id: &'a str,
}

/// Parses a fully qualified `did:indy` identifier.
///
/// The namespace may itself contain colons (`did:indy:sovrin:staging:<id>`);
/// the id is always the last segment. Returns `None` for any other DID.
#[must_use]
pub fn parse_indy_did(did: &str) -> Option<IndyDid<'_>> {
    let rest = did.strip_prefix(INDY_PREFIX)?;
    let (namespace, id) = rest.rsplit_once(':')?;
    if namespace.is_empty() || id.is_empty() {
        return None;
    }
    Some(IndyDid { namespace, id })
}

/// Strips `did:sov:` or `did:indy:<namespace>:` from a DID.
///
/// Unqualified DIDs are returned unchanged.
#[must_use]
pub fn unqualified_did(did: &str) -> &str {
    if let Some(id) = did.strip_prefix(SOV_PREFIX) {
        return id;
    }
    match parse_indy_did(did) {
        Some(indy) => indy.id,
        None => did,
    }
}

/// Returns true for abbreviated verkeys (`~` followed by 21 or 22 base58 chars).
#[must_use]
pub fn is_abbreviated_verkey(verkey: &str) -> bool {
    match verkey.strip_prefix('~') {
        Some(rest) => {
            (21..=22).contains(&rest.len()) && rest.chars().all(|c| BASE58_ALPHABET.contains(c))
        },
        None => false,
    }
}

/// Derives the unqualified DID of a full (32-byte, base58) verkey.
///
/// Returns `None` if the verkey is not valid base58 or not 32 bytes long.
#[must_use]
pub fn did_from_verkey(verkey: &str) -> Option<String> {
    let bytes = bs58::decode(verkey).into_vec().ok()?;
    if bytes.len() != VERKEY_LEN {
        return None;
    }
    Some(bs58::encode(&bytes[..DID_LEN]).into_string())
}

/// Checks whether `verkey` self-certifies `did`.
///
/// `did` may be unqualified or qualified with `did:sov:` / `did:indy:`.
#[must_use]
pub fn is_self_certified_did(did: &str, verkey: &str) -> bool {
    if is_abbreviated_verkey(verkey) {
        return true;
    }
    did_from_verkey(verkey).is_some_and(|derived| derived == unqualified_did(did))
}
