//! # PocketIC protocol
//!
//! Wire-level building blocks for driving a PocketIC server from a test harness.
//!
//! The crate covers two concerns and nothing else:
//!
//! * [`management_canister`]: Candid encoders and decoders for the management canister
//!   requests a test harness sends (create, start, stop, install code, update settings,
//!   fetch logs) and the responses it reads back.
//! * [`outcalls`]: preparation of mock responses for pending HTTPS outcalls, including the
//!   check that the number of supplied responses matches the replica count of the subnet.
//!
//! Transport, server lifecycle and actor marshaling live elsewhere: every function here is a
//! pure transformation from typed values to bytes (or back).
//!
//! ```rust
//! use candid::Principal;
//! use pocket_ic_protocol::management_canister::{
//!     decode_create_canister_response, encode_create_canister_request, CanisterIdRecord,
//!     CreateCanisterArgs,
//! };
//!
//! let request = CreateCanisterArgs::default().with_default_cycles();
//! let bytes = encode_create_canister_request(&request).unwrap();
//! assert!(bytes.starts_with(b"DIDL"));
//!
//! let reply = candid::encode_one(CanisterIdRecord {
//!     canister_id: Principal::from_slice(&[0, 0, 0, 0, 0, 0, 0, 1, 1, 1]),
//! })
//! .unwrap();
//! let CanisterIdRecord { canister_id } = decode_create_canister_response(&reply).unwrap();
//! assert_eq!(canister_id.to_text(), "rrkah-fqaaa-aaaaa-aaaaq-cai");
//! ```
use crate::outcalls::OutcallKey;
use candid::Principal;
use thiserror::Error;

pub mod common;
pub mod management_canister;
pub mod outcalls;

pub use common::rest::{
    CanisterHttpHeader, CanisterHttpMethod, CanisterHttpReject, CanisterHttpReply,
    CanisterHttpRequest, CanisterHttpResponse, MockCanisterHttpResponse, SubnetKind, Topology,
};
pub use outcalls::{
    HttpsOutcallResponseMock, OutcallMockBroker, PendingHttpsOutcall, PendingOutcalls,
    SubnetReplicaCount,
};

/// The principal of the management canister (`aaaaa-aa`).
pub const MANAGEMENT_CANISTER_ID: Principal = Principal::management_canister();

/// A response payload could not be parsed into the expected shape.
///
/// Raised for truncated or malformed bytes, for mismatching Candid types and for payloads
/// that decode to nothing at all: an absent payload is never turned into an empty value.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("failed to decode {operation} from {byte_len} bytes: {reason}")]
pub struct DecodeError {
    /// The operation whose payload was being decoded, e.g. `CreateCanisterResponse`.
    pub operation: &'static str,
    /// Length of the raw payload that failed to parse.
    pub byte_len: usize,
    pub reason: String,
}

impl DecodeError {
    pub(crate) fn new(operation: &'static str, bytes: &[u8], reason: impl ToString) -> Self {
        Self {
            operation,
            byte_len: bytes.len(),
            reason: reason.to_string(),
        }
    }
}

/// An attempt was made to encode a value that breaks an invariant of the protocol.
///
/// This indicates a bug in the caller (or in this crate), not a runtime condition.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProtocolInvariantError {
    #[error("install mode must set exactly one of install, reinstall or upgrade, got {set:?}")]
    InstallModeTags { set: Vec<&'static str> },
    #[error("failed to encode {operation}: {reason}")]
    Encode {
        operation: &'static str,
        reason: String,
    },
}

/// The number of mocked responses does not match the replica count of the subnet.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error(
    "subnet {subnet_id} has {expected} replicas, but {actual} responses were supplied for the HTTPS outcall"
)]
pub struct ReplicationCountMismatchError {
    pub subnet_id: Principal,
    pub expected: u64,
    pub actual: u64,
}

/// A mock was addressed to an HTTPS outcall that is no longer pending.
///
/// Produced by the layer that talks to the server; the broker itself never checks staleness.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("HTTPS outcall {key} is not pending")]
pub struct StaleOutcallError {
    pub key: OutcallKey,
}

/// Errors returned when preparing a mock response for a pending HTTPS outcall.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MockError {
    #[error(transparent)]
    ReplicationCountMismatch(#[from] ReplicationCountMismatchError),
    #[error("subnet {0} is not part of the topology")]
    UnknownSubnet(Principal),
}

/// Union of all errors produced by this crate.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    ProtocolInvariant(#[from] ProtocolInvariantError),
    #[error(transparent)]
    Mock(#[from] MockError),
    #[error(transparent)]
    StaleOutcall(#[from] StaleOutcallError),
}

pub type Result<T> = std::result::Result<T, Error>;
