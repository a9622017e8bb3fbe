//! Mocking of HTTPS outcalls.
//!
//! A canister's HTTPS outcall stays pending on the PocketIC server until a test supplies a
//! response for it. The [`OutcallMockBroker`] turns such a response (or one response per
//! replica) into the payload the server accepts, after checking it against the subnet size.
use crate::common::rest::{
    CanisterHttpRequest, CanisterHttpResponse, MockCanisterHttpResponse, RawCanisterHttpRequest,
    SubnetConfig, Topology,
};
use crate::management_canister::SubnetId;
use crate::{DecodeError, MockError, ReplicationCountMismatchError, StaleOutcallError};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::debug;

pub type PendingHttpsOutcall = CanisterHttpRequest;
pub type HttpsOutcallResponseMock = CanisterHttpResponse;

/// Identifies a pending HTTPS outcall. Request ids are only unique within a subnet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutcallKey {
    pub subnet_id: SubnetId,
    pub request_id: u64,
}

impl fmt::Display for OutcallKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.subnet_id, self.request_id)
    }
}

impl CanisterHttpRequest {
    pub fn key(&self) -> OutcallKey {
        OutcallKey {
            subnet_id: self.subnet_id,
            request_id: self.request_id,
        }
    }
}

/// Parses the server's list of pending HTTPS outcalls.
pub fn decode_pending_outcalls(bytes: &[u8]) -> Result<Vec<PendingHttpsOutcall>, DecodeError> {
    const OPERATION: &str = "PendingHttpsOutcalls";
    let raw: Vec<RawCanisterHttpRequest> =
        serde_json::from_slice(bytes).map_err(|err| DecodeError::new(OPERATION, bytes, err))?;
    raw.into_iter()
        .map(|request| {
            PendingHttpsOutcall::try_from(request)
                .map_err(|err| DecodeError::new(OPERATION, bytes, err))
        })
        .collect()
}

/// Source of subnet replica counts.
pub trait SubnetReplicaCount {
    fn replica_count(&self, subnet_id: &SubnetId) -> Option<u64>;
}

impl SubnetReplicaCount for Topology {
    fn replica_count(&self, subnet_id: &SubnetId) -> Option<u64> {
        self.get_subnet_config(subnet_id).map(SubnetConfig::size)
    }
}

impl SubnetReplicaCount for HashMap<SubnetId, u64> {
    fn replica_count(&self, subnet_id: &SubnetId) -> Option<u64> {
        self.get(subnet_id).copied()
    }
}

impl<T: SubnetReplicaCount + ?Sized> SubnetReplicaCount for &T {
    fn replica_count(&self, subnet_id: &SubnetId) -> Option<u64> {
        (**self).replica_count(subnet_id)
    }
}

/// Prepares mock responses for pending HTTPS outcalls.
#[derive(Clone, Debug)]
pub struct OutcallMockBroker<T> {
    subnets: T,
}

impl<T: SubnetReplicaCount> OutcallMockBroker<T> {
    pub fn new(subnets: T) -> Self {
        Self { subnets }
    }

    /// Builds the payload answering `pending` with `primary` and `additional`.
    ///
    /// Without `additional` responses, `primary` is the answer of every replica. Otherwise
    /// there must be exactly one response per replica of the outcall's subnet. Responses are
    /// passed through untouched: bodies are not checked against `max_response_bytes`.
    ///
    /// Whether `pending` is still pending is not checked here.
    pub fn prepare_mock(
        &self,
        pending: &PendingHttpsOutcall,
        primary: HttpsOutcallResponseMock,
        additional: Vec<HttpsOutcallResponseMock>,
    ) -> Result<MockCanisterHttpResponse, MockError> {
        let key = pending.key();
        if !additional.is_empty() {
            let expected = self
                .subnets
                .replica_count(&key.subnet_id)
                .ok_or(MockError::UnknownSubnet(key.subnet_id))?;
            let actual = 1 + additional.len() as u64;
            if actual != expected {
                return Err(ReplicationCountMismatchError {
                    subnet_id: key.subnet_id,
                    expected,
                    actual,
                }
                .into());
            }
        }
        let mock = MockCanisterHttpResponse {
            subnet_id: key.subnet_id,
            request_id: key.request_id,
            response: primary,
            additional_responses: additional,
        };
        debug!(
            subnet_id = %key.subnet_id,
            request_id = key.request_id,
            responses = mock.response_count(),
            "prepared HTTPS outcall mock"
        );
        Ok(mock)
    }
}

/// Pending HTTPS outcalls as last reported by the server.
#[derive(Clone, Debug, Default)]
pub struct PendingOutcalls {
    pending: BTreeMap<OutcallKey, PendingHttpsOutcall>,
}

impl PendingOutcalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the pending set with the server's latest report.
    pub fn observe(&mut self, outcalls: impl IntoIterator<Item = PendingHttpsOutcall>) {
        self.pending = outcalls
            .into_iter()
            .map(|outcall| (outcall.key(), outcall))
            .collect();
    }

    pub fn get(&self, key: &OutcallKey) -> Option<&PendingHttpsOutcall> {
        self.pending.get(key)
    }

    /// Removes an outcall once a mock for it has been delivered.
    pub fn take(&mut self, key: &OutcallKey) -> Result<PendingHttpsOutcall, StaleOutcallError> {
        self.pending
            .remove(key)
            .ok_or(StaleOutcallError { key: *key })
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingHttpsOutcall> {
        self.pending.values()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
