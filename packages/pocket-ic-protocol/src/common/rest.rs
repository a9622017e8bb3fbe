//! Rust structs that reflect the structure of JSON-objects exchanged with the PocketIC server
//! for HTTPS outcall mocking and topology discovery.
//!
//! Types prefixed with `Raw` are the exact wire shapes; the unprefixed types are what the rest
//! of the crate works with.

use crate::management_canister::{CanisterId, SubnetId};
use crate::{DecodeError, ProtocolInvariantError};
use candid::Principal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum_macros::{Display, EnumIter};

/// Serde adapter writing byte strings as standard base64 text.
mod base64_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S, T>(bytes: T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: AsRef<[u8]>,
    {
        serializer.serialize_str(&base64::encode(bytes.as_ref()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        base64::decode(text).map_err(D::Error::custom)
    }
}

// ================================================================================================================= //
// HTTPS outcalls

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct RawSubnetId {
    #[serde(with = "base64_bytes")]
    #[schemars(with = "String")]
    pub subnet_id: Vec<u8>,
}

impl From<SubnetId> for RawSubnetId {
    fn from(subnet_id: SubnetId) -> Self {
        Self {
            subnet_id: subnet_id.as_slice().to_vec(),
        }
    }
}

impl TryFrom<RawSubnetId> for SubnetId {
    type Error = candid::types::principal::PrincipalError;

    fn try_from(raw: RawSubnetId) -> Result<Self, Self::Error> {
        Principal::try_from_slice(&raw.subnet_id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Display)]
pub enum CanisterHttpMethod {
    GET,
    POST,
    HEAD,
}

/// A header of an HTTPS outcall request or response.
///
/// Headers are kept as an ordered list: duplicates are allowed and order is significant.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct CanisterHttpHeader {
    pub name: String,
    pub value: String,
}

impl<N: Into<String>, V: Into<String>> From<(N, V)> for CanisterHttpHeader {
    fn from((name, value): (N, V)) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RawCanisterHttpRequest {
    pub subnet_id: RawSubnetId,
    pub request_id: u64,
    pub http_method: CanisterHttpMethod,
    pub url: String,
    pub headers: Vec<CanisterHttpHeader>,
    #[serde(with = "base64_bytes")]
    #[schemars(with = "String")]
    pub body: Vec<u8>,
    pub max_response_bytes: Option<u64>,
}

/// An HTTPS outcall made by a canister that is waiting for a (mocked) response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CanisterHttpRequest {
    pub subnet_id: SubnetId,
    /// Only unique together with `subnet_id`.
    pub request_id: u64,
    pub http_method: CanisterHttpMethod,
    pub url: String,
    pub headers: Vec<CanisterHttpHeader>,
    pub body: Vec<u8>,
    /// Response size limit set by the calling canister.
    pub max_response_bytes: Option<u64>,
}

impl From<CanisterHttpRequest> for RawCanisterHttpRequest {
    fn from(request: CanisterHttpRequest) -> Self {
        Self {
            subnet_id: request.subnet_id.into(),
            request_id: request.request_id,
            http_method: request.http_method,
            url: request.url,
            headers: request.headers,
            body: request.body,
            max_response_bytes: request.max_response_bytes,
        }
    }
}

impl TryFrom<RawCanisterHttpRequest> for CanisterHttpRequest {
    type Error = candid::types::principal::PrincipalError;

    fn try_from(raw: RawCanisterHttpRequest) -> Result<Self, Self::Error> {
        Ok(Self {
            subnet_id: raw.subnet_id.try_into()?,
            request_id: raw.request_id,
            http_method: raw.http_method,
            url: raw.url,
            headers: raw.headers,
            body: raw.body,
            max_response_bytes: raw.max_response_bytes,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CanisterHttpReply {
    pub status: u16,
    pub headers: Vec<CanisterHttpHeader>,
    #[serde(with = "base64_bytes")]
    #[schemars(with = "String")]
    pub body: Vec<u8>,
}

impl CanisterHttpReply {
    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            headers: vec![],
            body: vec![],
        }
    }

    /// Appends a header; earlier headers (including ones with the same name) are kept.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name, value).into());
        self
    }

    pub fn with_headers<H: Into<CanisterHttpHeader>>(
        mut self,
        headers: impl IntoIterator<Item = H>,
    ) -> Self {
        self.headers.extend(headers.into_iter().map(Into::into));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CanisterHttpReject {
    pub reject_code: u64,
    pub message: String,
}

impl CanisterHttpReject {
    pub fn with_reject_code(reject_code: u64) -> Self {
        Self {
            reject_code,
            message: String::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum CanisterHttpResponse {
    CanisterHttpReply(CanisterHttpReply),
    CanisterHttpReject(CanisterHttpReject),
}

impl From<CanisterHttpReply> for CanisterHttpResponse {
    fn from(reply: CanisterHttpReply) -> Self {
        CanisterHttpResponse::CanisterHttpReply(reply)
    }
}

impl From<CanisterHttpReject> for CanisterHttpResponse {
    fn from(reject: CanisterHttpReject) -> Self {
        CanisterHttpResponse::CanisterHttpReject(reject)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RawMockCanisterHttpResponse {
    pub subnet_id: RawSubnetId,
    pub request_id: u64,
    pub response: CanisterHttpResponse,
    pub additional_responses: Vec<CanisterHttpResponse>,
}

/// The payload delivering mocked responses for one pending HTTPS outcall.
///
/// With no `additional_responses`, `response` is what every replica of the subnet observes.
/// Otherwise there is one response per replica.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockCanisterHttpResponse {
    pub subnet_id: SubnetId,
    pub request_id: u64,
    pub response: CanisterHttpResponse,
    pub additional_responses: Vec<CanisterHttpResponse>,
}

impl MockCanisterHttpResponse {
    /// Number of responses carried by this payload.
    pub fn response_count(&self) -> usize {
        1 + self.additional_responses.len()
    }

    /// The JSON body the server's mock endpoint expects.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, ProtocolInvariantError> {
        serde_json::to_vec(&RawMockCanisterHttpResponse::from(self.clone())).map_err(|err| {
            ProtocolInvariantError::Encode {
                operation: "MockCanisterHttpResponse",
                reason: err.to_string(),
            }
        })
    }
}

impl From<MockCanisterHttpResponse> for RawMockCanisterHttpResponse {
    fn from(mock: MockCanisterHttpResponse) -> Self {
        Self {
            subnet_id: mock.subnet_id.into(),
            request_id: mock.request_id,
            response: mock.response,
            additional_responses: mock.additional_responses,
        }
    }
}

impl TryFrom<RawMockCanisterHttpResponse> for MockCanisterHttpResponse {
    type Error = candid::types::principal::PrincipalError;

    fn try_from(raw: RawMockCanisterHttpResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            subnet_id: raw.subnet_id.try_into()?,
            request_id: raw.request_id,
            response: raw.response,
            additional_responses: raw.additional_responses,
        })
    }
}

// ================================================================================================================= //
// Topology

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    JsonSchema,
    EnumIter,
    Display,
)]
pub enum SubnetKind {
    Application,
    Bitcoin,
    Fiduciary,
    II,
    NNS,
    SNS,
    System,
    VerifiedApplication,
}

impl SubnetKind {
    /// Number of replicas the PocketIC server creates for a subnet of this kind.
    pub fn default_size(self) -> u64 {
        use SubnetKind::*;
        match self {
            Application => 13,
            VerifiedApplication => 13,
            Fiduciary => 28,
            SNS => 34,
            Bitcoin => 13,
            II => 28,
            NNS => 40,
            System => 13,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct RawCanisterId {
    #[serde(with = "base64_bytes")]
    #[schemars(with = "String")]
    pub canister_id: Vec<u8>,
}

impl From<CanisterId> for RawCanisterId {
    fn from(canister_id: CanisterId) -> Self {
        Self {
            canister_id: canister_id.as_slice().to_vec(),
        }
    }
}

impl TryFrom<RawCanisterId> for CanisterId {
    type Error = candid::types::principal::PrincipalError;

    fn try_from(raw: RawCanisterId) -> Result<Self, Self::Error> {
        Principal::try_from_slice(&raw.canister_id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct RawNodeId {
    #[serde(with = "base64_bytes")]
    #[schemars(with = "String")]
    pub node_id: Vec<u8>,
}

/// Inclusive range of canister ids hosted by a subnet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CanisterIdRange {
    pub start: RawCanisterId,
    pub end: RawCanisterId,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum SubnetInstructionConfig {
    #[default]
    Production,
    Benchmarking,
}

/// A subnet as the server reports it. The replica count is the number of nodes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SubnetConfig {
    pub subnet_kind: SubnetKind,
    pub subnet_seed: [u8; 32],
    pub node_ids: Vec<RawNodeId>,
    #[serde(default)]
    pub canister_ranges: Vec<CanisterIdRange>,
    #[serde(default)]
    pub instruction_config: SubnetInstructionConfig,
}

impl SubnetConfig {
    /// A subnet with the server's default replica count for `subnet_kind`.
    pub fn new(subnet_kind: SubnetKind) -> Self {
        Self::with_size(subnet_kind, subnet_kind.default_size())
    }

    /// A subnet with `size` placeholder nodes.
    pub fn with_size(subnet_kind: SubnetKind, size: u64) -> Self {
        Self {
            subnet_kind,
            subnet_seed: [0; 32],
            node_ids: (0..size)
                .map(|i| RawNodeId {
                    node_id: i.to_be_bytes().to_vec(),
                })
                .collect(),
            canister_ranges: vec![],
            instruction_config: SubnetInstructionConfig::default(),
        }
    }

    pub fn size(&self) -> u64 {
        self.node_ids.len() as u64
    }
}

/// Subnets of a PocketIC instance, as reported by the server.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Topology {
    #[schemars(with = "BTreeMap<String, SubnetConfig>")]
    pub subnet_configs: BTreeMap<SubnetId, SubnetConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_effective_canister_id: Option<RawCanisterId>,
}

impl Topology {
    pub fn builder() -> TopologyBuilder {
        TopologyBuilder::default()
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, DecodeError> {
        serde_json::from_slice(bytes).map_err(|err| DecodeError::new("Topology", bytes, err))
    }

    pub fn get_subnet_config(&self, subnet_id: &SubnetId) -> Option<&SubnetConfig> {
        self.subnet_configs.get(subnet_id)
    }
}

#[derive(Clone, Debug, Default)]
pub struct TopologyBuilder {
    topology: Topology,
}

impl TopologyBuilder {
    /// Adds a subnet with the default replica count of its kind.
    pub fn with_subnet(self, subnet_id: SubnetId, subnet_kind: SubnetKind) -> Self {
        self.with_subnet_config(subnet_id, SubnetConfig::new(subnet_kind))
    }

    pub fn with_subnet_of_size(
        self,
        subnet_id: SubnetId,
        subnet_kind: SubnetKind,
        size: u64,
    ) -> Self {
        self.with_subnet_config(subnet_id, SubnetConfig::with_size(subnet_kind, size))
    }

    pub fn with_subnet_config(mut self, subnet_id: SubnetId, config: SubnetConfig) -> Self {
        self.topology.subnet_configs.insert(subnet_id, config);
        self
    }

    pub fn with_default_effective_canister_id(mut self, canister_id: CanisterId) -> Self {
        self.topology.default_effective_canister_id = Some(canister_id.into());
        self
    }

    pub fn build(self) -> Topology {
        self.topology
    }
}
