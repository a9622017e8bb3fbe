//! Candid request and response types of the management canister calls used by a test
//! harness, together with their encoders and decoders.
//!
//! Field names and variant tags follow the management canister interface exactly; optional
//! fields are `opt` on the wire and [`Option`] here, so "absent" and "present with a zero
//! value" stay distinct.
use crate::{DecodeError, ProtocolInvariantError};
use candid::{ser::IDLBuilder, CandidType, Deserialize, Nat, Principal};
use tracing::{debug, trace};

pub type CanisterId = Principal;
pub type SubnetId = Principal;

/// Cycles attached to a canister creation when the caller does not specify an amount.
pub const DEFAULT_CREATE_CANISTER_CYCLES: u128 = 1_000_000_000_000_000_000;

#[derive(CandidType, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CanisterIdRecord {
    pub canister_id: CanisterId,
}

impl From<CanisterId> for CanisterIdRecord {
    fn from(canister_id: CanisterId) -> Self {
        Self { canister_id }
    }
}

// canister settings

#[derive(CandidType, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct CanisterSettings {
    pub controllers: Option<Vec<Principal>>,
    pub compute_allocation: Option<Nat>,
    pub memory_allocation: Option<Nat>,
    pub freezing_threshold: Option<Nat>,
    pub reserved_cycles_limit: Option<Nat>,
}

impl CanisterSettings {
    pub fn with_controllers(mut self, controllers: Vec<Principal>) -> Self {
        self.controllers = Some(controllers);
        self
    }

    pub fn with_compute_allocation(mut self, compute_allocation: impl Into<Nat>) -> Self {
        self.compute_allocation = Some(compute_allocation.into());
        self
    }

    pub fn with_memory_allocation(mut self, memory_allocation: impl Into<Nat>) -> Self {
        self.memory_allocation = Some(memory_allocation.into());
        self
    }

    pub fn with_freezing_threshold(mut self, freezing_threshold: impl Into<Nat>) -> Self {
        self.freezing_threshold = Some(freezing_threshold.into());
        self
    }

    pub fn with_reserved_cycles_limit(mut self, reserved_cycles_limit: impl Into<Nat>) -> Self {
        self.reserved_cycles_limit = Some(reserved_cycles_limit.into());
        self
    }
}

#[derive(CandidType, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UpdateSettingsArgs {
    pub canister_id: CanisterId,
    /// Required as a whole; fields that should stay unchanged are left `None`.
    pub settings: CanisterSettings,
}

// canister creation

#[derive(CandidType, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateCanisterArgs {
    pub settings: Option<CanisterSettings>,
    pub amount: Option<Nat>,
    /// Requests a specific canister id instead of a server-assigned one.
    pub specified_id: Option<CanisterId>,
}

impl CreateCanisterArgs {
    pub fn with_settings(mut self, settings: CanisterSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn with_amount(mut self, amount: impl Into<Nat>) -> Self {
        self.amount = Some(amount.into());
        self
    }

    pub fn with_default_cycles(self) -> Self {
        self.with_amount(DEFAULT_CREATE_CANISTER_CYCLES)
    }

    pub fn with_specified_id(mut self, specified_id: CanisterId) -> Self {
        self.specified_id = Some(specified_id);
        self
    }
}

// canister code installation

#[derive(CandidType, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WasmMemoryPersistence {
    #[serde(rename = "keep")]
    Keep,
    #[serde(rename = "replace")]
    Replace,
}

#[derive(CandidType, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct UpgradeFlags {
    pub skip_pre_upgrade: Option<bool>,
    pub wasm_memory_persistence: Option<WasmMemoryPersistence>,
}

#[derive(CandidType, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum CanisterInstallMode {
    #[serde(rename = "install")]
    Install,
    #[serde(rename = "reinstall")]
    Reinstall,
    #[serde(rename = "upgrade")]
    Upgrade(Option<UpgradeFlags>),
}

impl CanisterInstallMode {
    pub fn tag(&self) -> &'static str {
        match self {
            CanisterInstallMode::Install => "install",
            CanisterInstallMode::Reinstall => "reinstall",
            CanisterInstallMode::Upgrade(_) => "upgrade",
        }
    }
}

/// Install mode written as a record of optional tags, the way configuration files and
/// loosely-typed callers describe it.
///
/// Only convertible into a [`CanisterInstallMode`] when exactly one tag is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallModeFlags {
    pub install: Option<()>,
    pub reinstall: Option<()>,
    pub upgrade: Option<Option<UpgradeFlags>>,
}

impl TryFrom<InstallModeFlags> for CanisterInstallMode {
    type Error = ProtocolInvariantError;

    fn try_from(flags: InstallModeFlags) -> Result<Self, Self::Error> {
        match flags {
            InstallModeFlags {
                install: Some(()),
                reinstall: None,
                upgrade: None,
            } => Ok(CanisterInstallMode::Install),
            InstallModeFlags {
                install: None,
                reinstall: Some(()),
                upgrade: None,
            } => Ok(CanisterInstallMode::Reinstall),
            InstallModeFlags {
                install: None,
                reinstall: None,
                upgrade: Some(options),
            } => Ok(CanisterInstallMode::Upgrade(options)),
            InstallModeFlags {
                install,
                reinstall,
                upgrade,
            } => {
                let set = [
                    install.map(|_| "install"),
                    reinstall.map(|_| "reinstall"),
                    upgrade.map(|_| "upgrade"),
                ]
                .into_iter()
                .flatten()
                .collect();
                Err(ProtocolInvariantError::InstallModeTags { set })
            }
        }
    }
}

impl From<CanisterInstallMode> for InstallModeFlags {
    fn from(mode: CanisterInstallMode) -> Self {
        match mode {
            CanisterInstallMode::Install => Self {
                install: Some(()),
                ..Default::default()
            },
            CanisterInstallMode::Reinstall => Self {
                reinstall: Some(()),
                ..Default::default()
            },
            CanisterInstallMode::Upgrade(options) => Self {
                upgrade: Some(options),
                ..Default::default()
            },
        }
    }
}

#[derive(CandidType, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct InstallCodeArgs {
    #[serde(with = "serde_bytes")]
    pub arg: Vec<u8>,
    /// The complete module image; no chunking happens at this layer.
    #[serde(with = "serde_bytes")]
    pub wasm_module: Vec<u8>,
    pub mode: CanisterInstallMode,
    pub canister_id: CanisterId,
}

impl InstallCodeArgs {
    pub fn install(canister_id: CanisterId, wasm_module: Vec<u8>, arg: Option<Vec<u8>>) -> Self {
        Self::with_mode(canister_id, wasm_module, arg, CanisterInstallMode::Install)
    }

    pub fn reinstall(canister_id: CanisterId, wasm_module: Vec<u8>, arg: Option<Vec<u8>>) -> Self {
        Self::with_mode(canister_id, wasm_module, arg, CanisterInstallMode::Reinstall)
    }

    pub fn upgrade(
        canister_id: CanisterId,
        wasm_module: Vec<u8>,
        arg: Option<Vec<u8>>,
        options: Option<UpgradeFlags>,
    ) -> Self {
        Self::with_mode(
            canister_id,
            wasm_module,
            arg,
            CanisterInstallMode::Upgrade(options),
        )
    }

    fn with_mode(
        canister_id: CanisterId,
        wasm_module: Vec<u8>,
        arg: Option<Vec<u8>>,
        mode: CanisterInstallMode,
    ) -> Self {
        Self {
            arg: arg.unwrap_or_default(),
            wasm_module,
            mode,
            canister_id,
        }
    }
}

// canister logs

#[derive(CandidType, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CanisterLogRecord {
    pub idx: u64,
    pub timestamp_nanos: u64,
    #[serde(with = "serde_bytes")]
    pub content: Vec<u8>,
}

impl CanisterLogRecord {
    pub fn content_lossy(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }
}

#[derive(CandidType, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchCanisterLogsResult {
    /// Ordered by `idx`; indices may have gaps where old records were dropped.
    pub canister_log_records: Vec<CanisterLogRecord>,
}

// encoding and decoding

fn encode<T: CandidType>(
    operation: &'static str,
    value: &T,
) -> Result<Vec<u8>, ProtocolInvariantError> {
    let mut builder = IDLBuilder::new();
    let bytes = builder
        .arg(value)
        .and_then(|builder| builder.serialize_to_vec())
        .map_err(|err| ProtocolInvariantError::Encode {
            operation,
            reason: err.to_string(),
        })?;
    debug!(operation, bytes = bytes.len(), "encoded management canister payload");
    Ok(bytes)
}

fn decode<T>(operation: &'static str, bytes: &[u8]) -> Result<T, DecodeError>
where
    T: CandidType + for<'de> Deserialize<'de>,
{
    let value = candid::decode_one(bytes).map_err(|err| DecodeError::new(operation, bytes, err))?;
    debug!(operation, bytes = bytes.len(), "decoded management canister payload");
    Ok(value)
}

pub fn encode_create_canister_request(
    args: &CreateCanisterArgs,
) -> Result<Vec<u8>, ProtocolInvariantError> {
    encode("CreateCanisterRequest", args)
}

pub fn decode_create_canister_request(bytes: &[u8]) -> Result<CreateCanisterArgs, DecodeError> {
    decode("CreateCanisterRequest", bytes)
}

pub fn decode_create_canister_response(bytes: &[u8]) -> Result<CanisterIdRecord, DecodeError> {
    decode("CreateCanisterResponse", bytes)
}

pub fn encode_start_canister_request(
    args: &CanisterIdRecord,
) -> Result<Vec<u8>, ProtocolInvariantError> {
    encode("StartCanisterRequest", args)
}

pub fn encode_stop_canister_request(
    args: &CanisterIdRecord,
) -> Result<Vec<u8>, ProtocolInvariantError> {
    encode("StopCanisterRequest", args)
}

/// Decodes any of the `{canister_id}` requests (start, stop, fetch logs).
pub fn decode_canister_id_request(bytes: &[u8]) -> Result<CanisterIdRecord, DecodeError> {
    decode("CanisterIdRecord", bytes)
}

pub fn encode_install_code_request(
    args: &InstallCodeArgs,
) -> Result<Vec<u8>, ProtocolInvariantError> {
    encode("InstallCodeRequest", args)
}

pub fn decode_install_code_request(bytes: &[u8]) -> Result<InstallCodeArgs, DecodeError> {
    decode("InstallCodeRequest", bytes)
}

pub fn encode_update_canister_settings_request(
    args: &UpdateSettingsArgs,
) -> Result<Vec<u8>, ProtocolInvariantError> {
    encode("UpdateCanisterSettingsRequest", args)
}

pub fn decode_update_canister_settings_request(
    bytes: &[u8],
) -> Result<UpdateSettingsArgs, DecodeError> {
    decode("UpdateCanisterSettingsRequest", bytes)
}

pub fn encode_fetch_canister_logs_request(
    args: &CanisterIdRecord,
) -> Result<Vec<u8>, ProtocolInvariantError> {
    encode("FetchCanisterLogsRequest", args)
}

/// An empty `canister_log_records` is a valid "no logs" result.
pub fn decode_fetch_canister_logs_response(
    bytes: &[u8],
) -> Result<FetchCanisterLogsResult, DecodeError> {
    let result: FetchCanisterLogsResult = decode("FetchCanisterLogsResponse", bytes)?;
    for record in &result.canister_log_records {
        trace!(
            idx = record.idx,
            timestamp_nanos = record.timestamp_nanos,
            content = %hex::encode(&record.content),
            "canister log record"
        );
    }
    Ok(result)
}
