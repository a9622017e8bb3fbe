use candid::{CandidType, Deserialize, Nat, Principal};
use pocket_ic_protocol::management_canister::{
    decode_canister_id_request, decode_create_canister_request, decode_create_canister_response,
    decode_fetch_canister_logs_response, decode_install_code_request,
    decode_update_canister_settings_request, encode_create_canister_request,
    encode_fetch_canister_logs_request, encode_install_code_request, encode_start_canister_request,
    encode_stop_canister_request, encode_update_canister_settings_request, CanisterIdRecord,
    CanisterInstallMode, CanisterLogRecord, CanisterSettings, CreateCanisterArgs,
    FetchCanisterLogsResult, InstallCodeArgs, UpdateSettingsArgs, UpgradeFlags,
    WasmMemoryPersistence,
};
use pocket_ic_protocol::{DecodeError, MANAGEMENT_CANISTER_ID};
use pretty_assertions::assert_eq;
use proptest::collection::vec as pvec;
use proptest::prelude::*;

fn arb_principal() -> impl Strategy<Value = Principal> {
    pvec(any::<u8>(), 0..=29).prop_map(|bytes| Principal::from_slice(&bytes))
}

fn arb_nat() -> impl Strategy<Value = Nat> {
    any::<u128>().prop_map(Nat::from)
}

fn arb_settings() -> impl Strategy<Value = CanisterSettings> {
    (
        proptest::option::of(pvec(arb_principal(), 0..4)),
        proptest::option::of(arb_nat()),
        proptest::option::of(arb_nat()),
        proptest::option::of(arb_nat()),
        proptest::option::of(arb_nat()),
    )
        .prop_map(
            |(
                controllers,
                compute_allocation,
                memory_allocation,
                freezing_threshold,
                reserved_cycles_limit,
            )| CanisterSettings {
                controllers,
                compute_allocation,
                memory_allocation,
                freezing_threshold,
                reserved_cycles_limit,
            },
        )
}

fn arb_install_mode() -> impl Strategy<Value = CanisterInstallMode> {
    let upgrade_flags = (
        proptest::option::of(any::<bool>()),
        proptest::option::of(prop_oneof![
            Just(WasmMemoryPersistence::Keep),
            Just(WasmMemoryPersistence::Replace),
        ]),
    )
        .prop_map(|(skip_pre_upgrade, wasm_memory_persistence)| UpgradeFlags {
            skip_pre_upgrade,
            wasm_memory_persistence,
        });
    prop_oneof![
        Just(CanisterInstallMode::Install),
        Just(CanisterInstallMode::Reinstall),
        proptest::option::of(upgrade_flags).prop_map(CanisterInstallMode::Upgrade),
    ]
}

/// Log records as the server produces them: increasing (possibly gapped) indices and
/// non-decreasing timestamps.
fn arb_log_records() -> impl Strategy<Value = Vec<CanisterLogRecord>> {
    pvec(
        (1..5_u64, 0..1_000_u64, pvec(any::<u8>(), 0..32)),
        0..16,
    )
    .prop_map(|steps| {
        let mut idx = 0;
        let mut timestamp_nanos = 1_700_000_000_000_000_000_u64;
        steps
            .into_iter()
            .map(|(idx_step, time_step, content)| {
                idx += idx_step;
                timestamp_nanos += time_step;
                CanisterLogRecord {
                    idx,
                    timestamp_nanos,
                    content,
                }
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn create_canister_request_roundtrip(
        settings in proptest::option::of(arb_settings()),
        amount in proptest::option::of(arb_nat()),
        specified_id in proptest::option::of(arb_principal()),
    ) {
        let args = CreateCanisterArgs { settings, amount, specified_id };
        let bytes = encode_create_canister_request(&args).unwrap();
        prop_assert_eq!(decode_create_canister_request(&bytes).unwrap(), args.clone());
        prop_assert_eq!(encode_create_canister_request(&args).unwrap(), bytes);
    }

    #[test]
    fn canister_id_requests_roundtrip(canister_id in arb_principal()) {
        let record = CanisterIdRecord { canister_id };
        for bytes in [
            encode_start_canister_request(&record).unwrap(),
            encode_stop_canister_request(&record).unwrap(),
            encode_fetch_canister_logs_request(&record).unwrap(),
        ] {
            prop_assert_eq!(decode_canister_id_request(&bytes).unwrap(), record.clone());
        }
    }

    #[test]
    fn install_code_request_roundtrip(
        canister_id in arb_principal(),
        mode in arb_install_mode(),
        wasm_module in pvec(any::<u8>(), 0..256),
        arg in pvec(any::<u8>(), 0..64),
    ) {
        let args = InstallCodeArgs { arg, wasm_module, mode, canister_id };
        let bytes = encode_install_code_request(&args).unwrap();
        let decoded = decode_install_code_request(&bytes).unwrap();
        prop_assert_eq!(decoded.mode.tag(), args.mode.tag());
        prop_assert_eq!(decoded, args);
    }

    #[test]
    fn update_settings_request_roundtrip(canister_id in arb_principal(), settings in arb_settings()) {
        let args = UpdateSettingsArgs { canister_id, settings };
        let bytes = encode_update_canister_settings_request(&args).unwrap();
        prop_assert_eq!(decode_update_canister_settings_request(&bytes).unwrap(), args);
    }

    #[test]
    fn fetch_logs_response_preserves_order(records in arb_log_records()) {
        let bytes = candid::encode_one(FetchCanisterLogsResult {
            canister_log_records: records.clone(),
        })
        .unwrap();
        let decoded = decode_fetch_canister_logs_response(&bytes).unwrap().canister_log_records;
        prop_assert_eq!(&decoded, &records);
        for pair in decoded.windows(2) {
            prop_assert!(pair[0].idx < pair[1].idx);
            prop_assert!(pair[0].timestamp_nanos <= pair[1].timestamp_nanos);
        }
    }

    #[test]
    fn decoders_never_panic_on_arbitrary_bytes(bytes in pvec(any::<u8>(), 0..64)) {
        if let Err(DecodeError { byte_len, .. }) = decode_create_canister_response(&bytes) {
            prop_assert_eq!(byte_len, bytes.len());
        }
        if let Err(DecodeError { byte_len, .. }) = decode_fetch_canister_logs_response(&bytes) {
            prop_assert_eq!(byte_len, bytes.len());
        }
    }
}

#[test]
fn settings_fields_stay_absent_after_roundtrip() {
    let args = UpdateSettingsArgs {
        canister_id: MANAGEMENT_CANISTER_ID,
        settings: CanisterSettings::default().with_freezing_threshold(0_u64),
    };
    let decoded =
        decode_update_canister_settings_request(&encode_update_canister_settings_request(&args).unwrap())
            .unwrap();
    assert_eq!(decoded.settings.freezing_threshold, Some(Nat::from(0_u64)));
    assert_eq!(decoded.settings.controllers, None);
    assert_eq!(decoded.settings.compute_allocation, None);
    assert_eq!(decoded.settings.memory_allocation, None);
    assert_eq!(decoded.settings.reserved_cycles_limit, None);
}

#[test]
fn empty_controller_list_is_not_absent() {
    let args = CreateCanisterArgs::default()
        .with_settings(CanisterSettings::default().with_controllers(vec![]));
    let decoded =
        decode_create_canister_request(&encode_create_canister_request(&args).unwrap()).unwrap();
    assert_eq!(decoded.settings.unwrap().controllers, Some(vec![]));
}

#[test]
fn controller_order_is_preserved() {
    let controllers: Vec<_> = (0..5_u8)
        .rev()
        .map(|i| Principal::from_slice(&[i, 1, 2]))
        .collect();
    let args = CreateCanisterArgs::default()
        .with_settings(CanisterSettings::default().with_controllers(controllers.clone()));
    let decoded =
        decode_create_canister_request(&encode_create_canister_request(&args).unwrap()).unwrap();
    assert_eq!(decoded.settings.unwrap().controllers, Some(controllers));
}

#[test]
fn empty_logs_decode_to_empty_sequence() {
    let bytes = candid::encode_one(FetchCanisterLogsResult::default()).unwrap();
    let result = decode_fetch_canister_logs_response(&bytes).unwrap();
    assert!(result.canister_log_records.is_empty());
}

#[test]
fn fetched_log_content_is_readable() {
    let bytes = candid::encode_one(FetchCanisterLogsResult {
        canister_log_records: vec![
            CanisterLogRecord {
                idx: 3,
                timestamp_nanos: 10,
                content: b"first".to_vec(),
            },
            CanisterLogRecord {
                idx: 7,
                timestamp_nanos: 12,
                content: b"Hello from canister".to_vec(),
            },
        ],
    })
    .unwrap();
    let records = decode_fetch_canister_logs_response(&bytes)
        .unwrap()
        .canister_log_records;
    let last = records.last().unwrap();
    assert_eq!(last.content_lossy(), "Hello from canister");
    assert_eq!(last.idx, 7);
}

#[test]
fn create_canister_response_ignores_unknown_fields() {
    #[derive(CandidType, Deserialize)]
    struct ExtendedResponse {
        canister_id: Principal,
        extra: String,
    }

    let canister_id = Principal::from_slice(&[0, 0, 0, 0, 0, 0, 0, 1, 1, 1]);
    let bytes = candid::encode_one(ExtendedResponse {
        canister_id,
        extra: "ignored".to_string(),
    })
    .unwrap();
    assert_eq!(
        decode_create_canister_response(&bytes).unwrap(),
        CanisterIdRecord { canister_id }
    );
}

#[test]
fn absent_payload_is_a_decode_error() {
    // `(null)` and `()` carry no canister id.
    let null = candid::encode_one(()).unwrap();
    let err = decode_create_canister_response(&null).unwrap_err();
    assert_eq!(err.operation, "CreateCanisterResponse");
    assert_eq!(err.byte_len, null.len());

    let no_args = candid::encode_args(()).unwrap();
    let err = decode_fetch_canister_logs_response(&no_args).unwrap_err();
    assert_eq!(err.operation, "FetchCanisterLogsResponse");
    assert_eq!(err.byte_len, no_args.len());
}

#[test]
fn mismatching_field_type_is_a_decode_error() {
    #[derive(CandidType, Deserialize)]
    struct WrongResponse {
        canister_id: String,
    }

    let bytes = candid::encode_one(WrongResponse {
        canister_id: "aaaaa-aa".to_string(),
    })
    .unwrap();
    assert!(decode_create_canister_response(&bytes).is_err());
}

#[test]
fn unknown_install_mode_tag_is_a_decode_error() {
    #[derive(CandidType)]
    #[allow(non_camel_case_types)]
    enum Mode {
        uninstall,
    }

    #[derive(CandidType)]
    struct InstallCode {
        arg: Vec<u8>,
        wasm_module: Vec<u8>,
        mode: Mode,
        canister_id: Principal,
    }

    let bytes = candid::encode_one(InstallCode {
        arg: vec![],
        wasm_module: vec![0, 97, 115, 109],
        mode: Mode::uninstall,
        canister_id: Principal::from_slice(&[1]),
    })
    .unwrap();
    let err = decode_install_code_request(&bytes).unwrap_err();
    assert_eq!(err.operation, "InstallCodeRequest");
    assert_eq!(err.byte_len, bytes.len());
}

#[test]
fn truncated_payload_is_a_decode_error() {
    let bytes = candid::encode_one(CanisterIdRecord {
        canister_id: Principal::from_slice(&[1, 2, 3, 4]),
    })
    .unwrap();
    let truncated = &bytes[..bytes.len() - 2];
    let err = decode_create_canister_response(truncated).unwrap_err();
    assert_eq!(err.byte_len, truncated.len());
}

#[test]
fn install_code_request_carries_module_unchunked() {
    let wasm_module = vec![7_u8; 3 * 1024 * 1024];
    let args = InstallCodeArgs::upgrade(
        Principal::from_slice(&[1]),
        wasm_module.clone(),
        None,
        Some(UpgradeFlags {
            skip_pre_upgrade: Some(false),
            wasm_memory_persistence: Some(WasmMemoryPersistence::Replace),
        }),
    );
    let bytes = encode_install_code_request(&args).unwrap();
    assert!(bytes.len() > wasm_module.len());
    let decoded = decode_install_code_request(&bytes).unwrap();
    assert_eq!(decoded.wasm_module.len(), wasm_module.len());
    assert_eq!(decoded.arg, Vec::<u8>::new());
}
