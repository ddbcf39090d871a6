use ir_schedule_common::{
    ApplianceCommand, ClockSource, CommandEmitter, CycleConfig, CycleController, CycleFault,
    CyclePhase, DispatchError, DispatchStatus, FetchError, MemoryRetention, PersistentState,
    RetentionStore, ScheduleCache, ScheduleSource, TimeOfDay, TimeSource, TimeSyncError,
    WakeReason,
};
use pretty_assertions::assert_eq;

// 2026-01-05T11:15:00Z, 07:15 at UTC-4.
const MORNING: i64 = 1_767_611_700;
const WEEKDAY: &[u8] = br#"[[0,0,false,16],[7,0,true,21],[22,30,false,16]]"#;
const WARMER: &[u8] = br#"[[0,0,false,16],[7,0,true,23],[22,30,false,16]]"#;

#[derive(Default)]
struct ScriptedNetwork {
    time: Option<i64>,
    document: Option<Vec<u8>>,
    time_calls: usize,
}

impl TimeSource for ScriptedNetwork {
    fn fetch_network_time(&mut self) -> Result<i64, TimeSyncError> {
        self.time_calls += 1;
        self.time
            .ok_or_else(|| TimeSyncError::Unreachable("no route".to_string()))
    }
}

impl ScheduleSource for ScriptedNetwork {
    fn fetch_schedule_document(&mut self) -> Result<Vec<u8>, FetchError> {
        self.document.clone().ok_or(FetchError::Status(404))
    }
}

#[derive(Default)]
struct RecordingEmitter {
    sent: Vec<ApplianceCommand>,
}

impl CommandEmitter for RecordingEmitter {
    fn emit(&mut self, command: ApplianceCommand) -> Result<(), DispatchError> {
        self.sent.push(command);
        Ok(())
    }
}

fn controller(
    network: ScriptedNetwork,
) -> CycleController<MemoryRetention, ScriptedNetwork, RecordingEmitter> {
    CycleController::new(
        CycleConfig::default(),
        MemoryRetention::new(),
        network,
        RecordingEmitter::default(),
    )
}

fn network(time: i64, document: &[u8]) -> ScriptedNetwork {
    ScriptedNetwork {
        time: Some(time),
        document: Some(document.to_vec()),
        ..ScriptedNetwork::default()
    }
}

#[test]
fn day_of_wakes_applies_each_entry_once() {
    let mut node = controller(network(MORNING, WEEKDAY));

    let mut wakes = vec![node.run_cycle(WakeReason::ColdBoot)];
    while wakes.len() < 24 {
        wakes.push(node.run_cycle(WakeReason::SuspendWake));
    }

    let sent = &node.emitter().sent;
    assert_eq!(
        sent,
        &vec![
            ApplianceCommand {
                power: true,
                target_temperature: 21,
            },
            ApplianceCommand {
                power: false,
                target_temperature: 16,
            },
            ApplianceCommand {
                power: false,
                target_temperature: 16,
            },
            ApplianceCommand {
                power: true,
                target_temperature: 21,
            },
        ]
    );
    assert!(wakes.iter().all(|report| report.sleep_secs <= 70 * 60));
    assert!(wakes.iter().all(|report| report.faults.is_empty()));

    // The 22:30 change is reached exactly, not overslept.
    let evening = wakes
        .iter()
        .find(|report| report.local_time == TimeOfDay::new(22, 30))
        .unwrap();
    assert!(matches!(evening.dispatch, DispatchStatus::Sent { index: 2, .. }));
}

#[test]
fn warm_wake_after_midnight_entry_moves_to_morning_entry() {
    let state = PersistentState {
        first_sync_epoch: MORNING - 3 * 3_600,
        last_wake_epoch: MORNING - 4_200,
        sleep_duration_secs: 4_200,
        last_applied_index: Some(0),
        clock_synced: true,
        schedule_cache: ScheduleCache::new(WEEKDAY).unwrap(),
    };
    let mut node = CycleController::new(
        CycleConfig::default(),
        MemoryRetention::with_state(&state),
        ScriptedNetwork::default(),
        RecordingEmitter::default(),
    );

    let report = node.run_cycle(WakeReason::SuspendWake);

    assert_eq!(report.local_time, TimeOfDay::new(7, 15));
    let matched = report.matched.unwrap();
    assert_eq!(
        (matched.active_index, matched.next_index, matched.minutes_until_next),
        (1, 2, 915)
    );
    assert_eq!(
        node.emitter().sent,
        vec![ApplianceCommand {
            power: true,
            target_temperature: 21,
        }]
    );
    assert_eq!(report.sleep_secs, 4_200);
    assert_eq!(node.network().time_calls, 0);
    assert_eq!(node.retention().writes(), 1);
}

#[test]
fn failed_resync_keeps_cached_schedule_and_extrapolated_clock() {
    let state = PersistentState {
        first_sync_epoch: MORNING - 90_000,
        last_wake_epoch: MORNING - 60,
        sleep_duration_secs: 60,
        last_applied_index: Some(1),
        clock_synced: true,
        schedule_cache: ScheduleCache::new(WEEKDAY).unwrap(),
    };
    let mut node = CycleController::new(
        CycleConfig::default(),
        MemoryRetention::with_state(&state),
        ScriptedNetwork::default(),
        RecordingEmitter::default(),
    );

    let report = node.run_cycle(WakeReason::SuspendWake);

    assert!(report.phases.contains(&CyclePhase::Resyncing));
    assert_eq!(report.clock.source, ClockSource::Extrapolated);
    assert_eq!(report.clock.now_epoch, MORNING);
    assert_eq!(report.dispatch, DispatchStatus::Debounced { index: 1 });
    assert!(matches!(
        report.faults.as_slice(),
        [CycleFault::TimeSync(_), CycleFault::Fetch(_)]
    ));

    let saved = PersistentState::decode(node.retention().blob()).unwrap();
    assert_eq!(saved.first_sync_epoch, state.first_sync_epoch);
    assert_eq!(saved.schedule_cache.as_bytes(), WEEKDAY);
}

#[test]
fn time_only_resync_is_retried_on_next_wake() {
    let mut node = controller(ScriptedNetwork {
        time: Some(MORNING),
        ..ScriptedNetwork::default()
    });

    let first = node.run_cycle(WakeReason::ColdBoot);

    assert_eq!(first.clock.source, ClockSource::Network);
    assert!(matches!(
        first.faults.as_slice(),
        [CycleFault::Fetch(_), CycleFault::NoSchedule]
    ));
    assert_eq!(first.sleep_secs, 70 * 60);
    let saved = PersistentState::decode(node.retention().blob()).unwrap();
    assert!(saved.clock_synced);
    assert_eq!(saved.first_sync_epoch, 0);

    let (retention, _, emitter) = node.into_parts();
    let mut node = CycleController::new(
        CycleConfig::default(),
        retention,
        network(MORNING + 4_200, WEEKDAY),
        emitter,
    );

    let second = node.run_cycle(WakeReason::SuspendWake);

    assert!(second.phases.contains(&CyclePhase::Resyncing));
    assert!(second.faults.is_empty());
    assert_eq!(
        node.emitter().sent,
        vec![ApplianceCommand {
            power: true,
            target_temperature: 21,
        }]
    );
    let saved = PersistentState::decode(node.retention().blob()).unwrap();
    assert_eq!(saved.first_sync_epoch, MORNING + 4_200);

    let third = node.run_cycle(WakeReason::SuspendWake);

    assert!(!third.phases.contains(&CyclePhase::Resyncing));
    assert_eq!(third.dispatch, DispatchStatus::Debounced { index: 1 });
    assert_eq!(node.network().time_calls, 1);
}

#[test]
fn document_too_large_for_cache_is_not_applied() {
    let state = PersistentState {
        first_sync_epoch: MORNING - 90_000,
        last_wake_epoch: MORNING - 600,
        sleep_duration_secs: 600,
        last_applied_index: Some(1),
        clock_synced: true,
        schedule_cache: ScheduleCache::new(WEEKDAY).unwrap(),
    };
    let mut padded = br#"[[0,0,false,16],[7,0,true,25],[22,30,false,16]]"#.to_vec();
    padded.resize(450, b' ');
    let mut node = CycleController::new(
        CycleConfig::default(),
        MemoryRetention::with_state(&state),
        network(MORNING, &padded),
        RecordingEmitter::default(),
    );

    let report = node.run_cycle(WakeReason::SuspendWake);

    assert_eq!(report.clock.source, ClockSource::Network);
    assert!(matches!(report.faults.as_slice(), [CycleFault::Retention(_)]));
    assert_eq!(report.dispatch, DispatchStatus::Debounced { index: 1 });
    assert!(node.emitter().sent.is_empty());

    let saved = PersistentState::decode(node.retention().blob()).unwrap();
    assert_eq!(saved.schedule_cache.as_bytes(), WEEKDAY);
    assert_eq!(saved.last_applied_index, Some(1));
    assert_eq!(saved.first_sync_epoch, state.first_sync_epoch);

    let next = node.run_cycle(WakeReason::SuspendWake);
    assert!(next.phases.contains(&CyclePhase::Resyncing));
    assert_eq!(next.dispatch, DispatchStatus::Debounced { index: 1 });
}

#[test]
fn changed_document_reapplies_current_entry() {
    let state = PersistentState {
        first_sync_epoch: MORNING - 90_000,
        last_wake_epoch: MORNING - 600,
        sleep_duration_secs: 600,
        last_applied_index: Some(1),
        clock_synced: true,
        schedule_cache: ScheduleCache::new(WEEKDAY).unwrap(),
    };
    let mut node = CycleController::new(
        CycleConfig::default(),
        MemoryRetention::with_state(&state),
        network(MORNING, WARMER),
        RecordingEmitter::default(),
    );

    let report = node.run_cycle(WakeReason::SuspendWake);

    assert_eq!(report.clock.source, ClockSource::Network);
    assert_eq!(
        node.emitter().sent,
        vec![ApplianceCommand {
            power: true,
            target_temperature: 23,
        }]
    );
    let saved = PersistentState::decode(node.retention().blob()).unwrap();
    assert_eq!(saved.schedule_cache.as_bytes(), WARMER);
    assert_eq!(saved.last_applied_index, Some(1));
}

#[test]
fn identical_document_on_resync_stays_debounced() {
    let state = PersistentState {
        first_sync_epoch: MORNING - 90_000,
        last_wake_epoch: MORNING - 600,
        sleep_duration_secs: 600,
        last_applied_index: Some(1),
        clock_synced: true,
        schedule_cache: ScheduleCache::new(WEEKDAY).unwrap(),
    };
    let mut node = CycleController::new(
        CycleConfig::default(),
        MemoryRetention::with_state(&state),
        network(MORNING, WEEKDAY),
        RecordingEmitter::default(),
    );

    let report = node.run_cycle(WakeReason::SuspendWake);

    assert_eq!(report.dispatch, DispatchStatus::Debounced { index: 1 });
    assert!(node.emitter().sent.is_empty());
}

#[test]
fn power_loss_is_treated_as_cold_start() {
    let mut node = controller(network(MORNING, WEEKDAY));
    node.run_cycle(WakeReason::ColdBoot);

    let (mut retention, network, emitter) = node.into_parts();
    retention.power_loss();
    assert!(PersistentState::decode(&retention.load()).is_err());
    let mut node = CycleController::new(CycleConfig::default(), retention, network, emitter);

    let report = node.run_cycle(WakeReason::ColdBoot);

    assert_eq!(report.phases.first(), Some(&CyclePhase::ColdStart));
    assert!(report.faults.is_empty());
    assert_eq!(node.network().time_calls, 2);
    assert_eq!(node.emitter().sent.len(), 2);
}

#[test]
fn corrupted_retention_is_reported_and_replaced() {
    let mut retention = MemoryRetention::with_state(&PersistentState::default());
    let mut blob = *retention.blob();
    blob[40] ^= 0xFF;
    retention.save(&blob).unwrap();

    let mut node = CycleController::new(
        CycleConfig::default(),
        retention,
        network(MORNING, WEEKDAY),
        RecordingEmitter::default(),
    );

    let report = node.run_cycle(WakeReason::SuspendWake);

    assert!(matches!(report.faults.as_slice(), [CycleFault::Retention(_)]));
    assert!(report.phases.contains(&CyclePhase::Resyncing));
    assert_eq!(node.emitter().sent.len(), 1);
    assert!(PersistentState::decode(node.retention().blob()).is_ok());
}

#[test]
fn report_serializes_for_telemetry() {
    let mut node = controller(network(MORNING, WEEKDAY));

    let report = node.run_cycle(WakeReason::ColdBoot);
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["wake"], "COLD_BOOT");
    assert_eq!(json["clock"]["source"], "NETWORK");
    assert_eq!(json["matched"]["minutesUntilNext"], 915);
    assert_eq!(json["dispatch"]["status"], "sent");
    assert_eq!(json["dispatch"]["command"]["targetTemperature"], 21);
    assert_eq!(json["sleepSecs"], 4_200);
}
