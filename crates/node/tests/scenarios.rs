//! End-to-end behaviour of the orchestrator behind a dispatcher.

use meshroot_core::opcodes::{fast_prov, vendor};
use meshroot_core::{
    ConfigRequest, Event, FastProvInfoSet, FastProvStatus, ModelKind, TimerId, TransportCall,
};
use meshroot_messaging::MessagingError;
use meshroot_node::{Dispatcher, MeshOrchestrator};
use meshroot_provisioner::ProvisionerConfig;
use meshroot_test_helpers::fixtures::*;
use meshroot_test_helpers::{AppCall, RecordingApplication, RecordingTransport};
use meshroot_types::{Address, FastProvAction, NodeState};
use std::time::Duration;
use tracing_test::traced_test;

type TestDispatcher = Dispatcher<RecordingTransport, RecordingApplication>;

fn dispatcher(config: ProvisionerConfig) -> TestDispatcher {
    let mut dispatcher = Dispatcher::new(
        MeshOrchestrator::new(config),
        RecordingTransport::new(),
        RecordingApplication::new(),
    );
    dispatcher.start().unwrap();
    dispatcher.transport_mut().take_calls();
    dispatcher
}

fn app_key_adds(dispatcher: &TestDispatcher, to: Address) -> Vec<TransportCall> {
    dispatcher
        .transport()
        .calls()
        .iter()
        .filter(|c| {
            matches!(c, TransportCall::ConfigClientSend {
                context,
                request: ConfigRequest::AppKeyAdd { .. },
            } if context.address == to)
        })
        .cloned()
        .collect()
}

fn state_of(dispatcher: &TestDispatcher, address: u16) -> NodeState {
    dispatcher
        .orchestrator()
        .registry()
        .get(Address(address))
        .unwrap()
        .state()
}

// ═══════════════════════════════════════════════════════════════════════════
// Startup
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_startup_sequence() {
    let mut dispatcher = Dispatcher::new(
        MeshOrchestrator::new(ProvisionerConfig::default()),
        RecordingTransport::new(),
        RecordingApplication::new(),
    );
    dispatcher.start().unwrap();

    let names: Vec<_> = dispatcher
        .transport()
        .calls()
        .iter()
        .map(|c| c.type_name())
        .collect();
    assert_eq!(
        names,
        vec!["set_uuid_match", "enable_provisioning", "add_local_app_key"]
    );
    assert_eq!(
        dispatcher.drain_timers(),
        vec![(TimerId::RequestSweep, Duration::from_secs(10))]
    );
    assert!(dispatcher.drain_timers().is_empty());

    dispatcher.dispatch(Event::LocalAppKeyAdded {
        app_key_index: meshroot_types::AppKeyIndex(0),
        result: Ok(()),
    });
    assert_eq!(
        dispatcher.transport().calls_named("bind_local_model").len(),
        2
    );
}

#[test]
fn test_startup_reports_transport_failure() {
    let mut transport = RecordingTransport::new();
    transport.fail_next("enable_provisioning", -5);
    let mut dispatcher = Dispatcher::new(
        MeshOrchestrator::new(ProvisionerConfig::default()),
        transport,
        RecordingApplication::new(),
    );
    let err = dispatcher.start().unwrap_err();
    assert_eq!(err.call, "enable_provisioning");
    assert_eq!(err.code, -5);
}

// ═══════════════════════════════════════════════════════════════════════════
// Admission
// ═══════════════════════════════════════════════════════════════════════════

#[traced_test]
#[test]
fn test_quota_admits_one_new_device() {
    let mut dispatcher = dispatcher(ProvisionerConfig::with_max_node_num(1));

    dispatcher.dispatch(device_seen(0xAA));
    assert_eq!(
        dispatcher.transport().calls_named("add_unprovisioned_device").len(),
        1
    );
    assert_eq!(dispatcher.orchestrator().provisioner().quota().remaining(), 0);

    dispatcher.transport_mut().take_calls();
    dispatcher.dispatch(device_seen(0xBB));
    assert!(dispatcher.transport().calls().is_empty());
    assert_eq!(dispatcher.orchestrator().provisioner().quota().remaining(), 0);
    assert!(logs_contain("QuotaExhausted"));
}

#[test]
fn test_reprovisioning_admitted_with_zero_quota() {
    let mut dispatcher = dispatcher(ProvisionerConfig::with_max_node_num(1));
    dispatcher.dispatch(device_seen(0xAA));
    dispatcher.dispatch(prov_complete(0xAA, 1, 0x0002));
    assert_eq!(dispatcher.orchestrator().provisioner().quota().remaining(), 0);

    dispatcher.transport_mut().take_calls();
    dispatcher.dispatch(device_seen(0xAA));
    assert_eq!(
        dispatcher.transport().calls_named("add_unprovisioned_device").len(),
        1
    );
    assert_eq!(dispatcher.orchestrator().provisioner().quota().remaining(), 0);
}

#[test]
fn test_failed_admission_refunds_quota() {
    let mut dispatcher = dispatcher(ProvisionerConfig::with_max_node_num(1));
    dispatcher
        .transport_mut()
        .fail_next("add_unprovisioned_device", -1);

    dispatcher.dispatch(device_seen(0xAA));
    assert_eq!(dispatcher.orchestrator().provisioner().quota().remaining(), 1);

    dispatcher.dispatch(device_seen(0xBB));
    assert_eq!(dispatcher.orchestrator().provisioner().quota().remaining(), 0);
}

// ═══════════════════════════════════════════════════════════════════════════
// Onboarding
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_completion_names_registers_and_sends_app_key() {
    let config = ProvisionerConfig::default();
    let keys = config.keys();
    let mut dispatcher = dispatcher(config);

    dispatcher.dispatch(prov_complete(0xAA, 1, 0x0002));

    let record = dispatcher
        .orchestrator()
        .registry()
        .get(Address(0x0002))
        .unwrap();
    assert_eq!(record.name.as_deref(), Some("NODE-01"));
    assert_eq!(record.state(), NodeState::AppKeyRequested);

    let adds = app_key_adds(&dispatcher, Address(0x0002));
    assert_eq!(adds.len(), 1);
    let TransportCall::ConfigClientSend { request, .. } = &adds[0] else {
        unreachable!()
    };
    assert_eq!(*request, ConfigRequest::app_key_add(&keys));

    assert_eq!(
        dispatcher.application().calls(),
        &[AppCall::ProvComplete(Address(0x0002))]
    );
}

#[test]
fn test_app_key_timeout_retried_once() {
    let mut dispatcher = dispatcher(ProvisionerConfig::default());
    dispatcher.dispatch(prov_complete(0xAA, 1, 0x0002));

    dispatcher.dispatch(app_key_timeout(0x0002));
    let adds = app_key_adds(&dispatcher, Address(0x0002));
    assert_eq!(adds.len(), 2);
    assert_eq!(adds[0], adds[1]);
    assert_eq!(state_of(&dispatcher, 0x0002), NodeState::AppKeyRequested);

    dispatcher.dispatch(app_key_timeout(0x0002));
    assert_eq!(app_key_adds(&dispatcher, Address(0x0002)).len(), 2);
    assert_eq!(state_of(&dispatcher, 0x0002), NodeState::Stuck);
    assert_eq!(dispatcher.orchestrator().provisioner().completion().pending().len(), 0);
}

#[test]
fn test_failed_app_key_send_marks_stuck() {
    let mut dispatcher = dispatcher(ProvisionerConfig::default());
    dispatcher
        .transport_mut()
        .fail_next("config_client_set_state", -3);

    dispatcher.dispatch(prov_complete(0xAA, 1, 0x0002));
    assert_eq!(state_of(&dispatcher, 0x0002), NodeState::Stuck);
    assert!(app_key_adds(&dispatcher, Address(0x0002)).is_empty());
}

#[test]
fn test_fast_prov_handoff_carries_own_allocation() {
    let config = ProvisionerConfig::default();
    let template = config.allocation_template();
    let mut dispatcher = dispatcher(config);

    dispatcher.dispatch(prov_complete(0xAA, 1, 0x0002));
    dispatcher.dispatch(app_key_status(0x0002, 0));

    let sends = dispatcher.transport().client_sends(ModelKind::FastProvClient);
    assert_eq!(sends.len(), 1);
    let send = sends[0];
    assert_eq!(send.opcode, fast_prov::INFO_SET);
    assert_eq!(send.context.address, Address(0x0002));
    assert!(!send.ack);

    let info = FastProvInfoSet::decode(&send.payload).unwrap();
    assert_eq!(info.addr_range_count, template.addr_range_count);
    assert_eq!(info.unicast_min, template.unicast_min);
    assert_eq!(info.unicast_max, template.unicast_max);
    assert_eq!(info.flags, template.flags);
    assert_eq!(info.iv_index, template.iv_index);
    assert_eq!(info.net_index, template.net_index);
    assert_eq!(info.group_address, template.group_address);
    assert_eq!(info.match_filter, template.match_filter);
    assert_eq!(info.action, FastProvAction::Allocate);
    assert_eq!(state_of(&dispatcher, 0x0002), NodeState::FastProvSent);

    dispatcher.dispatch(fast_prov_status(0x0002, FastProvStatus::SUCCESS));
    assert_eq!(state_of(&dispatcher, 0x0002), NodeState::Ready);
}

#[test]
fn test_rejected_app_key_marks_stuck() {
    let mut dispatcher = dispatcher(ProvisionerConfig::default());
    dispatcher.dispatch(prov_complete(0xAA, 1, 0x0002));
    dispatcher.dispatch(app_key_status(0x0002, 0x02));

    assert_eq!(state_of(&dispatcher, 0x0002), NodeState::Stuck);
    assert!(dispatcher
        .transport()
        .client_sends(ModelKind::FastProvClient)
        .is_empty());
}

#[test]
fn test_composition_fetched_before_app_key() {
    let mut dispatcher = dispatcher(ProvisionerConfig::default().with_composition_fetch(true));
    dispatcher.dispatch(prov_complete(0xAA, 1, 0x0002));
    assert_eq!(state_of(&dispatcher, 0x0002), NodeState::Registered);
    assert!(app_key_adds(&dispatcher, Address(0x0002)).is_empty());

    dispatcher.dispatch(composition_status(0x0002, vec![0xE5, 0x02, 0x00, 0x00]));
    assert_eq!(
        dispatcher.transport().calls_named("store_node_composition_data").len(),
        1
    );
    assert_eq!(app_key_adds(&dispatcher, Address(0x0002)).len(), 1);
    assert_eq!(state_of(&dispatcher, 0x0002), NodeState::AppKeyRequested);
}

#[test]
fn test_address_conflict_dropped() {
    let mut dispatcher = dispatcher(ProvisionerConfig::default());
    dispatcher.dispatch(prov_complete(0xAA, 1, 0x0002));
    dispatcher.application_mut().take_calls();

    dispatcher.dispatch(prov_complete(0xBB, 2, 0x0002));
    let record = dispatcher
        .orchestrator()
        .registry()
        .get(Address(0x0002))
        .unwrap();
    assert_eq!(record.uuid, uuid(0xAA));
    assert_eq!(dispatcher.orchestrator().registry().len(), 1);
    assert!(dispatcher.application().calls().is_empty());
}

#[test]
fn test_addresses_stay_distinct_across_reprovisioning() {
    let mut dispatcher = dispatcher(ProvisionerConfig::with_max_node_num(3));
    dispatcher.dispatch(prov_complete(0xAA, 1, 0x0002));
    dispatcher.dispatch(prov_complete(0xBB, 2, 0x0003));
    dispatcher.dispatch(prov_complete(0xAA, 3, 0x0004));

    let registry = dispatcher.orchestrator().registry();
    assert_eq!(registry.len(), 2);
    let mut addresses: Vec<_> = registry.iter().map(|n| n.address).collect();
    addresses.sort();
    addresses.dedup();
    assert_eq!(addresses, vec![Address(0x0003), Address(0x0004)]);

    let record = registry.get(Address(0x0004)).unwrap();
    assert!(record.reprovisioned);
    assert_eq!(app_key_adds(&dispatcher, Address(0x0004)).len(), 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// Messaging
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_message_to_unknown_node_sends_nothing() {
    let mut dispatcher = dispatcher(ProvisionerConfig::default());

    let err = dispatcher.send_message(Address(0x0005), b"ping").unwrap_err();
    assert_eq!(err, MessagingError::NodeNotFound(Address(0x0005)));
    assert!(dispatcher.transport().calls().is_empty());
    assert!(dispatcher.transport().failed().is_empty());
}

#[test]
fn test_broadcast_targets_all_nodes_unacknowledged() {
    let mut dispatcher = dispatcher(ProvisionerConfig::default());

    for payload in [&b""[..], &b"hello"[..], &[0xFF; 200][..]] {
        dispatcher.send_broadcast(payload).unwrap();
    }

    let sends = dispatcher.transport().client_sends(ModelKind::VendorClient);
    assert_eq!(sends.len(), 3);
    for send in sends {
        assert_eq!(send.context.address, Address::ALL_NODES);
        assert_eq!(send.opcode, vendor::BROADCAST);
        assert!(!send.ack);
    }
}

#[test]
fn test_message_response_round_trip() {
    let mut dispatcher = dispatcher(ProvisionerConfig::default());
    dispatcher.dispatch(prov_complete(0xAA, 1, 0x0002));
    dispatcher.application_mut().take_calls();

    dispatcher.send_message(Address(0x0002), b"ping").unwrap();
    assert_eq!(
        dispatcher.send_message(Address(0x0002), b"again"),
        Err(MessagingError::RequestInFlight {
            destination: Address(0x0002),
            opcode: vendor::MESSAGE,
        })
    );

    dispatcher.dispatch(response_from(0x0002, b"pong"));
    assert_eq!(
        dispatcher.application().calls(),
        &[AppCall::RecvResponse {
            source: Address(0x0002),
            payload: b"pong".to_vec(),
        }]
    );

    dispatcher.send_message(Address(0x0002), b"again").unwrap();
}

#[test]
fn test_message_timeout_reported_once() {
    let mut dispatcher = dispatcher(ProvisionerConfig::default());
    dispatcher.dispatch(prov_complete(0xAA, 1, 0x0002));
    dispatcher.application_mut().take_calls();
    dispatcher.send_message(Address(0x0002), b"ping").unwrap();

    dispatcher.dispatch(message_timeout(0x0002));
    dispatcher.set_time(Duration::from_secs(60));
    dispatcher.dispatch(Event::Timer(TimerId::RequestSweep));

    assert_eq!(
        dispatcher.application().calls(),
        &[AppCall::Timeout {
            destination: Address(0x0002),
            opcode: vendor::MESSAGE,
        }]
    );
}

#[test]
fn test_sweep_expires_lost_message() {
    let mut dispatcher = dispatcher(ProvisionerConfig::default());
    dispatcher.dispatch(prov_complete(0xAA, 1, 0x0002));
    dispatcher.application_mut().take_calls();
    dispatcher.send_message(Address(0x0002), b"ping").unwrap();

    dispatcher.set_time(Duration::from_secs(5));
    dispatcher.dispatch(Event::Timer(TimerId::RequestSweep));
    assert!(dispatcher.application().calls().is_empty());

    dispatcher.set_time(Duration::from_secs(15));
    dispatcher.dispatch(Event::Timer(TimerId::RequestSweep));
    assert_eq!(
        dispatcher.application().calls(),
        &[AppCall::Timeout {
            destination: Address(0x0002),
            opcode: vendor::MESSAGE,
        }]
    );
    assert_eq!(
        dispatcher.drain_timers(),
        vec![(TimerId::RequestSweep, Duration::from_secs(10))]
    );
}

#[test]
fn test_failed_send_releases_destination() {
    let mut dispatcher = dispatcher(ProvisionerConfig::default());
    dispatcher.dispatch(prov_complete(0xAA, 1, 0x0002));
    dispatcher.transport_mut().fail_next("client_model_send", -7);

    let err = dispatcher.send_message(Address(0x0002), b"ping").unwrap_err();
    assert!(matches!(err, MessagingError::Transport(e) if e.code == -7));
    assert!(dispatcher.orchestrator().messaging().pending().is_empty());

    dispatcher.send_message(Address(0x0002), b"ping").unwrap();
}

#[test]
fn test_inbound_message_answered_on_its_context() {
    let mut dispatcher = dispatcher(ProvisionerConfig::default());
    dispatcher.dispatch(message_from(0x0009, b"hello"));

    let inbound = dispatcher.application_mut().take_inbound().unwrap();
    dispatcher.send_response(inbound, b"world").unwrap();

    let responses = dispatcher.transport().calls_named("server_model_send");
    assert_eq!(responses.len(), 1);
    let TransportCall::ServerModelSend {
        model,
        context,
        opcode,
        payload,
    } = responses[0]
    else {
        unreachable!()
    };
    assert_eq!(*model, ModelKind::VendorServer);
    assert_eq!(context.address, Address(0x0009));
    assert_eq!(*opcode, vendor::RESPONSE);
    assert_eq!(payload, b"world");
}

#[test]
fn test_broadcast_from_node_delivered() {
    let mut dispatcher = dispatcher(ProvisionerConfig::default());
    dispatcher.dispatch(broadcast_from(0x0007, b"hi all"));
    assert_eq!(
        dispatcher.application().calls(),
        &[AppCall::Broadcast {
            source: Address(0x0007),
            payload: b"hi all".to_vec(),
        }]
    );
}

#[traced_test]
#[test]
fn test_network_info_flags_unknown_node() {
    let mut dispatcher = dispatcher(ProvisionerConfig::default());
    dispatcher.dispatch(prov_complete(0xAA, 1, 0x0002));
    dispatcher.log_network_info();
    assert!(logs_contain("Node unknown to transport"));
}
