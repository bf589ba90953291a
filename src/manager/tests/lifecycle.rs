//! Enable, disable and publish/subscribe instance handling.

use super::*;

#[test]
fn test_enable_uses_requested_nmi() {
    let manager = make_manager();
    assert_eq!(manager.state(), NanState::Disabled);

    let nmi = enable(&manager);

    assert_eq!(nmi, addr(0xaa));
    assert_eq!(manager.state(), NanState::Enabled);
    assert_eq!(manager.nmi(), addr(0xaa));
    assert_eq!(manager.firmware().sent(), vec![Sent::Enable(addr(0xaa))]);
}

#[test]
fn test_enable_uses_configured_nmi() {
    let mut config = Config::new();
    config.interface.nmi = Some(addr(0x10));
    let manager = make_manager_with(config);

    let nmi = manager.enable(&EnableRequest::default()).unwrap();
    assert_eq!(nmi, addr(0x10));
}

#[test]
fn test_enable_randomized_nmi() {
    let mut config = Config::new();
    config.interface.nmi = Some(addr(0x10));
    config.interface.randomize_nmi = Some(true);
    let manager = make_manager_with(config);

    let nmi = manager.enable(&EnableRequest::default()).unwrap();
    assert_ne!(nmi, addr(0x10));
    assert!(nmi.is_local());
    assert!(!nmi.is_multicast());
}

#[test]
fn test_enable_twice_rejected() {
    let manager = make_enabled_manager();
    let err = manager.enable(&EnableRequest::default()).unwrap_err();
    assert!(matches!(err, NanError::AlreadyEnabled));
    assert_eq!(err.status(), crate::error::NanStatus::AlreadyEnabled);
}

#[test]
fn test_enable_multicast_nmi_rejected() {
    let manager = make_manager();
    let req = EnableRequest {
        nmi: Some(MacAddr::BROADCAST),
        ..Default::default()
    };
    assert!(matches!(
        manager.enable(&req),
        Err(NanError::InvalidParameter(_))
    ));
    assert!(manager.firmware().sent().is_empty());
}

#[test]
fn test_enable_rejected_rolls_back() {
    let manager = make_manager();
    manager.firmware().reject(Command::Enable);

    let err = manager
        .enable(&EnableRequest {
            nmi: Some(addr(1)),
            ..Default::default()
        })
        .unwrap_err();

    assert!(matches!(
        err,
        NanError::ForwardRejected {
            command: Command::Enable,
            ..
        }
    ));
    assert_eq!(manager.state(), NanState::Disabled);
    assert!(manager.nmi().is_zero());

    manager.firmware().accept(Command::Enable);
    assert_eq!(enable(&manager), addr(0xaa));
}

#[test]
fn test_requests_refused_while_disabled() {
    let manager = make_manager();

    let err = manager.publish(&PublishRequest::default()).unwrap_err();
    assert!(matches!(err, NanError::NotReady));
    assert_eq!(
        err.status(),
        crate::error::NanStatus::UnsupportedConcurrencyNanDisabled
    );
    assert!(matches!(
        initiate(&manager, addr(1), addr(2)),
        Err(NanError::NotReady)
    ));
    assert!(manager.firmware().sent().is_empty());
}

#[test]
fn test_disable_when_disabled_is_noop() {
    let manager = make_manager();
    manager.disable(5);
    assert!(manager.firmware().sent().is_empty());
    assert_eq!(manager.state(), NanState::Disabled);
    assert_idle(&manager);

    enable(&manager);
    manager.disable(6);
    manager.firmware().clear();
    manager.disable(7);
    assert!(manager.firmware().sent().is_empty());
    assert_idle(&manager);
}

#[test]
fn test_disable_releases_everything() {
    let manager = make_enabled_manager();
    manager.create_data_interface(addr(0x50)).unwrap();
    let pid = publish(&manager);
    subscribe(&manager);
    manager.on_service_match(pid, 7, addr(1));
    manager
        .transmit_followup(&FollowupRequest {
            transaction_id: 4,
            session_id: pid,
            match_id: 7,
            peer: addr(1),
            payload: vec![1, 2],
        })
        .unwrap();
    establish(&manager, addr(1), addr(0x50), addr(0x61));
    initiate(&manager, addr(2), addr(0x50)).unwrap();
    manager.on_pairing_requested(addr(3), 9, pid).unwrap();

    let generation = manager.snapshot().generation;
    manager.disable(6);

    assert_eq!(manager.state(), NanState::Disabled);
    assert_eq!(manager.firmware().last(), Some(Sent::Disable));
    assert_idle(&manager);

    let snap = manager.snapshot();
    assert!(snap.nmi.is_zero());
    assert!(snap.generation > generation);
    assert_eq!(snap.discovery_sessions, 0);
    // Registered interfaces survive, without peers.
    assert_eq!(snap.interfaces.len(), 1);
}

#[test]
fn test_enable_disable_cycles_start_fresh() {
    let manager = make_manager();
    for _ in 0..3 {
        enable(&manager);
        assert_eq!(publish(&manager), 1);
        assert_eq!(initiate(&manager, addr(1), addr(2)).unwrap(), 1);
        manager.disable(0);
        assert_idle(&manager);
    }
}

#[test]
fn test_publish_allocates_lowest_free() {
    let manager = make_enabled_manager();

    let a = publish(&manager);
    let b = subscribe(&manager);
    let c = publish(&manager);
    assert_eq!((a, b, c), (1, 2, 3));

    manager.publish_cancel(0, a).unwrap();
    assert_eq!(subscribe(&manager), 1);
    assert_eq!(manager.snapshot().services, vec![1, 2, 3]);
}

#[test]
fn test_service_reuse_after_cancel() {
    let manager = make_enabled_manager();
    let ids: Vec<u16> = (0..5).map(|_| publish(&manager)).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);

    manager.publish_cancel(0, 2).unwrap();
    manager.publish_cancel(0, 4).unwrap();

    assert_eq!(publish(&manager), 2);
    assert_eq!(publish(&manager), 4);
    assert_eq!(publish(&manager), 6);
}

#[test]
fn test_service_ids_exhausted() {
    let mut config = Config::new();
    config.limits.max_services = Some(2);
    let manager = make_manager_with(config);
    enable(&manager);

    publish(&manager);
    subscribe(&manager);
    let err = manager.publish(&PublishRequest::default()).unwrap_err();

    assert!(matches!(
        err,
        NanError::Exhausted {
            resource: crate::error::Resource::ServiceId
        }
    ));
    assert!(err.is_retryable());
    assert_eq!(manager.snapshot().services, vec![1, 2]);
}

#[test]
fn test_publish_modify_keeps_id() {
    let manager = make_enabled_manager();
    let pid = publish(&manager);

    let again = manager
        .publish(&PublishRequest {
            publish_id: pid,
            ttl: 30,
            ..Default::default()
        })
        .unwrap();

    assert_eq!(again, pid);
    assert_eq!(manager.snapshot().services, vec![pid]);
}

#[test]
fn test_modify_wrong_role_rejected() {
    let manager = make_enabled_manager();
    let pid = publish(&manager);

    let err = manager
        .subscribe(&SubscribeRequest {
            subscribe_id: pid,
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(
        err,
        NanError::InvalidIdentifier {
            kind: IdKind::Subscribe,
            ..
        }
    ));

    let err = manager
        .publish(&PublishRequest {
            publish_id: 42,
            ..Default::default()
        })
        .unwrap_err();
    assert_eq!(
        err.status(),
        crate::error::NanStatus::InvalidPublishSubscribeId
    );
}

#[test]
fn test_publish_rejected_releases_id() {
    let manager = make_enabled_manager();
    manager.firmware().reject(Command::Publish);

    assert!(manager.publish(&PublishRequest::default()).is_err());
    assert!(manager.snapshot().services.is_empty());
    assert_eq!(manager.snapshot().discovery_sessions, 0);

    manager.firmware().accept(Command::Publish);
    assert_eq!(publish(&manager), 1);
}

#[test]
fn test_modify_rejected_keeps_instance() {
    let manager = make_enabled_manager();
    let sid = subscribe(&manager);
    manager.firmware().reject(Command::Subscribe);

    let err = manager
        .subscribe(&SubscribeRequest {
            subscribe_id: sid,
            ..Default::default()
        })
        .unwrap_err();

    assert!(matches!(err, NanError::ForwardRejected { .. }));
    assert_eq!(manager.snapshot().services, vec![sid]);
}

#[test]
fn test_cancel_unknown_and_wrong_role() {
    let manager = make_enabled_manager();
    let sid = subscribe(&manager);

    assert!(matches!(
        manager.publish_cancel(0, sid),
        Err(NanError::InvalidIdentifier { .. })
    ));
    assert!(matches!(
        manager.subscribe_cancel(0, 9),
        Err(NanError::InvalidIdentifier { .. })
    ));
    manager.subscribe_cancel(0, sid).unwrap();
    assert_eq!(manager.firmware().last(), Some(Sent::SubscribeCancel(sid)));
    assert!(manager.snapshot().services.is_empty());
}

#[test]
fn test_cancel_forward_failure_still_releases() {
    let manager = make_enabled_manager();
    let pid = publish(&manager);
    manager.firmware().reject(Command::PublishCancel);

    manager.publish_cancel(0, pid).unwrap();
    assert!(manager.snapshot().services.is_empty());
}

#[test]
fn test_firmware_termination_releases_service() {
    let manager = make_enabled_manager();
    let pid = publish(&manager);
    let sid = subscribe(&manager);

    assert!(!manager.on_publish_terminated(sid, 0));
    assert!(manager.on_publish_terminated(pid, 0));
    assert!(!manager.on_publish_terminated(pid, 0));
    assert!(manager.on_subscribe_terminated(sid, 1));
    assert_idle(&manager);
}

#[test]
fn test_match_records() {
    let manager = make_enabled_manager();
    let pid = publish(&manager);

    manager.on_service_match(pid, 3, addr(5));
    assert_eq!(manager.snapshot().discovery_sessions, 1);
    assert!(manager.on_match_expired(pid, 3));
    assert!(!manager.on_match_expired(pid, 3));
}

#[test]
fn test_data_interface_create_delete() {
    let manager = make_manager();

    manager.create_data_interface(addr(0x50)).unwrap();
    assert!(matches!(
        manager.create_data_interface(addr(0x50)),
        Err(NanError::Datapath(_))
    ));
    assert!(matches!(
        manager.create_data_interface(MacAddr::ZERO),
        Err(NanError::Datapath(_))
    ));

    manager.delete_data_interface(addr(0x50)).unwrap();
    let err = manager.delete_data_interface(addr(0x50)).unwrap_err();
    assert_eq!(err.status(), crate::error::NanStatus::InvalidParam);
}

#[test]
fn test_delete_busy_data_interface() {
    let manager = make_enabled_manager();
    manager.create_data_interface(addr(0x50)).unwrap();
    let ndp_id = establish(&manager, addr(1), addr(0x50), addr(0x61));

    assert!(matches!(
        manager.delete_data_interface(addr(0x50)),
        Err(NanError::Datapath(crate::datapath::DatapathError::Busy { .. }))
    ));

    manager.on_ndp_terminated(ndp_id, 0);
    manager.delete_data_interface(addr(0x50)).unwrap();
}

#[test]
fn test_new_validates_config() {
    let mut config = Config::new();
    config.limits.max_ndp_instances = Some(0);
    assert!(matches!(
        SessionManager::new(config, RecordingFirmware::new()),
        Err(NanError::Config(_))
    ));
}
