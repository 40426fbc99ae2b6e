use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use kiosk_net::{Method, RequestErrorKind};
use proptest::prelude::*;
use serde_json::json;

use super::*;
use crate::test_utils::MockTransport;

const MS: Duration = Duration::from_millis(1);

fn session() -> Session<MockTransport> {
    session_with(KioskConfig::default(), LaunchParams::default())
}

fn session_with(config: KioskConfig, launch: LaunchParams) -> Session<MockTransport> {
    Session::new(config, launch, MockTransport::new())
}

/// Bootstrap against an empty defaults response and return the time of the
/// tick that processed it.
fn boot(s: &mut Session<MockTransport>, t0: Instant) -> Instant {
    s.tick(t0);
    assert!(s.transport_mut().respond("/getDefaults", json!({})));
    let t = t0 + 10 * MS;
    s.tick(t);
    assert_eq!(s.helper_phase(), HelperPhase::Polling);
    t
}

// -- Update merger ---------------------------------------------------------

#[test]
fn noise_update_is_a_noop() {
    let mut s = session();
    let before = s.state().clone();
    let outcome = s.apply_update(
        &json!({"weather": "sunny", "allowance": true, "colour": [1, 2]}),
        UpdateSource::Server,
    );
    assert!(outcome.is_noop());
    assert_eq!(*s.state(), before);
    assert!(s.transport().submitted.is_empty());
    assert!(s.drain_events().is_empty());
}

proptest! {
    #[test]
    fn arbitrary_unknown_keys_change_nothing(
        entries in proptest::collection::btree_map(
            "zz_[a-z]{1,8}",
            prop_oneof![
                Just(Value::Null),
                any::<bool>().prop_map(Value::from),
                any::<i32>().prop_map(Value::from),
                "[a-z ]{0,10}".prop_map(Value::from),
            ],
            0..8,
        ),
        from_server in any::<bool>(),
    ) {
        let mut s = session();
        let before = s.state().clone();
        let raw = Value::Object(entries.into_iter().collect());
        let source = if from_server { UpdateSource::Server } else { UpdateSource::Helper };
        let outcome = s.apply_update(&raw, source);
        prop_assert!(outcome.is_noop());
        prop_assert_eq!(s.state(), &before);
        prop_assert!(s.transport().submitted.is_empty());
    }
}

#[test]
fn identity_and_addresses_overwrite() {
    let mut s = session();
    let outcome = s.apply_update(
        &json!({
            "id": "Lobby Kiosk",
            "group": "Atrium",
            "helperAddress": "http://localhost:8001",
            "server_ip_address": "10.0.0.5",
            "server_port": "8082",
        }),
        UpdateSource::Helper,
    );
    assert!(outcome.identity_changed);
    assert!(outcome.helper_address_changed);
    assert!(outcome.server_address_changed);
    assert_eq!(s.state().id, "Lobby Kiosk");
    assert_eq!(s.state().group, "Atrium");
    assert_eq!(s.state().helper_address, "http://localhost:8001");
    assert_eq!(s.state().server_address, "http://10.0.0.5:8082");
}

#[test]
fn half_a_server_address_is_ignored() {
    let mut s = session();
    s.apply_update(&json!({"server_ip_address": "10.0.0.5"}), UpdateSource::Helper);
    assert!(s.state().server_address.is_empty());
    s.apply_update(&json!({"server_port": 8082}), UpdateSource::Helper);
    assert!(s.state().server_address.is_empty());
}

#[test]
fn changed_exhibit_acknowledged_once() {
    let mut s = session();
    s.apply_update(&json!({"current_exhibit": "Dinosaurs"}), UpdateSource::Server);
    assert_eq!(s.transport().count("/setDefaults"), 1);
    let ack = s.transport().last_to("/setDefaults").unwrap();
    assert_eq!(ack.method, Method::Post);
    assert_eq!(ack.base_url, "http://localhost:8000");
    assert_eq!(
        ack.body,
        Some(json!({"defaults": {"current_exhibit": "Dinosaurs"}}))
    );

    let outcome = s.apply_update(&json!({"current_exhibit": "Dinosaurs"}), UpdateSource::Server);
    assert!(!outcome.acknowledged);
    assert_eq!(s.transport().count("/setDefaults"), 1);

    s.apply_update(&json!({"current_exhibit": "Oceans"}), UpdateSource::Server);
    assert_eq!(s.transport().count("/setDefaults"), 2);
    assert_eq!(
        s.transport().last_to("/setDefaults").unwrap().body,
        Some(json!({"defaults": {"current_exhibit": "Oceans"}}))
    );
}

#[test]
fn helper_sourced_exhibit_change_is_not_acknowledged() {
    let mut s = session();
    let outcome = s.apply_update(&json!({"current_exhibit": "Dinosaurs"}), UpdateSource::Helper);
    assert!(outcome.exhibit_changed);
    assert!(!outcome.acknowledged);
    assert_eq!(s.state().current_exhibit, "Dinosaurs");
    assert_eq!(s.transport().count("/setDefaults"), 0);
}

#[test]
fn content_reorder_is_a_change() {
    let mut s = session();
    s.apply_update(&json!({"content": ["a", "b"]}), UpdateSource::Server);
    assert_eq!(s.transport().count("/setDefaults"), 1);

    let same = s.apply_update(&json!({"content": ["a", "b"]}), UpdateSource::Server);
    assert!(!same.content_changed);
    assert_eq!(s.transport().count("/setDefaults"), 1);

    let reordered = s.apply_update(&json!({"content": ["b", "a"]}), UpdateSource::Server);
    assert!(reordered.content_changed);
    assert_eq!(s.state().current_content, vec!["b", "a"]);
    assert_eq!(
        s.transport().last_to("/setDefaults").unwrap().body,
        Some(json!({"defaults": {"content": ["b", "a"]}}))
    );
}

#[test]
fn exhibit_and_content_share_one_ack() {
    let mut s = session();
    s.apply_update(
        &json!({"current_exhibit": "E", "content": ["x"]}),
        UpdateSource::Server,
    );
    assert_eq!(s.transport().count("/setDefaults"), 1);
    assert_eq!(
        s.transport().last_to("/setDefaults").unwrap().body,
        Some(json!({"defaults": {"current_exhibit": "E", "content": ["x"]}}))
    );
}

#[test]
fn applying_twice_equals_applying_once() {
    let update = json!({
        "id": "k1",
        "group": "G",
        "current_exhibit": "E",
        "content": ["a", "b"],
        "permissions": {"refresh": true},
        "missingContentWarnings": ["a"],
        "software_update": {"update_available": true},
    });
    let mut s = session();
    s.apply_update(&update, UpdateSource::Server);
    let once = s.state().clone();
    let acks = s.transport().count("/setDefaults");

    let second = s.apply_update(&update, UpdateSource::Server);
    assert!(second.is_noop());
    assert_eq!(*s.state(), once);
    assert_eq!(s.transport().count("/setDefaults"), acks);
    assert_eq!(acks, 1);
}

#[test]
fn permissions_replace_wholesale() {
    let mut s = session();
    s.apply_update(
        &json!({"permissions": {"refresh": true, "restart": true}}),
        UpdateSource::Server,
    );
    s.apply_update(&json!({"permissions": {"shutdown": true}}), UpdateSource::Server);
    let p = &s.state().permissions;
    assert_eq!(p.get("refresh"), None);
    assert_eq!(p.get("restart"), None);
    assert!(p.allows("shutdown"));
}

#[test]
fn allow_keys_set_single_permissions() {
    let mut s = session();
    s.apply_update(&json!({"permissions": {"restart": true}}), UpdateSource::Server);
    s.apply_update(&json!({"allow_refresh": true}), UpdateSource::Server);
    assert!(s.state().permissions.allows("refresh"));
    assert!(s.state().permissions.allows("restart"));
}

#[test]
fn null_permissions_leave_permissions_unchanged() {
    let mut s = session();
    s.apply_update(&json!({"permissions": {"refresh": true}}), UpdateSource::Server);
    let before = s.state().clone();

    let outcome = s.apply_update(&json!({"permissions": null}), UpdateSource::Server);
    assert!(outcome.is_noop());
    assert_eq!(*s.state(), before);
    assert!(s.state().permissions.allows("refresh"));
}

#[test]
fn missing_content_warnings_overwrite() {
    let mut s = session();
    s.apply_update(&json!({"missingContentWarnings": ["a.mp4"]}), UpdateSource::Helper);
    s.apply_update(&json!({"missingContentWarnings": []}), UpdateSource::Helper);
    assert_eq!(s.state().error_dict["missingContentWarnings"], json!([]));
}

#[test]
fn software_update_flag_is_sticky() {
    let mut s = session();
    s.apply_update(
        &json!({"software_update": {"update_available": false}}),
        UpdateSource::Server,
    );
    assert!(!s.state().error_dict.contains_key("software_update"));

    s.apply_update(
        &json!({"software_update": {"update_available": true, "available_version": "5"}}),
        UpdateSource::Server,
    );
    s.apply_update(
        &json!({"software_update": {"update_available": false}}),
        UpdateSource::Server,
    );
    assert_eq!(
        s.state().error_dict["software_update"],
        json!({"update_available": true, "available_version": "5"})
    );
}

// -- Update parser ----------------------------------------------------------

#[test]
fn parser_sees_every_raw_update_last() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&seen);
    let mut s = session().with_update_parser(move |raw| {
        log.borrow_mut().push(raw.clone());
        Ok(())
    });
    s.apply_update(&json!({"dmx_universe": 3}), UpdateSource::Server);
    s.apply_update(&json!(null), UpdateSource::Helper);
    assert_eq!(*seen.borrow(), vec![json!({"dmx_universe": 3}), json!(null)]);
}

#[test]
fn parser_error_does_not_break_merge() {
    let mut s = session()
        .with_update_parser(|_| Err(KioskError::Parser("bad scene".to_string())));
    let outcome = s.apply_update(&json!({"id": "k2"}), UpdateSource::Helper);
    assert!(outcome.identity_changed);
    assert_eq!(s.state().id, "k2");
}

#[test]
fn parser_panic_is_contained() {
    let mut s = session().with_update_parser(|_| panic!("app bug"));
    s.apply_update(&json!({"group": "G"}), UpdateSource::Helper);
    assert_eq!(s.state().group, "G");
    s.apply_update(&json!({"group": "H"}), UpdateSource::Helper);
    assert_eq!(s.state().group, "H");
}

// -- Commands ---------------------------------------------------------------

#[test]
fn dmx_scene_issues_a_single_get() {
    let mut s = session();
    s.apply_update(&json!({"commands": ["set_dmx_scene__7"]}), UpdateSource::Server);
    let submitted = &s.transport().submitted;
    assert_eq!(submitted.len(), 1);
    let req = &submitted[0].1;
    assert_eq!(req.method, Method::Get);
    assert_eq!(req.url(), "http://localhost:8000/DMX/setScene/7");
    assert!(s.drain_events().is_empty());
}

#[test]
fn refresh_page_respects_permission() {
    let mut s = session();
    s.apply_update(&json!({"permissions": {"refresh": false}}), UpdateSource::Server);
    s.apply_update(&json!({"commands": ["refresh_page"]}), UpdateSource::Server);
    assert!(s.drain_events().is_empty());

    s.apply_update(&json!({"permissions": {"refresh": true}}), UpdateSource::Server);
    s.apply_update(&json!({"commands": ["refresh_page"]}), UpdateSource::Server);
    assert_eq!(s.drain_events(), vec![SessionEvent::ReloadPage]);
}

#[test]
fn commands_run_in_order() {
    let mut s = session();
    let n = s.dispatch(&[
        "sleepDisplays".to_string(),
        "bogus".to_string(),
        "restart".to_string(),
        "reloadDefaults".to_string(),
    ]);
    assert_eq!(n, 3);
    let endpoints: Vec<&str> = s
        .transport()
        .submitted
        .iter()
        .map(|(_, r)| r.endpoint.as_str())
        .collect();
    assert_eq!(endpoints, vec!["/sleepDisplay", "/restart", "/getDefaults"]);
}

#[test]
fn reload_defaults_merges_as_helper_update() {
    let t0 = Instant::now();
    let mut s = session();
    let t = boot(&mut s, t0);
    s.dispatch(&["reloadDefaults".to_string()]);
    assert!(s.transport_mut().respond("/getDefaults", json!({"current_exhibit": "E2"})));
    s.tick(t + MS);
    assert_eq!(s.state().current_exhibit, "E2");
    assert_eq!(s.transport().count("/setDefaults"), 0);
}

#[test]
fn legacy_helper_bootstraps_with_action_post() {
    let config = KioskConfig {
        legacy_helper: true,
        ..KioskConfig::default()
    };
    let mut s = session_with(config, LaunchParams::default());
    s.tick(Instant::now());
    let req = s.transport().last_to("/").unwrap();
    assert_eq!(req.method, Method::Post);
    assert_eq!(req.body, Some(json!({"action": "getDefaults"})));
}

// -- Helper loop --------------------------------------------------------------

#[test]
fn bootstrap_retries_until_success() {
    let t0 = Instant::now();
    let mut s = session();
    let mut t = t0;
    s.tick(t);
    let mut sent_at = vec![t];

    for _ in 0..3 {
        assert!(s.transport_mut().fail("/getDefaults", RequestErrorKind::Timeout));
        t += 100 * MS;
        s.tick(t);
        assert!(!s.helper_reachable());

        t += 499 * MS;
        s.tick(t);
        assert_eq!(s.transport().count("/getDefaults"), sent_at.len());

        t += MS;
        s.tick(t);
        assert_eq!(s.transport().count("/getDefaults"), sent_at.len() + 1);
        sent_at.push(t);
    }

    assert!(s.transport_mut().respond("/getDefaults", json!({})));
    t += 100 * MS;
    s.tick(t);

    assert_eq!(s.transport().count("/getDefaults"), 4);
    for pair in sent_at.windows(2) {
        assert!(pair[1] - pair[0] >= 500 * MS);
    }
    assert!(s.helper_reachable());
    assert_eq!(
        s.drain_events(),
        vec![SessionEvent::HelperUnreachable, SessionEvent::HelperReachable]
    );

    // No further bootstraps once polling.
    s.tick(t + 10_000 * MS);
    assert_eq!(s.transport().count("/getDefaults"), 4);
}

#[test]
fn bootstrap_retries_after_lost_completion() {
    let t0 = Instant::now();
    let mut s = session();
    s.tick(t0);
    assert_eq!(s.transport().count("/getDefaults"), 1);

    // The worker never answers: 2000 ms request timeout plus 500 ms grace.
    s.tick(t0 + 2499 * MS);
    assert_eq!(s.transport().count("/getDefaults"), 1);
    assert!(s.drain_events().is_empty());

    s.tick(t0 + 2500 * MS);
    assert!(!s.helper_reachable());
    assert_eq!(s.drain_events(), vec![SessionEvent::HelperUnreachable]);
    assert_eq!(s.helper_phase(), HelperPhase::Bootstrapping);

    s.tick(t0 + 3000 * MS);
    assert_eq!(s.transport().count("/getDefaults"), 2);

    // A late answer to the abandoned request is dropped.
    assert!(s.transport_mut().respond("/getDefaults", json!({"id": "late"})));
    s.tick(t0 + 3010 * MS);
    assert_eq!(s.helper_phase(), HelperPhase::Bootstrapping);
    assert_ne!(s.state().id, "late");

    assert!(s.transport_mut().respond("/getDefaults", json!({"id": "k1"})));
    s.tick(t0 + 3020 * MS);
    assert_eq!(s.helper_phase(), HelperPhase::Polling);
    assert_eq!(s.state().id, "k1");
    assert_eq!(s.drain_events(), vec![SessionEvent::HelperReachable]);
}

#[test]
fn bootstrap_requests_use_bootstrap_timeout() {
    let mut s = session();
    s.tick(Instant::now());
    let req = s.transport().last_to("/getDefaults").unwrap();
    assert_eq!(req.timeout, Duration::from_millis(2000));
}

#[test]
fn polls_for_updates_every_interval() {
    let t0 = Instant::now();
    let mut s = session();
    let t = boot(&mut s, t0);
    assert_eq!(s.transport().count("/getUpdate"), 0);

    s.tick(t + 999 * MS);
    assert_eq!(s.transport().count("/getUpdate"), 0);
    s.tick(t + 1000 * MS);
    assert_eq!(s.transport().count("/getUpdate"), 1);
    assert_eq!(
        s.transport().last_to("/getUpdate").unwrap().timeout,
        Duration::from_millis(500)
    );

    // A failed poll is only logged; the next one still goes out.
    assert!(s.transport_mut().fail("/getUpdate", RequestErrorKind::Timeout));
    s.tick(t + 1500 * MS);
    assert!(s.helper_reachable());
    s.tick(t + 2000 * MS);
    assert_eq!(s.transport().count("/getUpdate"), 2);
    assert!(s.drain_events().is_empty());
}

#[test]
fn poll_response_is_merged() {
    let t0 = Instant::now();
    let mut s = session();
    let t = boot(&mut s, t0);
    s.tick(t + 1000 * MS);
    assert!(s.transport_mut().respond("/getUpdate", json!({"group": "West Wing"})));
    s.tick(t + 1001 * MS);
    assert_eq!(s.state().group, "West Wing");
}

// -- Server loop --------------------------------------------------------------

#[test]
fn no_ping_without_server() {
    let t0 = Instant::now();
    let mut s = session();
    let t = boot(&mut s, t0);
    s.tick(t + 20_000 * MS);
    assert_eq!(s.transport().count("/system/ping"), 0);
}

#[test]
fn pings_carry_identity_and_errors() {
    let t0 = Instant::now();
    let mut s = session();
    s.apply_update(
        &json!({
            "id": "k1",
            "group": "G",
            "server_ip_address": "10.0.0.5",
            "server_port": 8082,
            "permissions": {"refresh": true},
        }),
        UpdateSource::Helper,
    );
    s.record_interaction(t0);
    s.tick(t0);

    let ping = s.transport().last_to("/system/ping").unwrap();
    assert_eq!(ping.url(), "http://10.0.0.5:8082/system/ping");
    assert_eq!(ping.timeout, Duration::from_millis(2000));
    let body = ping.body.as_ref().unwrap();
    assert_eq!(body["id"], "k1");
    assert_eq!(body["group"], "G");
    assert_eq!(body["helperAddress"], "http://localhost:8000");
    assert_eq!(body["permissions"], json!({"refresh": true}));
    assert_eq!(body["constellation_app_id"], "infostation");
    assert_eq!(body["currentInteraction"], true);
    assert!(body["platform_details"]["operating_system"].is_string());
    assert!(body.get("error").is_none());

    s.apply_update(&json!({"missingContentWarnings": ["a.mp4"]}), UpdateSource::Helper);
    s.tick(t0 + 4999 * MS);
    assert_eq!(s.transport().count("/system/ping"), 1);
    s.tick(t0 + 40_000 * MS);
    assert_eq!(s.transport().count("/system/ping"), 2);
    let body = s.transport().last_to("/system/ping").unwrap().body.clone().unwrap();
    assert_eq!(body["error"], json!({"missingContentWarnings": ["a.mp4"]}));
    assert_eq!(body["currentInteraction"], false);
}

#[test]
fn ping_response_is_a_server_update() {
    let t0 = Instant::now();
    let mut s = session();
    s.apply_update(
        &json!({"server_ip_address": "10.0.0.5", "server_port": "8082"}),
        UpdateSource::Helper,
    );
    s.tick(t0);
    assert!(s.transport_mut().respond("/system/ping", json!({"current_exhibit": "Space"})));
    s.tick(t0 + 10 * MS);
    assert_eq!(s.state().current_exhibit, "Space");
    assert_eq!(s.transport().count("/setDefaults"), 1);
}

#[test]
fn failed_ping_waits_for_next_tick() {
    let t0 = Instant::now();
    let mut s = session();
    s.apply_update(
        &json!({"server_ip_address": "10.0.0.5", "server_port": "8082"}),
        UpdateSource::Helper,
    );
    s.tick(t0);
    assert!(s.transport_mut().fail("/system/ping", RequestErrorKind::Status(500)));
    s.tick(t0 + 10 * MS);
    assert_eq!(s.transport().count("/system/ping"), 1);
    s.tick(t0 + 5000 * MS);
    assert_eq!(s.transport().count("/system/ping"), 2);
}

// -- Definitions ----------------------------------------------------------------

#[test]
fn definition_for_same_app_reloads_without_navigation() {
    let loaded = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&loaded);
    let mut s = session().with_definition_loader(move |d| {
        sink.borrow_mut().push(d.uuid().unwrap_or_default().to_string());
        Ok(())
    });

    let outcome = s.apply_update(&json!({"definition": "B"}), UpdateSource::Server);
    assert_eq!(outcome.definition_requested.as_deref(), Some("B"));
    assert_eq!(s.transport().count("/definitions/B/load"), 1);

    let def = json!({"app": "infostation", "uuid": "B"});
    assert!(s.transport_mut().respond(
        "/definitions/B/load",
        json!({"success": true, "definition": def})
    ));
    s.tick(Instant::now());

    assert_eq!(s.state().current_definition, "B");
    assert!(!s.is_navigating());
    let events = s.drain_events();
    assert!(!events.iter().any(|e| matches!(e, SessionEvent::Navigate { .. })));
    assert!(events.contains(&SessionEvent::DefinitionLoaded(
        Definition::from_value(def).unwrap()
    )));
    assert_eq!(*loaded.borrow(), vec!["B".to_string()]);
}

#[test]
fn definition_for_other_app_navigates_once() {
    let mut s = session();
    s.apply_update(&json!({"definition": "B"}), UpdateSource::Server);
    assert!(s.transport_mut().respond(
        "/definitions/B/load",
        json!({"success": true, "definition": {"app": "media_player", "uuid": "B"}})
    ));
    let t0 = Instant::now();
    s.tick(t0);

    assert!(s.is_navigating());
    assert_eq!(
        s.drain_events(),
        vec![SessionEvent::Navigate {
            path: "/media_player.html".to_string()
        }]
    );

    // The session is done once it navigates.
    let sent = s.transport().submitted.len();
    s.tick(t0 + 60_000 * MS);
    assert_eq!(s.transport().submitted.len(), sent);
    assert!(s.drain_events().is_empty());
}

#[test]
fn unchanged_or_in_flight_definition_is_not_refetched() {
    let mut s = session();
    s.apply_update(&json!({"definition": "A"}), UpdateSource::Helper);
    s.apply_update(&json!({"definition": "A"}), UpdateSource::Server);
    assert_eq!(s.transport().count("/definitions/A/load"), 1);

    assert!(s.transport_mut().respond(
        "/definitions/A/load",
        json!({"success": true, "definition": {"app": "infostation", "uuid": "A"}})
    ));
    s.tick(Instant::now());
    assert_eq!(s.state().current_definition, "A");

    let outcome = s.apply_update(&json!({"definition": "A"}), UpdateSource::Helper);
    assert_eq!(outcome.definition_requested, None);
    assert_eq!(s.transport().count("/definitions/A/load"), 1);

    s.apply_update(&json!({"definition": "B"}), UpdateSource::Helper);
    assert_eq!(s.transport().count("/definitions/B/load"), 1);
}

#[test]
fn failed_definition_load_keeps_current_definition() {
    let mut s = session();
    s.apply_update(&json!({"definition": "A"}), UpdateSource::Helper);
    assert!(s.transport_mut().respond(
        "/definitions/A/load",
        json!({"success": false, "reason": "not found"})
    ));
    s.tick(Instant::now());
    assert!(s.state().current_definition.is_empty());
    assert!(s.drain_events().is_empty());

    // A later update may try again.
    s.apply_update(&json!({"definition": "A"}), UpdateSource::Helper);
    assert_eq!(s.transport().count("/definitions/A/load"), 2);
}

#[test]
fn returning_to_current_definition_supersedes_in_flight_load() {
    let mut s = session();
    let t0 = Instant::now();
    s.apply_update(&json!({"definition": "A"}), UpdateSource::Helper);
    assert!(s.transport_mut().respond(
        "/definitions/A/load",
        json!({"success": true, "definition": {"app": "infostation", "uuid": "A"}})
    ));
    s.tick(t0);
    assert_eq!(s.state().current_definition, "A");
    s.drain_events();

    s.apply_update(&json!({"definition": "B"}), UpdateSource::Helper);
    assert_eq!(s.transport().count("/definitions/B/load"), 1);
    let outcome = s.apply_update(&json!({"definition": "A"}), UpdateSource::Helper);
    assert_eq!(outcome.definition_requested.as_deref(), Some("A"));
    assert_eq!(s.transport().count("/definitions/A/load"), 2);

    // B arrives after A was asked for again and must not win.
    assert!(s.transport_mut().respond(
        "/definitions/B/load",
        json!({"success": true, "definition": {"app": "infostation", "uuid": "B"}})
    ));
    s.tick(t0 + 10 * MS);
    assert_eq!(s.state().current_definition, "A");
    assert!(s.drain_events().is_empty());

    assert!(s.transport_mut().respond(
        "/definitions/A/load",
        json!({"success": true, "definition": {"app": "infostation", "uuid": "A"}})
    ));
    s.tick(t0 + 20 * MS);
    assert_eq!(s.state().current_definition, "A");
    let events = s.drain_events();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], SessionEvent::DefinitionLoaded(d) if d.uuid() == Some("A")));
}

#[test]
fn self_managed_app_ignores_server_definitions() {
    let config = KioskConfig {
        self_managed_definition: true,
        ..KioskConfig::default()
    };
    let mut s = session_with(config, LaunchParams::default());
    s.apply_update(&json!({"definition": "A"}), UpdateSource::Server);
    assert_eq!(s.transport().count("/definitions/A/load"), 0);
    s.apply_update(&json!({"definition": "A"}), UpdateSource::Helper);
    assert_eq!(s.transport().count("/definitions/A/load"), 1);
}

#[test]
fn unknown_app_does_not_navigate() {
    let mut s = session();
    s.apply_update(&json!({"definition": "X"}), UpdateSource::Helper);
    assert!(s.transport_mut().respond(
        "/definitions/X/load",
        json!({"success": true, "definition": {"app": "spreadsheet", "uuid": "X"}})
    ));
    s.tick(Instant::now());
    assert!(!s.is_navigating());
    assert!(!s.drain_events().iter().any(|e| matches!(e, SessionEvent::Navigate { .. })));
}

#[test]
fn other_app_uses_configured_path() {
    let config = KioskConfig {
        other_app_path: Some("/apps/custom/index.html".to_string()),
        ..KioskConfig::default()
    };
    let mut s = session_with(config, LaunchParams::default());
    assert!(s.goto_app("other"));
    assert_eq!(
        s.drain_events(),
        vec![SessionEvent::Navigate {
            path: "/apps/custom/index.html".to_string()
        }]
    );
}

#[test]
fn standalone_loads_launch_definition_and_never_pings() {
    let launch = LaunchParams {
        standalone: true,
        definition: Some("preview-1".to_string()),
    };
    let mut s = session_with(KioskConfig::default(), launch);
    let t0 = Instant::now();
    s.tick(t0);
    assert_eq!(s.transport().count("/definitions/preview-1/load"), 1);

    s.apply_update(
        &json!({
            "server_ip_address": "10.0.0.5",
            "server_port": "8082",
            "definition": "other-def",
        }),
        UpdateSource::Helper,
    );
    s.tick(t0 + 10_000 * MS);
    assert_eq!(s.transport().count("/definitions/preview-1/load"), 1);
    assert_eq!(s.transport().count("/definitions/other-def/load"), 0);
    assert_eq!(s.transport().count("/system/ping"), 0);
}

// -- Interaction ------------------------------------------------------------------

#[test]
fn interaction_window_expires() {
    let t0 = Instant::now();
    let mut s = session();
    assert!(!s.current_interaction(t0));
    s.record_interaction(t0);
    assert!(s.current_interaction(t0 + 29_999 * MS));
    assert!(!s.current_interaction(t0 + 30_000 * MS));
}
