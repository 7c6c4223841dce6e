//! Fetcher behaviour: subscription lifecycle and demultiplexing.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rstest::rstest;
use serde_json::json;

use tether_proto::{FetchEvent, FetchExpr, PathMatcher, SortSpec};

use crate::correlation::Callbacks;
use crate::errors::PeerError;
use crate::tests::support::{deliver, open_peer, respond_result};

#[rstest]
fn fetching_announces_the_expression_under_a_reserved_id() {
    let (mut peer, log) = open_peer();
    let handle = peer
        .fetch("lamp", |_, _, _| {}, Some(Callbacks::new()))
        .expect("fetch failed");

    let frame = log.last_frame();
    assert_eq!(frame.get("method"), Some(&json!("fetch")));
    assert_eq!(
        frame.get("params"),
        Some(&json!({"path": {"contains": "lamp"}, "id": "__f__0"}))
    );
    assert!(!handle.is_fetching(&peer));

    respond_result(&mut peer, 1, json!(true));
    assert!(handle.is_fetching(&peer));
}

#[rstest]
fn fetch_ids_stay_disjoint_from_paths() {
    let (mut peer, _log) = open_peer();
    let first = peer.fetch("a", |_, _, _| {}, None).expect("fetch failed");
    let second = peer.fetch("b", |_, _, _| {}, None).expect("fetch failed");

    assert_eq!(first.id(), "__f__0");
    assert_eq!(second.id(), "__f__1");
}

#[rstest]
fn notifications_demultiplex_to_the_fetch_callback() {
    let (mut peer, _log) = open_peer();
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    peer.fetch(
        "lamp",
        move |_, update, _| {
            sink.borrow_mut()
                .push((update.path, update.event, update.value));
        },
        None,
    )
    .expect("fetch failed");

    deliver(
        &mut peer,
        json!({
            "method": "__f__0",
            "params": {"path": "lamp/brightness", "event": "add", "value": 123}
        }),
    );
    deliver(
        &mut peer,
        json!({
            "method": "__f__0",
            "params": {"path": "lamp/brightness", "event": "change", "value": 456}
        }),
    );

    let seen = events.borrow();
    assert_eq!(
        *seen,
        vec![
            ("lamp/brightness".to_owned(), FetchEvent::Add, json!(123)),
            ("lamp/brightness".to_owned(), FetchEvent::Change, json!(456)),
        ]
    );
}

#[rstest]
fn unfetch_stops_notifications_once_acknowledged() {
    let (mut peer, _log) = open_peer();
    let count = Rc::new(Cell::new(0));
    let counter = Rc::clone(&count);
    let handle = peer
        .fetch("lamp", move |_, _, _| counter.set(counter.get() + 1), None)
        .expect("fetch failed");

    deliver(
        &mut peer,
        json!({"method": "__f__0", "params": {"path": "lamp", "event": "add", "value": 1}}),
    );
    assert_eq!(count.get(), 1);

    handle
        .unfetch(&mut peer, Some(Callbacks::new()))
        .expect("unfetch failed");
    assert!(handle.is_fetching(&peer));
    respond_result(&mut peer, 1, json!(true));
    assert!(!handle.is_fetching(&peer));

    deliver(
        &mut peer,
        json!({"method": "__f__0", "params": {"path": "lamp", "event": "change", "value": 2}}),
    );
    assert_eq!(count.get(), 1);
}

#[rstest]
fn unfetching_twice_succeeds_locally_without_a_round_trip() {
    let (mut peer, log) = open_peer();
    let handle = peer.fetch("lamp", |_, _, _| {}, None).expect("fetch failed");
    handle.unfetch(&mut peer, None).expect("unfetch failed");
    log.clear();

    let resolved = Rc::new(Cell::new(false));
    let flag = Rc::clone(&resolved);
    handle
        .unfetch(
            &mut peer,
            Some(Callbacks::new().on_success(move |_, _| flag.set(true))),
        )
        .expect("unfetch failed");

    assert!(resolved.get());
    assert_eq!(log.frame_count(), 0);
}

#[rstest]
fn refetching_reuses_the_original_id_and_expression() {
    let (mut peer, log) = open_peer();
    let handle = peer.fetch("lamp", |_, _, _| {}, None).expect("fetch failed");
    handle.unfetch(&mut peer, None).expect("unfetch failed");
    assert!(!handle.is_fetching(&peer));
    log.clear();

    handle.fetch(&mut peer, None).expect("re-fetch failed");

    assert!(handle.is_fetching(&peer));
    assert_eq!(
        log.last_frame().get("params"),
        Some(&json!({"path": {"contains": "lamp"}, "id": "__f__0"}))
    );
}

#[rstest]
fn fetching_while_subscribed_fails_locally() {
    let (mut peer, _log) = open_peer();
    let handle = peer.fetch("lamp", |_, _, _| {}, None).expect("fetch failed");

    let result = handle.fetch(&mut peer, None);
    assert!(matches!(result, Err(PeerError::AlreadyRegistered { .. })));
}

#[rstest]
fn fetchers_can_unfetch_themselves_from_inside_the_callback() {
    let (mut peer, _log) = open_peer();
    let count = Rc::new(Cell::new(0));
    let counter = Rc::clone(&count);
    let handle = peer
        .fetch(
            "once",
            move |peer, _, handle| {
                counter.set(counter.get() + 1);
                handle.unfetch(peer, None).expect("unfetch failed");
            },
            None,
        )
        .expect("fetch failed");

    deliver(
        &mut peer,
        json!({"method": "__f__0", "params": {"path": "once", "event": "add", "value": 1}}),
    );
    assert!(!handle.is_fetching(&peer));

    deliver(
        &mut peer,
        json!({"method": "__f__0", "params": {"path": "once", "event": "change", "value": 2}}),
    );
    assert_eq!(count.get(), 1);
}

#[rstest]
fn sorted_fetchers_receive_ordered_batches() {
    let (mut peer, log) = open_peer();
    let batches = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&batches);
    let expr = FetchExpr {
        path: Some(PathMatcher {
            starts_with: Some("a".to_owned()),
            ..PathMatcher::default()
        }),
        sort: Some(SortSpec {
            by_path: true,
            as_array: false,
            from: Some(2),
            to: Some(3),
        }),
    };
    peer.fetch_sorted(
        expr,
        move |_, update, _| sink.borrow_mut().push(update),
        None,
    )
    .expect("fetch_sorted failed");

    let frame = log.last_frame();
    assert_eq!(
        frame.pointer("/params/sort"),
        Some(&json!({"byPath": true, "from": 2, "to": 3}))
    );

    deliver(
        &mut peer,
        json!({
            "method": "__f__0",
            "params": {
                "changes": [
                    {"path": "abc", "value": 123, "index": 2},
                    {"path": "add", "value": 4112, "index": 3}
                ],
                "n": 2
            }
        }),
    );

    let seen = batches.borrow();
    assert_eq!(seen.len(), 1);
    let batch = seen.first().expect("batch missing");
    assert_eq!(batch.n, 2);
    assert_eq!(
        batch
            .changes
            .iter()
            .map(|entry| entry.path.as_str())
            .collect::<Vec<_>>(),
        vec!["abc", "add"]
    );
}

#[rstest]
fn mismatched_fetch_modes_are_rejected() {
    let (mut peer, _log) = open_peer();
    let sorted = FetchExpr {
        path: None,
        sort: Some(SortSpec::default()),
    };
    assert!(matches!(
        peer.fetch(sorted, |_, _, _| {}, None),
        Err(PeerError::FetchModeMismatch)
    ));
    assert!(matches!(
        peer.fetch_sorted(FetchExpr::from("plain"), |_, _, _| {}, None),
        Err(PeerError::FetchModeMismatch)
    ));
}

#[rstest]
fn malformed_fetch_notifications_are_dropped() {
    let (mut peer, _log) = open_peer();
    let count = Rc::new(Cell::new(0));
    let counter = Rc::clone(&count);
    peer.fetch("lamp", move |_, _, _| counter.set(counter.get() + 1), None)
        .expect("fetch failed");

    deliver(
        &mut peer,
        json!({"method": "__f__0", "params": {"event": "nonsense"}}),
    );
    assert_eq!(count.get(), 0);
}
