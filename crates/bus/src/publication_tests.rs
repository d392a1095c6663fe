// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::test_helpers::*;
use crate::{Bus, Publication, Subscription};
use ef_core::AgentName;

fn setup() -> (Publication<Item>, Subscription<Item, Recorder>) {
    let bus = Bus::in_memory();
    let publication = bus.publication::<Item>(AgentName::Zedagent, None).unwrap();
    let mut sub = bus
        .subscribe::<Item, Recorder>(AgentName::Zedagent, None)
        .unwrap()
        .on_modify(on_modify)
        .on_delete(on_delete)
        .on_restart(on_restart)
        .on_synchronized(on_synchronized);
    sub.activate();
    (publication, sub)
}

#[test]
fn publish_then_get() {
    let (publication, _sub) = setup();
    publication.publish("a", &item("a", 1)).unwrap();
    assert_eq!(publication.get("a"), Some(item("a", 1)));
    assert_eq!(publication.get("missing"), None);
    assert_eq!(publication.len(), 1);
}

#[test]
fn get_all_is_a_snapshot() {
    let (publication, _sub) = setup();
    publication.publish("a", &item("a", 1)).unwrap();
    let snapshot = publication.get_all();
    publication.publish("b", &item("b", 2)).unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(publication.get_all().len(), 2);
}

#[test]
fn identical_republish_does_not_notify() {
    let (publication, mut sub) = setup();
    let mut ctx = Recorder::default();
    sub.drain(&mut ctx).unwrap();

    publication.publish("a", &item("a", 1)).unwrap();
    publication.publish("a", &item("a", 1)).unwrap();
    publication.publish("a", &item("a", 2)).unwrap();
    sub.drain(&mut ctx).unwrap();

    assert_eq!(ctx.events, vec!["synchronized true", "modify a=1", "modify a=2"]);
}

#[test]
fn mismatched_key_is_dropped() {
    let (publication, _sub) = setup();
    publication.publish("b", &item("a", 1)).unwrap();
    assert!(publication.is_empty());
}

#[test]
fn unpublish_unknown_key_is_not_an_error() {
    let (publication, _sub) = setup();
    publication.unpublish("ghost").unwrap();
}

#[test]
fn notifications_follow_call_order() {
    let (publication, mut sub) = setup();
    publication.publish("a", &item("a", 1)).unwrap();
    publication.publish("b", &item("b", 1)).unwrap();
    publication.unpublish("a").unwrap();
    publication.publish("a", &item("a", 3)).unwrap();

    let mut ctx = Recorder::default();
    sub.drain(&mut ctx).unwrap();
    assert_eq!(
        ctx.events,
        vec!["synchronized true", "modify a=1", "modify b=1", "delete a=1", "modify a=3"]
    );
}

#[test]
fn signal_restarted_fans_out_once() {
    let (publication, mut sub) = setup();
    publication.signal_restarted();
    publication.signal_restarted();
    assert!(publication.restarted());

    let mut ctx = Recorder::default();
    sub.drain(&mut ctx).unwrap();
    assert_eq!(ctx.restart_calls, 1);
}

#[test]
fn clear_then_signal_does_not_refire_subscriber_handler() {
    let (publication, mut sub) = setup();
    let mut ctx = Recorder::default();
    publication.signal_restarted();
    sub.drain(&mut ctx).unwrap();

    publication.clear_restarted();
    assert!(!publication.restarted());
    publication.signal_restarted();
    sub.drain(&mut ctx).unwrap();

    assert_eq!(ctx.restart_calls, 1);
    assert!(sub.restarted());
}
