// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;
use yare::parameterized;

#[parameterized(
    zero = { 0, 0 },
    one_byte = { 1, 1 },
    exact = { 1024, 1 },
    one_over = { 1025, 2 },
    one_mib = { 1_048_576, 1024 },
)]
fn rounds_bytes_up_to_kb(bytes: u64, kb: u64) {
    assert_eq!(round_up_kb(bytes), kb);
}

#[test]
fn reserve_then_commit_moves_space_to_used() {
    let mut q = QuotaLedger::new(4096);
    q.try_reserve(1024).unwrap();
    assert_eq!(q.status().reserved_space_kb, 1024);
    assert_eq!(q.remaining_kb(), 3072);

    q.commit(1024, 1024).unwrap();
    assert_eq!(q.reserved_kb(), 0);
    assert_eq!(q.used_kb(), 1024);
    assert_eq!(q.remaining_kb(), 3072);
}

#[test]
fn reserve_refuses_request_that_fills_remaining() {
    let mut q = QuotaLedger::new(1024);
    let err = q.try_reserve(1024).unwrap_err();
    assert_eq!(err.to_string(), "Would exceed remaining space 1024 vs 1024");
    assert_eq!(q.reserved_kb(), 0);
}

#[test]
fn commit_larger_than_quota_releases_reservation_only() {
    let mut q = QuotaLedger::new(100);
    q.try_reserve(10).unwrap();
    assert!(q.commit(10, 500).is_err());
    assert_eq!(q.reserved_kb(), 0);
    assert_eq!(q.used_kb(), 0);
}

#[test]
fn init_caps_measured_space_at_max() {
    let mut q = QuotaLedger::new(100);
    q.init(250);
    assert_eq!(q.used_kb(), 100);
    assert_eq!(q.remaining_kb(), 0);
}

#[test]
fn claimed_space_is_used_until_freed() {
    let mut q = QuotaLedger::new(100);
    q.claim(30);
    assert_eq!(q.used_kb(), 30);
    assert_eq!(q.remaining_kb(), 70);
    q.free(30);
    assert_eq!(q.used_kb(), 0);
}

#[test]
fn release_and_free_saturate() {
    let mut q = QuotaLedger::new(100);
    q.release(5);
    q.free(5);
    assert_eq!(
        q.status(),
        GlobalDownloadStatus { used_space_kb: 0, reserved_space_kb: 0, remaining_space_kb: 100 }
    );
}

#[derive(Debug, Clone)]
enum Op {
    Reserve(u64),
    Release(u64),
    Commit(u64, u64),
    Free(u64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u64..2048).prop_map(Op::Reserve),
        (0u64..2048).prop_map(Op::Release),
        ((0u64..2048), (0u64..2048)).prop_map(|(r, a)| Op::Commit(r, a)),
        (0u64..2048).prop_map(Op::Free),
    ]
}

proptest! {
    #[test]
    fn ledger_invariant_holds_after_every_operation(
        max in 0u64..8192,
        ops in proptest::collection::vec(op(), 0..64)
    ) {
        let mut q = QuotaLedger::new(max);
        for op in ops {
            match op {
                Op::Reserve(kb) => { let _ = q.try_reserve(kb); }
                Op::Release(kb) => q.release(kb),
                Op::Commit(r, a) => { let _ = q.commit(r, a); }
                Op::Free(kb) => q.free(kb),
            }
            prop_assert!(q.used_kb() + q.reserved_kb() <= q.max_kb());
            prop_assert_eq!(q.remaining_kb(), q.max_kb() - q.used_kb() - q.reserved_kb());
        }
    }
}
