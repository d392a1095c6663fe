// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The contract every record carried on the bus satisfies.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Key used by singleton collections (network status, global config, quota).
pub const GLOBAL_KEY: &str = "global";

/// A typed record that can live in a publication.
///
/// `TYPE_NAME` is the struct name component of a collection identity;
/// `key()` is the record's self-reported key, checked against the key it is
/// published or delivered under.
pub trait BusObject:
    Clone + PartialEq + std::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const TYPE_NAME: &'static str;

    fn key(&self) -> String;
}
