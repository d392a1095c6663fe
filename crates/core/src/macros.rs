// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative macros shared by the object model.

/// Implement `Display` for a fieldless enum from a variant → label table.
///
/// ```ignore
/// crate::simple_display! {
///     SwState {
///         Initial => "INITIAL",
///         Downloaded => "DOWNLOADED",
///     }
/// }
/// ```
#[macro_export]
macro_rules! simple_display {
    ($enum:ty { $( $variant:ident => $label:expr ),+ $(,)? }) => {
        impl std::fmt::Display for $enum {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(match self {
                    $( Self::$variant => $label, )+
                })
            }
        }
    };
}

/// Implement [`BusObject`](crate::BusObject) for a record whose key is
/// derived by the given closure-like expression over `self`.
///
/// ```ignore
/// crate::bus_object!(DatastoreConfig, "DatastoreConfig", |s| s.uuid.to_string());
/// ```
#[macro_export]
macro_rules! bus_object {
    ($ty:ty, $name:expr, |$s:ident| $key:expr) => {
        impl $crate::BusObject for $ty {
            const TYPE_NAME: &'static str = $name;

            fn key(&self) -> String {
                let $s = self;
                $key
            }
        }
    };
}
