// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

mod app_lifecycle;
mod base_os;
mod restart;
