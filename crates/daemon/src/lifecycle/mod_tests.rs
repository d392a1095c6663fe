// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn config_paths_live_under_the_state_dir() {
    let config = Config::for_dir("/var/lib/ef");
    assert_eq!(config.lock_path, PathBuf::from("/var/lib/ef/efd.pid"));
    assert_eq!(config.log_path, PathBuf::from("/var/lib/ef/efd.log"));
    assert_eq!(config.config_path, PathBuf::from("/var/lib/ef/efd.toml"));
    assert_eq!(config.paths().config_file(), config.config_path);
}

#[test]
#[serial_test::serial]
fn config_load_follows_state_dir_override() {
    std::env::set_var("EF_STATE_DIR", "/tmp/ef-override");
    let config = Config::load().unwrap();
    std::env::remove_var("EF_STATE_DIR");
    assert_eq!(config.state_dir, PathBuf::from("/tmp/ef-override"));
}
