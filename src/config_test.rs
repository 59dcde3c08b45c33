use super::*;

// =============================================================================
// env_parse
// =============================================================================

#[test]
fn env_parse_missing_returns_default() {
    let val: usize = env_parse("__INKHUB_TEST_MISSING_KEY__", 42);
    assert_eq!(val, 42);
}

#[test]
fn env_parse_present_valid() {
    unsafe { std::env::set_var("__INKHUB_TEST_EP_VALID__", "99") };
    let val: usize = env_parse("__INKHUB_TEST_EP_VALID__", 0);
    assert_eq!(val, 99);
    unsafe { std::env::remove_var("__INKHUB_TEST_EP_VALID__") };
}

#[test]
fn env_parse_present_invalid_returns_default() {
    unsafe { std::env::set_var("__INKHUB_TEST_EP_INVALID__", "notanumber") };
    let val: u64 = env_parse("__INKHUB_TEST_EP_INVALID__", 7);
    assert_eq!(val, 7);
    unsafe { std::env::remove_var("__INKHUB_TEST_EP_INVALID__") };
}

// =============================================================================
// Config
// =============================================================================

#[test]
fn short_data_dir_flag_sets_layout() {
    let config = Config::try_parse_from(["inkhub", "-d", "/srv/ink"]).expect("parse");
    assert_eq!(config.data_dir, PathBuf::from("/srv/ink"));
    assert_eq!(config.message_dir(), PathBuf::from("/srv/ink/message"));
    assert_eq!(config.asset_dir(), PathBuf::from("/srv/ink/vector"));
}

#[test]
fn replay_scope_flag_accepts_full() {
    let config = Config::try_parse_from(["inkhub", "--replay-scope", "full"]).expect("parse");
    assert_eq!(config.replay_scope, ReplayScope::Full);
}

#[test]
fn replay_scope_flag_rejects_unknown_value() {
    assert!(Config::try_parse_from(["inkhub", "--replay-scope", "everything"]).is_err());
}

#[test]
fn shutdown_grace_is_whole_seconds() {
    let config = Config::try_parse_from(["inkhub", "--shutdown-grace-secs", "3"]).expect("parse");
    assert_eq!(config.shutdown_grace(), Duration::from_secs(3));
}
