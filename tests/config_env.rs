// tests/config_env.rs
//
// These tests manipulate environment variables and must not interleave;
// every test holds ENV_MUTEX for its whole body.

use std::sync::Mutex;

use clockgate::{
    resolve_effective_profile, ClampProfile, Config, ProfileSource, RngKind, DEFAULT_LFSR_SEED,
};

static ENV_MUTEX: Mutex<()> = Mutex::new(());

const VARS: [&str; 6] = [
    "CLOCKGATE_PROFILE",
    "CLOCKGATE_UPDATE_INTERVAL",
    "CLOCKGATE_EPSILON",
    "CLOCKGATE_DIVIDER_MAX",
    "CLOCKGATE_SEED",
    "CLOCKGATE_RNG",
];

fn clear_env() {
    for var in VARS {
        std::env::remove_var(var);
    }
}

#[test]
fn env_profile_wins_over_default() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clear_env();

    std::env::set_var("CLOCKGATE_PROFILE", "legacy");
    let effective = resolve_effective_profile(None);
    assert_eq!(effective.profile, ClampProfile::Legacy);
    assert_eq!(effective.source, ProfileSource::Env);

    let cfg = Config::from_env_or_profile(effective.profile);
    assert_eq!(cfg.engine.divider_max, 3);
    assert_eq!(cfg.engine.explore_mask, 3);

    clear_env();
}

#[test]
fn cli_profile_wins_over_env() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clear_env();

    std::env::set_var("CLOCKGATE_PROFILE", "legacy");
    let effective = resolve_effective_profile(Some(ClampProfile::Final));
    assert_eq!(effective.profile, ClampProfile::Final);
    assert_eq!(effective.source, ProfileSource::Cli);

    clear_env();
}

#[test]
fn invalid_env_profile_falls_back_to_default() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clear_env();

    std::env::set_var("CLOCKGATE_PROFILE", "definitely_not_a_profile");
    let effective = resolve_effective_profile(None);
    assert_eq!(effective.profile, ClampProfile::Final);
    assert_eq!(effective.source, ProfileSource::Default);

    std::env::set_var("CLOCKGATE_PROFILE", "");
    assert_eq!(resolve_effective_profile(None).source, ProfileSource::Default);

    clear_env();
}

#[test]
fn unset_env_leaves_profile_preset() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clear_env();

    assert_eq!(
        Config::from_env_or_profile(ClampProfile::Final),
        Config::for_profile(ClampProfile::Final)
    );
    assert_eq!(
        Config::from_env_or_profile(ClampProfile::Legacy),
        Config::for_profile(ClampProfile::Legacy)
    );
}

#[test]
fn numeric_env_overrides_are_applied() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clear_env();

    std::env::set_var("CLOCKGATE_UPDATE_INTERVAL", "250");
    std::env::set_var("CLOCKGATE_EPSILON", " 64 ");
    std::env::set_var("CLOCKGATE_DIVIDER_MAX", "2");
    std::env::set_var("CLOCKGATE_SEED", "0xBEEF");
    std::env::set_var("CLOCKGATE_RNG", "ChaCha");

    let cfg = Config::from_env_or_profile(ClampProfile::Final);
    assert_eq!(cfg.engine.update_interval, 250);
    assert_eq!(cfg.engine.epsilon, 64);
    assert_eq!(cfg.engine.divider_max, 2);
    assert_eq!(cfg.seed, 0xBEEF);
    assert_eq!(cfg.rng, RngKind::Chacha);
    // Untouched fields keep the preset.
    assert_eq!(cfg.engine.explore_mask, 1);
    assert!(cfg.validate().is_ok());

    std::env::set_var("CLOCKGATE_SEED", "4242");
    assert_eq!(Config::from_env_or_profile(ClampProfile::Final).seed, 4242);

    clear_env();
}

#[test]
fn unparseable_env_overrides_are_ignored() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clear_env();

    std::env::set_var("CLOCKGATE_UPDATE_INTERVAL", "soon");
    std::env::set_var("CLOCKGATE_EPSILON", "300");
    std::env::set_var("CLOCKGATE_DIVIDER_MAX", "-1");
    std::env::set_var("CLOCKGATE_SEED", "0xNOPE");
    std::env::set_var("CLOCKGATE_RNG", "mersenne");

    let cfg = Config::from_env_or_profile(ClampProfile::Legacy);
    assert_eq!(cfg.engine.update_interval, 1000);
    assert_eq!(cfg.engine.epsilon, 26);
    assert_eq!(cfg.engine.divider_max, 3);
    assert_eq!(cfg.seed, DEFAULT_LFSR_SEED);
    assert_eq!(cfg.rng, RngKind::Lfsr);

    clear_env();
}

#[test]
fn env_interval_below_episode_length_fails_validation() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clear_env();

    std::env::set_var("CLOCKGATE_UPDATE_INTERVAL", "3");
    let cfg = Config::from_env_or_profile(ClampProfile::Final);
    assert_eq!(cfg.engine.update_interval, 3);
    assert!(cfg.validate().is_err());

    clear_env();
}
