//! Behavioural coverage for configuration layering.

use std::cell::RefCell;
use std::ffi::OsString;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use harness_config::Config;

struct Harness {
    cli_args: RefCell<Vec<OsString>>,
    env_overrides: RefCell<Vec<(String, Option<OsString>)>>,
    loaded: RefCell<Option<Result<Config, String>>>,
}

impl Harness {
    fn new() -> Self {
        Self {
            cli_args: RefCell::new(vec![OsString::from("harness")]),
            env_overrides: RefCell::new(Vec::new()),
            loaded: RefCell::new(None),
        }
    }

    fn set_env(&self, key: &str, value: &str) {
        let previous = std::env::var_os(key);
        // Environment mutation is `unsafe` in edition 2024. Overrides are
        // restored in `Drop`, and each scenario touches a distinct variable.
        unsafe { std::env::set_var(key, value) };
        self.env_overrides
            .borrow_mut()
            .push((key.to_owned(), previous));
    }

    fn load(&self) {
        let args = self.cli_args.borrow().clone();
        let result = Config::load_from_iter(args).map_err(|error| error.to_string());
        *self.loaded.borrow_mut() = Some(result);
    }

    fn config(&self) -> Config {
        match self.loaded.borrow().as_ref() {
            Some(Ok(config)) => config.clone(),
            Some(Err(error)) => panic!("configuration failed to load: {error}"),
            None => panic!("configuration was not loaded"),
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        for (key, previous) in self.env_overrides.borrow_mut().drain(..) {
            match previous {
                Some(value) => unsafe { std::env::set_var(&key, value) },
                None => unsafe { std::env::remove_var(&key) },
            }
        }
    }
}

#[fixture]
fn harness() -> Harness {
    Harness::new()
}

fn strip_quotes(value: &str) -> &str {
    value.trim_matches('"')
}

#[given("no configuration flags")]
fn given_no_flags(harness: &Harness) {
    assert_eq!(harness.cli_args.borrow().len(), 1);
}

#[given("the environment variable {key} is {value}")]
fn given_env(harness: &Harness, key: String, value: String) {
    harness.set_env(&key, strip_quotes(&value));
}

#[given("the command line flag {flag} is {value}")]
fn given_flag(harness: &Harness, flag: String, value: String) {
    let mut args = harness.cli_args.borrow_mut();
    args.push(OsString::from(flag));
    args.push(OsString::from(strip_quotes(&value)));
}

#[when("the configuration is loaded")]
fn when_loaded(harness: &Harness) {
    harness.load();
}

#[then("the address is {expected}")]
fn then_address(harness: &Harness, expected: String) {
    assert_eq!(harness.config().addr, strip_quotes(&expected));
}

#[then("the start timeout is {millis} milliseconds")]
fn then_timeout(harness: &Harness, millis: u64) {
    assert_eq!(harness.config().start_timeout_ms, millis);
}

#[then("the log filter is {expected}")]
fn then_log_filter(harness: &Harness, expected: String) {
    assert_eq!(harness.config().log_filter(), strip_quotes(&expected));
}

#[then("the start command is {expected}")]
fn then_start_command(harness: &Harness, expected: String) {
    assert_eq!(
        harness.config().start_command.as_deref(),
        Some(strip_quotes(&expected))
    );
}

#[then("loading fails mentioning {fragment}")]
fn then_fails(harness: &Harness, fragment: String) {
    let loaded = harness.loaded.borrow();
    let Some(Err(message)) = loaded.as_ref() else {
        panic!("expected configuration loading to fail");
    };
    assert!(
        message.contains(strip_quotes(&fragment)),
        "expected '{fragment}' in '{message}'"
    );
}

#[scenario(
    path = "tests/features/configuration_precedence.feature",
    name = "Defaults apply when nothing is configured"
)]
fn defaults_apply(#[from(harness)] harness: Harness) {
    let _ = harness;
}

#[scenario(
    path = "tests/features/configuration_precedence.feature",
    name = "Environment variables override defaults"
)]
fn environment_overrides_defaults(#[from(harness)] harness: Harness) {
    let _ = harness;
}

#[scenario(
    path = "tests/features/configuration_precedence.feature",
    name = "Command line flags override environment variables"
)]
fn cli_overrides_environment(#[from(harness)] harness: Harness) {
    let _ = harness;
}

#[scenario(
    path = "tests/features/configuration_precedence.feature",
    name = "Malformed values fail fast"
)]
fn malformed_values_fail(#[from(harness)] harness: Harness) {
    let _ = harness;
}
