//! Process configuration read from the environment by the command line tool.
//!
//! - `HUOBZ_TRACE=1` prints every executed instruction
//! - `HUOBZ_STEP_BUDGET=<n>` limits runs to `n` instructions
//!
//! Command line flags take precedence. A budget that is set but not a non-negative integer is
//! an error rather than no limit at all.

use std::{cell::RefCell, ffi::OsStr};

use crate::error::EnvError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Env {
    trace: bool,
    step_budget: Option<u64>,
}

thread_local! {
    /// Must only be mutated within `set_env`
    static ENV: RefCell<Option<Env>> = const { RefCell::new(None) };
}

pub fn init() -> Result<(), EnvError> {
    let value = Env {
        trace: var_is("HUOBZ_TRACE", "1"),
        step_budget: parse_budget(std::env::var("HUOBZ_STEP_BUDGET").ok())?,
    };
    set_env(value);
    Ok(())
}

pub fn is_trace_enabled() -> bool {
    with_env(|env| env.trace)
}

pub fn step_budget() -> Option<u64> {
    with_env(|env| env.step_budget)
}

fn set_env(value: Env) {
    ENV.with(|env| {
        let mut env = env.borrow_mut();
        assert!(
            env.is_none(),
            "tried to initialize environment state multiple times"
        );
        *env = Some(value);
    });
}

fn with_env<F, R>(callback: F) -> R
where
    F: Fn(&Env) -> R,
{
    ENV.with(|env| {
        let env = env.borrow();
        let env = env.unwrap_or_else(|| {
            panic!("tried to access environment state before initialization");
        });
        callback(&env)
    })
}

fn parse_budget(value: Option<String>) -> Result<Option<u64>, EnvError> {
    match value {
        None => Ok(None),
        Some(v) => match v.trim().parse() {
            Ok(budget) => Ok(Some(budget)),
            Err(_) => Err(EnvError::InvalidStepBudget(v)),
        },
    }
}

fn var_is(name: impl AsRef<OsStr>, value: impl AsRef<str>) -> bool {
    std::env::var(name.as_ref()).is_ok_and(|v| v == value.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test runs on its own thread, so the thread-local starts empty
    #[test]
    fn reads_set_values() {
        set_env(Env {
            trace: true,
            step_budget: Some(40),
        });
        assert!(is_trace_enabled());
        assert_eq!(step_budget(), Some(40));
    }

    #[test]
    fn parses_budget() {
        assert_eq!(parse_budget(None), Ok(None));
        assert_eq!(parse_budget(Some("250".into())), Ok(Some(250)));
        assert_eq!(parse_budget(Some(" 0\n".into())), Ok(Some(0)));
        for bad in ["50x", "-5", "", "1e3"] {
            assert_eq!(
                parse_budget(Some(bad.into())),
                Err(EnvError::InvalidStepBudget(bad.into()))
            );
        }
    }

    #[test]
    #[should_panic(expected = "before initialization")]
    fn access_before_init() {
        is_trace_enabled();
    }
}
