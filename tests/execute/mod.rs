//! Step definitions and scenarios for `tests/features/execute.feature`.

mod bdd_steps;
mod scenarios;
mod test_helpers;
