//! Core chain model, evaluation, and analysis

pub mod analysis;
pub mod chain;
pub mod diagnose;
pub mod error;
pub mod eval;
pub mod intent;
pub mod parse;
pub mod reconcile;
pub mod runtime;

#[cfg(test)]
pub mod test_helpers;

#[cfg(test)]
mod tests;
