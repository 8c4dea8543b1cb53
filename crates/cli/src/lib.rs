//! Library surface of the `guesstz` binary: the matching engine, exposed so
//! benchmarks and downstream tooling can drive it without the CLI.

pub mod engine;
