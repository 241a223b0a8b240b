//! A three-tier batch service for long-running scientific model runs:
//! submissions come in through a web front-end, wait in a central queue
//! until the submitter confirms them by mail, and are then executed by a
//! pool of polling workers that deliver the results by email.
//!
//! The binaries `modelq-queue`, `modelq-worker` and `modelq-web` each run
//! one tier; everything they share lives in this library.

pub mod configuration;
pub mod domain;
pub mod email_client;
pub mod queue;
pub mod queue_client;
pub mod registry;
pub mod telemetry;
pub mod utils;
pub mod web;
pub mod worker;
