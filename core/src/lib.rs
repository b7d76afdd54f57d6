//! gridsynth-core — synthetic electric-utility billing dataset generator.
//!
//! The pipeline advances a meter/transformer population month by month
//! (new connections, replacements, failures, churn, tariff changes,
//! transformer upgrades), generates interval readings with injected
//! data-quality defects, reconciles monthly bills from the defective
//! reading stream, and simulates payment outcomes.

pub mod billing;
pub mod config;
pub mod entity;
pub mod error;
pub mod event;
pub mod factory;
pub mod payment;
pub mod pipeline;
pub mod population;
pub mod reading;
pub mod rng;
pub mod store;
pub mod tariff;
pub mod types;
