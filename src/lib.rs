//! # Prometheus Coalesce
//!
//! A coalescing, single-flight execution scheduler for expensive remote refreshes.
//!
//! Many independent callers can ask for "(re)run this action" without talking to
//! each other. The scheduler makes sure the action never runs twice at once, keeps
//! at most one follow-up run queued behind the current one, drains payload-carrying
//! forced runs in FIFO order, and paces consecutive runs with a minimum delay.
//!
//! ## Core Problem Solved
//!
//! Remote resources punish eager clients:
//!
//! - **Throttled edits**: a status message edited on every state change hits rate limits
//! - **Credential refresh**: a failed login retried by every caller hammers the provider
//! - **Reconnection storms**: many components noticing the same outage all reconnect
//!
//! Routing all of those requests through a [`CoalescingScheduler`](core::CoalescingScheduler)
//! turns N logical requests into at most one physical execution plus one queued rerun.
//!
//! ## Key Features
//!
//! - **Single-flight**: one execution in flight per scheduler instance
//! - **Dirty coalescing**: any number of "run again" requests collapse into one rerun
//! - **Result cache**: non-dirty callers can reuse the last successful value
//! - **Forced FIFO lane**: payload-carrying runs that are never merged with each other
//! - **Pacing**: a between-executions delay driven by a rearm-able [`DeadlineTimer`](core::DeadlineTimer)
//! - **Cooperative disposal**: the running action sees a cancellation token, every
//!   outstanding handle resolves to a terminal failure
//!
//! ## Example
//!
//! ```rust,ignore
//! use prometheus_coalesce::config::SchedulerConfig;
//! use prometheus_coalesce::core::{CoalescingScheduler, ExecutionContext};
//!
//! let scheduler = CoalescingScheduler::new(
//!     |_ctx: ExecutionContext<()>| async move { anyhow::Ok(fetch_status().await?) },
//!     SchedulerConfig::default().with_between_executions_delay_ms(1_000),
//! )?;
//!
//! // Every state change asks for a fresh run; bursts collapse into one rerun.
//! let status = scheduler.execute(true)?.await?;
//!
//! // Readers that only need "a recent value" hit the cache.
//! let cached = scheduler.execute(false)?.await?;
//! ```
//!
//! For complete examples, see:
//! - `tests/scheduler_test.rs` - Coalescing, forced and disposal behaviour
//! - `tests/timer_test.rs` - Deadline timer rearm policies

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions: scheduler, deadline timer, handles and errors.
pub mod core;
/// Configuration models for scheduler instances.
pub mod config;
/// Builders to construct schedulers from configuration.
pub mod builders;
/// Runtime adapters.
pub mod runtime;
/// Shared utilities.
pub mod util;
