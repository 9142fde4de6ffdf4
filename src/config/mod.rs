//! Configuration models for scheduler instances.

pub mod scheduler;

pub use scheduler::{
    SchedulerConfig, ENV_BETWEEN_EXECUTIONS_DELAY_MS, ENV_CAN_BE_DIRTY,
    ENV_EXECUTE_NON_DIRTY_IF_IDLE, MAX_BETWEEN_EXECUTIONS_DELAY_MS,
};
