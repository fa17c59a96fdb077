//! ecs-tunnel: forward local ports into AWS ECS tasks
//!
//! Library half of the `ecs-tunnel` binary: forward requests parsed from the
//! command line and console output helpers.

pub mod forward;
pub mod output;
