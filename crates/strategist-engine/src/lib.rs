//! Strategy flow execution: graph and order-index resolvers, node
//! executors, and the cron scheduler that drives them.

pub mod condition;
pub mod engine;
pub mod executors;
pub mod extract;
pub mod graph;
pub mod interpolate;
pub mod legacy;
pub mod log_sink;
pub mod scheduler;
pub mod variables;

pub use engine::{RunOutcome, StrategyFlowEngine};
pub use executors::NodeOutput;
pub use graph::FlowGraph;
pub use interpolate::interpolate;
pub use log_sink::LogSink;
pub use scheduler::StrategyScheduler;
pub use variables::VariableEnv;
