// Engine commands: check, plan, apply, explain, graph
pub mod engine;
