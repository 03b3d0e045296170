//! Shell data model: commands, stages, jobs, and the parser that produces them.

pub mod command;
pub mod job;
pub mod parser;
pub mod variable_expansion;
