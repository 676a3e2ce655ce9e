pub mod analyzers;
pub mod catalog;
pub mod output;
pub mod parser;
pub mod session;
pub mod stats;
