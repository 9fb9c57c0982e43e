pub mod config;
pub mod identity;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod publish;
pub mod rollup;
pub mod schedule;
pub mod store;
pub mod versions;
