pub mod config;
pub mod domain;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod input;
pub mod ledger;
pub mod oa;
pub mod output;
pub mod pipeline;
pub mod resolver;
pub mod store;
