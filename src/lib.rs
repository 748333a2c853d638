pub mod app;
pub mod chebi;
pub mod config;
pub mod dataset;
pub mod domain;
pub mod error;
pub mod graph;
pub mod mapping;
pub mod merger;
pub mod normalize;
pub mod output;
pub mod reference;
pub mod store;
pub mod uniprot;
pub mod warehouse;
