pub mod benchmark;
pub mod chunk;
pub mod config;
pub mod dataset;
pub mod ensemble;
pub mod fasta;
pub mod model;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod reports;
pub mod services;
pub mod table;
