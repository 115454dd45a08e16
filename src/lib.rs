pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod files;
pub mod fuzzy;
pub mod geo;
pub mod join;
pub mod matrix;
pub mod merge;
pub mod ncbi;
pub mod output;
pub mod report;
pub mod retry;
pub mod series;
pub mod srr;
pub mod table;
