// Library for tests to access modules

pub mod aggregate;
pub mod capture;
pub mod charts;
pub mod config;
pub mod error;
pub mod frames;
pub mod models;
pub mod parser;
pub mod partition;
pub mod run;
pub mod table;
