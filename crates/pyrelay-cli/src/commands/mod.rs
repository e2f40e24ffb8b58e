pub mod config;
pub mod run;
pub mod shell;
pub mod validate;
pub mod worker;
