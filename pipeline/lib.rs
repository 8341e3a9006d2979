#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

pub mod config;
pub mod data;
pub mod progress;
pub mod run;

#[path = "../select/mod.rs"]
pub mod select;

#[path = "../fit/mod.rs"]
pub mod fit;

#[path = "../report/mod.rs"]
pub mod report;
