#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

pub mod collinearity;
pub mod config;
pub mod data;
pub mod error;
pub mod evaluate;
pub mod impute;
pub mod linalg;
pub mod model;
pub mod pipeline;
pub mod prune;
pub mod report;
pub mod split;
pub mod transform;
