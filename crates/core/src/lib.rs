pub mod config;
pub mod error;
pub mod kind;
pub mod path_map;

pub use config::Config;
pub use error::*;
pub use kind::RuleSetKind;
pub use path_map::PathMapper;
