pub mod config;
pub mod decision;
pub mod demand;
pub mod error;
pub mod lane;
pub mod record;

pub use config::SmartwayConfig;
pub use decision::*;
pub use demand::*;
pub use error::*;
pub use lane::*;
pub use record::*;
