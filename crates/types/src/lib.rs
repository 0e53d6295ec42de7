pub mod artifact;
pub mod chain;
pub mod constants;
pub mod key;
pub mod proof;
pub mod utils;
