mod datasets;
mod health;

pub use datasets::*;
pub use health::*;
