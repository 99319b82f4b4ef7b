#![forbid(unsafe_code)]

pub mod error;
pub mod evaluator;
pub mod model;
pub mod random;
pub mod time;

pub use error::Error;
pub use evaluator::{BadgeAward, BadgeEvaluator, UnlockThresholds};
pub use random::{RandomSource, ThreadRandom};
pub use time::Clock;
