//! Rate limiting logic and counter state.

mod counter;
mod decision;
mod limiter;

pub use counter::{ClientCounter, CounterTable};
pub use decision::{Decision, ReasonCode};
pub use limiter::RateLimiter;
