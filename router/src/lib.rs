pub mod algo;
pub mod analysis;
pub mod engine;
pub mod error;
pub mod grid;
pub mod terminal;
pub mod utils;

pub use algo::Route;
pub use engine::{Diagnostics, Engine, LinkRequest, Pad, PadRef, ProgressPoll};
pub use error::{Result, RouteError};
pub use utils::conversion::Quantizer;
