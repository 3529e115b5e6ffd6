#![warn(clippy::pedantic)]
// Noisy doc/signature lints
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
// format!("{}", x) is kept for complex expressions
#![allow(clippy::uninlined_format_args)]
// Intentional casts in wire and timing code (frame ids, elapsed millis)
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
// feishu::FeishuChannel and friends
#![allow(clippy::module_name_repetitions)]

pub mod bus;
pub mod channels;
pub mod cli;
pub mod config;
pub mod errors;
pub mod providers;
pub mod session;
pub mod utils;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
