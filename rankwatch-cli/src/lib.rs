//! # rankwatch-cli
//!
//! Command-line companion to `rankwatch-sdk`: aggregates the per-rank
//! snapshot files a run left behind and writes text reports.
//!
//! ## Usage
//!
//! ```bash
//! # Timer summary over ./snapshots/duration_dict_<rank>.json for 4 ranks
//! rankwatch timers --world-size 4 --detail
//!
//! # GPU memory summary, saved as ./result/cora_4_gpu.txt
//! rankwatch gpu --world-size 4 --prefix cora_4_gpu
//!
//! # Threaded demo run that leaves snapshots behind
//! rankwatch demo --world-size 3 --steps 10
//! ```
//!
//! Settings can also come from a TOML file (`--config`) or `RANKWATCH_*`
//! environment variables; see [`settings`].
//!
//! ## As a library
//!
//! ```no_run
//! use std::path::Path;
//! use rankwatch_cli::offline;
//!
//! if let Some(report) = offline::timer_summary(Path::new("./snapshots"), 2) {
//!     println!("{}", report);
//! }
//! ```

pub mod demo;
pub mod duration;
pub mod offline;
pub mod settings;

pub use settings::{Overrides, Settings};
