//! Core simulation engine.
//!
//! This module provides the fundamental types for replaying a portfolio:
//! - `Bar`: OHLC accumulator of balance, equity or exposure.
//! - `Trade`, `Component`, `Portfolio`: the backtested inputs.
//! - `SimulationOptions`: configuration of a run.
//! - `Simulator`: the bar-stepping engine producing a `SimulationResult`.

mod bar;
mod component;
mod options;
mod portfolio;
mod result;
mod simulator;
mod trade;

pub use bar::*;
pub use component::*;
pub use options::*;
pub use portfolio::*;
pub use result::*;
pub use simulator::*;
pub use trade::*;
