//! G-code generation.
//!
//! [`path_order`] sequences the polygons of a layer, [`planner`]
//! turns them into travel/extrude paths with combing, retraction and
//! cooling policy, and [`writer`] formats the actual commands for the
//! configured printer dialect.

pub mod cooling;
pub mod path_order;
pub mod planner;
pub mod writer;

pub use cooling::fan_percent;
pub use path_order::PathOrderOptimizer;
pub use planner::{GCodePlanner, PathConfig, PathRole};
pub use writer::GCodeWriter;
