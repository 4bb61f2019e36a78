//! Fan scheduling.
//!
//! The fan follows the minimum-layer-time speed scaling: a layer that
//! had to slow down to half speed or less gets full fan, faster layers
//! interpolate between the configured minimum and maximum, and the
//! first layers get no fan at all so they bond to the bed.

use crate::config::Settings;

/// Fan duty for one layer, in percent.
///
/// `extrude_factor_percent` is the planner's extrusion speed factor
/// after minimum-layer-time scaling (100 = unscaled).
pub fn fan_percent(settings: &Settings, extrude_factor_percent: i32, layer_index: usize) -> i32 {
    if (layer_index as u32) < settings.first_layer_to_allow_fan {
        return 0;
    }

    let factor = extrude_factor_percent.clamp(0, 100);
    if factor <= 50 {
        settings.fan_speed_max_percent
    } else {
        let n = factor - 50;
        (settings.fan_speed_min_percent * n + settings.fan_speed_max_percent * (50 - n)) / 50
    }
}
