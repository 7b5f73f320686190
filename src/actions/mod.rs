//! Actions module: coordinate normalization and the device action facade.

mod coordinates;
mod handler;

pub use coordinates::{normalize_coordinate, normalize_point, CoordinateSystem, THOUSANDTHS_MAX};
pub use handler::{
    describe_actions, ActionError, ActionResult, ActionSpec, DeviceActions, Screenshot,
    ACTION_CATALOGUE, DEFAULT_TOOL_DELAY_MS, MAX_CLICKS, MAX_WAIT_MS, MIN_WAIT_MS,
};
