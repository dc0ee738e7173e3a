mod buffer;
mod set;

pub use buffer::{InterpolationState, NetworkInterpolator, Pose};
pub use set::InterpolatorSet;
