pub use fan_out::{fan_out, half_of};

mod fan_out;
