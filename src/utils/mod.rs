pub use in_flight::{InFlightGuard, InFlightTracker};

mod in_flight;
