pub mod planner;

pub use planner::{parse_plan, IntentPlanner};
