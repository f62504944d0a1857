pub mod requirement;
pub mod generation_status;
