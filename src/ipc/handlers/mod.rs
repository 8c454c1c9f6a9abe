pub mod attendance;
pub mod core;
pub mod recap;
pub mod students;
pub mod users;
