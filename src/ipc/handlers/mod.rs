pub mod backup;
pub mod core;
pub mod grades;
pub mod groups;
pub mod students;
