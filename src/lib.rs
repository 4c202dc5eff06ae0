pub mod app;
pub mod demo_tasks;
pub mod shutdown;
