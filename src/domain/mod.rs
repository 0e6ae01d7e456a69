pub mod models;
pub mod task_view;
pub mod time_accountant;
