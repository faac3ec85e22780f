pub mod bargraph_task;
pub mod button_task;
pub mod diag_task;
pub mod lights_task;
pub mod monitor_task;
