pub mod change_detector;
pub mod indexing_engine;
pub mod matcher;
pub mod scanner;
pub mod task_queue;
