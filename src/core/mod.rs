//! 核心：致命错误分类与任务取消监管

pub mod error;
pub mod supervisor;

pub use error::TaskError;
pub use supervisor::TaskSupervisor;
