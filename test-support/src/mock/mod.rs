//! Mock 实现模块
//!
//! 提供文件系统引擎所依赖的宿主操作的 Mock 实现，用于测试

pub mod fs;
