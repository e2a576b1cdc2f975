//! 服务层模块

pub mod docstrings;
