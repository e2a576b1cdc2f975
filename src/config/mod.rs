//! 配置模块

mod app_config;

pub use app_config::{parse_exclude_list, AppConfig};
