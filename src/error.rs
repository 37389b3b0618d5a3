//! 错误类型

use thiserror::Error;

/// 引擎错误
///
/// 只在构建/加载边界返回；逐帧的动画和物理路径在本地降级并记录日志。
#[derive(Error, Debug)]
pub enum AnimError {
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("骨架无效: {0}")]
    InvalidSkeleton(String),

    #[error("运动数据库解析错误: {0}")]
    MotionDatabaseParse(String),

    #[error("重力区域句柄已失效 (index={index}, generation={generation})")]
    StaleZoneHandle { index: u32, generation: u32 },
}

pub type Result<T> = std::result::Result<T, AnimError>;
