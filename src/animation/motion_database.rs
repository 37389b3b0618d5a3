//! 运动数据库
//!
//! JSON 格式：数值数组的数组，每行固定 `ROW_SIZE` 个数，行号即隐式帧号。
//!
//! 行布局：
//! | 偏移 | 含义 |
//! |------|------|
//! | 0 | 帧号 |
//! | 1..4 | 髋部位置 |
//! | 4..8 | 髋部旋转 (x, y, z, w) |
//! | 8..11 | 左脚位置 |
//! | 11..15 | 左脚旋转 |
//! | 15..18 | 右脚位置 |
//! | 18..22 | 右脚旋转 |
//! | 22..34 | 四个未来时刻的根轨迹采样 (x, y, z) |

use std::fs;
use std::path::Path;

use glam::{Quat, Vec3};
use serde::Deserialize;

use crate::{AnimError, Result};

/// 每行浮点数个数
pub const ROW_SIZE: usize = 34;
/// 未来轨迹采样数
pub const TRAJECTORY_SAMPLES: usize = 4;

const FRAME_ID: usize = 0;
const HIPS_POSITION: usize = 1;
const HIPS_ROTATION: usize = 4;
const LEFT_FOOT_POSITION: usize = 8;
const LEFT_FOOT_ROTATION: usize = 11;
const RIGHT_FOOT_POSITION: usize = 15;
const RIGHT_FOOT_ROTATION: usize = 18;
const TRAJECTORY: usize = 22;

/// 单帧特征行
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(try_from = "Vec<f32>")]
pub struct MotionRow {
    data: [f32; ROW_SIZE],
}

impl TryFrom<Vec<f32>> for MotionRow {
    type Error = String;

    fn try_from(values: Vec<f32>) -> std::result::Result<Self, Self::Error> {
        let len = values.len();
        let data: [f32; ROW_SIZE] = values
            .try_into()
            .map_err(|_| format!("行宽度为 {}，应为 {}", len, ROW_SIZE))?;
        Ok(Self { data })
    }
}

impl MotionRow {
    pub fn from_array(data: [f32; ROW_SIZE]) -> Self {
        Self { data }
    }

    #[inline]
    pub fn data(&self) -> &[f32; ROW_SIZE] {
        &self.data
    }

    #[inline]
    fn vec3_at(&self, offset: usize) -> Vec3 {
        Vec3::new(self.data[offset], self.data[offset + 1], self.data[offset + 2])
    }

    #[inline]
    fn quat_at(&self, offset: usize) -> Quat {
        let q = Quat::from_xyzw(
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        );
        if q.length_squared() > f32::EPSILON {
            q.normalize()
        } else {
            Quat::IDENTITY
        }
    }

    #[inline]
    pub fn frame_id(&self) -> f32 {
        self.data[FRAME_ID]
    }

    #[inline]
    pub fn hips_position(&self) -> Vec3 {
        self.vec3_at(HIPS_POSITION)
    }

    #[inline]
    pub fn hips_rotation(&self) -> Quat {
        self.quat_at(HIPS_ROTATION)
    }

    #[inline]
    pub fn left_foot_position(&self) -> Vec3 {
        self.vec3_at(LEFT_FOOT_POSITION)
    }

    #[inline]
    pub fn left_foot_rotation(&self) -> Quat {
        self.quat_at(LEFT_FOOT_ROTATION)
    }

    #[inline]
    pub fn right_foot_position(&self) -> Vec3 {
        self.vec3_at(RIGHT_FOOT_POSITION)
    }

    #[inline]
    pub fn right_foot_rotation(&self) -> Quat {
        self.quat_at(RIGHT_FOOT_ROTATION)
    }

    /// 第 k 个未来轨迹采样（k < TRAJECTORY_SAMPLES）
    #[inline]
    pub fn trajectory(&self, k: usize) -> Vec3 {
        self.vec3_at(TRAJECTORY + 3 * k.min(TRAJECTORY_SAMPLES - 1))
    }
}

/// 运动数据库（加载后不可变）
#[derive(Clone, Debug, Default)]
pub struct MotionDatabase {
    rows: Vec<MotionRow>,
}

impl MotionDatabase {
    pub fn from_rows(rows: Vec<MotionRow>) -> Self {
        Self { rows }
    }

    /// 从 JSON 文件加载
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let rows: Vec<MotionRow> = serde_json::from_str(text)
            .map_err(|e| AnimError::MotionDatabaseParse(e.to_string()))?;
        Ok(Self { rows })
    }

    #[inline]
    pub fn rows(&self) -> &[MotionRow] {
        &self.rows
    }

    #[inline]
    pub fn row(&self, index: usize) -> Option<&MotionRow> {
        self.rows.get(index)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_json(frame: usize) -> String {
        let mut values = vec![0.0f32; ROW_SIZE];
        values[0] = frame as f32;
        values[7] = 1.0;
        values[14] = 1.0;
        values[21] = 1.0;
        values[8] = 0.1;
        values[22] = 0.5;
        serde_json::to_string(&values).unwrap()
    }

    #[test]
    fn test_parse_rows() {
        let json = format!("[{}, {}]", row_json(0), row_json(1));
        let db = MotionDatabase::from_json_str(&json).unwrap();
        assert_eq!(db.len(), 2);
        let row = db.row(1).unwrap();
        assert_eq!(row.frame_id(), 1.0);
        assert_eq!(row.hips_rotation(), Quat::IDENTITY);
        assert_eq!(row.left_foot_position(), Vec3::new(0.1, 0.0, 0.0));
        assert_eq!(row.trajectory(0), Vec3::new(0.5, 0.0, 0.0));
    }

    #[test]
    fn test_wrong_width_is_error() {
        let err = MotionDatabase::from_json_str("[[1.0, 2.0, 3.0]]");
        assert!(matches!(err, Err(AnimError::MotionDatabaseParse(_))));
    }

    #[test]
    fn test_malformed_json_is_error() {
        assert!(MotionDatabase::from_json_str("{\"rows\": 3").is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = MotionDatabase::load("/definitely/not/here/motion.json");
        assert!(matches!(err, Err(AnimError::Io(_))));
    }
}
