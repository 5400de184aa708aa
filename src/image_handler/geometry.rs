//! 绘制几何计算模块
//!
//! 该模块实现导出链路唯一的一套“缩放 + 居中”算法，预览、单图导出、
//! 批量导出、PDF 排版全部复用 `compute_draw_rect`，保证同一输入得到一致结果。
//!
//! # 设计思路
//!
//! - 算法纯函数化：输入为源尺寸、目标尺寸、旋转、缩放策略，输出唯一矩形，便于测试。
//! - 使用 `f64` 表示长度，像素（画布）与毫米（PDF 页面）共用同一公式。
//! - 旋转 90°/270° 时只交换“计算比例用的轴”，不改变像素数据本身。
//! - 对异常输入（零尺寸、负数、非有限值）直接拒绝，不做静默兜底。

use super::ImageError;
use super::model::{Rotation, ScaleMode};

/// 二维长度（像素或毫米）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub width: f64,
    pub height: f64,
}

impl Extent {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn from_pixels(width: u32, height: u32) -> Self {
        Self::new(width as f64, height as f64)
    }

    fn validate(self, what: &str) -> Result<Self, ImageError> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if !valid(self.width) || !valid(self.height) {
            return Err(ImageError::InvalidFormat(format!(
                "{}尺寸无效：{}x{}",
                what, self.width, self.height
            )));
        }
        Ok(self)
    }
}

/// 绘制矩形。
///
/// `dx/dy/dw/dh` 均位于目标画布坐标系，`dw/dh` 是源图未旋转时的绘制宽高。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawRect {
    pub dx: f64,
    pub dy: f64,
    pub dw: f64,
    pub dh: f64,
    /// 实际使用的缩放比例。
    pub scale: f64,
    /// 旋转后参与比例计算的源宽高。
    pub effective: Extent,
    pub rotation: Rotation,
}

impl DrawRect {
    /// 旋转后在画布上实际占据的宽高。
    pub fn footprint(&self) -> Extent {
        if self.rotation.swaps_axes() {
            Extent::new(self.dh, self.dw)
        } else {
            Extent::new(self.dw, self.dh)
        }
    }

    /// 旋转后的占位矩形 `(x, y, w, h)`，以目标中心为中心。
    pub fn placement(&self, target: Extent) -> (f64, f64, f64, f64) {
        let fp = self.footprint();
        (
            (target.width - fp.width) / 2.0,
            (target.height - fp.height) / 2.0,
            fp.width,
            fp.height,
        )
    }
}

/// 计算源图在目标画布中的绘制矩形
///
/// # 算法
/// 1. 旋转 90/270 时交换有效轴：`effW = sh, effH = sw`
/// 2. contain 取 `min(tw/effW, th/effH)`，cover 取 `max(...)`
/// 3. `dw = sw * scale`，`dh = sh * scale`
/// 4. 居中：`dx = (tw - dw) / 2`，`dy = (th - dh) / 2`
///
/// # 参数
/// * `source`   - 源图固有尺寸
/// * `target`   - 目标画布（或 PDF 内容区）尺寸
/// * `rotation` - 顺时针旋转角度
/// * `mode`     - 缩放策略
pub fn compute_draw_rect(
    source: Extent,
    target: Extent,
    rotation: Rotation,
    mode: ScaleMode,
) -> Result<DrawRect, ImageError> {
    let source = source.validate("源图")?;
    let target = target.validate("目标")?;

    let effective = if rotation.swaps_axes() {
        Extent::new(source.height, source.width)
    } else {
        source
    };

    let sx = target.width / effective.width;
    let sy = target.height / effective.height;
    let scale = match mode {
        ScaleMode::Contain => sx.min(sy),
        ScaleMode::Cover => sx.max(sy),
    };

    let dw = source.width * scale;
    let dh = source.height * scale;

    Ok(DrawRect {
        dx: (target.width - dw) / 2.0,
        dy: (target.height - dh) / 2.0,
        dw,
        dh,
        scale,
        effective,
        rotation,
    })
}

/// 以原始大小放置，超出目标时退回 contain。
pub fn compute_original_rect(
    source: Extent,
    target: Extent,
    rotation: Rotation,
) -> Result<DrawRect, ImageError> {
    let contain = compute_draw_rect(source, target, rotation, ScaleMode::Contain)?;
    if contain.scale < 1.0 {
        return Ok(contain);
    }
    let (dw, dh) = (source.width, source.height);
    Ok(DrawRect {
        dx: (target.width - dw) / 2.0,
        dy: (target.height - dh) / 2.0,
        dw,
        dh,
        scale: 1.0,
        effective: contain.effective,
        rotation,
    })
}

/// 预览画布尺寸：保持目标比例，缩进 `max_w × max_h` 的展示区域。
pub fn preview_dimensions(target_w: u32, target_h: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    if target_w == 0 || target_h == 0 {
        return (0, 0);
    }
    let scale = (max_w as f64 / target_w as f64)
        .min(max_h as f64 / target_h as f64)
        .min(1.0);
    let w = ((target_w as f64 * scale).round() as u32).max(1);
    let h = ((target_h as f64 * scale).round() as u32).max(1);
    (w, h)
}
