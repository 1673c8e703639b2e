//! 数学内建类型
//!
//! 字段顺序与大小与引擎完全一致（`repr(C)` + `bytemuck::Pod`），可以直接按字节传递。
//! `Real` 随 `double-precision` 特性在 `f32` / `f64` 之间切换；`Color` 始终为 `f32`。
//! 几何运算交给 glam，这里只提供构造与 glam 互转。

use bytemuck::{Pod, Zeroable};

/// Engine floating-point type for vectors and transforms.
#[cfg(not(feature = "double-precision"))]
pub type Real = f32;
/// Engine floating-point type for vectors and transforms.
#[cfg(feature = "double-precision")]
pub type Real = f64;

#[cfg(not(feature = "double-precision"))]
use glam::{Quat as RQuat, Vec2 as RVec2, Vec3 as RVec3, Vec4 as RVec4};
#[cfg(feature = "double-precision")]
use glam::{DQuat as RQuat, DVec2 as RVec2, DVec3 as RVec3, DVec4 as RVec4};

/// 二维向量
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vector2 {
    pub x: Real,
    pub y: Real,
}

/// 二维整数向量
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Pod, Zeroable)]
pub struct Vector2i {
    pub x: i32,
    pub y: i32,
}

/// 三维向量
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vector3 {
    pub x: Real,
    pub y: Real,
    pub z: Real,
}

/// 三维整数向量
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Pod, Zeroable)]
pub struct Vector3i {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// 四维向量
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vector4 {
    pub x: Real,
    pub y: Real,
    pub z: Real,
    pub w: Real,
}

/// 四维整数向量
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Pod, Zeroable)]
pub struct Vector4i {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub w: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Rect2 {
    pub position: Vector2,
    pub size: Vector2,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Pod, Zeroable)]
pub struct Rect2i {
    pub position: Vector2i,
    pub size: Vector2i,
}

/// 二维仿射变换：两个基向量加原点
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Transform2D {
    pub x: Vector2,
    pub y: Vector2,
    pub origin: Vector2,
}

/// 平面：法线与到原点的距离
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Plane {
    pub normal: Vector3,
    pub d: Real,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Quaternion {
    pub x: Real,
    pub y: Real,
    pub z: Real,
    pub w: Real,
}

/// 轴对齐包围盒
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Aabb {
    pub position: Vector3,
    pub size: Vector3,
}

/// 3x3 矩阵，按行存储
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Basis {
    pub x: Vector3,
    pub y: Vector3,
    pub z: Vector3,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Transform3D {
    pub basis: Basis,
    pub origin: Vector3,
}

/// 4x4 投影矩阵，按列存储
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Projection {
    pub x: Vector4,
    pub y: Vector4,
    pub z: Vector4,
    pub w: Vector4,
}

/// RGBA 颜色，分量始终为 32 位浮点
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

/// Opaque server resource id.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Pod, Zeroable)]
pub struct Rid(u64);

impl Vector2 {
    pub const ZERO: Self = Self::new(0.0, 0.0);
    pub const ONE: Self = Self::new(1.0, 1.0);

    pub const fn new(x: Real, y: Real) -> Self {
        Self { x, y }
    }
}

impl Vector2i {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl Vector3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);
    pub const ONE: Self = Self::new(1.0, 1.0, 1.0);

    pub const fn new(x: Real, y: Real, z: Real) -> Self {
        Self { x, y, z }
    }
}

impl Vector3i {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

impl Vector4 {
    pub const fn new(x: Real, y: Real, z: Real, w: Real) -> Self {
        Self { x, y, z, w }
    }
}

impl Vector4i {
    pub const fn new(x: i32, y: i32, z: i32, w: i32) -> Self {
        Self { x, y, z, w }
    }
}

impl Rect2 {
    pub const fn new(position: Vector2, size: Vector2) -> Self {
        Self { position, size }
    }
}

impl Rect2i {
    pub const fn new(position: Vector2i, size: Vector2i) -> Self {
        Self { position, size }
    }
}

impl Transform2D {
    pub const IDENTITY: Self = Self {
        x: Vector2::new(1.0, 0.0),
        y: Vector2::new(0.0, 1.0),
        origin: Vector2::ZERO,
    };
}

impl Default for Transform2D {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Plane {
    pub const fn new(normal: Vector3, d: Real) -> Self {
        Self { normal, d }
    }
}

impl Quaternion {
    pub const IDENTITY: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    pub const fn new(x: Real, y: Real, z: Real, w: Real) -> Self {
        Self { x, y, z, w }
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Aabb {
    pub const fn new(position: Vector3, size: Vector3) -> Self {
        Self { position, size }
    }
}

impl Basis {
    pub const IDENTITY: Self = Self {
        x: Vector3::new(1.0, 0.0, 0.0),
        y: Vector3::new(0.0, 1.0, 0.0),
        z: Vector3::new(0.0, 0.0, 1.0),
    };
}

impl Default for Basis {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform3D {
    pub const IDENTITY: Self = Self {
        basis: Basis::IDENTITY,
        origin: Vector3::ZERO,
    };

    pub const fn new(basis: Basis, origin: Vector3) -> Self {
        Self { basis, origin }
    }
}

impl Default for Transform3D {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Projection {
    pub const IDENTITY: Self = Self {
        x: Vector4::new(1.0, 0.0, 0.0, 0.0),
        y: Vector4::new(0.0, 1.0, 0.0, 0.0),
        z: Vector4::new(0.0, 0.0, 1.0, 0.0),
        w: Vector4::new(0.0, 0.0, 0.0, 1.0),
    };
}

impl Default for Projection {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Color {
    pub const WHITE: Self = Self::from_rgba(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Self = Self::from_rgba(0.0, 0.0, 0.0, 1.0);

    pub const fn from_rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn from_rgb(r: f32, g: f32, b: f32) -> Self {
        Self::from_rgba(r, g, b, 1.0)
    }
}

impl Rid {
    pub const INVALID: Self = Self(0);

    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn to_u64(self) -> u64 {
        self.0
    }

    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

/// glam 互转
macro_rules! impl_glam_conversions {
    ($($ty:ident <=> $glam:ty { $($field:ident),+ }),* $(,)?) => {
        $(
            impl From<$glam> for $ty {
                fn from(value: $glam) -> Self {
                    Self { $($field: value.$field),+ }
                }
            }

            impl From<$ty> for $glam {
                fn from(value: $ty) -> Self {
                    <$glam>::new($(value.$field),+)
                }
            }
        )*
    };
}

impl_glam_conversions! {
    Vector2 <=> RVec2 { x, y },
    Vector3 <=> RVec3 { x, y, z },
    Vector4 <=> RVec4 { x, y, z, w },
    Vector2i <=> glam::IVec2 { x, y },
    Vector3i <=> glam::IVec3 { x, y, z },
    Vector4i <=> glam::IVec4 { x, y, z, w },
}

impl From<RQuat> for Quaternion {
    fn from(value: RQuat) -> Self {
        Self::new(value.x, value.y, value.z, value.w)
    }
}

impl From<Quaternion> for RQuat {
    fn from(value: Quaternion) -> Self {
        RQuat::from_xyzw(value.x, value.y, value.z, value.w)
    }
}

impl From<glam::Vec4> for Color {
    fn from(value: glam::Vec4) -> Self {
        Self::from_rgba(value.x, value.y, value.z, value.w)
    }
}

impl From<Color> for glam::Vec4 {
    fn from(value: Color) -> Self {
        glam::Vec4::new(value.r, value.g, value.b, value.a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn test_sizes_follow_real() {
        let real = size_of::<Real>();
        assert_eq!(size_of::<Vector2>(), 2 * real);
        assert_eq!(size_of::<Transform2D>(), 6 * real);
        assert_eq!(size_of::<Basis>(), 9 * real);
        assert_eq!(size_of::<Projection>(), 16 * real);
        assert_eq!(size_of::<Color>(), 16);
        assert_eq!(size_of::<Vector3i>(), 12);
        assert_eq!(size_of::<Rid>(), 8);
    }

    #[test]
    fn test_glam_round_trip() {
        let v = Vector3::new(1.0, -2.0, 3.5);
        let g: RVec3 = v.into();
        assert_eq!(Vector3::from(g), v);

        let q: RQuat = Quaternion::IDENTITY.into();
        assert_eq!(q, RQuat::IDENTITY);
    }

    #[test]
    fn test_pod_bytes() {
        let color = Color::from_rgb(1.0, 0.5, 0.0);
        let bytes = bytemuck::bytes_of(&color);
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytemuck::pod_read_unaligned::<Color>(bytes), color);
    }
}
