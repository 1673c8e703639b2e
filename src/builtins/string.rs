//! 字符串类型
//!
//! 三种字符串都是单指针大小的不透明句柄：
//! - [`GString`] - 引擎 `String`，写时复制
//! - [`StringName`] - 驻留字符串，用作方法名、类名
//! - [`NodePath`] - 场景路径

use super::impl_opaque_builtin;
use crate::convert::VariantType;
use crate::sys::{self, ConstTypePtr, PtrConstructor};
use crate::variant::GType;
use std::ffi::c_char;
use std::fmt;
use std::sync::OnceLock;

#[repr(transparent)]
pub struct GString {
    opaque: usize,
}

#[repr(transparent)]
pub struct StringName {
    opaque: usize,
}

#[repr(transparent)]
pub struct NodePath {
    opaque: usize,
}

impl_opaque_builtin!(GString, GType::String);
impl_opaque_builtin!(StringName, GType::StringName);
impl_opaque_builtin!(NodePath, GType::NodePath);

/// Cross-type constructors, looked up once.
struct Converters {
    string_from_string_name: PtrConstructor,
    string_from_node_path: PtrConstructor,
    node_path_from_string: PtrConstructor,
}

fn converters() -> &'static Converters {
    static CONVERTERS: OnceLock<Converters> = OnceLock::new();
    CONVERTERS.get_or_init(|| {
        let lookup = |gtype: GType, index: i32| {
            // SAFETY: plain lookup, no pointers involved.
            match unsafe { (sys::interface().fns.variant_get_ptr_constructor)(gtype.to_sys(), index) } {
                Some(ctor) => ctor,
                None => panic!("engine provides no constructor {index} for {gtype}"),
            }
        };
        Converters {
            string_from_string_name: lookup(GType::String, 2),
            string_from_node_path: lookup(GType::String, 3),
            node_path_from_string: lookup(GType::NodePath, 2),
        }
    })
}

/// # Safety
/// `source` must be a valid instance of the constructor's argument type.
unsafe fn convert_with(ctor: PtrConstructor, source: ConstTypePtr, dst: sys::UninitializedTypePtr) {
    let args = [source];
    ctor(dst, args.as_ptr());
}

impl GString {
    pub fn new() -> Self {
        Self::engine_default()
    }

    /// Length in UTF-8 bytes.
    pub fn byte_len(&self) -> usize {
        // SAFETY: a null buffer only queries the length.
        let len = unsafe { (sys::interface().fns.string_to_utf8_chars)(self.sys(), std::ptr::null_mut(), 0) };
        len.max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.byte_len() == 0
    }
}

impl Default for GString {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for GString {
    fn from(text: &str) -> Self {
        // SAFETY: the engine copies `len` bytes from the buffer.
        unsafe {
            Self::new_with_uninit(|dst| {
                (sys::interface().fns.string_new_with_utf8_chars_and_len)(
                    dst,
                    text.as_ptr() as *const c_char,
                    text.len() as i64,
                )
            })
        }
    }
}

impl From<&String> for GString {
    fn from(text: &String) -> Self {
        Self::from(text.as_str())
    }
}

impl From<&StringName> for GString {
    fn from(name: &StringName) -> Self {
        unsafe { Self::new_with_uninit(|dst| convert_with(converters().string_from_string_name, name.sys(), dst)) }
    }
}

impl From<&NodePath> for GString {
    fn from(path: &NodePath) -> Self {
        unsafe { Self::new_with_uninit(|dst| convert_with(converters().string_from_node_path, path.sys(), dst)) }
    }
}

impl fmt::Display for GString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.byte_len();
        let mut buffer = vec![0u8; len];
        if len > 0 {
            // SAFETY: the buffer holds exactly `len` bytes.
            unsafe {
                (sys::interface().fns.string_to_utf8_chars)(
                    self.sys(),
                    buffer.as_mut_ptr() as *mut c_char,
                    len as i64,
                )
            };
        }
        f.write_str(&String::from_utf8_lossy(&buffer))
    }
}

impl fmt::Debug for GString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GString({:?})", self.to_string())
    }
}

impl PartialEq for GString {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl PartialEq<str> for GString {
    fn eq(&self, other: &str) -> bool {
        self.to_string() == other
    }
}

impl VariantType for GString {
    const GTYPE: GType = GType::String;
}

impl StringName {
    pub fn new() -> Self {
        Self::engine_default()
    }
}

impl Default for StringName {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for StringName {
    fn from(text: &str) -> Self {
        // SAFETY: the engine copies `len` bytes from the buffer.
        unsafe {
            Self::new_with_uninit(|dst| {
                (sys::interface().fns.string_name_new_with_utf8_chars_and_len)(
                    dst,
                    text.as_ptr() as *const c_char,
                    text.len() as i64,
                )
            })
        }
    }
}

impl From<&String> for StringName {
    fn from(text: &String) -> Self {
        Self::from(text.as_str())
    }
}

impl fmt::Display for StringName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&GString::from(self), f)
    }
}

impl fmt::Debug for StringName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StringName({:?})", self.to_string())
    }
}

impl PartialEq for StringName {
    fn eq(&self, other: &Self) -> bool {
        // Interned: equal names share the same handle.
        self.opaque == other.opaque || self.to_string() == other.to_string()
    }
}

impl VariantType for StringName {
    const GTYPE: GType = GType::StringName;
}

impl NodePath {
    pub fn new() -> Self {
        Self::engine_default()
    }
}

impl Default for NodePath {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&GString> for NodePath {
    fn from(text: &GString) -> Self {
        unsafe { Self::new_with_uninit(|dst| convert_with(converters().node_path_from_string, text.sys(), dst)) }
    }
}

impl From<&str> for NodePath {
    fn from(text: &str) -> Self {
        Self::from(&GString::from(text))
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&GString::from(self), f)
    }
}

impl fmt::Debug for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodePath({:?})", self.to_string())
    }
}

impl PartialEq for NodePath {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl VariantType for NodePath {
    const GTYPE: GType = GType::NodePath;
}
