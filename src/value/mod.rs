//! Typed value model for attribute samples.
//!
//! Every attribute declares an [`AttributeType`] at creation; sample
//! payloads are carried as tagged [`Value`]s. Array values keep an explicit
//! element count (`len`), and a zero-length array is valid and distinct
//! from an absent sample. Scalars never convert implicitly to or from
//! arrays of one.

use glam::{Quat, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::util::{Error, Result};

/// Declared type of an attribute. Fixed at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeType {
    Bool,
    Byte,
    Int,
    UInt,
    Float,
    Float2,
    Float3,
    Float4,
    Quaternion,
    Token,
    String,
    Asset,
    BoolArray,
    ByteArray,
    IntArray,
    UIntArray,
    FloatArray,
    Float2Array,
    Float3Array,
    Float4Array,
    QuaternionArray,
    TokenArray,
    StringArray,
    AssetArray,
}

impl AttributeType {
    /// Whether this is an array type.
    pub fn is_array(&self) -> bool {
        matches!(
            self,
            Self::BoolArray
                | Self::ByteArray
                | Self::IntArray
                | Self::UIntArray
                | Self::FloatArray
                | Self::Float2Array
                | Self::Float3Array
                | Self::Float4Array
                | Self::QuaternionArray
                | Self::TokenArray
                | Self::StringArray
                | Self::AssetArray
        )
    }

    /// Whether samples of this type participate in linear interpolation.
    ///
    /// Token/String/Asset always use held-sample semantics.
    pub fn is_numeric(&self) -> bool {
        !matches!(
            self,
            Self::Token
                | Self::String
                | Self::Asset
                | Self::TokenArray
                | Self::StringArray
                | Self::AssetArray
                | Self::Bool
                | Self::BoolArray
        )
    }

    /// Display name, used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bool => "Bool",
            Self::Byte => "Byte",
            Self::Int => "Int",
            Self::UInt => "UInt",
            Self::Float => "Float",
            Self::Float2 => "Float2",
            Self::Float3 => "Float3",
            Self::Float4 => "Float4",
            Self::Quaternion => "Quaternion",
            Self::Token => "Token",
            Self::String => "String",
            Self::Asset => "Asset",
            Self::BoolArray => "BoolArray",
            Self::ByteArray => "ByteArray",
            Self::IntArray => "IntArray",
            Self::UIntArray => "UIntArray",
            Self::FloatArray => "FloatArray",
            Self::Float2Array => "Float2Array",
            Self::Float3Array => "Float3Array",
            Self::Float4Array => "Float4Array",
            Self::QuaternionArray => "QuaternionArray",
            Self::TokenArray => "TokenArray",
            Self::StringArray => "StringArray",
            Self::AssetArray => "AssetArray",
        }
    }
}

/// A single typed sample payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Byte(u8),
    Int(i32),
    UInt(u32),
    Float(f32),
    Float2(Vec2),
    Float3(Vec3),
    Float4(Vec4),
    Quaternion(Quat),
    Token(std::string::String),
    String(std::string::String),
    Asset(std::string::String),
    BoolArray(Vec<bool>),
    ByteArray(Vec<u8>),
    IntArray(Vec<i32>),
    UIntArray(Vec<u32>),
    FloatArray(Vec<f32>),
    Float2Array(Vec<Vec2>),
    Float3Array(Vec<Vec3>),
    Float4Array(Vec<Vec4>),
    QuaternionArray(Vec<Quat>),
    TokenArray(Vec<std::string::String>),
    StringArray(Vec<std::string::String>),
    AssetArray(Vec<std::string::String>),
}

impl Value {
    /// The type tag of this value.
    pub fn attribute_type(&self) -> AttributeType {
        match self {
            Self::Bool(_) => AttributeType::Bool,
            Self::Byte(_) => AttributeType::Byte,
            Self::Int(_) => AttributeType::Int,
            Self::UInt(_) => AttributeType::UInt,
            Self::Float(_) => AttributeType::Float,
            Self::Float2(_) => AttributeType::Float2,
            Self::Float3(_) => AttributeType::Float3,
            Self::Float4(_) => AttributeType::Float4,
            Self::Quaternion(_) => AttributeType::Quaternion,
            Self::Token(_) => AttributeType::Token,
            Self::String(_) => AttributeType::String,
            Self::Asset(_) => AttributeType::Asset,
            Self::BoolArray(_) => AttributeType::BoolArray,
            Self::ByteArray(_) => AttributeType::ByteArray,
            Self::IntArray(_) => AttributeType::IntArray,
            Self::UIntArray(_) => AttributeType::UIntArray,
            Self::FloatArray(_) => AttributeType::FloatArray,
            Self::Float2Array(_) => AttributeType::Float2Array,
            Self::Float3Array(_) => AttributeType::Float3Array,
            Self::Float4Array(_) => AttributeType::Float4Array,
            Self::QuaternionArray(_) => AttributeType::QuaternionArray,
            Self::TokenArray(_) => AttributeType::TokenArray,
            Self::StringArray(_) => AttributeType::StringArray,
            Self::AssetArray(_) => AttributeType::AssetArray,
        }
    }

    /// Number of elements: 1 for scalars, array length for arrays.
    pub fn element_count(&self) -> usize {
        match self {
            Self::BoolArray(v) => v.len(),
            Self::ByteArray(v) => v.len(),
            Self::IntArray(v) => v.len(),
            Self::UIntArray(v) => v.len(),
            Self::FloatArray(v) => v.len(),
            Self::Float2Array(v) => v.len(),
            Self::Float3Array(v) => v.len(),
            Self::Float4Array(v) => v.len(),
            Self::QuaternionArray(v) => v.len(),
            Self::TokenArray(v) => v.len(),
            Self::StringArray(v) => v.len(),
            Self::AssetArray(v) => v.len(),
            _ => 1,
        }
    }

    /// Fail with `TypeMismatch` unless this value carries the expected type.
    pub fn expect_type(&self, expected: AttributeType) -> Result<()> {
        let actual = self.attribute_type();
        if actual == expected {
            Ok(())
        } else {
            Err(Error::TypeMismatch {
                expected: expected.name().into(),
                actual: actual.name().into(),
            })
        }
    }

    /// Linearly interpolate between two samples of the same type.
    ///
    /// Non-numeric types, mismatched types, and arrays of differing length
    /// fall back to held-sample semantics (returning `a`). Quaternions use
    /// spherical interpolation; integers round to nearest.
    pub fn lerp(a: &Value, b: &Value, alpha: f64) -> Value {
        let t = alpha as f32;
        match (a, b) {
            (Self::Byte(x), Self::Byte(y)) => Self::Byte(lerp_int(*x as f64, *y as f64, alpha) as u8),
            (Self::Int(x), Self::Int(y)) => Self::Int(lerp_int(*x as f64, *y as f64, alpha) as i32),
            (Self::UInt(x), Self::UInt(y)) => Self::UInt(lerp_int(*x as f64, *y as f64, alpha) as u32),
            (Self::Float(x), Self::Float(y)) => Self::Float(x + (y - x) * t),
            (Self::Float2(x), Self::Float2(y)) => Self::Float2(x.lerp(*y, t)),
            (Self::Float3(x), Self::Float3(y)) => Self::Float3(x.lerp(*y, t)),
            (Self::Float4(x), Self::Float4(y)) => Self::Float4(x.lerp(*y, t)),
            (Self::Quaternion(x), Self::Quaternion(y)) => Self::Quaternion(x.slerp(*y, t)),
            (Self::ByteArray(x), Self::ByteArray(y)) if x.len() == y.len() => Self::ByteArray(
                x.iter().zip(y).map(|(a, b)| lerp_int(*a as f64, *b as f64, alpha) as u8).collect(),
            ),
            (Self::IntArray(x), Self::IntArray(y)) if x.len() == y.len() => Self::IntArray(
                x.iter().zip(y).map(|(a, b)| lerp_int(*a as f64, *b as f64, alpha) as i32).collect(),
            ),
            (Self::UIntArray(x), Self::UIntArray(y)) if x.len() == y.len() => Self::UIntArray(
                x.iter().zip(y).map(|(a, b)| lerp_int(*a as f64, *b as f64, alpha) as u32).collect(),
            ),
            (Self::FloatArray(x), Self::FloatArray(y)) if x.len() == y.len() => {
                Self::FloatArray(x.iter().zip(y).map(|(a, b)| a + (b - a) * t).collect())
            }
            (Self::Float2Array(x), Self::Float2Array(y)) if x.len() == y.len() => {
                Self::Float2Array(x.iter().zip(y).map(|(a, b)| a.lerp(*b, t)).collect())
            }
            (Self::Float3Array(x), Self::Float3Array(y)) if x.len() == y.len() => {
                Self::Float3Array(x.iter().zip(y).map(|(a, b)| a.lerp(*b, t)).collect())
            }
            (Self::Float4Array(x), Self::Float4Array(y)) if x.len() == y.len() => {
                Self::Float4Array(x.iter().zip(y).map(|(a, b)| a.lerp(*b, t)).collect())
            }
            (Self::QuaternionArray(x), Self::QuaternionArray(y)) if x.len() == y.len() => {
                Self::QuaternionArray(x.iter().zip(y).map(|(a, b)| a.slerp(*b, t)).collect())
            }
            _ => a.clone(),
        }
    }

    /// Borrow as `Vec3` array, failing with `TypeMismatch` otherwise.
    pub fn as_float3_array(&self) -> Result<&[Vec3]> {
        match self {
            Self::Float3Array(v) => Ok(v),
            _ => Err(self.mismatch(AttributeType::Float3Array)),
        }
    }

    /// Borrow as `Vec2` array, failing with `TypeMismatch` otherwise.
    pub fn as_float2_array(&self) -> Result<&[Vec2]> {
        match self {
            Self::Float2Array(v) => Ok(v),
            _ => Err(self.mismatch(AttributeType::Float2Array)),
        }
    }

    /// Borrow as `i32` array, failing with `TypeMismatch` otherwise.
    pub fn as_int_array(&self) -> Result<&[i32]> {
        match self {
            Self::IntArray(v) => Ok(v),
            _ => Err(self.mismatch(AttributeType::IntArray)),
        }
    }

    /// Borrow as `f32` array, failing with `TypeMismatch` otherwise.
    pub fn as_float_array(&self) -> Result<&[f32]> {
        match self {
            Self::FloatArray(v) => Ok(v),
            _ => Err(self.mismatch(AttributeType::FloatArray)),
        }
    }

    /// Extract a scalar float, failing with `TypeMismatch` otherwise.
    pub fn as_float(&self) -> Result<f32> {
        match self {
            Self::Float(v) => Ok(*v),
            _ => Err(self.mismatch(AttributeType::Float)),
        }
    }

    /// Extract a scalar `Vec3`, failing with `TypeMismatch` otherwise.
    pub fn as_float3(&self) -> Result<Vec3> {
        match self {
            Self::Float3(v) => Ok(*v),
            _ => Err(self.mismatch(AttributeType::Float3)),
        }
    }

    /// Extract a scalar quaternion, failing with `TypeMismatch` otherwise.
    pub fn as_quaternion(&self) -> Result<Quat> {
        match self {
            Self::Quaternion(v) => Ok(*v),
            _ => Err(self.mismatch(AttributeType::Quaternion)),
        }
    }

    fn mismatch(&self, expected: AttributeType) -> Error {
        Error::TypeMismatch {
            expected: expected.name().into(),
            actual: self.attribute_type().name().into(),
        }
    }
}

fn lerp_int(a: f64, b: f64, alpha: f64) -> f64 {
    (a + (b - a) * alpha).round()
}
