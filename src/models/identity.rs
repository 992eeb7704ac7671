//! 身份与凭据
//!
//! CUIT 是公开信息，日志里可以明文输出；密码只能以 `****` 出现。

use crate::error::ValidationError;
use std::fmt;

const CUIT_WEIGHTS: [u32; 10] = [5, 4, 3, 2, 7, 6, 5, 4, 3, 2];

/// 校验 CUIT：11 位数字且校验位正确
pub fn is_valid_cuit(cuit: &str) -> bool {
    if cuit.len() != 11 || !cuit.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    let digits: Vec<u32> = cuit.bytes().map(|b| u32::from(b - b'0')).collect();
    let sum: u32 = digits[..10]
        .iter()
        .zip(CUIT_WEIGHTS.iter())
        .map(|(d, w)| d * w)
        .sum();

    let check = match 11 - (sum % 11) {
        11 => 0,
        10 => 9,
        n => n,
    };

    check == digits[10]
}

/// 校验 CUIT 并返回带字段名的错误
pub fn validate_cuit(field: &'static str, cuit: &str) -> Result<(), ValidationError> {
    if is_valid_cuit(cuit) {
        Ok(())
    } else {
        Err(ValidationError::InvalidCuit {
            field,
            value: cuit.to_string(),
        })
    }
}

/// 门户页面上的显示格式 XX-XXXXXXXX-X
pub fn format_cuit(cuit: &str) -> String {
    if cuit.len() != 11 || !cuit.is_ascii() {
        return cuit.to_string();
    }
    format!("{}-{}-{}", &cuit[..2], &cuit[2..10], &cuit[10..])
}

/// 登录密码
///
/// `Debug` 与 `Display` 都只输出 `****`。
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ValidationError::EmptySecret);
        }
        Ok(Self(value))
    }

    /// 只在填写登录表单时使用
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(****)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}
