//! 调用错误与 ABI 错误码互转

use crate::core::error::CallError;
use crate::sys::{self, CallErrorRaw, ConstVariantPtr};
use crate::variant::{GType, Variant};

impl CallError {
    /// Decodes an engine call result; `None` when the call succeeded.
    pub fn from_sys(raw: &CallErrorRaw, method: &str) -> Option<Self> {
        let method = method.to_string();
        let error = match raw.error {
            sys::CALL_OK => return None,
            sys::CALL_ERROR_INVALID_METHOD => CallError::InvalidMethod { method },
            sys::CALL_ERROR_INVALID_ARGUMENT => CallError::InvalidArgument {
                method,
                index: raw.argument.max(0) as usize,
                expected: GType::from_sys(raw.expected.max(0) as u32).unwrap_or(GType::Nil),
            },
            sys::CALL_ERROR_TOO_MANY_ARGUMENTS => CallError::TooManyArguments {
                method,
                expected: raw.expected.max(0) as usize,
            },
            sys::CALL_ERROR_TOO_FEW_ARGUMENTS => CallError::TooFewArguments {
                method,
                expected: raw.expected.max(0) as usize,
            },
            sys::CALL_ERROR_INSTANCE_IS_NULL => CallError::InstanceIsNull { method },
            sys::CALL_ERROR_METHOD_NOT_CONST => CallError::MethodNotConst { method },
            code => CallError::Unknown { method, code },
        };
        Some(error)
    }

    pub fn to_sys(&self) -> CallErrorRaw {
        match self {
            CallError::InvalidMethod { .. } => raw(sys::CALL_ERROR_INVALID_METHOD, 0, 0),
            CallError::InvalidArgument {
                index, expected, ..
            } => raw(
                sys::CALL_ERROR_INVALID_ARGUMENT,
                *index as i32,
                expected.to_sys() as i32,
            ),
            CallError::TooManyArguments { expected, .. } => {
                raw(sys::CALL_ERROR_TOO_MANY_ARGUMENTS, 0, *expected as i32)
            }
            CallError::TooFewArguments { expected, .. } => {
                raw(sys::CALL_ERROR_TOO_FEW_ARGUMENTS, 0, *expected as i32)
            }
            CallError::InstanceIsNull { .. } => raw(sys::CALL_ERROR_INSTANCE_IS_NULL, 0, 0),
            CallError::MethodNotConst { .. } => raw(sys::CALL_ERROR_METHOD_NOT_CONST, 0, 0),
            CallError::Unknown { code, .. } => raw(*code, 0, 0),
        }
    }

    pub fn method(&self) -> &str {
        match self {
            CallError::InvalidMethod { method }
            | CallError::InvalidArgument { method, .. }
            | CallError::TooManyArguments { method, .. }
            | CallError::TooFewArguments { method, .. }
            | CallError::InstanceIsNull { method }
            | CallError::MethodNotConst { method }
            | CallError::Unknown { method, .. } => method,
        }
    }
}

fn raw(error: u32, argument: i32, expected: i32) -> CallErrorRaw {
    CallErrorRaw {
        error,
        argument,
        expected,
    }
}

/// Writes `result` into an engine-provided error slot.
///
/// # Safety
/// `slot` must be null or point to writable storage.
pub(crate) unsafe fn write_call_error(slot: *mut CallErrorRaw, result: Option<&CallError>) {
    if slot.is_null() {
        return;
    }
    *slot = match result {
        Some(err) => err.to_sys(),
        None => CallErrorRaw::default(),
    };
}

/// Pointer array for passing host Variants to the engine.
pub(crate) fn variant_ptrs(args: &[Variant]) -> Vec<ConstVariantPtr> {
    args.iter().map(Variant::sys).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_is_none() {
        assert!(CallError::from_sys(&CallErrorRaw::default(), "f").is_none());
    }

    #[test]
    fn test_codes_round_trip() {
        let errors = [
            CallError::InvalidMethod { method: "f".into() },
            CallError::InvalidArgument {
                method: "f".into(),
                index: 2,
                expected: GType::Int,
            },
            CallError::TooFewArguments {
                method: "f".into(),
                expected: 3,
            },
            CallError::MethodNotConst { method: "f".into() },
        ];
        for err in errors {
            assert_eq!(CallError::from_sys(&err.to_sys(), "f"), Some(err.clone()));
            assert_eq!(err.method(), "f");
        }
    }

    #[test]
    fn test_unknown_code_is_preserved() {
        let raw = CallErrorRaw {
            error: 42,
            argument: 0,
            expected: 0,
        };
        assert_eq!(
            CallError::from_sys(&raw, "g"),
            Some(CallError::Unknown {
                method: "g".into(),
                code: 42
            })
        );
    }
}
