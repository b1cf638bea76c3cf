//! Calls a foreign function whose shape is only known at runtime.
//!
//! The call interface is built with libffi from a [`FunctionSignature`], and the
//! textual arguments are converted to the C types the signature names.

use crate::signature::{CallingConvention, FunctionSignature, SupportedType};
use libffi::middle::{Arg, Cif, CodePtr, Type};
use libffi::raw::ffi_arg;
use log::trace;
use std::ffi::c_void;
use std::fmt::Display;

/// The result of a foreign call, tagged with its C type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f32),
    Char(i8),
    Void,
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            // Control bytes would break the one-reply-per-line framing.
            Value::Char(v) if (*v as u8).is_ascii_graphic() || *v as u8 == b' ' => {
                write!(f, "{}", *v as u8 as char)
            }
            Value::Char(v) => write!(f, "{}", v),
            Value::Void => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeError {
    ArgumentCount {
        expected: usize,
        found: usize,
    },
    InvalidArgument {
        position: usize,
        text: String,
        expected: SupportedType,
    },
}

impl Display for InvokeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvokeError::ArgumentCount { expected, found } => {
                write!(f, "Expected {} arguments, got {}", expected, found)
            }
            InvokeError::InvalidArgument {
                position,
                text,
                expected,
            } => write!(
                f,
                "Argument parsing error: argument {} ({}) is not a valid {}",
                position, text, expected
            ),
        }
    }
}

impl std::error::Error for InvokeError {}

/// An argument converted to its C representation. It must stay alive until the
/// call returns, since libffi only receives pointers to it.
#[derive(Debug)]
enum ArgValue {
    Int(i32),
    Float(f32),
    Char(i8),
}

impl ArgValue {
    fn as_arg(&self) -> Arg {
        match self {
            ArgValue::Int(v) => Arg::new(v),
            ArgValue::Float(v) => Arg::new(v),
            ArgValue::Char(v) => Arg::new(v),
        }
    }
}

fn ffi_type(t: SupportedType) -> Type {
    match t {
        SupportedType::Int => Type::i32(),
        SupportedType::Float => Type::f32(),
        SupportedType::Char => Type::i8(),
        SupportedType::Void => Type::void(),
    }
}

/// A single character is taken literally; anything longer must be a decimal `i8`.
fn parse_char(text: &str) -> Option<i8> {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() => Some(c as u8 as i8),
        _ => text.parse().ok(),
    }
}

fn parse_arg(position: usize, text: &str, t: SupportedType) -> Result<ArgValue, InvokeError> {
    let parsed = match t {
        SupportedType::Int => text.parse().ok().map(ArgValue::Int),
        SupportedType::Float => text.parse().ok().map(ArgValue::Float),
        SupportedType::Char => parse_char(text).map(ArgValue::Char),
        SupportedType::Void => None,
    };
    parsed.ok_or_else(|| InvokeError::InvalidArgument {
        position,
        text: text.to_string(),
        expected: t,
    })
}

#[cfg(all(windows, target_arch = "x86"))]
fn apply_convention(cif: &mut Cif, convention: CallingConvention) {
    if convention == CallingConvention::Stdcall {
        cif.set_abi(libffi::raw::ffi_abi_FFI_STDCALL);
    }
}

// stdcall and cdecl are the same ABI everywhere except 32-bit Windows.
#[cfg(not(all(windows, target_arch = "x86")))]
fn apply_convention(_cif: &mut Cif, _convention: CallingConvention) {}

/// Calls the function at `address` with `args` converted per `signature`.
///
/// # Safety
/// `address` must point to a function whose real signature and calling convention
/// match `signature`. Nothing here can verify that.
pub unsafe fn invoke(
    address: *const c_void,
    signature: &FunctionSignature,
    args: &[&str],
) -> Result<Value, InvokeError> {
    if args.len() != signature.param_types.len() {
        return Err(InvokeError::ArgumentCount {
            expected: signature.param_types.len(),
            found: args.len(),
        });
    }

    let values = args
        .iter()
        .zip(&signature.param_types)
        .enumerate()
        .map(|(i, (text, t))| parse_arg(i + 1, text, *t))
        .collect::<Result<Vec<_>, _>>()?;

    let arg_types: Vec<Type> = signature.param_types.iter().map(|t| ffi_type(*t)).collect();
    let mut cif = Cif::new(arg_types, ffi_type(signature.return_type));
    apply_convention(&mut cif, signature.calling_convention);

    let ffi_args: Vec<Arg> = values.iter().map(ArgValue::as_arg).collect();
    let code_ptr = CodePtr::from_ptr(address);

    trace!("invoking {:p} as {:?} with {:?}", address, signature, values);

    // libffi widens integral returns to a full `ffi_arg`, so they are read back
    // at that width and narrowed afterwards.
    let value = match signature.return_type {
        SupportedType::Int => Value::Int(cif.call::<ffi_arg>(code_ptr, &ffi_args) as i32),
        SupportedType::Char => Value::Char(cif.call::<ffi_arg>(code_ptr, &ffi_args) as i8),
        SupportedType::Float => Value::Float(cif.call::<f32>(code_ptr, &ffi_args)),
        SupportedType::Void => {
            cif.call::<()>(code_ptr, &ffi_args);
            Value::Void
        }
    };

    Ok(value)
}
