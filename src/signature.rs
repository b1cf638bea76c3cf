use std::fmt::Display;
use std::str::FromStr;

/// A C type the bridge knows how to pass or return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportedType {
    Int,
    Float,
    Char,
    Void,
}

impl FromStr for SupportedType {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "int" => Ok(SupportedType::Int),
            "float" => Ok(SupportedType::Float),
            "char" => Ok(SupportedType::Char),
            "void" => Ok(SupportedType::Void),
            _ => Err(SignatureError::UnsupportedType(s.trim().to_string())),
        }
    }
}

impl Display for SupportedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SupportedType::Int => "int",
            SupportedType::Float => "float",
            SupportedType::Char => "char",
            SupportedType::Void => "void",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CallingConvention {
    #[default]
    Cdecl,
    Stdcall,
}

impl FromStr for CallingConvention {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cdecl" => Ok(CallingConvention::Cdecl),
            "stdcall" => Ok(CallingConvention::Stdcall),
            _ => Err(SignatureError::UnsupportedCallingConvention(
                s.trim().to_string(),
            )),
        }
    }
}

/// The shape of a foreign function, as written by a client:
/// `int,int(stdcall)->int`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    pub calling_convention: CallingConvention,
    pub param_types: Vec<SupportedType>,
    pub return_type: SupportedType,
}

impl FromStr for FunctionSignature {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_signature(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    MissingArrow,
    MissingClosingParenthesis,
    MissingReturnType,
    Malformed(String),
    UnsupportedType(String),
    UnsupportedCallingConvention(String),
    VoidParameter,
}

impl Display for SignatureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignatureError::MissingArrow => write!(f, "Signature must contain '->'"),
            SignatureError::MissingClosingParenthesis => {
                write!(f, "Malformed signature: missing closing parenthesis")
            }
            SignatureError::MissingReturnType => {
                write!(f, "Malformed signature: missing return type")
            }
            SignatureError::Malformed(reason) => write!(f, "Malformed signature: {}", reason),
            SignatureError::UnsupportedType(name) => write!(f, "Unsupported type: {}", name),
            SignatureError::UnsupportedCallingConvention(name) => {
                write!(f, "Unsupported calling convention: {}", name)
            }
            SignatureError::VoidParameter => {
                write!(f, "Malformed signature: 'void' must be the only parameter")
            }
        }
    }
}

impl std::error::Error for SignatureError {}

pub fn parse_signature(signature: &str) -> Result<FunctionSignature, SignatureError> {
    let parts: Vec<&str> = signature.split("->").collect();
    match parts.len() {
        1 => return Err(SignatureError::MissingArrow),
        2 => {}
        _ => return Err(SignatureError::Malformed("more than one '->'".into())),
    }
    let params_with_conv = parts[0];
    let ret_type_str = parts[1].trim();

    let mut calling_convention = CallingConvention::default();
    let params_part = if let Some(start) = params_with_conv.find('(') {
        let Some(len) = params_with_conv[start..].find(')') else {
            return Err(SignatureError::MissingClosingParenthesis);
        };
        let end = start + len;
        if !params_with_conv[end + 1..].trim().is_empty() {
            return Err(SignatureError::Malformed(
                "unexpected text after calling convention".into(),
            ));
        }
        calling_convention = params_with_conv[start + 1..end].parse()?;
        &params_with_conv[..start]
    } else {
        params_with_conv
    };

    let mut param_types = params_part
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(str::parse)
        .collect::<Result<Vec<SupportedType>, _>>()?;

    // `void` alone means "no parameters".
    if param_types.contains(&SupportedType::Void) {
        if param_types.len() != 1 {
            return Err(SignatureError::VoidParameter);
        }
        param_types.clear();
    }

    if ret_type_str.is_empty() {
        return Err(SignatureError::MissingReturnType);
    }
    let return_type = ret_type_str.parse()?;

    Ok(FunctionSignature {
        calling_convention,
        param_types,
        return_type,
    })
}
