//! The line protocol spoken by the bridge server.
//!
//! A request looks like `call AddNumbers sig:int,int->int 3 4`. The reply is the
//! return value as text, or `ERR <message>`, always terminated by a newline.

use crate::invoke::{invoke, Value};
use crate::library::BridgeLibrary;
use crate::signature::parse_signature;
use anyhow::{anyhow, Result};
use log::debug;
use std::fmt::Display;

const SIGNATURE_PREFIX: &str = "sig:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub function: String,
    pub signature: Option<String>,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    NotCall,
    MissingFunctionName,
    SignatureWithoutArrow,
    NoSignature,
}

impl Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestError::NotCall => write!(f, "Command must start with 'call'"),
            RequestError::MissingFunctionName => write!(f, "Missing function name"),
            RequestError::SignatureWithoutArrow => {
                write!(f, "Malformed signature; no '->' found")
            }
            RequestError::NoSignature => write!(f, "No signature string provided"),
        }
    }
}

impl std::error::Error for RequestError {}

/// True once `sig` has an arrow with something after it.
fn signature_complete(sig: &str) -> bool {
    sig.split_once("->")
        .is_some_and(|(_, ret)| !ret.trim().is_empty())
}

/// Splits a request line into its parts. Blank lines yield `Ok(None)`.
pub fn parse_request(line: &str) -> Result<Option<Request>, RequestError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.is_empty() {
        return Ok(None);
    }
    if tokens[0] != "call" {
        return Err(RequestError::NotCall);
    }
    let Some(&function) = tokens.get(1) else {
        return Err(RequestError::MissingFunctionName);
    };

    let mut signature = None;
    let mut args_start = 2;

    if let Some(first) = tokens.get(2).and_then(|t| t.strip_prefix(SIGNATURE_PREFIX)) {
        let mut sig = String::new();
        let mut end_idx = None;
        for (i, &tok) in tokens.iter().enumerate().skip(2) {
            let piece = if i == 2 { first } else { tok };
            if !sig.is_empty() {
                sig.push(' ');
            }
            sig.push_str(piece);
            if signature_complete(&sig) {
                end_idx = Some(i);
                break;
            }
        }
        if !sig.contains("->") {
            return Err(RequestError::SignatureWithoutArrow);
        }
        args_start = end_idx.map_or(tokens.len(), |i| i + 1);
        signature = Some(sig);
    }

    Ok(Some(Request {
        function: function.to_string(),
        signature,
        args: tokens[args_start..].iter().map(|s| s.to_string()).collect(),
    }))
}

/// Resolves and calls the requested function.
pub fn execute(lib: &BridgeLibrary, request: &Request) -> Result<Value> {
    let Some(sig_text) = &request.signature else {
        return Err(anyhow!(RequestError::NoSignature));
    };
    let signature = parse_signature(sig_text)?;
    debug!("{}: using signature {:?}", request.function, signature);

    let address = lib.symbol(&request.function)?;
    let args: Vec<&str> = request.args.iter().map(String::as_str).collect();

    let value = unsafe { invoke(address, &signature, &args)? };
    Ok(value)
}

/// Renders the reply line for a request outcome.
pub fn format_response(outcome: &Result<Value>) -> String {
    match outcome {
        Ok(value) => format!("{}\n", value),
        Err(err) => format!("ERR {}\n", err),
    }
}

/// Handles one request line end to end. Returns `None` for blank lines.
pub fn handle_line(lib: &BridgeLibrary, line: &str) -> Option<String> {
    let outcome = match parse_request(line) {
        Ok(None) => return None,
        Ok(Some(request)) => execute(lib, &request),
        Err(e) => Err(e.into()),
    };
    Some(format_response(&outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(function: &str, signature: Option<&str>, args: &[&str]) -> Request {
        Request {
            function: function.into(),
            signature: signature.map(Into::into),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_parse_simple_call() {
        let r = parse_request("call AddNumbers sig:int,int->int 3 4\n").unwrap();
        assert_eq!(
            r,
            Some(req("AddNumbers", Some("int,int->int"), &["3", "4"]))
        );
    }

    #[test]
    fn test_parse_signature_spanning_tokens() {
        let r = parse_request("call helloworld sig:void ->int").unwrap();
        assert_eq!(r, Some(req("helloworld", Some("void ->int"), &[])));

        let r = parse_request("call f sig:int, int(stdcall) -> int 1 2").unwrap();
        assert_eq!(
            r,
            Some(req("f", Some("int, int(stdcall) -> int"), &["1", "2"]))
        );
    }

    #[test]
    fn test_parse_without_signature() {
        let r = parse_request("call f 1 2").unwrap();
        assert_eq!(r, Some(req("f", None, &["1", "2"])));
    }

    #[test]
    fn test_blank_line() {
        assert_eq!(parse_request("   \r\n"), Ok(None));
    }

    #[test]
    fn test_request_errors() {
        assert_eq!(parse_request("invoke f"), Err(RequestError::NotCall));
        assert_eq!(parse_request("call"), Err(RequestError::MissingFunctionName));
        assert_eq!(
            parse_request("call f sig:int,int 1 2"),
            Err(RequestError::SignatureWithoutArrow)
        );
    }

    #[test]
    fn test_dangling_arrow_is_left_to_the_parser() {
        let r = parse_request("call f sig:int ->").unwrap();
        assert_eq!(r, Some(req("f", Some("int ->"), &[])));
    }

    #[test]
    fn test_format_response() {
        assert_eq!(format_response(&Ok(Value::Int(7))), "7\n");
        assert_eq!(format_response(&Ok(Value::Void)), "\n");
        assert_eq!(format_response(&Ok(Value::Char(b'\n' as i8))), "10\n");
        assert_eq!(format_response(&Ok(Value::Char(0))), "0\n");
        assert_eq!(
            format_response(&Err(RequestError::NoSignature.into())),
            "ERR No signature string provided\n"
        );
    }

    #[cfg(target_os = "linux")]
    mod in_process {
        use super::*;
        use libloading::os::unix::Library;

        fn this() -> BridgeLibrary {
            libloading::Library::from(Library::this()).into()
        }

        #[test]
        fn test_handle_line_calls_libc() {
            let lib = this();
            assert_eq!(
                handle_line(&lib, "call abs sig:int->int -5").as_deref(),
                Some("5\n")
            );
        }

        #[test]
        fn test_handle_line_errors() {
            let lib = this();
            assert_eq!(
                handle_line(&lib, "call abs -5").as_deref(),
                Some("ERR No signature string provided\n")
            );
            assert_eq!(
                handle_line(&lib, "hello").as_deref(),
                Some("ERR Command must start with 'call'\n")
            );
            let reply = handle_line(&lib, "call abs sig:long->int 1").unwrap();
            assert_eq!(reply, "ERR Unsupported type: long\n");
            let reply = handle_line(&lib, "call no_such_symbol_here sig:void->int").unwrap();
            assert!(reply.starts_with("ERR "));
            assert_eq!(handle_line(&lib, ""), None);
        }
    }
}
