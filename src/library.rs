use anyhow::{anyhow, Context, Result};
#[cfg(unix)]
use libloading::os::unix::{
    Library as LLNativeLibrary, // LL means libloading
    RTLD_LOCAL,
    RTLD_NOW,
};
#[cfg(windows)]
use libloading::os::windows::Library as LLNativeLibrary;
use log::{debug, trace};
use std::ffi::{c_void, CString};
use std::path::Path;

/// A native library opened once at startup and shared by every connection.
///
/// Dropping it unloads the library, so it must outlive any address handed out by
/// [`BridgeLibrary::symbol`].
pub struct BridgeLibrary {
    raw_library: libloading::Library,
}

impl std::fmt::Debug for BridgeLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeLibrary").finish_non_exhaustive()
    }
}

#[cfg(unix)]
unsafe fn libloading_load(path: &Path) -> Result<LLNativeLibrary> {
    LLNativeLibrary::open(Some(path), RTLD_NOW | RTLD_LOCAL).map_err(|e| e.into())
}

#[cfg(windows)]
unsafe fn libloading_load(path: &Path) -> Result<LLNativeLibrary> {
    LLNativeLibrary::new(path).map_err(|e| e.into())
}

impl BridgeLibrary {
    /// Loads the library at `path`. Its initializers (or `DllMain`) run here.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("loading library: {}", path.display());

        let lib = unsafe { libloading_load(path) }
            .with_context(|| format!("Failed to load DLL {}", path.display()))?;

        Ok(Self {
            raw_library: lib.into(),
        })
    }

    /// Resolves an exported function by name and returns its address.
    pub fn symbol(&self, name: &str) -> Result<*const c_void> {
        let func_name = CString::new(name).map_err(|_| anyhow!("Invalid function name"))?;
        trace!("resolving symbol: {}", name);

        let symbol = unsafe {
            self.raw_library
                .get::<*const c_void>(func_name.as_bytes_with_nul())?
        };
        let address = *symbol;
        if address.is_null() {
            return Err(anyhow!("Symbol {} resolved to a null address", name));
        }

        Ok(address)
    }
}

impl From<libloading::Library> for BridgeLibrary {
    fn from(raw_library: libloading::Library) -> Self {
        Self { raw_library }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_library() {
        let err = BridgeLibrary::open("/nonexistent/libnothing.so").unwrap_err();
        assert!(err.to_string().contains("Failed to load DLL"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_symbol_lookup_in_process() {
        let lib: BridgeLibrary = libloading::Library::from(LLNativeLibrary::this()).into();
        assert!(lib.symbol("abs").is_ok());
        assert!(lib.symbol("surely_not_exported_anywhere").is_err());
        assert!(lib.symbol("bad\0name").is_err());
    }
}
